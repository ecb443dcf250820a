//! Spend-safety analysis over the transaction graph.

use crate::inner::TxDbInner;
use crate::types::{TxRow, TxState};
use bitcoin::{Address, Network, OutPoint, Txid};
use featherbit_primitives::{AddressSet, OutputInfo, extract_address};
use std::collections::{HashMap, HashSet};

/// Knows how to check a transaction for double-spends.
///
/// The graph search is a memoized recursive walk, so the more checks one
/// checker performs, the faster those checks can become for a fixed
/// graph. The memo lives for a single [`TxDbInner::get_utxos`] call and is
/// seeded before descending, which also terminates the walk on cyclic
/// graphs: a revisit reads the in-progress value, biased safe to match
/// the treatment of missing ancestors.
struct SpendChecker<'a> {
    db: &'a TxDbInner,
    double_spends: &'a HashSet<OutPoint>,
    addresses: &'a AddressSet,
    network: Network,
    visited: HashMap<Txid, bool>,
}

impl<'a> SpendChecker<'a> {
    fn new(
        db: &'a TxDbInner,
        double_spends: &'a HashSet<OutPoint>,
        addresses: &'a AddressSet,
        network: Network,
    ) -> Self {
        Self {
            db,
            double_spends,
            addresses,
            network,
            visited: HashMap::new(),
        }
    }

    /// Whether a transaction is safe to spend from.
    ///
    /// With `filter` set, unconfirmed transactions must spend only wallet
    /// inputs, so unconfirmed change survives and unconfirmed receives
    /// are rejected.
    fn check(&mut self, txid: Txid, row: &TxRow, filter: bool) -> bool {
        if filter && row.state != TxState::Confirmed {
            // This is a spend only if we control all the inputs.
            for input in &row.tx.input {
                match self.input_address(&input.previous_output) {
                    Some(address) if self.addresses.contains(&address) => {}
                    _ => return false,
                }
            }
        }

        self.is_safe(txid)
    }

    /// Resolve an input to the payment address of the output it spends,
    /// through the funding transaction we have on record.
    fn input_address(&self, outpoint: &OutPoint) -> Option<Address> {
        let funding = self.db.rows.get(&outpoint.txid)?;
        let output = funding.tx.output.get(outpoint.vout as usize)?;
        extract_address(&output.script_pubkey, self.network)
    }

    /// Recursively checks the transaction graph for double-spends.
    ///
    /// Returns true if the transaction never sources a double spend.
    fn is_safe(&mut self, txid: Txid) -> bool {
        // Just use the previous result if we have been here before:
        if let Some(&safe) = self.visited.get(&txid) {
            return safe;
        }

        // We have to assume missing transactions are safe:
        let db = self.db;
        let Some(row) = db.rows.get(&txid) else {
            self.visited.insert(txid, true);
            return true;
        };

        // Confirmed transactions are also safe:
        if row.state == TxState::Confirmed {
            self.visited.insert(txid, true);
            return true;
        }

        // Seed the memo before descending so a cyclic graph terminates.
        self.visited.insert(txid, true);

        // Recursively check all the inputs against the double-spend list:
        for input in &row.tx.input {
            if self.double_spends.contains(&input.previous_output)
                || !self.is_safe(input.previous_output.txid)
            {
                self.visited.insert(txid, false);
                return false;
            }
        }
        true
    }
}

impl TxDbInner {
    /// The unspent outputs the wallet may safely spend.
    pub(crate) fn get_utxos(
        &self,
        addresses: &AddressSet,
        filter: bool,
        network: Network,
    ) -> Vec<OutputInfo> {
        // Build a list of spends, and of outpoints spent more than once:
        let mut spends = HashSet::new();
        let mut double_spends = HashSet::new();
        for row in self.rows.values() {
            for input in &row.tx.input {
                if !spends.insert(input.previous_output) {
                    double_spends.insert(input.previous_output);
                }
            }
        }

        let mut checker = SpendChecker::new(self, &double_spends, addresses, network);

        // An output is interesting if it isn't spent, belongs to us, and
        // its transaction passes the safety check:
        let mut out = Vec::new();
        for (txid, row) in &self.rows {
            for (index, output) in row.tx.output.iter().enumerate() {
                let outpoint = OutPoint {
                    txid: *txid,
                    vout: index as u32,
                };
                if spends.contains(&outpoint) {
                    continue;
                }
                let owned = extract_address(&output.script_pubkey, network)
                    .is_some_and(|address| addresses.contains(&address));
                if owned && checker.check(*txid, row, filter) {
                    out.push(OutputInfo {
                        outpoint,
                        value: output.value,
                    });
                }
            }
        }
        out
    }
}
