//! Test helpers and scenario tests for the transaction database.

mod utxo_tests;

use crate::types::{TxRow, TxState};
use crate::{TxDatabase, TxDatabaseOptions};
use bitcoin::hashes::Hash;
use bitcoin::{
    Address, Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    Witness, absolute, transaction,
};
use featherbit_primitives::{AddressSet, compute_ntxid};

pub(crate) fn db() -> TxDatabase {
    TxDatabase::new(TxDatabaseOptions::default())
}

/// Deterministic P2PKH address derived from a one-byte seed.
pub(crate) fn address(seed: u8) -> Address {
    let script = ScriptBuf::new_p2pkh(&bitcoin::PubkeyHash::from_byte_array([seed; 20]));
    Address::from_script(&script, Network::Bitcoin).expect("p2pkh script decodes")
}

pub(crate) fn address_set(addresses: &[&Address]) -> AddressSet {
    addresses.iter().map(|address| (*address).clone()).collect()
}

/// An outpoint on a transaction the store has never seen.
pub(crate) fn dummy_outpoint(vout: u32) -> OutPoint {
    OutPoint {
        txid: Txid::all_zeros(),
        vout,
    }
}

/// Fluent transaction builder for tests.
pub(crate) struct TxBuilder {
    inputs: Vec<TxIn>,
    outputs: Vec<TxOut>,
}

impl TxBuilder {
    pub(crate) fn new() -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub(crate) fn input(self, outpoint: OutPoint) -> Self {
        self.input_with_sig(outpoint, Vec::new())
    }

    /// An input with explicit signature-script bytes; two transactions
    /// differing only here share an ntxid but not a txid.
    pub(crate) fn input_with_sig(mut self, outpoint: OutPoint, script_sig: Vec<u8>) -> Self {
        self.inputs.push(TxIn {
            previous_output: outpoint,
            script_sig: ScriptBuf::from_bytes(script_sig),
            sequence: Sequence::MAX,
            witness: Witness::default(),
        });
        self
    }

    pub(crate) fn output(mut self, value: u64, address: &Address) -> Self {
        self.outputs.push(TxOut {
            value: Amount::from_sat(value),
            script_pubkey: address.script_pubkey(),
        });
        self
    }

    pub(crate) fn build(self) -> Transaction {
        Transaction {
            version: transaction::Version::TWO,
            lock_time: absolute::LockTime::ZERO,
            input: self.inputs,
            output: self.outputs,
        }
    }
}

/// Two malleations of one payment: same ntxid, different txids.
pub(crate) fn malleated_pair(
    funding: OutPoint,
    pay_to: &Address,
    value: u64,
) -> (Transaction, Transaction) {
    let m1 = TxBuilder::new()
        .input_with_sig(funding, vec![0x51])
        .output(value, pay_to)
        .build();
    let m2 = TxBuilder::new()
        .input_with_sig(funding, vec![0x52])
        .output(value, pay_to)
        .build();
    assert_ne!(m1.compute_txid(), m2.compute_txid());
    assert_eq!(compute_ntxid(&m1), compute_ntxid(&m2));
    (m1, m2)
}

/// Snapshot a row for assertions.
pub(crate) fn row(db: &TxDatabase, txid: &Txid) -> TxRow {
    db.inner.read().rows.get(txid).cloned().expect("row exists")
}

/// Assert the malleation bookkeeping is consistent across the store:
/// confirmed rows have a real height or a malleated marker, sibling rows
/// agree on being malleated, and at most one sibling per ntxid holds a
/// direct confirmation that all its siblings share.
pub(crate) fn assert_store_consistent(db: &TxDatabase) {
    let inner = db.inner.read();
    let rows: Vec<&TxRow> = inner.rows.values().collect();

    for row in &rows {
        match row.state {
            TxState::Confirmed => assert!(
                row.block_height > 0 || row.malleated,
                "confirmed row {} has height {} and is not malleated",
                row.txid,
                row.block_height,
            ),
            TxState::Unconfirmed => assert!(
                !row.master_confirm,
                "unconfirmed row {} holds a direct confirmation",
                row.txid,
            ),
        }
    }

    for a in &rows {
        for b in &rows {
            if a.txid != b.txid && a.ntxid == b.ntxid {
                assert!(
                    a.malleated && b.malleated,
                    "rows {} and {} share ntxid {} but are not both malleated",
                    a.txid,
                    b.txid,
                    a.ntxid,
                );
            }
        }
    }

    for master in rows.iter().filter(|row| row.master_confirm) {
        for sibling in rows.iter().filter(|row| row.ntxid == master.ntxid) {
            if sibling.txid != master.txid {
                assert!(
                    !sibling.master_confirm,
                    "ntxid {} has two direct confirmations",
                    master.ntxid,
                );
            }
            assert_eq!(sibling.state, TxState::Confirmed);
            assert_eq!(sibling.block_height, master.block_height);
        }
    }
}
