//! Inner database state protected by the store lock.
//!
//! `TxDbInner` owns the row map and implements every mutation primitive.
//! The public [`TxDatabase`](crate::TxDatabase) wrapper acquires the lock
//! and delegates here, so all methods on this type run with the store lock
//! held.

use crate::error::{Error, Result};
use crate::types::{TxRow, TxState};
use crate::unix_now;
use bitcoin::{Address, Network, Transaction, Txid};
use featherbit_primitives::{Ntxid, compute_ntxid, extract_address};
use std::collections::HashMap;

/// Inner database state (protected by the RwLock in [`crate::TxDatabase`]).
pub(crate) struct TxDbInner {
    /// Primary storage: txid -> row.
    pub(crate) rows: HashMap<Txid, TxRow>,

    /// Highest block height the watcher has reported.
    pub(crate) last_height: i64,
}

impl TxDbInner {
    /// Create empty inner state.
    pub(crate) fn new() -> Self {
        Self {
            rows: HashMap::new(),
            last_height: 0,
        }
    }

    /// All rows sharing the given ntxid, in unspecified order.
    ///
    /// This lookup is the single point of truth for sibling membership;
    /// every malleation-propagating operation goes through it. A linear
    /// scan is fine at wallet scale (hundreds to low thousands of rows).
    pub(crate) fn ntxid_rows(&self, ntxid: &Ntxid) -> impl Iterator<Item = &TxRow> {
        self.rows.values().filter(move |row| row.ntxid == *ntxid)
    }

    /// Insert a transaction the watcher has observed.
    ///
    /// Returns `false` without touching the store if the txid is already
    /// present. A new row starts unconfirmed, but inherits the state and
    /// height of any malleated sibling (same ntxid, different txid), and
    /// marks both sides malleated.
    pub(crate) fn insert(&mut self, tx: Transaction) -> bool {
        let txid = tx.compute_txid();
        if self.rows.contains_key(&txid) {
            return false;
        }
        let ntxid = compute_ntxid(&tx);

        let mut state = TxState::Unconfirmed;
        let mut block_height = 0;
        let mut malleated = false;
        for sibling in self.rows.values_mut().filter(|row| row.ntxid == ntxid) {
            state = sibling.state;
            block_height = sibling.block_height;
            sibling.malleated = true;
            malleated = true;
        }

        self.rows.insert(
            txid,
            TxRow {
                tx,
                txid,
                ntxid,
                state,
                block_height,
                timestamp: unix_now(),
                need_check: false,
                malleated,
                master_confirm: false,
            },
        );
        true
    }

    /// The watcher reported a new chain height.
    pub(crate) fn at_height(&mut self, height: i64) {
        self.last_height = height;

        // Check for blockchain forks:
        self.check_fork(height);
    }

    /// The watcher saw this transaction in a block at `block_height`.
    ///
    /// The confirmation propagates to every malleated sibling. The caller
    /// must have inserted the txid first; reporting an unknown txid is a
    /// watcher bug, not a runtime condition.
    pub(crate) fn confirmed(&mut self, txid: Txid, block_height: i64) {
        let row = self
            .rows
            .get(&txid)
            .expect("confirmed: txid must be in the database");
        let ntxid = row.ntxid;
        let prior_state = row.state;
        let prior_height = row.block_height;

        // A confirmed row moving to a different block means the chain has
        // forked out from under us.
        if prior_state == TxState::Confirmed && prior_height != block_height {
            self.check_fork(prior_height);
        }

        let mut malleated = false;
        for sibling in self
            .rows
            .values_mut()
            .filter(|row| row.ntxid == ntxid && row.txid != txid)
        {
            sibling.state = TxState::Confirmed;
            sibling.block_height = block_height;
            sibling.malleated = true;
            // Only one sibling holds the direct confirmation.
            sibling.master_confirm = false;
            malleated = true;
        }

        let row = self.rows.get_mut(&txid).expect("row looked up above");
        row.state = TxState::Confirmed;
        row.block_height = block_height;
        row.master_confirm = true;
        if malleated {
            row.malleated = true;
        }
    }

    /// The watcher no longer sees this transaction in a block.
    ///
    /// If a sibling still holds a direct confirmation, the row inherits
    /// the sibling's state instead of dropping out. Otherwise the whole
    /// ntxid group becomes unconfirmed, with `-1` heights marking the
    /// malleated-and-unconfirmed case, and the prior height is handed to
    /// fork tracking.
    pub(crate) fn unconfirmed(&mut self, txid: Txid) {
        let row = self
            .rows
            .get(&txid)
            .expect("unconfirmed: txid must be in the database");
        let ntxid = row.ntxid;
        let prior_state = row.state;
        let prior_height = row.block_height;

        let mut state = TxState::Unconfirmed;
        let mut height = 0;
        let mut malleated = row.malleated;

        if prior_state == TxState::Confirmed {
            let master = self
                .ntxid_rows(&ntxid)
                .find(|sibling| sibling.txid != txid && sibling.master_confirm)
                .map(|master| (master.state, master.block_height));

            if let Some((master_state, master_height)) = master {
                // Another txid of this payment was confirmed directly;
                // keep carrying its confirmation.
                state = master_state;
                height = master_height;
            } else {
                let sibling_ids: Vec<Txid> = self
                    .ntxid_rows(&ntxid)
                    .filter(|sibling| sibling.txid != txid)
                    .map(|sibling| sibling.txid)
                    .collect();
                for sibling_id in sibling_ids {
                    tracing::debug!(
                        "Setting tx unconfirmed on malleated ntxid {ntxid}: txid {sibling_id}"
                    );
                    let sibling = self.rows.get_mut(&sibling_id).expect("sibling id from scan");
                    sibling.state = TxState::Unconfirmed;
                    sibling.block_height = -1;
                    sibling.malleated = true;
                    height = -1;
                    malleated = true;
                }
            }
        }

        if state == TxState::Unconfirmed {
            // A confirmed row dropping out of its block (or a repeated
            // unconfirm) suggests a fork around the prior height.
            self.check_fork(prior_height);
        }

        let row = self.rows.get_mut(&txid).expect("row looked up above");
        row.state = state;
        row.block_height = height;
        row.malleated = malleated;
        if state == TxState::Unconfirmed {
            row.master_confirm = false;
        }
    }

    /// Refresh the unconfirmed-observation timestamp; no-op for unknown
    /// txids.
    pub(crate) fn reset_timestamp(&mut self, txid: Txid) {
        if let Some(row) = self.rows.get_mut(&txid) {
            row.timestamp = unix_now();
        }
    }

    /// Reset to an empty database at height 0.
    pub(crate) fn clear(&mut self) {
        self.last_height = 0;
        self.rows.clear();
    }

    /// Block height of a confirmed txid, `0` if unconfirmed or unknown.
    pub(crate) fn txid_height(&self, txid: &Txid) -> i64 {
        match self.rows.get(txid) {
            Some(row) if row.state == TxState::Confirmed => row.block_height,
            _ => 0,
        }
    }

    /// Block height of an ntxid group.
    ///
    /// The height is the maximum among confirmed siblings; `0` if none is
    /// confirmed; `-1` if the group is malleated and entirely unconfirmed
    /// (a signal for the GUI). Fails with [`Error::Synchronizing`] if no
    /// row carries the ntxid yet.
    pub(crate) fn ntxid_height(&self, ntxid: &Ntxid) -> Result<i64> {
        let mut seen = 0usize;
        let mut height = 0;
        for row in self.ntxid_rows(ntxid) {
            seen += 1;
            if row.state == TxState::Confirmed && height < row.block_height {
                height = row.block_height;
            }
        }

        if seen == 0 {
            return Err(Error::Synchronizing);
        }
        if seen > 1 && height == 0 {
            height = -1;
        }
        Ok(height)
    }

    /// The best representative transaction for an ntxid.
    ///
    /// Prefers the directly confirmed sibling, then any confirmed sibling,
    /// then any sibling at all.
    pub(crate) fn ntxid_lookup(&self, ntxid: &Ntxid) -> Option<Transaction> {
        let mut found: Option<&TxRow> = None;
        for row in self.ntxid_rows(ntxid) {
            match found {
                None => found = Some(row),
                Some(_) if row.state == TxState::Confirmed => found = Some(row),
                Some(_) => {}
            }
            if row.master_confirm {
                return Some(row.tx.clone());
            }
        }
        found.map(|row| row.tx.clone())
    }

    /// Whether any stored transaction pays the given address.
    ///
    /// Outputs only; inputs alone do not prove history of an address.
    pub(crate) fn has_history(&self, address: &Address, network: Network) -> bool {
        self.rows.values().any(|row| {
            row.tx.output.iter().any(|output| {
                extract_address(&output.script_pubkey, network)
                    .is_some_and(|candidate| candidate == *address)
            })
        })
    }
}
