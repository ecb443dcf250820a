//! # Light-wallet transaction database
//!
//! In-memory, serializable store of every transaction the wallet watcher
//! has observed, plus the analysis that decides which unspent outputs are
//! safe to spend.
//!
//! 1. Transaction graph.
//!     - Rows reference each other through their inputs' previous outputs
//!       and are walked recursively during spend-safety checks.
//! 2. Malleability.
//!     - Rows sharing a normalized txid (ntxid) are siblings of one
//!       logical payment; confirmation state is reconciled across all of
//!       them.
//! 3. Re-organizations.
//!     - Height changes and un-confirmations flag the surrounding rows
//!       for re-verification by the watcher.
//! 4. Persistence.
//!     - The whole store round-trips through a versioned binary blob;
//!       stale unconfirmed rows are dropped on the way out.
//!
//! A single lock covers the whole store: every public operation acquires
//! it on entry and is atomic under it. The `foreach_*` callbacks run with
//! the lock held and must not call back into the database.

mod codec;
mod error;
mod fork;
mod inner;
mod options;
mod safety;
#[cfg(test)]
mod tests;
mod types;

pub use self::error::{Error, ParseError, Result};
pub use self::options::TxDatabaseOptions;
pub use self::types::{TxRow, TxState};

use self::inner::TxDbInner;
use bitcoin::{Address, Transaction, Txid};
use featherbit_primitives::{AddressSet, Ntxid, OutputInfo, extract_address};
use parking_lot::RwLock;

/// Current wall time in unix seconds.
pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs() as i64
}

/// Thread-safe transaction database for a light wallet.
///
/// The background block watcher inserts transactions and reports
/// confirmation and height events; foreground query paths read balances
/// and spendable outputs. Both go through this type, which serializes all
/// access behind one lock.
pub struct TxDatabase {
    /// Configuration (immutable after creation).
    options: TxDatabaseOptions,

    /// Thread-safe inner state.
    inner: RwLock<TxDbInner>,
}

impl TxDatabase {
    /// Create an empty database.
    pub fn new(options: TxDatabaseOptions) -> Self {
        Self {
            options,
            inner: RwLock::new(TxDbInner::new()),
        }
    }

    /// The configuration this database was created with.
    pub fn options(&self) -> &TxDatabaseOptions {
        &self.options
    }

    /// The highest block height the watcher has reported.
    pub fn last_height(&self) -> i64 {
        self.inner.read().last_height
    }

    /// Whether a row with this txid exists.
    pub fn txid_exists(&self, txid: &Txid) -> bool {
        self.inner.read().rows.contains_key(txid)
    }

    /// Whether any row carries this ntxid.
    pub fn ntxid_exists(&self, ntxid: &Ntxid) -> bool {
        self.inner.read().ntxid_rows(ntxid).next().is_some()
    }

    /// The stored transaction for a txid.
    pub fn txid_lookup(&self, txid: &Txid) -> Option<Transaction> {
        self.inner.read().rows.get(txid).map(|row| row.tx.clone())
    }

    /// The best representative transaction for an ntxid: the directly
    /// confirmed sibling if any, else any confirmed sibling, else any
    /// sibling.
    pub fn ntxid_lookup(&self, ntxid: &Ntxid) -> Option<Transaction> {
        self.inner.read().ntxid_lookup(ntxid)
    }

    /// Block height of a confirmed txid, `0` if unconfirmed or unknown.
    pub fn txid_height(&self, txid: &Txid) -> i64 {
        self.inner.read().txid_height(txid)
    }

    /// Block height of an ntxid group: the maximum among confirmed
    /// siblings, `0` if none is confirmed, `-1` if the group is malleated
    /// and entirely unconfirmed. Fails with [`Error::Synchronizing`] when
    /// the ntxid has not been observed yet.
    pub fn ntxid_height(&self, ntxid: &Ntxid) -> Result<i64> {
        self.inner.read().ntxid_height(ntxid)
    }

    /// Whether any stored transaction pays the given address. Outputs
    /// only; inputs alone do not prove history of an address.
    pub fn has_history(&self, address: &Address) -> bool {
        self.inner.read().has_history(address, self.options.network)
    }

    /// The unspent outputs the wallet may safely spend.
    ///
    /// An output qualifies if it is unspent within the store, pays one of
    /// `addresses`, and its transaction passes the recursive double-spend
    /// check. With `filter` set, unconfirmed transactions must also spend
    /// only wallet inputs, which keeps unconfirmed change and rejects
    /// unconfirmed receives.
    pub fn get_utxos(&self, addresses: &AddressSet, filter: bool) -> Vec<OutputInfo> {
        self.inner
            .read()
            .get_utxos(addresses, filter, self.options.network)
    }

    /// Insert a transaction the watcher has observed. Returns `false` if
    /// the txid is already present; malleated siblings are reconciled on
    /// the way in.
    pub fn insert(&self, tx: Transaction) -> bool {
        self.inner.write().insert(tx)
    }

    /// The watcher reported a new chain height; prior-height rows are
    /// flagged for fork re-checks.
    pub fn at_height(&self, height: i64) {
        self.inner.write().at_height(height)
    }

    /// The watcher saw this transaction in a block at `block_height`.
    /// The confirmation propagates to every malleated sibling.
    ///
    /// # Panics
    ///
    /// If the txid was never inserted; that is a bug in the watcher
    /// contract, not a runtime condition.
    pub fn confirmed(&self, txid: Txid, block_height: i64) {
        self.inner.write().confirmed(txid, block_height)
    }

    /// The watcher no longer sees this transaction in a block. Malleated
    /// siblings either hand back their direct confirmation or drop to
    /// unconfirmed with it.
    ///
    /// # Panics
    ///
    /// If the txid was never inserted; that is a bug in the watcher
    /// contract, not a runtime condition.
    pub fn unconfirmed(&self, txid: Txid) {
        self.inner.write().unconfirmed(txid)
    }

    /// Refresh a row's unconfirmed-observation timestamp, deferring its
    /// purge-on-serialize. No-op for unknown txids.
    pub fn reset_timestamp(&self, txid: Txid) {
        self.inner.write().reset_timestamp(txid)
    }

    /// Invoke `f` for every row that is not confirmed.
    ///
    /// The callback runs with the store lock held: it must be short and
    /// must not call back into the database.
    pub fn foreach_unconfirmed(&self, mut f: impl FnMut(Txid)) {
        let inner = self.inner.read();
        for (txid, row) in &inner.rows {
            if row.state != TxState::Confirmed {
                f(*txid);
            }
        }
    }

    /// Invoke `f` for every confirmed row flagged for a fork re-check.
    ///
    /// The callback runs with the store lock held: it must be short and
    /// must not call back into the database.
    pub fn foreach_forked(&self, mut f: impl FnMut(Txid)) {
        let inner = self.inner.read();
        for (txid, row) in &inner.rows {
            if row.state == TxState::Confirmed && row.need_check {
                f(*txid);
            }
        }
    }

    /// Reset to an empty database at height 0.
    pub fn clear(&self) {
        self.inner.write().clear()
    }

    /// Serialize the database into a caller-owned byte blob. Stale
    /// unconfirmed rows are dropped from the blob but stay live in the
    /// store until a reload.
    pub fn serialize(&self) -> Vec<u8> {
        self.inner
            .read()
            .serialize(self.options.unconfirmed_timeout)
    }

    /// Replace the database contents with a previously serialized blob.
    ///
    /// On any parse failure the live contents are left untouched; the
    /// caller should discard the blob and start empty.
    pub fn load(&self, data: &[u8]) -> Result<()> {
        let parsed = codec::deserialize(data)?;
        let last_height = parsed.last_height;
        *self.inner.write() = parsed;
        tracing::info!("Loaded transaction database at height {last_height}");
        Ok(())
    }

    /// Write a human-readable dump of the store, for debugging.
    pub fn dump(&self, out: &mut impl std::io::Write) -> std::io::Result<()> {
        let inner = self.inner.read();
        writeln!(out, "height: {}", inner.last_height)?;
        for (txid, row) in &inner.rows {
            writeln!(out, "================")?;
            writeln!(out, "hash: {txid}")?;
            match row.state {
                TxState::Unconfirmed => {
                    writeln!(out, "state: unconfirmed")?;
                    writeln!(out, "timestamp: {}", row.timestamp)?;
                }
                TxState::Confirmed => {
                    writeln!(out, "state: confirmed")?;
                    writeln!(out, "height: {}", row.block_height)?;
                    if row.need_check {
                        writeln!(out, "needs check.")?;
                    }
                }
            }
            for input in &row.tx.input {
                writeln!(out, "input: {}", input.previous_output)?;
            }
            for output in &row.tx.output {
                if let Some(address) = extract_address(&output.script_pubkey, self.options.network)
                {
                    writeln!(out, "output: {address} {}", output.value.to_sat())?;
                }
            }
        }
        Ok(())
    }
}
