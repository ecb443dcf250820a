//! Row model for the transaction database.

use bitcoin::{Transaction, Txid};
use featherbit_primitives::Ntxid;

/// Confirmation state of a stored transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TxState {
    /// Seen on the network but not yet included in a block.
    Unconfirmed = 0,
    /// Included in a block known to the wallet.
    Confirmed = 1,
}

impl TxState {
    /// Decode the serialized state byte.
    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Unconfirmed),
            1 => Some(Self::Confirmed),
            _ => None,
        }
    }
}

/// A stored transaction together with its wallet-side bookkeeping.
#[derive(Debug, Clone)]
pub struct TxRow {
    /// The full transaction.
    pub tx: Transaction,
    /// Hash of the canonical transaction bytes.
    pub txid: Txid,
    /// Normalized hash, equal across all malleations of the same payment.
    pub ntxid: Ntxid,
    /// Confirmation state.
    pub state: TxState,
    /// Block height when confirmed. `0` when unconfirmed, `-1` when
    /// unconfirmed and malleated (an in-band hint for the GUI).
    pub block_height: i64,
    /// Unix seconds when the row was last observed unconfirmed. Only used
    /// to purge stale unconfirmed rows during serialization.
    pub timestamp: i64,
    /// Set by fork tracking to request re-verification by the watcher.
    pub need_check: bool,
    /// Another row with the same ntxid exists.
    pub malleated: bool,
    /// This txid, not merely a sibling, was directly reported confirmed.
    pub master_confirm: bool,
}
