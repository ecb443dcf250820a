//! Shared wallet-side primitives for featherbit.
//!
//! The block watcher, the transaction database, and the wallet query paths
//! all speak in terms of these types. Bitcoin primitives themselves
//! (transactions, scripts, addresses, hashes) come from the `bitcoin`
//! crate; this crate only adds the light-wallet vocabulary around them.

use bitcoin::consensus;
use bitcoin::hashes::{Hash, sha256d};
use bitcoin::{Address, Amount, Network, OutPoint, Script, ScriptBuf, Transaction, TxIn, Witness};
use std::collections::HashSet;

/// Normalized transaction id: the double-SHA-256 of a transaction with all
/// input scripts and witnesses cleared before hashing.
///
/// Every malleation of one logical payment shares a single ntxid, so state
/// keyed by ntxid survives signature malleability. Computed with
/// [`compute_ntxid`].
pub type Ntxid = sha256d::Hash;

/// The set of payment addresses owned by the wallet.
pub type AddressSet = HashSet<Address>;

/// A spendable transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    /// The outpoint identifying this output.
    pub outpoint: OutPoint,
    /// The output value.
    pub value: Amount,
}

/// Compute the normalized transaction id.
///
/// The `bitcoin` crate has no normalized id, so it is reproduced here:
/// every input's signature script is set to empty (witnesses too, which
/// keeps the encoding in the legacy form) and the result is
/// consensus-serialized and double-SHA-256 hashed. Two transactions that
/// differ only in their signatures hash to the same ntxid.
pub fn compute_ntxid(tx: &Transaction) -> Ntxid {
    let normalized = Transaction {
        version: tx.version,
        lock_time: tx.lock_time,
        input: tx
            .input
            .iter()
            .map(|input| TxIn {
                previous_output: input.previous_output,
                script_sig: ScriptBuf::new(),
                sequence: input.sequence,
                witness: Witness::default(),
            })
            .collect(),
        output: tx.output.clone(),
    };
    sha256d::Hash::hash(&consensus::serialize(&normalized))
}

/// Decode an output script into a payment address.
///
/// Returns `None` for scripts with no standard address form on the given
/// network.
pub fn extract_address(script: &Script, network: Network) -> Option<Address> {
    Address::from_script(script, network).ok()
}
