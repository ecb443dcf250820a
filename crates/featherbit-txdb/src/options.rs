//! Configuration for the transaction database.

use bitcoin::Network;
use std::time::Duration;

/// Configuration options for the transaction database.
#[derive(Clone, Debug)]
pub struct TxDatabaseOptions {
    /// Network used to decode output scripts into payment addresses.
    pub network: Network,

    /// How long an unconfirmed transaction survives across restarts.
    /// Rows that have been unconfirmed for longer are dropped when the
    /// database is serialized.
    pub unconfirmed_timeout: Duration,
}

impl Default for TxDatabaseOptions {
    fn default() -> Self {
        Self {
            network: Network::Bitcoin,
            unconfirmed_timeout: Duration::from_secs(14 * 24 * 3600), // 2 weeks
        }
    }
}

impl TxDatabaseOptions {
    /// Options for the given network with the default timeout.
    pub fn new(network: Network) -> Self {
        Self {
            network,
            ..Default::default()
        }
    }
}
