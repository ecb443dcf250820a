//! Blockchain re-organization tracking.

use crate::inner::TxDbInner;
use crate::types::TxState;

impl TxDbInner {
    /// The chain may have forked around `height`: mark every confirmed
    /// row at the next-lower populated height as needing re-verification.
    ///
    /// The watcher later drains the flagged rows through
    /// [`foreach_forked`](crate::TxDatabase::foreach_forked) and re-checks
    /// them against the network. Runs with the store lock held.
    pub(crate) fn check_fork(&mut self, height: i64) {
        // Height of the next-lower block that has transactions in it.
        let mut prev_height = 0;
        for row in self.rows.values() {
            if row.state == TxState::Confirmed
                && row.block_height < height
                && prev_height < row.block_height
            {
                prev_height = row.block_height;
            }
        }

        // Mark all transactions at that level as needing checked.
        for row in self.rows.values_mut() {
            if row.state == TxState::Confirmed && row.block_height == prev_height {
                row.need_check = true;
            }
        }
    }
}
