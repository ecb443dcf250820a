//! Binary serialization of the transaction database.
//!
//! The on-disk layout is a 4-byte magic, the last block height, and a
//! sequence of tagged row records. The magic discriminates versions: the
//! pre-malleation-tracking format is rejected with a distinguishable error
//! so the caller can trigger a rescan instead of misreading old data.
//!
//! Unconfirmed rows reuse the height slot to carry their observation
//! timestamp, and rows whose timestamp has aged past the configured
//! unconfirmed timeout are silently dropped on the way out.

use crate::error::ParseError;
use crate::inner::TxDbInner;
use crate::types::{TxRow, TxState};
use crate::unix_now;
use bitcoin::consensus;
use bitcoin::hashes::Hash;
use bitcoin::{Transaction, Txid};
use featherbit_primitives::Ntxid;
use std::collections::HashMap;
use std::time::Duration;

/// Magic of the pre-malleation-tracking format, rejected on load.
const LEGACY_MAGIC: u32 = 0x3eab_61c3;
/// Magic identifying the current database format.
const SERIAL_MAGIC: u32 = 0xfecd_b763;
/// Tag byte introducing a row record.
const SERIAL_TX: u8 = 0x42;

impl TxDbInner {
    /// Serialize the database into a caller-owned byte blob.
    ///
    /// Infallible: the output is built in memory. Stale unconfirmed rows
    /// are skipped; they remain live in the store until a reload.
    pub(crate) fn serialize(&self, unconfirmed_timeout: Duration) -> Vec<u8> {
        let now = unix_now();
        let timeout = unconfirmed_timeout.as_secs() as i64;

        let mut out = Vec::new();

        // Magic version bytes:
        out.extend_from_slice(&SERIAL_MAGIC.to_le_bytes());

        // Last block height:
        out.extend_from_slice(&self.last_height.to_le_bytes());

        // Row records:
        for (txid, row) in &self.rows {
            // Don't save old unconfirmed transactions:
            if row.state == TxState::Unconfirmed && row.timestamp + timeout < now {
                tracing::debug!("Purging unconfirmed tx {txid}");
                continue;
            }

            // Unconfirmed rows smuggle their timestamp through the height
            // slot; it is put back on load.
            let height = match row.state {
                TxState::Unconfirmed => row.timestamp,
                TxState::Confirmed => row.block_height,
            };

            out.push(SERIAL_TX);
            out.extend_from_slice(txid.as_byte_array());
            out.extend_from_slice(&consensus::serialize(&row.tx));
            out.push(row.state as u8);
            out.extend_from_slice(&height.to_le_bytes());
            out.push(row.need_check as u8);
            out.extend_from_slice(row.txid.as_byte_array());
            out.extend_from_slice(row.ntxid.as_byte_array());
            out.push(row.malleated as u8);
            out.push(row.master_confirm as u8);
        }

        out
    }
}

/// Parse a serialized database blob into fresh inner state.
///
/// The caller swaps the result in under the store lock, so a parse
/// failure leaves the live database untouched.
pub(crate) fn deserialize(data: &[u8]) -> Result<TxDbInner, ParseError> {
    let mut reader = Reader::new(data);

    // Header bytes:
    let magic = reader.read_u32_le()?;
    if magic != SERIAL_MAGIC {
        return Err(if magic == LEGACY_MAGIC {
            ParseError::OutdatedFormat
        } else {
            ParseError::UnknownHeader
        });
    }

    // Last block height:
    let last_height = reader.read_i64_le()?;

    let now = unix_now();
    let mut rows = HashMap::new();
    while !reader.is_empty() {
        if reader.read_u8()? != SERIAL_TX {
            return Err(ParseError::UnknownEntry);
        }

        let key = Txid::from_byte_array(reader.read_hash()?);
        let tx = reader.read_tx()?;
        let state = TxState::from_byte(reader.read_u8()?).ok_or(ParseError::UnknownEntry)?;
        let height_slot = reader.read_i64_le()?;
        let need_check = reader.read_u8()? != 0;
        let txid = Txid::from_byte_array(reader.read_hash()?);
        let ntxid = Ntxid::from_byte_array(reader.read_hash()?);
        let malleated = reader.read_u8()? != 0;
        let master_confirm = reader.read_u8()? != 0;

        // Unconfirmed rows carried their timestamp in the height slot;
        // confirmed rows are considered freshly observed.
        let (block_height, timestamp) = match state {
            TxState::Unconfirmed => (0, height_slot),
            TxState::Confirmed => (height_slot, now),
        };

        rows.insert(
            key,
            TxRow {
                tx,
                txid,
                ntxid,
                state,
                block_height,
                timestamp,
                need_check,
                malleated,
                master_confirm,
            },
        );
    }

    Ok(TxDbInner { rows, last_height })
}

/// Cursor over a serialized blob; every read fails with
/// [`ParseError::Truncated`] once the data runs out.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(ParseError::Truncated)?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.take(1)?[0])
    }

    fn read_u32_le(&mut self) -> Result<u32, ParseError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("4 bytes taken")))
    }

    fn read_i64_le(&mut self) -> Result<i64, ParseError> {
        let bytes = self.take(8)?;
        Ok(i64::from_le_bytes(bytes.try_into().expect("8 bytes taken")))
    }

    fn read_hash(&mut self) -> Result<[u8; 32], ParseError> {
        let bytes = self.take(32)?;
        Ok(bytes.try_into().expect("32 bytes taken"))
    }

    /// Decode a consensus-encoded transaction in place.
    fn read_tx(&mut self) -> Result<Transaction, ParseError> {
        let (tx, consumed) = consensus::deserialize_partial(&self.data[self.pos..])
            .map_err(|_| ParseError::Truncated)?;
        self.pos += consumed;
        Ok(tx)
    }
}
