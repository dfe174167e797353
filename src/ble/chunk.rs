//! Wire framing for messages larger than the granted MTU.
//!
//! Header layout, 3 bytes per chunk:
//!
//! ```text
//! ┌───────┬──────────────┬─────────────────────┐
//! │ Flags │ Ordinal (BE) │  Payload             │
//! │ (1B)  │ (2B)         │  ≤ mtu − 3 bytes     │
//! └───────┴──────────────┴─────────────────────┘
//! ```
//!
//! Flags: bit 0 = more chunks follow, bit 1 = first chunk of a message.
//! Reassembly is strictly in delivery order; an ordinal gap discards the
//! partial message rather than splicing around it.

use log::warn;

use crate::ble::constants::{CHUNK_HEADER_LEN, MAX_REASSEMBLY_LEN};
use crate::error::BleError;

/// More chunks of this message follow.
pub(crate) const FLAG_MORE: u8 = 0x01;
/// First chunk of a message.
pub(crate) const FLAG_FIRST: u8 = 0x02;

/// Splits `payload` into framed chunks sized for `granted_mtu`. An empty
/// payload still produces one (empty) chunk so the receiver sees a complete
/// message.
pub fn split_message(payload: &[u8], granted_mtu: u16) -> Result<Vec<Vec<u8>>, BleError> {
    let capacity = (granted_mtu as usize)
        .checked_sub(CHUNK_HEADER_LEN)
        .filter(|c| *c > 0)
        .ok_or_else(|| {
            BleError::WriteFailed(format!(
                "granted MTU {granted_mtu} leaves no room for chunk payload"
            ))
        })?;

    let total = payload.len().div_ceil(capacity).max(1);
    if total > usize::from(u16::MAX) + 1 {
        return Err(BleError::WriteFailed(format!(
            "message of {} bytes does not fit in {} chunks",
            payload.len(),
            u16::MAX as u32 + 1
        )));
    }

    let mut chunks = Vec::with_capacity(total);
    for ordinal in 0..total {
        let piece = &payload[ordinal * capacity..payload.len().min((ordinal + 1) * capacity)];
        let mut flags = 0u8;
        if ordinal == 0 {
            flags |= FLAG_FIRST;
        }
        if ordinal < total - 1 {
            flags |= FLAG_MORE;
        }
        let mut chunk = Vec::with_capacity(CHUNK_HEADER_LEN + piece.len());
        chunk.push(flags);
        chunk.extend_from_slice(&(ordinal as u16).to_be_bytes());
        chunk.extend_from_slice(piece);
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// Per-characteristic accumulator for partially received messages.
///
/// Chunks are appended in delivery order. A final chunk (no MORE flag)
/// yields the complete message and clears the buffer. Contract violations
/// (first chunk over a live buffer, ordinal gaps, oversized messages) are
/// logged and discard the partial message; they are never passed off as
/// success.
#[derive(Debug, Default)]
pub struct Reassembler {
    buf: Vec<u8>,
    next_ordinal: u16,
    active: bool,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a message is currently being accumulated.
    pub fn in_progress(&self) -> bool {
        self.active
    }

    /// Feeds one incoming chunk. Returns the complete message when its final
    /// chunk arrives.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        if chunk.len() < CHUNK_HEADER_LEN {
            warn!(
                "dropping malformed {}-byte chunk (header alone is {} bytes)",
                chunk.len(),
                CHUNK_HEADER_LEN
            );
            return None;
        }
        let flags = chunk[0];
        let ordinal = u16::from_be_bytes([chunk[1], chunk[2]]);
        let payload = &chunk[CHUNK_HEADER_LEN..];

        if flags & FLAG_FIRST != 0 {
            if self.active {
                warn!(
                    "first chunk arrived over a live reassembly buffer ({} bytes pending); \
                     peer violated the chunk contract, discarding the partial message",
                    self.buf.len()
                );
            }
            self.reset();
            self.active = true;
        } else if !self.active {
            warn!("continuation chunk {ordinal} with no message in progress, dropped");
            return None;
        }

        if ordinal != self.next_ordinal {
            warn!(
                "chunk ordinal gap (expected {}, got {ordinal}), discarding the partial message",
                self.next_ordinal
            );
            self.reset();
            return None;
        }
        if self.buf.len() + payload.len() > MAX_REASSEMBLY_LEN {
            warn!(
                "reassembled message exceeds {MAX_REASSEMBLY_LEN} bytes, discarding"
            );
            self.reset();
            return None;
        }

        self.buf.extend_from_slice(payload);
        self.next_ordinal = self.next_ordinal.wrapping_add(1);

        if flags & FLAG_MORE == 0 {
            let message = std::mem::take(&mut self.buf);
            self.reset();
            Some(message)
        } else {
            None
        }
    }

    /// Drops any partial message.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.next_ordinal = 0;
        self.active = false;
    }
}
