use log::{debug, warn};

use crate::crc::checksum;
use crate::error::{Gt06Error, Result};

/// GT06 frame start marker.
pub const START: [u8; 2] = [0x78, 0x78];
/// GT06 frame end marker.
pub const END: [u8; 2] = [0x0D, 0x0A];

/// Wire bytes not covered by the length field: start(2) + length(1) + end(2).
const OVERHEAD: usize = 5;
/// The length byte covers protocol id (1) + payload + checksum (2).
const LENGTH_BASE: usize = 3;
/// Largest payload that still fits the 1-byte length field.
pub const MAX_PAYLOAD: usize = 0xFF - LENGTH_BASE;

/// A parsed GT06 frame.
///
/// Wire format: `78 78 <length> <protocol id> <payload…> <checksum BE> 0D 0A`
/// where `length` counts protocol id, payload and checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub protocol_id: u8,
    pub payload: Vec<u8>,
    /// Whether the embedded checksum matched the recomputed one. Frames
    /// that fail verification are still parsed structurally; the session
    /// layer decides whether to tolerate them.
    pub checksum_ok: bool,
}

impl Frame {
    /// Create an outbound frame. The checksum is computed at encode time.
    pub fn new(protocol_id: u8, payload: Vec<u8>) -> Self {
        Self {
            protocol_id,
            payload,
            checksum_ok: true,
        }
    }

    /// Serialize the frame with a freshly computed checksum.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(Gt06Error::OversizedPayload(self.payload.len()));
        }
        let length = (LENGTH_BASE + self.payload.len()) as u8;

        let mut body = Vec::with_capacity(2 + self.payload.len());
        body.push(length);
        body.push(self.protocol_id);
        body.extend_from_slice(&self.payload);
        let crc = checksum(&body);

        let mut bytes = Vec::with_capacity(body.len() + 6);
        bytes.extend_from_slice(&START);
        bytes.extend_from_slice(&body);
        bytes.extend_from_slice(&crc.to_be_bytes());
        bytes.extend_from_slice(&END);
        Ok(bytes)
    }

    /// Fail unless the embedded checksum matched on decode.
    pub fn verify(&self) -> Result<()> {
        if self.checksum_ok {
            Ok(())
        } else {
            Err(Gt06Error::ChecksumMismatch)
        }
    }
}

/// Incremental frame decoder.
///
/// The transport may deliver partial reads, so raw bytes accumulate here
/// and only complete frames are consumed; any trailing remainder stays
/// queued for the next read.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(256),
        }
    }

    /// Append raw bytes received from the transport.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Try to consume the next complete frame.
    ///
    /// Returns `Ok(None)` when the buffered data ends mid-frame — wait for
    /// more input, this is not an error. A frame whose trailing bytes are
    /// not `0D 0A` yields `InvalidEndMarker`; the offending start marker is
    /// consumed so the next call resynchronizes on later data.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self
                .buf
                .windows(2)
                .position(|w| w[0] == START[0] && w[1] == START[1])
            {
                Some(0) => {}
                Some(noise) => {
                    debug!("discarding {noise} noise byte(s) before start marker");
                    self.buf.drain(..noise);
                }
                None => {
                    // Keep a trailing 0x78 in case its partner is still in flight.
                    let keep = usize::from(self.buf.last() == Some(&START[0]));
                    let noise = self.buf.len() - keep;
                    if noise > 0 {
                        debug!("discarding {noise} noise byte(s), no start marker");
                        self.buf.drain(..noise);
                    }
                    return Ok(None);
                }
            }

            if self.buf.len() < 3 {
                return Ok(None);
            }
            let length = usize::from(self.buf[2]);
            if length < LENGTH_BASE {
                // Cannot even hold protocol id + checksum; treat as noise.
                warn!("frame length {length} too small, resynchronizing");
                self.buf.drain(..2);
                continue;
            }
            let total = length + OVERHEAD;
            if self.buf.len() < total {
                return Ok(None);
            }

            if self.buf[total - 2..total] != END {
                warn!("frame of {total} bytes does not end with 0D 0A, resynchronizing");
                self.buf.drain(..2);
                return Err(Gt06Error::InvalidEndMarker);
            }

            let protocol_id = self.buf[3];
            let payload = self.buf[4..total - 4].to_vec();
            let received = u16::from_be_bytes([self.buf[total - 4], self.buf[total - 3]]);
            let computed = checksum(&self.buf[2..total - 4]);
            let checksum_ok = computed == received;
            if !checksum_ok {
                warn!(
                    "checksum mismatch on protocol {protocol_id:#04x} frame: \
                     computed {computed:#06x}, received {received:#06x}"
                );
            }

            self.buf.drain(..total);
            return Ok(Some(Frame {
                protocol_id,
                payload,
                checksum_ok,
            }));
        }
    }
}
