//! # PaVE Video Framing
//!
//! Version 2 peers send H.264 over a TCP byte stream. Every encoded unit is
//! preceded by a little-endian "PaVE" header giving its own size and the size
//! of the payload that follows. [`PaveCodec`] splits the stream into
//! [`PaveFrame`]s and resynchronises on the signature after garbage.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::warn;

use crate::error::{DroneLinkError, Result};

/// Header signature
pub const PAVE_SIGNATURE: &[u8; 4] = b"PaVE";

/// Bytes of the header that carry the fields decoded here
pub const PAVE_MIN_HEADER_SIZE: usize = 32;

/// Upper bound for a single encoded frame
pub const PAVE_MAX_PAYLOAD_SIZE: usize = 1 << 20;

/// Video codec identifiers carried in the PaVE header
pub mod codec {
    pub const UVLC: u8 = 1;
    pub const MPEG4: u8 = 2;
    pub const H264: u8 = 4;
}

/// Frame types
pub mod frame_type {
    pub const IDR: u8 = 1;
    pub const I: u8 = 2;
    pub const P: u8 = 3;
}

/// Decoded PaVE header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaveHeader {
    pub version: u8,
    pub codec: u8,
    /// Total header size including the signature
    pub header_size: u16,
    /// Encoded payload size following the header
    pub payload_size: u32,
    pub encoded_width: u16,
    pub encoded_height: u16,
    pub display_width: u16,
    pub display_height: u16,
    pub frame_number: u32,
    /// Milliseconds
    pub timestamp: u32,
    pub frame_type: u8,
}

/// One encoded unit read from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaveFrame {
    pub header: PaveHeader,
    pub payload: Bytes,
}

/// Parse a PaVE header from the start of `buf`
///
/// # Errors
///
/// Returns error if the signature is missing, the buffer is shorter than
/// [`PAVE_MIN_HEADER_SIZE`], or the declared header size is inconsistent.
pub fn parse_pave_header(buf: &[u8]) -> Result<PaveHeader> {
    if buf.len() < PAVE_MIN_HEADER_SIZE {
        return Err(DroneLinkError::Video(format!(
            "PaVE header too short: {} bytes",
            buf.len()
        )));
    }
    if &buf[..4] != PAVE_SIGNATURE {
        return Err(DroneLinkError::Video("Missing PaVE signature".to_string()));
    }

    let mut cursor = &buf[4..];
    let version = cursor.get_u8();
    let codec = cursor.get_u8();
    let header_size = cursor.get_u16_le();
    let payload_size = cursor.get_u32_le();
    let encoded_width = cursor.get_u16_le();
    let encoded_height = cursor.get_u16_le();
    let display_width = cursor.get_u16_le();
    let display_height = cursor.get_u16_le();
    let frame_number = cursor.get_u32_le();
    let timestamp = cursor.get_u32_le();
    let _total_chunks = cursor.get_u8();
    let _chunk_index = cursor.get_u8();
    let frame_type = cursor.get_u8();

    if (header_size as usize) < PAVE_MIN_HEADER_SIZE {
        return Err(DroneLinkError::Video(format!(
            "PaVE header declares {} bytes",
            header_size
        )));
    }

    Ok(PaveHeader {
        version,
        codec,
        header_size,
        payload_size,
        encoded_width,
        encoded_height,
        display_width,
        display_height,
        frame_number,
        timestamp,
        frame_type,
    })
}

/// Stream decoder producing one [`PaveFrame`] per encoded unit
#[derive(Debug, Default)]
pub struct PaveCodec {
    /// Bytes dropped while searching for a signature
    skipped: usize,
}

impl PaveCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes discarded while resynchronising
    pub fn skipped_bytes(&self) -> usize {
        self.skipped
    }
}

impl Decoder for PaveCodec {
    type Item = PaveFrame;
    type Error = DroneLinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<PaveFrame>> {
        loop {
            // Resync on the signature
            match src.windows(4).position(|w| w == PAVE_SIGNATURE) {
                Some(0) => {}
                Some(pos) => {
                    warn!("Dropping {} bytes before PaVE signature", pos);
                    self.skipped += pos;
                    src.advance(pos);
                }
                None => {
                    // Keep a possible partial signature at the tail
                    let keep = src.len().min(3);
                    let drop = src.len() - keep;
                    if drop > 0 {
                        self.skipped += drop;
                        src.advance(drop);
                    }
                    return Ok(None);
                }
            }

            if src.len() < PAVE_MIN_HEADER_SIZE {
                return Ok(None);
            }

            let header = match parse_pave_header(&src[..]) {
                Ok(header) => header,
                Err(e) => {
                    warn!("Skipping corrupt PaVE header: {}", e);
                    self.skipped += 1;
                    src.advance(1);
                    continue;
                }
            };

            let payload_size = header.payload_size as usize;
            if payload_size > PAVE_MAX_PAYLOAD_SIZE {
                warn!("Skipping PaVE unit with {} byte payload", payload_size);
                self.skipped += 1;
                src.advance(1);
                continue;
            }

            let total = header.header_size as usize + payload_size;
            if src.len() < total {
                src.reserve(total - src.len());
                return Ok(None);
            }

            src.advance(header.header_size as usize);
            let payload = src.split_to(payload_size).freeze();
            return Ok(Some(PaveFrame { header, payload }));
        }
    }
}

#[cfg(test)]
pub(crate) mod test_frames {
    use super::*;

    /// Build a 64-byte PaVE header followed by `payload`
    pub fn pave_unit(width: u16, height: u16, frame_number: u32, payload: &[u8]) -> Vec<u8> {
        let mut unit = Vec::with_capacity(64 + payload.len());
        unit.extend_from_slice(PAVE_SIGNATURE);
        unit.push(3);
        unit.push(codec::H264);
        unit.extend_from_slice(&64u16.to_le_bytes());
        unit.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        unit.extend_from_slice(&width.to_le_bytes());
        unit.extend_from_slice(&height.to_le_bytes());
        unit.extend_from_slice(&width.to_le_bytes());
        unit.extend_from_slice(&height.to_le_bytes());
        unit.extend_from_slice(&frame_number.to_le_bytes());
        unit.extend_from_slice(&(frame_number * 33).to_le_bytes());
        unit.extend_from_slice(&[1, 0, frame_type::P]);
        unit.resize(64, 0);
        unit.extend_from_slice(payload);
        unit
    }
}
