//! Wire frame: a fixed 12-byte header followed by the application payload.
//!
//! ```text
//! byte 0-3  : checksum (u32, little-endian)
//! byte 4    : flags    (bit0 terminal, bit1 requires ack, bit2 is ack)
//! byte 5    : tag
//! byte 6-7  : seq id   (u16, little-endian)
//! byte 8-11 : radio id (u32, little-endian)
//! byte 12.. : payload  (1..=MAX_PAYLOAD bytes)
//! ```
//!
//! The checksum is a CRC-32 over the shared phrase (when non-zero), the eight
//! header bytes following the checksum field and the payload. It only guards
//! against corruption, anybody knowing the phrase can forge a valid frame.
use bitflags::bitflags;

use crate::{RadioId, SeqId};

/// Largest packet the LoRa transport carries.
pub const MAX_PACKET_SIZE: usize = 255;
/// Encoded size of [FrameHeader].
pub const HEADER_SIZE: usize = 12;
/// Largest payload that fits in a single packet after the header.
pub const MAX_PAYLOAD: usize = MAX_PACKET_SIZE - HEADER_SIZE;
/// Tag reserved for "unknown" payloads, never dispatched.
pub const TAG_UNKNOWN: u8 = 0;

const CHECKSUM_SIZE: usize = 4;

bitflags! {
    /// Header flags. Bits 3 to 7 are reserved, written as zero and ignored on read.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FrameFlags: u8 {
        /// The sender is a Terminal (not a Gateway).
        const TERMINAL = 0b0000_0001;
        /// The receiver must reply with an acknowledgment.
        const REQUIRES_ACK = 0b0000_0010;
        /// This frame acknowledges the frame carrying the same seq id.
        const ACK = 0b0000_0100;
    }
}

/// Decoded frame header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Integrity code as found on the wire (zero on headers built for encoding).
    pub checksum: u32,
    pub flags: FrameFlags,
    /// Payload type, see [TAG_UNKNOWN].
    pub tag: u8,
    /// Sender assigned sequence number, correlates acknowledgments.
    pub seq_id: SeqId,
    /// Serial of the Terminal this frame is addressed to or coming from.
    pub radio_id: RadioId,
}

/// Borrowed view of a validated frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Frame<'a> {
    pub header: FrameHeader,
    pub payload: &'a [u8],
}

impl FrameHeader {
    pub fn new(flags: FrameFlags, tag: u8, seq_id: SeqId, radio_id: RadioId) -> Self {
        Self {
            checksum: 0,
            flags,
            tag,
            seq_id,
            radio_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.flags.contains(FrameFlags::TERMINAL)
    }

    pub fn requires_ack(&self) -> bool {
        self.flags.contains(FrameFlags::REQUIRES_ACK)
    }

    pub fn is_ack(&self) -> bool {
        self.flags.contains(FrameFlags::ACK)
    }

    /// Header bytes covered by the checksum, in wire order.
    fn fields(&self) -> [u8; HEADER_SIZE - CHECKSUM_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE - CHECKSUM_SIZE];
        bytes[0] = self.flags.bits();
        bytes[1] = self.tag;
        bytes[2..4].copy_from_slice(&self.seq_id.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.radio_id.to_le_bytes());
        bytes
    }
}

/// Frame encoder/decoder bound to the phrase shared by both ends.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameCodec {
    phrase: u8,
}

impl FrameCodec {
    /// Builds a codec, `phrase == 0` disables phrase mixing.
    pub fn new(phrase: u8) -> Self {
        Self { phrase }
    }

    /// CRC-32 over the phrase (if any), the checksummed header bytes and the payload.
    pub fn checksum(&self, fields: &[u8], payload: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        if self.phrase != 0 {
            hasher.update(&[self.phrase]);
        }
        hasher.update(fields);
        hasher.update(payload);
        hasher.finalize()
    }

    /// Checksum a frame made of `header` and `payload` carries on the wire.
    pub fn frame_checksum(&self, header: &FrameHeader, payload: &[u8]) -> u32 {
        self.checksum(&header.fields(), payload)
    }

    /// Writes header and payload into `out`, returning the number of bytes used.
    ///
    /// The `checksum` field of `header` is ignored and recomputed.
    pub fn encode_into(
        &self,
        header: &FrameHeader,
        payload: &[u8],
        out: &mut [u8; MAX_PACKET_SIZE],
    ) -> Result<usize, FrameError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
            });
        }
        let fields = header.fields();
        let checksum = self.checksum(&fields, payload);
        let len = HEADER_SIZE + payload.len();
        out[..CHECKSUM_SIZE].copy_from_slice(&checksum.to_le_bytes());
        out[CHECKSUM_SIZE..HEADER_SIZE].copy_from_slice(&fields);
        out[HEADER_SIZE..len].copy_from_slice(payload);
        Ok(len)
    }

    /// Allocating variant of [encode_into](FrameCodec::encode_into).
    pub fn encode(&self, header: &FrameHeader, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let len = self.encode_into(header, payload, &mut buf)?;
        Ok(buf[..len].to_vec())
    }

    /// Validates `bytes` and splits it into header and payload.
    ///
    /// A header-only frame is rejected: every application frame carries at least one byte.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Frame<'a>, FrameError> {
        if bytes.len() < HEADER_SIZE + 1 {
            return Err(FrameError::TooSmall { size: bytes.len() });
        }
        let mut raw = [0u8; CHECKSUM_SIZE];
        raw.copy_from_slice(&bytes[..CHECKSUM_SIZE]);
        let expected = u32::from_le_bytes(raw);
        let fields = &bytes[CHECKSUM_SIZE..HEADER_SIZE];
        let payload = &bytes[HEADER_SIZE..];
        let actual = self.checksum(fields, payload);
        if expected != actual {
            return Err(FrameError::ChecksumMismatch { expected, actual });
        }

        let mut seq_raw = [0u8; 2];
        seq_raw.copy_from_slice(&fields[2..4]);
        let mut radio_raw = [0u8; 4];
        radio_raw.copy_from_slice(&fields[4..8]);
        Ok(Frame {
            header: FrameHeader {
                checksum: expected,
                flags: FrameFlags::from_bits_truncate(fields[0]),
                tag: fields[1],
                seq_id: u16::from_le_bytes(seq_raw),
                radio_id: u32::from_le_bytes(radio_raw),
            },
            payload,
        })
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too small ({} bytes, min: {} bytes).", .size, HEADER_SIZE + 1)]
    TooSmall { size: usize },

    #[error("Checksum mismatch (expected: {:#010x}, actual: {:#010x}).", .expected, .actual)]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Payload is too large (is: {}B, max: {}B).", .size, MAX_PAYLOAD)]
    PayloadTooLarge { size: usize },
}
