//! Utility Functions Module
//!
//! Common helpers shared by the protocol layers.
//!
//! # Overview
//!
//! Utilities provided include:
//! - CRC calculation for MS/TP frame headers and data (ASHRAE 135 Annex G)
//! - A bounds-checked byte reader used by the PDU decoders
//! - Hex formatting for trace logging
//!
//! # Example
//!
//! ```
//! use bacnet_core::util::{crc16_mstp, crc8_mstp_header};
//!
//! // Token frame header: type, destination, source, length (2 bytes)
//! assert_eq!(crc8_mstp_header(&[0x00, 0x10, 0x05, 0x00, 0x00]), 0x8C);
//! assert_eq!(crc16_mstp(b"123456789"), 0x906E);
//! ```

pub mod enum_macros;

use crc::{Algorithm, Crc, CRC_16_IBM_SDLC};

/// MS/TP header CRC: polynomial X^8 + X^7 + 1, reflected, preset to all ones,
/// transmitted as the ones complement.
pub const CRC_8_MSTP_HEADER: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x81,
    init: 0xFF,
    refin: true,
    refout: true,
    xorout: 0xFF,
    check: 0x89,
    residue: 0x55,
};

const HEADER_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_MSTP_HEADER);

/// MS/TP data CRC is CRC-CCITT as used by HDLC/X.25.
const DATA_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// Calculate the MS/TP header CRC over the five header octets
/// (frame type, destination, source, length high, length low).
pub fn crc8_mstp_header(header: &[u8]) -> u8 {
    HEADER_CRC.checksum(header)
}

/// Calculate the MS/TP data CRC.
///
/// The result is already complemented; it goes on the wire least significant
/// octet first.
pub fn crc16_mstp(data: &[u8]) -> u16 {
    DATA_CRC.checksum(data)
}

/// Running header CRC, fed one octet at a time by the receive state machine.
#[derive(Debug, Clone, Copy)]
pub struct HeaderCrc {
    register: u8,
}

impl HeaderCrc {
    pub fn new() -> Self {
        Self { register: 0xFF }
    }

    pub fn update(&mut self, octet: u8) {
        let mut crc = self.register ^ octet;
        for _ in 0..8 {
            crc = if crc & 0x01 != 0 {
                (crc >> 1) ^ 0x81
            } else {
                crc >> 1
            };
        }
        self.register = crc;
    }

    /// True once the header octets and the received CRC octet have been fed
    /// and the remainder matches Annex G.
    pub fn is_valid(&self) -> bool {
        self.register == CRC_8_MSTP_HEADER.residue
    }
}

impl Default for HeaderCrc {
    fn default() -> Self {
        Self::new()
    }
}

/// Running data CRC. Feeding the data followed by its two CRC octets leaves
/// the register at 0xF0B8 when the frame is intact.
#[derive(Debug, Clone, Copy)]
pub struct DataCrc {
    register: u16,
}

impl DataCrc {
    const RESIDUE: u16 = 0xF0B8;

    pub fn new() -> Self {
        Self { register: 0xFFFF }
    }

    pub fn update(&mut self, octet: u8) {
        let mut crc = self.register ^ octet as u16;
        for _ in 0..8 {
            crc = if crc & 0x0001 != 0 {
                (crc >> 1) ^ 0x8408
            } else {
                crc >> 1
            };
        }
        self.register = crc;
    }

    pub fn is_valid(&self) -> bool {
        self.register == Self::RESIDUE
    }
}

impl Default for DataCrc {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounds-checked reader for decoding PDUs
///
/// Every read returns `None` instead of indexing past the end, so decoders can
/// map a short buffer onto their own truncation error.
#[derive(Debug, Clone)]
pub struct Buffer<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Buffer<'a> {
    /// Create a new buffer reader
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Get remaining bytes
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Check if buffer has at least n bytes remaining
    pub fn has_remaining(&self, n: usize) -> bool {
        self.remaining() >= n
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Option<u8> {
        let value = *self.data.get(self.position)?;
        self.position += 1;
        Some(value)
    }

    /// Read a 16-bit value (big-endian)
    pub fn read_u16(&mut self) -> Option<u16> {
        let bytes = self.read_bytes(2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read n bytes
    pub fn read_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.position.checked_add(n)?;
        let bytes = self.data.get(self.position..end)?;
        self.position = end;
        Some(bytes)
    }

    /// Everything not yet consumed
    pub fn rest(&self) -> &'a [u8] {
        self.data.get(self.position..).unwrap_or(&[])
    }

    /// Get current position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Total length of the underlying data
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Space-separated upper-case hex, for `trace!` output.
pub fn hex_string(data: &[u8]) -> String {
    let encoded = hex::encode_upper(data);
    let mut result = String::with_capacity(encoded.len() + encoded.len() / 2);
    for (i, pair) in encoded.as_bytes().chunks(2).enumerate() {
        if i > 0 {
            result.push(' ');
        }
        result.push_str(std::str::from_utf8(pair).unwrap_or("??"));
    }
    result
}
