//! BACnet Encoding/Decoding Module
//!
//! The handful of ASHRAE 135 Clause 20.2 tag primitives this crate needs to
//! read APDU error bodies and the DeviceCommunicationControl request, and to
//! produce the matching responses.
//!
//! # Overview
//!
//! - Application tags (enumerated, unsigned, character string)
//! - Context tags, including opening and closing tags of constructed data
//! - Character set handling through `encoding_rs`
//!
//! # Example
//!
//! ```
//! use bacnet_core::encoding::{decode_enumerated, encode_enumerated};
//!
//! let mut buffer = Vec::new();
//! encode_enumerated(&mut buffer, 26).unwrap();
//! assert_eq!(buffer, [0x91, 0x1A]);
//! assert_eq!(decode_enumerated(&buffer).unwrap(), (26, 2));
//! ```

use thiserror::Error;

/// Result type for encoding operations
pub type Result<T> = std::result::Result<T, EncodingError>;

/// Errors that can occur during encoding/decoding operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// Buffer underflow during decoding
    #[error("buffer underflow during decoding")]
    BufferUnderflow,
    /// Tag number or class is not what the decoder expected
    #[error("invalid tag number encountered")]
    InvalidTag,
    /// Invalid length value
    #[error("invalid length value")]
    InvalidLength,
    /// Value out of valid range
    #[error("value out of valid range")]
    ValueOutOfRange,
    /// Character set the decoder cannot map to UTF-8
    #[error("unsupported character set {0}")]
    UnsupportedCharacterSet(u8),
    /// Invalid encoding format
    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

/// BACnet application tag numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ApplicationTag {
    Null = 0,
    Boolean = 1,
    UnsignedInt = 2,
    SignedInt = 3,
    Real = 4,
    Double = 5,
    OctetString = 6,
    CharacterString = 7,
    BitString = 8,
    Enumerated = 9,
    Date = 10,
    Time = 11,
    ObjectIdentifier = 12,
}

impl TryFrom<u8> for ApplicationTag {
    type Error = EncodingError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Null),
            1 => Ok(Self::Boolean),
            2 => Ok(Self::UnsignedInt),
            3 => Ok(Self::SignedInt),
            4 => Ok(Self::Real),
            5 => Ok(Self::Double),
            6 => Ok(Self::OctetString),
            7 => Ok(Self::CharacterString),
            8 => Ok(Self::BitString),
            9 => Ok(Self::Enumerated),
            10 => Ok(Self::Date),
            11 => Ok(Self::Time),
            12 => Ok(Self::ObjectIdentifier),
            _ => Err(EncodingError::InvalidTag),
        }
    }
}

/// Character sets of a BACnet CharacterString
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CharacterSet {
    /// ANSI X3.4, reinterpreted as UTF-8 since 135-2008
    Utf8 = 0,
    IbmDbcs = 1,
    JisX0208 = 2,
    Ucs4 = 3,
    Ucs2 = 4,
    Iso8859_1 = 5,
}

impl TryFrom<u8> for CharacterSet {
    type Error = EncodingError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Utf8),
            1 => Ok(Self::IbmDbcs),
            2 => Ok(Self::JisX0208),
            3 => Ok(Self::Ucs4),
            4 => Ok(Self::Ucs2),
            5 => Ok(Self::Iso8859_1),
            other => Err(EncodingError::UnsupportedCharacterSet(other)),
        }
    }
}

/// Tag class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Application,
    Context,
}

/// A decoded tag header
///
/// `length` holds the length/value/type field: the content length for
/// primitive tags and the value itself for application booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub number: u8,
    pub class: TagClass,
    pub length: usize,
    pub opening: bool,
    pub closing: bool,
}

impl Tag {
    pub fn is_context(&self, number: u8) -> bool {
        self.class == TagClass::Context && self.number == number && !self.opening && !self.closing
    }

    pub fn is_opening(&self, number: u8) -> bool {
        self.opening && self.number == number
    }

    pub fn is_closing(&self, number: u8) -> bool {
        self.closing && self.number == number
    }
}

/// Decode any tag header. Returns the tag and the octets consumed.
pub fn decode_tag(data: &[u8]) -> Result<(Tag, usize)> {
    let first = *data.first().ok_or(EncodingError::BufferUnderflow)?;
    let mut consumed = 1;

    let mut number = first >> 4;
    if number == 0x0F {
        number = *data.get(consumed).ok_or(EncodingError::BufferUnderflow)?;
        consumed += 1;
    }

    let class = if first & 0x08 != 0 {
        TagClass::Context
    } else {
        TagClass::Application
    };
    let lvt = first & 0x07;

    if class == TagClass::Context && (lvt == 6 || lvt == 7) {
        let tag = Tag {
            number,
            class,
            length: 0,
            opening: lvt == 6,
            closing: lvt == 7,
        };
        return Ok((tag, consumed));
    }

    let (length, extra) = decode_extended_length(lvt, &data[consumed..])?;
    consumed += extra;

    Ok((
        Tag {
            number,
            class,
            length,
            opening: false,
            closing: false,
        },
        consumed,
    ))
}

fn decode_extended_length(lvt: u8, data: &[u8]) -> Result<(usize, usize)> {
    if lvt < 5 {
        return Ok((lvt as usize, 0));
    }
    let len_byte = *data.first().ok_or(EncodingError::BufferUnderflow)?;
    match len_byte {
        0..=253 => Ok((len_byte as usize, 1)),
        254 => {
            let bytes = data.get(1..3).ok_or(EncodingError::BufferUnderflow)?;
            Ok((u16::from_be_bytes([bytes[0], bytes[1]]) as usize, 3))
        }
        255 => {
            let bytes = data.get(1..5).ok_or(EncodingError::BufferUnderflow)?;
            let length = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            Ok((length as usize, 5))
        }
    }
}

fn encode_tag(buffer: &mut Vec<u8>, number: u8, context: bool, length: usize) -> Result<()> {
    if number > 14 {
        return Err(EncodingError::ValueOutOfRange);
    }
    let class_bit = if context { 0x08 } else { 0x00 };
    let lvt = if length < 5 { length as u8 } else { 5 };
    buffer.push((number << 4) | class_bit | lvt);

    if length >= 5 {
        if length < 254 {
            buffer.push(length as u8);
        } else if length < 65536 {
            buffer.push(254);
            buffer.extend_from_slice(&(length as u16).to_be_bytes());
        } else {
            buffer.push(255);
            buffer.extend_from_slice(&(length as u32).to_be_bytes());
        }
    }
    Ok(())
}

/// Encode a BACnet application tag
pub fn encode_application_tag(buffer: &mut Vec<u8>, tag: ApplicationTag, length: usize) -> Result<()> {
    encode_tag(buffer, tag as u8, false, length)
}

/// Decode a BACnet application tag. Returns (tag, content length, header length).
pub fn decode_application_tag(data: &[u8]) -> Result<(ApplicationTag, usize, usize)> {
    let (tag, consumed) = decode_tag(data)?;
    if tag.class != TagClass::Application {
        return Err(EncodingError::InvalidTag);
    }
    Ok((ApplicationTag::try_from(tag.number)?, tag.length, consumed))
}

/// Minimal big-endian encoding of an unsigned value (1 to 4 octets)
fn unsigned_octets(value: u32) -> ([u8; 4], usize) {
    let bytes = value.to_be_bytes();
    let len = match value {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    };
    (bytes, len)
}

/// Decode 1 to 4 big-endian content octets
pub fn decode_unsigned_value(content: &[u8]) -> Result<u32> {
    if content.is_empty() || content.len() > 4 {
        return Err(EncodingError::InvalidLength);
    }
    Ok(content
        .iter()
        .fold(0u32, |value, octet| (value << 8) | *octet as u32))
}

fn content<'a>(data: &'a [u8], header: usize, length: usize) -> Result<&'a [u8]> {
    let end = header.checked_add(length).ok_or(EncodingError::InvalidLength)?;
    data.get(header..end).ok_or(EncodingError::BufferUnderflow)
}

/// Encode a BACnet unsigned integer
pub fn encode_unsigned(buffer: &mut Vec<u8>, value: u32) -> Result<()> {
    let (bytes, len) = unsigned_octets(value);
    encode_application_tag(buffer, ApplicationTag::UnsignedInt, len)?;
    buffer.extend_from_slice(&bytes[4 - len..]);
    Ok(())
}

/// Decode a BACnet unsigned integer
pub fn decode_unsigned(data: &[u8]) -> Result<(u32, usize)> {
    let (tag, length, consumed) = decode_application_tag(data)?;
    if tag != ApplicationTag::UnsignedInt {
        return Err(EncodingError::InvalidTag);
    }
    let value = decode_unsigned_value(content(data, consumed, length)?)?;
    Ok((value, consumed + length))
}

/// Encode a BACnet enumerated value
pub fn encode_enumerated(buffer: &mut Vec<u8>, value: u32) -> Result<()> {
    let (bytes, len) = unsigned_octets(value);
    encode_application_tag(buffer, ApplicationTag::Enumerated, len)?;
    buffer.extend_from_slice(&bytes[4 - len..]);
    Ok(())
}

/// Decode a BACnet enumerated value
pub fn decode_enumerated(data: &[u8]) -> Result<(u32, usize)> {
    let (tag, length, consumed) = decode_application_tag(data)?;
    if tag != ApplicationTag::Enumerated {
        return Err(EncodingError::InvalidTag);
    }
    let value = decode_unsigned_value(content(data, consumed, length)?)?;
    Ok((value, consumed + length))
}

/// Decode CharacterString content (character set octet followed by the text)
pub fn decode_character_string_content(content: &[u8]) -> Result<String> {
    let (&charset, text) = content.split_first().ok_or(EncodingError::InvalidLength)?;
    let encoding = match CharacterSet::try_from(charset)? {
        CharacterSet::Utf8 => encoding_rs::UTF_8,
        CharacterSet::Ucs2 => encoding_rs::UTF_16BE,
        CharacterSet::Iso8859_1 => encoding_rs::WINDOWS_1252,
        CharacterSet::JisX0208 => encoding_rs::SHIFT_JIS,
        _ => return Err(EncodingError::UnsupportedCharacterSet(charset)),
    };
    let (decoded, had_errors) = encoding.decode_without_bom_handling(text);
    if had_errors {
        return Err(EncodingError::InvalidFormat(format!(
            "malformed {} string",
            encoding.name()
        )));
    }
    Ok(decoded.into_owned())
}

/// Context-specific tag encoding/decoding
pub mod context {
    use super::*;

    /// Encode a context-specific tag
    pub fn encode_context_tag(buffer: &mut Vec<u8>, tag_number: u8, length: usize) -> Result<()> {
        encode_tag(buffer, tag_number, true, length)
    }

    /// Decode a context-specific tag. Returns (tag number, content length, header length).
    pub fn decode_context_tag(data: &[u8]) -> Result<(u8, usize, usize)> {
        let (tag, consumed) = decode_tag(data)?;
        if tag.class != TagClass::Context || tag.opening || tag.closing {
            return Err(EncodingError::InvalidTag);
        }
        Ok((tag.number, tag.length, consumed))
    }

    /// Encode opening tag for constructed data
    pub fn encode_opening_tag(buffer: &mut Vec<u8>, tag_number: u8) -> Result<()> {
        if tag_number > 14 {
            return Err(EncodingError::ValueOutOfRange);
        }
        buffer.push(0x0E | (tag_number << 4));
        Ok(())
    }

    /// Encode closing tag for constructed data
    pub fn encode_closing_tag(buffer: &mut Vec<u8>, tag_number: u8) -> Result<()> {
        if tag_number > 14 {
            return Err(EncodingError::ValueOutOfRange);
        }
        buffer.push(0x0F | (tag_number << 4));
        Ok(())
    }

    pub fn encode_context_unsigned(buffer: &mut Vec<u8>, tag_number: u8, value: u32) -> Result<()> {
        let (bytes, len) = unsigned_octets(value);
        encode_context_tag(buffer, tag_number, len)?;
        buffer.extend_from_slice(&bytes[4 - len..]);
        Ok(())
    }

    pub fn encode_context_enumerated(buffer: &mut Vec<u8>, tag_number: u8, value: u32) -> Result<()> {
        encode_context_unsigned(buffer, tag_number, value)
    }

    /// Encode a context-tagged CharacterString in UTF-8
    pub fn encode_context_character_string(
        buffer: &mut Vec<u8>,
        tag_number: u8,
        value: &str,
    ) -> Result<()> {
        encode_context_tag(buffer, tag_number, value.len() + 1)?;
        buffer.push(CharacterSet::Utf8 as u8);
        buffer.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// Decode a context-tagged unsigned value with the expected tag number
    pub fn decode_context_unsigned(data: &[u8], tag_number: u8) -> Result<(u32, usize)> {
        let (number, length, consumed) = decode_context_tag(data)?;
        if number != tag_number {
            return Err(EncodingError::InvalidTag);
        }
        let value = decode_unsigned_value(content(data, consumed, length)?)?;
        Ok((value, consumed + length))
    }

    pub fn decode_context_enumerated(data: &[u8], tag_number: u8) -> Result<(u32, usize)> {
        decode_context_unsigned(data, tag_number)
    }

    /// Decode a context-tagged CharacterString with the expected tag number
    pub fn decode_context_character_string(data: &[u8], tag_number: u8) -> Result<(String, usize)> {
        let (number, length, consumed) = decode_context_tag(data)?;
        if number != tag_number {
            return Err(EncodingError::InvalidTag);
        }
        let value = decode_character_string_content(content(data, consumed, length)?)?;
        Ok((value, consumed + length))
    }
}

#[cfg(test)]
mod tests {
    use super::context::*;
    use super::*;

    #[test]
    fn test_enumerated_sizes() {
        let mut buffer = Vec::new();
        encode_enumerated(&mut buffer, 0).unwrap();
        assert_eq!(buffer, [0x91, 0x00]);

        buffer.clear();
        encode_enumerated(&mut buffer, 0x1234).unwrap();
        assert_eq!(buffer, [0x92, 0x12, 0x34]);
        assert_eq!(decode_enumerated(&buffer).unwrap(), (0x1234, 3));
    }

    #[test]
    fn test_decode_wrong_application_tag() {
        // Unsigned 5, not enumerated
        assert_eq!(decode_enumerated(&[0x21, 0x05]), Err(EncodingError::InvalidTag));
        assert_eq!(decode_unsigned(&[0x21, 0x05]).unwrap(), (5, 2));
    }

    #[test]
    fn test_decode_truncated_content() {
        assert_eq!(
            decode_enumerated(&[0x92, 0x12]),
            Err(EncodingError::BufferUnderflow)
        );
        assert_eq!(decode_tag(&[]), Err(EncodingError::BufferUnderflow));
    }

    #[test]
    fn test_opening_closing_tags() {
        let mut buffer = Vec::new();
        encode_opening_tag(&mut buffer, 0).unwrap();
        encode_closing_tag(&mut buffer, 0).unwrap();
        assert_eq!(buffer, [0x0E, 0x0F]);

        let (open, consumed) = decode_tag(&buffer).unwrap();
        assert!(open.is_opening(0));
        assert_eq!(consumed, 1);
        let (close, _) = decode_tag(&buffer[1..]).unwrap();
        assert!(close.is_closing(0));
        assert!(!close.is_context(0));
    }

    #[test]
    fn test_context_unsigned() {
        let mut buffer = Vec::new();
        encode_context_unsigned(&mut buffer, 0, 300).unwrap();
        assert_eq!(buffer, [0x0A, 0x01, 0x2C]);
        assert_eq!(decode_context_unsigned(&buffer, 0).unwrap(), (300, 3));
        assert_eq!(
            decode_context_unsigned(&buffer, 1),
            Err(EncodingError::InvalidTag)
        );
    }

    #[test]
    fn test_context_character_string() {
        let mut buffer = Vec::new();
        encode_context_character_string(&mut buffer, 2, "filister").unwrap();
        // Nine content octets need the extended length form
        assert_eq!(&buffer[..3], &[0x2D, 0x09, 0x00]);
        let (value, consumed) = decode_context_character_string(&buffer, 2).unwrap();
        assert_eq!(value, "filister");
        assert_eq!(consumed, buffer.len());
    }

    #[test]
    fn test_latin1_character_string() {
        // "caf\xe9" in ISO 8859-1
        let data = [0x2D, 0x05, 0x05, b'c', b'a', b'f', 0xE9];
        let (value, _) = decode_context_character_string(&data, 2).unwrap();
        assert_eq!(value, "café");
    }

    #[test]
    fn test_unsupported_character_set() {
        let data = [0x2C, 0x03, b'a', b'b', b'c'];
        assert_eq!(
            decode_context_character_string(&data, 2),
            Err(EncodingError::UnsupportedCharacterSet(3))
        );
    }

    #[test]
    fn test_tag_number_out_of_range() {
        let mut buffer = Vec::new();
        assert_eq!(
            encode_context_tag(&mut buffer, 15, 1),
            Err(EncodingError::ValueOutOfRange)
        );
    }
}
