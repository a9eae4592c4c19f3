//! BACnet Application Layer Module
//!
//! This module implements the application layer functionality for BACnet communication.
//! The application layer is responsible for forming and processing Application Protocol
//! Data Units (APDUs) that carry BACnet services.
//!
//! # Overview
//!
//! The application layer handles:
//! - APDU header parsing, with every read bounds checked
//! - Service dispatch to registered handlers ([`dispatch`])
//! - The Device Communication Control gate ([`dcc`])
//! - Invoke-id bookkeeping for confirmed services ([`tsm`])
//!
//! # APDU Types
//!
//! - Confirmed Request PDU
//! - Unconfirmed Request PDU
//! - SimpleACK PDU
//! - ComplexACK PDU
//! - SegmentACK PDU
//! - Error PDU
//! - Reject PDU
//! - Abort PDU
//!
//! Decoded PDUs borrow their service data from the received buffer.
//!
//! # Example
//!
//! ```
//! use bacnet_core::app::{Apdu, PduType};
//!
//! // Who-Is without limits
//! let apdu = Apdu::decode(&[0x10, 0x08]).unwrap();
//! assert_eq!(apdu.pdu_type(), PduType::UnconfirmedRequest);
//! ```

pub mod dcc;
pub mod dispatch;
pub mod tsm;

use thiserror::Error;

use crate::encoding::context::{encode_closing_tag, encode_opening_tag};
use crate::encoding::{decode_enumerated, decode_tag, encode_enumerated, EncodingError};
use crate::service::{
    AbortReason, ConfirmedServiceChoice, ErrorClass, ErrorCode, RejectReason,
};
use crate::util::Buffer;

/// Result type for application layer operations
pub type Result<T> = std::result::Result<T, ApduError>;

/// Errors that can occur while decoding an APDU
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApduError {
    /// A header field lies beyond the end of the PDU
    #[error("truncated PDU: needed {needed} octets, got {available}")]
    TruncatedPdu { needed: usize, available: usize },
    /// PDU type nibble outside 0..=7
    #[error("unknown PDU type {0}")]
    UnknownPduType(u8),
    /// Tagged content (error class/code) failed to decode
    #[error("invalid APDU body: {0}")]
    Encoding(#[from] EncodingError),
}

/// APDU types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PduType {
    ConfirmedRequest = 0,
    UnconfirmedRequest = 1,
    SimpleAck = 2,
    ComplexAck = 3,
    SegmentAck = 4,
    Error = 5,
    Reject = 6,
    Abort = 7,
}

impl PduType {
    /// PDU type of the first octet of an APDU
    pub fn from_header(octet: u8) -> Result<Self> {
        match octet >> 4 {
            0 => Ok(Self::ConfirmedRequest),
            1 => Ok(Self::UnconfirmedRequest),
            2 => Ok(Self::SimpleAck),
            3 => Ok(Self::ComplexAck),
            4 => Ok(Self::SegmentAck),
            5 => Ok(Self::Error),
            6 => Ok(Self::Reject),
            7 => Ok(Self::Abort),
            other => Err(ApduError::UnknownPduType(other)),
        }
    }

    fn header_bits(self) -> u8 {
        (self as u8) << 4
    }
}

/// Maximum segments that can be accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxSegments {
    Unspecified = 0,
    Two = 1,
    Four = 2,
    Eight = 3,
    Sixteen = 4,
    ThirtyTwo = 5,
    SixtyFour = 6,
    GreaterThan64 = 7,
}

impl MaxSegments {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            1 => Self::Two,
            2 => Self::Four,
            3 => Self::Eight,
            4 => Self::Sixteen,
            5 => Self::ThirtyTwo,
            6 => Self::SixtyFour,
            7 => Self::GreaterThan64,
            _ => Self::Unspecified,
        }
    }
}

/// Maximum APDU size that can be accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxApduSize {
    Up50 = 0,
    Up128 = 1,
    Up206 = 2,
    Up480 = 3,
    Up1024 = 4,
    Up1476 = 5,
}

impl MaxApduSize {
    /// Get the actual size in bytes
    pub fn size(&self) -> usize {
        match self {
            MaxApduSize::Up50 => 50,
            MaxApduSize::Up128 => 128,
            MaxApduSize::Up206 => 206,
            MaxApduSize::Up480 => 480,
            MaxApduSize::Up1024 => 1024,
            MaxApduSize::Up1476 => 1476,
        }
    }

    /// Largest size class not exceeding `octets`
    pub fn for_size(octets: usize) -> Self {
        match octets {
            0..=127 => Self::Up50,
            128..=205 => Self::Up128,
            206..=479 => Self::Up206,
            480..=1023 => Self::Up480,
            1024..=1475 => Self::Up1024,
            _ => Self::Up1476,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0x0F {
            1 => Self::Up128,
            2 => Self::Up206,
            3 => Self::Up480,
            4 => Self::Up1024,
            5 => Self::Up1476,
            _ => Self::Up50,
        }
    }
}

/// Header fields of a confirmed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmedServiceData {
    pub segmented_message: bool,
    pub more_follows: bool,
    pub segmented_response_accepted: bool,
    pub max_segments: MaxSegments,
    pub max_resp: MaxApduSize,
    pub invoke_id: u8,
    /// Only meaningful when `segmented_message` is set
    pub sequence_number: u8,
    /// Only meaningful when `segmented_message` is set
    pub proposed_window_number: u8,
}

impl ConfirmedServiceData {
    /// Header for an unsegmented request
    pub fn unsegmented(invoke_id: u8, max_resp: MaxApduSize) -> Self {
        Self {
            segmented_message: false,
            more_follows: false,
            segmented_response_accepted: false,
            max_segments: MaxSegments::Unspecified,
            max_resp,
            invoke_id,
            sequence_number: 0,
            proposed_window_number: 0,
        }
    }
}

/// Confirmed service request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmedRequest<'a> {
    pub header: ConfirmedServiceData,
    /// Raw service choice, which may be unknown to this crate
    pub service_choice: u8,
    pub service_data: &'a [u8],
}

/// Unconfirmed service request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnconfirmedRequest<'a> {
    pub service_choice: u8,
    pub service_data: &'a [u8],
}

/// SimpleACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleAck {
    pub invoke_id: u8,
    pub service_choice: u8,
}

/// ComplexACK header fields and service data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplexAck<'a> {
    pub segmented_message: bool,
    pub more_follows: bool,
    pub invoke_id: u8,
    pub sequence_number: u8,
    pub proposed_window_number: u8,
    pub service_choice: u8,
    pub service_data: &'a [u8],
}

/// SegmentACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentAck {
    pub negative: bool,
    pub server: bool,
    pub invoke_id: u8,
    pub sequence_number: u8,
    pub actual_window_size: u8,
}

/// Error PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorPdu {
    pub invoke_id: u8,
    pub service_choice: u8,
    pub error_class: ErrorClass,
    pub error_code: ErrorCode,
}

/// Reject PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectPdu {
    pub invoke_id: u8,
    pub reason: RejectReason,
}

/// Abort PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortPdu {
    pub server: bool,
    pub invoke_id: u8,
    pub reason: AbortReason,
}

/// Application Protocol Data Unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Apdu<'a> {
    ConfirmedRequest(ConfirmedRequest<'a>),
    UnconfirmedRequest(UnconfirmedRequest<'a>),
    SimpleAck(SimpleAck),
    ComplexAck(ComplexAck<'a>),
    SegmentAck(SegmentAck),
    Error(ErrorPdu),
    Reject(RejectPdu),
    Abort(AbortPdu),
}

fn read_u8(buffer: &mut Buffer<'_>) -> Result<u8> {
    buffer.read_u8().ok_or(ApduError::TruncatedPdu {
        needed: buffer.position() + 1,
        available: buffer.len(),
    })
}

/// Reads an application-tagged enumeration and narrows it to 16 bits
fn read_enumerated_u16(buffer: &mut Buffer<'_>) -> Result<u16> {
    let rest = buffer.rest();
    let (value, consumed) = decode_enumerated(rest)?;
    let _ = buffer.read_bytes(consumed);
    u16::try_from(value).map_err(|_| ApduError::Encoding(EncodingError::ValueOutOfRange))
}

/// Skips an opening or closing context tag 0 if it is next in the buffer
fn skip_tag_zero(buffer: &mut Buffer<'_>, opening: bool) {
    if let Ok((tag, consumed)) = decode_tag(buffer.rest()) {
        let matches = if opening {
            tag.is_opening(0)
        } else {
            tag.is_closing(0)
        };
        if matches {
            let _ = buffer.read_bytes(consumed);
        }
    }
}

impl<'a> Apdu<'a> {
    /// Decode an APDU, borrowing the service data from `data`
    pub fn decode(data: &'a [u8]) -> Result<Self> {
        let mut buffer = Buffer::new(data);
        let first = read_u8(&mut buffer)?;
        let pdu_type = PduType::from_header(first)?;

        let apdu = match pdu_type {
            PduType::ConfirmedRequest => {
                let segmented_message = first & 0x08 != 0;
                let max_info = read_u8(&mut buffer)?;
                let invoke_id = read_u8(&mut buffer)?;
                let (sequence_number, proposed_window_number) = if segmented_message {
                    (read_u8(&mut buffer)?, read_u8(&mut buffer)?)
                } else {
                    (0, 0)
                };
                let service_choice = read_u8(&mut buffer)?;
                Apdu::ConfirmedRequest(ConfirmedRequest {
                    header: ConfirmedServiceData {
                        segmented_message,
                        more_follows: first & 0x04 != 0,
                        segmented_response_accepted: first & 0x02 != 0,
                        max_segments: MaxSegments::from_bits(max_info >> 4),
                        max_resp: MaxApduSize::from_bits(max_info),
                        invoke_id,
                        sequence_number,
                        proposed_window_number,
                    },
                    service_choice,
                    service_data: buffer.rest(),
                })
            }
            PduType::UnconfirmedRequest => {
                let service_choice = read_u8(&mut buffer)?;
                Apdu::UnconfirmedRequest(UnconfirmedRequest {
                    service_choice,
                    service_data: buffer.rest(),
                })
            }
            PduType::SimpleAck => Apdu::SimpleAck(SimpleAck {
                invoke_id: read_u8(&mut buffer)?,
                service_choice: read_u8(&mut buffer)?,
            }),
            PduType::ComplexAck => {
                let segmented_message = first & 0x08 != 0;
                let invoke_id = read_u8(&mut buffer)?;
                let (sequence_number, proposed_window_number) = if segmented_message {
                    (read_u8(&mut buffer)?, read_u8(&mut buffer)?)
                } else {
                    (0, 0)
                };
                let service_choice = read_u8(&mut buffer)?;
                Apdu::ComplexAck(ComplexAck {
                    segmented_message,
                    more_follows: first & 0x04 != 0,
                    invoke_id,
                    sequence_number,
                    proposed_window_number,
                    service_choice,
                    service_data: buffer.rest(),
                })
            }
            PduType::SegmentAck => Apdu::SegmentAck(SegmentAck {
                negative: first & 0x02 != 0,
                server: first & 0x01 != 0,
                invoke_id: read_u8(&mut buffer)?,
                sequence_number: read_u8(&mut buffer)?,
                actual_window_size: read_u8(&mut buffer)?,
            }),
            PduType::Error => {
                let invoke_id = read_u8(&mut buffer)?;
                let service_choice = read_u8(&mut buffer)?;
                let private_transfer =
                    service_choice == ConfirmedServiceChoice::ConfirmedPrivateTransfer as u8;
                if private_transfer {
                    skip_tag_zero(&mut buffer, true);
                }
                let error_class = ErrorClass::from(read_enumerated_u16(&mut buffer)?);
                let error_code = ErrorCode::from(read_enumerated_u16(&mut buffer)?);
                if private_transfer {
                    skip_tag_zero(&mut buffer, false);
                }
                Apdu::Error(ErrorPdu {
                    invoke_id,
                    service_choice,
                    error_class,
                    error_code,
                })
            }
            PduType::Reject => Apdu::Reject(RejectPdu {
                invoke_id: read_u8(&mut buffer)?,
                reason: RejectReason::from(read_u8(&mut buffer)?),
            }),
            PduType::Abort => Apdu::Abort(AbortPdu {
                server: first & 0x01 != 0,
                invoke_id: read_u8(&mut buffer)?,
                reason: AbortReason::from(read_u8(&mut buffer)?),
            }),
        };

        Ok(apdu)
    }

    pub fn pdu_type(&self) -> PduType {
        match self {
            Apdu::ConfirmedRequest(_) => PduType::ConfirmedRequest,
            Apdu::UnconfirmedRequest(_) => PduType::UnconfirmedRequest,
            Apdu::SimpleAck(_) => PduType::SimpleAck,
            Apdu::ComplexAck(_) => PduType::ComplexAck,
            Apdu::SegmentAck(_) => PduType::SegmentAck,
            Apdu::Error(_) => PduType::Error,
            Apdu::Reject(_) => PduType::Reject,
            Apdu::Abort(_) => PduType::Abort,
        }
    }

    /// Invoke id, for every PDU type that carries one
    pub fn invoke_id(&self) -> Option<u8> {
        match self {
            Apdu::ConfirmedRequest(request) => Some(request.header.invoke_id),
            Apdu::UnconfirmedRequest(_) => None,
            Apdu::SimpleAck(ack) => Some(ack.invoke_id),
            Apdu::ComplexAck(ack) => Some(ack.invoke_id),
            Apdu::SegmentAck(ack) => Some(ack.invoke_id),
            Apdu::Error(error) => Some(error.invoke_id),
            Apdu::Reject(reject) => Some(reject.invoke_id),
            Apdu::Abort(abort) => Some(abort.invoke_id),
        }
    }

    /// Append the encoded APDU to `buffer`
    pub fn encode(&self, buffer: &mut Vec<u8>) -> Result<()> {
        match self {
            Apdu::ConfirmedRequest(request) => {
                let header = &request.header;
                let mut first = PduType::ConfirmedRequest.header_bits();
                if header.segmented_message {
                    first |= 0x08;
                }
                if header.more_follows {
                    first |= 0x04;
                }
                if header.segmented_response_accepted {
                    first |= 0x02;
                }
                buffer.push(first);
                buffer.push(((header.max_segments as u8) << 4) | header.max_resp as u8);
                buffer.push(header.invoke_id);
                if header.segmented_message {
                    buffer.push(header.sequence_number);
                    buffer.push(header.proposed_window_number);
                }
                buffer.push(request.service_choice);
                buffer.extend_from_slice(request.service_data);
            }
            Apdu::UnconfirmedRequest(request) => {
                buffer.push(PduType::UnconfirmedRequest.header_bits());
                buffer.push(request.service_choice);
                buffer.extend_from_slice(request.service_data);
            }
            Apdu::SimpleAck(ack) => {
                buffer.extend_from_slice(&[
                    PduType::SimpleAck.header_bits(),
                    ack.invoke_id,
                    ack.service_choice,
                ]);
            }
            Apdu::ComplexAck(ack) => {
                let mut first = PduType::ComplexAck.header_bits();
                if ack.segmented_message {
                    first |= 0x08;
                }
                if ack.more_follows {
                    first |= 0x04;
                }
                buffer.push(first);
                buffer.push(ack.invoke_id);
                if ack.segmented_message {
                    buffer.push(ack.sequence_number);
                    buffer.push(ack.proposed_window_number);
                }
                buffer.push(ack.service_choice);
                buffer.extend_from_slice(ack.service_data);
            }
            Apdu::SegmentAck(ack) => {
                let mut first = PduType::SegmentAck.header_bits();
                if ack.negative {
                    first |= 0x02;
                }
                if ack.server {
                    first |= 0x01;
                }
                buffer.extend_from_slice(&[
                    first,
                    ack.invoke_id,
                    ack.sequence_number,
                    ack.actual_window_size,
                ]);
            }
            Apdu::Error(error) => {
                buffer.extend_from_slice(&[
                    PduType::Error.header_bits(),
                    error.invoke_id,
                    error.service_choice,
                ]);
                let private_transfer = error.service_choice
                    == ConfirmedServiceChoice::ConfirmedPrivateTransfer as u8;
                if private_transfer {
                    encode_opening_tag(buffer, 0)?;
                }
                encode_enumerated(buffer, u16::from(error.error_class) as u32)?;
                encode_enumerated(buffer, u16::from(error.error_code) as u32)?;
                if private_transfer {
                    encode_closing_tag(buffer, 0)?;
                }
            }
            Apdu::Reject(reject) => {
                buffer.extend_from_slice(&[
                    PduType::Reject.header_bits(),
                    reject.invoke_id,
                    u8::from(reject.reason),
                ]);
            }
            Apdu::Abort(abort) => {
                let mut first = PduType::Abort.header_bits();
                if abort.server {
                    first |= 0x01;
                }
                buffer.extend_from_slice(&[first, abort.invoke_id, u8::from(abort.reason)]);
            }
        }
        Ok(())
    }
}

/// Application layer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ApplicationConfig {
    /// Time to wait for the answer to a confirmed request (milliseconds)
    pub apdu_timeout: u32,
    /// Retransmissions of an unanswered confirmed request
    pub apdu_retries: u8,
    /// Largest APDU this device accepts
    pub max_apdu_length: usize,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            apdu_timeout: 3000,
            apdu_retries: 3,
            max_apdu_length: crate::datalink::mstp::MSTP_MAX_APDU,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_confirmed_request() {
        // ReadProperty, invoke id 1, max APDU 480
        let data = [0x00, 0x03, 0x01, 0x0C, 0x0C, 0x02, 0x00, 0x00, 0x01, 0x19, 0x4D];
        let apdu = Apdu::decode(&data).unwrap();
        let Apdu::ConfirmedRequest(request) = apdu else {
            panic!("expected confirmed request, got {:?}", apdu);
        };
        assert_eq!(request.header.invoke_id, 1);
        assert_eq!(request.header.max_resp, MaxApduSize::Up480);
        assert!(!request.header.segmented_message);
        assert_eq!(request.service_choice, 12);
        assert_eq!(request.service_data, &data[4..]);
    }

    #[test]
    fn test_decode_segmented_confirmed_request() {
        let data = [0x0A, 0x45, 0x07, 0x02, 0x04, 0x0E, 0xAA];
        let Apdu::ConfirmedRequest(request) = Apdu::decode(&data).unwrap() else {
            panic!("expected confirmed request");
        };
        assert!(request.header.segmented_message);
        assert!(request.header.segmented_response_accepted);
        assert_eq!(request.header.max_segments, MaxSegments::Sixteen);
        assert_eq!(request.header.max_resp, MaxApduSize::Up1476);
        assert_eq!(request.header.sequence_number, 2);
        assert_eq!(request.header.proposed_window_number, 4);
        assert_eq!(request.service_choice, 14);
        assert_eq!(request.service_data, &[0xAA]);
    }

    #[test]
    fn test_truncated_confirmed_request() {
        assert_eq!(
            Apdu::decode(&[0x00, 0x05, 0x01]),
            Err(ApduError::TruncatedPdu {
                needed: 4,
                available: 3
            })
        );
        // Segmented header needs two more octets before the service choice
        assert!(matches!(
            Apdu::decode(&[0x08, 0x05, 0x01, 0x00]),
            Err(ApduError::TruncatedPdu { .. })
        ));
        assert!(matches!(Apdu::decode(&[]), Err(ApduError::TruncatedPdu { .. })));
    }

    #[test]
    fn test_unknown_pdu_type() {
        assert_eq!(Apdu::decode(&[0x80, 0x00]), Err(ApduError::UnknownPduType(8)));
        assert_eq!(PduType::from_header(0xF0), Err(ApduError::UnknownPduType(15)));
    }

    #[test]
    fn test_decode_complex_ack_segmented() {
        let data = [0x3C, 0x11, 0x00, 0x08, 0x0C, 0x01, 0x02];
        let Apdu::ComplexAck(ack) = Apdu::decode(&data).unwrap() else {
            panic!("expected complex ack");
        };
        assert!(ack.segmented_message);
        assert!(ack.more_follows);
        assert_eq!(ack.invoke_id, 0x11);
        assert_eq!(ack.sequence_number, 0);
        assert_eq!(ack.proposed_window_number, 8);
        assert_eq!(ack.service_choice, 12);
        assert_eq!(ack.service_data, &[0x01, 0x02]);
    }

    #[test]
    fn test_decode_error_pdu() {
        // Error for ReadProperty: object / unknown-object
        let data = [0x50, 0x03, 0x0C, 0x91, 0x01, 0x91, 0x1F];
        let Apdu::Error(error) = Apdu::decode(&data).unwrap() else {
            panic!("expected error pdu");
        };
        assert_eq!(error.invoke_id, 3);
        assert_eq!(error.error_class, ErrorClass::Object);
        assert_eq!(error.error_code, ErrorCode::UnknownObject);
    }

    #[test]
    fn test_decode_private_transfer_error() {
        // class 5 (services), code 9 wrapped in context tag 0
        let data = [0x50, 0x07, 0x12, 0x0E, 0x91, 0x05, 0x91, 0x09, 0x0F];
        let Apdu::Error(error) = Apdu::decode(&data).unwrap() else {
            panic!("expected error pdu");
        };
        assert_eq!(error.service_choice, 18);
        assert_eq!(error.error_class, ErrorClass::Services);
        assert_eq!(error.error_code, ErrorCode::InvalidDataType);

        let mut encoded = Vec::new();
        Apdu::Error(error).encode(&mut encoded).unwrap();
        assert_eq!(encoded, data);
    }

    #[test]
    fn test_error_pdu_bad_body() {
        // Class encoded as unsigned instead of enumerated
        assert_eq!(
            Apdu::decode(&[0x50, 0x03, 0x0C, 0x21, 0x01, 0x91, 0x1F]),
            Err(ApduError::Encoding(EncodingError::InvalidTag))
        );
    }

    #[test]
    fn test_decode_segment_ack_reject_abort() {
        assert_eq!(
            Apdu::decode(&[0x43, 0x09, 0x02, 0x04]).unwrap(),
            Apdu::SegmentAck(SegmentAck {
                negative: true,
                server: true,
                invoke_id: 9,
                sequence_number: 2,
                actual_window_size: 4,
            })
        );
        assert_eq!(
            Apdu::decode(&[0x60, 0x04, 0x09]).unwrap(),
            Apdu::Reject(RejectPdu {
                invoke_id: 4,
                reason: RejectReason::UnrecognizedService,
            })
        );
        let abort = Apdu::decode(&[0x71, 0x05, 0x04]).unwrap();
        assert_eq!(
            abort,
            Apdu::Abort(AbortPdu {
                server: true,
                invoke_id: 5,
                reason: AbortReason::SegmentationNotSupported,
            })
        );
        assert_eq!(abort.invoke_id(), Some(5));
    }

    #[test]
    fn test_encode_confirmed_request() {
        let request = Apdu::ConfirmedRequest(ConfirmedRequest {
            header: ConfirmedServiceData::unsegmented(0x42, MaxApduSize::Up480),
            service_choice: ConfirmedServiceChoice::ReadProperty as u8,
            service_data: &[0x0C, 0x02, 0x00, 0x00, 0x01, 0x19, 0x4D],
        });
        let mut buffer = Vec::new();
        request.encode(&mut buffer).unwrap();
        assert_eq!(&buffer[..4], &[0x00, 0x03, 0x42, 0x0C]);
        assert_eq!(Apdu::decode(&buffer).unwrap(), request);
    }

    #[test]
    fn test_max_apdu_size_classes() {
        assert_eq!(MaxApduSize::for_size(480), MaxApduSize::Up480);
        assert_eq!(MaxApduSize::for_size(501), MaxApduSize::Up480);
        assert_eq!(MaxApduSize::for_size(1476), MaxApduSize::Up1476);
        assert_eq!(MaxApduSize::for_size(50), MaxApduSize::Up50);
    }
}
