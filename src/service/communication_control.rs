//! DeviceCommunicationControl service request
//!
//! ```text
//! DeviceCommunicationControl-Request ::= SEQUENCE {
//!     timeDuration    [0] Unsigned16 OPTIONAL,   -- minutes
//!     enable-disable  [1] ENUMERATED { enable, disable, disable-initiation },
//!     password        [2] CharacterString (SIZE(1..20)) OPTIONAL
//! }
//! ```

use crate::encoding::context::{
    decode_context_character_string, decode_context_enumerated, decode_context_unsigned,
    encode_context_character_string, encode_context_enumerated, encode_context_unsigned,
};
use crate::encoding::{decode_tag, Result as EncodingResult};

use super::{RejectReason, Result, ServiceError};

/// Longest password a DeviceCommunicationControl request may carry
pub const DCC_PASSWORD_MAX_CHARS: usize = 20;

/// The enable-disable parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum EnableDisable {
    Enable = 0,
    Disable = 1,
    DisableInitiation = 2,
}

impl TryFrom<u32> for EnableDisable {
    type Error = ServiceError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::Enable),
            1 => Ok(Self::Disable),
            2 => Ok(Self::DisableInitiation),
            _ => Err(ServiceError::Rejected(RejectReason::UndefinedEnumeration)),
        }
    }
}

/// Decoded DeviceCommunicationControl request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCommunicationControlRequest {
    /// Duration in minutes; absent means indefinitely
    pub time_duration: Option<u16>,
    pub enable_disable: EnableDisable,
    pub password: Option<String>,
}

impl DeviceCommunicationControlRequest {
    pub fn new(enable_disable: EnableDisable) -> Self {
        Self {
            time_duration: None,
            enable_disable,
            password: None,
        }
    }

    pub fn with_duration(mut self, minutes: u16) -> Self {
        self.time_duration = Some(minutes);
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Encode the service parameters (everything after the service choice)
    pub fn encode(&self, buffer: &mut Vec<u8>) -> EncodingResult<()> {
        if let Some(minutes) = self.time_duration {
            encode_context_unsigned(buffer, 0, minutes as u32)?;
        }
        encode_context_enumerated(buffer, 1, self.enable_disable as u32)?;
        if let Some(password) = &self.password {
            encode_context_character_string(buffer, 2, password)?;
        }
        Ok(())
    }

    /// Decode the service parameters
    ///
    /// Failures carry the reject reason the request should be answered with.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut pos = 0;

        let mut time_duration = None;
        if next_is_context(data, pos, 0)? {
            let (minutes, consumed) = decode_context_unsigned(&data[pos..], 0)?;
            let minutes = u16::try_from(minutes)
                .map_err(|_| ServiceError::Rejected(RejectReason::ParameterOutOfRange))?;
            time_duration = Some(minutes);
            pos += consumed;
        }

        if !next_is_context(data, pos, 1)? {
            return Err(ServiceError::Rejected(
                RejectReason::MissingRequiredParameter,
            ));
        }
        let (value, consumed) = decode_context_enumerated(&data[pos..], 1)?;
        let enable_disable = EnableDisable::try_from(value)?;
        pos += consumed;

        let mut password = None;
        if next_is_context(data, pos, 2)? {
            let (value, consumed) = decode_context_character_string(&data[pos..], 2)?;
            let chars = value.chars().count();
            if chars == 0 || chars > DCC_PASSWORD_MAX_CHARS {
                return Err(ServiceError::Rejected(RejectReason::ParameterOutOfRange));
            }
            password = Some(value);
            pos += consumed;
        }

        if pos < data.len() {
            return Err(ServiceError::Rejected(RejectReason::TooManyArguments));
        }

        Ok(Self {
            time_duration,
            enable_disable,
            password,
        })
    }
}

fn next_is_context(data: &[u8], pos: usize, number: u8) -> Result<bool> {
    if pos >= data.len() {
        return Ok(false);
    }
    let (tag, _) = decode_tag(&data[pos..])?;
    Ok(tag.is_context(number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_full_request() {
        let request = DeviceCommunicationControlRequest::new(EnableDisable::Disable)
            .with_duration(30)
            .with_password("abc");
        let mut buffer = Vec::new();
        request.encode(&mut buffer).unwrap();
        assert_eq!(
            buffer,
            [0x09, 0x1E, 0x19, 0x01, 0x2C, 0x00, b'a', b'b', b'c']
        );
        assert_eq!(DeviceCommunicationControlRequest::decode(&buffer).unwrap(), request);
    }

    #[test]
    fn test_decode_without_optional_parameters() {
        let request = DeviceCommunicationControlRequest::decode(&[0x19, 0x02]).unwrap();
        assert_eq!(request.enable_disable, EnableDisable::DisableInitiation);
        assert_eq!(request.time_duration, None);
        assert_eq!(request.password, None);
    }

    #[test]
    fn test_decode_missing_enable_disable() {
        let err = DeviceCommunicationControlRequest::decode(&[0x09, 0x05]).unwrap_err();
        assert_eq!(err.reject_reason(), RejectReason::MissingRequiredParameter);
    }

    #[test]
    fn test_decode_undefined_enumeration() {
        let err = DeviceCommunicationControlRequest::decode(&[0x19, 0x03]).unwrap_err();
        assert_eq!(err.reject_reason(), RejectReason::UndefinedEnumeration);
    }

    #[test]
    fn test_decode_duration_out_of_range() {
        // 70000 minutes does not fit Unsigned16
        let err =
            DeviceCommunicationControlRequest::decode(&[0x0B, 0x01, 0x11, 0x70, 0x19, 0x01])
                .unwrap_err();
        assert_eq!(err.reject_reason(), RejectReason::ParameterOutOfRange);
    }

    #[test]
    fn test_decode_password_too_long() {
        let request = DeviceCommunicationControlRequest::new(EnableDisable::Disable)
            .with_password("a".repeat(21));
        let mut buffer = Vec::new();
        request.encode(&mut buffer).unwrap();
        let err = DeviceCommunicationControlRequest::decode(&buffer).unwrap_err();
        assert_eq!(err.reject_reason(), RejectReason::ParameterOutOfRange);
    }

    #[test]
    fn test_decode_trailing_data() {
        let err = DeviceCommunicationControlRequest::decode(&[0x19, 0x00, 0x39, 0x00])
            .unwrap_err();
        assert_eq!(err.reject_reason(), RejectReason::TooManyArguments);
    }
}
