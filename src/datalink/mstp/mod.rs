//! BACnet MS/TP (Master-Slave/Token-Passing) Data Link Implementation
//!
//! This module implements the BACnet MS/TP data link layer as defined in ASHRAE 135 Clause 9.
//! MS/TP provides multi-drop, half-duplex communication over EIA-485 (RS-485) physical layer.
//!
//! # Overview
//!
//! MS/TP provides:
//! - Token-passing protocol for medium access control ([`node`])
//! - Master and slave node support
//! - Octet-by-octet frame reception with CRC checks ([`receive`])
//! - Silence timing driven by explicit ticks or an injected clock ([`clock`])
//! - Support for up to 128 master nodes (addresses 0-127)
//! - Support for up to 127 slave nodes (addresses 128-254)
//!
//! # Frame Format
//!
//! MS/TP Frame:
//! - Preamble (2 bytes): 0x55, 0xFF
//! - Frame Type (1 byte)
//! - Destination Address (1 byte)
//! - Source Address (1 byte)
//! - Data Length (2 bytes, most significant first)
//! - Header CRC (1 byte)
//! - Data (0-501 bytes)
//! - Data CRC (2 bytes, least significant first) - only if data length > 0

pub mod clock;
pub mod node;
pub mod receive;

pub use clock::{Clock, ClockDriver, ManualClock, SystemClock};
pub use node::{MasterState, MstpNode, MstpStatistics, ReceivedPdu, SerialPort};
pub use receive::{ReceiveEvent, ReceiveFsm, ReceiveState, ReceivedFrame};

use crate::datalink::{DataLinkError, Result};
use crate::util::{crc16_mstp, crc8_mstp_header};

/// MS/TP frame preamble bytes
pub const MSTP_PREAMBLE_55: u8 = 0x55;
pub const MSTP_PREAMBLE_FF: u8 = 0xFF;

/// Maximum MS/TP data length
pub const MSTP_MAX_DATA_LENGTH: usize = 501;

/// Largest APDU carried in one MS/TP frame
pub const MSTP_MAX_APDU: usize = 480;

/// MS/TP header size (preamble and header CRC included)
pub const MSTP_HEADER_SIZE: usize = 8;

/// MS/TP maximum frame size
pub const MSTP_MAX_FRAME_SIZE: usize = MSTP_HEADER_SIZE + MSTP_MAX_DATA_LENGTH + 2;

/// Destination address of a frame for every station
pub const MSTP_BROADCAST_ADDRESS: u8 = 255;

/// Highest master address
pub const MSTP_MAX_MASTER: u8 = 127;

/// Tokens passed between maintenance Poll For Master cycles
pub const NPOLL: u8 = 50;

/// Retries of a token pass before looking for a new successor
pub const NRETRY_TOKEN: u8 = 1;

/// Octets that must be seen before the line counts as active
pub const NMIN_OCTETS: u8 = 4;

/// Silence after which the token is assumed lost (ms)
pub const T_NO_TOKEN: u32 = 500;

/// Per-address slot used when generating a new token (ms)
pub const T_SLOT: u32 = 10;

/// Time a station may take to answer a DataExpectingReply frame (ms)
pub const T_REPLY_DELAY: u32 = 250;

/// Time to wait for a reply before giving up (ms)
pub const T_REPLY_TIMEOUT: u32 = 295;

/// Time the token receiver has to start using it (ms)
pub const T_USAGE_TIMEOUT: u32 = 95;

/// Maximum silence inside a frame (ms)
pub const T_FRAME_ABORT: u32 = 95;

/// MS/TP frame types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MstpFrameType {
    /// Token frame
    Token = 0,
    /// Poll For Master frame
    PollForMaster = 1,
    /// Reply To Poll For Master frame
    ReplyToPollForMaster = 2,
    /// Test Request frame
    TestRequest = 3,
    /// Test Response frame
    TestResponse = 4,
    /// BACnet Data Expecting Reply frame
    BacnetDataExpectingReply = 5,
    /// BACnet Data Not Expecting Reply frame
    BacnetDataNotExpectingReply = 6,
    /// Reply Postponed frame
    ReplyPostponed = 7,
}

impl MstpFrameType {
    /// Convert from u8; proprietary types (128-255) are `None`
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Token),
            1 => Some(Self::PollForMaster),
            2 => Some(Self::ReplyToPollForMaster),
            3 => Some(Self::TestRequest),
            4 => Some(Self::TestResponse),
            5 => Some(Self::BacnetDataExpectingReply),
            6 => Some(Self::BacnetDataNotExpectingReply),
            7 => Some(Self::ReplyPostponed),
            _ => None,
        }
    }
}

/// MS/TP frame structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MstpFrame {
    /// Frame type
    pub frame_type: MstpFrameType,
    /// Destination address
    pub destination: u8,
    /// Source address
    pub source: u8,
    /// Frame data
    pub data: heapless::Vec<u8, MSTP_MAX_DATA_LENGTH>,
}

impl MstpFrame {
    /// Create a new MS/TP frame
    pub fn new(
        frame_type: MstpFrameType,
        destination: u8,
        source: u8,
        data: &[u8],
    ) -> Result<Self> {
        let data = heapless::Vec::from_slice(data)
            .map_err(|_| DataLinkError::FrameTooLong(data.len()))?;
        Ok(Self {
            frame_type,
            destination,
            source,
            data,
        })
    }

    /// Create a frame without data
    pub fn control(frame_type: MstpFrameType, destination: u8, source: u8) -> Self {
        Self {
            frame_type,
            destination,
            source,
            data: heapless::Vec::new(),
        }
    }

    /// Create a token frame
    pub fn token(destination: u8, source: u8) -> Self {
        Self::control(MstpFrameType::Token, destination, source)
    }

    /// Create a BACnet data frame
    pub fn bacnet_data(
        destination: u8,
        source: u8,
        data: &[u8],
        expecting_reply: bool,
    ) -> Result<Self> {
        let frame_type = if expecting_reply {
            MstpFrameType::BacnetDataExpectingReply
        } else {
            MstpFrameType::BacnetDataNotExpectingReply
        };
        Self::new(frame_type, destination, source, data)
    }

    /// The five octets the header CRC covers
    fn header(&self) -> [u8; 5] {
        let length = (self.data.len() as u16).to_be_bytes();
        [
            self.frame_type as u8,
            self.destination,
            self.source,
            length[0],
            length[1],
        ]
    }

    /// Append the encoded frame to `buffer`
    pub fn encode_into(&self, buffer: &mut Vec<u8>) {
        let header = self.header();
        buffer.reserve(MSTP_HEADER_SIZE + self.data.len() + 2);
        buffer.push(MSTP_PREAMBLE_55);
        buffer.push(MSTP_PREAMBLE_FF);
        buffer.extend_from_slice(&header);
        buffer.push(crc8_mstp_header(&header));

        if !self.data.is_empty() {
            buffer.extend_from_slice(&self.data);
            buffer.extend_from_slice(&crc16_mstp(&self.data).to_le_bytes());
        }
    }

    /// Encode frame to bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(MSTP_HEADER_SIZE + self.data.len() + 2);
        self.encode_into(&mut frame);
        frame
    }

    /// Decode one complete frame
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < MSTP_HEADER_SIZE {
            return Err(DataLinkError::InvalidFrame);
        }
        if data[0] != MSTP_PREAMBLE_55 || data[1] != MSTP_PREAMBLE_FF {
            return Err(DataLinkError::InvalidFrame);
        }
        if crc8_mstp_header(&data[2..7]) != data[7] {
            return Err(DataLinkError::CrcError);
        }

        let frame_type = MstpFrameType::from_u8(data[2]).ok_or(DataLinkError::InvalidFrame)?;
        let destination = data[3];
        let source = data[4];
        let data_length = u16::from_be_bytes([data[5], data[6]]) as usize;

        let expected_size = if data_length > 0 {
            MSTP_HEADER_SIZE + data_length + 2
        } else {
            MSTP_HEADER_SIZE
        };
        if data.len() != expected_size {
            return Err(DataLinkError::InvalidFrame);
        }

        let payload = &data[MSTP_HEADER_SIZE..MSTP_HEADER_SIZE + data_length];
        if data_length > 0 {
            let crc = u16::from_le_bytes([data[expected_size - 2], data[expected_size - 1]]);
            if crc16_mstp(payload) != crc {
                return Err(DataLinkError::CrcError);
            }
        }

        Self::new(frame_type, destination, source, payload)
    }

    /// Check if this is a token frame
    pub fn is_token(&self) -> bool {
        self.frame_type == MstpFrameType::Token
    }

    /// Check if this is a data frame
    pub fn is_data(&self) -> bool {
        matches!(
            self.frame_type,
            MstpFrameType::BacnetDataExpectingReply | MstpFrameType::BacnetDataNotExpectingReply
        )
    }
}

/// MS/TP node configuration
///
/// Timing values are in milliseconds and default to the values of Clause 9.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MstpConfig {
    /// Local station address (0-127 master, 128-254 slave)
    pub station_address: u8,
    /// Maximum master address (highest master on network)
    pub max_master: u8,
    /// Maximum info frames (number of frames to send when holding token)
    pub max_info_frames: u8,
    /// Tno_token
    pub no_token_timeout: u32,
    /// Tslot
    pub slot_time: u32,
    /// Treply_delay
    pub reply_delay: u32,
    /// Treply_timeout
    pub reply_timeout: u32,
    /// Tusage_timeout
    pub usage_timeout: u32,
    /// Tframe_abort
    pub frame_abort: u32,
}

impl Default for MstpConfig {
    fn default() -> Self {
        Self {
            station_address: 1,
            max_master: MSTP_MAX_MASTER,
            max_info_frames: 1,
            no_token_timeout: T_NO_TOKEN,
            slot_time: T_SLOT,
            reply_delay: T_REPLY_DELAY,
            reply_timeout: T_REPLY_TIMEOUT,
            usage_timeout: T_USAGE_TIMEOUT,
            frame_abort: T_FRAME_ABORT,
        }
    }
}

impl MstpConfig {
    pub fn validate(&self) -> Result<()> {
        if self.station_address == MSTP_BROADCAST_ADDRESS {
            return Err(DataLinkError::AddressError(
                "station address 255 is the broadcast address".to_string(),
            ));
        }
        if self.max_master > MSTP_MAX_MASTER {
            return Err(DataLinkError::InvalidConfig(format!(
                "max_master {} exceeds {}",
                self.max_master, MSTP_MAX_MASTER
            )));
        }
        if is_master_node(self.station_address) && self.station_address > self.max_master {
            return Err(DataLinkError::InvalidConfig(format!(
                "station {} is above max_master {}",
                self.station_address, self.max_master
            )));
        }
        if self.max_info_frames == 0 {
            return Err(DataLinkError::InvalidConfig(
                "max_info_frames must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Check if address is a master node
pub fn is_master_node(address: u8) -> bool {
    address <= MSTP_MAX_MASTER
}

/// Check if address is a slave node
pub fn is_slave_node(address: u8) -> bool {
    (128..=254).contains(&address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_token_frame_bytes() {
        let frame = MstpFrame::token(0x10, 0x05);
        assert_eq!(
            frame.encode(),
            [0x55, 0xFF, 0x00, 0x10, 0x05, 0x00, 0x00, 0x8C]
        );
    }

    #[test]
    fn test_data_frame_bytes() {
        let frame = MstpFrame::bacnet_data(0x01, 0x02, &[0x01, 0x22, 0x30], false).unwrap();
        let encoded = frame.encode();
        assert_eq!(&encoded[2..7], &[0x06, 0x01, 0x02, 0x00, 0x03]);
        assert_eq!(&encoded[8..11], &[0x01, 0x22, 0x30]);
        // CRC 0xBD10, least significant octet first
        assert_eq!(&encoded[11..], &[0x10, 0xBD]);
        assert_eq!(MstpFrame::decode(&encoded).unwrap(), frame);
    }

    #[test]
    fn test_frame_validation() {
        // Wrong first preamble byte
        let mut bad_frame = MstpFrame::token(5, 3).encode();
        bad_frame[0] = 0x00;
        assert_eq!(MstpFrame::decode(&bad_frame), Err(DataLinkError::InvalidFrame));

        // Header CRC
        let mut bad_frame = MstpFrame::token(5, 3).encode();
        bad_frame[4] = 0x04;
        assert_eq!(MstpFrame::decode(&bad_frame), Err(DataLinkError::CrcError));

        // Data CRC
        let mut bad_frame = MstpFrame::bacnet_data(5, 3, &[1, 2, 3], true)
            .unwrap()
            .encode();
        bad_frame[9] ^= 0xFF;
        assert_eq!(MstpFrame::decode(&bad_frame), Err(DataLinkError::CrcError));

        // Too short
        assert!(MstpFrame::decode(&[0x55, 0xFF, 0x00]).is_err());
    }

    #[test]
    fn test_max_data_length() {
        let data = vec![0u8; MSTP_MAX_DATA_LENGTH + 1];
        assert_eq!(
            MstpFrame::bacnet_data(10, 20, &data, false),
            Err(DataLinkError::FrameTooLong(MSTP_MAX_DATA_LENGTH + 1))
        );

        let data = vec![0u8; MSTP_MAX_DATA_LENGTH];
        assert!(MstpFrame::bacnet_data(10, 20, &data, false).is_ok());
    }

    #[test]
    fn test_address_classes() {
        assert!(is_master_node(0));
        assert!(is_master_node(127));
        assert!(!is_master_node(128));

        assert!(!is_slave_node(127));
        assert!(is_slave_node(128));
        assert!(is_slave_node(254));
        assert!(!is_slave_node(255));
    }

    #[test]
    fn test_config_validation() {
        assert!(MstpConfig::default().validate().is_ok());

        let broadcast = MstpConfig {
            station_address: 255,
            ..Default::default()
        };
        assert!(matches!(
            broadcast.validate(),
            Err(DataLinkError::AddressError(_))
        ));

        let above_max_master = MstpConfig {
            station_address: 20,
            max_master: 10,
            ..Default::default()
        };
        assert!(above_max_master.validate().is_err());

        let slave = MstpConfig {
            station_address: 200,
            max_master: 10,
            ..Default::default()
        };
        assert!(slave.validate().is_ok());

        let no_frames = MstpConfig {
            max_info_frames: 0,
            ..Default::default()
        };
        assert!(no_frames.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_frames_decode_to_themselves(
            frame_type in 0u8..8,
            destination in any::<u8>(),
            source in any::<u8>(),
            data in prop::collection::vec(any::<u8>(), 0..MSTP_MAX_DATA_LENGTH),
        ) {
            let frame_type = MstpFrameType::from_u8(frame_type).unwrap();
            let frame = MstpFrame::new(frame_type, destination, source, &data).unwrap();
            prop_assert_eq!(MstpFrame::decode(&frame.encode()).unwrap(), frame);
        }
    }
}
