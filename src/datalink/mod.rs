//! BACnet Data Link Layer Module
//!
//! The data link layer sits between the serial line and the network layer.
//! This crate carries one data link, MS/TP (Master-Slave/Token-Passing,
//! ASHRAE 135 Clause 9), which arbitrates a shared half-duplex EIA-485 line
//! by passing a token between master stations.
//!
//! # Architecture
//!
//! The [`DataLink`] trait is what the protocol stack uses to hand NPDUs down
//! and pick received NPDUs up. [`mstp::MstpNode`] implements it on top of the
//! receive and master/slave state machines.
//!
//! # Examples
//!
//! ```
//! use bacnet_core::datalink::{DataLink, DataLinkAddress};
//! use bacnet_core::datalink::mstp::{MstpConfig, MstpNode, SerialPort};
//!
//! #[derive(Default)]
//! struct Loopback(Vec<Vec<u8>>);
//!
//! impl SerialPort for Loopback {
//!     fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
//!         self.0.push(frame.to_vec());
//!         Ok(())
//!     }
//! }
//!
//! let config = MstpConfig { station_address: 3, ..Default::default() };
//! let mut node = MstpNode::new(config, Loopback::default()).unwrap();
//! assert_eq!(node.local_address(), DataLinkAddress::MsTp(3));
//!
//! // queued until this station holds the token
//! node.send_frame(&[0x01, 0x00, 0x10, 0x08], &DataLinkAddress::Broadcast).unwrap();
//! assert_eq!(node.transmit_queue_len(), 1);
//! ```

use std::fmt;

use thiserror::Error;

pub mod mstp;

/// Result type for data link operations.
pub type Result<T> = std::result::Result<T, DataLinkError>;

/// Errors that can occur during data link layer operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataLinkError {
    /// A frame did not have the MS/TP layout (preamble, frame type, length).
    #[error("invalid frame format")]
    InvalidFrame,

    /// Header or data CRC did not match.
    #[error("CRC check failed")]
    CrcError,

    /// More data than an MS/TP frame can carry.
    #[error("frame data of {0} octets exceeds the MS/TP maximum")]
    FrameTooLong(usize),

    /// The transmit queue has no free slot.
    #[error("transmit queue full")]
    QueueFull,

    /// Address outside the range the operation accepts.
    #[error("address error: {0}")]
    AddressError(String),

    /// Configuration rejected by `validate()`.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The serial port failed to write.
    #[error("serial port error: {0}")]
    Io(String),
}

impl From<std::io::Error> for DataLinkError {
    fn from(err: std::io::Error) -> Self {
        DataLinkError::Io(err.to_string())
    }
}

/// Data link layer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataLinkAddress {
    /// MS/TP station address.
    ///
    /// - 0-127: Master nodes (can initiate communication)
    /// - 128-254: Slave nodes (only respond to requests)
    MsTp(u8),

    /// All stations on the local link (MS/TP address 255).
    Broadcast,
}

impl DataLinkAddress {
    /// The station octet used on the wire
    pub fn mstp_station(&self) -> u8 {
        match self {
            DataLinkAddress::MsTp(station) => *station,
            DataLinkAddress::Broadcast => mstp::MSTP_BROADCAST_ADDRESS,
        }
    }

    /// Address of a station octet, mapping 255 to [`DataLinkAddress::Broadcast`]
    pub fn from_mstp_station(station: u8) -> Self {
        if station == mstp::MSTP_BROADCAST_ADDRESS {
            DataLinkAddress::Broadcast
        } else {
            DataLinkAddress::MsTp(station)
        }
    }
}

impl fmt::Display for DataLinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataLinkAddress::MsTp(station) => write!(f, "MS/TP {}", station),
            DataLinkAddress::Broadcast => write!(f, "broadcast"),
        }
    }
}

/// Common interface between the network layer and a data link.
pub trait DataLink {
    /// Queue an NPDU for `dest`.
    ///
    /// The frame is sent the next time the link is allowed to transmit; for
    /// MS/TP that is when this station holds the token or is answering the
    /// request the NPDU replies to.
    fn send_frame(&mut self, frame: &[u8], dest: &DataLinkAddress) -> Result<()>;

    /// Take the oldest received NPDU and its source, if any.
    fn receive_frame(&mut self) -> Result<Option<(Vec<u8>, DataLinkAddress)>>;

    /// Address of this station.
    fn local_address(&self) -> DataLinkAddress;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_station_mapping() {
        assert_eq!(DataLinkAddress::Broadcast.mstp_station(), 255);
        assert_eq!(DataLinkAddress::MsTp(12).mstp_station(), 12);
        assert_eq!(
            DataLinkAddress::from_mstp_station(255),
            DataLinkAddress::Broadcast
        );
        assert_eq!(
            DataLinkAddress::from_mstp_station(254),
            DataLinkAddress::MsTp(254)
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let err: DataLinkError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "line down").into();
        assert_eq!(err, DataLinkError::Io("line down".to_string()));
    }
}
