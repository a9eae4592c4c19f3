//! BACnet Network Layer Module
//!
//! NPDU header encoding and decoding, and the station address handed to
//! service handlers.
//!
//! # Overview
//!
//! The NPDU contains:
//! - Protocol version
//! - Control information (priority, data expecting reply, etc.)
//! - Destination network address (DNET, DADR)
//! - Source network address (SNET, SADR)
//! - Hop count for routing
//! - Message type, for network layer messages only
//!
//! This crate does not route. Network layer messages are decoded far enough
//! to be recognised and then dropped by the stack.
//!
//! # Example
//!
//! ```
//! use bacnet_core::network::{Npdu, NetworkPriority};
//!
//! let npdu = Npdu::application(true, NetworkPriority::Normal);
//! let encoded = npdu.encode();
//! assert_eq!(encoded, [0x01, 0x04]);
//! let (decoded, consumed) = Npdu::decode(&encoded).unwrap();
//! assert!(decoded.control.expecting_reply);
//! assert_eq!(consumed, 2);
//! ```

use std::fmt;

use heapless::Vec as BoundedVec;
use thiserror::Error;

use crate::BACNET_PROTOCOL_VERSION;

/// Longest MAC address carried in a BACnet address
pub const MAX_MAC_LEN: usize = 7;

/// Network number meaning "all networks"
pub const BACNET_BROADCAST_NETWORK: u16 = 0xFFFF;

/// Result type for network operations
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Errors that can occur in network operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// Invalid NPDU format
    #[error("invalid NPDU: {0}")]
    InvalidNpdu(String),
    /// Version octet other than 1
    #[error("unsupported NPDU version {0}")]
    UnsupportedVersion(u8),
    /// Invalid network address
    #[error("invalid network address")]
    InvalidAddress,
}

/// Network priority carried in the low bits of the control octet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum NetworkPriority {
    #[default]
    Normal = 0,
    Urgent = 1,
    CriticalEquipment = 2,
    LifeSafety = 3,
}

impl From<u8> for NetworkPriority {
    fn from(value: u8) -> Self {
        match value & 0x03 {
            0 => Self::Normal,
            1 => Self::Urgent,
            2 => Self::CriticalEquipment,
            _ => Self::LifeSafety,
        }
    }
}

/// NPDU control flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NpduControl {
    /// Network layer message
    pub network_message: bool,
    /// Destination specifier present
    pub destination_present: bool,
    /// Source specifier present
    pub source_present: bool,
    /// Data expecting reply
    pub expecting_reply: bool,
    pub priority: NetworkPriority,
}

impl NpduControl {
    /// Create control byte from flags
    pub fn to_byte(&self) -> u8 {
        let mut byte = 0u8;
        if self.network_message {
            byte |= 0x80;
        }
        if self.destination_present {
            byte |= 0x20;
        }
        if self.source_present {
            byte |= 0x08;
        }
        if self.expecting_reply {
            byte |= 0x04;
        }
        byte | self.priority as u8
    }

    /// Parse control byte into flags
    pub fn from_byte(byte: u8) -> Self {
        Self {
            network_message: (byte & 0x80) != 0,
            destination_present: (byte & 0x20) != 0,
            source_present: (byte & 0x08) != 0,
            expecting_reply: (byte & 0x04) != 0,
            priority: NetworkPriority::from(byte),
        }
    }
}

/// Network address (network number + MAC address)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAddress {
    /// Network number (65535 = broadcast)
    pub network: u16,
    /// MAC address on that network, empty for a broadcast
    pub address: Vec<u8>,
}

impl NetworkAddress {
    /// Create a new network address
    pub fn new(network: u16, address: Vec<u8>) -> Self {
        Self { network, address }
    }

    /// Check if this is a broadcast address
    pub fn is_broadcast(&self) -> bool {
        self.network == BACNET_BROADCAST_NETWORK || self.address.is_empty()
    }
}

/// Network Protocol Data Unit header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Npdu {
    /// Protocol version (always 1)
    pub version: u8,
    /// Control information
    pub control: NpduControl,
    /// Destination network address
    pub destination: Option<NetworkAddress>,
    /// Source network address
    pub source: Option<NetworkAddress>,
    /// Hop count (only present if destination is present)
    pub hop_count: Option<u8>,
    /// Message type (only present for network layer messages)
    pub message_type: Option<u8>,
}

impl Npdu {
    /// Create a new NPDU with default values
    pub fn new() -> Self {
        Self {
            version: BACNET_PROTOCOL_VERSION,
            control: NpduControl::default(),
            destination: None,
            source: None,
            hop_count: None,
            message_type: None,
        }
    }

    /// Header for an APDU on the local network
    pub fn application(expecting_reply: bool, priority: NetworkPriority) -> Self {
        let mut npdu = Self::new();
        npdu.control.expecting_reply = expecting_reply;
        npdu.control.priority = priority;
        npdu
    }

    /// Header for an APDU addressed to `dest`, adding DNET/DADR when the
    /// station sits behind a router
    pub fn to_address(dest: &BacnetAddress, expecting_reply: bool, priority: NetworkPriority) -> Self {
        let mut npdu = Self::application(expecting_reply, priority);
        if dest.net != 0 {
            npdu.control.destination_present = true;
            npdu.destination = Some(NetworkAddress::new(dest.net, dest.adr.to_vec()));
            npdu.hop_count = Some(255);
        }
        npdu
    }

    /// Check if this is a network layer message
    pub fn is_network_message(&self) -> bool {
        self.control.network_message
    }

    /// Encode NPDU to bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(8);
        self.encode_into(&mut buffer);
        buffer
    }

    /// Append the encoded header to `buffer`
    pub fn encode_into(&self, buffer: &mut Vec<u8>) {
        buffer.push(self.version);
        buffer.push(self.control.to_byte());

        if let Some(ref dest) = self.destination {
            buffer.extend_from_slice(&dest.network.to_be_bytes());
            buffer.push(dest.address.len() as u8);
            buffer.extend_from_slice(&dest.address);
        }

        if let Some(ref src) = self.source {
            buffer.extend_from_slice(&src.network.to_be_bytes());
            buffer.push(src.address.len() as u8);
            buffer.extend_from_slice(&src.address);
        }

        if self.destination.is_some() {
            buffer.push(self.hop_count.unwrap_or(255));
        }

        if self.control.network_message {
            buffer.push(self.message_type.unwrap_or(0));
        }
    }

    /// Decode NPDU header. Returns the header and the octets it occupied.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 2 {
            return Err(NetworkError::InvalidNpdu("NPDU too short".to_string()));
        }

        let version = data[0];
        if version != BACNET_PROTOCOL_VERSION {
            return Err(NetworkError::UnsupportedVersion(version));
        }

        let control = NpduControl::from_byte(data[1]);
        let mut pos = 2;

        let destination = if control.destination_present {
            Some(decode_network_address(data, &mut pos, "destination")?)
        } else {
            None
        };

        let source = if control.source_present {
            let source = decode_network_address(data, &mut pos, "source")?;
            // SNET may not be a broadcast and SADR may not be empty
            if source.is_broadcast() {
                return Err(NetworkError::InvalidAddress);
            }
            Some(source)
        } else {
            None
        };

        let hop_count = if destination.is_some() {
            let hc = *data
                .get(pos)
                .ok_or_else(|| NetworkError::InvalidNpdu("Missing hop count".to_string()))?;
            pos += 1;
            Some(hc)
        } else {
            None
        };

        let message_type = if control.network_message {
            let mt = *data
                .get(pos)
                .ok_or_else(|| NetworkError::InvalidNpdu("Missing message type".to_string()))?;
            pos += 1;
            Some(mt)
        } else {
            None
        };

        let npdu = Npdu {
            version,
            control,
            destination,
            source,
            hop_count,
            message_type,
        };

        Ok((npdu, pos))
    }
}

fn decode_network_address(data: &[u8], pos: &mut usize, which: &str) -> Result<NetworkAddress> {
    let header = data
        .get(*pos..*pos + 3)
        .ok_or_else(|| NetworkError::InvalidNpdu(format!("Invalid {} address", which)))?;
    let network = u16::from_be_bytes([header[0], header[1]]);
    let addr_len = header[2] as usize;
    *pos += 3;

    let address = data.get(*pos..*pos + addr_len).ok_or_else(|| {
        NetworkError::InvalidNpdu(format!("Invalid {} address length", which))
    })?;
    *pos += addr_len;

    Ok(NetworkAddress::new(network, address.to_vec()))
}

impl Default for Npdu {
    fn default() -> Self {
        Self::new()
    }
}

/// Address of a BACnet station as seen by the application layer
///
/// `mac` is the data link address of the station the PDU arrived from (the
/// router, for remote stations). `net` and `adr` carry SNET/SADR when the
/// PDU was routed; `net == 0` means the local network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BacnetAddress {
    pub mac: BoundedVec<u8, MAX_MAC_LEN>,
    pub net: u16,
    pub adr: BoundedVec<u8, MAX_MAC_LEN>,
}

impl BacnetAddress {
    /// A station on the local MS/TP segment
    pub fn mstp(station: u8) -> Self {
        let mut mac = BoundedVec::new();
        // capacity is at least one octet
        let _ = mac.push(station);
        Self {
            mac,
            net: 0,
            adr: BoundedVec::new(),
        }
    }

    /// Local broadcast
    pub fn local_broadcast() -> Self {
        Self::default()
    }

    /// Build the peer address for a PDU received from `mac`, taking SNET/SADR
    /// from the NPDU when present
    pub fn from_npdu(mac: &[u8], npdu: &Npdu) -> Result<Self> {
        let mac = BoundedVec::from_slice(mac).map_err(|_| NetworkError::InvalidAddress)?;
        let (net, adr) = match &npdu.source {
            Some(source) => (
                source.network,
                BoundedVec::from_slice(&source.address).map_err(|_| NetworkError::InvalidAddress)?,
            ),
            None => (0, BoundedVec::new()),
        };
        Ok(Self { mac, net, adr })
    }

    pub fn is_broadcast(&self) -> bool {
        self.mac.is_empty() || self.net == BACNET_BROADCAST_NETWORK
    }

    /// The MS/TP station number, when the MAC is a single octet
    pub fn mstp_station(&self) -> Option<u8> {
        match self.mac.as_slice() {
            [station] => Some(*station),
            _ => None,
        }
    }
}

impl fmt::Display for BacnetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mac.is_empty() {
            write!(f, "broadcast")?;
        } else {
            write!(f, "{}", hex::encode_upper(&self.mac))?;
        }
        if self.net != 0 {
            write!(f, "@{}:{}", self.net, hex::encode_upper(&self.adr))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_byte() {
        let control = NpduControl::from_byte(0x2D);
        assert!(control.destination_present);
        assert!(control.source_present);
        assert!(control.expecting_reply);
        assert_eq!(control.priority, NetworkPriority::Urgent);
        assert_eq!(control.to_byte(), 0x2D);
    }

    #[test]
    fn test_decode_routed_npdu() {
        // DNET 5 / DADR 0x10, SNET 7 / SADR 0x20 0x21, hop count 254
        let data = [
            0x01, 0x28, 0x00, 0x05, 0x01, 0x10, 0x00, 0x07, 0x02, 0x20, 0x21, 0xFE, 0x10, 0x08,
        ];
        let (npdu, consumed) = Npdu::decode(&data).unwrap();
        assert_eq!(consumed, 12);
        assert_eq!(npdu.destination, Some(NetworkAddress::new(5, vec![0x10])));
        assert_eq!(npdu.source, Some(NetworkAddress::new(7, vec![0x20, 0x21])));
        assert_eq!(npdu.hop_count, Some(0xFE));

        let address = BacnetAddress::from_npdu(&[3], &npdu).unwrap();
        assert_eq!(address.mstp_station(), Some(3));
        assert_eq!(address.net, 7);
        assert_eq!(address.adr.as_slice(), &[0x20, 0x21]);
    }

    #[test]
    fn test_decode_network_message_type() {
        let (npdu, consumed) = Npdu::decode(&[0x01, 0x80, 0x00, 0xFF]).unwrap();
        assert!(npdu.is_network_message());
        assert_eq!(npdu.message_type, Some(0x00));
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(Npdu::decode(&[0x01]), Err(NetworkError::InvalidNpdu(_))));
        assert_eq!(
            Npdu::decode(&[0x02, 0x00]),
            Err(NetworkError::UnsupportedVersion(2))
        );
        // Destination present but truncated
        assert!(matches!(
            Npdu::decode(&[0x01, 0x20, 0x00]),
            Err(NetworkError::InvalidNpdu(_))
        ));
        // SADR may not be empty
        assert_eq!(
            Npdu::decode(&[0x01, 0x08, 0x00, 0x07, 0x00]),
            Err(NetworkError::InvalidAddress)
        );
    }

    #[test]
    fn test_reply_header_to_routed_station() {
        let mut dest = BacnetAddress::mstp(9);
        dest.net = 12;
        dest.adr = BoundedVec::from_slice(&[0x44]).unwrap();
        let npdu = Npdu::to_address(&dest, false, NetworkPriority::Normal);
        assert_eq!(npdu.encode(), [0x01, 0x20, 0x00, 0x0C, 0x01, 0x44, 0xFF]);

        let local = Npdu::to_address(&BacnetAddress::mstp(9), false, NetworkPriority::Normal);
        assert_eq!(local.encode(), [0x01, 0x00]);
    }

    #[test]
    fn test_address_display() {
        assert_eq!(BacnetAddress::mstp(0x1F).to_string(), "1F");
        assert_eq!(BacnetAddress::local_broadcast().to_string(), "broadcast");
        assert!(BacnetAddress::local_broadcast().is_broadcast());
    }
}
