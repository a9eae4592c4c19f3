#![doc = include_str!("../README.md")]

pub mod app;
pub mod datalink;
pub mod encoding;
pub mod network;
pub mod service;
pub mod stack;
pub mod util;

#[doc(hidden)]
pub mod __private {
    pub use pastey::paste;
}

// Re-export main types without glob imports to avoid conflicts
pub use app::dcc::{CommunicationControl, CommunicationState, DccConfig, DccDuration};
pub use app::dispatch::{
    ApduDispatcher, DispatchOutcome, DispatchTable, ServiceContext, ServiceHandler,
};
pub use app::{Apdu, ApduError, PduType};
pub use datalink::mstp::{MstpConfig, MstpNode, SerialPort};
pub use datalink::{DataLink, DataLinkAddress, DataLinkError};
pub use encoding::EncodingError;
pub use network::{BacnetAddress, Npdu};
pub use service::{ConfirmedServiceChoice, ServiceError, UnconfirmedServiceChoice};
pub use stack::{ProtocolStack, StackConfig, StackError};

/// NPDU protocol version
pub const BACNET_PROTOCOL_VERSION: u8 = 1;

/// Largest APDU any BACnet data link carries
pub const BACNET_MAX_APDU: usize = 1476;
