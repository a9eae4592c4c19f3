//! BACnet Application Layer Services
//!
//! Service identifiers and the protocol-level outcome codes that travel in
//! Error, Reject and Abort PDUs.
//!
//! # Overview
//!
//! - [`ConfirmedServiceChoice`] and [`UnconfirmedServiceChoice`]: the service
//!   codes the dispatcher indexes its handler tables by
//! - [`RejectReason`], [`AbortReason`], [`ErrorClass`], [`ErrorCode`]: outcome
//!   codes, each with a vendor-proprietary range
//! - [`ProtocolServicesSupported`]: the bitfield a device reports for the
//!   services it executes
//! - [`DeviceCommunicationControlRequest`]: the one service request this crate
//!   decodes itself, because the communication-control gate depends on it
//!
//! # Example
//!
//! ```
//! use bacnet_core::service::{ConfirmedServiceChoice, ProtocolServicesSupported};
//!
//! let choice = ConfirmedServiceChoice::try_from(12).unwrap();
//! assert_eq!(choice, ConfirmedServiceChoice::ReadProperty);
//! assert_eq!(
//!     ProtocolServicesSupported::from_confirmed(choice),
//!     ProtocolServicesSupported::READ_PROPERTY
//! );
//! ```

mod communication_control;

pub use communication_control::{
    DeviceCommunicationControlRequest, EnableDisable, DCC_PASSWORD_MAX_CHARS,
};

use bitflags::bitflags;
use thiserror::Error;

use crate::encoding::EncodingError;

/// Result type for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors that can occur while decoding a service request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The request must be answered with a Reject PDU
    #[error("service request rejected: {0}")]
    Rejected(RejectReason),
    /// Unknown service choice
    #[error("unsupported service choice: {0}")]
    UnsupportedServiceChoice(u8),
    /// Encoding/decoding error
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

impl ServiceError {
    /// Reject reason to answer a malformed request with
    pub fn reject_reason(&self) -> RejectReason {
        match self {
            ServiceError::Rejected(reason) => *reason,
            ServiceError::UnsupportedServiceChoice(_) => RejectReason::UnrecognizedService,
            ServiceError::Encoding(EncodingError::InvalidTag) => RejectReason::InvalidTag,
            ServiceError::Encoding(EncodingError::BufferUnderflow) => {
                RejectReason::MissingRequiredParameter
            }
            ServiceError::Encoding(EncodingError::ValueOutOfRange) => {
                RejectReason::ParameterOutOfRange
            }
            ServiceError::Encoding(EncodingError::UnsupportedCharacterSet(_)) => {
                RejectReason::InvalidParameterDataType
            }
            ServiceError::Encoding(_) => RejectReason::Other,
        }
    }
}

/// Confirmed service choices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConfirmedServiceChoice {
    // Alarm and Event Services
    AcknowledgeAlarm = 0,
    ConfirmedCovNotification = 1,
    ConfirmedEventNotification = 2,
    GetAlarmSummary = 3,
    GetEnrollmentSummary = 4,
    SubscribeCov = 5,

    // File Access Services
    AtomicReadFile = 6,
    AtomicWriteFile = 7,

    // Object Access Services
    AddListElement = 8,
    RemoveListElement = 9,
    CreateObject = 10,
    DeleteObject = 11,
    ReadProperty = 12,
    ReadPropertyConditional = 13,
    ReadPropertyMultiple = 14,
    WriteProperty = 15,
    WritePropertyMultiple = 16,

    // Remote Device Management Services
    DeviceCommunicationControl = 17,
    ConfirmedPrivateTransfer = 18,
    ConfirmedTextMessage = 19,
    ReinitializeDevice = 20,

    // Virtual Terminal Services
    VtOpen = 21,
    VtClose = 22,
    VtData = 23,

    // Security Services
    Authenticate = 24,
    RequestKey = 25,

    // Other Services
    ReadRange = 26,
    LifeSafetyOperation = 27,
    SubscribeCovProperty = 28,
    GetEventInformation = 29,
}

/// Number of confirmed service codes known to this crate
pub const MAX_CONFIRMED_SERVICES: usize = 30;

impl ConfirmedServiceChoice {
    /// All confirmed services, in service-code order
    pub const ALL: [ConfirmedServiceChoice; MAX_CONFIRMED_SERVICES] = [
        Self::AcknowledgeAlarm,
        Self::ConfirmedCovNotification,
        Self::ConfirmedEventNotification,
        Self::GetAlarmSummary,
        Self::GetEnrollmentSummary,
        Self::SubscribeCov,
        Self::AtomicReadFile,
        Self::AtomicWriteFile,
        Self::AddListElement,
        Self::RemoveListElement,
        Self::CreateObject,
        Self::DeleteObject,
        Self::ReadProperty,
        Self::ReadPropertyConditional,
        Self::ReadPropertyMultiple,
        Self::WriteProperty,
        Self::WritePropertyMultiple,
        Self::DeviceCommunicationControl,
        Self::ConfirmedPrivateTransfer,
        Self::ConfirmedTextMessage,
        Self::ReinitializeDevice,
        Self::VtOpen,
        Self::VtClose,
        Self::VtData,
        Self::Authenticate,
        Self::RequestKey,
        Self::ReadRange,
        Self::LifeSafetyOperation,
        Self::SubscribeCovProperty,
        Self::GetEventInformation,
    ];

    /// Services answered with a SimpleACK on success. All others return a
    /// ComplexACK.
    pub fn is_simple_ack(self) -> bool {
        matches!(
            self,
            Self::AcknowledgeAlarm
                | Self::ConfirmedCovNotification
                | Self::ConfirmedEventNotification
                | Self::SubscribeCov
                | Self::SubscribeCovProperty
                | Self::LifeSafetyOperation
                | Self::AddListElement
                | Self::RemoveListElement
                | Self::DeleteObject
                | Self::WriteProperty
                | Self::WritePropertyMultiple
                | Self::DeviceCommunicationControl
                | Self::ConfirmedTextMessage
                | Self::ReinitializeDevice
                | Self::VtClose
                | Self::RequestKey
        )
    }
}

impl TryFrom<u8> for ConfirmedServiceChoice {
    type Error = ServiceError;

    fn try_from(value: u8) -> Result<Self> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(ServiceError::UnsupportedServiceChoice(value))
    }
}

/// Unconfirmed service choices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UnconfirmedServiceChoice {
    IAm = 0,
    IHave = 1,
    UnconfirmedCovNotification = 2,
    UnconfirmedEventNotification = 3,
    UnconfirmedPrivateTransfer = 4,
    UnconfirmedTextMessage = 5,
    TimeSynchronization = 6,
    WhoHas = 7,
    WhoIs = 8,
    UtcTimeSynchronization = 9,
    WriteGroup = 10,
    UnconfirmedCovNotificationMultiple = 11,
    UnconfirmedAuditNotification = 12,
    WhoAmI = 13,
    YouAre = 14,
}

/// Number of unconfirmed service codes known to this crate
pub const MAX_UNCONFIRMED_SERVICES: usize = 15;

impl UnconfirmedServiceChoice {
    /// All unconfirmed services, in service-code order
    pub const ALL: [UnconfirmedServiceChoice; MAX_UNCONFIRMED_SERVICES] = [
        Self::IAm,
        Self::IHave,
        Self::UnconfirmedCovNotification,
        Self::UnconfirmedEventNotification,
        Self::UnconfirmedPrivateTransfer,
        Self::UnconfirmedTextMessage,
        Self::TimeSynchronization,
        Self::WhoHas,
        Self::WhoIs,
        Self::UtcTimeSynchronization,
        Self::WriteGroup,
        Self::UnconfirmedCovNotificationMultiple,
        Self::UnconfirmedAuditNotification,
        Self::WhoAmI,
        Self::YouAre,
    ];
}

impl TryFrom<u8> for UnconfirmedServiceChoice {
    type Error = ServiceError;

    fn try_from(value: u8) -> Result<Self> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(ServiceError::UnsupportedServiceChoice(value))
    }
}

crate::generate_custom_enum! {
    /// Reject reason codes
    RejectReason {
        Other = 0,
        BufferOverflow = 1,
        InconsistentParameters = 2,
        InvalidParameterDataType = 3,
        InvalidTag = 4,
        MissingRequiredParameter = 5,
        ParameterOutOfRange = 6,
        TooManyArguments = 7,
        UndefinedEnumeration = 8,
        UnrecognizedService = 9,
    },
    u8,
    64..=255
}

crate::generate_custom_enum! {
    /// Abort reason codes
    AbortReason {
        Other = 0,
        BufferOverflow = 1,
        InvalidApduInThisState = 2,
        PreemptedByHigherPriorityTask = 3,
        SegmentationNotSupported = 4,
        SecurityError = 5,
        InsufficientSecurity = 6,
        WindowSizeOutOfRange = 7,
        ApplicationExceededReplyTime = 8,
        OutOfResources = 9,
        TsmTimeout = 10,
        ApduTooLong = 11,
    },
    u8,
    64..=255
}

crate::generate_custom_enum! {
    /// Error class of an Error PDU
    ErrorClass {
        Device = 0,
        Object = 1,
        Property = 2,
        Resources = 3,
        Security = 4,
        Services = 5,
        Vt = 6,
        Communication = 7,
    },
    u16,
    64..=65535
}

crate::generate_custom_enum! {
    /// Error code of an Error PDU
    ErrorCode {
        Other = 0,
        ConfigurationInProgress = 2,
        DeviceBusy = 3,
        DynamicCreationNotSupported = 4,
        FileAccessDenied = 5,
        InconsistentParameters = 7,
        InconsistentSelectionCriterion = 8,
        InvalidDataType = 9,
        InvalidFileAccessMethod = 10,
        InvalidFileStartPosition = 11,
        InvalidParameterDataType = 13,
        InvalidTimeStamp = 14,
        MissingRequiredParameter = 16,
        NoObjectsOfSpecifiedType = 17,
        NoSpaceForObject = 18,
        NoSpaceToAddListElement = 19,
        NoSpaceToWriteProperty = 20,
        NoVtSessionsAvailable = 21,
        PropertyIsNotAList = 22,
        ObjectDeletionNotPermitted = 23,
        ObjectIdentifierAlreadyExists = 24,
        OperationalProblem = 25,
        PasswordFailure = 26,
        ReadAccessDenied = 27,
        ServiceRequestDenied = 29,
        Timeout = 30,
        UnknownObject = 31,
        UnknownProperty = 32,
        UnknownVtClass = 34,
        UnknownVtSession = 35,
        UnsupportedObjectType = 36,
        ValueOutOfRange = 37,
        VtSessionAlreadyClosed = 38,
        VtSessionTerminationFailure = 39,
        WriteAccessDenied = 40,
        CharacterSetNotSupported = 41,
        InvalidArrayIndex = 42,
        CommunicationDisabled = 83,
    },
    u16,
    256..=65535
}

bitflags! {
    /// Protocol services supported bitfield
    #[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
    pub struct ProtocolServicesSupported: u64 {
        const ACKNOWLEDGE_ALARM = 1 << 0;
        const CONFIRMED_COV_NOTIFICATION = 1 << 1;
        const CONFIRMED_EVENT_NOTIFICATION = 1 << 2;
        const GET_ALARM_SUMMARY = 1 << 3;
        const GET_ENROLLMENT_SUMMARY = 1 << 4;
        const SUBSCRIBE_COV = 1 << 5;
        const ATOMIC_READ_FILE = 1 << 6;
        const ATOMIC_WRITE_FILE = 1 << 7;
        const ADD_LIST_ELEMENT = 1 << 8;
        const REMOVE_LIST_ELEMENT = 1 << 9;
        const CREATE_OBJECT = 1 << 10;
        const DELETE_OBJECT = 1 << 11;
        const READ_PROPERTY = 1 << 12;
        const READ_PROPERTY_CONDITIONAL = 1 << 13;
        const READ_PROPERTY_MULTIPLE = 1 << 14;
        const WRITE_PROPERTY = 1 << 15;
        const WRITE_PROPERTY_MULTIPLE = 1 << 16;
        const DEVICE_COMMUNICATION_CONTROL = 1 << 17;
        const CONFIRMED_PRIVATE_TRANSFER = 1 << 18;
        const CONFIRMED_TEXT_MESSAGE = 1 << 19;
        const REINITIALIZE_DEVICE = 1 << 20;
        const VT_OPEN = 1 << 21;
        const VT_CLOSE = 1 << 22;
        const VT_DATA = 1 << 23;
        const AUTHENTICATE = 1 << 24;
        const REQUEST_KEY = 1 << 25;
        const I_AM = 1 << 26;
        const I_HAVE = 1 << 27;
        const UNCONFIRMED_COV_NOTIFICATION = 1 << 28;
        const UNCONFIRMED_EVENT_NOTIFICATION = 1 << 29;
        const UNCONFIRMED_PRIVATE_TRANSFER = 1 << 30;
        const UNCONFIRMED_TEXT_MESSAGE = 1 << 31;
        const TIME_SYNCHRONIZATION = 1 << 32;
        const WHO_HAS = 1 << 33;
        const WHO_IS = 1 << 34;
        const READ_RANGE = 1 << 35;
        const UTC_TIME_SYNCHRONIZATION = 1 << 36;
        const LIFE_SAFETY_OPERATION = 1 << 37;
        const SUBSCRIBE_COV_PROPERTY = 1 << 38;
        const GET_EVENT_INFORMATION = 1 << 39;
        const WRITE_GROUP = 1 << 40;
        const UNCONFIRMED_COV_NOTIFICATION_MULTIPLE = 1 << 43;
        const UNCONFIRMED_AUDIT_NOTIFICATION = 1 << 45;
        const WHO_AM_I = 1 << 47;
        const YOU_ARE = 1 << 48;
    }
}

impl ProtocolServicesSupported {
    /// Bit of a confirmed service
    ///
    /// Service codes 0 to 25 share their bit position; later services were
    /// appended to the bitstring after the unconfirmed block.
    pub fn from_confirmed(service: ConfirmedServiceChoice) -> Self {
        let bit = match service {
            ConfirmedServiceChoice::ReadRange => 35,
            ConfirmedServiceChoice::LifeSafetyOperation => 37,
            ConfirmedServiceChoice::SubscribeCovProperty => 38,
            ConfirmedServiceChoice::GetEventInformation => 39,
            other => other as u64,
        };
        Self::from_bits_retain(1 << bit)
    }

    /// Bit of an unconfirmed service
    pub fn from_unconfirmed(service: UnconfirmedServiceChoice) -> Self {
        use UnconfirmedServiceChoice::*;
        match service {
            IAm => Self::I_AM,
            IHave => Self::I_HAVE,
            UnconfirmedCovNotification => Self::UNCONFIRMED_COV_NOTIFICATION,
            UnconfirmedEventNotification => Self::UNCONFIRMED_EVENT_NOTIFICATION,
            UnconfirmedPrivateTransfer => Self::UNCONFIRMED_PRIVATE_TRANSFER,
            UnconfirmedTextMessage => Self::UNCONFIRMED_TEXT_MESSAGE,
            TimeSynchronization => Self::TIME_SYNCHRONIZATION,
            WhoHas => Self::WHO_HAS,
            WhoIs => Self::WHO_IS,
            UtcTimeSynchronization => Self::UTC_TIME_SYNCHRONIZATION,
            WriteGroup => Self::WRITE_GROUP,
            UnconfirmedCovNotificationMultiple => Self::UNCONFIRMED_COV_NOTIFICATION_MULTIPLE,
            UnconfirmedAuditNotification => Self::UNCONFIRMED_AUDIT_NOTIFICATION,
            WhoAmI => Self::WHO_AM_I,
            YouAre => Self::YOU_ARE,
        }
    }
}
