//! Device Communication Control
//!
//! A device told to stop communicating keeps listening for the two services
//! that can bring it back (DeviceCommunicationControl and
//! ReinitializeDevice) and ignores everything else until the requested
//! duration runs out or it is re-enabled.
//!
//! ```text
//!            request(disable)                 request(disable-initiation)
//!   Enabled ----------------> Disabled   Enabled ----------------------> DisableInitiation
//!      ^                         |          ^                                  |
//!      +--- request(enable) -----+          +------- request(enable) ----------+
//!      +--- countdown reaches 0 -+          +------- countdown reaches 0 ------+
//! ```
//!
//! Durations are counted in whole seconds by [`CommunicationControl::tick_seconds`].

use log::{debug, info, warn};
use thiserror::Error;

use crate::app::dispatch::{ServiceContext, ServiceHandler};
use crate::app::{Apdu, ConfirmedRequest, ErrorPdu, RejectPdu, SimpleAck};
use crate::service::{
    ConfirmedServiceChoice, DeviceCommunicationControlRequest, EnableDisable, ErrorClass,
    ErrorCode, UnconfirmedServiceChoice, DCC_PASSWORD_MAX_CHARS,
};

/// Result type for communication control operations
pub type Result<T> = std::result::Result<T, DccError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DccError {
    /// Password missing or not equal to the configured one
    #[error("password failure")]
    PasswordFailure,
    /// Configured password is empty or longer than 20 characters
    #[error("password must be 1 to {DCC_PASSWORD_MAX_CHARS} characters")]
    InvalidPassword,
}

/// Current communication state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CommunicationState {
    #[default]
    Enabled,
    DisableInitiation,
    Disabled,
}

/// How long a disable request lasts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DccDuration {
    Infinite,
    Seconds(u32),
}

impl DccDuration {
    /// Duration of a request carrying an optional Unsigned16 minute count.
    /// Absent or zero means indefinitely.
    pub fn from_minutes(minutes: Option<u16>) -> Self {
        match minutes {
            Some(minutes) if minutes > 0 => Self::Seconds(minutes as u32 * 60),
            _ => Self::Infinite,
        }
    }

    fn normalized(self) -> Self {
        match self {
            Self::Seconds(0) => Self::Infinite,
            other => other,
        }
    }
}

/// Communication control configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DccConfig {
    /// Password requests must carry; `None` accepts every request
    pub password: Option<String>,
}

impl DccConfig {
    pub fn validate(&self) -> Result<()> {
        match &self.password {
            Some(password) => {
                let chars = password.chars().count();
                if chars == 0 || chars > DCC_PASSWORD_MAX_CHARS {
                    Err(DccError::InvalidPassword)
                } else {
                    Ok(())
                }
            }
            None => Ok(()),
        }
    }
}

/// The communication-control gate and its countdown
#[derive(Debug, Clone)]
pub struct CommunicationControl {
    state: CommunicationState,
    remaining: DccDuration,
    password: Option<String>,
}

impl CommunicationControl {
    pub fn new(config: &DccConfig) -> Self {
        Self {
            state: CommunicationState::Enabled,
            remaining: DccDuration::Infinite,
            password: config.password.clone(),
        }
    }

    pub fn state(&self) -> CommunicationState {
        self.state
    }

    /// Time left before communication is re-enabled; `None` while enabled
    pub fn remaining(&self) -> Option<DccDuration> {
        match self.state {
            CommunicationState::Enabled => None,
            _ => Some(self.remaining),
        }
    }

    /// Whether this device may start new conversations
    pub fn may_initiate(&self) -> bool {
        self.state == CommunicationState::Enabled
    }

    /// Whether a confirmed request with this service code reaches its handler
    pub fn confirmed_allowed(&self, service_choice: u8) -> bool {
        match self.state {
            CommunicationState::Disabled => {
                service_choice == ConfirmedServiceChoice::DeviceCommunicationControl as u8
                    || service_choice == ConfirmedServiceChoice::ReinitializeDevice as u8
            }
            _ => true,
        }
    }

    /// Whether an unconfirmed request with this service code reaches its handler
    pub fn unconfirmed_allowed(&self, service_choice: u8) -> bool {
        match self.state {
            CommunicationState::Enabled => true,
            CommunicationState::DisableInitiation => {
                service_choice == UnconfirmedServiceChoice::WhoIs as u8
            }
            CommunicationState::Disabled => false,
        }
    }

    fn check_password(&self, password: Option<&str>) -> Result<()> {
        match &self.password {
            Some(expected) if password != Some(expected.as_str()) => Err(DccError::PasswordFailure),
            _ => Ok(()),
        }
    }

    /// Apply an enable-disable command after checking the password
    pub fn request(
        &mut self,
        command: EnableDisable,
        duration: DccDuration,
        password: Option<&str>,
    ) -> Result<()> {
        if let Err(err) = self.check_password(password) {
            warn!("DCC: rejected {:?} request, {}", command, err);
            return Err(err);
        }

        let previous = self.state;
        match command {
            EnableDisable::Enable => {
                self.state = CommunicationState::Enabled;
                self.remaining = DccDuration::Infinite;
            }
            EnableDisable::Disable => {
                self.state = CommunicationState::Disabled;
                self.remaining = duration.normalized();
            }
            EnableDisable::DisableInitiation => {
                self.state = CommunicationState::DisableInitiation;
                self.remaining = duration.normalized();
            }
        }
        info!(
            "DCC: {:?} -> {:?} for {:?}",
            previous, self.state, self.remaining
        );
        Ok(())
    }

    pub fn request_disable(&mut self, duration: DccDuration, password: Option<&str>) -> Result<()> {
        self.request(EnableDisable::Disable, duration, password)
    }

    pub fn request_disable_initiation(
        &mut self,
        duration: DccDuration,
        password: Option<&str>,
    ) -> Result<()> {
        self.request(EnableDisable::DisableInitiation, duration, password)
    }

    pub fn request_enable(&mut self, password: Option<&str>) -> Result<()> {
        self.request(EnableDisable::Enable, DccDuration::Infinite, password)
    }

    /// Count down `seconds`; communication is re-enabled when the time is up
    pub fn tick_seconds(&mut self, seconds: u32) {
        if self.state == CommunicationState::Enabled {
            return;
        }
        if let DccDuration::Seconds(left) = self.remaining {
            let left = left.saturating_sub(seconds);
            if left == 0 {
                info!("DCC: duration expired, communication enabled");
                self.state = CommunicationState::Enabled;
                self.remaining = DccDuration::Infinite;
            } else {
                self.remaining = DccDuration::Seconds(left);
            }
        }
    }
}

impl Default for CommunicationControl {
    fn default() -> Self {
        Self::new(&DccConfig::default())
    }
}

/// Executes DeviceCommunicationControl requests against the dispatcher's
/// [`CommunicationControl`] and encodes the answer.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceCommunicationControlHandler;

impl ServiceHandler for DeviceCommunicationControlHandler {
    fn confirmed(&mut self, ctx: &mut ServiceContext<'_>, request: &ConfirmedRequest<'_>) {
        let invoke_id = request.header.invoke_id;
        let reply = match DeviceCommunicationControlRequest::decode(request.service_data) {
            Ok(dcc) => {
                let duration = DccDuration::from_minutes(dcc.time_duration);
                match ctx.communication_control.request(
                    dcc.enable_disable,
                    duration,
                    dcc.password.as_deref(),
                ) {
                    Ok(()) => Apdu::SimpleAck(SimpleAck {
                        invoke_id,
                        service_choice: request.service_choice,
                    }),
                    Err(_) => Apdu::Error(ErrorPdu {
                        invoke_id,
                        service_choice: request.service_choice,
                        error_class: ErrorClass::Security,
                        error_code: ErrorCode::PasswordFailure,
                    }),
                }
            }
            Err(err) => {
                debug!("DCC: malformed request from {}: {}", ctx.source, err);
                Apdu::Reject(RejectPdu {
                    invoke_id,
                    reason: err.reject_reason(),
                })
            }
        };
        if let Err(err) = ctx.reply(&reply) {
            warn!("DCC: could not encode reply: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disable_gates_confirmed_services() {
        let mut dcc = CommunicationControl::default();
        dcc.request_disable(DccDuration::Seconds(60), None).unwrap();
        assert_eq!(dcc.state(), CommunicationState::Disabled);
        assert!(!dcc.confirmed_allowed(ConfirmedServiceChoice::ReadProperty as u8));
        assert!(dcc.confirmed_allowed(ConfirmedServiceChoice::DeviceCommunicationControl as u8));
        assert!(dcc.confirmed_allowed(ConfirmedServiceChoice::ReinitializeDevice as u8));
        assert!(!dcc.unconfirmed_allowed(UnconfirmedServiceChoice::WhoIs as u8));
        assert!(!dcc.may_initiate());
    }

    #[test]
    fn test_disable_initiation_allows_who_is_only() {
        let mut dcc = CommunicationControl::default();
        dcc.request_disable_initiation(DccDuration::Infinite, None)
            .unwrap();
        assert!(dcc.unconfirmed_allowed(UnconfirmedServiceChoice::WhoIs as u8));
        assert!(!dcc.unconfirmed_allowed(UnconfirmedServiceChoice::WhoHas as u8));
        assert!(!dcc.unconfirmed_allowed(UnconfirmedServiceChoice::IAm as u8));
        assert!(dcc.confirmed_allowed(ConfirmedServiceChoice::ReadProperty as u8));
        assert!(!dcc.may_initiate());
    }

    #[test]
    fn test_countdown_reenables() {
        let mut dcc = CommunicationControl::default();
        dcc.request_disable(DccDuration::Seconds(30), None).unwrap();
        for _ in 0..29 {
            dcc.tick_seconds(1);
        }
        assert_eq!(dcc.state(), CommunicationState::Disabled);
        assert_eq!(dcc.remaining(), Some(DccDuration::Seconds(1)));
        dcc.tick_seconds(1);
        assert_eq!(dcc.state(), CommunicationState::Enabled);
        assert_eq!(dcc.remaining(), None);
    }

    #[test]
    fn test_large_tick_saturates() {
        let mut dcc = CommunicationControl::default();
        dcc.request_disable(DccDuration::Seconds(5), None).unwrap();
        dcc.tick_seconds(u32::MAX);
        assert_eq!(dcc.state(), CommunicationState::Enabled);
    }

    #[test]
    fn test_infinite_never_expires() {
        let mut dcc = CommunicationControl::default();
        dcc.request_disable(DccDuration::Infinite, None).unwrap();
        for _ in 0..10_000 {
            dcc.tick_seconds(60);
        }
        assert_eq!(dcc.state(), CommunicationState::Disabled);
        assert_eq!(dcc.remaining(), Some(DccDuration::Infinite));
    }

    #[test]
    fn test_zero_duration_means_infinite() {
        let mut dcc = CommunicationControl::default();
        dcc.request_disable(DccDuration::Seconds(0), None).unwrap();
        assert_eq!(dcc.remaining(), Some(DccDuration::Infinite));
        assert_eq!(DccDuration::from_minutes(Some(0)), DccDuration::Infinite);
        assert_eq!(DccDuration::from_minutes(Some(2)), DccDuration::Seconds(120));
    }

    #[test]
    fn test_password_checked() {
        let config = DccConfig {
            password: Some("filister".to_string()),
        };
        config.validate().unwrap();
        let mut dcc = CommunicationControl::new(&config);
        assert_eq!(
            dcc.request_disable(DccDuration::Infinite, Some("wrong")),
            Err(DccError::PasswordFailure)
        );
        assert_eq!(
            dcc.request_disable(DccDuration::Infinite, None),
            Err(DccError::PasswordFailure)
        );
        assert_eq!(dcc.state(), CommunicationState::Enabled);

        dcc.request_disable(DccDuration::Infinite, Some("filister"))
            .unwrap();
        assert_eq!(dcc.state(), CommunicationState::Disabled);
        assert_eq!(dcc.request_enable(None), Err(DccError::PasswordFailure));
        dcc.request_enable(Some("filister")).unwrap();
        assert_eq!(dcc.state(), CommunicationState::Enabled);
    }

    #[test]
    fn test_config_password_length() {
        let longest = DccConfig {
            password: Some("x".repeat(DCC_PASSWORD_MAX_CHARS)),
        };
        assert_eq!(longest.validate(), Ok(()));
        let too_long = DccConfig {
            password: Some("x".repeat(DCC_PASSWORD_MAX_CHARS + 1)),
        };
        assert_eq!(too_long.validate(), Err(DccError::InvalidPassword));
        let empty = DccConfig {
            password: Some(String::new()),
        };
        assert_eq!(empty.validate(), Err(DccError::InvalidPassword));
    }
}
