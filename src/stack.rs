//! Protocol stack glue
//!
//! [`ProtocolStack`] wires one MS/TP node, the NPDU header, the APDU
//! dispatcher and the transaction table together and runs them as a single
//! cooperative task:
//!
//! ```text
//! serial octets -> MstpNode -> NPDU header -> ApduDispatcher -> handler
//!                     ^                                           |
//!                     +----------- NPDU + reply APDU <------------+
//! ```
//!
//! A reply written by a handler is queued on the node straight away, so a
//! master still in AnswerDataRequest sends it before Treply_delay runs out.
//!
//! # Example
//!
//! ```
//! use bacnet_core::datalink::mstp::SerialPort;
//! use bacnet_core::stack::{ProtocolStack, StackConfig};
//!
//! struct NullPort;
//!
//! impl SerialPort for NullPort {
//!     fn write_frame(&mut self, _frame: &[u8]) -> std::io::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let mut stack = ProtocolStack::new(StackConfig::default(), NullPort).unwrap();
//! stack.poll().unwrap();
//! stack.tick_ms(10).unwrap();
//! ```

use log::{debug, warn};
use thiserror::Error;

use crate::app::dcc::{CommunicationState, DccConfig, DccError, DeviceCommunicationControlHandler};
use crate::app::dispatch::{ApduDispatcher, DispatchOutcome, DispatchTable};
use crate::app::tsm::{TransactionRegistry, TransactionTable, TsmError, TsmEvent};
use crate::app::{
    Apdu, ApduError, ApplicationConfig, ConfirmedRequest, ConfirmedServiceData, MaxApduSize,
    UnconfirmedRequest,
};
use crate::datalink::mstp::{MstpConfig, MstpNode, SerialPort, MSTP_MAX_APDU};
use crate::datalink::{DataLink, DataLinkAddress, DataLinkError};
use crate::network::{BacnetAddress, NetworkError, NetworkPriority, Npdu, BACNET_BROADCAST_NETWORK};
use crate::service::{ConfirmedServiceChoice, UnconfirmedServiceChoice};

/// Result type for stack operations
pub type Result<T> = std::result::Result<T, StackError>;

#[derive(Debug, Error)]
pub enum StackError {
    #[error(transparent)]
    DataLink(#[from] DataLinkError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Apdu(#[from] ApduError),
    #[error(transparent)]
    Dcc(#[from] DccError),
    #[error(transparent)]
    Tsm(#[from] TsmError),
    /// DeviceCommunicationControl forbids starting this conversation
    #[error("communication initiation is disabled")]
    InitiationDisabled,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Configuration of every layer of the stack
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StackConfig {
    pub mstp: MstpConfig,
    pub application: ApplicationConfig,
    pub dcc: DccConfig,
}

impl StackConfig {
    pub fn validate(&self) -> Result<()> {
        self.mstp.validate()?;
        self.dcc.validate()?;
        if self.application.apdu_timeout == 0 {
            return Err(StackError::InvalidConfig(
                "apdu_timeout must be greater than zero".to_string(),
            ));
        }
        if self.application.max_apdu_length < 50
            || self.application.max_apdu_length > MSTP_MAX_APDU
        {
            return Err(StackError::InvalidConfig(format!(
                "max_apdu_length {} is outside 50..={}",
                self.application.max_apdu_length, MSTP_MAX_APDU
            )));
        }
        Ok(())
    }
}

/// One BACnet device on one MS/TP port
#[derive(Debug)]
pub struct ProtocolStack<P> {
    node: MstpNode<P>,
    dispatcher: ApduDispatcher,
    transactions: TransactionTable,
    max_apdu: MaxApduSize,
    /// Milliseconds not yet turned into DCC seconds
    dcc_millis: u32,
    reply: Vec<u8>,
}

impl<P: SerialPort> ProtocolStack<P> {
    /// Build the stack. DeviceCommunicationControl is handled out of the box;
    /// register further services through [`ProtocolStack::dispatcher_mut`].
    pub fn new(config: StackConfig, port: P) -> Result<Self> {
        config.validate()?;

        let mut table = DispatchTable::new();
        table.register_confirmed(
            ConfirmedServiceChoice::DeviceCommunicationControl,
            DeviceCommunicationControlHandler,
        );

        Ok(Self {
            dispatcher: ApduDispatcher::new(table, &config.dcc),
            transactions: TransactionTable::new(&config.application),
            max_apdu: MaxApduSize::for_size(config.application.max_apdu_length),
            node: MstpNode::new(config.mstp, port)?,
            dcc_millis: 0,
            reply: Vec::with_capacity(MSTP_MAX_APDU),
        })
    }

    pub fn dispatcher(&self) -> &ApduDispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut ApduDispatcher {
        &mut self.dispatcher
    }

    pub fn node(&self) -> &MstpNode<P> {
        &self.node
    }

    /// The node, for feeding received octets
    pub fn node_mut(&mut self) -> &mut MstpNode<P> {
        &mut self.node
    }

    pub fn transactions(&self) -> &TransactionTable {
        &self.transactions
    }

    pub fn communication_state(&self) -> CommunicationState {
        self.dispatcher.communication_control().state()
    }

    /// One pass of the task loop: run the node, dispatch every NPDU it
    /// received and give the node the chance to send the replies.
    ///
    /// Returns the number of NPDUs handed to the network layer.
    pub fn poll(&mut self) -> Result<usize> {
        self.node.step();

        let mut received = 0;
        while let Some((npdu, source)) = self.node.receive_frame()? {
            received += 1;
            if let Err(err) = self.handle_npdu(source, &npdu) {
                debug!("Stack: dropped NPDU from {}: {}", source, err);
            }
        }
        if received > 0 {
            self.node.step();
        }
        Ok(received)
    }

    /// Advance every timer by `elapsed` milliseconds.
    ///
    /// Returns the invoke ids of confirmed requests that ran out of retries;
    /// they are released before returning.
    pub fn tick_ms(&mut self, elapsed: u32) -> Result<Vec<u8>> {
        self.node.silence_timer_tick(elapsed);

        let mut timed_out = Vec::new();
        for event in self.transactions.tick_ms(elapsed) {
            match event {
                TsmEvent::Retransmit {
                    destination, pdu, ..
                } => {
                    if let Err(err) = self.send_npdu(&destination, &pdu) {
                        warn!("Stack: retransmission to {} failed: {}", destination, err);
                    }
                }
                TsmEvent::TimedOut { invoke_id, .. } => timed_out.push(invoke_id),
            }
        }
        for &invoke_id in &timed_out {
            self.transactions.free_invoke_id(invoke_id);
        }

        self.dcc_millis = self.dcc_millis.saturating_add(elapsed);
        let seconds = self.dcc_millis / 1000;
        if seconds > 0 {
            self.dcc_millis %= 1000;
            self.dispatcher
                .communication_control_mut()
                .tick_seconds(seconds);
        }
        Ok(timed_out)
    }

    /// Hand one received NPDU to the application layer and queue the reply
    /// a handler produced.
    ///
    /// Network layer messages and NPDUs routed to other networks are not
    /// processed and yield `Ok(None)`.
    pub fn handle_npdu(
        &mut self,
        source: DataLinkAddress,
        bytes: &[u8],
    ) -> Result<Option<DispatchOutcome>> {
        let (npdu, header_len) = Npdu::decode(bytes)?;
        if npdu.is_network_message() {
            debug!(
                "Stack: ignoring network message {:?} from {}",
                npdu.message_type, source
            );
            return Ok(None);
        }
        if let Some(destination) = &npdu.destination {
            if destination.network != BACNET_BROADCAST_NETWORK {
                debug!(
                    "Stack: ignoring NPDU for network {} from {}",
                    destination.network, source
                );
                return Ok(None);
            }
        }

        let address = BacnetAddress::from_npdu(&[source.mstp_station()], &npdu)?;
        let apdu = bytes.get(header_len..).unwrap_or(&[]);

        self.reply.clear();
        let outcome =
            self.dispatcher
                .dispatch(&address, apdu, &mut self.transactions, &mut self.reply)?;

        if !self.reply.is_empty() {
            let mut pdu = Npdu::to_address(&address, false, npdu.control.priority).encode();
            pdu.extend_from_slice(&self.reply);
            self.node.send_frame(&pdu, &source)?;
        }
        Ok(Some(outcome))
    }

    /// Send a confirmed request and track it until it is answered.
    ///
    /// Returns the invoke id the request was sent with.
    pub fn send_confirmed(
        &mut self,
        destination: &BacnetAddress,
        service: ConfirmedServiceChoice,
        payload: &[u8],
    ) -> Result<u8> {
        if !self.dispatcher.communication_control().may_initiate() {
            return Err(StackError::InitiationDisabled);
        }
        let invoke_id = self
            .transactions
            .next_invoke_id()
            .ok_or(TsmError::NoFreeSlot)?;

        let apdu = Apdu::ConfirmedRequest(ConfirmedRequest {
            header: ConfirmedServiceData::unsegmented(invoke_id, self.max_apdu),
            service_choice: service as u8,
            service_data: payload,
        });
        let mut pdu = Npdu::to_address(destination, true, NetworkPriority::Normal).encode();
        apdu.encode(&mut pdu)?;

        self.send_npdu(destination, &pdu)?;
        self.transactions
            .start(invoke_id, destination.clone(), service as u8, pdu)?;
        debug!(
            "Stack: {:?} to {} with invoke id {}",
            service, destination, invoke_id
        );
        Ok(invoke_id)
    }

    /// Send an unconfirmed request. While initiation is disabled only I-Am
    /// may still go out.
    pub fn send_unconfirmed(
        &mut self,
        destination: &BacnetAddress,
        service: UnconfirmedServiceChoice,
        payload: &[u8],
    ) -> Result<()> {
        let allowed = match self.communication_state() {
            CommunicationState::Enabled => true,
            CommunicationState::DisableInitiation => service == UnconfirmedServiceChoice::IAm,
            CommunicationState::Disabled => false,
        };
        if !allowed {
            return Err(StackError::InitiationDisabled);
        }

        let apdu = Apdu::UnconfirmedRequest(UnconfirmedRequest {
            service_choice: service as u8,
            service_data: payload,
        });
        let mut pdu = Npdu::to_address(destination, false, NetworkPriority::Normal).encode();
        apdu.encode(&mut pdu)?;
        self.send_npdu(destination, &pdu)
    }

    fn send_npdu(&mut self, destination: &BacnetAddress, pdu: &[u8]) -> Result<()> {
        let link = destination
            .mstp_station()
            .map_or(DataLinkAddress::Broadcast, DataLinkAddress::from_mstp_station);
        self.node.send_frame(pdu, &link)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::app::dispatch::{confirmed_fn, unconfirmed_fn};
    use crate::app::dcc::DccDuration;
    use crate::app::{PduType, SimpleAck};
    use crate::datalink::mstp::{MstpFrame, MstpFrameType};

    #[derive(Debug, Default)]
    struct RecordingPort {
        frames: Vec<MstpFrame>,
    }

    impl SerialPort for RecordingPort {
        fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
            self.frames.push(MstpFrame::decode(frame).expect("malformed frame"));
            Ok(())
        }
    }

    fn stack() -> ProtocolStack<RecordingPort> {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = StackConfig {
            mstp: MstpConfig {
                station_address: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut stack = ProtocolStack::new(config, RecordingPort::default()).unwrap();
        stack.poll().unwrap();
        stack
    }

    fn npdu(control: u8, apdu: &[u8]) -> Vec<u8> {
        let mut pdu = vec![0x01, control];
        pdu.extend_from_slice(apdu);
        pdu
    }

    const WHO_IS: [u8; 2] = [0x10, 0x08];
    // ReadProperty device,1 object-name, invoke id 1
    const READ_PROPERTY: [u8; 11] = [
        0x00, 0x05, 0x01, 0x0C, 0x0C, 0x02, 0x00, 0x00, 0x01, 0x19, 0x4D,
    ];
    // DeviceCommunicationControl disable for 30 minutes, invoke id 2
    const DCC_DISABLE_30_MIN: [u8; 8] = [0x00, 0x05, 0x02, 0x11, 0x09, 0x1E, 0x19, 0x01];

    #[test]
    fn test_communication_control_scenario() {
        let mut stack = stack();
        let who_is = Rc::new(Cell::new(0));
        let read = Rc::new(Cell::new(0));
        let table = stack.dispatcher_mut().table_mut();
        let seen = who_is.clone();
        table.register_unconfirmed(
            UnconfirmedServiceChoice::WhoIs,
            unconfirmed_fn(move |_ctx, _request| seen.set(seen.get() + 1)),
        );
        let seen = read.clone();
        table.register_confirmed(
            ConfirmedServiceChoice::ReadProperty,
            confirmed_fn(move |_ctx, _request| seen.set(seen.get() + 1)),
        );

        let peer = DataLinkAddress::MsTp(2);
        let mut invocations = Vec::new();
        let mut outcomes = Vec::new();
        let mut send = |stack: &mut ProtocolStack<RecordingPort>, control: u8, apdu: &[u8]| {
            let before = stack.dispatcher().statistics().handled;
            outcomes.push(stack.handle_npdu(peer, &npdu(control, apdu)).unwrap());
            invocations.push(stack.dispatcher().statistics().handled - before);
        };

        send(&mut stack, 0x00, &WHO_IS);
        send(&mut stack, 0x04, &READ_PROPERTY);
        send(&mut stack, 0x04, &DCC_DISABLE_30_MIN);
        assert_eq!(stack.communication_state(), CommunicationState::Disabled);
        send(&mut stack, 0x04, &READ_PROPERTY);

        stack.tick_ms(1_799_999).unwrap();
        assert_eq!(stack.communication_state(), CommunicationState::Disabled);
        stack.tick_ms(1).unwrap();
        assert_eq!(stack.communication_state(), CommunicationState::Enabled);
        send(&mut stack, 0x04, &READ_PROPERTY);

        assert_eq!(invocations, [1, 1, 1, 0, 1]);
        assert_eq!(outcomes[3], Some(DispatchOutcome::Suppressed));
        assert_eq!(who_is.get(), 1);
        assert_eq!(read.get(), 2);
        // SimpleAck for the DCC request is waiting for the token
        assert_eq!(stack.node().transmit_queue_len(), 1);
    }

    #[test]
    fn test_reply_sent_while_answering_request() {
        let mut stack = stack();
        stack.dispatcher_mut().table_mut().register_confirmed(
            ConfirmedServiceChoice::ReadProperty,
            confirmed_fn(|ctx, request| {
                let ack = Apdu::SimpleAck(SimpleAck {
                    invoke_id: request.header.invoke_id,
                    service_choice: request.service_choice,
                });
                ctx.reply(&ack).unwrap();
            }),
        );

        let request = MstpFrame::bacnet_data(1, 2, &npdu(0x04, &READ_PROPERTY), true).unwrap();
        stack.node_mut().frame_received(&request.encode());
        assert_eq!(stack.poll().unwrap(), 1);

        let sent = &stack.node().port().frames;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].frame_type, MstpFrameType::BacnetDataNotExpectingReply);
        assert_eq!(sent[0].destination, 2);
        assert_eq!(sent[0].data.as_slice(), &[0x01, 0x00, 0x20, 0x01, 0x0C]);
    }

    #[test]
    fn test_send_unconfirmed_honours_communication_control() {
        let mut stack = stack();
        stack
            .dispatcher_mut()
            .communication_control_mut()
            .request_disable_initiation(DccDuration::Infinite, None)
            .unwrap();

        let broadcast = BacnetAddress::local_broadcast();
        assert!(matches!(
            stack.send_unconfirmed(&broadcast, UnconfirmedServiceChoice::WhoIs, &[]),
            Err(StackError::InitiationDisabled)
        ));
        stack
            .send_unconfirmed(&broadcast, UnconfirmedServiceChoice::IAm, &[0xC4])
            .unwrap();
        assert_eq!(stack.node().transmit_queue_len(), 1);

        stack
            .dispatcher_mut()
            .communication_control_mut()
            .request_disable(DccDuration::Infinite, None)
            .unwrap();
        assert!(stack
            .send_unconfirmed(&broadcast, UnconfirmedServiceChoice::IAm, &[0xC4])
            .is_err());
        assert!(matches!(
            stack.send_confirmed(&BacnetAddress::mstp(5), ConfirmedServiceChoice::ReadProperty, &[]),
            Err(StackError::InitiationDisabled)
        ));
    }

    #[test]
    fn test_confirmed_request_retransmitted_then_answered() {
        let mut stack = stack();
        let peer = BacnetAddress::mstp(5);
        let invoke_id = stack
            .send_confirmed(&peer, ConfirmedServiceChoice::ReadProperty, &READ_PROPERTY[4..])
            .unwrap();
        assert_eq!(stack.node().transmit_queue_len(), 1);
        assert!(!stack.transactions().is_free(invoke_id));

        assert!(stack.tick_ms(3000).unwrap().is_empty());
        assert_eq!(stack.node().transmit_queue_len(), 2);

        let ack = [0x20, invoke_id, ConfirmedServiceChoice::ReadProperty as u8];
        assert_eq!(
            stack.handle_npdu(DataLinkAddress::MsTp(5), &npdu(0x00, &ack)).unwrap(),
            Some(DispatchOutcome::TransactionClosed)
        );
        assert!(stack.transactions().is_free(invoke_id));
    }

    #[test]
    fn test_confirmed_request_times_out() {
        let config = StackConfig {
            application: ApplicationConfig {
                apdu_timeout: 100,
                apdu_retries: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut stack = ProtocolStack::new(config, RecordingPort::default()).unwrap();
        let invoke_id = stack
            .send_confirmed(&BacnetAddress::mstp(5), ConfirmedServiceChoice::ReadProperty, &[])
            .unwrap();
        assert!(stack.tick_ms(99).unwrap().is_empty());
        assert_eq!(stack.tick_ms(1).unwrap(), vec![invoke_id]);
        assert!(stack.transactions().is_free(invoke_id));
    }

    #[test]
    fn test_network_layer_and_routed_npdus_ignored() {
        let mut stack = stack();
        let peer = DataLinkAddress::MsTp(2);
        // Who-Is-Router-To-Network
        assert_eq!(stack.handle_npdu(peer, &[0x01, 0x80, 0x00]).unwrap(), None);
        // for DNET 5
        let routed = [0x01, 0x20, 0x00, 0x05, 0x01, 0x10, 0xFF, 0x10, 0x08];
        assert_eq!(stack.handle_npdu(peer, &routed).unwrap(), None);
        // global broadcast is for everyone
        let global = [0x01, 0x20, 0xFF, 0xFF, 0x00, 0xFF, 0x10, 0x08];
        assert_eq!(
            stack.handle_npdu(peer, &global).unwrap(),
            Some(DispatchOutcome::NoHandler)
        );
        assert!(matches!(
            stack.handle_npdu(peer, &[0x01]),
            Err(StackError::Network(_))
        ));
    }

    #[test]
    fn test_routed_request_answered_through_router() {
        let mut stack = stack();
        // SNET 7 / SADR 0x20 behind router station 9
        let pdu = [
            0x01, 0x0C, 0x00, 0x07, 0x01, 0x20, 0x00, 0x05, 0x03, 0x11, 0x19, 0x00,
        ];
        assert_eq!(
            stack.handle_npdu(DataLinkAddress::MsTp(9), &pdu).unwrap(),
            Some(DispatchOutcome::Handled)
        );
        let mut reply = None;
        stack.node_mut().frame_received(&MstpFrame::token(1, 9).encode());
        stack.poll().unwrap();
        for frame in &stack.node().port().frames {
            if frame.is_data() {
                reply = Some(frame.clone());
            }
        }
        let reply = reply.expect("reply was sent with the token");
        assert_eq!(reply.destination, 9);
        // DNET 7 / DADR 0x20, hop count, SimpleAck
        assert_eq!(
            reply.data.as_slice(),
            &[0x01, 0x20, 0x00, 0x07, 0x01, 0x20, 0xFF, 0x20, 0x03, 0x11]
        );
        assert_eq!(
            PduType::from_header(reply.data[7]).unwrap(),
            PduType::SimpleAck
        );
    }

    #[test]
    fn test_dcc_handled_by_default() {
        let stack = stack();
        assert!(stack
            .dispatcher()
            .table()
            .is_confirmed_supported(ConfirmedServiceChoice::DeviceCommunicationControl));
    }

    #[test]
    fn test_config_validation() {
        assert!(StackConfig::default().validate().is_ok());

        let mut config = StackConfig::default();
        config.dcc.password = Some(String::new());
        assert!(matches!(config.validate(), Err(StackError::Dcc(_))));

        let mut config = StackConfig::default();
        config.application.max_apdu_length = 1476;
        assert!(matches!(config.validate(), Err(StackError::InvalidConfig(_))));

        let mut config = StackConfig::default();
        config.mstp.station_address = 255;
        assert!(matches!(config.validate(), Err(StackError::DataLink(_))));
    }
}
