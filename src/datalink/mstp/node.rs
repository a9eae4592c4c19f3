//! MS/TP master and slave node state machines
//!
//! [`MstpNode`] owns the receive state machine, the silence timer, the
//! transmit and receive queues and the token-passing state of one station.
//! It never blocks and never reads the clock: octets come in through
//! [`MstpNode::receive_octet`], time through [`MstpNode::silence_timer_tick`],
//! and [`MstpNode::step`] runs the node until it has to wait for either.
//!
//! Stations 0-127 run the master state machine of Clause 9.5.6. Stations
//! 128-254 are slaves: they never hold the token and only answer requests.

use heapless::Deque;
use log::{debug, trace, warn};

use super::receive::{ReceiveEvent, ReceiveFsm, ReceivedFrame};
use super::{
    is_master_node, MstpConfig, MstpFrame, MstpFrameType, MSTP_BROADCAST_ADDRESS,
    MSTP_MAX_DATA_LENGTH, NMIN_OCTETS, NPOLL, NRETRY_TOKEN,
};
use crate::app::Apdu;
use crate::datalink::{DataLink, DataLinkAddress, DataLinkError, Result};
use crate::network::Npdu;
use crate::util::hex_string;

/// Frames waiting for the token
pub const TRANSMIT_QUEUE_SIZE: usize = 8;

/// Received NPDUs waiting for the network layer
pub const RECEIVE_QUEUE_SIZE: usize = 8;

/// Upper bound on immediate transitions taken by one `step()`
const MAX_TRANSITIONS: usize = 256;

/// Where frames go out. Implementations write one complete frame and may
/// block until the last octet has left the UART.
pub trait SerialPort {
    fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()>;
}

/// Master node states (Clause 9.5.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterState {
    Initialize,
    Idle,
    UseToken,
    WaitForReply,
    DoneWithToken,
    PassToken,
    NoToken,
    PollForMaster,
    AnswerDataRequest,
}

/// Counters kept by a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MstpStatistics {
    pub frames_sent: u32,
    pub valid_frames: u32,
    pub invalid_frames: u32,
    pub frames_not_for_us: u32,
    pub tokens_received: u32,
    pub lost_tokens: u32,
    pub reply_postponed_sent: u32,
    pub transmit_errors: u32,
    pub transmit_queue_full: u32,
    pub receive_queue_full: u32,
}

/// An NPDU received in a BACnet data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPdu {
    pub source: u8,
    pub expecting_reply: bool,
    pub data: heapless::Vec<u8, MSTP_MAX_DATA_LENGTH>,
}

/// One MS/TP station
#[derive(Debug)]
pub struct MstpNode<P> {
    config: MstpConfig,
    port: P,
    receiver: ReceiveFsm,
    state: MasterState,
    next_station: u8,
    poll_station: u8,
    token_count: u8,
    retry_count: u8,
    frame_count: u8,
    event_count: u8,
    sole_master: bool,
    silence: u32,
    received_valid: Option<ReceivedFrame>,
    received_invalid: bool,
    /// DataExpectingReply frame this station still has to answer
    pending_request: Option<ReceivedFrame>,
    transmit_queue: Deque<MstpFrame, TRANSMIT_QUEUE_SIZE>,
    receive_queue: Deque<ReceivedPdu, RECEIVE_QUEUE_SIZE>,
    stats: MstpStatistics,
    output: Vec<u8>,
}

impl<P: SerialPort> MstpNode<P> {
    pub fn new(config: MstpConfig, port: P) -> Result<Self> {
        config.validate()?;
        let station = config.station_address;
        let state = if is_master_node(station) {
            MasterState::Initialize
        } else {
            MasterState::Idle
        };
        Ok(Self {
            receiver: ReceiveFsm::new(station, config.frame_abort),
            port,
            state,
            next_station: station,
            poll_station: station,
            token_count: 0,
            retry_count: 0,
            frame_count: 0,
            event_count: 0,
            sole_master: false,
            silence: 0,
            received_valid: None,
            received_invalid: false,
            pending_request: None,
            transmit_queue: Deque::new(),
            receive_queue: Deque::new(),
            stats: MstpStatistics::default(),
            output: Vec::with_capacity(super::MSTP_MAX_FRAME_SIZE),
            config,
        })
    }

    /// Feed one received octet.
    pub fn receive_octet(&mut self, octet: u8) {
        let event = self.receiver.receive_octet(octet, self.silence);
        self.silence = 0;
        self.event_count = self.event_count.saturating_add(1);
        if let Some(event) = event {
            self.handle_receive_event(event);
        }
    }

    /// Feed a complete frame from a port that does its own framing.
    pub fn frame_received(&mut self, raw: &[u8]) {
        for &octet in raw {
            self.receive_octet(octet);
        }
    }

    /// The UART reported a framing, parity or overrun error.
    pub fn receive_error(&mut self) {
        self.silence = 0;
        self.event_count = self.event_count.saturating_add(1);
        if let Some(event) = self.receiver.receive_error() {
            self.handle_receive_event(event);
        }
    }

    /// Advance the silence timer.
    pub fn silence_timer_tick(&mut self, elapsed: u32) {
        self.silence = self.silence.saturating_add(elapsed);
        if let Some(event) = self.receiver.check_timeout(self.silence) {
            self.handle_receive_event(event);
        }
    }

    fn handle_receive_event(&mut self, event: ReceiveEvent) {
        match event {
            ReceiveEvent::ValidFrame(frame) => {
                self.stats.valid_frames = self.stats.valid_frames.wrapping_add(1);
                trace!(
                    "MS/TP {}: Rx type {} from {} ({} octets)",
                    self.config.station_address,
                    frame.frame_type,
                    frame.source,
                    frame.data.len()
                );
                self.received_valid = Some(frame);
            }
            ReceiveEvent::ValidFrameNotForUs { .. } => {
                self.stats.frames_not_for_us = self.stats.frames_not_for_us.wrapping_add(1);
            }
            ReceiveEvent::InvalidFrame => {
                self.stats.invalid_frames = self.stats.invalid_frames.wrapping_add(1);
                self.received_invalid = true;
            }
        }
    }

    /// Queue a frame for transmission.
    ///
    /// Masters send queued frames while they hold the token. A queued frame
    /// that answers the DataExpectingReply being served is sent at once.
    pub fn enqueue_transmit(&mut self, frame: MstpFrame) -> Result<()> {
        self.transmit_queue.push_back(frame).map_err(|_| {
            self.stats.transmit_queue_full = self.stats.transmit_queue_full.wrapping_add(1);
            warn!(
                "MS/TP {}: transmit queue full",
                self.config.station_address
            );
            DataLinkError::QueueFull
        })
    }

    /// Oldest received NPDU, if any
    pub fn take_received(&mut self) -> Option<ReceivedPdu> {
        self.receive_queue.pop_front()
    }

    /// Run the node state machine until it has to wait for an octet or time.
    pub fn step(&mut self) {
        if !is_master_node(self.config.station_address) {
            self.slave_step();
            return;
        }
        for _ in 0..MAX_TRANSITIONS {
            if !self.master_step() {
                return;
            }
        }
        debug!(
            "MS/TP {}: transition limit reached in {:?}",
            self.config.station_address, self.state
        );
    }

    pub fn state(&self) -> MasterState {
        self.state
    }

    pub fn next_station(&self) -> u8 {
        self.next_station
    }

    pub fn poll_station(&self) -> u8 {
        self.poll_station
    }

    pub fn sole_master(&self) -> bool {
        self.sole_master
    }

    /// Milliseconds since the last octet was sent or received
    pub fn silence_ms(&self) -> u32 {
        self.silence
    }

    pub fn statistics(&self) -> &MstpStatistics {
        &self.stats
    }

    pub fn config(&self) -> &MstpConfig {
        &self.config
    }

    pub fn transmit_queue_len(&self) -> usize {
        self.transmit_queue.len()
    }

    pub fn receive_queue_len(&self) -> usize {
        self.receive_queue.len()
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    fn this_station(&self) -> u8 {
        self.config.station_address
    }

    /// `station + 1`, wrapping after max_master
    fn successor(&self, station: u8) -> u8 {
        let modulus = u16::from(self.config.max_master) + 1;
        ((u16::from(station) + 1) % modulus) as u8
    }

    fn transmit(&mut self, frame: &MstpFrame) {
        self.output.clear();
        frame.encode_into(&mut self.output);
        trace!(
            "MS/TP {}: Tx {}",
            self.config.station_address,
            hex_string(&self.output)
        );
        match self.port.write_frame(&self.output) {
            Ok(()) => self.stats.frames_sent = self.stats.frames_sent.wrapping_add(1),
            Err(err) => {
                self.stats.transmit_errors = self.stats.transmit_errors.wrapping_add(1);
                warn!(
                    "MS/TP {}: write failed: {}",
                    self.config.station_address, err
                );
            }
        }
        self.silence = 0;
    }

    fn send_control(&mut self, frame_type: MstpFrameType, destination: u8) {
        let frame = MstpFrame::control(frame_type, destination, self.this_station());
        self.transmit(&frame);
    }

    fn send_token(&mut self) {
        self.send_control(MstpFrameType::Token, self.next_station);
    }

    fn send_poll_for_master(&mut self) {
        self.send_control(MstpFrameType::PollForMaster, self.poll_station);
    }

    fn send_test_response(&mut self, request: &ReceivedFrame) {
        let frame = MstpFrame {
            frame_type: MstpFrameType::TestResponse,
            destination: request.source,
            source: self.this_station(),
            data: request.data.clone(),
        };
        self.transmit(&frame);
    }

    /// Hand the data of a BACnet data frame to the network layer
    fn put_receive(&mut self, frame: &ReceivedFrame, expecting_reply: bool) {
        if frame.data.is_empty() {
            return;
        }
        let pdu = ReceivedPdu {
            source: frame.source,
            expecting_reply,
            data: frame.data.clone(),
        };
        if self.receive_queue.push_back(pdu).is_err() {
            self.stats.receive_queue_full = self.stats.receive_queue_full.wrapping_add(1);
            warn!(
                "MS/TP {}: receive queue full, dropping frame from {}",
                self.config.station_address, frame.source
            );
        }
    }

    /// Send the head of the transmit queue if it answers the pending request
    fn send_reply_if_ready(&mut self) -> bool {
        let ready = match (&self.pending_request, self.transmit_queue.front()) {
            (Some(request), Some(reply)) => is_reply_to(request, reply),
            _ => false,
        };
        if !ready {
            return false;
        }
        if let Some(reply) = self.transmit_queue.pop_front() {
            self.transmit(&reply);
        }
        self.pending_request = None;
        true
    }

    /// One pass of the master state machine; true when the next state should
    /// run without waiting.
    fn master_step(&mut self) -> bool {
        let previous = self.state;
        let transition_now = match self.state {
            MasterState::Initialize => {
                self.next_station = self.this_station();
                self.poll_station = self.this_station();
                self.token_count = NPOLL;
                self.sole_master = false;
                self.state = MasterState::Idle;
                true
            }
            MasterState::Idle => self.idle(),
            MasterState::UseToken => self.use_token(),
            MasterState::WaitForReply => self.wait_for_reply(),
            MasterState::DoneWithToken => self.done_with_token(),
            MasterState::PassToken => self.pass_token(),
            MasterState::NoToken => self.no_token(),
            MasterState::PollForMaster => self.poll_for_master(),
            MasterState::AnswerDataRequest => self.answer_data_request(),
        };
        if self.state != previous {
            debug!(
                "MS/TP {}: {:?} -> {:?} NS={} PS={} EC={} TC={} ST={}",
                self.this_station(),
                previous,
                self.state,
                self.next_station,
                self.poll_station,
                self.event_count,
                self.token_count,
                self.silence
            );
        }
        transition_now
    }

    fn idle(&mut self) -> bool {
        if self.silence >= self.config.no_token_timeout {
            // LostToken
            self.event_count = 0;
            self.stats.lost_tokens = self.stats.lost_tokens.wrapping_add(1);
            self.received_invalid = false;
            self.received_valid = None;
            self.state = MasterState::NoToken;
            return true;
        }
        if self.received_invalid {
            self.received_invalid = false;
            return false;
        }
        let Some(frame) = self.received_valid.take() else {
            return false;
        };

        let broadcast = frame.destination == MSTP_BROADCAST_ADDRESS;
        match MstpFrameType::from_u8(frame.frame_type) {
            // tokens are never broadcast
            Some(MstpFrameType::Token) if !broadcast => {
                self.stats.tokens_received = self.stats.tokens_received.wrapping_add(1);
                self.frame_count = 0;
                self.sole_master = false;
                self.state = MasterState::UseToken;
                return true;
            }
            Some(MstpFrameType::PollForMaster) => {
                self.send_control(MstpFrameType::ReplyToPollForMaster, frame.source);
            }
            Some(MstpFrameType::BacnetDataNotExpectingReply) => {
                self.put_receive(&frame, false);
            }
            Some(MstpFrameType::BacnetDataExpectingReply) => {
                self.put_receive(&frame, !broadcast);
                // an empty request has nothing to answer
                if !broadcast && !frame.data.is_empty() {
                    self.pending_request = Some(frame);
                    self.state = MasterState::AnswerDataRequest;
                }
            }
            Some(MstpFrameType::TestRequest) => {
                self.send_test_response(&frame);
            }
            _ => {}
        }
        false
    }

    fn use_token(&mut self) -> bool {
        let Some(frame) = self.transmit_queue.pop_front() else {
            // NothingToSend
            self.frame_count = self.config.max_info_frames;
            self.state = MasterState::DoneWithToken;
            return true;
        };
        let wait_for_reply = match frame.frame_type {
            MstpFrameType::BacnetDataExpectingReply => {
                frame.destination != MSTP_BROADCAST_ADDRESS
            }
            MstpFrameType::TestRequest => true,
            _ => false,
        };
        self.transmit(&frame);
        self.frame_count = self.frame_count.saturating_add(1);
        self.state = if wait_for_reply {
            MasterState::WaitForReply
        } else {
            MasterState::DoneWithToken
        };
        false
    }

    fn wait_for_reply(&mut self) -> bool {
        if self.silence >= self.config.reply_timeout {
            // ReplyTimeout
            self.frame_count = self.config.max_info_frames;
            self.state = MasterState::DoneWithToken;
            return true;
        }
        if self.received_invalid {
            self.received_invalid = false;
            self.state = MasterState::DoneWithToken;
            return true;
        }
        let Some(frame) = self.received_valid.take() else {
            return false;
        };

        self.state = if frame.destination == self.this_station() {
            match MstpFrameType::from_u8(frame.frame_type) {
                Some(MstpFrameType::ReplyPostponed) | Some(MstpFrameType::TestResponse) => {
                    MasterState::DoneWithToken
                }
                Some(MstpFrameType::BacnetDataNotExpectingReply) => {
                    self.put_receive(&frame, false);
                    MasterState::DoneWithToken
                }
                // ReceivedUnexpectedFrame
                _ => MasterState::Idle,
            }
        } else {
            MasterState::Idle
        };
        true
    }

    fn done_with_token(&mut self) -> bool {
        let this_station = self.this_station();
        let next_this = self.successor(this_station);
        let next_next = self.successor(self.next_station);
        let next_poll = self.successor(self.poll_station);

        if self.frame_count < self.config.max_info_frames {
            // SendAnotherFrame
            self.state = MasterState::UseToken;
            return true;
        }
        if !self.sole_master && self.next_station == this_station {
            // NextStationUnknown
            self.poll_station = next_this;
            self.send_poll_for_master();
            self.retry_count = 0;
            self.state = MasterState::PollForMaster;
            return false;
        }
        if self.token_count < NPOLL - 1 {
            if self.sole_master && self.next_station != next_this {
                // SoleMaster
                self.frame_count = 0;
                self.token_count += 1;
                self.state = MasterState::UseToken;
                return true;
            }
            // SendToken
            self.token_count += 1;
            self.send_token();
            self.retry_count = 0;
            self.event_count = 0;
            self.state = MasterState::PassToken;
            return false;
        }
        if next_poll == self.next_station {
            if self.sole_master {
                // SoleMasterRestartMaintenancePFM
                self.poll_station = next_next;
                self.send_poll_for_master();
                self.next_station = this_station;
                self.retry_count = 0;
                self.token_count = 1;
                self.state = MasterState::PollForMaster;
            } else {
                // ResetMaintenancePFM
                self.poll_station = this_station;
                self.send_token();
                self.retry_count = 0;
                self.token_count = 1;
                self.event_count = 0;
                self.state = MasterState::PassToken;
            }
            return false;
        }
        // SendMaintenancePFM
        self.poll_station = next_poll;
        self.send_poll_for_master();
        self.retry_count = 0;
        self.state = MasterState::PollForMaster;
        false
    }

    fn pass_token(&mut self) -> bool {
        if self.silence <= self.config.usage_timeout {
            if self.event_count > NMIN_OCTETS {
                // SawTokenUser
                self.state = MasterState::Idle;
                return true;
            }
            return false;
        }
        if self.retry_count < NRETRY_TOKEN {
            // RetrySendToken
            self.retry_count += 1;
            self.send_token();
            self.event_count = 0;
            return false;
        }
        // FindNewSuccessor
        debug!(
            "MS/TP {}: station {} did not use the token",
            self.this_station(),
            self.next_station
        );
        self.poll_station = self.successor(self.next_station);
        self.send_poll_for_master();
        self.next_station = self.this_station();
        self.retry_count = 0;
        self.token_count = 0;
        self.state = MasterState::PollForMaster;
        false
    }

    fn no_token(&mut self) -> bool {
        let this_station = u32::from(self.this_station());
        let no_token = self.config.no_token_timeout;
        let slot = self.config.slot_time;
        let my_timeout = no_token.saturating_add(slot.saturating_mul(this_station));

        if self.silence < my_timeout {
            if self.event_count > NMIN_OCTETS {
                // SawFrame
                self.state = MasterState::Idle;
                return true;
            }
            return false;
        }

        let ns_timeout = no_token.saturating_add(slot.saturating_mul(this_station + 1));
        let mm_timeout = no_token
            .saturating_add(slot.saturating_mul(u32::from(self.config.max_master) + 1));
        if self.silence < ns_timeout || self.silence > mm_timeout {
            // GenerateToken
            debug!("MS/TP {}: generating a token", self.this_station());
            self.poll_station = self.successor(self.this_station());
            self.send_poll_for_master();
            self.next_station = self.this_station();
            self.retry_count = 0;
            self.token_count = 0;
            self.state = MasterState::PollForMaster;
            return false;
        }
        if self.event_count > NMIN_OCTETS {
            // SawFrame
            self.state = MasterState::Idle;
            return true;
        }
        false
    }

    fn poll_for_master(&mut self) -> bool {
        if let Some(frame) = self.received_valid.take() {
            if frame.destination == self.this_station()
                && frame.frame_type == MstpFrameType::ReplyToPollForMaster as u8
            {
                // ReceivedReplyToPFM
                self.sole_master = false;
                self.next_station = frame.source;
                self.event_count = 0;
                self.send_token();
                self.poll_station = self.this_station();
                self.token_count = 0;
                self.retry_count = 0;
                self.state = MasterState::PassToken;
                return false;
            }
            // ReceivedUnexpectedFrame
            self.state = MasterState::Idle;
            return true;
        }

        if self.silence <= self.config.usage_timeout && !self.received_invalid {
            return false;
        }
        self.received_invalid = false;

        if self.sole_master {
            // SoleMaster
            self.frame_count = 0;
            self.state = MasterState::UseToken;
            return true;
        }
        if self.next_station != self.this_station() {
            // DoneWithPFM
            self.event_count = 0;
            self.send_token();
            self.retry_count = 0;
            self.state = MasterState::PassToken;
            return false;
        }
        let next_poll = self.successor(self.poll_station);
        if next_poll != self.this_station() {
            // SendNextPFM
            self.poll_station = next_poll;
            self.send_poll_for_master();
            self.retry_count = 0;
            return false;
        }
        // DeclareSoleMaster
        debug!("MS/TP {}: declaring sole master", self.this_station());
        self.sole_master = true;
        self.frame_count = 0;
        self.state = MasterState::UseToken;
        true
    }

    fn answer_data_request(&mut self) -> bool {
        if self.send_reply_if_ready() {
            // Reply
            self.state = MasterState::Idle;
            return false;
        }
        match self.pending_request.as_ref().map(|request| request.source) {
            None => self.state = MasterState::Idle,
            Some(requester) if self.silence > self.config.reply_delay => {
                // DeferredReply
                self.send_control(MstpFrameType::ReplyPostponed, requester);
                self.stats.reply_postponed_sent =
                    self.stats.reply_postponed_sent.wrapping_add(1);
                self.pending_request = None;
                self.state = MasterState::Idle;
            }
            Some(_) => {}
        }
        false
    }

    fn slave_step(&mut self) {
        if self.received_invalid {
            self.received_invalid = false;
        } else if let Some(frame) = self.received_valid.take() {
            let broadcast = frame.destination == MSTP_BROADCAST_ADDRESS;
            match MstpFrameType::from_u8(frame.frame_type) {
                Some(MstpFrameType::BacnetDataExpectingReply) => {
                    self.put_receive(&frame, !broadcast);
                    if !broadcast && !frame.data.is_empty() {
                        self.pending_request = Some(frame);
                    }
                }
                Some(MstpFrameType::BacnetDataNotExpectingReply) => {
                    self.put_receive(&frame, false);
                }
                Some(MstpFrameType::TestRequest) if !broadcast => {
                    self.send_test_response(&frame);
                }
                _ => {}
            }
        }

        if self.pending_request.is_some() {
            if !self.send_reply_if_ready() && self.silence > self.config.reply_delay {
                debug!(
                    "MS/TP {}: no reply within Treply_delay",
                    self.this_station()
                );
                self.pending_request = None;
            }
        } else if let Some(frame) = self.transmit_queue.pop_front() {
            // a slave only ever answers
            warn!(
                "MS/TP {}: slave cannot initiate, dropping frame to {}",
                self.this_station(),
                frame.destination
            );
        }
    }
}

/// True when `reply` answers the confirmed request carried in `request`.
///
/// Both must be application NPDUs between the same peers with the same
/// network priority, and the reply APDU must close the request's invoke id
/// (and name its service, for acknowledgements and errors).
pub fn is_reply_to(request: &ReceivedFrame, reply: &MstpFrame) -> bool {
    if reply.destination != request.source || !reply.is_data() {
        return false;
    }
    let (Ok((request_npdu, request_len)), Ok((reply_npdu, reply_len))) =
        (Npdu::decode(&request.data), Npdu::decode(&reply.data))
    else {
        return false;
    };
    if request_npdu.is_network_message() || reply_npdu.is_network_message() {
        return false;
    }
    if request_npdu.source != reply_npdu.destination
        || request_npdu.control.priority != reply_npdu.control.priority
    {
        return false;
    }

    let request_apdu = Apdu::decode(request.data.get(request_len..).unwrap_or(&[]));
    let reply_apdu = Apdu::decode(reply.data.get(reply_len..).unwrap_or(&[]));
    let (Ok(Apdu::ConfirmedRequest(request)), Ok(reply)) = (request_apdu, reply_apdu) else {
        return false;
    };
    let invoke_id = request.header.invoke_id;
    let service = request.service_choice;
    match reply {
        Apdu::SimpleAck(ack) => ack.invoke_id == invoke_id && ack.service_choice == service,
        Apdu::ComplexAck(ack) => ack.invoke_id == invoke_id && ack.service_choice == service,
        Apdu::Error(error) => error.invoke_id == invoke_id && error.service_choice == service,
        Apdu::Reject(reject) => reject.invoke_id == invoke_id,
        Apdu::Abort(abort) => abort.invoke_id == invoke_id,
        _ => false,
    }
}

impl<P: SerialPort> DataLink for MstpNode<P> {
    fn send_frame(&mut self, frame: &[u8], dest: &DataLinkAddress) -> Result<()> {
        let (npdu, _) = Npdu::decode(frame).map_err(|_| DataLinkError::InvalidFrame)?;
        let destination = dest.mstp_station();
        // broadcasts never expect a reply at the data link
        let expecting_reply =
            npdu.control.expecting_reply && destination != MSTP_BROADCAST_ADDRESS;
        let frame =
            MstpFrame::bacnet_data(destination, self.this_station(), frame, expecting_reply)?;
        self.enqueue_transmit(frame)
    }

    fn receive_frame(&mut self) -> Result<Option<(Vec<u8>, DataLinkAddress)>> {
        Ok(self.take_received().map(|pdu| {
            (
                pdu.data.to_vec(),
                DataLinkAddress::from_mstp_station(pdu.source),
            )
        }))
    }

    fn local_address(&self) -> DataLinkAddress {
        DataLinkAddress::MsTp(self.this_station())
    }
}
