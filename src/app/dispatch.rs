//! APDU service dispatch
//!
//! [`DispatchTable`] holds at most one [`ServiceHandler`] per slot:
//!
//! - one per confirmed service code
//! - one per unconfirmed service code
//! - an ACK handler and an error handler per confirmed service code
//! - a single reject, abort and unrecognized-service handler
//!
//! [`ApduDispatcher`] owns a table and the Device Communication Control
//! state. It decodes each inbound APDU once, applies the communication gate
//! and calls at most one handler. For every PDU type that carries an invoke
//! id, the id is handed back to the [`TransactionRegistry`] once the handler
//! (if any) has returned.
//!
//! Registering a handler for a slot that already has one replaces it.
//!
//! # Example
//!
//! ```
//! use bacnet_core::app::dispatch::{confirmed_fn, ApduDispatcher, DispatchOutcome, DispatchTable};
//! use bacnet_core::app::dcc::DccConfig;
//! use bacnet_core::app::tsm::TransactionTable;
//! use bacnet_core::network::BacnetAddress;
//! use bacnet_core::service::ConfirmedServiceChoice;
//!
//! let mut table = DispatchTable::new();
//! table.register_confirmed(
//!     ConfirmedServiceChoice::ReadProperty,
//!     confirmed_fn(|_ctx, request| assert_eq!(request.service_data, &[0x0C])),
//! );
//! let mut dispatcher = ApduDispatcher::new(table, &DccConfig::default());
//!
//! let mut tsm: TransactionTable = TransactionTable::default();
//! let mut reply = Vec::new();
//! let outcome = dispatcher
//!     .dispatch(&BacnetAddress::mstp(3), &[0x00, 0x05, 0x01, 0x0C, 0x0C], &mut tsm, &mut reply)
//!     .unwrap();
//! assert_eq!(outcome, DispatchOutcome::Handled);
//! ```

use std::fmt;

use log::{debug, trace};

use crate::app::dcc::{CommunicationControl, DccConfig};
use crate::app::tsm::TransactionRegistry;
use crate::app::{
    AbortPdu, Apdu, ComplexAck, ConfirmedRequest, ErrorPdu, PduType, RejectPdu,
    Result, SimpleAck, UnconfirmedRequest,
};
use crate::network::BacnetAddress;
use crate::service::{
    ConfirmedServiceChoice, ProtocolServicesSupported, UnconfirmedServiceChoice,
    MAX_CONFIRMED_SERVICES, MAX_UNCONFIRMED_SERVICES,
};
use crate::util::hex_string;

/// What a handler sees besides the decoded PDU
pub struct ServiceContext<'a> {
    /// Address the PDU came from
    pub source: &'a BacnetAddress,
    /// The dispatcher's communication control state
    pub communication_control: &'a mut CommunicationControl,
    reply: &'a mut Vec<u8>,
}

impl<'a> ServiceContext<'a> {
    pub fn new(
        source: &'a BacnetAddress,
        communication_control: &'a mut CommunicationControl,
        reply: &'a mut Vec<u8>,
    ) -> Self {
        Self {
            source,
            communication_control,
            reply,
        }
    }

    /// Encode `apdu` as the answer to the PDU being handled, replacing any
    /// earlier reply
    pub fn reply(&mut self, apdu: &Apdu<'_>) -> Result<()> {
        self.reply.clear();
        apdu.encode(self.reply)
    }

    /// Write a pre-encoded APDU as the reply
    pub fn reply_raw(&mut self, apdu: &[u8]) {
        self.reply.clear();
        self.reply.extend_from_slice(apdu);
    }

    pub fn has_reply(&self) -> bool {
        !self.reply.is_empty()
    }
}

/// A handler for one or more PDU categories
///
/// Every method defaults to doing nothing, so an implementation only
/// overrides the categories it is registered for.
pub trait ServiceHandler {
    fn confirmed(&mut self, _ctx: &mut ServiceContext<'_>, _request: &ConfirmedRequest<'_>) {}

    fn unconfirmed(&mut self, _ctx: &mut ServiceContext<'_>, _request: &UnconfirmedRequest<'_>) {
    }

    fn simple_ack(&mut self, _ctx: &mut ServiceContext<'_>, _ack: &SimpleAck) {}

    fn complex_ack(&mut self, _ctx: &mut ServiceContext<'_>, _ack: &ComplexAck<'_>) {}

    fn error(&mut self, _ctx: &mut ServiceContext<'_>, _error: &ErrorPdu) {}

    fn reject(&mut self, _ctx: &mut ServiceContext<'_>, _reject: &RejectPdu) {}

    fn abort(&mut self, _ctx: &mut ServiceContext<'_>, _abort: &AbortPdu) {}
}

/// Closure adapter, see [`confirmed_fn`]
pub struct ConfirmedFn<F>(F);

/// Wrap a closure as a confirmed-request handler
pub fn confirmed_fn<F>(f: F) -> ConfirmedFn<F>
where
    F: FnMut(&mut ServiceContext<'_>, &ConfirmedRequest<'_>),
{
    ConfirmedFn(f)
}

impl<F> ServiceHandler for ConfirmedFn<F>
where
    F: FnMut(&mut ServiceContext<'_>, &ConfirmedRequest<'_>),
{
    fn confirmed(&mut self, ctx: &mut ServiceContext<'_>, request: &ConfirmedRequest<'_>) {
        (self.0)(ctx, request)
    }
}

/// Closure adapter, see [`unconfirmed_fn`]
pub struct UnconfirmedFn<F>(F);

/// Wrap a closure as an unconfirmed-request handler
pub fn unconfirmed_fn<F>(f: F) -> UnconfirmedFn<F>
where
    F: FnMut(&mut ServiceContext<'_>, &UnconfirmedRequest<'_>),
{
    UnconfirmedFn(f)
}

impl<F> ServiceHandler for UnconfirmedFn<F>
where
    F: FnMut(&mut ServiceContext<'_>, &UnconfirmedRequest<'_>),
{
    fn unconfirmed(&mut self, ctx: &mut ServiceContext<'_>, request: &UnconfirmedRequest<'_>) {
        (self.0)(ctx, request)
    }
}

/// Closure adapter, see [`simple_ack_fn`]
pub struct SimpleAckFn<F>(F);

/// Wrap a closure as a SimpleACK handler
pub fn simple_ack_fn<F>(f: F) -> SimpleAckFn<F>
where
    F: FnMut(&mut ServiceContext<'_>, &SimpleAck),
{
    SimpleAckFn(f)
}

impl<F> ServiceHandler for SimpleAckFn<F>
where
    F: FnMut(&mut ServiceContext<'_>, &SimpleAck),
{
    fn simple_ack(&mut self, ctx: &mut ServiceContext<'_>, ack: &SimpleAck) {
        (self.0)(ctx, ack)
    }
}

/// Closure adapter, see [`complex_ack_fn`]
pub struct ComplexAckFn<F>(F);

/// Wrap a closure as a ComplexACK handler
pub fn complex_ack_fn<F>(f: F) -> ComplexAckFn<F>
where
    F: FnMut(&mut ServiceContext<'_>, &ComplexAck<'_>),
{
    ComplexAckFn(f)
}

impl<F> ServiceHandler for ComplexAckFn<F>
where
    F: FnMut(&mut ServiceContext<'_>, &ComplexAck<'_>),
{
    fn complex_ack(&mut self, ctx: &mut ServiceContext<'_>, ack: &ComplexAck<'_>) {
        (self.0)(ctx, ack)
    }
}

/// Closure adapter, see [`error_fn`]
pub struct ErrorFn<F>(F);

/// Wrap a closure as an Error PDU handler
pub fn error_fn<F>(f: F) -> ErrorFn<F>
where
    F: FnMut(&mut ServiceContext<'_>, &ErrorPdu),
{
    ErrorFn(f)
}

impl<F> ServiceHandler for ErrorFn<F>
where
    F: FnMut(&mut ServiceContext<'_>, &ErrorPdu),
{
    fn error(&mut self, ctx: &mut ServiceContext<'_>, error: &ErrorPdu) {
        (self.0)(ctx, error)
    }
}

/// Closure adapter, see [`reject_fn`]
pub struct RejectFn<F>(F);

/// Wrap a closure as the Reject PDU handler
pub fn reject_fn<F>(f: F) -> RejectFn<F>
where
    F: FnMut(&mut ServiceContext<'_>, &RejectPdu),
{
    RejectFn(f)
}

impl<F> ServiceHandler for RejectFn<F>
where
    F: FnMut(&mut ServiceContext<'_>, &RejectPdu),
{
    fn reject(&mut self, ctx: &mut ServiceContext<'_>, reject: &RejectPdu) {
        (self.0)(ctx, reject)
    }
}

/// Closure adapter, see [`abort_fn`]
pub struct AbortFn<F>(F);

/// Wrap a closure as the Abort PDU handler
pub fn abort_fn<F>(f: F) -> AbortFn<F>
where
    F: FnMut(&mut ServiceContext<'_>, &AbortPdu),
{
    AbortFn(f)
}

impl<F> ServiceHandler for AbortFn<F>
where
    F: FnMut(&mut ServiceContext<'_>, &AbortPdu),
{
    fn abort(&mut self, ctx: &mut ServiceContext<'_>, abort: &AbortPdu) {
        (self.0)(ctx, abort)
    }
}

type Slot = Option<Box<dyn ServiceHandler>>;

fn store(slot: &mut Slot, handler: Box<dyn ServiceHandler>, what: fmt::Arguments<'_>) {
    if slot.is_some() {
        debug!("Dispatch: replacing {} handler", what);
    }
    *slot = Some(handler);
}

/// Handler slots, filled at startup and read on every dispatch
pub struct DispatchTable {
    confirmed: [Slot; MAX_CONFIRMED_SERVICES],
    unconfirmed: [Slot; MAX_UNCONFIRMED_SERVICES],
    ack: [Slot; MAX_CONFIRMED_SERVICES],
    error: [Slot; MAX_CONFIRMED_SERVICES],
    reject: Slot,
    abort: Slot,
    unrecognized: Slot,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self {
            confirmed: std::array::from_fn(|_| None),
            unconfirmed: std::array::from_fn(|_| None),
            ack: std::array::from_fn(|_| None),
            error: std::array::from_fn(|_| None),
            reject: None,
            abort: None,
            unrecognized: None,
        }
    }

    pub fn register_confirmed(
        &mut self,
        service: ConfirmedServiceChoice,
        handler: impl ServiceHandler + 'static,
    ) {
        store(
            &mut self.confirmed[service as usize],
            Box::new(handler),
            format_args!("confirmed {:?}", service),
        );
    }

    pub fn register_unconfirmed(
        &mut self,
        service: UnconfirmedServiceChoice,
        handler: impl ServiceHandler + 'static,
    ) {
        store(
            &mut self.unconfirmed[service as usize],
            Box::new(handler),
            format_args!("unconfirmed {:?}", service),
        );
    }

    /// Handler for SimpleACK and ComplexACK answers to `service`
    pub fn register_ack(
        &mut self,
        service: ConfirmedServiceChoice,
        handler: impl ServiceHandler + 'static,
    ) {
        store(
            &mut self.ack[service as usize],
            Box::new(handler),
            format_args!("ack {:?}", service),
        );
    }

    /// Handler for Error PDUs answering `service`
    pub fn register_error(
        &mut self,
        service: ConfirmedServiceChoice,
        handler: impl ServiceHandler + 'static,
    ) {
        store(
            &mut self.error[service as usize],
            Box::new(handler),
            format_args!("error {:?}", service),
        );
    }

    pub fn register_reject(&mut self, handler: impl ServiceHandler + 'static) {
        store(&mut self.reject, Box::new(handler), format_args!("reject"));
    }

    pub fn register_abort(&mut self, handler: impl ServiceHandler + 'static) {
        store(&mut self.abort, Box::new(handler), format_args!("abort"));
    }

    /// Fallback for confirmed requests without a registered handler
    pub fn register_unrecognized(&mut self, handler: impl ServiceHandler + 'static) {
        store(
            &mut self.unrecognized,
            Box::new(handler),
            format_args!("unrecognized service"),
        );
    }

    pub fn is_confirmed_supported(&self, service: ConfirmedServiceChoice) -> bool {
        self.confirmed[service as usize].is_some()
    }

    pub fn is_unconfirmed_supported(&self, service: UnconfirmedServiceChoice) -> bool {
        self.unconfirmed[service as usize].is_some()
    }

    /// Protocol_Services_Supported for the services with a request handler
    pub fn services_supported(&self) -> ProtocolServicesSupported {
        let confirmed = ConfirmedServiceChoice::ALL
            .iter()
            .filter(|service| self.is_confirmed_supported(**service))
            .map(|service| ProtocolServicesSupported::from_confirmed(*service));
        let unconfirmed = UnconfirmedServiceChoice::ALL
            .iter()
            .filter(|service| self.is_unconfirmed_supported(**service))
            .map(|service| ProtocolServicesSupported::from_unconfirmed(*service));
        confirmed
            .chain(unconfirmed)
            .fold(ProtocolServicesSupported::empty(), |acc, bit| acc | bit)
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = |slots: &[Slot]| slots.iter().filter(|s| s.is_some()).count();
        f.debug_struct("DispatchTable")
            .field("confirmed", &count(&self.confirmed))
            .field("unconfirmed", &count(&self.unconfirmed))
            .field("ack", &count(&self.ack))
            .field("error", &count(&self.error))
            .field("reject", &self.reject.is_some())
            .field("abort", &self.abort.is_some())
            .field("unrecognized", &self.unrecognized.is_some())
            .finish()
    }
}

/// What [`ApduDispatcher::dispatch`] did with a PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The registered handler ran
    Handled,
    /// No handler for the confirmed service, the unrecognized-service handler ran
    Unrecognized,
    /// No handler registered; the PDU was dropped
    NoHandler,
    /// Dropped by the communication control gate
    Suppressed,
    /// The invoke id was freed without a handler running
    TransactionClosed,
}

/// Dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStatistics {
    pub pdus_received: u64,
    pub handled: u64,
    pub unrecognized: u64,
    pub dropped_no_handler: u64,
    pub suppressed: u64,
    pub decode_errors: u64,
    pub invoke_ids_freed: u64,
}

/// Owns the handler table and the communication control state
pub struct ApduDispatcher {
    table: DispatchTable,
    communication_control: CommunicationControl,
    stats: DispatchStatistics,
}

impl ApduDispatcher {
    pub fn new(table: DispatchTable, dcc: &DccConfig) -> Self {
        Self {
            table,
            communication_control: CommunicationControl::new(dcc),
            stats: DispatchStatistics::default(),
        }
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut DispatchTable {
        &mut self.table
    }

    pub fn communication_control(&self) -> &CommunicationControl {
        &self.communication_control
    }

    pub fn communication_control_mut(&mut self) -> &mut CommunicationControl {
        &mut self.communication_control
    }

    pub fn statistics(&self) -> &DispatchStatistics {
        &self.stats
    }

    /// Dispatch one APDU received from `source`
    ///
    /// A handler may write its answer into `reply`. Invoke ids of acks,
    /// errors, rejects, aborts and segment acks are released through `tsm`
    /// after the handler has run, even when no handler is registered.
    pub fn dispatch(
        &mut self,
        source: &BacnetAddress,
        pdu: &[u8],
        tsm: &mut dyn TransactionRegistry,
        reply: &mut Vec<u8>,
    ) -> Result<DispatchOutcome> {
        self.stats.pdus_received += 1;
        trace!("Dispatch: APDU from {}: {}", source, hex_string(pdu));

        let apdu = match Apdu::decode(pdu) {
            Ok(apdu) => apdu,
            Err(err) => {
                self.stats.decode_errors += 1;
                debug!("Dispatch: dropping APDU from {}: {}", source, err);
                // responses carry their invoke id in the second octet
                let closes_transaction = matches!(
                    pdu.first().map(|&b| PduType::from_header(b)),
                    Some(Ok(PduType::SimpleAck
                        | PduType::ComplexAck
                        | PduType::SegmentAck
                        | PduType::Error
                        | PduType::Reject
                        | PduType::Abort))
                );
                if closes_transaction {
                    if let Some(&invoke_id) = pdu.get(1) {
                        self.free(tsm, invoke_id);
                    }
                }
                return Err(err);
            }
        };

        let mut ctx = ServiceContext::new(source, &mut self.communication_control, reply);

        let outcome = match &apdu {
            Apdu::ConfirmedRequest(request) => {
                if !ctx.communication_control.confirmed_allowed(request.service_choice) {
                    debug!(
                        "Dispatch: confirmed service {} from {} suppressed",
                        request.service_choice, source
                    );
                    self.stats.suppressed += 1;
                    return Ok(DispatchOutcome::Suppressed);
                }
                let slot = self
                    .table
                    .confirmed
                    .get_mut(request.service_choice as usize)
                    .and_then(Option::as_mut);
                if let Some(handler) = slot {
                    handler.confirmed(&mut ctx, request);
                    DispatchOutcome::Handled
                } else if let Some(handler) = self.table.unrecognized.as_mut() {
                    handler.confirmed(&mut ctx, request);
                    DispatchOutcome::Unrecognized
                } else {
                    DispatchOutcome::NoHandler
                }
            }
            Apdu::UnconfirmedRequest(request) => {
                if !ctx
                    .communication_control
                    .unconfirmed_allowed(request.service_choice)
                {
                    debug!(
                        "Dispatch: unconfirmed service {} from {} suppressed",
                        request.service_choice, source
                    );
                    self.stats.suppressed += 1;
                    return Ok(DispatchOutcome::Suppressed);
                }
                let slot = self
                    .table
                    .unconfirmed
                    .get_mut(request.service_choice as usize)
                    .and_then(Option::as_mut);
                match slot {
                    Some(handler) => {
                        handler.unconfirmed(&mut ctx, request);
                        DispatchOutcome::Handled
                    }
                    None => DispatchOutcome::NoHandler,
                }
            }
            Apdu::SimpleAck(ack) => {
                match self
                    .table
                    .ack
                    .get_mut(ack.service_choice as usize)
                    .and_then(Option::as_mut)
                {
                    Some(handler) => {
                        handler.simple_ack(&mut ctx, ack);
                        DispatchOutcome::Handled
                    }
                    None => DispatchOutcome::TransactionClosed,
                }
            }
            Apdu::ComplexAck(ack) => {
                match self
                    .table
                    .ack
                    .get_mut(ack.service_choice as usize)
                    .and_then(Option::as_mut)
                {
                    Some(handler) => {
                        handler.complex_ack(&mut ctx, ack);
                        DispatchOutcome::Handled
                    }
                    None => DispatchOutcome::TransactionClosed,
                }
            }
            Apdu::Error(error) => {
                match self
                    .table
                    .error
                    .get_mut(error.service_choice as usize)
                    .and_then(Option::as_mut)
                {
                    Some(handler) => {
                        handler.error(&mut ctx, error);
                        DispatchOutcome::Handled
                    }
                    None => DispatchOutcome::TransactionClosed,
                }
            }
            Apdu::Reject(reject) => match self.table.reject.as_mut() {
                Some(handler) => {
                    handler.reject(&mut ctx, reject);
                    DispatchOutcome::Handled
                }
                None => DispatchOutcome::TransactionClosed,
            },
            Apdu::Abort(abort) => match self.table.abort.as_mut() {
                Some(handler) => {
                    handler.abort(&mut ctx, abort);
                    DispatchOutcome::Handled
                }
                None => DispatchOutcome::TransactionClosed,
            },
            Apdu::SegmentAck(_) => DispatchOutcome::TransactionClosed,
        };

        match outcome {
            DispatchOutcome::Handled => self.stats.handled += 1,
            DispatchOutcome::Unrecognized => self.stats.unrecognized += 1,
            DispatchOutcome::NoHandler => {
                debug!(
                    "Dispatch: no handler for {:?} from {}",
                    apdu.pdu_type(),
                    source
                );
                self.stats.dropped_no_handler += 1;
            }
            _ => {}
        }

        if !matches!(
            apdu,
            Apdu::ConfirmedRequest(_) | Apdu::UnconfirmedRequest(_)
        ) {
            if let Some(invoke_id) = apdu.invoke_id() {
                self.free(tsm, invoke_id);
            }
        }

        Ok(outcome)
    }

    fn free(&mut self, tsm: &mut dyn TransactionRegistry, invoke_id: u8) {
        tsm.free_invoke_id(invoke_id);
        self.stats.invoke_ids_freed += 1;
    }
}

impl Default for ApduDispatcher {
    fn default() -> Self {
        Self::new(DispatchTable::new(), &DccConfig::default())
    }
}

impl fmt::Debug for ApduDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApduDispatcher")
            .field("table", &self.table)
            .field("communication_control", &self.communication_control)
            .field("stats", &self.stats)
            .finish()
    }
}
