//! Transaction state machine collaborator
//!
//! The dispatcher only ever tells the TSM that an invoke id is finished,
//! through [`TransactionRegistry`]. [`TransactionTable`] is the client-side
//! bookkeeping behind it: invoke-id allocation, the APDU timeout countdown
//! and retransmission.

use log::{debug, warn};
use thiserror::Error;

use crate::app::ApplicationConfig;
use crate::network::BacnetAddress;

/// Default number of concurrent confirmed transactions
pub const DEFAULT_MAX_TRANSACTIONS: usize = 16;

/// Result type for transaction operations
pub type Result<T> = std::result::Result<T, TsmError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TsmError {
    #[error("no free transaction slot")]
    NoFreeSlot,
    #[error("invoke id {0} is already in use")]
    InvokeIdInUse(u8),
}

/// What the dispatcher needs from the transaction state machine
pub trait TransactionRegistry {
    /// The transaction for `invoke_id` is over (answered, rejected or aborted)
    fn free_invoke_id(&mut self, invoke_id: u8);
}

/// Transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Waiting for response
    AwaitConfirmation,
    /// Retries exhausted without an answer
    Failed,
}

/// An outstanding confirmed request
#[derive(Debug, Clone)]
pub struct Transaction {
    pub invoke_id: u8,
    pub destination: BacnetAddress,
    pub service_choice: u8,
    pub state: TransactionState,
    /// Milliseconds until the next retransmission or failure
    pub timeout_remaining: u32,
    pub retries_remaining: u8,
    /// Encoded NPDU and APDU, kept for retransmission
    pub pdu: Vec<u8>,
}

/// Emitted by [`TransactionTable::tick_ms`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TsmEvent {
    /// Send the stored PDU again
    Retransmit {
        invoke_id: u8,
        destination: BacnetAddress,
        pdu: Vec<u8>,
    },
    /// No answer after all retries; the invoke id stays reserved until freed
    TimedOut { invoke_id: u8, service_choice: u8 },
}

/// Fixed-capacity table of outstanding confirmed requests
#[derive(Debug)]
pub struct TransactionTable<const N: usize = DEFAULT_MAX_TRANSACTIONS> {
    transactions: heapless::Vec<Transaction, N>,
    next_id: u8,
    apdu_timeout: u32,
    apdu_retries: u8,
}

impl<const N: usize> TransactionTable<N> {
    pub fn new(config: &ApplicationConfig) -> Self {
        Self {
            transactions: heapless::Vec::new(),
            next_id: 1,
            apdu_timeout: config.apdu_timeout,
            apdu_retries: config.apdu_retries,
        }
    }

    /// Next invoke id that is not in use, or `None` when every slot is busy
    pub fn next_invoke_id(&mut self) -> Option<u8> {
        if self.transactions.is_full() {
            return None;
        }

        let start_id = self.next_id;
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if self.is_free(id) {
                return Some(id);
            }
            if self.next_id == start_id {
                return None;
            }
        }
    }

    /// Track a confirmed request that has just been queued for sending
    pub fn start(
        &mut self,
        invoke_id: u8,
        destination: BacnetAddress,
        service_choice: u8,
        pdu: Vec<u8>,
    ) -> Result<()> {
        if !self.is_free(invoke_id) {
            return Err(TsmError::InvokeIdInUse(invoke_id));
        }
        self.transactions
            .push(Transaction {
                invoke_id,
                destination,
                service_choice,
                state: TransactionState::AwaitConfirmation,
                timeout_remaining: self.apdu_timeout,
                retries_remaining: self.apdu_retries,
                pdu,
            })
            .map_err(|_| TsmError::NoFreeSlot)
    }

    pub fn is_free(&self, invoke_id: u8) -> bool {
        !self.transactions.iter().any(|t| t.invoke_id == invoke_id)
    }

    /// True if the transaction ran out of retries without an answer
    pub fn is_failed(&self, invoke_id: u8) -> bool {
        self.get(invoke_id)
            .map_or(false, |t| t.state == TransactionState::Failed)
    }

    pub fn get(&self, invoke_id: u8) -> Option<&Transaction> {
        self.transactions.iter().find(|t| t.invoke_id == invoke_id)
    }

    /// Get active transaction count
    pub fn active_count(&self) -> usize {
        self.transactions
            .iter()
            .filter(|t| t.state == TransactionState::AwaitConfirmation)
            .count()
    }

    /// Advance the APDU timers by `elapsed` milliseconds
    pub fn tick_ms(&mut self, elapsed: u32) -> Vec<TsmEvent> {
        let mut events = Vec::new();
        for transaction in self
            .transactions
            .iter_mut()
            .filter(|t| t.state == TransactionState::AwaitConfirmation)
        {
            transaction.timeout_remaining = transaction.timeout_remaining.saturating_sub(elapsed);
            if transaction.timeout_remaining > 0 {
                continue;
            }
            if transaction.retries_remaining > 0 {
                transaction.retries_remaining -= 1;
                transaction.timeout_remaining = self.apdu_timeout;
                debug!(
                    "TSM: retransmitting invoke id {} ({} retries left)",
                    transaction.invoke_id, transaction.retries_remaining
                );
                events.push(TsmEvent::Retransmit {
                    invoke_id: transaction.invoke_id,
                    destination: transaction.destination.clone(),
                    pdu: transaction.pdu.clone(),
                });
            } else {
                transaction.state = TransactionState::Failed;
                warn!(
                    "TSM: invoke id {} to {} timed out",
                    transaction.invoke_id, transaction.destination
                );
                events.push(TsmEvent::TimedOut {
                    invoke_id: transaction.invoke_id,
                    service_choice: transaction.service_choice,
                });
            }
        }
        events
    }
}

impl<const N: usize> TransactionRegistry for TransactionTable<N> {
    fn free_invoke_id(&mut self, invoke_id: u8) {
        if let Some(index) = self
            .transactions
            .iter()
            .position(|t| t.invoke_id == invoke_id)
        {
            self.transactions.swap_remove(index);
        } else {
            debug!("TSM: invoke id {} was not outstanding", invoke_id);
        }
    }
}

impl<const N: usize> Default for TransactionTable<N> {
    fn default() -> Self {
        Self::new(&ApplicationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(timeout: u32, retries: u8) -> ApplicationConfig {
        ApplicationConfig {
            apdu_timeout: timeout,
            apdu_retries: retries,
            ..Default::default()
        }
    }

    #[test]
    fn test_invoke_ids_skip_outstanding() {
        let mut table: TransactionTable<4> = TransactionTable::default();
        let first = table.next_invoke_id().unwrap();
        table.start(first, BacnetAddress::mstp(2), 12, vec![0x01]).unwrap();
        let second = table.next_invoke_id().unwrap();
        assert_ne!(first, second);

        assert_eq!(
            table.start(first, BacnetAddress::mstp(2), 12, vec![]),
            Err(TsmError::InvokeIdInUse(first))
        );

        table.free_invoke_id(first);
        assert!(table.is_free(first));
    }

    #[test]
    fn test_table_full() {
        let mut table: TransactionTable<2> = TransactionTable::default();
        for _ in 0..2 {
            let id = table.next_invoke_id().unwrap();
            table.start(id, BacnetAddress::mstp(2), 12, vec![]).unwrap();
        }
        assert_eq!(table.next_invoke_id(), None);
        assert_eq!(table.active_count(), 2);
    }

    #[test]
    fn test_retransmit_then_time_out() {
        let mut table: TransactionTable<4> = TransactionTable::new(&config(100, 1));
        table.start(7, BacnetAddress::mstp(3), 12, vec![0xAA]).unwrap();

        assert!(table.tick_ms(99).is_empty());
        let events = table.tick_ms(1);
        assert_eq!(
            events,
            vec![TsmEvent::Retransmit {
                invoke_id: 7,
                destination: BacnetAddress::mstp(3),
                pdu: vec![0xAA],
            }]
        );

        let events = table.tick_ms(100);
        assert_eq!(
            events,
            vec![TsmEvent::TimedOut {
                invoke_id: 7,
                service_choice: 12
            }]
        );
        assert!(table.is_failed(7));
        assert!(!table.is_free(7));
        assert!(table.tick_ms(1000).is_empty());

        table.free_invoke_id(7);
        assert!(table.is_free(7));
    }

    #[test]
    fn test_free_unknown_invoke_id_is_harmless() {
        let mut table: TransactionTable<4> = TransactionTable::default();
        table.free_invoke_id(200);
        assert_eq!(table.active_count(), 0);
    }
}
