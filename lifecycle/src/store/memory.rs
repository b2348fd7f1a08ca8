//! In-memory repository for tests and demos.

use super::{RepositoryError, TicketRepository};
use crate::types::{
    EventId, EventInfo, Order, OrderId, ScanEvent, Ticket, TicketId, TicketType, TicketTypeId,
    TransferId, TransferRequest, UserId,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Inner {
    events: HashMap<EventId, EventInfo>,
    ticket_types: HashMap<TicketTypeId, TicketType>,
    orders: HashMap<OrderId, Order>,
    tickets: HashMap<TicketId, Ticket>,
    scans: Vec<ScanEvent>,
    transfers: HashMap<TransferId, TransferRequest>,
    users_by_email: HashMap<String, UserId>,
    fail_after: Option<u32>,
}

/// In-memory [`TicketRepository`].
///
/// Backed by a single mutex; fine for tests and the demo binary, not meant
/// for production load. `fail_next_operation` and `fail_after_writes` make
/// one upcoming write fail (reads are unaffected), which is how rollback
/// and compensation behavior is exercised in tests.
#[derive(Default)]
pub struct InMemoryTicketRepository {
    inner: Mutex<Inner>,
}

impl InMemoryTicketRepository {
    /// Creates an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_fail(inner: &mut Inner) -> Result<(), RepositoryError> {
        match inner.fail_after {
            Some(0) => {
                inner.fail_after = None;
                Err(RepositoryError::Unavailable(
                    "simulated storage failure".to_string(),
                ))
            }
            Some(remaining) => {
                inner.fail_after = Some(remaining - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Registers an account under an email address for
    /// `resolve_user_by_email`. Emails are matched case-insensitively.
    pub fn register_user(&self, email: &str, user_id: UserId) {
        self.lock()
            .users_by_email
            .insert(email.to_ascii_lowercase(), user_id);
    }

    /// Makes the next write operation fail with `Unavailable`
    pub fn fail_next_operation(&self) {
        self.lock().fail_after = Some(0);
    }

    /// Lets `writes` more write operations succeed, then fails the one
    /// after with `Unavailable`
    pub fn fail_after_writes(&self, writes: u32) {
        self.lock().fail_after = Some(writes);
    }

    /// Number of persisted tickets
    #[must_use]
    pub fn ticket_count(&self) -> usize {
        self.lock().tickets.len()
    }

    /// Number of persisted scan attempts
    #[must_use]
    pub fn scan_count(&self) -> usize {
        self.lock().scans.len()
    }

    /// A persisted ticket by ID
    #[must_use]
    pub fn ticket(&self, ticket_id: &TicketId) -> Option<Ticket> {
        self.lock().tickets.get(ticket_id).cloned()
    }

    /// A persisted transfer by ID
    #[must_use]
    pub fn transfer(&self, transfer_id: &TransferId) -> Option<TransferRequest> {
        self.lock().transfers.get(transfer_id).cloned()
    }

    /// Remaining availability for a persisted ticket type
    #[must_use]
    pub fn available(&self, ticket_type_id: &TicketTypeId) -> Option<u32> {
        self.lock().ticket_types.get(ticket_type_id).map(|t| t.available)
    }
}

#[async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn insert_event(&self, event: &EventInfo) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        Self::check_fail(&mut inner)?;
        inner.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn insert_ticket_type(&self, ticket_type: &TicketType) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        Self::check_fail(&mut inner)?;
        inner.ticket_types.insert(ticket_type.id, ticket_type.clone());
        Ok(())
    }

    async fn insert_order(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        Self::check_fail(&mut inner)?;
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_ticket(&self, ticket: &Ticket) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        Self::check_fail(&mut inner)?;
        inner.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn update_ticket(&self, ticket: &Ticket) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        Self::check_fail(&mut inner)?;
        inner.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn decrement_available(
        &self,
        ticket_type_id: &TicketTypeId,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        Self::check_fail(&mut inner)?;
        let Some(ticket_type) = inner.ticket_types.get_mut(ticket_type_id) else {
            return Err(RepositoryError::Conflict(format!(
                "ticket type {ticket_type_id} not persisted"
            )));
        };
        if ticket_type.available == 0 {
            return Err(RepositoryError::Conflict(format!(
                "ticket type {ticket_type_id} is sold out"
            )));
        }
        ticket_type.available -= 1;
        Ok(())
    }

    async fn insert_scan(&self, scan: &ScanEvent) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        Self::check_fail(&mut inner)?;
        inner.scans.push(scan.clone());
        Ok(())
    }

    async fn insert_transfer(&self, transfer: &TransferRequest) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        Self::check_fail(&mut inner)?;
        inner.transfers.insert(transfer.id, transfer.clone());
        Ok(())
    }

    async fn update_transfer(&self, transfer: &TransferRequest) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        Self::check_fail(&mut inner)?;
        inner.transfers.insert(transfer.id, transfer.clone());
        Ok(())
    }

    async fn resolve_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserId>, RepositoryError> {
        // Reads are immune to the injected failure; only writes consume it
        let inner = self.lock();
        Ok(inner.users_by_email.get(&email.to_ascii_lowercase()).copied())
    }
}
