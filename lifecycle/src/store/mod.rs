//! Persistence boundary for the ticket lifecycle manager.
//!
//! The service layer mirrors every applied event into a [`TicketRepository`]
//! before acknowledging the command. The trait is async and object-safe so
//! production code can back it with a database while tests use the
//! in-memory implementation.

pub mod memory;

pub use memory::InMemoryTicketRepository;

use crate::types::{
    EventInfo, Order, ScanEvent, Ticket, TicketType, TicketTypeId, TransferRequest, UserId,
};
use async_trait::async_trait;
use thiserror::Error;

/// Failures from the backing store.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// The store could not be reached or the write failed
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A conditional write lost, e.g. the last ticket of a type was sold
    /// concurrently
    #[error("storage conflict: {0}")]
    Conflict(String),
}

/// Persistence operations the service layer depends on.
///
/// Writes are one row per applied event; the store is the authority of
/// record for inventory, where the in-memory availability check is only a
/// fast pre-check.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Persist a catalogued event
    async fn insert_event(&self, event: &EventInfo) -> Result<(), RepositoryError>;

    /// Persist a catalogued ticket type
    async fn insert_ticket_type(&self, ticket_type: &TicketType) -> Result<(), RepositoryError>;

    /// Persist a placed order
    async fn insert_order(&self, order: &Order) -> Result<(), RepositoryError>;

    /// Persist a newly issued ticket
    async fn insert_ticket(&self, ticket: &Ticket) -> Result<(), RepositoryError>;

    /// Persist a ticket status change
    async fn update_ticket(&self, ticket: &Ticket) -> Result<(), RepositoryError>;

    /// Conditionally decrement remaining availability for a ticket type.
    ///
    /// Fails with [`RepositoryError::Conflict`] when nothing remains, which
    /// is how a concurrent purchase of the last ticket loses.
    async fn decrement_available(
        &self,
        ticket_type_id: &TicketTypeId,
    ) -> Result<(), RepositoryError>;

    /// Append one scan attempt to the ledger
    async fn insert_scan(&self, scan: &ScanEvent) -> Result<(), RepositoryError>;

    /// Persist a newly opened transfer request
    async fn insert_transfer(&self, transfer: &TransferRequest) -> Result<(), RepositoryError>;

    /// Persist a transfer status change
    async fn update_transfer(&self, transfer: &TransferRequest) -> Result<(), RepositoryError>;

    /// Look up the account registered under an email address, if any
    async fn resolve_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserId>, RepositoryError>;
}
