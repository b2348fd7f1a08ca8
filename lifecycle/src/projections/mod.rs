//! Read model projections for the ticket lifecycle manager.
//!
//! Projections consume the unified event stream produced by the aggregates
//! and maintain denormalized views optimized for queries. They are derived
//! state: any projection can be rebuilt from scratch by replaying the event
//! history through `handle_event`.

pub mod ticket_status;

pub use ticket_status::{TicketStatusProjection, TicketStatusRow, TicketView};

use crate::aggregates::{TicketAction, TransferAction};
use serde::{Deserialize, Serialize};

/// Unified event type across both lifecycle aggregates.
///
/// Projections consume this stream; the service layer wraps each drained
/// journal entry before forwarding it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// Event from the Ticket aggregate
    Ticket(TicketAction),
    /// Event from the Transfer aggregate
    Transfer(TransferAction),
}

/// Trait for projections that consume events to build read models.
pub trait Projection: Send + Sync {
    /// Handle a lifecycle event and update the projection's view.
    ///
    /// Called for each event in stream order. Irrelevant events are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the projection cannot apply the event, for
    /// example when a referenced catalog entry was never seen.
    fn handle_event(&mut self, event: &LifecycleEvent) -> Result<(), String>;

    /// Get the projection's name (for logging/debugging).
    fn name(&self) -> &'static str;

    /// Reset the projection to initial state, for rebuilds.
    fn reset(&mut self);
}
