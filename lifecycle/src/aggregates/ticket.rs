//! Ticket aggregate: catalog, issuance, scan ledger, status machine.
//!
//! Owns every ticket state transition:
//! 1. Issue a ticket against available inventory (one order, one ticket)
//! 2. Record every scan attempt in the append-only ledger
//! 3. Consume the ticket on its first successful scan (one-time entry)
//! 4. Hold and release tickets around the transfer handshake
//!
//! Applied events are journaled on the state; the service layer drains the
//! journal into the backing store after each command.

use crate::error::LifecycleError;
use crate::types::{
    EventId, EventInfo, Order, OrderId, ScanEvent, Ticket, TicketId, TicketState, TicketStatus,
    TicketType, TicketTypeId, UserId,
};
use chrono::{DateTime, Utc};
use gatepass_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for the Ticket aggregate.
///
/// Commands are requests that may be rejected; events are facts that have
/// been applied to state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TicketAction {
    // Commands
    /// Register an event in the catalog
    RegisterEvent {
        /// Event details
        event: EventInfo,
    },

    /// Register a ticket type (tier) for a catalogued event
    RegisterTicketType {
        /// Ticket type with price and capacity
        ticket_type: TicketType,
    },

    /// Purchase one ticket of a type, creating an order and issuing the ticket
    PurchaseTicket {
        /// ID for the new ticket
        ticket_id: TicketId,
        /// ID for the new order
        order_id: OrderId,
        /// Event being purchased for
        event_id: EventId,
        /// Ticket type being purchased
        ticket_type_id: TicketTypeId,
        /// Buyer
        buyer: UserId,
    },

    /// Record one scan attempt against a ticket
    RecordScan {
        /// Ticket presented at the gate
        ticket_id: TicketId,
        /// Whether the presented QR payload verified and was fresh
        payload_valid: bool,
        /// Staff account performing the scan
        scanned_by: Option<UserId>,
        /// Gate or entrance label
        scan_location: Option<String>,
    },

    /// Lock a ticket while a transfer handshake is pending
    HoldForTransfer {
        /// Ticket to lock
        ticket_id: TicketId,
        /// Must be the current owner
        sender: UserId,
    },

    /// Unlock a held ticket (handshake cancelled or expired)
    ReleaseTransferHold {
        /// Ticket to unlock
        ticket_id: TicketId,
    },

    /// Finish an accepted transfer: retire the held ticket, issue a
    /// successor to the recipient
    CompleteTransfer {
        /// Held ticket being retired
        ticket_id: TicketId,
        /// ID for the successor ticket
        new_ticket_id: TicketId,
        /// New owner
        recipient: UserId,
    },

    // Events
    /// An event was catalogued
    EventRegistered {
        /// Event details
        event: EventInfo,
    },

    /// A ticket type was catalogued
    TicketTypeRegistered {
        /// Ticket type details
        ticket_type: TicketType,
    },

    /// An order was placed
    OrderPlaced {
        /// Order details
        order: Order,
    },

    /// A ticket was issued (decrements availability)
    TicketIssued {
        /// The issued ticket
        ticket: Ticket,
    },

    /// A scan attempt was appended to the ledger
    ScanRecorded {
        /// The recorded attempt
        scan: ScanEvent,
    },

    /// A ticket was consumed by a successful scan
    TicketConsumed {
        /// Consumed ticket
        ticket_id: TicketId,
        /// When consumed
        consumed_at: DateTime<Utc>,
    },

    /// A ticket was locked for a pending transfer
    TicketHeldForTransfer {
        /// Locked ticket
        ticket_id: TicketId,
        /// When locked
        held_at: DateTime<Utc>,
    },

    /// A transfer hold was released, the ticket is scannable again
    TransferHoldReleased {
        /// Unlocked ticket
        ticket_id: TicketId,
        /// When released
        released_at: DateTime<Utc>,
    },

    /// Ownership moved: the old ticket is retired, a successor was issued
    TicketTransferred {
        /// Retired ticket
        ticket_id: TicketId,
        /// Successor issued to the recipient
        new_ticket: Ticket,
        /// When transferred
        transferred_at: DateTime<Utc>,
    },

    /// A command was rejected; state is unchanged
    CommandRejected {
        /// Why the command was rejected
        error: LifecycleError,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the Ticket aggregate
#[derive(Clone)]
pub struct TicketEnvironment {
    /// Clock for issuance, scan, and transition timestamps
    pub clock: Arc<dyn Clock>,
}

impl TicketEnvironment {
    /// Creates a new `TicketEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the Ticket aggregate
#[derive(Clone, Debug)]
pub struct TicketReducer;

impl TicketReducer {
    /// Creates a new `TicketReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_purchase(
        state: &TicketState,
        ticket_id: &TicketId,
        order_id: &OrderId,
        event_id: &EventId,
        ticket_type_id: &TicketTypeId,
    ) -> Result<(), LifecycleError> {
        if state.tickets.contains_key(ticket_id) {
            return Err(LifecycleError::Conflict(format!(
                "ticket {ticket_id} already exists"
            )));
        }
        if state.orders.contains_key(order_id) {
            return Err(LifecycleError::Conflict(format!(
                "order {order_id} already exists"
            )));
        }
        if !state.events.contains_key(event_id) {
            return Err(LifecycleError::NotFound(format!("event {event_id}")));
        }
        let Some(ticket_type) = state.ticket_types.get(ticket_type_id) else {
            return Err(LifecycleError::NotFound(format!(
                "ticket type {ticket_type_id}"
            )));
        };
        if ticket_type.event_id != *event_id {
            return Err(LifecycleError::Validation(format!(
                "ticket type {ticket_type_id} does not belong to event {event_id}"
            )));
        }
        // Check-then-act: a concurrent purchase can still take the last
        // ticket between this check and persistence. The backing store's
        // conditional decrement is the authority of record.
        if !ticket_type.has_availability() {
            return Err(LifecycleError::InventoryExhausted(*ticket_type_id));
        }
        Ok(())
    }

    /// Decides the outcome of a scan attempt against the current ticket
    /// status. Returns `(success, outcome label)`.
    fn scan_outcome(ticket: &Ticket, payload_valid: bool) -> (bool, &'static str) {
        if !payload_valid {
            return (false, "invalid or stale code");
        }
        match ticket.status {
            TicketStatus::Valid => (true, "admitted"),
            TicketStatus::Used => (false, "already used"),
            TicketStatus::Cancelled => (false, "ticket cancelled"),
            TicketStatus::TransferPending => (false, "transfer pending"),
            TicketStatus::Transferred => (false, "ticket transferred"),
        }
    }

    /// Applies an event to state and journals it.
    ///
    /// `CommandRejected` is the exception: it records the error and is not
    /// journaled, since nothing happened.
    #[allow(clippy::too_many_lines)]
    fn apply_event(state: &mut TicketState, action: &TicketAction) {
        match action {
            TicketAction::EventRegistered { event } => {
                state.events.insert(event.id, event.clone());
                state.last_error = None;
            }

            TicketAction::TicketTypeRegistered { ticket_type } => {
                state.ticket_types.insert(ticket_type.id, ticket_type.clone());
                state.last_error = None;
            }

            TicketAction::OrderPlaced { order } => {
                state.orders.insert(order.id, order.clone());
                state.last_error = None;
            }

            TicketAction::TicketIssued { ticket } => {
                if let Some(ticket_type) = state.ticket_types.get_mut(&ticket.ticket_type_id) {
                    ticket_type.available = ticket_type.available.saturating_sub(1);
                }
                state.tickets.insert(ticket.id, ticket.clone());
                state.last_error = None;
            }

            TicketAction::ScanRecorded { scan } => {
                state.scans.entry(scan.ticket_id).or_default().push(scan.clone());
                state.last_error = None;
            }

            TicketAction::TicketConsumed {
                ticket_id,
                consumed_at,
            } => {
                if let Some(ticket) = state.tickets.get_mut(ticket_id) {
                    ticket.status = TicketStatus::Used;
                    ticket.updated_at = *consumed_at;
                }
                state.last_error = None;
            }

            TicketAction::TicketHeldForTransfer { ticket_id, held_at } => {
                if let Some(ticket) = state.tickets.get_mut(ticket_id) {
                    ticket.status = TicketStatus::TransferPending;
                    ticket.updated_at = *held_at;
                }
                state.last_error = None;
            }

            TicketAction::TransferHoldReleased {
                ticket_id,
                released_at,
            } => {
                if let Some(ticket) = state.tickets.get_mut(ticket_id) {
                    ticket.status = TicketStatus::Valid;
                    ticket.updated_at = *released_at;
                }
                state.last_error = None;
            }

            TicketAction::TicketTransferred {
                ticket_id,
                new_ticket,
                transferred_at,
            } => {
                if let Some(ticket) = state.tickets.get_mut(ticket_id) {
                    ticket.status = TicketStatus::Transferred;
                    ticket.updated_at = *transferred_at;
                }
                state.tickets.insert(new_ticket.id, new_ticket.clone());
                state.last_error = None;
            }

            TicketAction::CommandRejected { error } => {
                state.last_error = Some(error.clone());
                return;
            }

            // Commands don't modify state
            TicketAction::RegisterEvent { .. }
            | TicketAction::RegisterTicketType { .. }
            | TicketAction::PurchaseTicket { .. }
            | TicketAction::RecordScan { .. }
            | TicketAction::HoldForTransfer { .. }
            | TicketAction::ReleaseTransferHold { .. }
            | TicketAction::CompleteTransfer { .. } => return,
        }
        state.journal.push(action.clone());
    }

    fn reject(
        state: &mut TicketState,
        error: LifecycleError,
    ) -> SmallVec<[Effect<TicketAction>; 4]> {
        Self::apply_event(state, &TicketAction::CommandRejected { error });
        SmallVec::new()
    }
}

impl Default for TicketReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for TicketReducer {
    type State = TicketState;
    type Action = TicketAction;
    type Environment = TicketEnvironment;

    #[allow(clippy::too_many_lines)]
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Catalog ==========
            TicketAction::RegisterEvent { event } => {
                if state.events.contains_key(&event.id) {
                    return Self::reject(
                        state,
                        LifecycleError::Conflict(format!("event {} already exists", event.id)),
                    );
                }
                Self::apply_event(state, &TicketAction::EventRegistered { event });
                SmallVec::new()
            }

            TicketAction::RegisterTicketType { ticket_type } => {
                if state.ticket_types.contains_key(&ticket_type.id) {
                    return Self::reject(
                        state,
                        LifecycleError::Conflict(format!(
                            "ticket type {} already exists",
                            ticket_type.id
                        )),
                    );
                }
                if !state.events.contains_key(&ticket_type.event_id) {
                    return Self::reject(
                        state,
                        LifecycleError::NotFound(format!("event {}", ticket_type.event_id)),
                    );
                }
                Self::apply_event(state, &TicketAction::TicketTypeRegistered { ticket_type });
                SmallVec::new()
            }

            // ========== Issuance ==========
            TicketAction::PurchaseTicket {
                ticket_id,
                order_id,
                event_id,
                ticket_type_id,
                buyer,
            } => {
                if let Err(error) = Self::validate_purchase(
                    state,
                    &ticket_id,
                    &order_id,
                    &event_id,
                    &ticket_type_id,
                ) {
                    return Self::reject(state, error);
                }

                let now = env.clock.now();
                // Validated above, the type is present
                let price = state
                    .ticket_types
                    .get(&ticket_type_id)
                    .map_or_else(|| crate::types::Money::from_cents(0), |t| t.price);

                let order = Order {
                    id: order_id,
                    user_id: buyer,
                    event_id,
                    ticket_type_id,
                    total: price,
                    placed_at: now,
                };
                Self::apply_event(state, &TicketAction::OrderPlaced { order });

                let ticket =
                    Ticket::issue(ticket_id, event_id, ticket_type_id, order_id, buyer, now);
                Self::apply_event(state, &TicketAction::TicketIssued { ticket });

                SmallVec::new()
            }

            // ========== Scanning ==========
            TicketAction::RecordScan {
                ticket_id,
                payload_valid,
                scanned_by,
                scan_location,
            } => {
                let Some(ticket) = state.tickets.get(&ticket_id) else {
                    return Self::reject(
                        state,
                        LifecycleError::NotFound(format!("ticket {ticket_id}")),
                    );
                };

                let (success, outcome) = Self::scan_outcome(ticket, payload_valid);
                let now = env.clock.now();

                let scan = ScanEvent {
                    ticket_id,
                    timestamp: now,
                    success,
                    outcome: outcome.to_string(),
                    scanned_by,
                    scan_location,
                };
                Self::apply_event(state, &TicketAction::ScanRecorded { scan });

                if success {
                    Self::apply_event(
                        state,
                        &TicketAction::TicketConsumed {
                            ticket_id,
                            consumed_at: now,
                        },
                    );
                }

                SmallVec::new()
            }

            // ========== Transfer coordination ==========
            TicketAction::HoldForTransfer { ticket_id, sender } => {
                let Some(ticket) = state.tickets.get(&ticket_id) else {
                    return Self::reject(
                        state,
                        LifecycleError::NotFound(format!("ticket {ticket_id}")),
                    );
                };
                if ticket.owner != sender {
                    return Self::reject(
                        state,
                        LifecycleError::Conflict(format!(
                            "ticket {ticket_id} is not owned by {sender}"
                        )),
                    );
                }
                if ticket.status != TicketStatus::Valid {
                    return Self::reject(
                        state,
                        LifecycleError::Conflict(format!(
                            "ticket {ticket_id} is {} and cannot be transferred",
                            ticket.status
                        )),
                    );
                }
                Self::apply_event(
                    state,
                    &TicketAction::TicketHeldForTransfer {
                        ticket_id,
                        held_at: env.clock.now(),
                    },
                );
                SmallVec::new()
            }

            TicketAction::ReleaseTransferHold { ticket_id } => {
                let Some(ticket) = state.tickets.get(&ticket_id) else {
                    return Self::reject(
                        state,
                        LifecycleError::NotFound(format!("ticket {ticket_id}")),
                    );
                };
                if ticket.status != TicketStatus::TransferPending {
                    return Self::reject(
                        state,
                        LifecycleError::Conflict(format!(
                            "ticket {ticket_id} is {}, not transfer-pending",
                            ticket.status
                        )),
                    );
                }
                Self::apply_event(
                    state,
                    &TicketAction::TransferHoldReleased {
                        ticket_id,
                        released_at: env.clock.now(),
                    },
                );
                SmallVec::new()
            }

            TicketAction::CompleteTransfer {
                ticket_id,
                new_ticket_id,
                recipient,
            } => {
                let Some(ticket) = state.tickets.get(&ticket_id) else {
                    return Self::reject(
                        state,
                        LifecycleError::NotFound(format!("ticket {ticket_id}")),
                    );
                };
                if ticket.status != TicketStatus::TransferPending {
                    return Self::reject(
                        state,
                        LifecycleError::Conflict(format!(
                            "ticket {ticket_id} is {}, not transfer-pending",
                            ticket.status
                        )),
                    );
                }
                if state.tickets.contains_key(&new_ticket_id) {
                    return Self::reject(
                        state,
                        LifecycleError::Conflict(format!(
                            "ticket {new_ticket_id} already exists"
                        )),
                    );
                }

                let now = env.clock.now();
                let new_ticket = Ticket::issue(
                    new_ticket_id,
                    ticket.event_id,
                    ticket.ticket_type_id,
                    ticket.order_id,
                    recipient,
                    now,
                );
                Self::apply_event(
                    state,
                    &TicketAction::TicketTransferred {
                        ticket_id,
                        new_ticket,
                        transferred_at: now,
                    },
                );
                SmallVec::new()
            }

            // Events from replay: apply directly
            event @ (TicketAction::EventRegistered { .. }
            | TicketAction::TicketTypeRegistered { .. }
            | TicketAction::OrderPlaced { .. }
            | TicketAction::TicketIssued { .. }
            | TicketAction::ScanRecorded { .. }
            | TicketAction::TicketConsumed { .. }
            | TicketAction::TicketHeldForTransfer { .. }
            | TicketAction::TransferHoldReleased { .. }
            | TicketAction::TicketTransferred { .. }
            | TicketAction::CommandRejected { .. }) => {
                Self::apply_event(state, &event);
                SmallVec::new()
            }
        }
    }
}
