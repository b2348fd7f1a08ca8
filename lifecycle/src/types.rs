//! Domain types for the ticket lifecycle manager.
//!
//! Value objects, entities, and aggregate state types. Tickets move through a
//! monotonic status machine; scan events form an append-only ledger; transfer
//! requests are a pending, expiring, two-party handshake.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::error::LifecycleError;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an event (concert, game, conference)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random `EventId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EventId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a ticket type (tier/section within an event)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketTypeId(Uuid);

impl TicketTypeId {
    /// Creates a new random `TicketTypeId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TicketTypeId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TicketTypeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a purchase order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Creates a new random `OrderId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user account
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a ticket.
///
/// Generated at issuance from a v4 UUID, so ids are unguessable and unique
/// across the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random `TicketId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TicketId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a transfer request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(Uuid);

impl TransferId {
    /// Creates a new random `TransferId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents to avoid floating-point arithmetic errors
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from dollars with overflow checking
    #[must_use]
    pub const fn checked_from_dollars(dollars: u64) -> Option<Self> {
        match dollars.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Creates a `Money` value from dollars, saturating at the maximum
    /// representable amount. Use `checked_from_dollars` to detect overflow.
    #[must_use]
    pub const fn from_dollars(dollars: u64) -> Self {
        Self(dollars.saturating_mul(100))
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Returns the amount in dollars (rounded down)
    #[must_use]
    pub const fn dollars(&self) -> u64 {
        self.0 / 100
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.dollars(), self.0 % 100)
    }
}

// ============================================================================
// Domain Entities
// ============================================================================

/// Event catalog entry, read-only from the lifecycle core's perspective.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    /// Unique event identifier
    pub id: EventId,
    /// Event name (e.g., "Summer Festival")
    pub name: String,
    /// Venue name
    pub venue: String,
    /// When the event starts
    pub starts_at: DateTime<Utc>,
}

impl EventInfo {
    /// Creates a new `EventInfo`
    #[must_use]
    pub const fn new(id: EventId, name: String, venue: String, starts_at: DateTime<Utc>) -> Self {
        Self { id, name, venue, starts_at }
    }
}

/// Ticket type (tier) within an event, carrying price and inventory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketType {
    /// Unique ticket type identifier
    pub id: TicketTypeId,
    /// Event this type belongs to
    pub event_id: EventId,
    /// Tier name (e.g., "General Admission", "VIP")
    pub name: String,
    /// Price per ticket
    pub price: Money,
    /// Total capacity for this tier
    pub capacity: u32,
    /// Remaining tickets available for sale
    pub available: u32,
}

impl TicketType {
    /// Creates a new `TicketType` with full availability
    #[must_use]
    pub const fn new(
        id: TicketTypeId,
        event_id: EventId,
        name: String,
        price: Money,
        capacity: u32,
    ) -> Self {
        Self {
            id,
            event_id,
            name,
            price,
            capacity,
            available: capacity,
        }
    }

    /// Checks whether at least one ticket remains
    #[must_use]
    pub const fn has_availability(&self) -> bool {
        self.available > 0
    }
}

/// Purchase order created alongside a ticket at issuance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier
    pub id: OrderId,
    /// Buyer
    pub user_id: UserId,
    /// Event purchased for
    pub event_id: EventId,
    /// Ticket type purchased
    pub ticket_type_id: TicketTypeId,
    /// Total charged
    pub total: Money,
    /// When the order was placed
    pub placed_at: DateTime<Utc>,
}

/// Ticket lifecycle status.
///
/// Transitions are monotonic along the state machine:
///
/// ```text
/// Valid ──(successful scan)──> Used
/// Valid ──(initiate transfer)──> TransferPending
/// TransferPending ──(accept)──> Transferred   (successor ticket issued Valid)
/// TransferPending ──(expire | cancel)──> Valid
/// Valid ──(external cancellation)──> Cancelled
/// ```
///
/// Only `Valid` tickets can be consumed by a scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    /// Admission right is live and scannable
    Valid,
    /// Consumed by a successful entry scan (one-time entry)
    Used,
    /// Cancelled (refund/account deletion, driven externally)
    Cancelled,
    /// Locked while a transfer handshake is pending
    TransferPending,
    /// Reassigned to a new owner; terminal for this record
    Transferred,
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Valid => "VALID",
            Self::Used => "USED",
            Self::Cancelled => "CANCELLED",
            Self::TransferPending => "TRANSFER_PENDING",
            Self::Transferred => "TRANSFERRED",
        };
        write!(f, "{label}")
    }
}

/// A single admission right tied to one event, one ticket type, one owner.
///
/// The QR payload is deliberately absent here: it is derived, not stored,
/// and is recomputed from the current time on every read (see the status
/// projection).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique ticket identifier
    pub id: TicketId,
    /// Event this ticket admits to
    pub event_id: EventId,
    /// Ticket type purchased
    pub ticket_type_id: TicketTypeId,
    /// Order that created this ticket
    pub order_id: OrderId,
    /// Current owner
    pub owner: UserId,
    /// Current lifecycle status
    pub status: TicketStatus,
    /// When the ticket was purchased
    pub purchased_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Creates a freshly issued `Valid` ticket
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub const fn issue(
        id: TicketId,
        event_id: EventId,
        ticket_type_id: TicketTypeId,
        order_id: OrderId,
        owner: UserId,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            event_id,
            ticket_type_id,
            order_id,
            owner,
            status: TicketStatus::Valid,
            purchased_at: issued_at,
            updated_at: issued_at,
        }
    }
}

/// One recorded attempt to validate a ticket at an entry point.
///
/// Immutable once created; the scan ledger is append-only and never edited
/// or deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    /// Ticket the attempt was made against
    pub ticket_id: TicketId,
    /// When the attempt was recorded (assigned at creation)
    pub timestamp: DateTime<Utc>,
    /// Whether the gate admitted the holder
    pub success: bool,
    /// Human-readable outcome label (e.g., "admitted", "already used")
    pub outcome: String,
    /// Staff account that performed the scan, if known
    pub scanned_by: Option<UserId>,
    /// Gate or entrance label, if known
    pub scan_location: Option<String>,
}

/// Status of a transfer request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Waiting for the recipient to accept
    Pending,
    /// Recipient accepted; ownership reassigned
    Accepted,
    /// Seven-day window elapsed without acceptance
    Expired,
    /// Sender withdrew the request
    Cancelled,
}

/// A sender-initiated, recipient-accepted, time-limited ownership handoff.
///
/// At most one `Pending` request exists per ticket at any time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Unique transfer identifier
    pub id: TransferId,
    /// Ticket being handed off
    pub ticket_id: TicketId,
    /// Current owner initiating the handoff
    pub sender: UserId,
    /// Where the invitation was sent
    pub recipient_email: String,
    /// Resolved recipient account, if the email matched one at initiation
    /// or when the recipient accepted
    pub recipient: Option<UserId>,
    /// Handshake status
    pub status: TransferStatus,
    /// When the request was created
    pub created_at: DateTime<Utc>,
    /// When the request lapses (`created_at` + 7 days)
    pub expires_at: DateTime<Utc>,
    /// Successor ticket issued to the recipient on acceptance
    pub issued_ticket: Option<TicketId>,
}

impl TransferRequest {
    /// Checks whether the request has lapsed at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// ============================================================================
// Aggregate States
// ============================================================================

/// State for the ticket aggregate: catalog, orders, tickets, and scan ledger.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TicketState {
    /// Known events indexed by ID
    pub events: HashMap<EventId, EventInfo>,
    /// Known ticket types indexed by ID
    pub ticket_types: HashMap<TicketTypeId, TicketType>,
    /// Orders indexed by ID
    pub orders: HashMap<OrderId, Order>,
    /// Tickets indexed by ID
    pub tickets: HashMap<TicketId, Ticket>,
    /// Append-only scan ledger, in arrival order per ticket
    pub scans: HashMap<TicketId, Vec<ScanEvent>>,
    /// Events applied since the journal was last drained
    pub journal: Vec<crate::aggregates::ticket::TicketAction>,
    /// Last command rejection
    pub last_error: Option<LifecycleError>,
}

impl TicketState {
    /// Creates a new empty `TicketState`
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: HashMap::new(),
            ticket_types: HashMap::new(),
            orders: HashMap::new(),
            tickets: HashMap::new(),
            scans: HashMap::new(),
            journal: Vec::new(),
            last_error: None,
        }
    }

    /// Gets a ticket by ID
    #[must_use]
    pub fn ticket(&self, id: &TicketId) -> Option<&Ticket> {
        self.tickets.get(id)
    }

    /// Scan ledger for a ticket, oldest-first (arrival order)
    #[must_use]
    pub fn scan_ledger(&self, id: &TicketId) -> &[ScanEvent] {
        self.scans.get(id).map_or(&[], Vec::as_slice)
    }

    /// Number of recorded scan attempts for a ticket
    #[must_use]
    pub fn scan_count(&self, id: &TicketId) -> usize {
        self.scans.get(id).map_or(0, Vec::len)
    }

    /// Drain events applied since the last drain
    pub fn take_journal(&mut self) -> Vec<crate::aggregates::ticket::TicketAction> {
        std::mem::take(&mut self.journal)
    }

    /// Take the last command rejection, clearing it
    pub fn take_error(&mut self) -> Option<LifecycleError> {
        self.last_error.take()
    }
}

impl Default for TicketState {
    fn default() -> Self {
        Self::new()
    }
}

/// State for the transfer handshake aggregate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferState {
    /// All transfer requests indexed by ID
    pub transfers: HashMap<TransferId, TransferRequest>,
    /// Pending request per ticket (enforces at most one active handshake)
    pub pending_by_ticket: HashMap<TicketId, TransferId>,
    /// Events applied since the journal was last drained
    pub journal: Vec<crate::aggregates::transfer::TransferAction>,
    /// Last command rejection
    pub last_error: Option<LifecycleError>,
}

impl TransferState {
    /// Creates a new empty `TransferState`
    #[must_use]
    pub fn new() -> Self {
        Self {
            transfers: HashMap::new(),
            pending_by_ticket: HashMap::new(),
            journal: Vec::new(),
            last_error: None,
        }
    }

    /// Gets a transfer request by ID
    #[must_use]
    pub fn transfer(&self, id: &TransferId) -> Option<&TransferRequest> {
        self.transfers.get(id)
    }

    /// The pending request for a ticket, if one exists
    #[must_use]
    pub fn pending_for_ticket(&self, ticket_id: &TicketId) -> Option<&TransferRequest> {
        self.pending_by_ticket
            .get(ticket_id)
            .and_then(|id| self.transfers.get(id))
    }

    /// Drain events applied since the last drain
    pub fn take_journal(&mut self) -> Vec<crate::aggregates::transfer::TransferAction> {
        std::mem::take(&mut self.journal)
    }

    /// Take the last command rejection, clearing it
    pub fn take_error(&mut self) -> Option<LifecycleError> {
        self.last_error.take()
    }
}

impl Default for TransferState {
    fn default() -> Self {
        Self::new()
    }
}
