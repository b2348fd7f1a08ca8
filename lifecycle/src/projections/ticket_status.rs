//! Ticket status projection: the "my ticket" screen and the gate view.
//!
//! Maintains one denormalized row per ticket (status, owner, event and tier
//! details, pending transfer) plus the scan history, answering:
//! - "Show me my ticket" with a fresh QR payload when it is scannable
//! - "Show this ticket's scan history" newest-first
//! - "List every ticket this user holds"
//!
//! QR payloads are never stored. They are derived from the signing key and
//! the current time at read time, so a rendered view always carries a
//! payload for the current 30-second bucket.

use super::{LifecycleEvent, Projection};
use crate::aggregates::{TicketAction, TransferAction};
use crate::qr::QrCodec;
use crate::types::{
    EventId, Money, ScanEvent, TicketId, TicketStatus, TicketTypeId, TransferId, UserId,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Denormalized per-ticket row.
#[derive(Clone, Debug)]
pub struct TicketStatusRow {
    /// Ticket ID
    pub ticket_id: TicketId,
    /// Current owner
    pub owner: UserId,
    /// Current lifecycle status
    pub status: TicketStatus,
    /// Event ID
    pub event_id: EventId,
    /// Event name
    pub event_name: String,
    /// Venue name
    pub venue: String,
    /// Event start time
    pub starts_at: DateTime<Utc>,
    /// Ticket type ID
    pub ticket_type_id: TicketTypeId,
    /// Tier name
    pub tier_name: String,
    /// Price paid tier
    pub price: Money,
    /// When purchased (or issued via transfer)
    pub purchased_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
    /// Pending transfer on this ticket, if any
    pub pending_transfer: Option<TransferId>,
    /// When the pending transfer lapses
    pub transfer_expires_at: Option<DateTime<Utc>>,
}

/// A rendered ticket view for display.
#[derive(Clone, Debug)]
pub struct TicketView {
    /// The denormalized row
    pub row: TicketStatusRow,
    /// Fresh QR payload; present only while the ticket is scannable
    pub qr_payload: Option<String>,
    /// Scan history, newest-first
    pub scan_history: Vec<ScanEvent>,
}

#[derive(Clone, Debug)]
struct EventDetails {
    name: String,
    venue: String,
    starts_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
struct TierDetails {
    name: String,
    price: Money,
}

/// Projection maintaining ticket status rows and scan history.
#[derive(Default)]
pub struct TicketStatusProjection {
    rows: HashMap<TicketId, TicketStatusRow>,
    scans: HashMap<TicketId, Vec<ScanEvent>>,
    by_owner: HashMap<UserId, Vec<TicketId>>,
    events: HashMap<EventId, EventDetails>,
    tiers: HashMap<TicketTypeId, TierDetails>,
    transfer_tickets: HashMap<TransferId, TicketId>,
}

impl TicketStatusProjection {
    /// Creates a new empty `TicketStatusProjection`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The row for a ticket, if the projection has seen it
    #[must_use]
    pub fn status(&self, ticket_id: &TicketId) -> Option<&TicketStatusRow> {
        self.rows.get(ticket_id)
    }

    /// Renders the display view for a ticket.
    ///
    /// The QR payload is attached only while the ticket is `Valid`; a used,
    /// held, transferred, or cancelled ticket renders without one.
    #[must_use]
    pub fn view(
        &self,
        ticket_id: &TicketId,
        codec: &QrCodec,
        now: DateTime<Utc>,
    ) -> Option<TicketView> {
        let row = self.rows.get(ticket_id)?;

        let qr_payload = if row.status == TicketStatus::Valid {
            Some(codec.encode(row.ticket_id, now))
        } else {
            None
        };

        Some(TicketView {
            row: row.clone(),
            qr_payload,
            scan_history: self.scan_history(ticket_id),
        })
    }

    /// Scan history for a ticket, newest-first.
    ///
    /// Ordered by each event's creation timestamp, not arrival order, since
    /// slow writes can land out of order.
    #[must_use]
    pub fn scan_history(&self, ticket_id: &TicketId) -> Vec<ScanEvent> {
        let mut history = self.scans.get(ticket_id).cloned().unwrap_or_default();
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        history
    }

    /// Every ticket a user currently or previously held, newest-first
    #[must_use]
    pub fn tickets_owned_by(&self, owner: &UserId) -> Vec<&TicketStatusRow> {
        let mut rows: Vec<&TicketStatusRow> = self
            .by_owner
            .get(owner)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter_map(|id| self.rows.get(id))
            .collect();
        rows.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at));
        rows
    }

    /// Number of tickets the projection tracks
    #[must_use]
    pub fn ticket_count(&self) -> usize {
        self.rows.len()
    }

    fn insert_row(&mut self, ticket: &crate::types::Ticket) -> Result<(), String> {
        let event = self
            .events
            .get(&ticket.event_id)
            .ok_or_else(|| format!("unknown event {} for ticket {}", ticket.event_id, ticket.id))?;
        let tier = self.tiers.get(&ticket.ticket_type_id).ok_or_else(|| {
            format!(
                "unknown ticket type {} for ticket {}",
                ticket.ticket_type_id, ticket.id
            )
        })?;

        let row = TicketStatusRow {
            ticket_id: ticket.id,
            owner: ticket.owner,
            status: ticket.status,
            event_id: ticket.event_id,
            event_name: event.name.clone(),
            venue: event.venue.clone(),
            starts_at: event.starts_at,
            ticket_type_id: ticket.ticket_type_id,
            tier_name: tier.name.clone(),
            price: tier.price,
            purchased_at: ticket.purchased_at,
            updated_at: ticket.updated_at,
            pending_transfer: None,
            transfer_expires_at: None,
        };
        self.by_owner.entry(ticket.owner).or_default().push(ticket.id);
        self.rows.insert(ticket.id, row);
        Ok(())
    }

    fn set_status(&mut self, ticket_id: &TicketId, status: TicketStatus, at: DateTime<Utc>) {
        if let Some(row) = self.rows.get_mut(ticket_id) {
            row.status = status;
            row.updated_at = at;
        }
    }

    fn clear_pending(&mut self, transfer_id: &TransferId) {
        if let Some(ticket_id) = self.transfer_tickets.get(transfer_id) {
            if let Some(row) = self.rows.get_mut(ticket_id) {
                row.pending_transfer = None;
                row.transfer_expires_at = None;
            }
        }
    }

    fn handle_ticket_event(&mut self, action: &TicketAction) -> Result<(), String> {
        match action {
            TicketAction::EventRegistered { event } => {
                self.events.insert(
                    event.id,
                    EventDetails {
                        name: event.name.clone(),
                        venue: event.venue.clone(),
                        starts_at: event.starts_at,
                    },
                );
            }

            TicketAction::TicketTypeRegistered { ticket_type } => {
                self.tiers.insert(
                    ticket_type.id,
                    TierDetails {
                        name: ticket_type.name.clone(),
                        price: ticket_type.price,
                    },
                );
            }

            TicketAction::TicketIssued { ticket } => {
                self.insert_row(ticket)?;
            }

            TicketAction::ScanRecorded { scan } => {
                self.scans.entry(scan.ticket_id).or_default().push(scan.clone());
            }

            TicketAction::TicketConsumed {
                ticket_id,
                consumed_at,
            } => {
                self.set_status(ticket_id, TicketStatus::Used, *consumed_at);
            }

            TicketAction::TicketHeldForTransfer { ticket_id, held_at } => {
                self.set_status(ticket_id, TicketStatus::TransferPending, *held_at);
            }

            TicketAction::TransferHoldReleased {
                ticket_id,
                released_at,
            } => {
                self.set_status(ticket_id, TicketStatus::Valid, *released_at);
            }

            TicketAction::TicketTransferred {
                ticket_id,
                new_ticket,
                transferred_at,
            } => {
                self.set_status(ticket_id, TicketStatus::Transferred, *transferred_at);
                self.insert_row(new_ticket)?;
            }

            // Orders and rejections carry nothing this view needs
            _ => {}
        }
        Ok(())
    }

    fn handle_transfer_event(&mut self, action: &TransferAction) {
        match action {
            TransferAction::TransferOpened { transfer } => {
                self.transfer_tickets.insert(transfer.id, transfer.ticket_id);
                if let Some(row) = self.rows.get_mut(&transfer.ticket_id) {
                    row.pending_transfer = Some(transfer.id);
                    row.transfer_expires_at = Some(transfer.expires_at);
                }
            }

            TransferAction::TransferAccepted { transfer_id, .. }
            | TransferAction::TransferCancelled { transfer_id, .. }
            | TransferAction::TransferExpired { transfer_id, .. } => {
                self.clear_pending(transfer_id);
            }

            TransferAction::TransferReopened {
                transfer_id,
                ticket_id,
                expires_at,
                ..
            } => {
                self.transfer_tickets.insert(*transfer_id, *ticket_id);
                if let Some(row) = self.rows.get_mut(ticket_id) {
                    row.pending_transfer = Some(*transfer_id);
                    row.transfer_expires_at = Some(*expires_at);
                }
            }

            _ => {}
        }
    }
}

impl Projection for TicketStatusProjection {
    fn handle_event(&mut self, event: &LifecycleEvent) -> Result<(), String> {
        match event {
            LifecycleEvent::Ticket(action) => self.handle_ticket_event(action),
            LifecycleEvent::Transfer(action) => {
                self.handle_transfer_event(action);
                Ok(())
            }
        }
    }

    fn name(&self) -> &'static str {
        "ticket_status"
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{EventInfo, Ticket, TicketType, TransferRequest, TransferStatus};
    use chrono::{Duration, TimeZone};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn seeded(
        event_id: EventId,
        ticket_type_id: TicketTypeId,
    ) -> TicketStatusProjection {
        let mut projection = TicketStatusProjection::new();
        projection
            .handle_event(&LifecycleEvent::Ticket(TicketAction::EventRegistered {
                event: EventInfo::new(
                    event_id,
                    "Summer Festival".to_string(),
                    "Riverside Park".to_string(),
                    at() + Duration::days(30),
                ),
            }))
            .unwrap();
        projection
            .handle_event(&LifecycleEvent::Ticket(TicketAction::TicketTypeRegistered {
                ticket_type: TicketType::new(
                    ticket_type_id,
                    event_id,
                    "VIP".to_string(),
                    Money::from_dollars(120),
                    50,
                ),
            }))
            .unwrap();
        projection
    }

    fn issue(
        projection: &mut TicketStatusProjection,
        event_id: EventId,
        ticket_type_id: TicketTypeId,
        ticket_id: TicketId,
        owner: UserId,
    ) {
        projection
            .handle_event(&LifecycleEvent::Ticket(TicketAction::TicketIssued {
                ticket: Ticket::issue(
                    ticket_id,
                    event_id,
                    ticket_type_id,
                    crate::types::OrderId::new(),
                    owner,
                    at(),
                ),
            }))
            .unwrap();
    }

    #[test]
    fn issued_ticket_gets_denormalized_row() {
        let event_id = EventId::new();
        let ticket_type_id = TicketTypeId::new();
        let ticket_id = TicketId::new();
        let owner = UserId::new();

        let mut projection = seeded(event_id, ticket_type_id);
        issue(&mut projection, event_id, ticket_type_id, ticket_id, owner);

        let row = projection.status(&ticket_id).unwrap();
        assert_eq!(row.event_name, "Summer Festival");
        assert_eq!(row.tier_name, "VIP");
        assert_eq!(row.status, TicketStatus::Valid);
        assert_eq!(projection.tickets_owned_by(&owner).len(), 1);
    }

    #[test]
    fn issuance_before_catalog_is_an_error() {
        let mut projection = TicketStatusProjection::new();
        let result = projection.handle_event(&LifecycleEvent::Ticket(TicketAction::TicketIssued {
            ticket: Ticket::issue(
                TicketId::new(),
                EventId::new(),
                TicketTypeId::new(),
                crate::types::OrderId::new(),
                UserId::new(),
                at(),
            ),
        }));
        assert!(result.is_err());
    }

    #[test]
    fn valid_ticket_view_carries_fresh_qr_payload() {
        let event_id = EventId::new();
        let ticket_type_id = TicketTypeId::new();
        let ticket_id = TicketId::new();

        let mut projection = seeded(event_id, ticket_type_id);
        issue(&mut projection, event_id, ticket_type_id, ticket_id, UserId::new());

        let codec = QrCodec::with_random_key();
        let view = projection.view(&ticket_id, &codec, at()).unwrap();
        let payload = view.qr_payload.unwrap();

        let decoded = codec.decode(&payload, at());
        assert!(decoded.valid);
        assert_eq!(decoded.ticket_id, Some(ticket_id));
    }

    #[test]
    fn consumed_ticket_view_has_no_payload() {
        let event_id = EventId::new();
        let ticket_type_id = TicketTypeId::new();
        let ticket_id = TicketId::new();

        let mut projection = seeded(event_id, ticket_type_id);
        issue(&mut projection, event_id, ticket_type_id, ticket_id, UserId::new());
        projection
            .handle_event(&LifecycleEvent::Ticket(TicketAction::TicketConsumed {
                ticket_id,
                consumed_at: at(),
            }))
            .unwrap();

        let codec = QrCodec::with_random_key();
        let view = projection.view(&ticket_id, &codec, at()).unwrap();
        assert!(view.qr_payload.is_none());
        assert_eq!(view.row.status, TicketStatus::Used);
    }

    #[test]
    fn scan_history_is_newest_first() {
        let event_id = EventId::new();
        let ticket_type_id = TicketTypeId::new();
        let ticket_id = TicketId::new();

        let mut projection = seeded(event_id, ticket_type_id);
        issue(&mut projection, event_id, ticket_type_id, ticket_id, UserId::new());

        for (offset, success) in [(0, true), (60, false)] {
            projection
                .handle_event(&LifecycleEvent::Ticket(TicketAction::ScanRecorded {
                    scan: ScanEvent {
                        ticket_id,
                        timestamp: at() + Duration::seconds(offset),
                        success,
                        outcome: if success { "admitted" } else { "already used" }.to_string(),
                        scanned_by: None,
                        scan_location: None,
                    },
                }))
                .unwrap();
        }

        let history = projection.scan_history(&ticket_id);
        assert_eq!(history.len(), 2);
        assert!(!history[0].success);
        assert!(history[1].success);
        assert!(history[0].timestamp > history[1].timestamp);
    }

    #[test]
    fn pending_transfer_shows_on_row_and_clears() {
        let event_id = EventId::new();
        let ticket_type_id = TicketTypeId::new();
        let ticket_id = TicketId::new();
        let transfer_id = TransferId::new();
        let sender = UserId::new();

        let mut projection = seeded(event_id, ticket_type_id);
        issue(&mut projection, event_id, ticket_type_id, ticket_id, sender);

        projection
            .handle_event(&LifecycleEvent::Transfer(TransferAction::TransferOpened {
                transfer: TransferRequest {
                    id: transfer_id,
                    ticket_id,
                    sender,
                    recipient_email: "friend@example.com".to_string(),
                    recipient: None,
                    status: TransferStatus::Pending,
                    created_at: at(),
                    expires_at: at() + Duration::days(7),
                    issued_ticket: None,
                },
            }))
            .unwrap();

        let row = projection.status(&ticket_id).unwrap();
        assert_eq!(row.pending_transfer, Some(transfer_id));

        projection
            .handle_event(&LifecycleEvent::Transfer(TransferAction::TransferCancelled {
                transfer_id,
                ticket_id,
                cancelled_at: at() + Duration::days(1),
            }))
            .unwrap();

        assert!(projection.status(&ticket_id).unwrap().pending_transfer.is_none());
    }

    #[test]
    fn transferred_ticket_moves_between_owner_listings() {
        let event_id = EventId::new();
        let ticket_type_id = TicketTypeId::new();
        let ticket_id = TicketId::new();
        let new_ticket_id = TicketId::new();
        let sender = UserId::new();
        let recipient = UserId::new();

        let mut projection = seeded(event_id, ticket_type_id);
        issue(&mut projection, event_id, ticket_type_id, ticket_id, sender);

        projection
            .handle_event(&LifecycleEvent::Ticket(TicketAction::TicketTransferred {
                ticket_id,
                new_ticket: Ticket::issue(
                    new_ticket_id,
                    event_id,
                    ticket_type_id,
                    crate::types::OrderId::new(),
                    recipient,
                    at() + Duration::days(2),
                ),
                transferred_at: at() + Duration::days(2),
            }))
            .unwrap();

        assert_eq!(
            projection.status(&ticket_id).unwrap().status,
            TicketStatus::Transferred
        );
        let recipient_rows = projection.tickets_owned_by(&recipient);
        assert_eq!(recipient_rows.len(), 1);
        assert_eq!(recipient_rows[0].ticket_id, new_ticket_id);
        assert_eq!(recipient_rows[0].status, TicketStatus::Valid);
    }

    #[test]
    fn reset_clears_everything() {
        let event_id = EventId::new();
        let ticket_type_id = TicketTypeId::new();
        let mut projection = seeded(event_id, ticket_type_id);
        issue(
            &mut projection,
            event_id,
            ticket_type_id,
            TicketId::new(),
            UserId::new(),
        );

        assert_eq!(projection.ticket_count(), 1);
        projection.reset();
        assert_eq!(projection.ticket_count(), 0);
        assert_eq!(projection.name(), "ticket_status");
    }
}
