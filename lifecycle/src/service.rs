//! Service facade over the lifecycle aggregates.
//!
//! [`TicketService`] is the single entry point callers use. Each operation:
//! 1. Resolves the authenticated user from the [`Identity`]
//! 2. Dispatches a command to the owning reducer
//! 3. Mirrors the applied events into the [`TicketRepository`]
//! 4. Feeds the same events to the status projection
//!
//! Writes are optimistic: the reducer applies first, and if the backing
//! store then refuses, the in-memory state is restored from a snapshot and
//! the caller gets a backend error. The projection only sees events that
//! persisted.
//!
//! Cross-aggregate flows are sequenced here. A transfer holds the ticket,
//! then opens the handshake; acceptance settles the handshake, then retires
//! the ticket and issues its successor.

use crate::aggregates::{
    TicketAction, TicketEnvironment, TicketReducer, TransferAction, TransferEnvironment,
    TransferReducer,
};
use crate::error::{LifecycleError, Result};
use crate::projections::{
    LifecycleEvent, Projection, TicketStatusProjection, TicketStatusRow, TicketView,
};
use crate::qr::QrCodec;
use crate::store::{RepositoryError, TicketRepository};
use crate::types::{
    EventId, EventInfo, Money, OrderId, ScanEvent, Ticket, TicketId, TicketState, TicketType,
    TicketTypeId, TransferId, TransferRequest, TransferState, TransferStatus, UserId,
};
use chrono::{DateTime, Utc};
use gatepass_core::{environment::Clock, reducer::Reducer};
use std::sync::{Arc, Mutex, PoisonError};

// ============================================================================
// Identity
// ============================================================================

/// Source of the currently authenticated user.
///
/// Mutating operations refuse to run without one; how sessions are
/// established is the caller's concern.
pub trait Identity: Send + Sync {
    /// The signed-in user, if any
    fn current_user(&self) -> Option<UserId>;
}

/// Mutable single-session [`Identity`] for demos and tests.
#[derive(Default)]
pub struct SessionIdentity {
    user: Mutex<Option<UserId>>,
}

impl SessionIdentity {
    /// Creates a signed-out session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signs a user in, replacing any previous session
    pub fn sign_in(&self, user_id: UserId) {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = Some(user_id);
    }

    /// Signs the current user out
    pub fn sign_out(&self) {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Identity for SessionIdentity {
    fn current_user(&self) -> Option<UserId> {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Service
// ============================================================================

struct CoreState {
    tickets: TicketState,
    transfers: TransferState,
    projection: TicketStatusProjection,
}

/// Facade over the ticket and transfer aggregates.
pub struct TicketService {
    state: tokio::sync::Mutex<CoreState>,
    ticket_reducer: TicketReducer,
    transfer_reducer: TransferReducer,
    ticket_env: TicketEnvironment,
    transfer_env: TransferEnvironment,
    repo: Arc<dyn TicketRepository>,
    identity: Arc<dyn Identity>,
    codec: QrCodec,
    clock: Arc<dyn Clock>,
}

impl TicketService {
    /// Creates a new service over the given dependencies.
    #[must_use]
    pub fn new(
        repo: Arc<dyn TicketRepository>,
        identity: Arc<dyn Identity>,
        codec: QrCodec,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: tokio::sync::Mutex::new(CoreState {
                tickets: TicketState::new(),
                transfers: TransferState::new(),
                projection: TicketStatusProjection::new(),
            }),
            ticket_reducer: TicketReducer::new(),
            transfer_reducer: TransferReducer::new(),
            ticket_env: TicketEnvironment::new(Arc::clone(&clock)),
            transfer_env: TransferEnvironment::new(Arc::clone(&clock)),
            repo,
            identity,
            codec,
            clock,
        }
    }

    fn current_user(&self) -> Result<UserId> {
        self.identity
            .current_user()
            .ok_or(LifecycleError::Unauthenticated)
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    /// Registers an event in the catalog.
    ///
    /// # Errors
    ///
    /// Fails when unauthenticated or when the write is refused.
    pub async fn register_event(
        &self,
        name: &str,
        venue: &str,
        starts_at: DateTime<Utc>,
    ) -> Result<EventId> {
        self.current_user()?;
        if name.trim().is_empty() {
            return Err(LifecycleError::Validation("event name is empty".to_string()));
        }

        let event = EventInfo::new(
            EventId::new(),
            name.to_string(),
            venue.to_string(),
            starts_at,
        );
        let event_id = event.id;

        let mut state = self.state.lock().await;
        self.dispatch_ticket(&mut state, TicketAction::RegisterEvent { event })
            .await?;

        tracing::info!(%event_id, name, "event registered");
        Ok(event_id)
    }

    /// Registers a ticket type (tier) for a catalogued event.
    ///
    /// # Errors
    ///
    /// Fails when unauthenticated, the event is unknown, or the write is
    /// refused.
    pub async fn register_ticket_type(
        &self,
        event_id: EventId,
        name: &str,
        price: Money,
        capacity: u32,
    ) -> Result<TicketTypeId> {
        self.current_user()?;
        if capacity == 0 {
            return Err(LifecycleError::Validation(
                "capacity must be greater than zero".to_string(),
            ));
        }

        let ticket_type =
            TicketType::new(TicketTypeId::new(), event_id, name.to_string(), price, capacity);
        let ticket_type_id = ticket_type.id;

        let mut state = self.state.lock().await;
        self.dispatch_ticket(&mut state, TicketAction::RegisterTicketType { ticket_type })
            .await?;

        tracing::info!(%ticket_type_id, %event_id, capacity, "ticket type registered");
        Ok(ticket_type_id)
    }

    // ========================================================================
    // Issuance
    // ========================================================================

    /// Purchases one ticket of a type for the signed-in user.
    ///
    /// # Errors
    ///
    /// Fails when unauthenticated, the catalog entries are unknown, the
    /// type is sold out, or the write is refused.
    pub async fn purchase_ticket(
        &self,
        event_id: EventId,
        ticket_type_id: TicketTypeId,
    ) -> Result<Ticket> {
        let buyer = self.current_user()?;
        let ticket_id = TicketId::new();

        let mut state = self.state.lock().await;
        self.dispatch_ticket(
            &mut state,
            TicketAction::PurchaseTicket {
                ticket_id,
                order_id: OrderId::new(),
                event_id,
                ticket_type_id,
                buyer,
            },
        )
        .await?;

        let ticket = state
            .tickets
            .ticket(&ticket_id)
            .cloned()
            .ok_or_else(|| LifecycleError::NotFound(format!("ticket {ticket_id}")))?;

        tracing::info!(%ticket_id, %buyer, %ticket_type_id, "ticket issued");
        Ok(ticket)
    }

    // ========================================================================
    // Scanning
    // ========================================================================

    /// Validates a scanned QR payload and records the attempt.
    ///
    /// Every readable attempt lands in the ledger, successful or not, and
    /// the first successful scan consumes the ticket. Returns the recorded
    /// attempt so the gate can show the outcome.
    ///
    /// # Errors
    ///
    /// Fails when no session is signed in (the gate device authenticates
    /// like any other caller), with a validation error when the payload is
    /// unreadable or forged (there is no ticket to record against),
    /// not-found when the named ticket is unknown, or a backend error when
    /// the write is refused.
    pub async fn scan_code(
        &self,
        code: &str,
        scanned_by: Option<UserId>,
        scan_location: Option<String>,
    ) -> Result<ScanEvent> {
        self.current_user()?;
        let decoded = self.codec.decode(code, self.clock.now());
        let Some(ticket_id) = decoded.ticket_id else {
            tracing::warn!("unreadable or forged scan payload");
            return Err(LifecycleError::Validation(
                "unreadable or forged code".to_string(),
            ));
        };

        let mut state = self.state.lock().await;
        self.dispatch_ticket(
            &mut state,
            TicketAction::RecordScan {
                ticket_id,
                payload_valid: decoded.valid,
                scanned_by,
                scan_location,
            },
        )
        .await?;

        let scan = state
            .tickets
            .scan_ledger(&ticket_id)
            .last()
            .cloned()
            .ok_or_else(|| LifecycleError::NotFound(format!("ticket {ticket_id}")))?;

        tracing::info!(%ticket_id, success = scan.success, outcome = %scan.outcome, "scan recorded");
        Ok(scan)
    }

    /// Scan history for a ticket, newest-first.
    ///
    /// # Errors
    ///
    /// Fails when unauthenticated or the ticket is unknown.
    pub async fn scan_history(&self, ticket_id: TicketId) -> Result<Vec<ScanEvent>> {
        self.current_user()?;
        let state = self.state.lock().await;
        if state.projection.status(&ticket_id).is_none() {
            return Err(LifecycleError::NotFound(format!("ticket {ticket_id}")));
        }
        Ok(state.projection.scan_history(&ticket_id))
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    /// Opens a transfer of a ticket to a recipient email.
    ///
    /// Holds the ticket first, then opens the 7-day handshake. The email is
    /// resolved to an account when one exists; resolution failures degrade
    /// to an unaddressed invitation rather than failing the transfer.
    ///
    /// # Errors
    ///
    /// Fails when unauthenticated, the caller does not own the ticket, the
    /// ticket is not scannable, the email is malformed, a handshake is
    /// already pending, or the write is refused.
    pub async fn initiate_transfer(
        &self,
        ticket_id: TicketId,
        recipient_email: &str,
    ) -> Result<TransferRequest> {
        let sender = self.current_user()?;

        let recipient = match self.repo.resolve_user_by_email(recipient_email).await {
            Ok(found) => found,
            Err(error) => {
                tracing::warn!(%error, "recipient lookup failed, sending unaddressed invitation");
                None
            }
        };

        let mut state = self.state.lock().await;
        self.dispatch_ticket(&mut state, TicketAction::HoldForTransfer { ticket_id, sender })
            .await?;

        let transfer_id = TransferId::new();
        let opened = self
            .dispatch_transfer(
                &mut state,
                TransferAction::OpenTransfer {
                    transfer_id,
                    ticket_id,
                    sender,
                    recipient_email: recipient_email.to_string(),
                    recipient,
                },
            )
            .await;

        if let Err(error) = opened {
            // Compensate: the hold was taken but the handshake never opened
            if let Err(release_error) = self
                .dispatch_ticket(&mut state, TicketAction::ReleaseTransferHold { ticket_id })
                .await
            {
                tracing::error!(%ticket_id, %release_error, "failed to release hold after rejected transfer");
            }
            return Err(error);
        }

        let transfer = state
            .transfers
            .transfer(&transfer_id)
            .cloned()
            .ok_or_else(|| LifecycleError::NotFound(format!("transfer {transfer_id}")))?;

        tracing::info!(%transfer_id, %ticket_id, recipient_email, "transfer opened");
        Ok(transfer)
    }

    /// Accepts a pending transfer as the signed-in user.
    ///
    /// Settles the handshake, retires the sender's ticket, and issues a
    /// fresh ticket to the recipient. Returns the new ticket.
    ///
    /// # Errors
    ///
    /// Fails when unauthenticated, the transfer is unknown or no longer
    /// pending, the window has lapsed, the transfer was addressed to a
    /// different account, or the write is refused.
    pub async fn accept_transfer(&self, transfer_id: TransferId) -> Result<Ticket> {
        let recipient = self.current_user()?;
        let new_ticket_id = TicketId::new();

        let mut state = self.state.lock().await;
        let prior_recipient = state
            .transfers
            .transfer(&transfer_id)
            .and_then(|t| t.recipient);
        let events = self
            .dispatch_transfer(
                &mut state,
                TransferAction::AcceptTransfer {
                    transfer_id,
                    recipient,
                    new_ticket_id,
                },
            )
            .await?;

        let accepted = events
            .iter()
            .find_map(|event| match event {
                TransferAction::TransferAccepted { ticket_id, .. } => Some(*ticket_id),
                _ => None,
            })
            .ok_or_else(|| {
                LifecycleError::Conflict(format!("transfer {transfer_id} was not accepted"))
            })?;

        if let Err(error) = self
            .dispatch_ticket(
                &mut state,
                TicketAction::CompleteTransfer {
                    ticket_id: accepted,
                    new_ticket_id,
                    recipient,
                },
            )
            .await
        {
            // Compensate: the acceptance persisted but the handoff did not,
            // so put the handshake back to pending for a retry
            if let Err(reopen_error) = self
                .dispatch_transfer(
                    &mut state,
                    TransferAction::ReopenTransfer {
                        transfer_id,
                        recipient: prior_recipient,
                    },
                )
                .await
            {
                tracing::error!(%transfer_id, %reopen_error, "failed to reopen transfer after incomplete handoff");
            }
            return Err(error);
        }

        let ticket = state
            .tickets
            .ticket(&new_ticket_id)
            .cloned()
            .ok_or_else(|| LifecycleError::NotFound(format!("ticket {new_ticket_id}")))?;

        tracing::info!(%transfer_id, old_ticket = %accepted, new_ticket = %new_ticket_id, "transfer accepted");
        Ok(ticket)
    }

    /// Cancels a pending transfer. Only the sender may cancel; the ticket
    /// becomes scannable again.
    ///
    /// # Errors
    ///
    /// Fails when unauthenticated, the transfer is unknown or settled, the
    /// caller is not the sender, or the write is refused.
    pub async fn cancel_transfer(&self, transfer_id: TransferId) -> Result<()> {
        let requested_by = self.current_user()?;

        let mut state = self.state.lock().await;
        self.dispatch_transfer(
            &mut state,
            TransferAction::CancelTransfer {
                transfer_id,
                requested_by,
            },
        )
        .await?;

        tracing::info!(%transfer_id, "transfer cancelled");
        Ok(())
    }

    /// Expires every pending transfer whose window has lapsed, releasing
    /// the held tickets. Returns how many lapsed.
    ///
    /// Ran periodically; acceptance also checks the deadline itself, so a
    /// late sweep never admits a lapsed handshake.
    ///
    /// # Errors
    ///
    /// Fails when a write is refused mid-sweep.
    pub async fn expire_due_transfers(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let due: Vec<TransferId> = state
            .transfers
            .transfers
            .values()
            .filter(|t| t.status == TransferStatus::Pending && t.is_expired(now))
            .map(|t| t.id)
            .collect();

        for transfer_id in &due {
            self.dispatch_transfer(
                &mut state,
                TransferAction::ExpireTransfer {
                    transfer_id: *transfer_id,
                },
            )
            .await?;
            tracing::info!(%transfer_id, "transfer expired");
        }

        Ok(due.len())
    }

    /// A transfer request by ID.
    ///
    /// # Errors
    ///
    /// Fails when unauthenticated or the transfer is unknown.
    pub async fn transfer(&self, transfer_id: TransferId) -> Result<TransferRequest> {
        self.current_user()?;
        let state = self.state.lock().await;
        state
            .transfers
            .transfer(&transfer_id)
            .cloned()
            .ok_or_else(|| LifecycleError::NotFound(format!("transfer {transfer_id}")))
    }

    // ========================================================================
    // Read side
    // ========================================================================

    /// Renders the signed-in owner's view of a ticket, with a fresh QR
    /// payload while the ticket is scannable.
    ///
    /// # Errors
    ///
    /// Fails when unauthenticated, the ticket is unknown, or the caller is
    /// not the owner.
    pub async fn ticket_view(&self, ticket_id: TicketId) -> Result<TicketView> {
        let user = self.current_user()?;
        let state = self.state.lock().await;

        let view = state
            .projection
            .view(&ticket_id, &self.codec, self.clock.now())
            .ok_or_else(|| LifecycleError::NotFound(format!("ticket {ticket_id}")))?;

        if view.row.owner != user {
            return Err(LifecycleError::Conflict(format!(
                "ticket {ticket_id} is not owned by {user}"
            )));
        }
        Ok(view)
    }

    /// Every ticket the signed-in user holds or has held, newest-first.
    ///
    /// # Errors
    ///
    /// Fails when unauthenticated.
    pub async fn my_tickets(&self) -> Result<Vec<TicketStatusRow>> {
        let user = self.current_user()?;
        let state = self.state.lock().await;
        Ok(state
            .projection
            .tickets_owned_by(&user)
            .into_iter()
            .cloned()
            .collect())
    }

    // ========================================================================
    // Dispatch plumbing
    // ========================================================================

    async fn dispatch_ticket(
        &self,
        state: &mut CoreState,
        action: TicketAction,
    ) -> Result<Vec<TicketAction>> {
        let snapshot = state.tickets.clone();
        let _effects =
            self.ticket_reducer
                .reduce(&mut state.tickets, action, &self.ticket_env);

        let error = state.tickets.take_error();
        let events = state.tickets.take_journal();

        if let Err(persist_error) = self.persist_ticket_events(state, &events).await {
            state.tickets = snapshot;
            tracing::error!(%persist_error, "write refused, state restored");
            return Err(persist_error);
        }

        for event in &events {
            if let Err(projection_error) = state
                .projection
                .handle_event(&LifecycleEvent::Ticket(event.clone()))
            {
                tracing::error!(%projection_error, "ticket status projection rejected event");
            }
        }

        match error {
            Some(error) => Err(error),
            None => Ok(events),
        }
    }

    async fn dispatch_transfer(
        &self,
        state: &mut CoreState,
        action: TransferAction,
    ) -> Result<Vec<TransferAction>> {
        let snapshot = state.transfers.clone();
        let effects =
            self.transfer_reducer
                .reduce(&mut state.transfers, action, &self.transfer_env);

        // A scheduled expiry would run on a timer runtime; the periodic
        // sweep and the deadline check on acceptance cover it here
        for effect in &effects {
            if matches!(effect, gatepass_core::effect::Effect::Delay { .. }) {
                tracing::debug!("transfer expiry scheduled");
            }
        }

        let error = state.transfers.take_error();
        let events = state.transfers.take_journal();

        if let Err(persist_error) = self.persist_transfer_events(state, &events).await {
            state.transfers = snapshot;
            tracing::error!(%persist_error, "write refused, state restored");
            return Err(persist_error);
        }

        for event in &events {
            if let Err(projection_error) = state
                .projection
                .handle_event(&LifecycleEvent::Transfer(event.clone()))
            {
                tracing::error!(%projection_error, "ticket status projection rejected event");
            }
        }

        // A settled handshake that did not move the ticket releases its
        // hold; a failed release surfaces instead of stranding the ticket
        for event in &events {
            let released = match event {
                TransferAction::TransferCancelled { ticket_id, .. }
                | TransferAction::TransferExpired { ticket_id, .. } => Some(*ticket_id),
                _ => None,
            };
            if let Some(ticket_id) = released {
                self.dispatch_ticket(state, TicketAction::ReleaseTransferHold { ticket_id })
                    .await?;
            }
        }

        match error {
            Some(error) => Err(error),
            None => Ok(events),
        }
    }

    async fn persist_ticket_events(
        &self,
        state: &CoreState,
        events: &[TicketAction],
    ) -> Result<()> {
        for event in events {
            match event {
                TicketAction::EventRegistered { event } => {
                    self.repo
                        .insert_event(event)
                        .await
                        .map_err(backend_error)?;
                }
                TicketAction::TicketTypeRegistered { ticket_type } => {
                    self.repo
                        .insert_ticket_type(ticket_type)
                        .await
                        .map_err(backend_error)?;
                }
                TicketAction::OrderPlaced { order } => {
                    self.repo.insert_order(order).await.map_err(backend_error)?;
                }
                TicketAction::TicketIssued { ticket } => {
                    // The store's conditional decrement is the inventory
                    // authority; losing it surfaces as sold-out
                    self.repo
                        .decrement_available(&ticket.ticket_type_id)
                        .await
                        .map_err(|error| match error {
                            RepositoryError::Conflict(_) => {
                                LifecycleError::InventoryExhausted(ticket.ticket_type_id)
                            }
                            other => backend_error(other),
                        })?;
                    self.repo
                        .insert_ticket(ticket)
                        .await
                        .map_err(backend_error)?;
                }
                TicketAction::ScanRecorded { scan } => {
                    self.repo.insert_scan(scan).await.map_err(backend_error)?;
                }
                TicketAction::TicketConsumed { ticket_id, .. }
                | TicketAction::TicketHeldForTransfer { ticket_id, .. }
                | TicketAction::TransferHoldReleased { ticket_id, .. } => {
                    if let Some(ticket) = state.tickets.ticket(ticket_id) {
                        self.repo
                            .update_ticket(ticket)
                            .await
                            .map_err(backend_error)?;
                    }
                }
                TicketAction::TicketTransferred {
                    ticket_id,
                    new_ticket,
                    ..
                } => {
                    if let Some(ticket) = state.tickets.ticket(ticket_id) {
                        self.repo
                            .update_ticket(ticket)
                            .await
                            .map_err(backend_error)?;
                    }
                    self.repo
                        .insert_ticket(new_ticket)
                        .await
                        .map_err(backend_error)?;
                }
                // Commands and rejections are never journaled
                _ => {}
            }
        }
        Ok(())
    }

    async fn persist_transfer_events(
        &self,
        state: &CoreState,
        events: &[TransferAction],
    ) -> Result<()> {
        for event in events {
            match event {
                TransferAction::TransferOpened { transfer } => {
                    self.repo
                        .insert_transfer(transfer)
                        .await
                        .map_err(backend_error)?;
                }
                TransferAction::TransferAccepted { transfer_id, .. }
                | TransferAction::TransferCancelled { transfer_id, .. }
                | TransferAction::TransferExpired { transfer_id, .. }
                | TransferAction::TransferReopened { transfer_id, .. } => {
                    if let Some(transfer) = state.transfers.transfer(transfer_id) {
                        self.repo
                            .update_transfer(transfer)
                            .await
                            .map_err(backend_error)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn backend_error(error: RepositoryError) -> LifecycleError {
    LifecycleError::Backend(error.to_string())
}
