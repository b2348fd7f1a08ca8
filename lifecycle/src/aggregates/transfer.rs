//! Transfer handshake aggregate.
//!
//! A transfer is a time-limited two-party handoff:
//! 1. The owner opens a transfer to a recipient email (7-day window starts)
//! 2. The recipient accepts, or the sender cancels, or the window lapses
//! 3. On acceptance the ticket aggregate retires the old ticket and issues
//!    a successor to the recipient
//!
//! Opening a transfer schedules an [`Effect::Delay`] that fires
//! `ExpireTransfer` when the window closes. Acceptance also checks the
//! deadline against the clock, so a transfer past its window is refused
//! even if the scheduled expiry has not run yet.

use crate::error::LifecycleError;
use crate::types::{
    TicketId, TransferId, TransferRequest, TransferState, TransferStatus, UserId,
};
use chrono::{DateTime, Duration, Utc};
use gatepass_core::{
    SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How long a recipient has to accept before the handshake lapses.
pub const TRANSFER_WINDOW_DAYS: i64 = 7;

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for the Transfer aggregate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TransferAction {
    // Commands
    /// Open a transfer handshake for a ticket
    OpenTransfer {
        /// ID for the new transfer request
        transfer_id: TransferId,
        /// Ticket being handed off (already held by the ticket aggregate)
        ticket_id: TicketId,
        /// Current owner
        sender: UserId,
        /// Invitation address
        recipient_email: String,
        /// Recipient account, when the email resolved to one
        recipient: Option<UserId>,
    },

    /// Recipient accepts a pending transfer
    AcceptTransfer {
        /// Transfer being accepted
        transfer_id: TransferId,
        /// Accepting account
        recipient: UserId,
        /// ID for the successor ticket the ticket aggregate will issue
        new_ticket_id: TicketId,
    },

    /// Sender withdraws a pending transfer
    CancelTransfer {
        /// Transfer being cancelled
        transfer_id: TransferId,
        /// Must be the sender
        requested_by: UserId,
    },

    /// Close a transfer whose window lapsed
    ExpireTransfer {
        /// Transfer to expire
        transfer_id: TransferId,
    },

    /// Roll an accepted transfer back to pending because the ticket
    /// handoff could not be recorded
    ReopenTransfer {
        /// Transfer to reopen
        transfer_id: TransferId,
        /// Recipient restriction to restore, as it was before acceptance
        recipient: Option<UserId>,
    },

    // Events
    /// A handshake was opened; the 7-day window is running
    TransferOpened {
        /// The new request
        transfer: TransferRequest,
    },

    /// The recipient accepted within the window
    TransferAccepted {
        /// Accepted transfer
        transfer_id: TransferId,
        /// Ticket that was handed off
        ticket_id: TicketId,
        /// Accepting account
        recipient: UserId,
        /// Successor ticket issued to the recipient
        new_ticket_id: TicketId,
        /// When accepted
        accepted_at: DateTime<Utc>,
    },

    /// The sender withdrew the request; the ticket hold is released
    TransferCancelled {
        /// Cancelled transfer
        transfer_id: TransferId,
        /// Ticket whose hold is released
        ticket_id: TicketId,
        /// When cancelled
        cancelled_at: DateTime<Utc>,
    },

    /// The window lapsed without acceptance; the ticket hold is released
    TransferExpired {
        /// Expired transfer
        transfer_id: TransferId,
        /// Ticket whose hold is released
        ticket_id: TicketId,
        /// When expired
        expired_at: DateTime<Utc>,
    },

    /// An acceptance was rolled back; the handshake is pending again with
    /// its original deadline
    TransferReopened {
        /// Reopened transfer
        transfer_id: TransferId,
        /// Ticket whose pending handshake is restored
        ticket_id: TicketId,
        /// Restored recipient restriction
        recipient: Option<UserId>,
        /// Unchanged acceptance deadline
        expires_at: DateTime<Utc>,
        /// When reopened
        reopened_at: DateTime<Utc>,
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

/// Environment dependencies for the Transfer aggregate
#[derive(Clone)]
pub struct TransferEnvironment {
    /// Clock for window calculation and deadline checks
    pub clock: Arc<dyn Clock>,
}

impl TransferEnvironment {
    /// Creates a new `TransferEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the Transfer aggregate
#[derive(Clone, Debug)]
pub struct TransferReducer;

impl TransferReducer {
    /// Creates a new `TransferReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_open(
        state: &TransferState,
        transfer_id: &TransferId,
        ticket_id: &TicketId,
        sender: &UserId,
        recipient_email: &str,
        recipient: Option<&UserId>,
    ) -> Result<(), LifecycleError> {
        if state.transfers.contains_key(transfer_id) {
            return Err(LifecycleError::Conflict(format!(
                "transfer {transfer_id} already exists"
            )));
        }
        if state.pending_by_ticket.contains_key(ticket_id) {
            return Err(LifecycleError::Conflict(format!(
                "ticket {ticket_id} already has a pending transfer"
            )));
        }
        if !is_plausible_email(recipient_email) {
            return Err(LifecycleError::Validation(format!(
                "'{recipient_email}' is not a valid email address"
            )));
        }
        if recipient == Some(sender) {
            return Err(LifecycleError::Validation(
                "cannot transfer a ticket to yourself".to_string(),
            ));
        }
        Ok(())
    }

    /// Applies an event to state and journals it.
    fn apply_event(state: &mut TransferState, action: &TransferAction) {
        match action {
            TransferAction::TransferOpened { transfer } => {
                state.pending_by_ticket.insert(transfer.ticket_id, transfer.id);
                state.transfers.insert(transfer.id, transfer.clone());
                state.last_error = None;
            }

            TransferAction::TransferAccepted {
                transfer_id,
                ticket_id,
                recipient,
                new_ticket_id,
                ..
            } => {
                if let Some(transfer) = state.transfers.get_mut(transfer_id) {
                    transfer.status = TransferStatus::Accepted;
                    transfer.recipient = Some(*recipient);
                    transfer.issued_ticket = Some(*new_ticket_id);
                }
                state.pending_by_ticket.remove(ticket_id);
                state.last_error = None;
            }

            TransferAction::TransferCancelled {
                transfer_id,
                ticket_id,
                ..
            } => {
                if let Some(transfer) = state.transfers.get_mut(transfer_id) {
                    transfer.status = TransferStatus::Cancelled;
                }
                state.pending_by_ticket.remove(ticket_id);
                state.last_error = None;
            }

            TransferAction::TransferExpired {
                transfer_id,
                ticket_id,
                ..
            } => {
                if let Some(transfer) = state.transfers.get_mut(transfer_id) {
                    transfer.status = TransferStatus::Expired;
                }
                state.pending_by_ticket.remove(ticket_id);
                state.last_error = None;
            }

            TransferAction::TransferReopened {
                transfer_id,
                ticket_id,
                recipient,
                ..
            } => {
                if let Some(transfer) = state.transfers.get_mut(transfer_id) {
                    transfer.status = TransferStatus::Pending;
                    transfer.recipient = *recipient;
                    transfer.issued_ticket = None;
                }
                state.pending_by_ticket.insert(*ticket_id, *transfer_id);
                state.last_error = None;
            }

            TransferAction::CommandRejected { error } => {
                state.last_error = Some(error.clone());
                return;
            }

            // Commands don't modify state
            TransferAction::OpenTransfer { .. }
            | TransferAction::AcceptTransfer { .. }
            | TransferAction::CancelTransfer { .. }
            | TransferAction::ExpireTransfer { .. }
            | TransferAction::ReopenTransfer { .. } => return,
        }
        state.journal.push(action.clone());
    }

    fn reject(
        state: &mut TransferState,
        error: LifecycleError,
    ) -> SmallVec<[Effect<TransferAction>; 4]> {
        Self::apply_event(state, &TransferAction::CommandRejected { error });
        SmallVec::new()
    }
}

impl Default for TransferReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for TransferReducer {
    type State = TransferState;
    type Action = TransferAction;
    type Environment = TransferEnvironment;

    #[allow(clippy::too_many_lines)]
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Open ==========
            TransferAction::OpenTransfer {
                transfer_id,
                ticket_id,
                sender,
                recipient_email,
                recipient,
            } => {
                if let Err(error) = Self::validate_open(
                    state,
                    &transfer_id,
                    &ticket_id,
                    &sender,
                    &recipient_email,
                    recipient.as_ref(),
                ) {
                    return Self::reject(state, error);
                }

                let now = env.clock.now();
                let expires_at = now + Duration::days(TRANSFER_WINDOW_DAYS);
                let transfer = TransferRequest {
                    id: transfer_id,
                    ticket_id,
                    sender,
                    recipient_email,
                    recipient,
                    status: TransferStatus::Pending,
                    created_at: now,
                    expires_at,
                    issued_ticket: None,
                };
                Self::apply_event(state, &TransferAction::TransferOpened { transfer });

                smallvec![Effect::Delay {
                    duration: std::time::Duration::from_secs(
                        60 * 60 * 24 * TRANSFER_WINDOW_DAYS.unsigned_abs(),
                    ),
                    action: Box::new(TransferAction::ExpireTransfer { transfer_id }),
                }]
            }

            // ========== Accept ==========
            TransferAction::AcceptTransfer {
                transfer_id,
                recipient,
                new_ticket_id,
            } => {
                let Some(transfer) = state.transfers.get(&transfer_id) else {
                    return Self::reject(
                        state,
                        LifecycleError::NotFound(format!("transfer {transfer_id}")),
                    );
                };
                if transfer.status != TransferStatus::Pending {
                    return Self::reject(
                        state,
                        LifecycleError::Conflict(format!(
                            "transfer {transfer_id} is no longer pending"
                        )),
                    );
                }

                let now = env.clock.now();
                if transfer.is_expired(now) {
                    // Lapsed but the scheduled expiry has not fired yet:
                    // close it now and refuse the acceptance
                    let expired = TransferAction::TransferExpired {
                        transfer_id,
                        ticket_id: transfer.ticket_id,
                        expired_at: now,
                    };
                    Self::apply_event(state, &expired);
                    state.last_error = Some(LifecycleError::Conflict(format!(
                        "transfer {transfer_id} has expired"
                    )));
                    return SmallVec::new();
                }

                if let Some(addressee) = transfer.recipient {
                    if addressee != recipient {
                        return Self::reject(
                            state,
                            LifecycleError::Conflict(format!(
                                "transfer {transfer_id} was addressed to another account"
                            )),
                        );
                    }
                }
                if transfer.sender == recipient {
                    return Self::reject(
                        state,
                        LifecycleError::Validation(
                            "cannot accept your own transfer".to_string(),
                        ),
                    );
                }

                let ticket_id = transfer.ticket_id;
                Self::apply_event(
                    state,
                    &TransferAction::TransferAccepted {
                        transfer_id,
                        ticket_id,
                        recipient,
                        new_ticket_id,
                        accepted_at: now,
                    },
                );
                SmallVec::new()
            }

            // ========== Cancel ==========
            TransferAction::CancelTransfer {
                transfer_id,
                requested_by,
            } => {
                let Some(transfer) = state.transfers.get(&transfer_id) else {
                    return Self::reject(
                        state,
                        LifecycleError::NotFound(format!("transfer {transfer_id}")),
                    );
                };
                if transfer.status != TransferStatus::Pending {
                    return Self::reject(
                        state,
                        LifecycleError::Conflict(format!(
                            "transfer {transfer_id} is no longer pending"
                        )),
                    );
                }
                if transfer.sender != requested_by {
                    return Self::reject(
                        state,
                        LifecycleError::Conflict(
                            "only the sender can cancel a transfer".to_string(),
                        ),
                    );
                }

                let ticket_id = transfer.ticket_id;
                Self::apply_event(
                    state,
                    &TransferAction::TransferCancelled {
                        transfer_id,
                        ticket_id,
                        cancelled_at: env.clock.now(),
                    },
                );
                SmallVec::new()
            }

            // ========== Expire ==========
            TransferAction::ExpireTransfer { transfer_id } => {
                // The scheduled expiry races acceptance and cancellation;
                // anything no longer pending is left alone
                if let Some(transfer) = state.transfers.get(&transfer_id) {
                    if transfer.status == TransferStatus::Pending {
                        let expired = TransferAction::TransferExpired {
                            transfer_id,
                            ticket_id: transfer.ticket_id,
                            expired_at: env.clock.now(),
                        };
                        Self::apply_event(state, &expired);
                    }
                }
                SmallVec::new()
            }

            // ========== Reopen ==========
            TransferAction::ReopenTransfer {
                transfer_id,
                recipient,
            } => {
                let Some(transfer) = state.transfers.get(&transfer_id) else {
                    return Self::reject(
                        state,
                        LifecycleError::NotFound(format!("transfer {transfer_id}")),
                    );
                };
                if transfer.status != TransferStatus::Accepted {
                    return Self::reject(
                        state,
                        LifecycleError::Conflict(format!(
                            "transfer {transfer_id} is not accepted, nothing to reopen"
                        )),
                    );
                }

                let ticket_id = transfer.ticket_id;
                let expires_at = transfer.expires_at;
                Self::apply_event(
                    state,
                    &TransferAction::TransferReopened {
                        transfer_id,
                        ticket_id,
                        recipient,
                        expires_at,
                        reopened_at: env.clock.now(),
                    },
                );
                SmallVec::new()
            }

            // Events from replay: apply directly
            event @ (TransferAction::TransferOpened { .. }
            | TransferAction::TransferAccepted { .. }
            | TransferAction::TransferCancelled { .. }
            | TransferAction::TransferExpired { .. }
            | TransferAction::TransferReopened { .. }
            | TransferAction::CommandRejected { .. }) => {
                Self::apply_event(state, &event);
                SmallVec::new()
            }
        }
    }
}

/// Syntactic email check: one `@` with a non-empty local part and a domain
/// containing a dot. Deliverability is the notification layer's problem.
fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gatepass_core::environment::FixedClock;
    use gatepass_testing::{
        ReducerTest,
        assertions::{assert_has_delay_effect, assert_no_effects},
    };

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn env_with_clock(clock: Arc<FixedClock>) -> TransferEnvironment {
        TransferEnvironment::new(clock)
    }

    fn open_action(
        transfer_id: TransferId,
        ticket_id: TicketId,
        sender: UserId,
    ) -> TransferAction {
        TransferAction::OpenTransfer {
            transfer_id,
            ticket_id,
            sender,
            recipient_email: "friend@example.com".to_string(),
            recipient: None,
        }
    }

    #[test]
    fn open_starts_window_and_schedules_expiry() {
        let transfer_id = TransferId::new();
        let ticket_id = TicketId::new();
        let sender = UserId::new();

        ReducerTest::new(TransferReducer::new())
            .with_env(env_with_clock(Arc::new(FixedClock::new(start()))))
            .given_state(TransferState::new())
            .when_action(open_action(transfer_id, ticket_id, sender))
            .then_state(move |state| {
                let transfer = state.transfer(&transfer_id).unwrap();
                assert_eq!(transfer.status, TransferStatus::Pending);
                assert_eq!(
                    transfer.expires_at,
                    start() + Duration::days(TRANSFER_WINDOW_DAYS)
                );
                assert!(state.pending_for_ticket(&ticket_id).is_some());
            })
            .then_effects(assert_has_delay_effect)
            .run();
    }

    #[test]
    fn second_open_for_same_ticket_is_rejected() {
        let ticket_id = TicketId::new();
        let sender = UserId::new();
        let clock = Arc::new(FixedClock::new(start()));
        let env = env_with_clock(Arc::clone(&clock));
        let reducer = TransferReducer::new();

        let mut state = TransferState::new();
        reducer.reduce(&mut state, open_action(TransferId::new(), ticket_id, sender), &env);
        reducer.reduce(&mut state, open_action(TransferId::new(), ticket_id, sender), &env);

        assert!(matches!(
            state.last_error,
            Some(LifecycleError::Conflict(_))
        ));
        assert_eq!(state.transfers.len(), 1);
    }

    #[test]
    fn bad_email_is_rejected() {
        for email in ["", "no-at-sign", "@example.com", "a@b", "a b@example.com"] {
            ReducerTest::new(TransferReducer::new())
                .with_env(env_with_clock(Arc::new(FixedClock::new(start()))))
                .given_state(TransferState::new())
                .when_action(TransferAction::OpenTransfer {
                    transfer_id: TransferId::new(),
                    ticket_id: TicketId::new(),
                    sender: UserId::new(),
                    recipient_email: email.to_string(),
                    recipient: None,
                })
                .then_state(|state| {
                    assert!(matches!(
                        state.last_error,
                        Some(LifecycleError::Validation(_))
                    ));
                    assert!(state.transfers.is_empty());
                })
                .run();
        }
    }

    #[test]
    fn accept_within_window_succeeds() {
        let transfer_id = TransferId::new();
        let ticket_id = TicketId::new();
        let new_ticket_id = TicketId::new();
        let sender = UserId::new();
        let recipient = UserId::new();

        let clock = Arc::new(FixedClock::new(start()));
        let env = env_with_clock(Arc::clone(&clock));
        let reducer = TransferReducer::new();

        let mut state = TransferState::new();
        reducer.reduce(&mut state, open_action(transfer_id, ticket_id, sender), &env);

        // Six days later, still inside the window
        clock.advance(Duration::days(6));
        let effects = reducer.reduce(
            &mut state,
            TransferAction::AcceptTransfer {
                transfer_id,
                recipient,
                new_ticket_id,
            },
            &env,
        );

        assert_no_effects(&effects);
        let transfer = state.transfer(&transfer_id).unwrap();
        assert_eq!(transfer.status, TransferStatus::Accepted);
        assert_eq!(transfer.recipient, Some(recipient));
        assert_eq!(transfer.issued_ticket, Some(new_ticket_id));
        assert!(state.pending_for_ticket(&ticket_id).is_none());
    }

    #[test]
    fn accept_after_window_expires_the_transfer() {
        let transfer_id = TransferId::new();
        let ticket_id = TicketId::new();
        let sender = UserId::new();

        let clock = Arc::new(FixedClock::new(start()));
        let env = env_with_clock(Arc::clone(&clock));
        let reducer = TransferReducer::new();

        let mut state = TransferState::new();
        reducer.reduce(&mut state, open_action(transfer_id, ticket_id, sender), &env);

        // Eight days later, past the window
        clock.advance(Duration::days(8));
        reducer.reduce(
            &mut state,
            TransferAction::AcceptTransfer {
                transfer_id,
                recipient: UserId::new(),
                new_ticket_id: TicketId::new(),
            },
            &env,
        );

        assert!(matches!(
            state.last_error,
            Some(LifecycleError::Conflict(_))
        ));
        let transfer = state.transfer(&transfer_id).unwrap();
        assert_eq!(transfer.status, TransferStatus::Expired);
        assert!(state.pending_for_ticket(&ticket_id).is_none());
        // The lazy expiry is journaled so the hold gets released
        assert!(state
            .journal
            .iter()
            .any(|e| matches!(e, TransferAction::TransferExpired { .. })));
    }

    #[test]
    fn accept_at_exact_deadline_is_refused() {
        let transfer_id = TransferId::new();
        let clock = Arc::new(FixedClock::new(start()));
        let env = env_with_clock(Arc::clone(&clock));
        let reducer = TransferReducer::new();

        let mut state = TransferState::new();
        reducer.reduce(
            &mut state,
            open_action(transfer_id, TicketId::new(), UserId::new()),
            &env,
        );

        clock.advance(Duration::days(TRANSFER_WINDOW_DAYS));
        reducer.reduce(
            &mut state,
            TransferAction::AcceptTransfer {
                transfer_id,
                recipient: UserId::new(),
                new_ticket_id: TicketId::new(),
            },
            &env,
        );

        assert_eq!(
            state.transfer(&transfer_id).unwrap().status,
            TransferStatus::Expired
        );
    }

    #[test]
    fn sender_cannot_accept_own_transfer() {
        let transfer_id = TransferId::new();
        let sender = UserId::new();
        let clock = Arc::new(FixedClock::new(start()));
        let env = env_with_clock(Arc::clone(&clock));
        let reducer = TransferReducer::new();

        let mut state = TransferState::new();
        reducer.reduce(&mut state, open_action(transfer_id, TicketId::new(), sender), &env);
        reducer.reduce(
            &mut state,
            TransferAction::AcceptTransfer {
                transfer_id,
                recipient: sender,
                new_ticket_id: TicketId::new(),
            },
            &env,
        );

        assert!(matches!(
            state.last_error,
            Some(LifecycleError::Validation(_))
        ));
        assert_eq!(
            state.transfer(&transfer_id).unwrap().status,
            TransferStatus::Pending
        );
    }

    #[test]
    fn only_sender_can_cancel() {
        let transfer_id = TransferId::new();
        let ticket_id = TicketId::new();
        let sender = UserId::new();
        let clock = Arc::new(FixedClock::new(start()));
        let env = env_with_clock(Arc::clone(&clock));
        let reducer = TransferReducer::new();

        let mut state = TransferState::new();
        reducer.reduce(&mut state, open_action(transfer_id, ticket_id, sender), &env);

        reducer.reduce(
            &mut state,
            TransferAction::CancelTransfer {
                transfer_id,
                requested_by: UserId::new(),
            },
            &env,
        );
        assert!(matches!(
            state.last_error,
            Some(LifecycleError::Conflict(_))
        ));

        reducer.reduce(
            &mut state,
            TransferAction::CancelTransfer {
                transfer_id,
                requested_by: sender,
            },
            &env,
        );
        assert_eq!(
            state.transfer(&transfer_id).unwrap().status,
            TransferStatus::Cancelled
        );
        assert!(state.pending_for_ticket(&ticket_id).is_none());
    }

    #[test]
    fn scheduled_expiry_skips_settled_transfers() {
        let transfer_id = TransferId::new();
        let ticket_id = TicketId::new();
        let sender = UserId::new();
        let clock = Arc::new(FixedClock::new(start()));
        let env = env_with_clock(Arc::clone(&clock));
        let reducer = TransferReducer::new();

        let mut state = TransferState::new();
        reducer.reduce(&mut state, open_action(transfer_id, ticket_id, sender), &env);
        reducer.reduce(
            &mut state,
            TransferAction::AcceptTransfer {
                transfer_id,
                recipient: UserId::new(),
                new_ticket_id: TicketId::new(),
            },
            &env,
        );
        state.take_journal();

        clock.advance(Duration::days(TRANSFER_WINDOW_DAYS));
        reducer.reduce(&mut state, TransferAction::ExpireTransfer { transfer_id }, &env);

        assert_eq!(
            state.transfer(&transfer_id).unwrap().status,
            TransferStatus::Accepted
        );
        assert!(state.journal.is_empty());
    }

    #[test]
    fn reopen_puts_an_accepted_transfer_back_to_pending() {
        let transfer_id = TransferId::new();
        let ticket_id = TicketId::new();
        let sender = UserId::new();
        let clock = Arc::new(FixedClock::new(start()));
        let env = env_with_clock(Arc::clone(&clock));
        let reducer = TransferReducer::new();

        let mut state = TransferState::new();
        reducer.reduce(&mut state, open_action(transfer_id, ticket_id, sender), &env);
        reducer.reduce(
            &mut state,
            TransferAction::AcceptTransfer {
                transfer_id,
                recipient: UserId::new(),
                new_ticket_id: TicketId::new(),
            },
            &env,
        );
        state.take_journal();

        reducer.reduce(
            &mut state,
            TransferAction::ReopenTransfer {
                transfer_id,
                recipient: None,
            },
            &env,
        );

        let transfer = state.transfer(&transfer_id).unwrap();
        assert_eq!(transfer.status, TransferStatus::Pending);
        assert_eq!(transfer.recipient, None);
        assert_eq!(transfer.issued_ticket, None);
        // The deadline is unchanged and the one-pending-per-ticket index is back
        assert_eq!(transfer.expires_at, start() + Duration::days(TRANSFER_WINDOW_DAYS));
        assert!(state.pending_for_ticket(&ticket_id).is_some());
        assert!(state
            .journal
            .iter()
            .any(|e| matches!(e, TransferAction::TransferReopened { .. })));
    }

    #[test]
    fn reopen_of_a_pending_transfer_is_rejected() {
        let transfer_id = TransferId::new();
        let clock = Arc::new(FixedClock::new(start()));
        let env = env_with_clock(Arc::clone(&clock));
        let reducer = TransferReducer::new();

        let mut state = TransferState::new();
        reducer.reduce(
            &mut state,
            open_action(transfer_id, TicketId::new(), UserId::new()),
            &env,
        );
        reducer.reduce(
            &mut state,
            TransferAction::ReopenTransfer {
                transfer_id,
                recipient: None,
            },
            &env,
        );

        assert!(matches!(
            state.last_error,
            Some(LifecycleError::Conflict(_))
        ));
        assert_eq!(
            state.transfer(&transfer_id).unwrap().status,
            TransferStatus::Pending
        );
    }

    #[test]
    fn email_plausibility() {
        assert!(is_plausible_email("a@example.com"));
        assert!(is_plausible_email("first.last+tag@sub.example.co"));
        assert!(!is_plausible_email("a@example."));
        assert!(!is_plausible_email("a@.com"));
    }
}
