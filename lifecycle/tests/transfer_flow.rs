//! Transfer handshake journeys through the public service API.

#![allow(clippy::unwrap_used)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use gatepass_core::environment::{Clock, FixedClock};
use gatepass_lifecycle::store::{InMemoryTicketRepository, TicketRepository};
use gatepass_lifecycle::types::{
    EventId, Money, TicketId, TicketStatus, TicketTypeId, TransferStatus, UserId,
};
use gatepass_lifecycle::{
    Identity, LifecycleError, QrCodec, SessionIdentity, TicketService,
};
use std::sync::Arc;

struct World {
    service: TicketService,
    repo: Arc<InMemoryTicketRepository>,
    identity: Arc<SessionIdentity>,
    clock: Arc<FixedClock>,
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap()
}

fn world() -> World {
    let repo = Arc::new(InMemoryTicketRepository::new());
    let identity = Arc::new(SessionIdentity::new());
    let clock = Arc::new(FixedClock::new(start()));
    let service = TicketService::new(
        Arc::clone(&repo) as Arc<dyn TicketRepository>,
        Arc::clone(&identity) as Arc<dyn Identity>,
        QrCodec::from_secret("integration-secret"),
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    World {
        service,
        repo,
        identity,
        clock,
    }
}

async fn ticket_for(world: &World, owner: UserId) -> TicketId {
    world.identity.sign_in(UserId::new());
    let event_id: EventId = world
        .service
        .register_event("Harbour Lights", "Pier 9", start() + Duration::days(60))
        .await
        .unwrap();
    let tier_id: TicketTypeId = world
        .service
        .register_ticket_type(event_id, "Standing", Money::from_dollars(35), 10)
        .await
        .unwrap();
    world.identity.sign_in(owner);
    world
        .service
        .purchase_ticket(event_id, tier_id)
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn accepted_transfer_moves_ownership_to_a_fresh_ticket() {
    let world = world();
    let alice = UserId::new();
    let bob = UserId::new();
    world.repo.register_user("bob@example.com", bob);

    let ticket_id = ticket_for(&world, alice).await;
    let transfer = world
        .service
        .initiate_transfer(ticket_id, "bob@example.com")
        .await
        .unwrap();
    assert_eq!(transfer.status, TransferStatus::Pending);
    assert_eq!(transfer.expires_at, start() + Duration::days(7));

    // While held, the ticket refuses scans and renders without a payload
    let held = world.service.ticket_view(ticket_id).await.unwrap();
    assert_eq!(held.row.status, TicketStatus::TransferPending);
    assert!(held.qr_payload.is_none());

    world.clock.advance(Duration::days(2));
    world.identity.sign_in(bob);
    let new_ticket = world.service.accept_transfer(transfer.id).await.unwrap();

    assert_ne!(new_ticket.id, ticket_id);
    assert_eq!(new_ticket.owner, bob);
    assert_eq!(new_ticket.status, TicketStatus::Valid);

    let settled = world.service.transfer(transfer.id).await.unwrap();
    assert_eq!(settled.status, TransferStatus::Accepted);
    assert_eq!(settled.recipient, Some(bob));
    assert_eq!(settled.issued_ticket, Some(new_ticket.id));

    // The retired ticket can never be scanned again
    assert_eq!(
        world.repo.ticket(&ticket_id).unwrap().status,
        TicketStatus::Transferred
    );

    // Bob's view of his new ticket carries a working payload
    let view = world.service.ticket_view(new_ticket.id).await.unwrap();
    let scan = world
        .service
        .scan_code(&view.qr_payload.unwrap(), None, None)
        .await
        .unwrap();
    assert!(scan.success);
}

#[tokio::test]
async fn cancelled_transfer_restores_the_ticket() {
    let world = world();
    let alice = UserId::new();
    let ticket_id = ticket_for(&world, alice).await;

    let transfer = world
        .service
        .initiate_transfer(ticket_id, "someone@example.com")
        .await
        .unwrap();

    // Only the sender may cancel
    world.identity.sign_in(UserId::new());
    let refused = world.service.cancel_transfer(transfer.id).await;
    assert!(matches!(refused, Err(LifecycleError::Conflict(_))));

    world.identity.sign_in(alice);
    world.service.cancel_transfer(transfer.id).await.unwrap();

    assert_eq!(
        world.service.transfer(transfer.id).await.unwrap().status,
        TransferStatus::Cancelled
    );
    let view = world.service.ticket_view(ticket_id).await.unwrap();
    assert_eq!(view.row.status, TicketStatus::Valid);
    assert!(view.qr_payload.is_some());

    // And the ticket can be offered again
    let again = world
        .service
        .initiate_transfer(ticket_id, "other@example.com")
        .await
        .unwrap();
    assert_eq!(again.status, TransferStatus::Pending);
}

#[tokio::test]
async fn only_one_pending_transfer_per_ticket() {
    let world = world();
    let alice = UserId::new();
    let ticket_id = ticket_for(&world, alice).await;

    world
        .service
        .initiate_transfer(ticket_id, "one@example.com")
        .await
        .unwrap();
    // The ticket is already held, so a second offer hits the status check
    let second = world
        .service
        .initiate_transfer(ticket_id, "two@example.com")
        .await;
    assert!(matches!(second, Err(LifecycleError::Conflict(_))));
}

#[tokio::test]
async fn expiry_sweep_returns_the_ticket_after_seven_days() {
    let world = world();
    let alice = UserId::new();
    let ticket_id = ticket_for(&world, alice).await;

    let transfer = world
        .service
        .initiate_transfer(ticket_id, "slowpoke@example.com")
        .await
        .unwrap();

    // Six days in: nothing to expire
    world.clock.advance(Duration::days(6));
    assert_eq!(world.service.expire_due_transfers().await.unwrap(), 0);

    // Day eight: the handshake lapses and the ticket comes back
    world.clock.advance(Duration::days(2));
    assert_eq!(world.service.expire_due_transfers().await.unwrap(), 1);

    assert_eq!(
        world.service.transfer(transfer.id).await.unwrap().status,
        TransferStatus::Expired
    );
    let view = world.service.ticket_view(ticket_id).await.unwrap();
    assert_eq!(view.row.status, TicketStatus::Valid);

    // A late acceptance by anyone is refused
    world.identity.sign_in(UserId::new());
    let late = world.service.accept_transfer(transfer.id).await;
    assert!(matches!(late, Err(LifecycleError::Conflict(_))));
}

#[tokio::test]
async fn used_ticket_cannot_be_offered() {
    let world = world();
    let alice = UserId::new();
    let ticket_id = ticket_for(&world, alice).await;

    let code = world
        .service
        .ticket_view(ticket_id)
        .await
        .unwrap()
        .qr_payload
        .unwrap();
    world.service.scan_code(&code, None, None).await.unwrap();

    let result = world
        .service
        .initiate_transfer(ticket_id, "friend@example.com")
        .await;
    assert!(matches!(result, Err(LifecycleError::Conflict(_))));
}

#[tokio::test]
async fn addressed_transfer_rejects_other_accounts() {
    let world = world();
    let alice = UserId::new();
    let bob = UserId::new();
    world.repo.register_user("bob@example.com", bob);

    let ticket_id = ticket_for(&world, alice).await;
    let transfer = world
        .service
        .initiate_transfer(ticket_id, "bob@example.com")
        .await
        .unwrap();

    // A third account that got hold of the link cannot take the ticket
    world.identity.sign_in(UserId::new());
    let stolen = world.service.accept_transfer(transfer.id).await;
    assert!(matches!(stolen, Err(LifecycleError::Conflict(_))));

    world.identity.sign_in(bob);
    let accepted = world.service.accept_transfer(transfer.id).await.unwrap();
    assert_eq!(accepted.owner, bob);
}

#[tokio::test]
async fn backend_failure_during_open_leaves_no_half_transfer() {
    let world = world();
    let alice = UserId::new();
    let ticket_id = ticket_for(&world, alice).await;

    // The first write of the flow, the ticket hold, fails and rolls back
    world.repo.fail_next_operation();
    let result = world
        .service
        .initiate_transfer(ticket_id, "friend@example.com")
        .await;

    assert!(matches!(result, Err(LifecycleError::Backend(_))));
    let view = world.service.ticket_view(ticket_id).await.unwrap();
    assert_eq!(view.row.status, TicketStatus::Valid);

    // And a retry works
    let retry = world
        .service
        .initiate_transfer(ticket_id, "friend@example.com")
        .await
        .unwrap();
    assert_eq!(retry.status, TransferStatus::Pending);
}
