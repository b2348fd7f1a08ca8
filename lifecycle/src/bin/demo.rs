//! End-to-end walkthrough of the ticket lifecycle.
//!
//! Registers an event, sells a ticket, renders and scans its QR payload,
//! then hands a second ticket to another account through the transfer
//! handshake.

use chrono::{Duration, Utc};
use gatepass_core::environment::{Clock, SystemClock};
use gatepass_lifecycle::store::{InMemoryTicketRepository, TicketRepository};
use gatepass_lifecycle::types::{Money, UserId};
use gatepass_lifecycle::{Config, Identity, QrCodec, SessionIdentity, TicketService};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), gatepass_lifecycle::LifecycleError> {
    let config = Config::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let repo = Arc::new(InMemoryTicketRepository::new());
    let identity = Arc::new(SessionIdentity::new());
    let service = TicketService::new(
        Arc::clone(&repo) as Arc<dyn TicketRepository>,
        Arc::clone(&identity) as Arc<dyn Identity>,
        QrCodec::from_secret(&config.qr.secret),
        Arc::new(SystemClock) as Arc<dyn Clock>,
    );

    // Box office sets up the catalog
    let admin = UserId::new();
    identity.sign_in(admin);
    let event_id = service
        .register_event("Summer Festival", "Riverside Park", Utc::now() + Duration::days(30))
        .await?;
    let tier_id = service
        .register_ticket_type(event_id, "General Admission", Money::from_dollars(45), 100)
        .await?;

    // Alice buys a ticket and shows it at the gate
    let alice = UserId::new();
    identity.sign_in(alice);
    let ticket = service.purchase_ticket(event_id, tier_id).await?;
    tracing::info!(ticket = %ticket.id, "alice bought a ticket");

    let view = service.ticket_view(ticket.id).await?;
    let code = view.qr_payload.unwrap_or_default();
    let scan = service.scan_code(&code, None, Some("Gate A".to_string())).await?;
    tracing::info!(success = scan.success, outcome = %scan.outcome, "first scan");

    // The same screenshot again: recorded, refused
    let replay = service.scan_code(&code, None, Some("Gate A".to_string())).await?;
    tracing::info!(success = replay.success, outcome = %replay.outcome, "replayed scan");

    // Alice buys another and sends it to Bob
    let bob = UserId::new();
    repo.register_user("bob@example.com", bob);

    let second = service.purchase_ticket(event_id, tier_id).await?;
    let transfer = service.initiate_transfer(second.id, "bob@example.com").await?;
    tracing::info!(transfer = %transfer.id, expires = %transfer.expires_at, "transfer opened");

    identity.sign_in(bob);
    let bobs_ticket = service.accept_transfer(transfer.id).await?;
    tracing::info!(ticket = %bobs_ticket.id, "bob accepted the transfer");

    for row in service.my_tickets().await? {
        tracing::info!(ticket = %row.ticket_id, status = %row.status, event = %row.event_name, "bob's wallet");
    }

    Ok(())
}
