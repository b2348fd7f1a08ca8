//! Gatepass ticket lifecycle manager.
//!
//! Owns a ticket from issuance to consumption:
//!
//! - **Issuance**: purchase against tiered, capacity-limited inventory
//! - **QR codec**: signed, 30-second-bucketed payloads that go stale fast
//!   and cannot be forged
//! - **Scan ledger**: every validation attempt recorded append-only, with
//!   one-time entry on the first successful scan
//! - **Transfers**: a 7-day two-party handshake that retires the sender's
//!   ticket and issues a fresh one to the recipient
//! - **Status projection**: the denormalized "my ticket" view with a fresh
//!   QR payload while the ticket is scannable
//!
//! [`service::TicketService`] is the entry point; everything underneath is
//! reducers over plain state, so each transition is unit-testable without a
//! store.

pub mod aggregates;
pub mod config;
pub mod error;
pub mod projections;
pub mod qr;
pub mod service;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{LifecycleError, Result};
pub use qr::{DecodedQr, QrCodec, REFRESH_INTERVAL_SECS};
pub use service::{Identity, SessionIdentity, TicketService};
