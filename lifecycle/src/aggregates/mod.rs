//! Aggregates for the ticket lifecycle manager.
//!
//! Two reducers own all state transitions:
//!
//! - [`ticket::TicketReducer`]: catalog, issuance, the scan ledger, and the
//!   ticket status machine
//! - [`transfer::TransferReducer`]: the pending, expiring, two-party
//!   transfer handshake
//!
//! The service layer sequences commands across the two (a transfer holds the
//! ticket first, then opens the handshake) and drains each state's journal
//! into the backing store.

pub mod ticket;
pub mod transfer;

pub use ticket::{TicketAction, TicketEnvironment, TicketReducer};
pub use transfer::{TransferAction, TransferEnvironment, TransferReducer};
