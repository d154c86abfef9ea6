//! Core type definitions for inference tickets.
//!
//! This crate defines the plain data types shared by every other crate:
//! - `Ticket`, the unit of credential value, and its lifecycle helpers
//! - `InvitationCode`, the validated input to credential issuance
//! - `IssuedApiKey`, the ephemeral result of redeeming tickets
//!
//! Byte fields are carried as `Vec<u8>` and persisted as base64url strings
//! through the [`encoding`] helpers.

pub mod encoding;
mod api_key;
mod invitation;
mod ticket;

pub use api_key::IssuedApiKey;
pub use invitation::{InvitationCode, INVITATION_CODE_LEN};
pub use ticket::{Ticket, TicketCounts};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid invitation code: {0}")]
    InvalidInvitationCode(String),

    #[error("invalid encoding: {0}")]
    Encoding(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
