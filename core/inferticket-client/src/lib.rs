//! Issuance and redemption flows for inference tickets.
//!
//! - [`CredentialIssuer`]: invitation code → blinded batch → signed batch →
//!   finalized tickets in the [`TicketStore`](inferticket_store::TicketStore)
//! - [`KeyRedeemer`]: reserve tickets → one key request → commit or release
//!
//! Both talk to the issuing service through the [`TicketApi`] trait;
//! [`HttpTicketApi`] is the production implementation.
//!
//! Only the idempotent calls (public-key fetch and registration) are
//! retried. A key request is never repeated once tickets are reserved,
//! since a second submission could spend tickets the first already spent.

mod api;
mod config;
mod error;
mod issuer;
mod redeemer;
mod retry;

pub use api::{HttpTicketApi, RegisterRequest, RegisterResponse, TicketApi};
pub use config::{ClientConfig, RetryPolicy};
pub use error::{ClientError, ClientResult};
pub use issuer::{CredentialIssuer, IssuanceReport, IssuanceStage, ProgressCallback};
pub use redeemer::{authorization_header, KeyRedeemer};
