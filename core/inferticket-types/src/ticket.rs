//! The ticket record and its lifecycle helpers.

use crate::encoding::{self, base64_bytes, flexible_time};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A finalized, redeemable inference credential.
///
/// Identity is the `finalized_ticket` value: two records with the same
/// finalized bytes are the same ticket regardless of their other fields.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// Opaque bytes sent to the issuer for signing.
    #[serde(default, with = "base64_bytes")]
    pub blinded_request: Vec<u8>,
    /// Opaque bytes returned by the issuer.
    #[serde(default, with = "base64_bytes")]
    pub signed_response: Vec<u8>,
    /// The unblinded credential presented at redemption.
    #[serde(with = "base64_bytes")]
    pub finalized_ticket: Vec<u8>,
    /// When the ticket was finalized.
    #[serde(default = "Utc::now", deserialize_with = "flexible_time::deserialize")]
    pub created_at: DateTime<Utc>,
    /// When the ticket was archived, `None` while active.
    #[serde(
        default,
        deserialize_with = "flexible_time::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub consumed_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Creates a fresh, active ticket stamped with the current time.
    #[must_use]
    pub fn new(blinded_request: Vec<u8>, signed_response: Vec<u8>, finalized_ticket: Vec<u8>) -> Self {
        Self {
            blinded_request,
            signed_response,
            finalized_ticket,
            created_at: Utc::now(),
            consumed_at: None,
        }
    }

    /// Returns the identity key of this ticket.
    #[must_use]
    pub fn id(&self) -> &[u8] {
        &self.finalized_ticket
    }

    /// Returns the finalized ticket as it is presented to the key endpoint.
    #[must_use]
    pub fn encoded(&self) -> String {
        encoding::encode(&self.finalized_ticket)
    }

    /// Returns true once the ticket has been archived.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    /// Returns an archived copy stamped with `at`, keeping an existing stamp.
    #[must_use]
    pub fn into_consumed(mut self, at: DateTime<Utc>) -> Self {
        self.consumed_at.get_or_insert(at);
        self
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("finalized_ticket", &format_args!("[{} bytes]", self.finalized_ticket.len()))
            .field("created_at", &self.created_at)
            .field("consumed_at", &self.consumed_at)
            .finish()
    }
}

/// Summary of the store partitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketCounts {
    /// Tickets in the active partition, reserved or not.
    pub active: usize,
    /// Active tickets currently held by a live reservation.
    pub reserved: usize,
    /// Tickets in the archive.
    pub archived: usize,
}

impl TicketCounts {
    /// Active tickets a new reservation could pick right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.active.saturating_sub(self.reserved)
    }
}
