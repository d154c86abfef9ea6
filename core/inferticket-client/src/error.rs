//! Client error types.

use inferticket_crypto::CryptoError;
use inferticket_store::StoreError;
use thiserror::Error;

/// Result type for issuance and redemption.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by [`CredentialIssuer`](crate::CredentialIssuer) and
/// [`KeyRedeemer`](crate::KeyRedeemer).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid invitation code: {0}")]
    InvalidInvitationCode(String),

    #[error("issuer unavailable: {0}")]
    IssuerUnavailable(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("issuer returned no signed response for request {0}")]
    MissingSignedResponse(usize),

    #[error("insufficient tickets: requested {requested}, available {available}")]
    InsufficientTickets { requested: usize, available: usize },

    #[error("could not reserve {requested} tickets: {available} free after retrying")]
    ReservationExhausted { requested: usize, available: usize },

    #[error("tickets were already spent")]
    TicketAlreadyUsed,

    #[error("request timed out: {0}")]
    NetworkTimeout(String),

    #[error("remote rejected request with HTTP {status}: {body}")]
    RemoteRejected { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Returns true for transient failures worth another attempt.
    ///
    /// Validation, protocol and double-spend errors are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::IssuerUnavailable(_)
            | ClientError::NetworkTimeout(_)
            | ClientError::Network(_) => true,
            ClientError::RemoteRejected { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns true if the key endpoint reported the tickets as spent.
    pub fn is_double_spend(&self) -> bool {
        match self {
            ClientError::TicketAlreadyUsed => true,
            ClientError::RemoteRejected { status: 401, .. } => true,
            ClientError::RemoteRejected { status, body } if (400..500).contains(status) => {
                let body = body.to_ascii_lowercase();
                body.contains("spent") || body.contains("already used")
            }
            _ => false,
        }
    }
}

impl From<StoreError> for ClientError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InsufficientTickets {
                requested,
                available,
            } => ClientError::InsufficientTickets {
                requested,
                available,
            },
            other => ClientError::Store(other),
        }
    }
}

impl From<CryptoError> for ClientError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvariantViolation(msg) => ClientError::InvariantViolation(msg),
            CryptoError::Protocol(msg) => ClientError::Protocol(msg),
            CryptoError::InvalidPublicKey(msg) => {
                ClientError::Protocol(format!("unusable issuer key: {msg}"))
            }
            CryptoError::Encoding(e) => ClientError::MalformedResponse(e.to_string()),
        }
    }
}

impl From<inferticket_types::Error> for ClientError {
    fn from(e: inferticket_types::Error) -> Self {
        match e {
            inferticket_types::Error::InvalidInvitationCode(msg) => {
                ClientError::InvalidInvitationCode(msg)
            }
            other => ClientError::MalformedResponse(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::NetworkTimeout(e.to_string())
        } else if e.is_decode() {
            ClientError::MalformedResponse(e.to_string())
        } else {
            ClientError::Network(e.to_string())
        }
    }
}
