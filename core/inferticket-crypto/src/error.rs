//! Error types for the blind-signature layer.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur while blinding or unblinding tokens.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The signed response does not fit the blinding state or protocol layout.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Blinding material was reused or otherwise misapplied.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The issuer public key is missing or cannot be parsed.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// A base64 field could not be decoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] inferticket_types::Error),
}
