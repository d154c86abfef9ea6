//! Token challenge construction.
//!
//! Layout: `token_type(u16) | issuer_name(u16 len) | redemption_context(u8 len) | origin_info(u16 len)`.
//! All integers are big-endian.

use crate::error::{CryptoError, CryptoResult};
use sha2::{Digest, Sha256};

/// Token type for publicly verifiable RSA blind-signature tokens.
pub const TOKEN_TYPE_BLIND_RSA: u16 = 0x0002;

/// A protocol challenge binding tokens to an issuer and audience.
///
/// Carries no per-user data: the redemption context is always empty so that
/// challenges for the same issuer and audience are byte-identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenChallenge {
    token_type: u16,
    issuer_name: String,
    redemption_context: Vec<u8>,
    origin_info: String,
}

impl TokenChallenge {
    /// Builds a challenge for `issuer_name`, scoped to `audience`.
    pub fn new(issuer_name: &str, audience: &str) -> CryptoResult<Self> {
        if issuer_name.is_empty() {
            return Err(CryptoError::Protocol("issuer name is empty".to_string()));
        }
        if issuer_name.len() > usize::from(u16::MAX) || audience.len() > usize::from(u16::MAX) {
            return Err(CryptoError::Protocol(
                "challenge field exceeds 65535 bytes".to_string(),
            ));
        }
        Ok(Self {
            token_type: TOKEN_TYPE_BLIND_RSA,
            issuer_name: issuer_name.to_string(),
            redemption_context: Vec::new(),
            origin_info: audience.to_string(),
        })
    }

    /// Returns the token type this challenge requests.
    #[must_use]
    pub fn token_type(&self) -> u16 {
        self.token_type
    }

    /// Returns the issuer name.
    #[must_use]
    pub fn issuer_name(&self) -> &str {
        &self.issuer_name
    }

    /// Returns the audience (origin info).
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.origin_info
    }

    /// Serializes the challenge in wire order.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            2 + 2 + self.issuer_name.len() + 1 + self.redemption_context.len() + 2 + self.origin_info.len(),
        );
        out.extend_from_slice(&self.token_type.to_be_bytes());
        // Lengths were bounded in `new`.
        out.extend_from_slice(&(self.issuer_name.len() as u16).to_be_bytes());
        out.extend_from_slice(self.issuer_name.as_bytes());
        out.push(self.redemption_context.len() as u8);
        out.extend_from_slice(&self.redemption_context);
        out.extend_from_slice(&(self.origin_info.len() as u16).to_be_bytes());
        out.extend_from_slice(self.origin_info.as_bytes());
        out
    }

    /// SHA-256 of the serialized challenge, embedded in every token.
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(self.to_bytes()).into()
    }
}
