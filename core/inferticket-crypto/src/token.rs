//! Token request and finalized token layouts.
//!
//! - `TokenRequest = token_type(u16) | truncated_token_key_id(u8) | blinded_msg(Nk)`
//! - `Token = token_type(u16) | nonce(32) | challenge_digest(32) | token_key_id(32) | authenticator(Nk)`

use crate::challenge::TOKEN_TYPE_BLIND_RSA;
use crate::error::{CryptoError, CryptoResult};

/// Size of the random token nonce.
pub const NONCE_LEN: usize = 32;

/// Size of the challenge digest and token key id.
pub const DIGEST_LEN: usize = 32;

/// Bytes preceding the authenticator in a token.
pub(crate) const TOKEN_INPUT_LEN: usize = 2 + NONCE_LEN + DIGEST_LEN + DIGEST_LEN;

/// A blinded token request, safe to send to the issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    token_type: u16,
    truncated_token_key_id: u8,
    blinded_msg: Vec<u8>,
}

impl TokenRequest {
    pub(crate) fn new(truncated_token_key_id: u8, blinded_msg: Vec<u8>) -> Self {
        Self {
            token_type: TOKEN_TYPE_BLIND_RSA,
            truncated_token_key_id,
            blinded_msg,
        }
    }

    /// Returns the blinded message the issuer signs.
    #[must_use]
    pub fn blinded_msg(&self) -> &[u8] {
        &self.blinded_msg
    }

    /// Returns the last byte of the issuer key id.
    #[must_use]
    pub fn truncated_token_key_id(&self) -> u8 {
        self.truncated_token_key_id
    }

    /// Serializes the request in wire order.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + self.blinded_msg.len());
        out.extend_from_slice(&self.token_type.to_be_bytes());
        out.push(self.truncated_token_key_id);
        out.extend_from_slice(&self.blinded_msg);
        out
    }

    /// Parses a serialized request.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < 4 {
            return Err(CryptoError::Protocol(format!(
                "token request too short: {} bytes",
                bytes.len()
            )));
        }
        let token_type = u16::from_be_bytes([bytes[0], bytes[1]]);
        if token_type != TOKEN_TYPE_BLIND_RSA {
            return Err(CryptoError::Protocol(format!(
                "unexpected token type {token_type:#06x}"
            )));
        }
        Ok(Self {
            token_type,
            truncated_token_key_id: bytes[2],
            blinded_msg: bytes[3..].to_vec(),
        })
    }
}

/// A finalized, unlinkable token.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    bytes: Vec<u8>,
}

impl Token {
    pub(crate) fn from_parts(token_input: &[u8], authenticator: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(token_input.len() + authenticator.len());
        bytes.extend_from_slice(token_input);
        bytes.extend_from_slice(authenticator);
        Self { bytes }
    }

    /// Parses a serialized token, checking its type tag and minimum length.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() <= TOKEN_INPUT_LEN {
            return Err(CryptoError::Protocol(format!(
                "token too short: {} bytes",
                bytes.len()
            )));
        }
        let token_type = u16::from_be_bytes([bytes[0], bytes[1]]);
        if token_type != TOKEN_TYPE_BLIND_RSA {
            return Err(CryptoError::Protocol(format!(
                "unexpected token type {token_type:#06x}"
            )));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// Returns the serialized token.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the token, returning its serialized bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Returns the random nonce.
    #[must_use]
    pub fn nonce(&self) -> &[u8] {
        &self.bytes[2..2 + NONCE_LEN]
    }

    /// Returns the challenge digest the token is bound to.
    #[must_use]
    pub fn challenge_digest(&self) -> &[u8] {
        &self.bytes[2 + NONCE_LEN..2 + NONCE_LEN + DIGEST_LEN]
    }

    /// Returns the issuer key id.
    #[must_use]
    pub fn token_key_id(&self) -> &[u8] {
        &self.bytes[2 + NONCE_LEN + DIGEST_LEN..TOKEN_INPUT_LEN]
    }

    /// Returns the message covered by the authenticator.
    #[must_use]
    pub fn token_input(&self) -> &[u8] {
        &self.bytes[..TOKEN_INPUT_LEN]
    }

    /// Returns the RSA signature.
    #[must_use]
    pub fn authenticator(&self) -> &[u8] {
        &self.bytes[TOKEN_INPUT_LEN..]
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}
