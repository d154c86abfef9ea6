//! Blind-signature token client for inference tickets.
//!
//! Tickets are publicly verifiable blind-RSA tokens:
//! 1. **Challenge**: bind tokens to an issuer name and audience
//! 2. **Blind**: draw a nonce, build the token input, blind it
//! 3. **Sign**: the issuer signs the blinded message (remote, not here)
//! 4. **Finalize**: unblind the signature into a redeemable token
//!
//! The issuer sees only the blinded message and its signature, so it cannot
//! link a finalized token back to the request that produced it. The RSA math
//! lives in `blind-rsa-signatures`; this crate owns the token layouts and the
//! handling rules for blinding state.

mod challenge;
mod client;
mod error;
mod token;

pub use challenge::{TokenChallenge, TOKEN_TYPE_BLIND_RSA};
pub use client::{BlindSignatureClient, BlindingState, IssuerPublicKey};
pub use error::{CryptoError, CryptoResult};
pub use token::{Token, TokenRequest, DIGEST_LEN, NONCE_LEN};
