//! Blind-signature client.
//!
//! Wraps the RSA blind-signature primitive (RSABSSA-SHA384-PSS, 48-byte salt,
//! no message randomization). The client blinds a token input, the issuer
//! signs the blinded message, and the client unblinds the response into a
//! finalized [`Token`].

use crate::challenge::{TokenChallenge, TOKEN_TYPE_BLIND_RSA};
use crate::error::{CryptoError, CryptoResult};
use crate::token::{Token, TokenRequest, NONCE_LEN, TOKEN_INPUT_LEN};
use blind_rsa_signatures::{BlindSignature, Options, PublicKey, Secret, Signature};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;
use zeroize::Zeroize;

struct IssuerKeyInner {
    key: PublicKey,
    key_id: [u8; 32],
}

/// The issuer's RSA public key plus its token key id.
#[derive(Clone)]
pub struct IssuerPublicKey {
    inner: Arc<IssuerKeyInner>,
}

impl IssuerPublicKey {
    /// Parses a DER-encoded RSA public key.
    pub fn from_der(der: &[u8]) -> CryptoResult<Self> {
        if der.is_empty() {
            return Err(CryptoError::InvalidPublicKey("key is empty".to_string()));
        }
        let key = PublicKey::from_der(der)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(IssuerKeyInner {
                key,
                key_id: Sha256::digest(der).into(),
            }),
        })
    }

    /// Parses the base64 DER key served by the issuer.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        if encoded.trim().is_empty() {
            return Err(CryptoError::InvalidPublicKey("key is empty".to_string()));
        }
        Self::from_der(&inferticket_types::encoding::decode(encoded)?)
    }

    /// SHA-256 of the encoded key.
    #[must_use]
    pub fn key_id(&self) -> &[u8; 32] {
        &self.inner.key_id
    }
}

impl std::fmt::Debug for IssuerPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerPublicKey")
            .field("key_id", &hex::encode(&self.inner.key_id[..4]))
            .finish()
    }
}

/// Unblinding material for one token request.
///
/// Lives only for the duration of one issuance flow: it cannot be cloned or
/// serialized, its `Debug` output is redacted, and the secret is zeroized
/// on drop. [`BlindSignatureClient::finalize_token`] consumes it.
pub struct BlindingState {
    secret: Secret,
    token_input: Vec<u8>,
    blinded_len: usize,
    issuer_key: IssuerPublicKey,
}

impl BlindingState {
    /// Length of the blinded message, which the signed response must match.
    #[must_use]
    pub fn blinded_len(&self) -> usize {
        self.blinded_len
    }
}

impl Drop for BlindingState {
    fn drop(&mut self) {
        self.secret.0.zeroize();
        self.token_input.zeroize();
    }
}

impl std::fmt::Debug for BlindingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlindingState")
            .field("secret", &"[REDACTED]")
            .field("blinded_len", &self.blinded_len)
            .finish()
    }
}

/// Client side of the blind-signature token protocol.
pub struct BlindSignatureClient {
    options: Options,
    issued_nonces: Mutex<HashSet<[u8; NONCE_LEN]>>,
}

impl Default for BlindSignatureClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BlindSignatureClient {
    /// Creates a client using the protocol's fixed signature options.
    #[must_use]
    pub fn new() -> Self {
        Self {
            options: Options::default(),
            issued_nonces: Mutex::new(HashSet::new()),
        }
    }

    /// Builds the challenge every token from this issuer is bound to.
    pub fn create_challenge(&self, issuer_name: &str, audience: &str) -> CryptoResult<TokenChallenge> {
        TokenChallenge::new(issuer_name, audience)
    }

    /// Blinds a fresh token for `challenge` under `issuer_key`.
    ///
    /// Each call draws a new nonce and a new blinding factor. The returned
    /// state must be passed to [`finalize_token`](Self::finalize_token)
    /// exactly once and never leaves the process.
    ///
    /// # Errors
    ///
    /// `InvariantViolation` if a nonce repeats within this client, or
    /// `Protocol` if the primitive rejects the key or input.
    pub fn create_token_request(
        &self,
        challenge: &TokenChallenge,
        issuer_key: &IssuerPublicKey,
    ) -> CryptoResult<(TokenRequest, BlindingState)> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        {
            let mut issued = self
                .issued_nonces
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !issued.insert(nonce) {
                return Err(CryptoError::InvariantViolation(
                    "token nonce reused across requests".to_string(),
                ));
            }
        }

        let mut token_input = Vec::with_capacity(TOKEN_INPUT_LEN);
        token_input.extend_from_slice(&TOKEN_TYPE_BLIND_RSA.to_be_bytes());
        token_input.extend_from_slice(&nonce);
        token_input.extend_from_slice(&challenge.digest());
        token_input.extend_from_slice(issuer_key.key_id());

        let blinding = issuer_key
            .inner
            .key
            .blind(&mut OsRng, &token_input, false, &self.options)
            .map_err(|e| CryptoError::Protocol(format!("blinding failed: {e}")))?;

        let blinded_msg = blinding.blind_msg.0.clone();
        let request = TokenRequest::new(issuer_key.key_id()[31], blinded_msg);
        debug!(blinded_len = request.blinded_msg().len(), "Created token request");

        let state = BlindingState {
            secret: blinding.secret,
            blinded_len: request.blinded_msg().len(),
            token_input,
            issuer_key: issuer_key.clone(),
        };
        Ok((request, state))
    }

    /// Unblinds the issuer's signature into a finalized token.
    ///
    /// # Errors
    ///
    /// `Protocol` if the response length differs from the blinded message,
    /// or if the unblinded signature does not verify under the key the
    /// request was blinded against.
    pub fn finalize_token(&self, signed_response: &[u8], state: BlindingState) -> CryptoResult<Token> {
        if signed_response.len() != state.blinded_len {
            return Err(CryptoError::Protocol(format!(
                "signed response is {} bytes, expected {}",
                signed_response.len(),
                state.blinded_len
            )));
        }

        let blind_sig = BlindSignature(signed_response.to_vec());
        let signature = state
            .issuer_key
            .inner
            .key
            .finalize(&blind_sig, &state.secret, None, &state.token_input, &self.options)
            .map_err(|e| CryptoError::Protocol(format!("unblinding failed: {e}")))?;

        Ok(Token::from_parts(&state.token_input, &signature.0))
    }

    /// Verifies a finalized token against the issuer key.
    ///
    /// # Errors
    ///
    /// `Protocol` if the token is malformed, bound to another key, or its
    /// authenticator does not verify.
    pub fn verify_token(&self, token: &Token, issuer_key: &IssuerPublicKey) -> CryptoResult<()> {
        if token.token_key_id() != issuer_key.key_id() {
            return Err(CryptoError::Protocol(
                "token was issued under a different key".to_string(),
            ));
        }
        Signature(token.authenticator().to_vec())
            .verify(&issuer_key.inner.key, None, token.token_input(), &self.options)
            .map_err(|e| CryptoError::Protocol(format!("token verification failed: {e}")))
    }
}
