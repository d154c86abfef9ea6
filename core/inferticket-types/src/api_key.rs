//! The API key handed out in exchange for tickets.

use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire shape of a key-issuance response.
#[derive(Debug, Deserialize)]
struct KeyResponse {
    key: String,
    #[serde(default)]
    key_hash: Option<String>,
    #[serde(default)]
    credit_limit: Option<f64>,
    #[serde(default)]
    duration_minutes: Option<u64>,
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    expires_at_unix: Option<i64>,
    #[serde(default)]
    station_signature: Option<String>,
    #[serde(default)]
    org_signature: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// An ephemeral API key issued by the key endpoint. Never persisted here.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedApiKey {
    /// Bearer key material.
    pub key: String,
    /// Hash of the key as recorded by the issuer.
    pub key_hash: Option<String>,
    /// Credit the key may spend.
    pub credit_limit: Option<f64>,
    /// Lifetime granted at issuance.
    pub duration_minutes: Option<u64>,
    /// Absolute expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Signature from the station that redeemed the tickets.
    pub station_signature: Option<String>,
    /// Signature from the issuing organisation.
    pub org_signature: Option<String>,
    /// Response fields not modelled above.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IssuedApiKey {
    /// Builds a key from the raw JSON body of a key-issuance response.
    ///
    /// The expiry prefers `expires_at_unix` and falls back to parsing
    /// `expires_at` as RFC 3339.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the body lacks a key, or `Encoding` if an
    /// expiry is present but unparseable.
    pub fn from_response(body: serde_json::Value) -> Result<Self> {
        let raw: KeyResponse = serde_json::from_value(body)?;
        if raw.key.is_empty() {
            return Err(Error::Encoding("response carries an empty key".to_string()));
        }

        let expires_at = match (raw.expires_at_unix, raw.expires_at.as_deref()) {
            (Some(secs), _) => Some(
                Utc.timestamp_opt(secs, 0)
                    .single()
                    .ok_or_else(|| Error::Encoding(format!("expiry out of range: {secs}")))?,
            ),
            (None, Some(text)) => Some(
                DateTime::parse_from_rfc3339(text)
                    .map_err(|e| Error::Encoding(format!("invalid expiry {text:?}: {e}")))?
                    .with_timezone(&Utc),
            ),
            (None, None) => None,
        };

        Ok(Self {
            key: raw.key,
            key_hash: raw.key_hash,
            credit_limit: raw.credit_limit,
            duration_minutes: raw.duration_minutes,
            expires_at,
            station_signature: raw.station_signature,
            org_signature: raw.org_signature,
            extra: raw.extra,
        })
    }

    /// Returns true if the key carries an expiry that has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Utc::now() >= exp)
    }
}

impl fmt::Debug for IssuedApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedApiKey")
            .field("key", &"[REDACTED]")
            .field("key_hash", &self.key_hash)
            .field("credit_limit", &self.credit_limit)
            .field("duration_minutes", &self.duration_minutes)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
