//! Invitation code → N finalized tickets.

use crate::api::{RegisterRequest, TicketApi};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::retry::with_retry;
use chrono::{DateTime, Utc};
use inferticket_crypto::{BlindSignatureClient, BlindingState, IssuerPublicKey};
use inferticket_store::TicketStore;
use inferticket_types::{encoding, InvitationCode, Ticket};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Where an issuance run currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuanceStage {
    Idle,
    ValidatingCode,
    FetchingPublicKey,
    /// Blinding request `index` (1-based) of `total`.
    Blinding { index: usize, total: usize },
    AwaitingSignatures,
    /// Unblinding response `index` (1-based) of `total`.
    Unblinding { index: usize, total: usize },
    Persisting,
    Done,
    Failed(String),
}

impl IssuanceStage {
    fn percent(&self) -> u8 {
        let share = |index: usize, total: usize, span: usize| (index * span / total.max(1)) as u8;
        match self {
            IssuanceStage::Idle => 0,
            IssuanceStage::ValidatingCode => 5,
            IssuanceStage::FetchingPublicKey => 10,
            IssuanceStage::Blinding { index, total } => 15 + share(*index, *total, 35),
            IssuanceStage::AwaitingSignatures => 55,
            IssuanceStage::Unblinding { index, total } => 60 + share(*index, *total, 30),
            IssuanceStage::Persisting => 95,
            IssuanceStage::Done => 100,
            IssuanceStage::Failed(_) => 0,
        }
    }
}

impl fmt::Display for IssuanceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssuanceStage::Idle => f.write_str("Idle"),
            IssuanceStage::ValidatingCode => f.write_str("Validating invitation code"),
            IssuanceStage::FetchingPublicKey => f.write_str("Fetching issuer public key"),
            IssuanceStage::Blinding { index, total } => {
                write!(f, "Blinding ticket {index} of {total}")
            }
            IssuanceStage::AwaitingSignatures => f.write_str("Waiting for issuer signatures"),
            IssuanceStage::Unblinding { index, total } => {
                write!(f, "Unblinding ticket {index} of {total}")
            }
            IssuanceStage::Persisting => f.write_str("Saving tickets"),
            IssuanceStage::Done => f.write_str("Done"),
            IssuanceStage::Failed(reason) => write!(f, "Failed: {reason}"),
        }
    }
}

/// Receives `(message, percent)` updates. Percent never decreases.
pub type ProgressCallback = Arc<dyn Fn(&str, u8) + Send + Sync>;

/// Outcome of a successful issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceReport {
    /// Tickets newly added to the store.
    pub tickets_added: usize,
    /// Expiry reported by the issuer, if any.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Tracks the current stage and reports monotonic progress.
struct StageTracker<'a> {
    callback: Option<&'a ProgressCallback>,
    stage: IssuanceStage,
    percent: u8,
}

impl<'a> StageTracker<'a> {
    fn new(callback: Option<&'a ProgressCallback>) -> Self {
        Self {
            callback,
            stage: IssuanceStage::Idle,
            percent: 0,
        }
    }

    fn enter(&mut self, stage: IssuanceStage) {
        debug!("Issuance: {} -> {}", self.stage, stage);
        self.percent = self.percent.max(stage.percent());
        if let Some(callback) = self.callback {
            callback(&stage.to_string(), self.percent);
        }
        self.stage = stage;
    }
}

/// Turns an invitation code into finalized tickets in the store.
pub struct CredentialIssuer {
    api: Arc<dyn TicketApi>,
    store: Arc<TicketStore>,
    crypto: BlindSignatureClient,
    config: ClientConfig,
    progress: Option<ProgressCallback>,
    last_stage: Mutex<IssuanceStage>,
}

impl CredentialIssuer {
    /// Creates an issuer writing into `store`.
    pub fn new(api: Arc<dyn TicketApi>, store: Arc<TicketStore>, config: ClientConfig) -> Self {
        Self {
            api,
            store,
            crypto: BlindSignatureClient::new(),
            config,
            progress: None,
            last_stage: Mutex::new(IssuanceStage::Idle),
        }
    }

    /// Installs a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Stage the most recent run ended in.
    pub fn last_stage(&self) -> IssuanceStage {
        self.last_stage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Redeems `code` for tickets.
    ///
    /// The code is validated before any network or cryptographic work.
    /// The public-key fetch and the registration call are retried per
    /// `config.retry`; nothing is written locally until every response has
    /// been unblinded.
    pub async fn obtain_credential(&self, code: &str) -> ClientResult<IssuanceReport> {
        let mut tracker = StageTracker::new(self.progress.as_ref());
        let result = self.run(code, &mut tracker).await;
        if let Err(e) = &result {
            tracker.enter(IssuanceStage::Failed(e.to_string()));
        }
        *self.last_stage.lock().unwrap_or_else(PoisonError::into_inner) = tracker.stage;
        result
    }

    async fn run(&self, code: &str, tracker: &mut StageTracker<'_>) -> ClientResult<IssuanceReport> {
        tracker.enter(IssuanceStage::ValidatingCode);
        let code = InvitationCode::parse(code)?;
        let total = usize::from(code.ticket_count());

        tracker.enter(IssuanceStage::FetchingPublicKey);
        let encoded = with_retry(&self.config.retry, "public key fetch", || {
            self.api.fetch_public_key()
        })
        .await?;
        if encoded.trim().is_empty() {
            return Err(ClientError::IssuerUnavailable(
                "issuer returned an empty public key".to_string(),
            ));
        }
        let key = IssuerPublicKey::from_base64(&encoded)?;
        let challenge = self
            .crypto
            .create_challenge(&self.config.issuer_name, &self.config.audience)?;

        let mut pending: Vec<(Vec<u8>, BlindingState)> = Vec::with_capacity(total);
        let mut blinded_requests = Vec::with_capacity(total);
        let mut seen = HashSet::with_capacity(total);
        for index in 0..total {
            tracker.enter(IssuanceStage::Blinding {
                index: index + 1,
                total,
            });
            let (request, state) = self.crypto.create_token_request(&challenge, &key)?;
            let blinded = request.blinded_msg().to_vec();
            if !seen.insert(blinded.clone()) {
                return Err(ClientError::InvariantViolation(format!(
                    "blinded request {index} repeats an earlier request"
                )));
            }
            blinded_requests.push((index as u32, encoding::encode(&blinded)));
            pending.push((blinded, state));
        }

        tracker.enter(IssuanceStage::AwaitingSignatures);
        let request = RegisterRequest {
            credential: code.as_str().to_string(),
            blinded_requests,
        };
        let response = with_retry(&self.config.retry, "registration", || {
            self.api.register(&request)
        })
        .await?;
        let signed = match_signed_responses(total, response.signed_responses)?;

        let mut tickets = Vec::with_capacity(total);
        for (index, ((blinded, state), signed)) in pending.into_iter().zip(signed).enumerate() {
            tracker.enter(IssuanceStage::Unblinding {
                index: index + 1,
                total,
            });
            let token = self
                .crypto
                .finalize_token(&signed, state)
                .map_err(|e| ClientError::Protocol(format!("response {index}: {e}")))?;
            tickets.push(Ticket::new(blinded, signed, token.into_bytes()));
        }

        tracker.enter(IssuanceStage::Persisting);
        let tickets_added = self.store.add_tickets(tickets).await?;
        tracker.enter(IssuanceStage::Done);
        info!("Issued {} tickets ({} requested)", tickets_added, total);

        Ok(IssuanceReport {
            tickets_added,
            expires_at: response.expires_at,
        })
    }
}

/// Orders signed responses by request index.
///
/// Entries with unknown or repeated indices are ignored; a missing index
/// fails the whole batch.
fn match_signed_responses(
    expected: usize,
    entries: Vec<(u32, String)>,
) -> ClientResult<Vec<Vec<u8>>> {
    let mut slots: Vec<Option<Vec<u8>>> = vec![None; expected];
    for (index, blob) in entries {
        match slots.get_mut(index as usize) {
            None => warn!("Ignoring signed response with unknown index {}", index),
            Some(Some(_)) => warn!("Ignoring duplicate signed response for index {}", index),
            Some(slot) => {
                let bytes = encoding::decode(&blob).map_err(|e| {
                    ClientError::MalformedResponse(format!("signed response {index}: {e}"))
                })?;
                *slot = Some(bytes);
            }
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.ok_or(ClientError::MissingSignedResponse(index)))
        .collect()
}
