//! Tickets → API key.

use crate::api::TicketApi;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use inferticket_store::{ReservationHandle, StoreError, TicketStore};
use inferticket_types::{IssuedApiKey, Ticket};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pause between reservation attempts while other actors hold tickets.
const RESERVATION_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Builds the `Authorization` header value presenting `tickets`.
pub fn authorization_header(tickets: &[Ticket]) -> String {
    match tickets {
        [single] => format!("InferenceTicket token={}", single.encoded()),
        many => {
            let joined: Vec<String> = many.iter().map(Ticket::encoded).collect();
            format!("InferenceTicket tokens={}", joined.join(","))
        }
    }
}

/// Exchanges reserved tickets for a short-lived API key.
///
/// The key request is made exactly once per call. Every exit path after a
/// successful reservation either commits it (the tickets are spent) or
/// releases it (the tickets are free again).
pub struct KeyRedeemer {
    api: Arc<dyn TicketApi>,
    store: Arc<TicketStore>,
    config: ClientConfig,
}

impl KeyRedeemer {
    pub fn new(api: Arc<dyn TicketApi>, store: Arc<TicketStore>, config: ClientConfig) -> Self {
        Self { api, store, config }
    }

    /// Redeems `count` tickets for a key named `config.key_name`.
    pub async fn request_api_key(&self, count: usize) -> ClientResult<IssuedApiKey> {
        let handle = self.reserve(count).await?;
        let authorization = authorization_header(handle.tickets());

        let outcome = match self
            .api
            .request_key(&authorization, &self.config.key_name)
            .await
        {
            Ok(body) => IssuedApiKey::from_response(body)
                .map_err(|e| ClientError::MalformedResponse(e.to_string())),
            Err(e) => Err(e),
        };

        // The server has ruled on the tickets by now; a local store failure
        // must not hide the key or the double-spend verdict from the caller.
        match outcome {
            Ok(key) => {
                match self.store.commit_reservation(handle).await {
                    Ok(archived) => info!("Redeemed {} tickets for an API key", archived),
                    Err(e) => warn!("API key issued but archiving its tickets failed: {}", e),
                }
                Ok(key)
            }
            Err(e) if e.is_double_spend() => {
                warn!("Key endpoint reports tickets already spent: {}", e);
                if let Err(e) = self.store.commit_reservation(handle).await {
                    warn!("Failed to archive spent tickets: {}", e);
                }
                Err(ClientError::TicketAlreadyUsed)
            }
            Err(e) => {
                warn!("Key request failed, releasing {} tickets: {}", handle.len(), e);
                if let Err(release_err) = self.store.release_reservation(handle).await {
                    warn!("Failed to release reservation: {}", release_err);
                }
                Err(e)
            }
        }
    }

    /// Reserves `count` tickets, retrying while other actors hold them.
    async fn reserve(&self, count: usize) -> ClientResult<ReservationHandle> {
        let attempts = self.config.reservation_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.reserve_tickets(count).await {
                Ok(handle) => return Ok(handle),
                Err(StoreError::InsufficientTickets {
                    requested,
                    available,
                }) => {
                    let active = self.store.counts().await?.active;
                    if active < requested {
                        return Err(ClientError::InsufficientTickets {
                            requested,
                            available: active,
                        });
                    }
                    if attempt >= attempts {
                        return Err(ClientError::ReservationExhausted {
                            requested,
                            available,
                        });
                    }
                    debug!(
                        "Tickets held by other actors ({} free of {}), retrying reservation",
                        available, active
                    );
                    tokio::time::sleep(RESERVATION_RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
