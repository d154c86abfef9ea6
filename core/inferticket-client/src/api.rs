//! Remote issuer interface and its HTTP implementation.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use inferticket_types::encoding::flexible_time;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Body of `POST /alpha-register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// The invitation code.
    pub credential: String,
    /// `(index, base64url blinded message)` pairs.
    pub blinded_requests: Vec<(u32, String)>,
}

/// Response of `POST /alpha-register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// `(index, base64url blind signature)` pairs, in any order.
    pub signed_responses: Vec<(u32, String)>,
    /// When the issued tickets stop being redeemable, if the issuer says.
    #[serde(
        default,
        deserialize_with = "flexible_time::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct PublicKeyResponse {
    #[serde(default)]
    public_key: String,
}

/// The three endpoints of the issuing service.
#[async_trait]
pub trait TicketApi: Send + Sync {
    /// `GET /public-key`: the issuer's base64 DER public key.
    async fn fetch_public_key(&self) -> ClientResult<String>;

    /// `POST /alpha-register`: signs a batch of blinded requests.
    async fn register(&self, request: &RegisterRequest) -> ClientResult<RegisterResponse>;

    /// `POST /request_key`: exchanges tickets for an API key.
    ///
    /// `authorization` is the full `Authorization` header value. Returns the
    /// raw JSON body of a successful response.
    async fn request_key(&self, authorization: &str, name: &str) -> ClientResult<Value>;
}

/// [`TicketApi`] over HTTP.
pub struct HttpTicketApi {
    client: Client,
    config: ClientConfig,
}

impl HttpTicketApi {
    /// Creates a client for `config.base_url`.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let client = Client::builder()
            .build()
            .map_err(|e| ClientError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Maps a non-success status to `RemoteRejected`, keeping the body.
    async fn check(response: Response) -> ClientResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::RemoteRejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl TicketApi for HttpTicketApi {
    async fn fetch_public_key(&self) -> ClientResult<String> {
        let response = self
            .client
            .get(self.config.endpoint("public-key"))
            .timeout(self.config.request_timeout())
            .send()
            .await?;
        let body: PublicKeyResponse = Self::check(response).await?.json().await?;
        debug!("Fetched issuer public key ({} chars)", body.public_key.len());
        Ok(body.public_key)
    }

    async fn register(&self, request: &RegisterRequest) -> ClientResult<RegisterResponse> {
        let response = self
            .client
            .post(self.config.endpoint("alpha-register"))
            .timeout(self.config.request_timeout())
            .json(request)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn request_key(&self, authorization: &str, name: &str) -> ClientResult<Value> {
        let response = self
            .client
            .post(self.config.endpoint("request_key"))
            .timeout(self.config.redeem_timeout())
            .header(AUTHORIZATION, authorization)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}
