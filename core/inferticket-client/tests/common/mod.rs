//! Shared test helpers: an in-process issuer behind wiremock.

#![allow(dead_code)]

use async_trait::async_trait;
use blind_rsa_signatures::{KeyPair, Options};
use inferticket_client::{
    ClientConfig, ClientResult, HttpTicketApi, RegisterRequest, RegisterResponse, RetryPolicy,
    TicketApi,
};
use inferticket_crypto::IssuerPublicKey;
use inferticket_store::{InProcessLock, MemoryKv, StoreConfig, TicketStore};
use inferticket_types::{encoding, Ticket};
use rand::rngs::OsRng;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Issuer key pair, generated once per test binary.
pub fn issuer_keypair() -> &'static KeyPair {
    static KEYPAIR: OnceLock<KeyPair> = OnceLock::new();
    KEYPAIR.get_or_init(|| KeyPair::generate(&mut OsRng, 2048).unwrap())
}

/// The issuer public key as served by `GET /public-key`.
pub fn public_key_b64() -> String {
    encoding::encode(&issuer_keypair().pk.to_der().unwrap())
}

pub fn issuer_key() -> IssuerPublicKey {
    IssuerPublicKey::from_base64(&public_key_b64()).unwrap()
}

/// A syntactically valid invitation code worth `count` tickets.
pub fn invitation(count: u16) -> String {
    format!("abcdefghijklmnopqrst{count:04x}")
}

/// How the fake issuer mangles its signed responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mangle {
    None,
    Reverse,
    DropIndex(u32),
    ExtraEntries,
    CorruptSignatures,
}

/// Blind-signs every request in a registration body.
pub struct SigningIssuer {
    pub mangle: Mangle,
}

impl Respond for SigningIssuer {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: RegisterRequest = request.body_json().unwrap();
        let mut signed: Vec<(u32, String)> = body
            .blinded_requests
            .iter()
            .map(|(index, blob)| {
                let blinded = encoding::decode(blob).unwrap();
                let mut signature = issuer_keypair()
                    .sk
                    .blind_sign(&mut OsRng, &blinded, &Options::default())
                    .unwrap()
                    .0;
                if self.mangle == Mangle::CorruptSignatures {
                    signature[0] ^= 0xFF;
                    signature[1] ^= 0x55;
                }
                (*index, encoding::encode(&signature))
            })
            .collect();

        match self.mangle {
            Mangle::Reverse => signed.reverse(),
            Mangle::DropIndex(dropped) => signed.retain(|(index, _)| *index != dropped),
            Mangle::ExtraEntries => {
                let first = signed[0].clone();
                signed.push((first.0, encoding::encode(b"duplicate")));
                signed.push((999, first.1));
            }
            Mangle::None | Mangle::CorruptSignatures => {}
        }

        ResponseTemplate::new(200).set_body_json(json!({
            "signed_responses": signed,
            "expires_at": "2027-01-01T00:00:00Z",
        }))
    }
}

/// Mounts `GET /public-key` and a signing `POST /alpha-register`.
pub async fn mount_issuer(server: &MockServer, mangle: Mangle) {
    Mock::given(method("GET"))
        .and(path("/public-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "public_key": public_key_b64(),
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/alpha-register"))
        .respond_with(SigningIssuer { mangle })
        .mount(server)
        .await;
}

/// Client config pointed at `server` with fast retries.
pub fn config(server: &MockServer) -> ClientConfig {
    ClientConfig {
        base_url: server.uri(),
        request_timeout_ms: 2_000,
        redeem_timeout_ms: 2_000,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        },
        ..ClientConfig::default()
    }
}

pub fn http_api(config: &ClientConfig) -> Arc<dyn TicketApi> {
    Arc::new(HttpTicketApi::new(config.clone()).unwrap())
}

/// A fresh in-memory store.
pub async fn memory_store() -> Arc<TicketStore> {
    Arc::new(
        TicketStore::open(
            Arc::new(MemoryKv::new()),
            Arc::new(InProcessLock::new()),
            StoreConfig::default(),
        )
        .await
        .unwrap(),
    )
}

/// Placeholder ticket; the key endpoint stub does not verify it.
pub fn ticket(n: u8) -> Ticket {
    Ticket::new(vec![0xB0, n], vec![0x5E, n], vec![0xF1, n, n, n])
}

pub async fn seeded_store(count: u8) -> Arc<TicketStore> {
    let store = memory_store().await;
    store
        .add_tickets((1..=count).map(ticket).collect())
        .await
        .unwrap();
    store
}

/// A well-formed key endpoint response.
pub fn key_response() -> Value {
    json!({
        "key": "sk-test-123",
        "key_hash": "abc123",
        "credit_limit": 2.5,
        "duration_minutes": 60,
        "expires_at_unix": 1_800_000_000i64,
        "station_signature": "station-sig",
        "org_signature": "org-sig",
        "model": "inference-large",
    })
}

/// A [`TicketApi`] that only counts calls.
#[derive(Default)]
pub struct CountingApi {
    pub calls: AtomicUsize,
}

impl CountingApi {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TicketApi for CountingApi {
    async fn fetch_public_key(&self) -> ClientResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(String::new())
    }

    async fn register(&self, _request: &RegisterRequest) -> ClientResult<RegisterResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RegisterResponse {
            signed_responses: Vec::new(),
            expires_at: None,
        })
    }

    async fn request_key(&self, _authorization: &str, _name: &str) -> ClientResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(key_response())
    }
}
