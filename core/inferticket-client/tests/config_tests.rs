use inferticket_client::{ClientConfig, ClientError, RetryPolicy};
use inferticket_store::StoreError;
use std::time::Duration;

// ── ClientConfig ─────────────────────────────────────────────────

#[test]
fn default_config_is_valid() {
    let cfg = ClientConfig::default();
    cfg.validate().unwrap();
    assert_eq!(cfg.reservation_attempts, 3);
    assert_eq!(cfg.redeem_timeout(), Duration::from_secs(30));
}

#[test]
fn config_serde_fills_missing_fields() {
    let cfg: ClientConfig =
        serde_json::from_str(r#"{ "base_url": "https://issuer.test", "retry": { "max_attempts": 5 } }"#)
            .unwrap();
    assert_eq!(cfg.base_url, "https://issuer.test");
    assert_eq!(cfg.retry.max_attempts, 5);
    assert_eq!(cfg.retry.base_delay_ms, RetryPolicy::default().base_delay_ms);
    assert_eq!(cfg.key_name, ClientConfig::default().key_name);
}

#[test]
fn invalid_configs_are_rejected() {
    let bad = [
        ClientConfig::new("ftp://issuer.test"),
        ClientConfig {
            issuer_name: String::new(),
            ..ClientConfig::default()
        },
        ClientConfig {
            redeem_timeout_ms: 0,
            ..ClientConfig::default()
        },
        ClientConfig {
            reservation_attempts: 0,
            ..ClientConfig::default()
        },
        ClientConfig {
            retry: RetryPolicy {
                base_delay_ms: 10,
                max_delay_ms: 5,
                ..RetryPolicy::default()
            },
            ..ClientConfig::default()
        },
    ];
    for cfg in bad {
        assert!(matches!(cfg.validate(), Err(ClientError::Config(_))), "{cfg:?}");
    }
}

// ── RetryPolicy ──────────────────────────────────────────────────

#[test]
fn backoff_ceiling_doubles_and_caps() {
    let policy = RetryPolicy {
        max_attempts: 10,
        base_delay_ms: 100,
        max_delay_ms: 1_000,
    };
    assert_eq!(policy.ceiling(1), Duration::from_millis(100));
    assert_eq!(policy.ceiling(2), Duration::from_millis(200));
    assert_eq!(policy.ceiling(4), Duration::from_millis(800));
    assert_eq!(policy.ceiling(5), Duration::from_millis(1_000));
    assert_eq!(policy.ceiling(60), Duration::from_millis(1_000));
}

#[test]
fn jittered_backoff_stays_under_ceiling() {
    let policy = RetryPolicy::default();
    for attempt in 1..8 {
        for _ in 0..50 {
            assert!(policy.backoff(attempt) <= policy.ceiling(attempt));
        }
    }
}

// ── Error classification ─────────────────────────────────────────

#[test]
fn transient_errors_are_retryable() {
    assert!(ClientError::NetworkTimeout("t".into()).is_retryable());
    assert!(ClientError::Network("reset".into()).is_retryable());
    assert!(ClientError::IssuerUnavailable("down".into()).is_retryable());
    assert!(ClientError::RemoteRejected { status: 503, body: String::new() }.is_retryable());
    assert!(ClientError::RemoteRejected { status: 429, body: String::new() }.is_retryable());
}

#[test]
fn terminal_errors_are_not_retryable() {
    assert!(!ClientError::RemoteRejected { status: 400, body: String::new() }.is_retryable());
    assert!(!ClientError::Protocol("bad".into()).is_retryable());
    assert!(!ClientError::TicketAlreadyUsed.is_retryable());
    assert!(!ClientError::InvalidInvitationCode("x".into()).is_retryable());
    assert!(!ClientError::MissingSignedResponse(3).is_retryable());
}

#[test]
fn double_spend_classification() {
    assert!(ClientError::RemoteRejected { status: 401, body: String::new() }.is_double_spend());
    assert!(
        ClientError::RemoteRejected { status: 403, body: "token already used".into() }
            .is_double_spend()
    );
    assert!(
        !ClientError::RemoteRejected { status: 500, body: "spent too long".into() }
            .is_double_spend()
    );
    assert!(!ClientError::NetworkTimeout("t".into()).is_double_spend());
}

#[test]
fn store_shortage_maps_to_insufficient_tickets() {
    let err: ClientError = StoreError::InsufficientTickets { requested: 3, available: 2 }.into();
    assert!(matches!(
        err,
        ClientError::InsufficientTickets { requested: 3, available: 2 }
    ));
    let err: ClientError = StoreError::LockTimeout("tickets".into()).into();
    assert!(matches!(err, ClientError::Store(StoreError::LockTimeout(_))));
}
