mod common;

use common::{ids, memory_store, seeded_store, ticket, tickets};
use inferticket_store::{ImportPayload, ImportSummary};
use inferticket_types::encoding;
use pretty_assertions::assert_eq;
use serde_json::json;

fn record(n: u8) -> serde_json::Value {
    serde_json::to_value(ticket(n)).unwrap()
}

// ── Round trip through export ────────────────────────────────────

#[tokio::test]
async fn export_then_import_into_empty_store() {
    let source = seeded_store(3).await;
    let handle = source.reserve_tickets(1).await.unwrap();
    source.commit_reservation(handle).await.unwrap();
    let export = source.export_tickets().await.unwrap();

    let target = memory_store().await;
    let summary = target.import_tickets(export.clone().into()).await.unwrap();
    assert_eq!(summary, ImportSummary { added_active: 2, added_archived: 1 });
    assert_eq!(ids(&target.get_active().await.unwrap()), ids(&export.active));
    assert_eq!(ids(&target.get_archived().await.unwrap()), ids(&export.archived));
}

#[tokio::test]
async fn second_import_adds_nothing() {
    let source = seeded_store(3).await;
    let export = source.export_tickets().await.unwrap();
    let target = memory_store().await;

    target.import_tickets(export.clone().into()).await.unwrap();
    let again = target.import_tickets(export.into()).await.unwrap();
    assert_eq!(again, ImportSummary::default());
}

#[tokio::test]
async fn export_json_parses_as_payload() {
    let source = seeded_store(2).await;
    let text = serde_json::to_string(&source.export_tickets().await.unwrap()).unwrap();
    let payload = ImportPayload::from_json(&text).unwrap();
    assert!(matches!(payload, ImportPayload::Partitioned { .. }));

    let target = memory_store().await;
    let summary = target.import_tickets(payload).await.unwrap();
    assert_eq!(summary.added_active, 2);
}

// ── Classification ───────────────────────────────────────────────

#[tokio::test]
async fn flat_records_classified_by_status_fields() {
    let mut used = record(2);
    used["used"] = json!(true);
    let mut consumed = record(3);
    consumed["consumedAt"] = json!("2026-01-01T00:00:00Z");
    let mut reserved = record(4);
    reserved["reserved"] = json!(true);
    reserved["reservedAt"] = json!(1_767_225_600_000i64);

    let payload = ImportPayload::Flat(vec![record(1), used, consumed, reserved]);
    let store = memory_store().await;
    let summary = store.import_tickets(payload).await.unwrap();

    assert_eq!(summary, ImportSummary { added_active: 2, added_archived: 2 });
    assert_eq!(ids(&store.get_active().await.unwrap()), ids(&[ticket(1), ticket(4)]));
    assert_eq!(ids(&store.get_archived().await.unwrap()), ids(&[ticket(2), ticket(3)]));
}

#[tokio::test]
async fn archived_import_retires_local_active_ticket() {
    let store = seeded_store(2).await;
    let payload = ImportPayload::Partitioned {
        active: vec![],
        archived: vec![record(1)],
    };

    let summary = store.import_tickets(payload).await.unwrap();
    assert_eq!(summary, ImportSummary { added_active: 0, added_archived: 1 });
    assert_eq!(ids(&store.get_active().await.unwrap()), ids(&[ticket(2)]));
    let archived = store.get_archived().await.unwrap();
    assert_eq!(ids(&archived), ids(&[ticket(1)]));
    assert!(archived[0].consumed_at.is_some());
}

#[tokio::test]
async fn import_never_resurrects_archived_ticket() {
    let store = seeded_store(1).await;
    let handle = store.reserve_tickets(1).await.unwrap();
    store.commit_reservation(handle).await.unwrap();

    let summary = store
        .import_tickets(ImportPayload::Flat(vec![record(1)]))
        .await
        .unwrap();
    assert_eq!(summary, ImportSummary::default());
    assert!(store.get_active().await.unwrap().is_empty());
}

#[tokio::test]
async fn import_accepts_standard_base64_and_millis() {
    let payload = ImportPayload::from_json(
        &json!([{
            "blindedRequest": "AQID",
            "signedResponse": "BAUG",
            "finalizedTicket": "BwgJ+g==",
            "createdAt": 1_767_225_600_000i64,
        }])
        .to_string(),
    )
    .unwrap();

    let store = memory_store().await;
    assert_eq!(store.import_tickets(payload).await.unwrap().added_active, 1);
    let active = store.get_active().await.unwrap();
    assert_eq!(encoding::encode(&active[0].finalized_ticket), "BwgJ-g");
}

#[tokio::test]
async fn unreadable_records_are_skipped() {
    let payload = ImportPayload::Flat(vec![json!("garbage"), json!({ "nope": 1 }), record(9)]);
    let store = memory_store().await;
    let summary = store.import_tickets(payload).await.unwrap();
    assert_eq!(summary.added_active, 1);
    assert_eq!(ids(&store.get_active().await.unwrap()), ids(&tickets(9)[8..]));
}
