//! Persisted partition format and legacy migration.
//!
//! Older clients kept one flat list with `used` / `reserved` / `reservedAt`
//! flags mutated in place. Those flags are folded into the partition split
//! on read: used records move to the archive, reservation flags are dropped.
//! Records that cannot be decoded are set aside under [`UNREADABLE_KEY`]
//! exactly as stored, never discarded.

use chrono::{DateTime, Utc};
use inferticket_types::Ticket;
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

/// Key holding the active partition.
pub const ACTIVE_KEY: &str = "tickets-active";

/// Key holding the archive partition.
pub const ARCHIVE_KEY: &str = "tickets-archive";

/// Key used by clients that predate the partition split.
pub const LEGACY_KEY: &str = "tickets";

/// Key collecting raw records that could not be decoded.
pub const UNREADABLE_KEY: &str = "tickets-unreadable";

const LEGACY_FLAGS: [&str; 4] = ["used", "reserved", "reservedAt", "reservedBy"];

/// Both partitions, in insertion order.
#[derive(Debug, Clone, Default)]
pub(crate) struct Partitions {
    pub active: Vec<Ticket>,
    pub archived: Vec<Ticket>,
}

impl Partitions {
    pub fn archived_ids(&self) -> HashSet<Vec<u8>> {
        self.archived.iter().map(|t| t.finalized_ticket.clone()).collect()
    }

    pub fn active_ids(&self) -> HashSet<Vec<u8>> {
        self.active.iter().map(|t| t.finalized_ticket.clone()).collect()
    }
}

/// Partitions read from storage, plus whether normalizing changed them.
#[derive(Debug, Default)]
pub(crate) struct Loaded {
    pub partitions: Partitions,
    pub migrated: bool,
    pub had_legacy: bool,
    /// Raw records to set aside before the partitions are rewritten.
    pub unreadable: Vec<Value>,
}

/// A decoded record and the partition its status fields place it in.
#[derive(Debug)]
pub(crate) struct Classified {
    pub ticket: Ticket,
    pub archived: bool,
    pub had_flags: bool,
}

/// Decodes one record, stripping legacy flags.
///
/// Records with `used: true` or a `consumedAt` stamp classify as archived;
/// archived tickets without a stamp get `now`. A record that does not
/// decode is handed back untouched.
pub(crate) fn classify(record: Value, now: DateTime<Utc>) -> Result<Classified, Value> {
    let original = record.clone();
    let mut record = record;
    let Some(object) = record.as_object_mut() else {
        warn!("Ticket record is not an object");
        return Err(original);
    };

    let used = object
        .get("used")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let mut had_flags = false;
    for flag in LEGACY_FLAGS {
        had_flags |= object.remove(flag).is_some();
    }

    match serde_json::from_value::<Ticket>(record) {
        Ok(ticket) => {
            let archived = used || ticket.is_consumed();
            let ticket = if archived { ticket.into_consumed(now) } else { ticket };
            Ok(Classified {
                ticket,
                archived,
                had_flags,
            })
        }
        Err(e) => {
            warn!("Unreadable ticket record: {}", e);
            Err(original)
        }
    }
}

fn records(value: Option<Value>, key: &str, unreadable: &mut Vec<Value>) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => {
            warn!("{} record is not a list", key);
            unreadable.push(other);
            Vec::new()
        }
    }
}

/// Builds normalized partitions from the three raw records.
///
/// Guarantees no ticket appears twice and none appears in both partitions;
/// on conflict the archive wins.
pub(crate) fn normalize(
    active: Option<Value>,
    archived: Option<Value>,
    legacy: Option<Value>,
    now: DateTime<Utc>,
) -> Loaded {
    let mut loaded = Loaded::default();
    let mut active_candidates = Vec::new();
    let mut archived_candidates = Vec::new();

    for record in records(archived, ARCHIVE_KEY, &mut loaded.unreadable) {
        let c = match classify(record, now) {
            Ok(c) => c,
            Err(raw) => {
                loaded.unreadable.push(raw);
                continue;
            }
        };
        // Anything found in the archive stays there.
        loaded.migrated |= c.had_flags || !c.archived;
        archived_candidates.push(c.ticket.into_consumed(now));
    }

    let legacy = records(legacy, LEGACY_KEY, &mut loaded.unreadable);
    loaded.had_legacy = !legacy.is_empty();
    loaded.migrated |= loaded.had_legacy;

    let active = records(active, ACTIVE_KEY, &mut loaded.unreadable);
    for record in active.into_iter().chain(legacy) {
        let c = match classify(record, now) {
            Ok(c) => c,
            Err(raw) => {
                loaded.unreadable.push(raw);
                continue;
            }
        };
        loaded.migrated |= c.had_flags;
        if c.archived {
            loaded.migrated = true;
            archived_candidates.push(c.ticket);
        } else {
            active_candidates.push(c.ticket);
        }
    }

    let mut seen = HashSet::new();
    for ticket in archived_candidates {
        if seen.insert(ticket.finalized_ticket.clone()) {
            loaded.partitions.archived.push(ticket);
        } else {
            loaded.migrated = true;
        }
    }
    for ticket in active_candidates {
        if seen.insert(ticket.finalized_ticket.clone()) {
            loaded.partitions.active.push(ticket);
        } else {
            loaded.migrated = true;
        }
    }

    loaded.migrated |= !loaded.unreadable.is_empty();
    loaded
}
