//! Runtime reservations.
//!
//! A reservation is a time-boxed claim on active tickets. Handles in one
//! process share a [`ReservationMap`]. Processes sharing one storage
//! directory see each other's claims through [`SharedReservations`], a
//! separate record keyed by ticket that never touches the ticket records.
//! Once `reservation_timeout` passes a claim is void either way, so a
//! crashed holder blocks its tickets for at most that long.

use crate::error::StoreResult;
use chrono::Utc;
use inferticket_types::{encoding, Ticket};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

/// Key holding the cross-process reservation record.
pub const RESERVATIONS_KEY: &str = "tickets-reservations";

#[derive(Debug, Clone)]
struct Entry {
    handle_id: Uuid,
    owner: String,
    reserved_at: Instant,
}

/// Claims held by redeemers in this process, keyed by finalized ticket.
///
/// Share one map between every [`TicketStore`](crate::TicketStore) handle
/// that should see each other's reservations.
#[derive(Debug, Default)]
pub struct ReservationMap {
    entries: Mutex<HashMap<Vec<u8>, Entry>>,
}

impl ReservationMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<Vec<u8>, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true if `id` is held by a reservation younger than `timeout`.
    pub(crate) fn is_held(&self, id: &[u8], now: Instant, timeout: Duration) -> bool {
        self.entries()
            .get(id)
            .is_some_and(|e| now.saturating_duration_since(e.reserved_at) < timeout)
    }

    /// Records `handle` as the holder of its tickets, replacing expired claims.
    pub(crate) fn hold(&self, handle: &ReservationHandle) {
        let mut entries = self.entries();
        for ticket in &handle.tickets {
            entries.insert(
                ticket.finalized_ticket.clone(),
                Entry {
                    handle_id: handle.id,
                    owner: handle.owner.clone(),
                    reserved_at: handle.reserved_at,
                },
            );
        }
    }

    /// Drops the entries still owned by `handle_id`. Returns how many.
    pub(crate) fn release(&self, handle_id: Uuid) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| e.handle_id != handle_id);
        before - entries.len()
    }

    /// Drops entries for `ids` whoever holds them.
    pub(crate) fn remove_all(&self, ids: &HashSet<Vec<u8>>) {
        self.entries().retain(|id, _| !ids.contains(id));
    }

    /// Drops entries for tickets that are no longer active.
    pub(crate) fn retain_active(&self, active: &HashSet<Vec<u8>>) {
        self.entries().retain(|id, _| active.contains(id));
    }

    /// Returns the owner currently recorded for `id`, live or expired.
    #[must_use]
    pub fn owner_of(&self, id: &[u8]) -> Option<String> {
        self.entries().get(id).map(|e| e.owner.clone())
    }
}

/// Proof of a reservation, returned by `reserve_tickets`.
///
/// Not `Clone`: committing or releasing consumes it, so each reservation
/// ends in exactly one of the two.
#[derive(Debug)]
#[must_use = "a reservation must be committed or released"]
pub struct ReservationHandle {
    id: Uuid,
    owner: String,
    reserved_at: Instant,
    tickets: Vec<Ticket>,
}

impl ReservationHandle {
    pub(crate) fn new(owner: String, tickets: Vec<Ticket>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            reserved_at: Instant::now(),
            tickets,
        }
    }

    /// Unique id of this reservation.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Actor that made the reservation.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// When the reservation was taken.
    #[must_use]
    pub fn reserved_at(&self) -> Instant {
        self.reserved_at
    }

    /// The reserved tickets, in selection order.
    #[must_use]
    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    /// Number of reserved tickets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    /// Always false for a handle returned by the store.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    pub(crate) fn ids(&self) -> HashSet<Vec<u8>> {
        self.tickets.iter().map(|t| t.finalized_ticket.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SharedEntry {
    holder: Uuid,
    handle: Uuid,
    owner: String,
    reserved_at_ms: i64,
}

/// Claims visible to every process using the same storage.
///
/// Keyed by the encoded finalized ticket. Entries written by this process
/// (same `holder`) defer to the in-process [`ReservationMap`]; entries from
/// other holders expire on the wall clock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct SharedReservations {
    entries: BTreeMap<String, SharedEntry>,
}

fn timeout_ms(timeout: Duration) -> i64 {
    i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX)
}

impl SharedReservations {
    /// Decodes the stored record; an unreadable record holds nothing.
    pub fn from_value(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::default(),
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Ignoring unreadable reservation record: {}", e);
                Self::default()
            }),
        }
    }

    pub fn to_value(&self) -> StoreResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// True if another holder has a live claim on `id`.
    pub fn is_held_elsewhere(&self, id: &[u8], holder: Uuid, timeout: Duration) -> bool {
        let now_ms = Utc::now().timestamp_millis();
        self.entries.get(&encoding::encode(id)).is_some_and(|e| {
            e.holder != holder && now_ms.saturating_sub(e.reserved_at_ms) < timeout_ms(timeout)
        })
    }

    /// Drops claims on inactive tickets, expired foreign claims, and our
    /// own claims the in-process map no longer holds. Returns true if
    /// anything was dropped.
    pub fn prune(
        &mut self,
        active: &HashSet<Vec<u8>>,
        holder: Uuid,
        local: &ReservationMap,
        now: Instant,
        timeout: Duration,
    ) -> bool {
        let active: HashSet<String> = active.iter().map(|id| encoding::encode(id)).collect();
        let now_ms = Utc::now().timestamp_millis();
        let before = self.entries.len();
        self.entries.retain(|key, e| {
            if !active.contains(key) {
                return false;
            }
            if e.holder == holder {
                encoding::decode(key).is_ok_and(|id| local.is_held(&id, now, timeout))
            } else {
                now_ms.saturating_sub(e.reserved_at_ms) < timeout_ms(timeout)
            }
        });
        self.entries.len() != before
    }

    /// Records `handle`'s tickets as held by `holder`.
    pub fn record(&mut self, handle: &ReservationHandle, holder: Uuid) {
        let reserved_at_ms = Utc::now().timestamp_millis();
        for ticket in &handle.tickets {
            self.entries.insert(
                ticket.encoded(),
                SharedEntry {
                    holder,
                    handle: handle.id,
                    owner: handle.owner.clone(),
                    reserved_at_ms,
                },
            );
        }
    }

    /// Drops the claims made under `handle_id`. Returns true if any were.
    pub fn remove_handle(&mut self, handle_id: Uuid) -> bool {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.handle != handle_id);
        self.entries.len() != before
    }

    /// Drops claims on `ids` whoever holds them. Returns true if any were.
    pub fn remove_all(&mut self, ids: &HashSet<Vec<u8>>) -> bool {
        let before = self.entries.len();
        for id in ids {
            self.entries.remove(&encoding::encode(id));
        }
        self.entries.len() != before
    }
}
