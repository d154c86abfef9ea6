//! The ticket store.

use crate::error::{StoreError, StoreResult};
use crate::kv::KeyValueStore;
use crate::lock::{LockGuard, LockProvider};
use crate::notify::{ChangeBus, TicketsChanged};
use crate::records::{
    self, Loaded, Partitions, ACTIVE_KEY, ARCHIVE_KEY, LEGACY_KEY, UNREADABLE_KEY,
};
use crate::reservation::{ReservationHandle, ReservationMap, SharedReservations, RESERVATIONS_KEY};
use chrono::{DateTime, Utc};
use inferticket_types::{Ticket, TicketCounts};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// A reservation older than this is considered abandoned.
    pub reservation_timeout: Duration,
    /// Name of the exclusive lock guarding the partitions.
    pub lock_name: String,
    /// Identifies this actor in reservation entries.
    pub owner: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            reservation_timeout: Duration::from_secs(5),
            lock_name: "inferticket-tickets".to_string(),
            owner: format!("actor-{}", uuid::Uuid::new_v4().simple()),
        }
    }
}

/// In-process coordination state shared between store handles.
///
/// Handles cloned from one `Coordination` act as a single holder toward
/// other processes using the same storage.
#[derive(Debug, Clone)]
pub struct Coordination {
    /// Runtime reservations.
    pub reservations: Arc<ReservationMap>,
    /// Change notification channel.
    pub changes: ChangeBus,
    holder: Uuid,
}

impl Default for Coordination {
    fn default() -> Self {
        Self {
            reservations: Arc::default(),
            changes: ChangeBus::default(),
            holder: Uuid::new_v4(),
        }
    }
}

impl Coordination {
    /// Identifies this coordination group in the shared reservation record.
    #[must_use]
    pub fn holder(&self) -> Uuid {
        self.holder
    }
}

/// Outcome of an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Tickets newly added to the active partition.
    pub added_active: usize,
    /// Tickets newly added to (or moved into) the archive.
    pub added_archived: usize,
}

/// Partitioned snapshot suitable for backup and [`TicketStore::import_tickets`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketExport {
    /// Format version.
    pub version: u32,
    /// When the export was taken.
    pub exported_at: DateTime<Utc>,
    /// Active tickets.
    pub active: Vec<Ticket>,
    /// Archived tickets.
    pub archived: Vec<Ticket>,
}

/// Records accepted by [`TicketStore::import_tickets`].
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ImportPayload {
    /// A flat list of records classified by their status fields.
    Flat(Vec<Value>),
    /// An export, or any object with `active` / `archived` lists.
    Partitioned {
        #[serde(default)]
        active: Vec<Value>,
        #[serde(default, alias = "archive")]
        archived: Vec<Value>,
    },
}

impl ImportPayload {
    /// Parses a payload from JSON text.
    pub fn from_json(text: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl From<TicketExport> for ImportPayload {
    fn from(export: TicketExport) -> Self {
        let to_values = |tickets: Vec<Ticket>| {
            tickets
                .into_iter()
                .filter_map(|t| serde_json::to_value(t).ok())
                .collect()
        };
        Self::Partitioned {
            active: to_values(export.active),
            archived: to_values(export.archived),
        }
    }
}

/// Durable repository of tickets in two partitions, active and archived.
///
/// Every mutation holds the configured lock across read-modify-write and
/// re-reads storage first, so a handle never acts on a stale snapshot.
pub struct TicketStore {
    kv: Arc<dyn KeyValueStore>,
    lock: Arc<dyn LockProvider>,
    config: StoreConfig,
    coordination: Coordination,
}

impl TicketStore {
    /// Opens a store with private coordination state.
    pub async fn open(
        kv: Arc<dyn KeyValueStore>,
        lock: Arc<dyn LockProvider>,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        Self::open_with(kv, lock, config, Coordination::default()).await
    }

    /// Opens a store sharing `coordination` with other handles.
    ///
    /// Migrates legacy records under the lock before returning.
    pub async fn open_with(
        kv: Arc<dyn KeyValueStore>,
        lock: Arc<dyn LockProvider>,
        config: StoreConfig,
        coordination: Coordination,
    ) -> StoreResult<Self> {
        let store = Self {
            kv,
            lock,
            config,
            coordination,
        };
        let _guard = store.acquire().await?;
        store.load_locked().await?;
        Ok(store)
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the coordination state, for opening sibling handles.
    #[must_use]
    pub fn coordination(&self) -> &Coordination {
        &self.coordination
    }

    /// Subscribes to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TicketsChanged> {
        self.coordination.changes.subscribe()
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Snapshot of the active partition.
    pub async fn get_active(&self) -> StoreResult<Vec<Ticket>> {
        Ok(self.load().await?.partitions.active)
    }

    /// Snapshot of the archive.
    pub async fn get_archived(&self) -> StoreResult<Vec<Ticket>> {
        Ok(self.load().await?.partitions.archived)
    }

    /// Partition sizes and live reservation count.
    ///
    /// Reservations held by other processes sharing the storage count too.
    pub async fn counts(&self) -> StoreResult<TicketCounts> {
        let partitions = self.load().await?.partitions;
        let shared = self.load_shared().await?;
        let now = Instant::now();
        let reserved = partitions
            .active
            .iter()
            .filter(|t| self.is_reserved(t.id(), &shared, now))
            .count();
        Ok(TicketCounts {
            active: partitions.active.len(),
            reserved,
            archived: partitions.archived.len(),
        })
    }

    /// Partitioned snapshot for backup.
    pub async fn export_tickets(&self) -> StoreResult<TicketExport> {
        let partitions = self.load().await?.partitions;
        Ok(TicketExport {
            version: 1,
            exported_at: Utc::now(),
            active: partitions.active,
            archived: partitions.archived,
        })
    }

    // ── Mutations ────────────────────────────────────────────────

    /// Appends new tickets to the active partition.
    ///
    /// Tickets already active or archived, and duplicates within `tickets`,
    /// are dropped. Returns how many were added.
    pub async fn add_tickets(&self, tickets: Vec<Ticket>) -> StoreResult<usize> {
        let _guard = self.acquire().await?;
        let mut partitions = self.load_locked().await?;

        let mut seen: HashSet<Vec<u8>> = partitions.active_ids();
        seen.extend(partitions.archived_ids());

        let mut added = 0;
        for mut ticket in tickets {
            if seen.insert(ticket.finalized_ticket.clone()) {
                ticket.consumed_at = None;
                partitions.active.push(ticket);
                added += 1;
            }
        }

        if added > 0 {
            self.persist(&partitions).await?;
            self.coordination.changes.notify();
        }
        debug!("Added {} tickets ({} active)", added, partitions.active.len());
        Ok(added)
    }

    /// Reserves `n` active tickets for the caller.
    ///
    /// Picks the first `n` tickets in insertion order that carry no live
    /// reservation. Fails without side effects when fewer qualify.
    pub async fn reserve_tickets(&self, n: usize) -> StoreResult<ReservationHandle> {
        if n == 0 {
            return Err(StoreError::InvalidRequest(
                "cannot reserve zero tickets".to_string(),
            ));
        }

        let _guard = self.acquire().await?;
        let partitions = self.load_locked().await?;
        let active_ids = partitions.active_ids();
        let reservations = &self.coordination.reservations;
        reservations.retain_active(&active_ids);

        let now = Instant::now();
        let mut shared = self.load_shared().await?;
        let pruned = shared.prune(
            &active_ids,
            self.coordination.holder(),
            reservations,
            now,
            self.config.reservation_timeout,
        );
        let available: Vec<&Ticket> = partitions
            .active
            .iter()
            .filter(|t| !self.is_reserved(t.id(), &shared, now))
            .collect();

        if available.len() < n {
            if pruned {
                self.save_shared(&shared).await?;
            }
            return Err(StoreError::InsufficientTickets {
                requested: n,
                available: available.len(),
            });
        }

        let picked = available.into_iter().take(n).cloned().collect();
        let handle = ReservationHandle::new(self.config.owner.clone(), picked);
        shared.record(&handle, self.coordination.holder());
        self.save_shared(&shared).await?;
        reservations.hold(&handle);
        debug!("Reserved {} tickets under {}", handle.len(), handle.id());
        Ok(handle)
    }

    /// Archives the reserved tickets and ends the reservation.
    ///
    /// Tickets another actor already archived are skipped. Returns how many
    /// tickets this call moved into the archive.
    pub async fn commit_reservation(&self, handle: ReservationHandle) -> StoreResult<usize> {
        let _guard = self.acquire().await?;
        let mut partitions = self.load_locked().await?;
        let ids = handle.ids();

        let now = Utc::now();
        let (consumed, remaining): (Vec<Ticket>, Vec<Ticket>) = partitions
            .active
            .drain(..)
            .partition(|t| ids.contains(t.id()));
        partitions.active = remaining;
        let archived = consumed.len();
        partitions
            .archived
            .extend(consumed.into_iter().map(|t| t.into_consumed(now)));

        if archived > 0 {
            self.persist(&partitions).await?;
        }
        self.coordination.reservations.remove_all(&ids);
        let mut shared = self.load_shared().await?;
        if shared.remove_all(&ids) {
            self.save_shared(&shared).await?;
        }
        if archived > 0 {
            self.coordination.changes.notify();
        }

        if archived < handle.len() {
            warn!(
                "Reservation {} committed {} of {} tickets; the rest were already archived",
                handle.id(),
                archived,
                handle.len()
            );
        } else {
            debug!("Committed reservation {} ({} tickets)", handle.id(), archived);
        }
        Ok(archived)
    }

    /// Ends a reservation without touching the partitions.
    ///
    /// The in-process claim is dropped even if the shared record cannot be
    /// updated; other processes then see the tickets free once the claim
    /// times out.
    pub async fn release_reservation(&self, handle: ReservationHandle) -> StoreResult<()> {
        let released = self.coordination.reservations.release(handle.id());
        debug!("Released reservation {} ({} entries)", handle.id(), released);

        let _guard = self.acquire().await?;
        let mut shared = self.load_shared().await?;
        if shared.remove_handle(handle.id()) {
            self.save_shared(&shared).await?;
        }
        Ok(())
    }

    /// Merges imported records into the partitions.
    ///
    /// Archived records win: one that is locally active moves to the
    /// archive, and an archived ticket never returns to the active
    /// partition. Importing the same payload twice adds nothing.
    pub async fn import_tickets(&self, payload: ImportPayload) -> StoreResult<ImportSummary> {
        let now = Utc::now();
        let mut incoming_active = Vec::new();
        let mut incoming_archived = Vec::new();

        match payload {
            ImportPayload::Partitioned { active, archived } => {
                for c in active.into_iter().filter_map(|r| records::classify(r, now).ok()) {
                    if c.archived {
                        incoming_archived.push(c.ticket);
                    } else {
                        incoming_active.push(c.ticket);
                    }
                }
                incoming_archived.extend(
                    archived
                        .into_iter()
                        .filter_map(|r| records::classify(r, now).ok())
                        .map(|c| c.ticket.into_consumed(now)),
                );
            }
            ImportPayload::Flat(items) => {
                for c in items.into_iter().filter_map(|r| records::classify(r, now).ok()) {
                    if c.archived {
                        incoming_archived.push(c.ticket);
                    } else {
                        incoming_active.push(c.ticket);
                    }
                }
            }
        }

        let _guard = self.acquire().await?;
        let mut partitions = self.load_locked().await?;
        let mut summary = ImportSummary::default();

        let mut archived_ids = partitions.archived_ids();
        let mut retired = HashSet::new();
        for ticket in incoming_archived {
            if !archived_ids.insert(ticket.finalized_ticket.clone()) {
                continue;
            }
            retired.insert(ticket.finalized_ticket.clone());
            partitions.archived.push(ticket);
            summary.added_archived += 1;
        }
        if !retired.is_empty() {
            partitions.active.retain(|t| !retired.contains(t.id()));
            self.coordination.reservations.remove_all(&retired);
            let mut shared = self.load_shared().await?;
            if shared.remove_all(&retired) {
                self.save_shared(&shared).await?;
            }
        }

        let mut active_ids = partitions.active_ids();
        for mut ticket in incoming_active {
            let id = ticket.finalized_ticket.clone();
            if archived_ids.contains(&id) || !active_ids.insert(id) {
                continue;
            }
            ticket.consumed_at = None;
            partitions.active.push(ticket);
            summary.added_active += 1;
        }

        if summary != ImportSummary::default() {
            self.persist(&partitions).await?;
            self.coordination.changes.notify();
        }
        info!(
            "Imported tickets: {} active, {} archived",
            summary.added_active, summary.added_archived
        );
        Ok(summary)
    }

    // ── Internals ────────────────────────────────────────────────

    async fn acquire(&self) -> StoreResult<LockGuard> {
        self.lock.acquire(&self.config.lock_name).await
    }

    fn is_reserved(&self, id: &[u8], shared: &SharedReservations, now: Instant) -> bool {
        let timeout = self.config.reservation_timeout;
        self.coordination.reservations.is_held(id, now, timeout)
            || shared.is_held_elsewhere(id, self.coordination.holder(), timeout)
    }

    async fn load_shared(&self) -> StoreResult<SharedReservations> {
        Ok(SharedReservations::from_value(
            self.kv.get(RESERVATIONS_KEY).await?,
        ))
    }

    async fn save_shared(&self, shared: &SharedReservations) -> StoreResult<()> {
        self.kv.set(RESERVATIONS_KEY, shared.to_value()?).await
    }

    async fn load(&self) -> StoreResult<Loaded> {
        let active = self.kv.get(ACTIVE_KEY).await?;
        let archived = self.kv.get(ARCHIVE_KEY).await?;
        let legacy = self.kv.get(LEGACY_KEY).await?;
        Ok(records::normalize(active, archived, legacy, Utc::now()))
    }

    /// Loads with the lock held, writing back any migration.
    async fn load_locked(&self) -> StoreResult<Partitions> {
        let loaded = self.load().await?;
        if loaded.migrated {
            // Set aside first so a failed rewrite cannot lose a record.
            if !loaded.unreadable.is_empty() {
                self.set_aside(loaded.unreadable).await?;
            }
            info!(
                "Migrating ticket records ({} active, {} archived)",
                loaded.partitions.active.len(),
                loaded.partitions.archived.len()
            );
            self.persist(&loaded.partitions).await?;
            if loaded.had_legacy {
                self.kv.set(LEGACY_KEY, Value::Array(Vec::new())).await?;
            }
        }
        Ok(loaded.partitions)
    }

    /// Appends raw records to the unreadable list, skipping ones already there.
    async fn set_aside(&self, records: Vec<Value>) -> StoreResult<()> {
        let mut kept = match self.kv.get(UNREADABLE_KEY).await? {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => vec![other],
        };
        let before = kept.len();
        for record in records {
            if !kept.contains(&record) {
                kept.push(record);
            }
        }
        if kept.len() > before {
            warn!(
                "Set aside {} unreadable ticket records under {}",
                kept.len() - before,
                UNREADABLE_KEY
            );
            self.kv.set(UNREADABLE_KEY, Value::Array(kept)).await?;
        }
        Ok(())
    }

    /// Writes both partitions, archive first: a crash in between leaves a
    /// ticket in both lists, which the next load resolves toward the archive.
    async fn persist(&self, partitions: &Partitions) -> StoreResult<()> {
        self.kv
            .set(ARCHIVE_KEY, serde_json::to_value(&partitions.archived)?)
            .await?;
        self.kv
            .set(ACTIVE_KEY, serde_json::to_value(&partitions.active)?)
            .await
    }
}
