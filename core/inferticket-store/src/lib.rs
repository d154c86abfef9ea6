//! Durable ticket store for inference tickets.
//!
//! Tickets live in two persisted partitions, `tickets-active` and
//! `tickets-archive`, behind a plain get/set [`KeyValueStore`]. All mutating
//! operations run under a named exclusive lock from a [`LockProvider`] and
//! re-read storage before deciding anything.
//!
//! # Lifecycle
//!
//! - **Active**: in the active partition and not held by a live reservation
//! - **Reserved**: held by one redeemer in the runtime [`ReservationMap`],
//!   mirrored under [`RESERVATIONS_KEY`] for other processes; expires after
//!   `reservation_timeout`
//! - **Archived**: moved to the archive with `consumed_at` set; terminal
//!
//! Reservation state never enters the ticket records. A crash
//! mid-redemption can at worst block a ticket until its reservation expires.

mod error;
mod kv;
mod lock;
mod notify;
mod records;
mod reservation;
mod store;

pub use error::{StoreError, StoreResult};
pub use kv::{JsonFileKv, KeyValueStore, MemoryKv};
pub use lock::{FileLock, FileLockConfig, InProcessLock, LockGuard, LockProvider};
pub use notify::{ChangeBus, TicketsChanged};
pub use records::{ACTIVE_KEY, ARCHIVE_KEY, LEGACY_KEY, UNREADABLE_KEY};
pub use reservation::{ReservationHandle, ReservationMap, RESERVATIONS_KEY};
pub use store::{Coordination, ImportPayload, ImportSummary, StoreConfig, TicketExport, TicketStore};
