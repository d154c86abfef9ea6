//! Shared test helpers for store tests.

#![allow(dead_code)]

use inferticket_store::{
    Coordination, InProcessLock, KeyValueStore, LockProvider, MemoryKv, StoreConfig, TicketStore,
};
use inferticket_types::Ticket;
use std::sync::Arc;
use std::time::Duration;

/// A ticket whose identity is derived from `n`.
pub fn ticket(n: u8) -> Ticket {
    Ticket::new(vec![0xB0, n], vec![0x5E, n], vec![0xF1, n, n])
}

/// `count` distinct tickets starting at id 1.
pub fn tickets(count: u8) -> Vec<Ticket> {
    (1..=count).map(ticket).collect()
}

/// Store configuration with a recognizable owner and the default timeout.
pub fn config(owner: &str) -> StoreConfig {
    StoreConfig {
        owner: owner.to_string(),
        reservation_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

/// Backing pieces that several store handles can share.
pub struct Shared {
    pub kv: Arc<MemoryKv>,
    pub lock: Arc<InProcessLock>,
    pub coordination: Coordination,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            kv: Arc::new(MemoryKv::new()),
            lock: Arc::new(InProcessLock::new()),
            coordination: Coordination::default(),
        }
    }

    /// Opens a handle that shares storage, lock and reservations.
    pub async fn open(&self, owner: &str) -> TicketStore {
        TicketStore::open_with(
            self.kv.clone() as Arc<dyn KeyValueStore>,
            self.lock.clone() as Arc<dyn LockProvider>,
            config(owner),
            self.coordination.clone(),
        )
        .await
        .unwrap()
    }
}

/// Opens a fresh in-memory store.
pub async fn memory_store() -> TicketStore {
    Shared::new().open("tab-a").await
}

/// Opens a fresh in-memory store seeded with `count` active tickets.
pub async fn seeded_store(count: u8) -> TicketStore {
    let store = memory_store().await;
    store.add_tickets(tickets(count)).await.unwrap();
    store
}

/// Finalized ticket values of `list`.
pub fn ids(list: &[Ticket]) -> Vec<Vec<u8>> {
    list.iter().map(|t| t.finalized_ticket.clone()).collect()
}
