use dashmap::DashMap;
use std::hash::Hash;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

/// One client's relay path: a dedicated socket connected to the target.
#[derive(Debug)]
pub struct UdpSession {
    pub client_addr: SocketAddr,
    pub outbound: Arc<UdpSocket>,
    pub cancel: CancellationToken,
    pub created_at: Instant,
}

impl UdpSession {
    pub fn new(client_addr: SocketAddr, outbound: UdpSocket, cancel: CancellationToken) -> Self {
        Self {
            client_addr,
            outbound: Arc::new(outbound),
            cancel,
            created_at: Instant::now(),
        }
    }
}

#[derive(Debug)]
struct Slot<V> {
    generation: u64,
    value: Arc<V>,
}

/// Insert-on-miss, evict-on-idle keyed store.
///
/// Every insert gets a fresh generation. Eviction names the generation it
/// expects, so an idle timer belonging to a replaced entry cannot remove its
/// successor.
#[derive(Debug)]
pub struct SessionStore<K, V>
where
    K: Eq + Hash,
{
    slots: DashMap<K, Slot<V>>,
    next_generation: AtomicU64,
}

impl<K, V> Default for SessionStore<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            slots: DashMap::new(),
            next_generation: AtomicU64::new(0),
        }
    }
}

impl<K, V> SessionStore<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<(u64, Arc<V>)> {
        self.slots
            .get(key)
            .map(|slot| (slot.generation, slot.value.clone()))
    }

    /// Store `value` under `key`, replacing any previous entry.
    /// Returns the generation of the new entry.
    pub fn insert(&self, key: K, value: Arc<V>) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let replaced = self.slots.insert(key, Slot { generation, value });
        if replaced.is_none() {
            crate::telemetry::session_opened();
        }
        generation
    }

    /// Remove `key` only if it still holds `generation`.
    pub fn evict(&self, key: &K, generation: u64) -> bool {
        let removed = self
            .slots
            .remove_if(key, |_, slot| slot.generation == generation)
            .is_some();
        if removed {
            crate::telemetry::session_closed();
        }
        removed
    }

    /// Drop every entry, returning how many were removed.
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        self.slots.retain(|_, _| {
            removed += 1;
            false
        });
        for _ in 0..removed {
            crate::telemetry::session_closed();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

pub type UdpSessionTable = SessionStore<SocketAddr, UdpSession>;
