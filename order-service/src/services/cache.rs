//! Bounded TTL cache and the cached room directory built on it.

use async_trait::async_trait;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::repository::{RoomDirectory, StoreError};
use crate::models::Room;

/// Key to `(value, inserted_at)` map. Entries older than `ttl` read as
/// absent and are purged on access; inserting past `capacity` evicts the
/// oldest entry.
pub struct TtlCache<K, V> {
    entries: DashMap<K, (V, Instant)>,
    ttl: Duration,
    capacity: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let fresh = self.entries.get(key).and_then(|entry| {
            let (value, inserted_at) = entry.value();
            (inserted_at.elapsed() < self.ttl).then(|| value.clone())
        });
        if fresh.is_none() {
            self.entries.remove_if(key, |_, (_, inserted_at)| {
                inserted_at.elapsed() >= self.ttl
            });
        }
        fresh
    }

    pub fn insert(&self, key: K, value: V) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.purge_expired();
            if self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
        }
        self.entries.insert(key, (value, Instant::now()));
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, (_, inserted_at)| inserted_at.elapsed() < ttl);
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().1)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

/// Room lookups through a [`TtlCache`]. Missing rooms are not cached.
pub struct CachedRoomDirectory {
    inner: Arc<dyn RoomDirectory>,
    cache: TtlCache<String, Room>,
}

impl CachedRoomDirectory {
    pub fn new(inner: Arc<dyn RoomDirectory>, cache: TtlCache<String, Room>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl RoomDirectory for CachedRoomDirectory {
    async fn find_room(&self, id: &str) -> Result<Option<Room>, StoreError> {
        let key = id.to_string();
        if let Some(room) = self.cache.get(&key) {
            return Ok(Some(room));
        }

        let room = self.inner.find_room(id).await?;
        if let Some(room) = &room {
            self.cache.insert(key, room.clone());
        }
        Ok(room)
    }
}
