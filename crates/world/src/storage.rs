use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::trace;

use crate::{Chunk, ChunkPosition};

/// Default number of unmodified stored chunks kept before eviction.
pub const DEFAULT_STORED_CAPACITY: usize = 4096;

/// Chunk arena split into the loaded working set and out-of-view storage.
///
/// A position lives in at most one of the two maps. Both use `BTreeMap` so
/// that iteration order is identical on every peer. Unmodified stored chunks
/// are evicted least-recently-used once `stored_capacity` is exceeded; a
/// modified chunk is never evicted.
pub struct ChunkStore {
    loaded: BTreeMap<ChunkPosition, Chunk>,
    stored: BTreeMap<ChunkPosition, Chunk>,
    stored_lru: LruCache<ChunkPosition, ()>,
    stored_capacity: usize,
}

impl Default for ChunkStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORED_CAPACITY)
    }
}

impl ChunkStore {
    pub fn new(stored_capacity: usize) -> Self {
        Self {
            loaded: BTreeMap::new(),
            stored: BTreeMap::new(),
            stored_lru: LruCache::unbounded(),
            stored_capacity: NonZeroUsize::new(stored_capacity)
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        }
    }

    pub fn loaded_len(&self) -> usize {
        self.loaded.len()
    }

    pub fn stored_len(&self) -> usize {
        self.stored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty() && self.stored.is_empty()
    }

    #[inline]
    pub fn is_loaded(&self, pos: ChunkPosition) -> bool {
        self.loaded.contains_key(&pos)
    }

    #[inline]
    pub fn is_stored(&self, pos: ChunkPosition) -> bool {
        self.stored.contains_key(&pos)
    }

    /// Whether the chunk exists in either map.
    #[inline]
    pub fn contains(&self, pos: ChunkPosition) -> bool {
        self.is_loaded(pos) || self.is_stored(pos)
    }

    /// Fetch from whichever map holds the chunk.
    pub fn get(&self, pos: ChunkPosition) -> Option<&Chunk> {
        self.loaded.get(&pos).or_else(|| self.stored.get(&pos))
    }

    pub fn get_mut(&mut self, pos: ChunkPosition) -> Option<&mut Chunk> {
        if let Some(chunk) = self.loaded.get_mut(&pos) {
            return Some(chunk);
        }
        if self.stored.contains_key(&pos) {
            self.stored_lru.promote(&pos);
        }
        self.stored.get_mut(&pos)
    }

    pub fn get_loaded(&self, pos: ChunkPosition) -> Option<&Chunk> {
        self.loaded.get(&pos)
    }

    pub fn get_loaded_mut(&mut self, pos: ChunkPosition) -> Option<&mut Chunk> {
        self.loaded.get_mut(&pos)
    }

    /// Place a chunk in the working set, taking it out of storage if present.
    pub fn insert_loaded(&mut self, chunk: Chunk) {
        let pos = chunk.position();
        if self.stored.remove(&pos).is_some() {
            self.stored_lru.pop(&pos);
        }
        self.loaded.insert(pos, chunk);
    }

    /// Place a chunk in storage. If the position is currently loaded the
    /// loaded copy is replaced instead, keeping the maps disjoint.
    pub fn insert_stored(&mut self, chunk: Chunk) {
        let pos = chunk.position();
        if let Some(slot) = self.loaded.get_mut(&pos) {
            *slot = chunk;
            return;
        }
        self.stored.insert(pos, chunk);
        self.stored_lru.put(pos, ());
        self.evict_if_needed();
    }

    /// Move a stored chunk into the working set.
    pub fn promote(&mut self, pos: ChunkPosition) -> bool {
        let Some(chunk) = self.stored.remove(&pos) else {
            return false;
        };
        self.stored_lru.pop(&pos);
        self.loaded.insert(pos, chunk);
        true
    }

    /// Move a loaded chunk into storage.
    pub fn demote(&mut self, pos: ChunkPosition) -> bool {
        let Some(chunk) = self.loaded.remove(&pos) else {
            return false;
        };
        self.stored.insert(pos, chunk);
        self.stored_lru.put(pos, ());
        self.evict_if_needed();
        true
    }

    /// Drop a loaded chunk entirely.
    pub fn remove_loaded(&mut self, pos: ChunkPosition) -> Option<Chunk> {
        self.loaded.remove(&pos)
    }

    pub fn loaded_positions(&self) -> impl Iterator<Item = ChunkPosition> + '_ {
        self.loaded.keys().copied()
    }

    pub fn stored_positions(&self) -> impl Iterator<Item = ChunkPosition> + '_ {
        self.stored.keys().copied()
    }

    /// Every resident position, loaded first.
    pub fn all_positions(&self) -> impl Iterator<Item = ChunkPosition> + '_ {
        self.loaded_positions().chain(self.stored_positions())
    }

    pub fn loaded(&self) -> impl Iterator<Item = &Chunk> {
        self.loaded.values()
    }

    pub fn loaded_mut(&mut self) -> impl Iterator<Item = &mut Chunk> {
        self.loaded.values_mut()
    }

    /// True when no position appears in both maps.
    pub fn is_consistent(&self) -> bool {
        self.loaded.keys().all(|pos| !self.stored.contains_key(pos))
    }

    fn evict_if_needed(&mut self) {
        let excess = self.stored.len().saturating_sub(self.stored_capacity);
        if excess == 0 {
            return;
        }
        let victims: Vec<ChunkPosition> = self
            .stored_lru
            .iter()
            .rev()
            .map(|(pos, _)| *pos)
            .filter(|pos| self.stored.get(pos).map(|c| !c.is_modified()).unwrap_or(true))
            .take(excess)
            .collect();
        for pos in victims {
            trace!(chunk = %pos, "evicting stored chunk");
            self.stored_lru.pop(&pos);
            self.stored.remove(&pos);
        }
    }
}
