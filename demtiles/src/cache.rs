//! Bounded LRU cache of decoded tiles.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use tracing::debug;

use crate::decode::DecodedTile;
use crate::tile_id::CacheKey;

/// Decoded tiles kept in memory unless configured otherwise.
pub const DEFAULT_CACHE_SIZE: usize = 5;

/// Called with every tile the cache gives up, exactly once per tile.
pub type EvictionCallback = Box<dyn FnMut(CacheKey, DecodedTile) + Send>;

/// LRU cache owning decoded rasters.
///
/// A tile handed to [`TileCache::put`] is owned by the cache until it is
/// evicted, at which point it is moved into the eviction callback. Tiles
/// dropped by [`TileCache::clear`] do not go through the callback.
pub struct TileCache {
    /// Cached tiles indexed by key.
    tiles: HashMap<CacheKey, DecodedTile>,
    /// Access order for eviction (most recently used at the back).
    access_order: VecDeque<CacheKey>,
    capacity: usize,
    evictions: u64,
    on_evict: Option<EvictionCallback>,
}

impl TileCache {
    /// Create a cache holding up to `capacity` tiles (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            tiles: HashMap::with_capacity(capacity),
            access_order: VecDeque::with_capacity(capacity),
            capacity,
            evictions: 0,
            on_evict: None,
        }
    }

    /// Create a cache that passes evicted tiles to `on_evict`.
    pub fn with_eviction_callback<F>(capacity: usize, on_evict: F) -> Self
    where
        F: FnMut(CacheKey, DecodedTile) + Send + 'static,
    {
        let mut cache = Self::new(capacity);
        cache.on_evict = Some(Box::new(on_evict));
        cache
    }

    pub fn exists(&self, key: CacheKey) -> bool {
        self.tiles.contains_key(&key)
    }

    /// Look up a tile and mark it most recently used.
    pub fn get(&mut self, key: CacheKey) -> Option<&DecodedTile> {
        if self.tiles.contains_key(&key) {
            self.touch(key);
        }
        self.tiles.get(&key)
    }

    /// Insert a tile as most recently used.
    ///
    /// Evicts the least recently used tile when full. Replacing the tile of an
    /// existing key evicts the old tile.
    pub fn put(&mut self, key: CacheKey, tile: DecodedTile) {
        if let Some(old) = self.tiles.insert(key, tile) {
            self.touch(key);
            self.evict(key, old);
            return;
        }

        self.access_order.push_back(key);
        while self.tiles.len() > self.capacity {
            let Some(oldest) = self.access_order.pop_front() else {
                break;
            };
            if let Some(tile) = self.tiles.remove(&oldest) {
                self.evict(oldest, tile);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of tiles evicted so far.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Cached keys from least to most recently used.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.access_order.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.tiles.clear();
        self.access_order.clear();
    }

    fn touch(&mut self, key: CacheKey) {
        if let Some(pos) = self.access_order.iter().position(|k| *k == key) {
            self.access_order.remove(pos);
            self.access_order.push_back(key);
        }
    }

    fn evict(&mut self, key: CacheKey, tile: DecodedTile) {
        debug!(key = %key, bytes = tile.byte_size(), "evict tile");
        self.evictions += 1;
        if let Some(on_evict) = self.on_evict.as_mut() {
            on_evict(key, tile);
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl fmt::Debug for TileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileCache")
            .field("keys", &self.access_order)
            .field("capacity", &self.capacity)
            .field("evictions", &self.evictions)
            .finish_non_exhaustive()
    }
}
