//! Elevation service over one or more tile archives.
//!
//! This module provides [`ElevationService`], which resolves coordinates to
//! terrain-RGB elevations with an LRU cache of decoded tiles.
//!
//! ```no_run
//! use demtiles::ElevationService;
//!
//! let mut service = ElevationService::builder()
//!     .archive("/data/austria.pmtiles")
//!     .cache_size(5)
//!     .build()?;
//!
//! let info = service.resolve_elevation(47.12925176802318, 15.209778656353123);
//! println!("{:.1}m ({})", info.elevation, info.status);
//! # Ok::<(), demtiles::DemError>(())
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::buffer::ScratchBuffers;
use crate::cache::{TileCache, DEFAULT_CACHE_SIZE};
use crate::decode::decode_tile;
use crate::error::{DemError, Result};
use crate::pmtiles::{PmTilesArchive, DEFAULT_MAX_DIRECTORY_DEPTH};
use crate::projection::{lat_lon_to_tile, pixel_offset, DEFAULT_TILE_SIZE, MAX_LATITUDE};
use crate::source::TileSource;
use crate::tile_id::{CacheKey, TileAddress};

/// Path list of archives to open, separated like `PATH`.
pub const ENV_ARCHIVES: &str = "DEMTILES_ARCHIVES";
/// Number of decoded tiles to cache.
pub const ENV_CACHE_SIZE: &str = "DEMTILES_CACHE_SIZE";
/// Directory levels walked per lookup.
pub const ENV_MAX_DIRECTORY_DEPTH: &str = "DEMTILES_MAX_DIRECTORY_DEPTH";

/// Outcome of a single lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupStatus {
    /// The elevation was read from a tile.
    Valid,
    /// No archive covers the coordinate, or its tile is missing.
    NotFound,
    /// The tile blob could not be decoded.
    DecodeError,
    /// The tile uses an unsupported PNG or WebP variant.
    CompressedFormatError,
    /// The tile blob is neither PNG nor WebP.
    UnknownFormatError,
    /// Reading the archive failed (I/O, format, decompression).
    ArchiveError,
}

impl LookupStatus {
    /// Stable identifier, used in machine-readable output.
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupStatus::Valid => "valid",
            LookupStatus::NotFound => "not_found",
            LookupStatus::DecodeError => "decode_error",
            LookupStatus::CompressedFormatError => "compressed_format_error",
            LookupStatus::UnknownFormatError => "unknown_format_error",
            LookupStatus::ArchiveError => "archive_error",
        }
    }
}

impl fmt::Display for LookupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`ElevationService::resolve_elevation`].
///
/// `elevation` is only meaningful when `status` is [`LookupStatus::Valid`];
/// it is `0.0` otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationInfo {
    pub elevation: f64,
    pub status: LookupStatus,
}

impl LocationInfo {
    fn valid(elevation: f64) -> Self {
        Self {
            elevation,
            status: LookupStatus::Valid,
        }
    }

    fn failed(status: LookupStatus) -> Self {
        Self {
            elevation: 0.0,
            status,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == LookupStatus::Valid
    }

    /// The elevation if the lookup succeeded.
    pub fn elevation(&self) -> Option<f64> {
        self.is_valid().then_some(self.elevation)
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of tiles currently in the cache.
    pub entry_count: u64,
    /// Number of lookups served from the cache.
    pub hit_count: u64,
    /// Number of lookups that had to fetch and decode a tile.
    pub miss_count: u64,
    /// Number of tiles evicted from the cache.
    pub eviction_count: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

/// Per-archive counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Archive label, usually its path.
    pub label: String,
    /// Index used in cache keys.
    pub index: u16,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Tiles that failed to decode.
    pub tile_errors: u64,
    /// Failed reads, directory walks or database queries.
    pub archive_errors: u64,
    /// Width of the last decoded tile, 0 before the first decode.
    pub tile_size: u32,
}

struct RegisteredSource {
    source: Box<dyn TileSource + Send>,
    stats: ArchiveStats,
}

/// Elevation lookups across registered archives with tile caching.
///
/// Archives are scanned in registration order; the first archive whose
/// bounding box contains the coordinate and yields a value wins.
pub struct ElevationService {
    archives: Vec<RegisteredSource>,
    cache: TileCache,
    buffers: ScratchBuffers,
    max_directory_depth: usize,
    hit_count: u64,
    miss_count: u64,
}

impl ElevationService {
    /// Create a service without archives.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::Allocation`] if the scratch buffers cannot be
    /// allocated.
    pub fn new(cache_size: usize) -> Result<Self> {
        Ok(Self {
            archives: Vec::new(),
            cache: TileCache::new(cache_size),
            buffers: ScratchBuffers::new()?,
            max_directory_depth: DEFAULT_MAX_DIRECTORY_DEPTH,
            hit_count: 0,
            miss_count: 0,
        })
    }

    /// Create a builder for more configuration options.
    pub fn builder() -> ElevationServiceBuilder {
        ElevationServiceBuilder::new()
    }

    /// Open and register an archive, returning its index.
    ///
    /// `.mbtiles` files are opened as MBTiles when the `mbtiles` feature is
    /// enabled; everything else is read as PMTiles.
    pub fn open_archive<P: AsRef<Path>>(&mut self, path: P) -> Result<u16> {
        let path = path.as_ref();

        #[cfg(feature = "mbtiles")]
        {
            let is_mbtiles = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("mbtiles"));
            if is_mbtiles {
                let archive = crate::mbtiles::MbTilesArchive::open(path)?;
                return self.add_source(Box::new(archive));
            }
        }

        let archive = PmTilesArchive::open(path, self.max_directory_depth)?;
        self.add_source(Box::new(archive))
    }

    /// Register a custom tile source, returning its index.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::Format`] once 65536 sources are registered, as
    /// cache keys hold a 16-bit archive index.
    pub fn add_source(&mut self, source: Box<dyn TileSource + Send>) -> Result<u16> {
        let index = u16::try_from(self.archives.len())
            .map_err(|_| DemError::Format("too many archives".into()))?;
        let stats = ArchiveStats {
            label: source.label().to_string(),
            index,
            ..ArchiveStats::default()
        };
        self.archives.push(RegisteredSource { source, stats });
        Ok(index)
    }

    /// Resolve the elevation at a coordinate.
    ///
    /// Never fails: every problem is reported through
    /// [`LocationInfo::status`]. A failing archive does not stop the scan;
    /// if no archive yields a value, the status of the first failure is
    /// returned, or [`LookupStatus::NotFound`] if nothing failed.
    /// Latitudes beyond the Web Mercator limit are never found.
    pub fn resolve_elevation(&mut self, lat: f64, lon: f64) -> LocationInfo {
        if lat.is_nan() || lat.abs() > MAX_LATITUDE {
            debug!(lat, lon, "latitude outside Web Mercator range");
            return LocationInfo::failed(LookupStatus::NotFound);
        }
        let mut first_failure = None;

        for i in 0..self.archives.len() {
            if !self.archives[i].source.bounds().contains(lat, lon) {
                continue;
            }
            match self.lookup(i, lat, lon) {
                Ok(Some(elevation)) => return LocationInfo::valid(elevation),
                Ok(None) => {}
                Err(e) => {
                    let stats = &mut self.archives[i].stats;
                    match e.status() {
                        LookupStatus::ArchiveError => stats.archive_errors += 1,
                        LookupStatus::NotFound => {}
                        _ => stats.tile_errors += 1,
                    }
                    warn!(archive = %stats.label, lat, lon, error = %e, "elevation lookup failed");
                    first_failure.get_or_insert(e.status());
                }
            }
        }

        LocationInfo::failed(first_failure.unwrap_or(LookupStatus::NotFound))
    }

    /// Elevation in meters, or `None` if it could not be resolved.
    pub fn get_elevation(&mut self, lat: f64, lon: f64) -> Option<f64> {
        self.resolve_elevation(lat, lon).elevation()
    }

    /// Get elevations for a batch of coordinates.
    ///
    /// Coordinates are processed grouped by tile so that each tile is decoded
    /// once even when the batch is larger than the cache. Results are in
    /// input order, with `default` for coordinates that did not resolve.
    pub fn get_elevations_batch(&mut self, coords: &[(f64, f64)], default: f64) -> Vec<f64> {
        let mut order: Vec<usize> = (0..coords.len()).collect();
        order.sort_by_cached_key(|&i| self.batch_group(coords[i].0, coords[i].1));

        let mut results = vec![default; coords.len()];
        for i in order {
            let (lat, lon) = coords[i];
            if let Some(elevation) = self.get_elevation(lat, lon) {
                results[i] = elevation;
            }
        }
        results
    }

    /// First archive containing the coordinate and the tile it falls in.
    fn batch_group(&self, lat: f64, lon: f64) -> Option<(usize, u32, u32)> {
        self.archives
            .iter()
            .position(|a| a.source.bounds().contains(lat, lon))
            .map(|i| {
                let zoom = self.archives[i].source.max_zoom();
                let (x, y) = lat_lon_to_tile(lat, lon, zoom, DEFAULT_TILE_SIZE);
                (i, x, y)
            })
    }

    /// Look up a coordinate in archive `i`, decoding and caching on a miss.
    fn lookup(&mut self, i: usize, lat: f64, lon: f64) -> Result<Option<f64>> {
        let archive = &mut self.archives[i];
        let zoom = archive.source.max_zoom();
        let (x, y) = lat_lon_to_tile(lat, lon, zoom, DEFAULT_TILE_SIZE);
        let address = TileAddress::new(zoom, x, y);
        let key = CacheKey::new(archive.stats.index, address);

        if self.cache.exists(key) {
            debug!(%key, "cache hit");
            self.hit_count += 1;
            archive.stats.cache_hits += 1;
        } else {
            debug!(%key, "cache miss");
            self.miss_count += 1;
            archive.stats.cache_misses += 1;

            let Some(blob) = archive.source.fetch_tile(address, &mut self.buffers)? else {
                debug!(%key, "no tile in archive");
                return Ok(None);
            };
            let tile = decode_tile(blob)?;
            archive.stats.tile_size = tile.width();
            self.cache.put(key, tile);
        }

        let Some(tile) = self.cache.get(key) else {
            return Ok(None);
        };
        let offset = pixel_offset(lat, lon, zoom, tile.width());
        Ok(tile.elevation_at(offset.offset_x, offset.offset_y))
    }

    /// Get cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.cache.len() as u64,
            hit_count: self.hit_count,
            miss_count: self.miss_count,
            eviction_count: self.cache.evictions(),
        }
    }

    /// Counters of every registered archive, in registration order.
    pub fn archive_stats(&self) -> Vec<ArchiveStats> {
        self.archives.iter().map(|a| a.stats.clone()).collect()
    }

    /// Cached tile keys from least to most recently used.
    pub fn cached_keys(&self) -> Vec<CacheKey> {
        self.cache.keys()
    }

    /// Drop all cached tiles. Counters are kept.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache.capacity()
    }

    pub fn archive_count(&self) -> usize {
        self.archives.len()
    }
}

impl fmt::Debug for ElevationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElevationService")
            .field("archives", &self.archive_stats())
            .field("cache", &self.cache)
            .field("max_directory_depth", &self.max_directory_depth)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ElevationService`].
///
/// ```no_run
/// use demtiles::ElevationServiceBuilder;
///
/// let service = ElevationServiceBuilder::new()
///     .archives(["north.pmtiles", "south.pmtiles"])
///     .cache_size(10)
///     .max_directory_depth(3)
///     .build()?;
/// # Ok::<(), demtiles::DemError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ElevationServiceBuilder {
    archives: Vec<PathBuf>,
    cache_size: usize,
    max_directory_depth: usize,
}

impl ElevationServiceBuilder {
    /// Create a builder with no archives and default settings.
    pub fn new() -> Self {
        Self {
            archives: Vec::new(),
            cache_size: DEFAULT_CACHE_SIZE,
            max_directory_depth: DEFAULT_MAX_DIRECTORY_DEPTH,
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `DEMTILES_ARCHIVES` | Archive paths, separated like `PATH` | Required |
    /// | `DEMTILES_CACHE_SIZE` | Maximum decoded tiles in cache | 5 |
    /// | `DEMTILES_MAX_DIRECTORY_DEPTH` | Directory levels walked per lookup | 4 |
    ///
    /// Unparsable numbers fall back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `DEMTILES_ARCHIVES` is not set.
    pub fn from_env() -> Result<Self> {
        let archives = std::env::var_os(ENV_ARCHIVES).ok_or_else(|| {
            DemError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{ENV_ARCHIVES} environment variable not set"),
            ))
        })?;

        let cache_size = std::env::var(ENV_CACHE_SIZE)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CACHE_SIZE);
        let max_directory_depth = std::env::var(ENV_MAX_DIRECTORY_DEPTH)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_DIRECTORY_DEPTH);

        Ok(Self {
            archives: std::env::split_paths(&archives)
                .filter(|p| !p.as_os_str().is_empty())
                .collect(),
            cache_size,
            max_directory_depth,
        })
    }

    /// Add an archive. Archives are scanned in the order they are added.
    pub fn archive<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.archives.push(path.as_ref().to_path_buf());
        self
    }

    /// Add several archives.
    pub fn archives<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.archives
            .extend(paths.into_iter().map(|p| p.as_ref().to_path_buf()));
        self
    }

    /// Set the maximum number of decoded tiles to keep in cache.
    ///
    /// Default is 5 tiles.
    pub fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    /// Set how many directory levels a lookup may walk.
    ///
    /// Default is 4, enough for a root directory plus leaf levels.
    pub fn max_directory_depth(mut self, depth: usize) -> Self {
        self.max_directory_depth = depth;
        self
    }

    /// Open every archive and build the [`ElevationService`].
    ///
    /// # Errors
    ///
    /// Returns the first error from opening an archive.
    pub fn build(self) -> Result<ElevationService> {
        let mut service = ElevationService::new(self.cache_size)?;
        service.max_directory_depth = self.max_directory_depth;
        for path in &self.archives {
            service.open_archive(path)?;
        }
        Ok(service)
    }
}

impl Default for ElevationServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
