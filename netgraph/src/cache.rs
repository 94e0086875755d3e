//! Cache Layer
//!
//! Memoizes resolved boards by canonical path. Every entry remembers the
//! signature (modification time and length) of each file it was built from;
//! an entry is served only while all of them still match. Entries live in
//! memory and, when enabled, as versioned JSON envelopes on disk.
//!
//! Builds for one path are serialized through a per-path slot lock, so
//! concurrent callers for the same file wait for a single parse while other
//! paths proceed in parallel.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::board::{Board, FileSignature};
use crate::core::{build_board, NetgraphError};

/// Bumped whenever the persisted [`Board`] shape changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Persist boards to `directory`.
    pub enabled: bool,
    pub directory: PathBuf,
    /// Validate entries against source file signatures.
    pub check_mtime: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: default_cache_dir(),
            check_mtime: true,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".cache")
        .join("netgraph")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Served from memory.
    pub hits: u64,
    /// Loaded from disk.
    pub disk_hits: u64,
    /// Parsed and resolved from source.
    pub builds: u64,
    pub entries: usize,
}

#[derive(Serialize, Deserialize)]
struct Envelope<B> {
    format_version: u32,
    crate_version: String,
    created_at: DateTime<Utc>,
    board: B,
}

type Slot = Arc<Mutex<Option<Arc<Board>>>>;

pub struct BoardCache {
    config: CacheConfig,
    slots: DashMap<PathBuf, Slot>,
    hits: AtomicU64,
    disk_hits: AtomicU64,
    builds: AtomicU64,
}

impl BoardCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            slots: DashMap::new(),
            hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            builds: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cached board for `path`, building it if absent or stale.
    pub fn get_or_build(&self, path: &Path) -> Result<Arc<Board>, NetgraphError> {
        self.get_or_build_with(path, build_board)
    }

    /// Like [`get_or_build`](Self::get_or_build) with a caller supplied
    /// builder. A failed build leaves the slot empty and nothing on disk.
    pub fn get_or_build_with<F>(&self, path: &Path, build: F) -> Result<Arc<Board>, NetgraphError>
    where
        F: FnOnce(&Path) -> Result<Board, NetgraphError>,
    {
        let key = canonical(path)?;
        let slot = self.slots.entry(key.clone()).or_default().clone();
        let mut entry = slot.lock();

        if let Some(board) = entry.as_ref() {
            if self.is_fresh(board) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(path = %key.display(), "board cache hit");
                return Ok(Arc::clone(board));
            }
            info!(path = %key.display(), "source changed, rebuilding board");
        }
        *entry = None;

        if self.config.enabled {
            if let Some(board) = self.read_disk(&key).filter(|b| self.is_fresh(b)) {
                self.disk_hits.fetch_add(1, Ordering::Relaxed);
                debug!(path = %key.display(), "board loaded from disk cache");
                let board = Arc::new(board);
                *entry = Some(Arc::clone(&board));
                return Ok(board);
            }
        }

        let board = Arc::new(build(&key)?);
        self.builds.fetch_add(1, Ordering::Relaxed);
        if self.config.enabled {
            if let Err(e) = self.write_disk(&key, &board) {
                warn!(path = %key.display(), error = %e, "could not persist board");
            }
        }
        *entry = Some(Arc::clone(&board));
        Ok(board)
    }

    fn is_fresh(&self, board: &Board) -> bool {
        !self.config.check_mtime
            || board.sources.iter().all(|source| {
                FileSignature::read(&source.path).is_ok_and(|now| now == source.signature)
            })
    }

    /// Disk location of the entry for a canonical path.
    pub fn cache_file(&self, key: &Path) -> PathBuf {
        let digest = Sha256::digest(key.to_string_lossy().as_bytes());
        let hash = hex::encode(digest);
        let stem = key
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("board");
        self.config
            .directory
            .join(format!("{stem}_{}.json", &hash[..16]))
    }

    fn read_disk(&self, key: &Path) -> Option<Board> {
        let file = self.cache_file(key);
        let text = fs::read_to_string(&file).ok()?;
        match serde_json::from_str::<Envelope<Board>>(&text) {
            Ok(envelope) if envelope.format_version == CACHE_FORMAT_VERSION => Some(envelope.board),
            Ok(envelope) => {
                debug!(
                    file = %file.display(),
                    version = envelope.format_version,
                    "ignoring cache entry from another format version"
                );
                None
            }
            Err(e) => {
                debug!(file = %file.display(), error = %e, "ignoring unreadable cache entry");
                None
            }
        }
    }

    fn write_disk(&self, key: &Path, board: &Board) -> Result<(), NetgraphError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| NetgraphError::Io { path, source }
        };
        let dir = &self.config.directory;
        fs::create_dir_all(dir).map_err(io_err(dir))?;

        let envelope = Envelope {
            format_version: CACHE_FORMAT_VERSION,
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            board,
        };
        let json = serde_json::to_string(&envelope).map_err(|e| NetgraphError::Cache(e.to_string()))?;

        let file = self.cache_file(key);
        let tmp = file.with_extension(format!("json.{}.tmp", std::process::id()));
        fs::write(&tmp, json).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &file).map_err(io_err(&file))?;
        debug!(file = %file.display(), "board persisted");
        Ok(())
    }

    /// Drop the entry for `path` from memory and disk. Returns whether a
    /// memory entry existed.
    pub fn invalidate(&self, path: &Path) -> bool {
        let key = canonical(path).unwrap_or_else(|_| path.to_path_buf());
        if self.config.enabled {
            let _ = fs::remove_file(self.cache_file(&key));
        }
        self.slots.remove(&key).is_some()
    }

    pub fn clear(&self) {
        if self.config.enabled {
            for slot in self.slots.iter() {
                let _ = fs::remove_file(self.cache_file(slot.key()));
            }
        }
        self.slots.clear();
        info!("board cache cleared");
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
            entries: self.slots.len(),
        }
    }
}

impl Default for BoardCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

fn canonical(path: &Path) -> Result<PathBuf, NetgraphError> {
    fs::canonicalize(path).map_err(|source| NetgraphError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::build_board_from_str;
    use std::sync::atomic::AtomicUsize;

    const CLK_BOARD: &str = include_str!("../tests/fixtures/clk_board.kicad_sch");

    fn memory_only() -> BoardCache {
        BoardCache::new(CacheConfig {
            enabled: false,
            directory: PathBuf::from("unused"),
            check_mtime: true,
        })
    }

    #[test]
    fn test_hit_skips_builder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clk.kicad_sch");
        fs::write(&path, CLK_BOARD).unwrap();

        let cache = memory_only();
        let calls = AtomicUsize::new(0);
        let build = |p: &Path| {
            calls.fetch_add(1, Ordering::SeqCst);
            build_board(p)
        };
        let a = cache.get_or_build_with(&path, build).unwrap();
        let b = cache.get_or_build_with(&path, build).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().builds, 1);
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.kicad_sch");
        fs::write(&path, "(kicad_sch (wire").unwrap();

        let cache = memory_only();
        assert!(matches!(
            cache.get_or_build(&path),
            Err(NetgraphError::Parse { .. })
        ));
        fs::write(&path, CLK_BOARD).unwrap();
        assert!(cache.get_or_build(&path).is_ok());
        assert_eq!(cache.stats().builds, 1);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let cache = memory_only();
        assert!(matches!(
            cache.get_or_build(Path::new("/no/such/board.kicad_sch")),
            Err(NetgraphError::Io { .. })
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clk.kicad_sch");
        fs::write(&path, CLK_BOARD).unwrap();
        let config = CacheConfig {
            enabled: true,
            directory: dir.path().join("cache"),
            check_mtime: true,
        };

        let first = BoardCache::new(config.clone());
        let built = first.get_or_build(&path).unwrap();
        let key = fs::canonicalize(&path).unwrap();
        assert!(first.cache_file(&key).exists());

        // A fresh process sees the persisted board without parsing.
        let second = BoardCache::new(config);
        let loaded = second
            .get_or_build_with(&path, |_| panic!("should load from disk"))
            .unwrap();
        assert_eq!(loaded.nets, built.nets);
        assert_eq!(second.stats().disk_hits, 1);
    }

    #[test]
    fn test_version_mismatch_rebuilds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clk.kicad_sch");
        fs::write(&path, CLK_BOARD).unwrap();
        let config = CacheConfig {
            enabled: true,
            directory: dir.path().join("cache"),
            check_mtime: true,
        };
        let cache = BoardCache::new(config.clone());
        cache.get_or_build(&path).unwrap();

        let key = fs::canonicalize(&path).unwrap();
        let file = cache.cache_file(&key);
        let mut envelope: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
        envelope["format_version"] = serde_json::json!(CACHE_FORMAT_VERSION + 1);
        fs::write(&file, envelope.to_string()).unwrap();

        let other = BoardCache::new(config);
        other.get_or_build(&path).unwrap();
        assert_eq!(other.stats().disk_hits, 0);
        assert_eq!(other.stats().builds, 1);
    }

    #[test]
    fn test_cache_file_name() {
        let cache = BoardCache::new(CacheConfig {
            enabled: true,
            directory: PathBuf::from("/tmp/cache"),
            check_mtime: true,
        });
        let file = cache.cache_file(Path::new("/work/main.kicad_sch"));
        let name = file.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("main_"));
        assert!(name.ends_with(".json"));
        assert_eq!(name.len(), "main_".len() + 16 + ".json".len());
    }

    #[test]
    fn test_invalidate_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clk.kicad_sch");
        fs::write(&path, CLK_BOARD).unwrap();
        let cache = memory_only();
        cache.get_or_build(&path).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.invalidate(&path));
        assert!(!cache.invalidate(&path));
        cache.get_or_build(&path).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().builds, 2);
    }

    #[test]
    fn test_in_memory_board_has_no_sources() {
        let board = build_board_from_str(CLK_BOARD, "clk").unwrap();
        assert!(board.sources.is_empty());
        assert!(memory_only().is_fresh(&board));
    }
}
