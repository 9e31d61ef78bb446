//! # Content Cache Module
//!
//! Questo modulo gestisce la cache persistente content-addressable dei
//! risultati di trasformazione.
//!
//! ## Responsabilità:
//! - Deriva chiavi deterministiche da (contenuto, opzioni, versioni plugin)
//! - Persiste blob sotto chiave in una directory condivisa tra processi
//! - Scritture atomiche: temp file privato + rename, mai entry parziali
//! - Lock per chiave tramite lock-file per scritture multi-processo sicure
//! - I fallimenti di lettura degradano a cache miss, mai errori hard
//!
//! ## Strategia di persistence:
//! - Un file per entry: `<cache_dir>/<sha256-hex>.bin`
//! - Directory di default: `~/.asset-optimizer/cache`
//! - Lock file: `<cache_dir>/<primi 16 hex della chiave>.lock`
//!
//! ## Disciplina di concorrenza:
//! - I writer acquisiscono il lock prima di toccare una chiave inesistente
//! - Il lock è un guard RAII: rilascio deterministico su ogni exit path
//! - Lock stale (writer crashato) vengono recuperati dopo una soglia di età
//! - I reader non lockano mai
//! - Due processi in miss sulla stessa chiave possono ricalcolare entrambi:
//!   il lock previene la corruzione, non il lavoro duplicato
//!
//! ## Esempio:
//! ```rust,ignore
//! let cache = ContentCache::at(cache_dir).await?;
//! let key = CacheKey::derive(content, &fingerprint)?;
//! if cache.get(&key).await.is_none() {
//!     cache.put(&key, &blob).await?;
//! }
//! ```

use crate::error::OptimizeError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, warn};

const LOCK_RETRY_DELAY: Duration = Duration::from_millis(50);
const LOCK_MAX_ATTEMPTS: u32 = 200;
/// A lock file older than this belongs to a crashed writer and is reclaimed
const LOCK_STALE_AFTER: Duration = Duration::from_secs(60);

/// A deterministic cache key: SHA-256 over the input content and the
/// serialized effective configuration (options plus plugin versions).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive a key from content bytes and a configuration fingerprint.
    ///
    /// `serde_json` serializes object keys in sorted order, so semantically
    /// identical configurations always hash identically.
    pub fn derive(
        content: &[u8],
        configuration: &serde_json::Value,
    ) -> Result<Self, OptimizeError> {
        let serialized = serde_json::to_vec(configuration)
            .map_err(|e| OptimizeError::Cache(format!("Failed to serialize configuration: {}", e)))?;

        let mut hasher = Sha256::new();
        hasher.update(content);
        hasher.update(&serialized);
        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened key used to scope the lock-file name.
    fn lock_scope(&self) -> &str {
        &self.0[..16]
    }
}

/// Exclusive per-key write lock backed by a lock file.
///
/// Created with `create_new` so exactly one process holds it. Dropping the
/// guard removes the file; `release()` does the same explicitly on the
/// success path.
#[derive(Debug)]
pub struct CacheLock {
    path: PathBuf,
    released: bool,
}

impl CacheLock {
    /// Acquire the lock at `path`, waiting out contention and reclaiming
    /// stale locks left behind by crashed writers.
    pub async fn acquire(path: PathBuf) -> Result<Self, OptimizeError> {
        Self::acquire_with(path, LOCK_MAX_ATTEMPTS, LOCK_RETRY_DELAY, LOCK_STALE_AFTER).await
    }

    async fn acquire_with(
        path: PathBuf,
        max_attempts: u32,
        retry_delay: Duration,
        stale_after: Duration,
    ) -> Result<Self, OptimizeError> {
        for _ in 0..max_attempts {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => {
                    debug!("Acquired cache lock: {}", path.display());
                    return Ok(Self {
                        path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path, stale_after) {
                        warn!("Reclaiming stale cache lock: {}", path.display());
                        let _ = std::fs::remove_file(&path);
                        continue;
                    }
                    tokio::time::sleep(retry_delay).await;
                }
                Err(e) => {
                    return Err(OptimizeError::Cache(format!(
                        "Failed to create lock file {}: {}",
                        path.display(),
                        e
                    )));
                }
            }
        }

        Err(OptimizeError::Cache(format!(
            "Timed out waiting for cache lock: {}",
            path.display()
        )))
    }

    /// Release the lock explicitly. Equivalent to dropping the guard, but
    /// lets call sites make the success path visible.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if !self.released {
            self.released = true;
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!("Failed to remove cache lock {}: {}", self.path.display(), e);
            }
        }
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        self.remove();
    }
}

fn lock_is_stale(path: &Path, stale_after: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map(|age| age > stale_after)
        .unwrap_or(false)
}

/// The serialized form of a cached transform outcome.
///
/// Only data and generation-time metadata are stored; the output filename is
/// recomputed by the worker on every run (templating is deterministic), so a
/// template change never serves a stale name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEnvelope {
    pub data: Vec<u8>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub attribution: Vec<String>,
}

impl CacheEnvelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>, OptimizeError> {
        serde_json::to_vec(self)
            .map_err(|e| OptimizeError::Cache(format!("Failed to serialize cache entry: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, OptimizeError> {
        serde_json::from_slice(bytes)
            .map_err(|e| OptimizeError::Cache(format!("Failed to parse cache entry: {}", e)))
    }
}

/// Persistent key→blob store shared between processes.
pub struct ContentCache {
    dir: PathBuf,
}

impl ContentCache {
    /// Open (creating if needed) a cache rooted at `dir`.
    pub async fn at(dir: PathBuf) -> Result<Self, OptimizeError> {
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| OptimizeError::Cache(format!("Failed to create cache dir {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    /// Open the cache at the OS-default location.
    pub async fn at_default_location() -> Result<Self, OptimizeError> {
        Self::at(Self::default_dir()?).await
    }

    /// `~/.asset-optimizer/cache`
    pub fn default_dir() -> Result<PathBuf, OptimizeError> {
        let home = dirs::home_dir()
            .ok_or_else(|| OptimizeError::Cache("Could not find home directory".to_string()))?;
        Ok(home.join(".asset-optimizer").join("cache"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.bin", key.as_str()))
    }

    fn lock_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.lock", key.lock_scope()))
    }

    /// Look up `key`. Any failure, including an unavailable backing store,
    /// degrades to a miss.
    pub async fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        match fs::read(self.entry_path(key)).await {
            Ok(blob) => {
                debug!("Cache hit: {}", key.as_str());
                Some(blob)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Cache miss: {}", key.as_str());
                None
            }
            Err(e) => {
                warn!("Cache read failed for {}, treating as miss: {}", key.as_str(), e);
                None
            }
        }
    }

    /// Persist `blob` under `key`, atomically and idempotently.
    ///
    /// The blob is streamed to a private temp file in the cache directory
    /// and only made visible by the final rename, so readers never observe
    /// a partial entry. Writes to the same key are serialized by the
    /// per-key lock.
    pub async fn put(&self, key: &CacheKey, blob: &[u8]) -> Result<(), OptimizeError> {
        let lock = CacheLock::acquire(self.lock_path(key)).await?;
        let outcome = self.write_entry(&self.entry_path(key), blob);
        lock.release();
        outcome
    }

    fn write_entry(&self, entry: &Path, blob: &[u8]) -> Result<(), OptimizeError> {
        let mut tmp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| OptimizeError::Cache(format!("Failed to create temp file: {}", e)))?;

        tmp.write_all(blob)
            .and_then(|_| tmp.flush())
            .map_err(|e| OptimizeError::Cache(format!("Failed to write cache entry: {}", e)))?;

        match tmp.persist(entry) {
            Ok(_) => {
                debug!("Cache entry written: {}", entry.display());
                Ok(())
            }
            // On platforms where rename-over-existing fails, a concurrent
            // writer already published the same content-addressed entry
            Err(e) if entry.exists() => {
                debug!("Cache entry already present, keeping existing: {}", e);
                Ok(())
            }
            Err(e) => Err(OptimizeError::Cache(format!(
                "Failed to persist cache entry {}: {}",
                entry.display(),
                e
            ))),
        }
    }
}
