//! Two-tier cache for catalog and cross-reference JSON bodies.
//!
//! **L1** – [`DashMap`] in-memory map (lock-free concurrent reads).
//! **L2** – Optional SQLite database on disk (persists across process restarts).
//!
//! On [`get`](IdentifierCache::get): check L1 first; on miss, fall through to L2 and
//! promote the entry back into L1 on hit. On [`put`](IdentifierCache::put):
//! write-through to both tiers.
//!
//! Keys are synthetic URIs (see [`CacheKey::uri`]) so catalog records and
//! cross-reference records never share a slot. Every entry carries its own
//! freshness window. A stored body that no longer parses as JSON is reported
//! as a miss, never as an error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use rusqlite::{Connection, OpenFlags, params};
use thiserror::Error;

use crate::CatalogKind;

/// Freshness window for catalog records fetched from the static origin: 1 day.
pub const CATALOG_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Freshness window for mapping-service records: 1 hour.
pub const CROSSREF_TTL: Duration = Duration::from_secs(60 * 60);

const KEY_BASE: &str = "https://cache.animap.internal";

/// Identity of a cached body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A full origin record for `(kind, id)`. Independent of the `crossIDs` flag.
    Catalog { kind: CatalogKind, id: String },
    /// A mapping-service record for one MyAnimeList id.
    CrossRef { mal_id: String },
}

impl CacheKey {
    pub fn catalog(kind: CatalogKind, id: impl Into<String>) -> Self {
        CacheKey::Catalog {
            kind,
            id: id.into(),
        }
    }

    pub fn cross_ref(mal_id: impl Into<String>) -> Self {
        CacheKey::CrossRef {
            mal_id: mal_id.into(),
        }
    }

    /// The synthetic URI this key is stored under in both tiers.
    pub fn uri(&self) -> String {
        match self {
            CacheKey::Catalog { kind, id } => format!("{KEY_BASE}/catalog/{kind}/{id}"),
            CacheKey::CrossRef { mal_id } => format!("{KEY_BASE}/crossref/myanimelist/{mal_id}"),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// A cache hit: the stored text exactly as written, plus its parsed form.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedBody {
    pub raw: String,
    pub value: serde_json::Value,
}

impl CachedBody {
    fn parse(raw: String) -> Option<Self> {
        let value = serde_json::from_str(&raw).ok()?;
        Some(Self { raw, value })
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cache writer lock poisoned")]
    Poisoned,
    #[error("failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Keyed store of bounded-lifetime JSON bodies.
///
/// The lookup pipeline and the cross-reference resolver only see this trait,
/// so the concrete cache is injected rather than reached through a global.
pub trait IdentifierStore: Send + Sync {
    /// Return the body stored under `key`, or `None` if absent, expired or
    /// no longer valid JSON.
    fn get(&self, key: &CacheKey) -> Option<CachedBody>;

    /// Store `body` under `key` for `ttl`, replacing any previous entry.
    ///
    /// Callers treat failures as best-effort: log and continue.
    fn put(&self, key: &CacheKey, body: &str, ttl: Duration) -> Result<(), CacheError>;
}

/// A timestamped L1 entry (monotonic clock).
#[derive(Clone, Debug)]
struct CacheEntry {
    body: String,
    ttl: Duration,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

/// Open a SQLite connection with WAL mode and standard pragmas.
fn open_sqlite(path: &Path, read_only: bool) -> Result<Connection, rusqlite::Error> {
    let flags = if read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
    };
    let conn = Connection::open_with_flags(path, flags)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(conn)
}

/// SQLite writer connection (L2 writes: insert, evict).
struct SqliteWriter {
    conn: Connection,
}

impl SqliteWriter {
    fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = open_sqlite(path, false)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS identifier_cache (
                 cache_key   TEXT PRIMARY KEY,
                 body        TEXT NOT NULL,
                 inserted_at INTEGER NOT NULL,
                 ttl_secs    INTEGER NOT NULL
             );",
        )?;
        Ok(Self { conn })
    }

    /// Insert or replace an entry. Returns `true` if a row already existed.
    fn insert(
        &self,
        key: &str,
        body: &str,
        epoch: u64,
        ttl_secs: u64,
    ) -> Result<bool, rusqlite::Error> {
        let existed = self
            .conn
            .query_row(
                "SELECT 1 FROM identifier_cache WHERE cache_key = ?1",
                params![key],
                |_| Ok(()),
            )
            .is_ok();

        self.conn.execute(
            "INSERT OR REPLACE INTO identifier_cache (cache_key, body, inserted_at, ttl_secs)
             VALUES (?1, ?2, ?3, ?4)",
            params![key, body, epoch, ttl_secs],
        )?;

        Ok(existed)
    }

    fn evict_expired(&self) -> usize {
        self.conn
            .execute(
                "DELETE FROM identifier_cache WHERE inserted_at + ttl_secs < ?1",
                params![now_epoch()],
            )
            .unwrap_or(0)
    }

    fn count(&self) -> usize {
        self.conn
            .query_row("SELECT COUNT(*) FROM identifier_cache", [], |row| row.get(0))
            .unwrap_or(0)
    }
}

/// Pool of read-only SQLite connections for concurrent L2 lookups.
///
/// Each reader gets its own connection (SQLite WAL mode allows concurrent reads).
/// Connections are returned to the pool after use. If the pool is empty, a new
/// connection is opened.
struct ReadPool {
    pool: Mutex<Vec<Connection>>,
    path: PathBuf,
}

/// A live L2 row: body, insertion epoch, ttl.
type L2Row = (String, u64, Duration);

impl ReadPool {
    fn new(path: &Path) -> Self {
        Self {
            pool: Mutex::new(Vec::new()),
            path: path.to_path_buf(),
        }
    }

    fn acquire(&self) -> Option<Connection> {
        if let Ok(mut pool) = self.pool.lock()
            && let Some(conn) = pool.pop()
        {
            return Some(conn);
        }
        open_sqlite(&self.path, true).ok()
    }

    fn release(&self, conn: Connection) {
        if let Ok(mut pool) = self.pool.lock() {
            pool.push(conn);
        }
    }

    fn get(&self, key: &str) -> Option<L2Row> {
        let conn = self.acquire()?;
        let result = Self::query(&conn, key);
        self.release(conn);
        result
    }

    fn query(conn: &Connection, key: &str) -> Option<L2Row> {
        let mut stmt = conn
            .prepare_cached(
                "SELECT body, inserted_at, ttl_secs FROM identifier_cache WHERE cache_key = ?1",
            )
            .ok()?;

        let (body, inserted_at, ttl_secs): (String, u64, u64) = stmt
            .query_row(params![key], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .ok()?;

        // Expired rows are left for the writer to evict on next open.
        let age = now_epoch().saturating_sub(inserted_at);
        if age > ttl_secs {
            return None;
        }

        Some((body, inserted_at, Duration::from_secs(ttl_secs)))
    }
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Convert a wall-clock epoch to a monotonic `Instant` approximation.
///
/// Keeps the remaining freshness of an L2 row when it is promoted into L1.
fn epoch_to_instant(epoch: u64) -> Instant {
    let age = Duration::from_secs(now_epoch().saturating_sub(epoch));
    let now = Instant::now();
    now.checked_sub(age).unwrap_or(now)
}

/// Thread-safe two-tier cache of JSON bodies.
///
/// L1: [`DashMap`] for lock-free concurrent access from request tasks.
/// L2: Optional SQLite database. Reads use a [`ReadPool`] of concurrent connections,
///     writes go through a single [`SqliteWriter`] behind a [`Mutex`].
pub struct IdentifierCache {
    entries: DashMap<String, CacheEntry>,
    sqlite_writer: Option<Mutex<SqliteWriter>>,
    read_pool: Option<ReadPool>,
    hits: AtomicU64,
    misses: AtomicU64,
    l2_count: AtomicU64,
}

impl Default for IdentifierCache {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifierCache {
    /// Create an in-memory-only cache.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            sqlite_writer: None,
            read_pool: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            l2_count: AtomicU64::new(0),
        }
    }

    /// Open a persistent cache backed by a SQLite database at `path`.
    ///
    /// Expired rows are evicted on open. L1 starts empty and fills lazily.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let writer = SqliteWriter::open(path)?;
        let evicted = writer.evict_expired();
        if evicted > 0 {
            tracing::debug!(path = %path.display(), evicted, "evicted expired cache rows");
        }
        let l2_count = writer.count() as u64;
        Ok(Self {
            entries: DashMap::new(),
            sqlite_writer: Some(Mutex::new(writer)),
            read_pool: Some(ReadPool::new(path)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            l2_count: AtomicU64::new(l2_count),
        })
    }

    /// Look up the body stored under `key`.
    ///
    /// Returns `None` on miss, on expiry, and when the stored text fails to
    /// parse as JSON.
    pub fn get(&self, key: &CacheKey) -> Option<CachedBody> {
        let uri = key.uri();

        // L1 check. `Some(None)` means present but expired.
        let l1 = self
            .entries
            .get(&uri)
            .map(|entry| (!entry.is_expired()).then(|| entry.body.clone()));
        match l1 {
            Some(Some(raw)) => {
                if let Some(body) = CachedBody::parse(raw) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(key = %uri, "cache L1 hit");
                    return Some(body);
                }
                tracing::debug!(key = %uri, "discarding unparseable L1 entry");
                self.entries.remove(&uri);
            }
            Some(None) => {
                self.entries.remove_if(&uri, |_, entry| entry.is_expired());
            }
            None => {}
        }

        // L2 check (concurrent read, no writer lock needed)
        if let Some(ref pool) = self.read_pool
            && let Some((raw, epoch, ttl)) = pool.get(&uri)
        {
            match CachedBody::parse(raw) {
                Some(body) => {
                    tracing::trace!(key = %uri, "cache L2 hit, promoting to L1");
                    self.entries.insert(
                        uri,
                        CacheEntry {
                            body: body.raw.clone(),
                            ttl,
                            inserted_at: epoch_to_instant(epoch),
                        },
                    );
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(body);
                }
                None => {
                    tracing::debug!(key = %uri, "discarding unparseable L2 entry");
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(key = %uri, "cache miss");
        None
    }

    /// Store `body` under `key` for `ttl`. Write-through: updates L1, then L2.
    ///
    /// L1 is always updated. An error means only the L2 write failed.
    pub fn put(&self, key: &CacheKey, body: &str, ttl: Duration) -> Result<(), CacheError> {
        let uri = key.uri();
        tracing::trace!(key = %uri, ttl_secs = ttl.as_secs(), "cache put");

        self.entries.insert(
            uri.clone(),
            CacheEntry {
                body: body.to_string(),
                ttl,
                inserted_at: Instant::now(),
            },
        );

        if let Some(ref sqlite_mutex) = self.sqlite_writer {
            let store = sqlite_mutex.lock().map_err(|_| CacheError::Poisoned)?;
            let replaced = store.insert(&uri, body, now_epoch(), ttl.as_secs())?;
            if !replaced {
                self.l2_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(())
    }

    /// Number of cache hits since creation.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of cache misses since creation.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of entries currently in L1 (expired entries included until touched).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rows in the persistent L2 store (0 if no SQLite backing).
    pub fn disk_len(&self) -> usize {
        self.l2_count.load(Ordering::Relaxed) as usize
    }

    /// Whether this cache has a persistent SQLite backing store.
    pub fn has_persistence(&self) -> bool {
        self.sqlite_writer.is_some()
    }
}

impl IdentifierStore for IdentifierCache {
    fn get(&self, key: &CacheKey) -> Option<CachedBody> {
        IdentifierCache::get(self, key)
    }

    fn put(&self, key: &CacheKey, body: &str, ttl: Duration) -> Result<(), CacheError> {
        IdentifierCache::put(self, key, body, ttl)
    }
}

impl fmt::Debug for IdentifierCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierCache")
            .field("l1_entries", &self.entries.len())
            .field("l2_entries", &self.disk_len())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .field("persistent", &self.has_persistence())
            .finish()
    }
}
