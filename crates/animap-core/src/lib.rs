use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub mod cache;
pub mod catalog;
pub mod config_file;
pub mod crossref;
pub mod enrich;
pub mod origin;
pub mod resolver;
pub mod tvdb;

#[cfg(test)]
pub(crate) mod mock;

// Re-export for convenience
pub use cache::{CATALOG_TTL, CROSSREF_TTL, CacheKey, CachedBody, IdentifierCache, IdentifierStore};
pub use catalog::{CatalogPipeline, CatalogResponse, LookupError, Provenance};
pub use crossref::{AnimeApiBackend, CrossRefBackend, DEFAULT_MAPPING_URL};
pub use origin::{OriginBackend, StaticOriginBackend};
pub use resolver::CrossRefResolver;

/// Which slice of the static dataset a request addresses.
///
/// The variant picks the origin path segment (`/api/<kind>/<id>.json`) and the
/// cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogKind {
    MyAnimeList,
    TvdbSeries,
    TvdbMovie,
}

impl CatalogKind {
    pub const ALL: [CatalogKind; 3] = [
        CatalogKind::MyAnimeList,
        CatalogKind::TvdbSeries,
        CatalogKind::TvdbMovie,
    ];

    /// Path segment used both inbound (`/<kind>`) and on the origin.
    pub fn as_str(self) -> &'static str {
        match self {
            CatalogKind::MyAnimeList => "myanimelist",
            CatalogKind::TvdbSeries => "thetvdb-series",
            CatalogKind::TvdbMovie => "thetvdb-movie",
        }
    }

    pub fn from_path(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == segment)
    }

    /// Whether `crossIDs` enrichment applies to records of this kind.
    pub fn supports_cross_ids(self) -> bool {
        match self {
            CatalogKind::MyAnimeList | CatalogKind::TvdbSeries | CatalogKind::TvdbMovie => true,
        }
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound lookup. Built once per call and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub kind: CatalogKind,
    pub id: String,
    pub want_cross_ids: bool,
}

impl LookupRequest {
    pub fn new(kind: CatalogKind, id: impl Into<String>, want_cross_ids: bool) -> Self {
        Self {
            kind,
            id: id.into(),
            want_cross_ids,
        }
    }

    /// Validate the routed path segment and query parameters.
    ///
    /// The path is checked before the id, so `/foo` without an id reports the
    /// bad path. An empty `id=` counts as missing.
    pub fn parse(
        path_segment: &str,
        id: Option<&str>,
        want_cross_ids: bool,
    ) -> Result<Self, LookupError> {
        let kind = CatalogKind::from_path(path_segment)
            .ok_or_else(|| LookupError::UnknownPath(path_segment.to_string()))?;
        let id = id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(LookupError::MissingId)?;
        Ok(Self::new(kind, id, want_cross_ids))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Server misconfigured: dataset {0} is not set")]
    MissingIdentity(&'static str),
}

/// Default per-fetch timeout for the static origin.
pub const DEFAULT_ORIGIN_TIMEOUT_SECS: u64 = 10;

/// Default per-fetch timeout for the mapping service.
pub const DEFAULT_CROSSREF_TIMEOUT_SECS: u64 = 5;

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Owner identity of the hosted dataset (first origin path component).
    pub dataset_owner: Option<String>,
    /// Repository identity of the hosted dataset.
    pub dataset_repo: Option<String>,
    /// Replaces `https://<owner>/<repo>` as the origin base when set.
    pub origin_url: Option<String>,
    /// Base URL of the identifier-mapping service.
    pub mapping_url: String,
    pub origin_timeout_secs: u64,
    pub crossref_timeout_secs: u64,
    /// Path to the persistent SQLite cache database (optional).
    /// When unset the identifier cache is in-memory only.
    pub cache_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset_owner: None,
            dataset_repo: None,
            origin_url: None,
            mapping_url: DEFAULT_MAPPING_URL.to_string(),
            origin_timeout_secs: DEFAULT_ORIGIN_TIMEOUT_SECS,
            crossref_timeout_secs: DEFAULT_CROSSREF_TIMEOUT_SECS,
            cache_path: None,
        }
    }
}

impl Config {
    /// Base URL of the static dataset.
    ///
    /// Both identity values are required even when `origin_url` overrides the
    /// base; a server without them answers every request with a 500.
    pub fn origin_base(&self) -> Result<String, ConfigError> {
        let owner = non_empty(self.dataset_owner.as_deref())
            .ok_or(ConfigError::MissingIdentity("owner"))?;
        let repo = non_empty(self.dataset_repo.as_deref())
            .ok_or(ConfigError::MissingIdentity("repo"))?;

        let base = match non_empty(self.origin_url.as_deref()) {
            Some(url) => url.to_string(),
            None => format!("https://{owner}/{repo}"),
        };
        Ok(base.trim_end_matches('/').to_string())
    }

    pub fn origin_timeout(&self) -> Duration {
        Duration::from_secs(self.origin_timeout_secs)
    }

    pub fn crossref_timeout(&self) -> Duration {
        Duration::from_secs(self.crossref_timeout_secs)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Build an [`IdentifierCache`] from configuration.
///
/// If `cache_path` is set, opens a persistent SQLite-backed cache.
/// Otherwise, returns an in-memory-only cache.
pub fn build_identifier_cache(cache_path: Option<&Path>) -> Arc<IdentifierCache> {
    if let Some(path) = cache_path {
        match open_persistent(path) {
            Ok(cache) => {
                tracing::info!(path = %path.display(), rows = cache.disk_len(), "opened persistent cache");
                return Arc::new(cache);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to open cache, falling back to in-memory");
            }
        }
    }
    Arc::new(IdentifierCache::new())
}

fn open_persistent(path: &Path) -> Result<IdentifierCache, cache::CacheError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| cache::CacheError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    IdentifierCache::open(path)
}
