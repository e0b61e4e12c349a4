//! Catalog lookup pipeline: cache check, origin fetch, optional `crossIDs`
//! enrichment.
//!
//! The cached catalog entry never depends on the `crossIDs` flag. Enriched
//! bodies are assembled per request and are not cached themselves; only the
//! records they are built from are.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::cache::{CATALOG_TTL, CacheKey, IdentifierStore};
use crate::crossref::AnimeApiBackend;
use crate::enrich;
use crate::origin::{OriginBackend, StaticOriginBackend};
use crate::resolver::CrossRefResolver;
use crate::{CatalogKind, Config, ConfigError, LookupRequest};

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Invalid path: /{0}")]
    UnknownPath(String),
    #[error("Missing required query parameter: id")]
    MissingId,
    #[error("Data not found for {kind}/{id}")]
    NotFound { kind: CatalogKind, id: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Internal(String),
}

/// Where the base record of a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Cache,
    Origin,
}

impl Provenance {
    /// Value of the `X-Cache` response header.
    pub fn header_value(self) -> &'static str {
        match self {
            Provenance::Cache => "HIT",
            Provenance::Origin => "MISS",
        }
    }
}

/// A successful lookup, ready for the response assembler.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogResponse {
    /// Serialized JSON body. Verbatim origin text unless `enriched`.
    pub body: String,
    pub provenance: Provenance,
    pub enriched: bool,
}

pub struct CatalogPipeline {
    cache: Arc<dyn IdentifierStore>,
    origin: Arc<dyn OriginBackend>,
    resolver: CrossRefResolver,
    client: reqwest::Client,
    origin_timeout: Duration,
}

impl CatalogPipeline {
    pub fn new(
        cache: Arc<dyn IdentifierStore>,
        origin: Arc<dyn OriginBackend>,
        resolver: CrossRefResolver,
        client: reqwest::Client,
        origin_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            origin,
            resolver,
            client,
            origin_timeout,
        }
    }

    /// Wire the HTTP origin and mapping service from `config`.
    ///
    /// Fails without touching the network when the dataset identity is missing.
    pub fn from_config(
        config: &Config,
        cache: Arc<dyn IdentifierStore>,
        client: reqwest::Client,
    ) -> Result<Self, ConfigError> {
        let origin = StaticOriginBackend::new(config.origin_base()?);
        let resolver = CrossRefResolver::new(
            Arc::new(AnimeApiBackend::new(config.mapping_url.clone())),
            Arc::clone(&cache),
            client.clone(),
            config.crossref_timeout(),
        );
        Ok(Self::new(
            cache,
            Arc::new(origin),
            resolver,
            client,
            config.origin_timeout(),
        ))
    }

    pub async fn lookup(&self, request: &LookupRequest) -> Result<CatalogResponse, LookupError> {
        let key = CacheKey::catalog(request.kind, &request.id);

        let (raw, value, provenance) = match self.cache.get(&key) {
            Some(hit) => {
                tracing::debug!(kind = %request.kind, id = %request.id, "catalog cache hit");
                if !request.want_cross_ids {
                    return Ok(CatalogResponse {
                        body: hit.raw,
                        provenance: Provenance::Cache,
                        enriched: false,
                    });
                }
                (hit.raw, hit.value, Provenance::Cache)
            }
            None => {
                let (raw, value) = self.fetch_origin(request, &key).await?;
                (raw, value, Provenance::Origin)
            }
        };

        let passthrough = |body: String| {
            Ok(CatalogResponse {
                body,
                provenance,
                enriched: false,
            })
        };

        if !(request.want_cross_ids && request.kind.supports_cross_ids()) {
            return passthrough(raw);
        }
        let Some(items) = value.as_array().filter(|items| !items.is_empty()) else {
            return passthrough(raw);
        };

        let mal_ids = enrich::collect_mal_ids(items);
        let cross_refs = self.resolver.resolve(&mal_ids).await;
        let merged = enrich::merge_items(items, &cross_refs);
        let body =
            serde_json::to_string(&merged).map_err(|e| LookupError::Internal(e.to_string()))?;

        Ok(CatalogResponse {
            body,
            provenance,
            enriched: true,
        })
    }

    /// Fetch from the origin and cache the raw record. Failures are never cached.
    async fn fetch_origin(
        &self,
        request: &LookupRequest,
        key: &CacheKey,
    ) -> Result<(String, Value), LookupError> {
        let record = self
            .origin
            .fetch(request.kind, &request.id, &self.client, self.origin_timeout)
            .await
            .map_err(|e| {
                tracing::debug!(
                    origin = self.origin.name(),
                    kind = %request.kind,
                    id = %request.id,
                    error = %e,
                    "origin fetch failed"
                );
                LookupError::NotFound {
                    kind: request.kind,
                    id: request.id.clone(),
                }
            })?;

        if let Err(e) = self.cache.put(key, &record.raw, CATALOG_TTL) {
            tracing::warn!(key = %key, error = %e, "failed to cache catalog record");
        }
        Ok((record.raw, record.value))
    }
}
