//! Batch resolution of MyAnimeList ids against the mapping service.
//!
//! Every id is looked up in the [`IdentifierStore`] first and fetched only on
//! a miss. Fetches run concurrently in a [`JoinSet`] and the batch always
//! settles: one failing id never cancels its siblings.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::task::JoinSet;

use crate::cache::{CROSSREF_TTL, CacheKey, IdentifierStore};
use crate::crossref::CrossRefBackend;

pub struct CrossRefResolver {
    backend: Arc<dyn CrossRefBackend>,
    cache: Arc<dyn IdentifierStore>,
    client: reqwest::Client,
    timeout: Duration,
}

impl CrossRefResolver {
    pub fn new(
        backend: Arc<dyn CrossRefBackend>,
        cache: Arc<dyn IdentifierStore>,
        client: reqwest::Client,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            cache,
            client,
            timeout,
        }
    }

    /// Resolve every id in `mal_ids`.
    ///
    /// The result holds an entry only for ids that resolved; a missing key
    /// means "no cross-reference data" for that id.
    pub async fn resolve(&self, mal_ids: &BTreeSet<String>) -> HashMap<String, Value> {
        let mut resolved = HashMap::with_capacity(mal_ids.len());
        if mal_ids.is_empty() {
            return resolved;
        }

        let start = Instant::now();
        let mut join_set = JoinSet::new();

        for mal_id in mal_ids {
            let backend = Arc::clone(&self.backend);
            let cache = Arc::clone(&self.cache);
            let client = self.client.clone();
            let timeout = self.timeout;
            let mal_id = mal_id.clone();

            join_set.spawn(async move {
                let record =
                    resolve_one(backend.as_ref(), cache.as_ref(), &mal_id, &client, timeout).await;
                (mal_id, record)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((mal_id, Some(record))) => {
                    resolved.insert(mal_id, record);
                }
                Ok((_, None)) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "cross-reference task did not complete");
                }
            }
        }

        tracing::debug!(
            requested = mal_ids.len(),
            resolved = resolved.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "cross-reference batch settled"
        );
        resolved
    }
}

async fn resolve_one(
    backend: &dyn CrossRefBackend,
    cache: &dyn IdentifierStore,
    mal_id: &str,
    client: &reqwest::Client,
    timeout: Duration,
) -> Option<Value> {
    let key = CacheKey::cross_ref(mal_id);
    if let Some(hit) = cache.get(&key) {
        return Some(hit.value);
    }

    match backend.fetch(mal_id, client, timeout).await {
        Ok(record) => {
            if let Err(e) = cache.put(&key, &record.to_string(), CROSSREF_TTL) {
                tracing::warn!(key = %key, error = %e, "failed to cache cross-reference record");
            }
            Some(record)
        }
        Err(e) => {
            tracing::debug!(source = backend.name(), mal_id, error = %e, "cross-reference lookup failed");
            None
        }
    }
}
