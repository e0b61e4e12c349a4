use std::sync::Arc;

use animap_core::{CatalogPipeline, Config, ConfigError, IdentifierCache, build_identifier_cache};

const USER_AGENT: &str = concat!("animap/", env!("CARGO_PKG_VERSION"));

/// Shared application state accessible from all handlers.
pub struct AppState {
    /// The lookup pipeline, or the configuration error every request reports.
    pub pipeline: Result<Arc<CatalogPipeline>, ConfigError>,
    /// Concrete handle on the pipeline's cache, for stats.
    pub cache: Option<Arc<IdentifierCache>>,
}

impl AppState {
    pub fn new(pipeline: Result<Arc<CatalogPipeline>, ConfigError>) -> Self {
        Self {
            pipeline,
            cache: None,
        }
    }

    /// Build the pipeline from resolved configuration.
    ///
    /// A missing dataset identity is not a startup failure: the server comes
    /// up and answers every request with a 500.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;

        match config.origin_base() {
            Ok(base) => {
                tracing::info!(origin = %base, mapping = %config.mapping_url, "dataset configured");
                let cache = build_identifier_cache(config.cache_path.as_deref());
                tracing::debug!(cache = ?cache, "identifier cache ready");
                let pipeline = CatalogPipeline::from_config(config, cache.clone(), client)
                    .map(Arc::new);
                Ok(Self {
                    pipeline,
                    cache: Some(cache),
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "dataset identity missing, every request will fail");
                Ok(Self::new(Err(e)))
            }
        }
    }

    /// Log cache counters; called once the server stops.
    pub fn log_cache_stats(&self) {
        if let Some(cache) = &self.cache {
            tracing::info!(
                hits = cache.hits(),
                misses = cache.misses(),
                l1_entries = cache.len(),
                l2_entries = cache.disk_len(),
                "identifier cache stats"
            );
        }
    }

    pub fn pipeline(&self) -> Result<&CatalogPipeline, ConfigError> {
        self.pipeline.as_deref().map_err(Clone::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_identity_builds_no_cache() {
        let state = AppState::from_config(&Config::default()).unwrap();
        assert!(state.pipeline.is_err());
        assert!(state.cache.is_none());
        state.log_cache_stats();
    }

    #[test]
    fn configured_state_exposes_cache_counters() {
        let config = Config {
            dataset_owner: Some("animap.github.io".into()),
            dataset_repo: Some("dataset".into()),
            ..Config::default()
        };
        let state = AppState::from_config(&config).unwrap();
        assert!(state.pipeline().is_ok());
        let cache = state.cache.as_ref().unwrap();
        assert_eq!((cache.hits(), cache.misses()), (0, 0));
        assert!(!cache.has_persistence());
        state.log_cache_stats();
    }
}
