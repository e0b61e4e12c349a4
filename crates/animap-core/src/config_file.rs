use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Config;

/// Default listen address for the HTTP server.
pub const DEFAULT_BIND: &str = "0.0.0.0:8787";

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub dataset: Option<DatasetConfig>,
    pub services: Option<ServicesConfig>,
    pub timeouts: Option<TimeoutsConfig>,
    pub cache: Option<CacheConfig>,
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub origin_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub mapping_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    pub origin_secs: Option<u64>,
    pub crossref_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
}

/// Platform config directory path: `<config_dir>/animap/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("animap").join("config.toml"))
}

/// Load config by cascading CWD `.animap.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".animap.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        dataset: Some(DatasetConfig {
            owner: overlay
                .dataset
                .as_ref()
                .and_then(|d| d.owner.clone())
                .or_else(|| base.dataset.as_ref().and_then(|d| d.owner.clone())),
            repo: overlay
                .dataset
                .as_ref()
                .and_then(|d| d.repo.clone())
                .or_else(|| base.dataset.as_ref().and_then(|d| d.repo.clone())),
            origin_url: overlay
                .dataset
                .as_ref()
                .and_then(|d| d.origin_url.clone())
                .or_else(|| base.dataset.as_ref().and_then(|d| d.origin_url.clone())),
        }),
        services: Some(ServicesConfig {
            mapping_url: overlay
                .services
                .as_ref()
                .and_then(|s| s.mapping_url.clone())
                .or_else(|| base.services.as_ref().and_then(|s| s.mapping_url.clone())),
        }),
        timeouts: Some(TimeoutsConfig {
            origin_secs: overlay
                .timeouts
                .as_ref()
                .and_then(|t| t.origin_secs)
                .or_else(|| base.timeouts.as_ref().and_then(|t| t.origin_secs)),
            crossref_secs: overlay
                .timeouts
                .as_ref()
                .and_then(|t| t.crossref_secs)
                .or_else(|| base.timeouts.as_ref().and_then(|t| t.crossref_secs)),
        }),
        cache: Some(CacheConfig {
            path: overlay
                .cache
                .as_ref()
                .and_then(|c| c.path.clone())
                .or_else(|| base.cache.as_ref().and_then(|c| c.path.clone())),
        }),
        server: Some(ServerConfig {
            bind: overlay
                .server
                .as_ref()
                .and_then(|s| s.bind.clone())
                .or_else(|| base.server.as_ref().and_then(|s| s.bind.clone())),
        }),
    }
}

/// Apply `ANIMAP_*` environment overrides on top of file values.
///
/// `var` looks up one variable; empty values are ignored.
pub fn apply_env<F>(mut config: ConfigFile, var: F) -> ConfigFile
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| var(name).filter(|v| !v.trim().is_empty());

    let dataset = config.dataset.get_or_insert_with(Default::default);
    if let Some(v) = get("ANIMAP_DATASET_OWNER") {
        dataset.owner = Some(v);
    }
    if let Some(v) = get("ANIMAP_DATASET_REPO") {
        dataset.repo = Some(v);
    }
    if let Some(v) = get("ANIMAP_ORIGIN_URL") {
        dataset.origin_url = Some(v);
    }
    if let Some(v) = get("ANIMAP_MAPPING_URL") {
        config
            .services
            .get_or_insert_with(Default::default)
            .mapping_url = Some(v);
    }
    if let Some(v) = get("ANIMAP_CACHE_PATH") {
        config.cache.get_or_insert_with(Default::default).path = Some(v);
    }
    if let Some(v) = get("ANIMAP_BIND") {
        config.server.get_or_insert_with(Default::default).bind = Some(v);
    }
    config
}

impl ConfigFile {
    /// Resolve into runtime [`Config`], filling unset values with defaults.
    pub fn to_config(&self) -> Config {
        let defaults = Config::default();
        let dataset = self.dataset.clone().unwrap_or_default();
        let timeouts = self.timeouts.clone().unwrap_or_default();

        Config {
            dataset_owner: dataset.owner,
            dataset_repo: dataset.repo,
            origin_url: dataset.origin_url,
            mapping_url: self
                .services
                .as_ref()
                .and_then(|s| s.mapping_url.clone())
                .unwrap_or(defaults.mapping_url),
            origin_timeout_secs: timeouts.origin_secs.unwrap_or(defaults.origin_timeout_secs),
            crossref_timeout_secs: timeouts
                .crossref_secs
                .unwrap_or(defaults.crossref_timeout_secs),
            cache_path: self
                .cache
                .as_ref()
                .and_then(|c| c.path.as_deref())
                .map(PathBuf::from),
        }
    }

    pub fn bind_addr(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.bind.clone())
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
    }
}
