//! Identifier-mapping service client (`GET <base>/myanimelist/<id>`).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Public mapping service used when none is configured.
pub const DEFAULT_MAPPING_URL: &str = "https://animeapi.my.id";

#[derive(Error, Debug)]
pub enum CrossRefError {
    #[error("Rate limited (429)")]
    RateLimited,
    #[error("HTTP {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed JSON body: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A service that maps one MyAnimeList id to a record of ids in other schemes.
pub trait CrossRefBackend: Send + Sync {
    /// The canonical name of this service, for logs.
    fn name(&self) -> &str;

    /// Fetch the mapping record for `mal_id`. The record is treated opaquely.
    fn fetch<'a>(
        &'a self,
        mal_id: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Value, CrossRefError>> + Send + 'a>>;
}

pub struct AnimeApiBackend {
    pub base_url: String,
}

impl AnimeApiBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn record_url(&self, mal_id: &str) -> String {
        format!(
            "{}/myanimelist/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(mal_id)
        )
    }
}

impl CrossRefBackend for AnimeApiBackend {
    fn name(&self) -> &str {
        "AnimeAPI"
    }

    fn fetch<'a>(
        &'a self,
        mal_id: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Value, CrossRefError>> + Send + 'a>> {
        Box::pin(async move {
            let resp = client
                .get(self.record_url(mal_id))
                .timeout(timeout)
                .send()
                .await?;

            let status = resp.status();
            if status.as_u16() == 429 {
                return Err(CrossRefError::RateLimited);
            }
            if !status.is_success() {
                return Err(CrossRefError::Status(status.as_u16()));
            }

            let bytes = resp.bytes().await?;
            Ok(serde_json::from_slice(&bytes)?)
        })
    }
}
