//! Static dataset origin: `<base>/api/<kind>/<id>.json`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use thiserror::Error;

use crate::CatalogKind;

/// A record fetched from the origin: the body as served plus its parsed form.
#[derive(Debug, Clone)]
pub struct OriginRecord {
    pub raw: String,
    pub value: serde_json::Value,
}

#[derive(Error, Debug)]
pub enum OriginError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("unexpected content type: {}", .0.as_deref().unwrap_or("<none>"))]
    NotJson(Option<String>),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed JSON body: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A source of catalog records.
pub trait OriginBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the record for `(kind, id)`. Any error means "not found" to the caller.
    fn fetch<'a>(
        &'a self,
        kind: CatalogKind,
        id: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<OriginRecord, OriginError>> + Send + 'a>>;
}

/// The pre-generated JSON dataset served as static files.
pub struct StaticOriginBackend {
    pub base_url: String,
}

impl StaticOriginBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn record_url(&self, kind: CatalogKind, id: &str) -> String {
        format!(
            "{}/api/{}/{}.json",
            self.base_url.trim_end_matches('/'),
            kind,
            urlencoding::encode(id)
        )
    }
}

fn is_json_content_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

impl OriginBackend for StaticOriginBackend {
    fn name(&self) -> &str {
        "static-origin"
    }

    fn fetch<'a>(
        &'a self,
        kind: CatalogKind,
        id: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<OriginRecord, OriginError>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.record_url(kind, id);
            let resp = client.get(&url).timeout(timeout).send().await?;

            let status = resp.status();
            if !status.is_success() {
                return Err(OriginError::Status(status.as_u16()));
            }

            let content_type = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if !content_type.as_deref().is_some_and(is_json_content_type) {
                return Err(OriginError::NotJson(content_type));
            }

            let raw = resp.text().await?;
            let value = serde_json::from_str(&raw)?;
            Ok(OriginRecord { raw, value })
        })
    }
}
