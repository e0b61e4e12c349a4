//! Mock origin, mapping service and store for testing.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::Value;

use crate::CatalogKind;
use crate::cache::{CacheError, CacheKey, CachedBody, IdentifierStore};
use crate::crossref::{CrossRefBackend, CrossRefError};
use crate::origin::{OriginBackend, OriginError, OriginRecord};

/// A configurable mock response.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Serve this text as `application/json`.
    Json(String),
    /// Serve a body with a non-JSON content type.
    NotJson,
    /// Fail with this HTTP status.
    Status(u16),
}

impl MockResponse {
    pub fn json(value: Value) -> Self {
        MockResponse::Json(value.to_string())
    }
}

/// A hand-rolled [`OriginBackend`] keyed by `(kind, id)`.
///
/// Unknown ids answer 404. Calls are counted per id.
#[derive(Default)]
pub struct MockOrigin {
    records: HashMap<(CatalogKind, String), MockResponse>,
    calls: Mutex<Vec<String>>,
}

impl MockOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: CatalogKind, id: &str, response: MockResponse) -> Self {
        self.records.insert((kind, id.to_string()), response);
        self
    }

    /// How many times `fetch()` has been called.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl OriginBackend for MockOrigin {
    fn name(&self) -> &str {
        "mock-origin"
    }

    fn fetch<'a>(
        &'a self,
        kind: CatalogKind,
        id: &'a str,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<OriginRecord, OriginError>> + Send + 'a>> {
        self.calls.lock().unwrap().push(format!("{kind}/{id}"));
        let response = self
            .records
            .get(&(kind, id.to_string()))
            .cloned()
            .unwrap_or(MockResponse::Status(404));

        Box::pin(async move {
            match response {
                MockResponse::Json(raw) => {
                    let value = serde_json::from_str(&raw)?;
                    Ok(OriginRecord { raw, value })
                }
                MockResponse::NotJson => Err(OriginError::NotJson(Some("text/html".into()))),
                MockResponse::Status(code) => Err(OriginError::Status(code)),
            }
        })
    }
}

/// A hand-rolled [`CrossRefBackend`] keyed by MyAnimeList id.
///
/// Supports per-id latency so completion order can differ from request order.
#[derive(Default)]
pub struct MockCrossRef {
    records: HashMap<String, MockResponse>,
    delays: HashMap<String, Duration>,
    call_count: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl MockCrossRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, mal_id: &str, response: MockResponse) -> Self {
        self.records.insert(mal_id.to_string(), response);
        self
    }

    pub fn with_delay(mut self, mal_id: &str, delay: Duration) -> Self {
        self.delays.insert(mal_id.to_string(), delay);
        self
    }

    /// How many times `fetch()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Ids fetched so far, sorted.
    pub fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }
}

impl CrossRefBackend for MockCrossRef {
    fn name(&self) -> &str {
        "mock-crossref"
    }

    fn fetch<'a>(
        &'a self,
        mal_id: &'a str,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Value, CrossRefError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(mal_id.to_string());
        let response = self
            .records
            .get(mal_id)
            .cloned()
            .unwrap_or(MockResponse::Status(404));
        let delay = self.delays.get(mal_id).copied();

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            match response {
                MockResponse::Json(raw) => Ok(serde_json::from_str(&raw)?),
                MockResponse::NotJson => Err(CrossRefError::Status(406)),
                MockResponse::Status(429) => Err(CrossRefError::RateLimited),
                MockResponse::Status(code) => Err(CrossRefError::Status(code)),
            }
        })
    }
}

/// A store that never hits and rejects every write.
#[derive(Default)]
pub struct FailingStore {
    put_attempts: AtomicUsize,
}

impl FailingStore {
    pub fn put_attempts(&self) -> usize {
        self.put_attempts.load(Ordering::SeqCst)
    }
}

impl IdentifierStore for FailingStore {
    fn get(&self, _key: &CacheKey) -> Option<CachedBody> {
        None
    }

    fn put(&self, _key: &CacheKey, _body: &str, _ttl: Duration) -> Result<(), CacheError> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Poisoned)
    }
}
