//! Response assembly: every outbound response is built here.

use std::any::Any;

use axum::Json;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};

use animap_core::{CatalogResponse, ConfigError, LookupError};

/// Provenance marker: `HIT` when the base record came from the cache.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

const NO_STORE: &str = "no-store";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";

/// A successful lookup: the body as assembled by the pipeline.
pub fn catalog(resp: CatalogResponse) -> Response {
    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, APPLICATION_JSON),
            (CACHE_CONTROL, NO_STORE),
            (X_CACHE, resp.provenance.header_value()),
        ],
        resp.body,
    )
        .into_response()
}

pub fn text(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        [(CONTENT_TYPE, TEXT_PLAIN), (CACHE_CONTROL, NO_STORE)],
        message.into(),
    )
        .into_response()
}

/// Error wrapper so handlers can return `Result<_, ApiError>` with `?`.
#[derive(Debug)]
pub struct ApiError(pub LookupError);

impl From<LookupError> for ApiError {
    fn from(e: LookupError) -> Self {
        Self(e)
    }
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        Self(LookupError::Config(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.0.to_string();
        match self.0 {
            LookupError::UnknownPath(_) | LookupError::MissingId => {
                text(StatusCode::BAD_REQUEST, message)
            }
            LookupError::NotFound { .. } => (
                StatusCode::NOT_FOUND,
                [(CACHE_CONTROL, NO_STORE)],
                Json(serde_json::json!({ "message": message })),
            )
                .into_response(),
            LookupError::Config(_) | LookupError::Internal(_) => {
                tracing::error!(error = %message, "request failed");
                text(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        }
    }
}

/// `CatchPanicLayer` hook: a 500 carrying only the panic message.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "Unknown panic message".to_string()
    };
    tracing::error!(panic = %message, "handler panicked");
    text(StatusCode::INTERNAL_SERVER_ERROR, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use animap_core::{CatalogKind, Provenance};
    use axum::body::to_bytes;

    async fn body_string(resp: Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn catalog_sets_provenance_and_no_store() {
        let resp = catalog(CatalogResponse {
            body: "[1, 2]".into(),
            provenance: Provenance::Cache,
            enriched: false,
        });
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(resp.headers()[CACHE_CONTROL], "no-store");
        assert_eq!(resp.headers()["x-cache"], "HIT");
        assert_eq!(body_string(resp).await, "[1, 2]");
    }

    #[tokio::test]
    async fn not_found_is_json_message() {
        let resp = ApiError(LookupError::NotFound {
            kind: CatalogKind::TvdbSeries,
            id: "999999".into(),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(resp.headers()[CACHE_CONTROL], "no-store");
        assert_eq!(
            body_string(resp).await,
            r#"{"message":"Data not found for thetvdb-series/999999"}"#
        );
    }

    #[tokio::test]
    async fn client_and_config_errors_are_plain_text() {
        let resp = ApiError(LookupError::MissingId).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(
            resp.headers()[CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
        assert_eq!(
            body_string(resp).await,
            "Missing required query parameter: id"
        );

        let resp = ApiError::from(ConfigError::MissingIdentity("repo")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_string(resp).await,
            "Server misconfigured: dataset repo is not set"
        );
    }

    #[tokio::test]
    async fn panic_message_is_reported() {
        let resp = panic_response(Box::new("boom"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(resp).await, "boom");

        let resp = panic_response(Box::new(String::from("owned boom")));
        assert_eq!(body_string(resp).await, "owned boom");
    }
}
