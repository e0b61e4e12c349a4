use axum::extract::{Path, Query, State};
use axum::http::Uri;
use axum::response::Response;
use std::collections::HashMap;
use std::sync::Arc;

use animap_core::{LookupError, LookupRequest};

use crate::response::{self, ApiError};
use crate::state::AppState;

/// Presence-only query flag requesting cross-reference enrichment.
pub const CROSS_IDS_PARAM: &str = "crossIDs";

pub async fn lookup(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let pipeline = state.pipeline()?;
    let request = LookupRequest::parse(
        &kind,
        params.get("id").map(String::as_str),
        params.contains_key(CROSS_IDS_PARAM),
    )?;

    let resp = pipeline.lookup(&request).await?;
    tracing::debug!(
        kind = %request.kind,
        id = %request.id,
        provenance = resp.provenance.header_value(),
        enriched = resp.enriched,
        "lookup served"
    );
    Ok(response::catalog(resp))
}

/// Any path the router does not know, including nested ones.
pub async fn unknown_path(State(state): State<Arc<AppState>>, uri: Uri) -> ApiError {
    if let Err(e) = state.pipeline() {
        return e.into();
    }
    LookupError::UnknownPath(uri.path().trim_start_matches('/').to_string()).into()
}
