use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use std::sync::Arc;

use crate::response::{self, ApiError};
use crate::state::AppState;
use crate::template;

pub async fn index(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    state.pipeline()?;
    Ok(response::text(StatusCode::OK, template::usage()))
}
