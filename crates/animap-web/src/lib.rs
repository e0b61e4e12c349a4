use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;

pub mod handlers;
pub mod response;
pub mod state;
pub mod template;

pub use state::AppState;

/// The HTTP surface: usage text at `/`, one lookup route per catalog kind.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index::index))
        .route("/{kind}", get(handlers::lookup::lookup))
        .fallback(handlers::lookup::unknown_path)
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::custom(response::panic_response))
        .with_state(state)
}
