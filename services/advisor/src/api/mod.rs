//! HTTP API handlers and routing.

mod extender;
mod health;

use axum::{routing::post, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the advisory router with all routes and middleware.
///
/// The panic-recovery layer turns a panicking handler into a 500 so a single
/// bad request can never terminate the advisor.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/filter", post(extender::filter))
        .route("/prioritize", post(extender::prioritize))
        .merge(health::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
