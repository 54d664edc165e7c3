pub mod auth;
pub mod response;
pub mod rpc;
pub mod sse;
pub mod state;

pub use state::AppState;

use axum::{
    routing::{get, post},
    Json, Router,
};
use evento_protocol::HealthStatus;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/rpc", post(rpc::rpc_handler))
        .route("/subscribe", get(sse::subscribe_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_owned(),
    })
}
