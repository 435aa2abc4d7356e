use axum::{middleware, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

mod after_response;
mod health;
mod hello;

pub use health::health;

use crate::state::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/hello", get(hello::routes::hello))
        .layer(middleware::from_fn_with_state(
            state.background.clone(),
            after_response::run_after_response,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> &'static str {
    "Try GET /api/hello?visitorId=<id>"
}
