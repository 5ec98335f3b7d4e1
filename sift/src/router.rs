use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::progress::{self, ProgressBus};
use crate::upload;

/// Shared handler state: the process-wide progress bus plus the pipeline
/// tunables lifted out of [`Config`].
#[derive(Clone)]
pub struct State {
    pub progress: ProgressBus,
    pub estimated_line_bytes: u64,
    pub line_buffer: usize,
}

async fn index() -> &'static str {
    "sift"
}

pub fn router(config: &Config, progress: ProgressBus) -> Router {
    let state = State {
        progress,
        estimated_line_bytes: config.estimated_line_bytes,
        line_buffer: config.line_buffer,
    };

    // The browser client is served from another origin, so mirror whatever
    // it sends.
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .allow_origin(AllowOrigin::mirror_request());

    Router::new()
        .route("/", get(index))
        .route("/_liveness", get(index))
        .route("/upload", post(upload::upload))
        .route("/progress", get(progress::subscribe))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
