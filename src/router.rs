use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
};
use tower::ServiceBuilder;

use crate::{
    AppState,
    middleware::{log_rejections, rate_limit},
    routes,
};

/// Every route sits behind admission control; rejections and server errors
/// are logged on the way out.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::demo::root))
        .route("/test", get(routes::demo::echo_headers))
        .route("/protected", get(routes::demo::protected))
        .route("/stats", get(routes::stats::counters))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(log_rejections))
                .layer(from_fn_with_state(state.clone(), rate_limit)),
        )
        .with_state(state)
}
