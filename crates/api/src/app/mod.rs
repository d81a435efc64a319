use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

pub mod errors;
pub mod routes;
pub mod services;

use crate::middleware;
use services::AppServices;

/// Build the HTTP router over already-wired services.
///
/// Kept free of IO so tests can build the same router the binary serves.
pub fn build_app(services: AppServices) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(
                    middleware::request_context_middleware,
                ))
                .layer(Extension(services)),
        )
}
