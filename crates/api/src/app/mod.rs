//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: the coordinator and request deadline shared by handlers
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use ewallet_infra::LedgerStore;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
pub fn build_app<S>(services: Arc<AppServices<S>>) -> Router
where
    S: LedgerStore + 'static,
{
    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api/v1", routes::router::<S>())
        .layer(Extension(services))
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::request_id)))
}
