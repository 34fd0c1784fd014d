use axum::Router;

use ewallet_infra::LedgerStore;

pub mod accounts;
pub mod system;

/// Router for all versioned endpoints.
pub fn router<S>() -> Router
where
    S: LedgerStore + 'static,
{
    Router::new().nest("/accounts", accounts::router::<S>())
}
