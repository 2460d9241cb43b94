//! Rental Router

use crate::application::config::RentalConfig;
use crate::domain::clock::Clock;
use crate::domain::repository::RentalStore;
use crate::infra::postgres::PgRentalRepository;
use crate::presentation::handlers::{self, RentalAppState};
use crate::presentation::middleware::require_actor;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;

/// Create the rental router with PostgreSQL repository
pub fn rental_router(
    repo: PgRentalRepository,
    config: RentalConfig,
    clock: Arc<dyn Clock>,
) -> Router {
    rental_router_generic(repo, config, clock)
}

/// Create a generic rental router for any repository implementation
pub fn rental_router_generic<R>(repo: R, config: RentalConfig, clock: Arc<dyn Clock>) -> Router
where
    R: RentalStore,
{
    let state = RentalAppState {
        repo: Arc::new(repo),
        config: Arc::new(config),
        clock,
    };

    Router::new()
        .route("/rental/generate", post(handlers::generate_rental::<R>))
        .route("/rental/process", post(handlers::process_rental::<R>))
        .route("/return/generate", post(handlers::generate_return::<R>))
        .route("/return/process", post(handlers::process_return::<R>))
        .route("/qr/validate", post(handlers::validate_token::<R>))
        .route("/rentals/{id}/receipt", get(handlers::get_receipt::<R>))
        .layer(middleware::from_fn(require_actor))
        .with_state(state)
}
