//! Campus Cycle Rental Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, state graphs, fine rule, QR payloads, repository traits
//! - `application/` - Use cases, the rental state machine and the expiry sweeper
//! - `infra/` - PostgreSQL and in-memory repository implementations
//! - `presentation/` - HTTP handlers, DTOs, caller-identity middleware
//!
//! ## Token Model
//! - Rental and return tokens are short-lived, single-use bearer credentials
//! - The server is the only authority on expiry (`expiresAt`, Unix ms)
//! - Claiming a token is atomic; exactly one concurrent redeemer wins
//! - Issuing a rental token reserves the cycle until it is redeemed or expires

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

// Re-exports for convenience
pub use application::config::{ConfigError, RentalConfig};
pub use application::sweeper::{ExpirySweeper, SweepReport};
pub use domain::clock::{Clock, ManualClock, SystemClock};
pub use error::{RentalError, RentalResult};
pub use infra::memory::InMemoryRentalStore;
pub use infra::postgres::PgRentalRepository;
pub use presentation::router::{rental_router, rental_router_generic};

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};
