//! Application Layer - Use Cases
//!
//! This layer orchestrates domain logic and infrastructure.
//! Contains use case implementations and the expiry sweeper.

pub mod config;
pub mod inspect_token;
pub mod issue_rental_token;
pub mod issue_return_token;
pub mod receipt;
pub mod redeem_token;
pub mod state_machine;
pub mod sweeper;
