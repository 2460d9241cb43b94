//! Domain Layer - Business logic and entities
//!
//! This layer contains:
//! - Domain entities (Cycle, Rental, QrToken)
//! - Domain value objects (statuses, TokenId, Role)
//! - Domain services (TTL arithmetic, fine calculator)
//! - QR payload encoding/parsing
//! - Repository traits (interfaces)
//! - The clock abstraction

pub mod clock;
pub mod entities;
pub mod qr;
pub mod repository;
pub mod services;
pub mod value_objects;
