//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Cryptographic utilities (random tokens, SHA-256, base64url)
//! - Caller identification from gateway-forwarded headers

pub mod client;
pub mod crypto;
