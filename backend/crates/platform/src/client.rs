//! Caller identification utilities
//!
//! Authentication happens upstream (API gateway / auth service). By the time a
//! request reaches this backend the gateway has attached the authenticated
//! caller as two headers, which are read here.

use axum::http::HeaderMap;
use uuid::Uuid;

/// Header carrying the authenticated caller's user ID (UUID)
pub const ACTOR_ID_HEADER: &str = "x-actor-id";

/// Header carrying the authenticated caller's role code
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Raw caller identity as forwarded by the gateway.
///
/// The role is left as its wire code; domain crates decide which codes exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorHeaders {
    pub id: Uuid,
    pub role: String,
}

/// Error when extracting caller identity
#[derive(Debug, Clone, thiserror::Error)]
pub enum ActorError {
    #[error("Missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("Malformed header: {0}")]
    MalformedHeader(&'static str),
}

/// Extract the caller identity from request headers
///
/// ## Returns
/// * `Ok(ActorHeaders)` - both headers present and the ID parses as a UUID
/// * `Err(ActorError)` - a header is missing, not ASCII, or not a UUID
pub fn extract_actor(headers: &HeaderMap) -> Result<ActorHeaders, ActorError> {
    let id = header_str(headers, ACTOR_ID_HEADER)?;
    let id = Uuid::parse_str(id.trim()).map_err(|_| ActorError::MalformedHeader(ACTOR_ID_HEADER))?;

    let role = header_str(headers, ACTOR_ROLE_HEADER)?.trim().to_ascii_lowercase();
    if role.is_empty() {
        return Err(ActorError::MalformedHeader(ACTOR_ROLE_HEADER));
    }

    Ok(ActorHeaders { id, role })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, ActorError> {
    headers
        .get(name)
        .ok_or(ActorError::MissingHeader(name))?
        .to_str()
        .map_err(|_| ActorError::MalformedHeader(name))
}
