//! Rental Middleware

use crate::domain::value_objects::{Actor, Role};
use crate::error::RentalError;
use axum::body::Body;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use platform::client::{ACTOR_ROLE_HEADER, extract_actor};

/// Header set on 401 responses so clients know to re-authenticate
pub const ACTOR_REQUIRED_HEADER: &str = "x-actor-required";

/// Middleware that requires the gateway-supplied caller identity.
///
/// On success the [`Actor`] is stored in request extensions for handlers.
pub async fn require_actor(mut req: Request<Body>, next: Next) -> Result<Response, Response> {
    let actor = match extract_actor(req.headers()) {
        Ok(headers) => match Role::from_code(&headers.role) {
            Some(role) => Actor::new(headers.id.into(), role),
            None => {
                tracing::warn!(role = %headers.role, "Unknown actor role");
                return Err(reject(RentalError::ActorRequired(format!(
                    "Malformed header: {}",
                    ACTOR_ROLE_HEADER
                ))));
            }
        },
        Err(e) => {
            tracing::debug!(error = %e, "Request without caller identity");
            return Err(reject(e.into()));
        }
    };

    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}

fn reject(err: RentalError) -> Response {
    let mut response = err.into_response();
    response
        .headers_mut()
        .insert(ACTOR_REQUIRED_HEADER, HeaderValue::from_static("true"));
    response
}
