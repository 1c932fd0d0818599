//! Authentication middleware.
//!
//! Extracts a Bearer token from the `Authorization` header. When the server
//! has an `AUTH_SECRET`, the token must match it; without one every request
//! is accepted, anonymous requests included.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};

use crate::AppState;

/// Token recorded for requests admitted without credentials.
pub const ANONYMOUS: &str = "anonymous";

/// Authenticated caller extracted from request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The bearer token, or `anonymous` when auth is disabled
    pub token: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        authorize(auth_header, state.config.auth_secret.as_deref())
    }
}

/// Decide whether an `Authorization` header value is acceptable.
fn authorize(
    header: Option<&str>,
    secret: Option<&str>,
) -> Result<AuthUser, (StatusCode, &'static str)> {
    match header {
        Some(header) if header.starts_with("Bearer ") => {
            let token = header.trim_start_matches("Bearer ").trim();
            if token.is_empty() {
                return Err((StatusCode::UNAUTHORIZED, "Empty bearer token"));
            }
            if let Some(secret) = secret {
                if token != secret {
                    tracing::debug!("Rejected bearer token");
                    return Err((StatusCode::UNAUTHORIZED, "Invalid bearer token"));
                }
            }
            Ok(AuthUser {
                token: token.to_string(),
            })
        }
        Some(_) => Err((
            StatusCode::UNAUTHORIZED,
            "Invalid authorization header format",
        )),
        None if secret.is_none() => Ok(AuthUser {
            token: ANONYMOUS.to_string(),
        }),
        None => Err((StatusCode::UNAUTHORIZED, "Missing authorization header")),
    }
}
