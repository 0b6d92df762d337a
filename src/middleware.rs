//! Authentication gateway and origin gate.
//!
//! Handlers declare what they need through their arguments:
//! [`Viewer`] (anyone, identified when possible), [`Authenticated`] or
//! [`Administrator`].

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::AppState;
use crate::error::{AuthFailure, ResponseError, Result, ServerError};
use crate::user::Identity;

/// Token carried by `Authorization: Bearer <token>`, if any.
fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn resolve(state: &AppState, token: &str) -> Result<Identity> {
    match state.users.resolve(token).await {
        Ok(Some(identity)) => Ok(identity),
        Ok(None) | Err(ServerError::InvalidToken) => {
            Err(ServerError::Unauthorized(AuthFailure::Invalid))
        },
        Err(err) => Err(err),
    }
}

/// Any signed-in user.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Identity);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self> {
        let token = bearer(&parts.headers)
            .ok_or(ServerError::Unauthorized(AuthFailure::Missing))?;

        resolve(state, token).await.map(Authenticated)
    }
}

/// A signed-in user with the administrator role.
#[derive(Debug, Clone)]
pub struct Administrator(pub Identity);

impl FromRequestParts<AppState> for Administrator {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self> {
        let Authenticated(identity) =
            Authenticated::from_request_parts(parts, state).await?;

        if !identity.is_admin() {
            tracing::debug!(user = %identity.id, "administrator role required");
            return Err(ServerError::Forbidden);
        }
        Ok(Administrator(identity))
    }
}

/// Caller identity when a credential is sent. A bad credential still fails.
#[derive(Debug, Clone)]
pub struct Viewer(pub Option<Identity>);

impl Viewer {
    pub fn is_admin(&self) -> bool {
        self.0.as_ref().is_some_and(Identity::is_admin)
    }
}

impl FromRequestParts<AppState> for Viewer {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self> {
        if !parts.headers.contains_key(header::AUTHORIZATION) {
            return Ok(Viewer(None));
        }

        Authenticated::from_request_parts(parts, state)
            .await
            .map(|Authenticated(identity)| Viewer(Some(identity)))
    }
}

/// Reject browser requests from origins outside the allowlist. Requests
/// without `Origin` pass.
pub async fn origin_gate(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .map(|origin| origin.to_str().unwrap_or_default());

    match origin {
        Some(origin)
            if !state
                .config
                .cors
                .allowed_origins
                .iter()
                .any(|allowed| allowed == origin) =>
        {
            tracing::debug!(%origin, "origin rejected");

            ResponseError::default()
                .title("Origin not allowed.")
                .details("Not allowed by CORS.")
                .status(StatusCode::FORBIDDEN)
                .into_response()
                .unwrap_or_else(|_| StatusCode::FORBIDDEN.into_response())
        },
        _ => next.run(req).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer a.b.c".parse().unwrap());
        assert_eq!(bearer(&headers), Some("a.b.c"));
    }
}
