// ============================================================================
// Axum Extractors
// ============================================================================
//
// AuthenticatedUser resolves the caller's credential to a canonical user id
// before any handler runs. Accepted credential carriers, in order:
// - Authorization: Bearer <signed token>
// - X-Session-Token: <opaque session token>
// - ?token=<signed token> / ?session=<opaque token> (for EventSource clients
//   that cannot set headers)
//
// ============================================================================

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;

use crate::auth::{Credential, CredentialResolver};
use crate::context::AppContext;
use crate::error::AppError;

/// Extractor for the authenticated user's canonical id
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub String);

#[async_trait]
impl FromRequestParts<Arc<AppContext>> for AuthenticatedUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        let credential = extract_credential(parts).ok_or_else(|| {
            reject(AppError::auth("Missing credentials"))
        })?;

        let user_id = state.auth.resolve(&credential).await.map_err(|e| {
            tracing::warn!(error = %e, "Credential resolution failed");
            reject(e)
        })?;

        Ok(AuthenticatedUser(user_id))
    }
}

fn reject(error: AppError) -> Response {
    let status = error.status_code();
    let body = json!({
        "error": error.user_message(),
        "error_code": error.error_code(),
    });
    (status, axum::Json(body)).into_response()
}

fn extract_credential(parts: &Parts) -> Option<Credential> {
    if let Some(value) = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(Credential::SignedToken(token.to_string()));
        }
    }

    if let Some(token) = parts
        .headers
        .get("x-session-token")
        .and_then(|v| v.to_str().ok())
    {
        return Some(Credential::SessionToken(token.to_string()));
    }

    // EventSource cannot set headers; fall back to the query string
    let query = parts.uri.query()?;
    for pair in query.split('&') {
        let mut kv = pair.splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("token"), Some(value)) if !value.is_empty() => {
                return Some(Credential::SignedToken(value.to_string()));
            }
            (Some("session"), Some(value)) if !value.is_empty() => {
                return Some(Credential::SessionToken(value.to_string()));
            }
            _ => {}
        }
    }
    None
}
