//! Bearer-token authentication
//!
//! Every bundle route requires an `Authorization` token known to the
//! metadata store. The middleware resolves the token to the tenant's
//! fingerprint and stashes it in request extensions for the handlers.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::{Error, Result};
use crate::server::AppState;

/// Tenant identity resolved by the authentication middleware
#[derive(Debug, Clone)]
pub struct Tenant {
    /// Partition key of the tenant's registry in the metadata store
    pub fingerprint: String,
}

/// Reject requests whose bearer token the metadata store does not know
pub async fn require_tenant(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(strip_bearer)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::unauthorized("missing bearer token"))?
        .to_string();

    if !state.store.exists(&token).await? {
        return Err(Error::unauthorized("unknown token"));
    }
    let fingerprint = state.lifecycle.registry().fingerprint(&token).await?;

    request.extensions_mut().insert(Tenant { fingerprint });
    Ok(next.run(request).await)
}

/// Accept both a bare token and the `Bearer <token>` form
fn strip_bearer(value: &str) -> &str {
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .unwrap_or(value)
        .trim()
}
