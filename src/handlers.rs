//! HTTP handlers
//!
//! Thin delegation: each handler unpacks the request, calls one lifecycle
//! operation, and serializes the outcome. All domain decisions live in
//! [`crate::lifecycle`].

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use tracing::debug;

use crate::auth::Tenant;
use crate::error::{Error, Result};
use crate::lifecycle::{BundleDetails, BundleLogs, FilePart, UploadRequest};
use crate::record::{BundleRecord, BundleView};
use crate::server::AppState;

/// Multipart field carrying the bundle display name
const NAME_FIELD: &str = "name";
/// Multipart field carrying the values document
const VALUES_FIELD: &str = "values";
/// Multipart field carrying the optional support archive
const ARCHIVE_FIELD: &str = "archive";

/// `POST /bundles` - upload a bundle (multipart: name, values, archive?)
pub async fn upload(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<BundleRecord>)> {
    let mut name = None;
    let mut values = None;
    let mut archive = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::invalid(format!("unreadable multipart body: {e}")))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some(NAME_FIELD) => {
                name = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| Error::invalid(format!("unreadable name field: {e}")))?,
                );
            }
            Some(VALUES_FIELD) => values = Some(file_part(field).await?),
            Some(ARCHIVE_FIELD) => archive = Some(file_part(field).await?),
            other => debug!(field = ?other, "ignoring unknown multipart field"),
        }
    }

    let request = UploadRequest {
        name: name.ok_or_else(|| Error::invalid("missing name field"))?,
        values: values.ok_or_else(|| Error::invalid("missing values file"))?,
        archive,
    };
    let record = state.lifecycle.upload(&tenant.fingerprint, request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn file_part(field: axum::extract::multipart::Field<'_>) -> Result<FilePart> {
    let filename = field
        .file_name()
        .ok_or_else(|| Error::invalid("file field has no filename"))?
        .to_string();
    let content = field
        .bytes()
        .await
        .map_err(|e| Error::invalid(format!("unreadable file content: {e}")))?;
    Ok(FilePart {
        filename,
        content: content.to_vec(),
    })
}

/// `GET /bundles` - the tenant's bundles with live status
pub async fn list(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
) -> Result<Json<Vec<BundleView>>> {
    Ok(Json(state.lifecycle.list(&tenant.fingerprint).await?))
}

/// `GET /bundles/{id}` - one bundle's record, status and workloads
pub async fn details(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<String>,
) -> Result<Json<BundleDetails>> {
    Ok(Json(state.lifecycle.details(&tenant.fingerprint, &id).await?))
}

/// Query parameters for the logs endpoint
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// Pod whose logs to fetch
    pub pod: String,
}

/// `GET /bundles/{id}/logs?pod=<name>` - pod logs, empty when inactive
pub async fn logs(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<BundleLogs>> {
    Ok(Json(
        state
            .lifecycle
            .logs(&tenant.fingerprint, &id, &query.pod)
            .await?,
    ))
}

/// `POST /bundles/{id}/install`
pub async fn install(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.lifecycle.install(&tenant.fingerprint, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /bundles/{id}/stop`
pub async fn stop(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.lifecycle.stop(&tenant.fingerprint, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /bundles/{id}`
pub async fn delete(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.lifecycle.delete(&tenant.fingerprint, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /bundles/{id}/deliver`
pub async fn deliver(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.lifecycle.deliver(&tenant.fingerprint, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /bundles/{id}/deliver`
pub async fn undeliver(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.lifecycle.undeliver(&tenant.fingerprint, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /delivered` - the shared admin view
pub async fn delivered(State(state): State<AppState>) -> Result<Json<Vec<BundleView>>> {
    Ok(Json(state.lifecycle.delivered().await?))
}
