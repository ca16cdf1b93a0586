//! Status reconciliation
//!
//! A bundle's observable lifecycle state is never stored - it is computed on
//! demand by comparing the durable record against the release engine's live
//! listing for the record's namespace.

use serde::Serialize;

use crate::engine::ReleaseEngine;
use crate::error::Result;
use crate::record::BundleRecord;

/// Observable lifecycle state of a registered bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservedStatus {
    /// A live release named after the bundle exists in its namespace
    Active,
    /// No live release for the bundle
    Inactive,
}

impl ObservedStatus {
    /// Whether the bundle currently has a live release
    pub fn is_active(self) -> bool {
        matches!(self, ObservedStatus::Active)
    }
}

/// Compute a record's observable status from the engine's live listing.
///
/// Linear scan over the namespace's releases; never mutates the metadata
/// store.
pub async fn reconcile(
    engine: &dyn ReleaseEngine,
    record: &BundleRecord,
) -> Result<ObservedStatus> {
    let releases = engine.list_releases(&record.namespace).await?;
    if releases.iter().any(|r| r.name == record.bundle_id) {
        Ok(ObservedStatus::Active)
    } else {
        Ok(ObservedStatus::Inactive)
    }
}
