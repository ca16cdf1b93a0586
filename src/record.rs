//! Durable bundle metadata
//!
//! A [`BundleRecord`] holds the ownership and routing facts for one uploaded
//! bundle. Records are serialized flat into the metadata store; the live
//! `status` field only ever appears on the API-facing [`BundleView`] and is
//! never persisted.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::status::ObservedStatus;

/// Ownership and routing facts for one uploaded bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRecord {
    /// Minted platform-legal identifier; immutable once assigned
    pub bundle_id: String,
    /// Tenant-supplied display name
    pub name: String,
    /// Minted namespace used for resource isolation on the cluster
    pub namespace: String,
}

impl BundleRecord {
    /// Serialize for storage
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::invalid(format!("unserializable bundle record: {e}")))
    }

    /// Deserialize a stored record
    ///
    /// Unknown fields are tolerated, so records written with an ephemeral
    /// `status` attached still parse.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::invalid(format!("malformed bundle record in store: {e}")))
    }
}

/// A record joined with its reconciled status, as returned by read operations
#[derive(Debug, Clone, Serialize)]
pub struct BundleView {
    /// The durable record
    #[serde(flatten)]
    pub record: BundleRecord,
    /// Live status computed against the release engine
    pub status: ObservedStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BundleRecord {
        BundleRecord {
            bundle_id: "a1b2c3".into(),
            name: "demo".into(),
            namespace: "x9y8z7".into(),
        }
    }

    #[test]
    fn test_roundtrip() {
        let raw = sample().to_json().unwrap();
        assert_eq!(BundleRecord::from_json(&raw).unwrap(), sample());
    }

    #[test]
    fn test_tolerates_ephemeral_status_field() {
        let raw = r#"{"bundleId":"a1b2c3","name":"demo","namespace":"x9y8z7","status":"active"}"#;
        assert_eq!(BundleRecord::from_json(raw).unwrap(), sample());
    }

    #[test]
    fn test_malformed_record_is_invalid_input() {
        let err = BundleRecord::from_json("{\"name\": 42}").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_view_serializes_flat() {
        let view = BundleView {
            record: sample(),
            status: ObservedStatus::Active,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["bundleId"], "a1b2c3");
        assert_eq!(json["status"], "active");
    }
}
