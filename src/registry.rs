//! Tenant registry
//!
//! The durable mapping from tenant fingerprint to owned bundle records,
//! stored as flat sets in the metadata store, plus the shared delivery set.
//! Membership is keyed by `bundleId` - never by serialized-string equality,
//! so field order in stored JSON cannot produce phantom duplicates.

use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::record::BundleRecord;
use crate::store::MetadataStore;

/// Key prefix for per-tenant registry sets
const REGISTRY_PREFIX: &str = "rel-";

/// Key of the shared admin delivery set
const DELIVERY_KEY: &str = "rel-admin";

/// Per-tenant collections of bundle records with quota enforcement
pub struct TenantRegistry {
    store: Arc<dyn MetadataStore>,
    quota: usize,
}

impl TenantRegistry {
    /// Create a registry over `store` admitting at most `quota` records per
    /// tenant
    pub fn new(store: Arc<dyn MetadataStore>, quota: usize) -> Self {
        Self { store, quota }
    }

    /// The configured per-tenant quota
    pub fn quota(&self) -> usize {
        self.quota
    }

    /// Resolve the tenant fingerprint stored under a bearer token
    pub async fn fingerprint(&self, token: &str) -> Result<String> {
        self.store
            .get(token)
            .await?
            .ok_or_else(|| Error::unauthorized("unknown tenant token"))
    }

    /// Whether the tenant may register one more bundle.
    ///
    /// Evaluated immediately before admission; the check-then-admit sequence
    /// is not transactional, so two concurrent uploads can both pass it.
    pub async fn quota_available(&self, fingerprint: &str) -> Result<bool> {
        Ok(self.count(fingerprint).await? < self.quota)
    }

    /// Number of records registered for the tenant
    pub async fn count(&self, fingerprint: &str) -> Result<usize> {
        self.store.cardinality(&registry_key(fingerprint)).await
    }

    /// Register a record for the tenant.
    ///
    /// Rejects a `bundleId` the tenant already owns.
    pub async fn admit(&self, fingerprint: &str, record: &BundleRecord) -> Result<()> {
        if self.find(fingerprint, &record.bundle_id).await?.is_some() {
            return Err(Error::conflict(format!(
                "bundle {} is already registered",
                record.bundle_id
            )));
        }
        self.store
            .add_to_set(&registry_key(fingerprint), &record.to_json()?)
            .await
    }

    /// Find the tenant's record with the given `bundleId`
    pub async fn find(&self, fingerprint: &str, bundle_id: &str) -> Result<Option<BundleRecord>> {
        Ok(self
            .find_serialized(fingerprint, bundle_id)
            .await?
            .map(|(record, _)| record))
    }

    /// All records registered for the tenant
    pub async fn records(&self, fingerprint: &str) -> Result<Vec<BundleRecord>> {
        let members = self.store.members_of(&registry_key(fingerprint)).await?;
        members
            .iter()
            .map(|raw| BundleRecord::from_json(raw))
            .collect()
    }

    /// Remove the tenant's record with the given `bundleId`.
    ///
    /// Returns whether a record was removed; absent records are a no-op.
    pub async fn revoke(&self, fingerprint: &str, bundle_id: &str) -> Result<bool> {
        match self.find_serialized(fingerprint, bundle_id).await? {
            Some((_, raw)) => {
                self.store
                    .remove_from_set(&registry_key(fingerprint), &raw)
                    .await?;
                Ok(true)
            }
            None => {
                debug!(bundle = %bundle_id, "revoke of unregistered bundle, nothing to do");
                Ok(false)
            }
        }
    }

    /// Copy the tenant's record into the shared delivery set.
    ///
    /// Delivery is a visibility flag: the record stays in the owner's
    /// registry. Returns whether a record was found to deliver.
    pub async fn deliver(&self, fingerprint: &str, bundle_id: &str) -> Result<bool> {
        match self.find_serialized(fingerprint, bundle_id).await? {
            Some((_, raw)) => {
                self.store.add_to_set(DELIVERY_KEY, &raw).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove the tenant's record from the shared delivery set; no-op when
    /// the record is absent or was never delivered.
    pub async fn undeliver(&self, fingerprint: &str, bundle_id: &str) -> Result<bool> {
        match self.find_serialized(fingerprint, bundle_id).await? {
            Some((_, raw)) => {
                self.store.remove_from_set(DELIVERY_KEY, &raw).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// All records in the shared delivery set
    pub async fn delivered_records(&self) -> Result<Vec<BundleRecord>> {
        let members = self.store.members_of(DELIVERY_KEY).await?;
        members
            .iter()
            .map(|raw| BundleRecord::from_json(raw))
            .collect()
    }

    /// Locate a record and its exact serialized form, for set removal
    async fn find_serialized(
        &self,
        fingerprint: &str,
        bundle_id: &str,
    ) -> Result<Option<(BundleRecord, String)>> {
        let members = self.store.members_of(&registry_key(fingerprint)).await?;
        for raw in members {
            let record = BundleRecord::from_json(&raw)?;
            if record.bundle_id == bundle_id {
                return Ok(Some((record, raw)));
            }
        }
        Ok(None)
    }
}

fn registry_key(fingerprint: &str) -> String {
    format!("{REGISTRY_PREFIX}{fingerprint}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    const FP: &str = "tenant-1";

    fn registry() -> TenantRegistry {
        TenantRegistry::new(Arc::new(MemoryStore::new()), 2)
    }

    fn record(id: &str) -> BundleRecord {
        BundleRecord {
            bundle_id: id.to_string(),
            name: format!("bundle {id}"),
            namespace: format!("ns{id}"),
        }
    }

    #[tokio::test]
    async fn test_quota_is_enforced_at_admission_boundary() {
        let registry = registry();
        assert!(registry.quota_available(FP).await.unwrap());

        registry.admit(FP, &record("a")).await.unwrap();
        assert!(registry.quota_available(FP).await.unwrap());

        registry.admit(FP, &record("b")).await.unwrap();
        assert!(!registry.quota_available(FP).await.unwrap());
        assert_eq!(registry.count(FP).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_admit_rejects_duplicate_bundle_id() {
        let registry = registry();
        registry.admit(FP, &record("a")).await.unwrap();

        let err = registry.admit(FP, &record("a")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(registry.count(FP).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_matches_by_bundle_id() {
        let registry = registry();
        registry.admit(FP, &record("a")).await.unwrap();
        registry.admit(FP, &record("b")).await.unwrap();

        let found = registry.find(FP, "b").await.unwrap().unwrap();
        assert_eq!(found, record("b"));
        assert!(registry.find(FP, "missing").await.unwrap().is_none());
        // Another tenant's registry is a different partition.
        assert!(registry.find("tenant-2", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_removes_only_the_named_record() {
        let registry = registry();
        registry.admit(FP, &record("a")).await.unwrap();
        registry.admit(FP, &record("b")).await.unwrap();

        assert!(registry.revoke(FP, "a").await.unwrap());
        assert!(registry.find(FP, "a").await.unwrap().is_none());
        assert!(registry.find(FP, "b").await.unwrap().is_some());

        // Revoking again is a no-op.
        assert!(!registry.revoke(FP, "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_deliver_is_a_visibility_flag() {
        let registry = registry();
        registry.admit(FP, &record("a")).await.unwrap();

        assert!(registry.deliver(FP, "a").await.unwrap());
        let delivered = registry.delivered_records().await.unwrap();
        assert_eq!(delivered, vec![record("a")]);
        // Ownership is untouched.
        assert!(registry.find(FP, "a").await.unwrap().is_some());

        assert!(registry.undeliver(FP, "a").await.unwrap());
        assert!(registry.delivered_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deliver_of_unowned_bundle_is_noop() {
        let registry = registry();
        assert!(!registry.deliver(FP, "ghost").await.unwrap());
        assert!(!registry.undeliver(FP, "ghost").await.unwrap());
        assert!(registry.delivered_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_member_is_invalid_input() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_to_set(&registry_key(FP), "not json at all")
            .await
            .unwrap();
        let registry = TenantRegistry::new(store, 2);

        let err = registry.find(FP, "a").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_fingerprint_resolution() {
        let store = Arc::new(MemoryStore::new());
        store.put_string("token-xyz", FP);
        let registry = TenantRegistry::new(store, 2);

        assert_eq!(registry.fingerprint("token-xyz").await.unwrap(), FP);
        let err = registry.fingerprint("nope").await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }
}
