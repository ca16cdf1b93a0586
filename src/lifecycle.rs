//! Bundle lifecycle orchestration
//!
//! The state machine driving upload / install / stop / delete / deliver and
//! the read-side operations, sequencing the registry, the ingestor, the
//! release engine and the cluster API so that partial failures leave the
//! system recoverable:
//!
//! - upload: quota check, mint, ingest, admit - any failure after minting
//!   removes the bundle's storage subtree before the error surfaces;
//! - install/stop/delete: ownership check, live-status check, platform
//!   mutation, durable deregistration, in that order.
//!
//! A bundle's state is derived, never stored: unregistered (no record),
//! registered-inactive, registered-active.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cluster::{ClusterApi, DeploymentDetails};
use crate::engine::ReleaseEngine;
use crate::error::{Error, Result};
use crate::ingest::Ingestor;
use crate::naming;
use crate::record::{BundleRecord, BundleView};
use crate::registry::TenantRegistry;
use crate::status;

/// Values key telling the chart where the bundle's extracted files live
const ROOT_DIRECTORY_KEY: &str = "rootDirectory";

/// One uploaded file part
pub struct FilePart {
    /// Client-supplied file name; drives format validation
    pub filename: String,
    /// Raw file content
    pub content: Vec<u8>,
}

/// Inputs for one bundle upload
pub struct UploadRequest {
    /// Tenant-supplied display name
    pub name: String,
    /// The values document
    pub values: FilePart,
    /// Optional support archive
    pub archive: Option<FilePart>,
}

/// Details response: the record, its live status, and its workloads
#[derive(Debug, Serialize)]
pub struct BundleDetails {
    /// Record plus reconciled status
    #[serde(flatten)]
    pub view: BundleView,
    /// Per-deployment ports, pods and services
    pub deployments: Vec<DeploymentDetails>,
}

/// Logs response; `logs` is empty when the bundle is not active
#[derive(Debug, Serialize)]
pub struct BundleLogs {
    /// Record plus reconciled status
    #[serde(flatten)]
    pub view: BundleView,
    /// Raw log text from the requested pod
    pub logs: String,
}

/// Orchestrates bundle lifecycle operations for authenticated tenants
pub struct Lifecycle {
    registry: TenantRegistry,
    engine: Arc<dyn ReleaseEngine>,
    cluster: Arc<dyn ClusterApi>,
    ingestor: Ingestor,
}

impl Lifecycle {
    /// Wire the orchestrator to its collaborators
    pub fn new(
        registry: TenantRegistry,
        engine: Arc<dyn ReleaseEngine>,
        cluster: Arc<dyn ClusterApi>,
        ingestor: Ingestor,
    ) -> Self {
        Self {
            registry,
            engine,
            cluster,
            ingestor,
        }
    }

    /// The tenant registry, for fingerprint resolution in the request pipeline
    pub fn registry(&self) -> &TenantRegistry {
        &self.registry
    }

    /// Register a new bundle: quota check, identifier mint, artifact
    /// ingestion, durable registration.
    ///
    /// Quota exhaustion is a rejected precondition, not a failure. Any
    /// failure past the quota check removes the bundle's storage subtree
    /// before surfacing.
    pub async fn upload(&self, fingerprint: &str, request: UploadRequest) -> Result<BundleRecord> {
        if !self.registry.quota_available(fingerprint).await? {
            return Err(Error::conflict(format!(
                "bundle quota of {} reached",
                self.registry.quota()
            )));
        }

        let bundle_id = naming::mint(fingerprint);
        match self.ingest_and_admit(fingerprint, &bundle_id, &request).await {
            Ok(record) => {
                info!(bundle = %record.bundle_id, name = %record.name, "bundle registered");
                Ok(record)
            }
            Err(e) => {
                // Best-effort rollback; never mask the original error.
                if let Err(cleanup) = self.ingestor.remove_bundle(&bundle_id) {
                    warn!(
                        bundle = %bundle_id,
                        error = %cleanup,
                        "rollback of partially ingested bundle failed"
                    );
                }
                Err(e)
            }
        }
    }

    async fn ingest_and_admit(
        &self,
        fingerprint: &str,
        bundle_id: &str,
        request: &UploadRequest,
    ) -> Result<BundleRecord> {
        self.ingestor.ingest_values(
            bundle_id,
            &request.values.filename,
            &request.values.content,
        )?;
        if let Some(archive) = &request.archive {
            self.ingestor
                .ingest_archive(bundle_id, &archive.filename, &archive.content)?;
        }

        let record = BundleRecord {
            bundle_id: bundle_id.to_string(),
            name: request.name.clone(),
            namespace: naming::mint(&request.name),
        };
        self.registry.admit(fingerprint, &record).await?;
        Ok(record)
    }

    /// Install a registered, inactive bundle onto the cluster.
    ///
    /// The ingested values are merged with a synthesized `rootDirectory` key
    /// so the chart can resolve file references against the tenant's
    /// uploaded tree.
    pub async fn install(&self, fingerprint: &str, bundle_id: &str) -> Result<()> {
        let record = self.owned(fingerprint, bundle_id).await?;
        if status::reconcile(self.engine.as_ref(), &record)
            .await?
            .is_active()
        {
            return Err(Error::conflict(format!(
                "bundle {bundle_id} is already active"
            )));
        }

        self.cluster.ensure_namespace(&record.namespace).await?;

        let mut values = self.ingestor.read_values(&record.bundle_id)?;
        values[ROOT_DIRECTORY_KEY] = serde_json::Value::String(format!(
            "{}/",
            self.ingestor.archive_root(&record.bundle_id).display()
        ));

        self.engine
            .install(&record.namespace, &record.bundle_id, &values)
            .await?;
        info!(bundle = %bundle_id, namespace = %record.namespace, "bundle installed");
        Ok(())
    }

    /// Uninstall a bundle's live release. Success when the bundle is
    /// unregistered or already inactive.
    pub async fn stop(&self, fingerprint: &str, bundle_id: &str) -> Result<()> {
        let Some(record) = self.registry.find(fingerprint, bundle_id).await? else {
            debug!(bundle = %bundle_id, "stop of unregistered bundle, nothing to do");
            return Ok(());
        };
        if !status::reconcile(self.engine.as_ref(), &record)
            .await?
            .is_active()
        {
            debug!(bundle = %bundle_id, "stop of inactive bundle, nothing to do");
            return Ok(());
        }

        self.engine
            .uninstall(&record.namespace, &record.bundle_id)
            .await?;
        info!(bundle = %bundle_id, namespace = %record.namespace, "bundle stopped");
        Ok(())
    }

    /// Remove a bundle's durable record and storage. An active bundle must
    /// be stopped first; an unregistered one is a no-op.
    pub async fn delete(&self, fingerprint: &str, bundle_id: &str) -> Result<()> {
        let Some(record) = self.registry.find(fingerprint, bundle_id).await? else {
            debug!(bundle = %bundle_id, "delete of unregistered bundle, nothing to do");
            return Ok(());
        };
        if status::reconcile(self.engine.as_ref(), &record)
            .await?
            .is_active()
        {
            return Err(Error::conflict(format!(
                "bundle {bundle_id} is active, stop it before deleting"
            )));
        }

        self.registry.revoke(fingerprint, bundle_id).await?;
        self.ingestor.remove_bundle(bundle_id)?;
        info!(bundle = %bundle_id, "bundle deleted");
        Ok(())
    }

    /// Flag a bundle as visible in the shared admin view. No-op when the
    /// caller does not own the bundle.
    pub async fn deliver(&self, fingerprint: &str, bundle_id: &str) -> Result<()> {
        if self.registry.deliver(fingerprint, bundle_id).await? {
            info!(bundle = %bundle_id, "bundle delivered");
        } else {
            debug!(bundle = %bundle_id, "deliver of unregistered bundle, nothing to do");
        }
        Ok(())
    }

    /// Withdraw a bundle from the shared admin view. No-op when the caller
    /// does not own the bundle or it was never delivered.
    pub async fn undeliver(&self, fingerprint: &str, bundle_id: &str) -> Result<()> {
        if !self.registry.undeliver(fingerprint, bundle_id).await? {
            debug!(bundle = %bundle_id, "undeliver of unregistered bundle, nothing to do");
        }
        Ok(())
    }

    /// All of the tenant's bundles with their reconciled status
    pub async fn list(&self, fingerprint: &str) -> Result<Vec<BundleView>> {
        let records = self.registry.records(fingerprint).await?;
        self.with_status(records).await
    }

    /// All delivered bundles with their reconciled status
    pub async fn delivered(&self) -> Result<Vec<BundleView>> {
        let records = self.registry.delivered_records().await?;
        self.with_status(records).await
    }

    /// One bundle's record, status and workload details
    pub async fn details(&self, fingerprint: &str, bundle_id: &str) -> Result<BundleDetails> {
        let record = self.owned(fingerprint, bundle_id).await?;
        let observed = status::reconcile(self.engine.as_ref(), &record).await?;
        let deployments = self.cluster.deployment_details(&record.namespace).await?;
        Ok(BundleDetails {
            view: BundleView {
                record,
                status: observed,
            },
            deployments,
        })
    }

    /// Logs of one pod in the bundle's namespace; empty when the bundle is
    /// not active.
    pub async fn logs(&self, fingerprint: &str, bundle_id: &str, pod: &str) -> Result<BundleLogs> {
        let record = self.owned(fingerprint, bundle_id).await?;
        let observed = status::reconcile(self.engine.as_ref(), &record).await?;
        let logs = if observed.is_active() {
            self.cluster.pod_logs(&record.namespace, pod).await?
        } else {
            String::new()
        };
        Ok(BundleLogs {
            view: BundleView {
                record,
                status: observed,
            },
            logs,
        })
    }

    async fn with_status(&self, records: Vec<BundleRecord>) -> Result<Vec<BundleView>> {
        let mut views = Vec::with_capacity(records.len());
        for record in records {
            let observed = status::reconcile(self.engine.as_ref(), &record).await?;
            views.push(BundleView {
                record,
                status: observed,
            });
        }
        Ok(views)
    }

    async fn owned(&self, fingerprint: &str, bundle_id: &str) -> Result<BundleRecord> {
        self.registry
            .find(fingerprint, bundle_id)
            .await?
            .ok_or_else(|| {
                Error::not_found(format!("no bundle {bundle_id} registered for this tenant"))
            })
    }
}
