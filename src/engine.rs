//! Release engine collaborator
//!
//! The engine renders and applies a bundle's contents onto the cluster and
//! reports live release state. The production implementation drives the
//! `helm` binary; every invocation carries a bounded deadline because the
//! engine's latency is unbounded in principle.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// One live release as reported by the engine's listing
#[derive(Debug, Clone, Deserialize)]
pub struct LiveRelease {
    /// Release name (equals the bundle identifier for bundles we installed)
    pub name: String,
    /// Engine-reported status string (deployed, failed, ...)
    #[serde(default)]
    pub status: String,
}

/// Abstraction over the templating/installation engine
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReleaseEngine: Send + Sync {
    /// Live releases currently present in `namespace`
    async fn list_releases(&self, namespace: &str) -> Result<Vec<LiveRelease>>;

    /// Install a release named `name` into `namespace` with the given
    /// values document
    async fn install(&self, namespace: &str, name: &str, values: &serde_json::Value)
        -> Result<()>;

    /// Uninstall the release named `name` from `namespace`
    async fn uninstall(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Release engine backed by the `helm` CLI
pub struct HelmCli {
    bin: String,
    chart_dir: PathBuf,
    timeout: Duration,
}

impl HelmCli {
    /// Create an engine handle invoking `bin` with the wrapper chart at
    /// `chart_dir`, bounding each invocation by `timeout`
    pub fn new(bin: impl Into<String>, chart_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            chart_dir: chart_dir.into(),
            timeout,
        }
    }

    /// Run one helm invocation with a deadline, surfacing stderr on failure
    async fn run(&self, args: &[&str], description: &str) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(args);
        debug!(description, "invoking helm");

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                warn!(description, timeout = ?self.timeout, "helm invocation timed out");
                Error::upstream(
                    "helm",
                    format!("{description} timed out after {:?}", self.timeout),
                )
            })?
            .map_err(|e| Error::upstream("helm", format!("{description} failed to spawn: {e}")))?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(description, error = %stderr, "helm invocation failed");
            Err(Error::upstream(
                "helm",
                format!("{description}: {}", stderr.trim()),
            ))
        }
    }
}

#[async_trait]
impl ReleaseEngine for HelmCli {
    async fn list_releases(&self, namespace: &str) -> Result<Vec<LiveRelease>> {
        let stdout = self
            .run(
                &["list", "--namespace", namespace, "--output", "json"],
                "helm list",
            )
            .await?;
        serde_json::from_slice(&stdout)
            .map_err(|e| Error::upstream("helm", format!("unparseable release listing: {e}")))
    }

    async fn install(
        &self,
        namespace: &str,
        name: &str,
        values: &serde_json::Value,
    ) -> Result<()> {
        // helm reads values files as YAML; write the merged document to a
        // scratch file for the invocation and clean it up afterwards.
        let doc = serde_yaml::to_string(values)
            .map_err(|e| Error::invalid(format!("unencodable values document: {e}")))?;
        let values_file = std::env::temp_dir().join(format!("berth-values-{name}.yaml"));
        tokio::fs::write(&values_file, doc)
            .await
            .map_err(|e| Error::io("writing merged values file", e))?;

        let chart = self.chart_dir.display().to_string();
        let values_arg = values_file.display().to_string();
        let result = self
            .run(
                &[
                    "install",
                    name,
                    &chart,
                    "--namespace",
                    namespace,
                    "--values",
                    &values_arg,
                ],
                "helm install",
            )
            .await;

        if let Err(e) = tokio::fs::remove_file(&values_file).await {
            debug!(error = %e, "could not remove merged values file");
        }
        result.map(|_| ())
    }

    async fn uninstall(&self, namespace: &str, name: &str) -> Result<()> {
        self.run(&["uninstall", name, "--namespace", namespace], "helm uninstall")
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_release_parses_helm_listing() {
        let listing = r#"[
            {"name":"abc123","namespace":"ns1","revision":"1","status":"deployed","chart":"berth-0.1.0"},
            {"name":"other","status":"failed"}
        ]"#;
        let releases: Vec<LiveRelease> = serde_json::from_str(listing).unwrap();
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].name, "abc123");
        assert_eq!(releases[0].status, "deployed");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_upstream_error() {
        let engine = HelmCli::new(
            "/nonexistent/helm-binary",
            "/tmp/chart",
            Duration::from_secs(5),
        );
        let err = engine.list_releases("ns").await.unwrap_err();
        assert!(matches!(err, Error::Upstream { system: "helm", .. }));
    }
}
