//! Runtime configuration
//!
//! All settings can be supplied as flags or `BERTH_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// berth - multi-tenant bundle lifecycle management for Kubernetes
#[derive(Parser, Debug, Clone)]
#[command(name = "berth", version, about, long_about = None)]
pub struct Config {
    /// Address to bind the HTTP listener
    #[arg(long, env = "BERTH_BIND", default_value = "0.0.0.0:9000")]
    pub bind: SocketAddr,

    /// Connection URL for the metadata store
    #[arg(long, env = "BERTH_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Root directory for uploaded bundle storage
    #[arg(long, env = "BERTH_UPLOAD_ROOT", default_value = "/shared/uploads")]
    pub upload_root: PathBuf,

    /// Maximum number of bundles a tenant may register
    #[arg(long, env = "BERTH_QUOTA", default_value_t = 2)]
    pub quota: usize,

    /// Helm binary to invoke
    #[arg(long, env = "BERTH_HELM_BIN", default_value = "helm")]
    pub helm_bin: String,

    /// Wrapper chart installed for every bundle
    #[arg(long, env = "BERTH_CHART_DIR", default_value = "/etc/berth/chart")]
    pub chart_dir: PathBuf,

    /// Deadline in seconds for a single release-engine invocation
    #[arg(long, env = "BERTH_ENGINE_TIMEOUT_SECS", default_value_t = 120)]
    pub engine_timeout_secs: u64,
}

impl Config {
    /// Deadline applied to every release-engine invocation
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }
}
