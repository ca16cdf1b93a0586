//! berth - multi-tenant bundle lifecycle management for Kubernetes

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use berth::cluster::KubeCluster;
use berth::config::Config;
use berth::engine::HelmCli;
use berth::ingest::Ingestor;
use berth::lifecycle::Lifecycle;
use berth::registry::TenantRegistry;
use berth::server::{self, AppState};
use berth::store::{MetadataStore, RedisStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,berth=debug")),
        )
        .init();

    let config = Config::parse();

    std::fs::create_dir_all(&config.upload_root).with_context(|| {
        format!(
            "failed to create upload root {}",
            config.upload_root.display()
        )
    })?;

    let store: Arc<dyn MetadataStore> = Arc::new(
        RedisStore::connect(&config.redis_url)
            .await
            .context("failed to connect to metadata store")?,
    );

    let client = kube::Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let lifecycle = Arc::new(Lifecycle::new(
        TenantRegistry::new(store.clone(), config.quota),
        Arc::new(HelmCli::new(
            config.helm_bin.clone(),
            config.chart_dir.clone(),
            config.engine_timeout(),
        )),
        Arc::new(KubeCluster::new(client)),
        Ingestor::new(&config.upload_root),
    ));

    info!(
        bind = %config.bind,
        upload_root = %config.upload_root.display(),
        quota = config.quota,
        "berth starting"
    );

    server::serve(config.bind, AppState { lifecycle, store }).await?;
    Ok(())
}
