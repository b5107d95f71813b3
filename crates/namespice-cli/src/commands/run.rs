//! Run command - watch the cluster and reconcile until interrupted

use std::sync::Arc;

use console::style;
use kube::Client;
use tokio_util::sync::CancellationToken;

use namespice_core::ControllerConfig;
use namespice_kube::{Controller, KubeCluster};

use crate::error::{CliError, Result};

/// Run the controller
pub async fn run(config: ControllerConfig) -> Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| CliError::cluster(format!("failed to create client: {}", e)))?;
    let cluster = KubeCluster::new(client.clone()).await?;

    eprintln!(
        "{} Watching namespaces (annotation {}), sweeping every {}",
        style("→").blue().bold(),
        style(&config.annotation_key).cyan(),
        style(humantime_serde::re::humantime::format_duration(config.sweep_interval)).yellow()
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received, shutting down"),
            Err(e) => tracing::error!(error = %e, "failed to listen for interrupt, shutting down"),
        }
        shutdown.cancel();
    });

    Controller::new(Arc::new(cluster), config)
        .start(client, cancel)
        .await;

    eprintln!("{} Stopped", style("✓").green().bold());
    Ok(())
}
