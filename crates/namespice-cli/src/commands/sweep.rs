//! Sweep command - run one full reconciliation and exit

use std::sync::Arc;

use console::style;
use kube::Client;

use namespice_core::ControllerConfig;
use namespice_kube::{Controller, KubeCluster};

use crate::error::{CliError, Result};

/// Run a single full sweep
pub async fn run(config: ControllerConfig, dry_run: bool) -> Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| CliError::cluster(format!("failed to create client: {}", e)))?;
    let cluster = KubeCluster::new(client.clone()).await?;

    let controller = Controller::new(Arc::new(cluster), config);
    controller.load_snapshot(&client).await?;

    println!(
        "{} Sweeping {} namespace(s) against {} class(es){}",
        style("→").blue().bold(),
        style(controller.namespaces().len()).cyan(),
        style(controller.classes().len()).cyan(),
        if dry_run {
            style(" (dry run)").yellow().to_string()
        } else {
            String::new()
        }
    );

    let report = controller.full_sweep(dry_run).await;

    print!("{}", report);
    let mark = if report.is_success() {
        style("✓").green().bold()
    } else {
        style("✗").red().bold()
    };
    println!("{} {}", mark, report.summary());

    if report.is_success() {
        Ok(())
    } else {
        Err(CliError::SweepFailed {
            failed: report.failed.len(),
        })
    }
}
