//! `gram status`: show (and optionally wait for) a deployment

use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use gram_core::deployments::{Deployment, DeploymentLogs};
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::client::GramClient;

/// Ceiling on how long `--wait` polls.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct StatusOptions {
    /// Deployment id; the latest deployment when absent.
    pub id: Option<String>,
    pub wait: bool,
    pub show_logs: bool,
}

pub async fn run_status(client: &GramClient, opts: StatusOptions) -> Result<()> {
    let mut deployment = match &opts.id {
        Some(id) => client.get_deployment(id).await?,
        None => client
            .get_latest_deployment()
            .await?
            .ok_or_else(|| anyhow!("No deployments found for this project"))?,
    };

    if opts.wait {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        while !deployment.status.is_terminal() {
            if Instant::now() >= deadline {
                bail!(
                    "Timed out after {}s waiting for deployment {} (status: {})",
                    WAIT_TIMEOUT.as_secs(),
                    deployment.id,
                    deployment.status
                );
            }
            debug!(deployment_id = %deployment.id, status = %deployment.status, "Waiting for deployment");
            sleep(POLL_INTERVAL).await;
            deployment = client.get_deployment(&deployment.id.to_string()).await?;
        }
    }

    print_deployment(&deployment);

    if opts.show_logs {
        let logs = client
            .get_deployment_logs(&deployment.id.to_string())
            .await?;
        print_logs(&logs);
    }

    Ok(())
}

fn print_deployment(deployment: &Deployment) {
    println!("Deployment {}", deployment.id);
    println!("  Status:     {}", deployment.status);
    println!("  Created:    {}", deployment.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(source) = deployment.cloned_from {
        println!("  Cloned from {source}");
    }
    println!(
        "  OpenAPI:    {} document(s), {} tool(s)",
        deployment.openapiv3_assets.len(),
        deployment.openapiv3_tool_count
    );
    println!(
        "  Functions:  {} archive(s), {} tool(s)",
        deployment.functions_assets.len(),
        deployment.functions_tool_count
    );
    for package in &deployment.packages {
        println!("  Package:    {}@{}", package.name, package.version);
    }
}

fn print_logs(logs: &DeploymentLogs) {
    println!();
    println!("Logs:");
    for event in &logs.events {
        println!(
            "  {} {:<22} {}",
            event.created_at.format("%H:%M:%S"),
            event.event.as_str(),
            event.message
        );
    }
    if logs.next_cursor.is_some() {
        println!("  ...");
    }
}
