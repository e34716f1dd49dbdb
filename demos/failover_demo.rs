//! Leader failover across three managers.
//!
//! Usage: `failover_demo [config.json]`. The configuration file supplies the
//! coordination settings and, optionally, a node record for an extra worker.

use std::time::Duration;
use swallow_core::{AppConfig, NodeSpec};
use swallow_testing::ClusterHarness;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let app = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(&path)?,
        None => AppConfig::default(),
    };
    info!("Starting failover demo as {}", app.id);

    let mut cluster = ClusterHarness::new(&app.kv.cluster_id);
    let config = app.kv.clone().with_endpoints(cluster.config().endpoints.clone());
    cluster = cluster.with_config(config);

    for i in 1..=3 {
        cluster.add_manager(&format!("manager-{}:8888", i)).await?;
    }
    cluster.add_worker(NodeSpec::new("worker-1", "ingest")).await?;
    cluster.add_worker(NodeSpec::new("worker-2", "query")).await?;
    if let Some(node) = app.node.clone() {
        cluster.add_worker(node).await?;
    }

    let Some(leader) = cluster.wait_for_leader(Duration::from_secs(5)).await else {
        anyhow::bail!("no leader elected");
    };
    cluster.settle(Duration::from_millis(100)).await;
    info!(
        "{} leads and sees {:?}",
        cluster.manager(leader).leader_id(),
        cluster.manager(leader).view().ids()
    );

    warn!("Expiring {}'s session", cluster.manager(leader).leader_id());
    cluster.manager(leader).crash();
    cluster.settle(Duration::from_millis(100)).await;

    let Some(next) = cluster.wait_for_leader(Duration::from_secs(5)).await else {
        anyhow::bail!("no leader after failover");
    };
    info!(
        "{} took over and sees {:?}",
        cluster.manager(next).leader_id(),
        cluster.manager(next).view().ids()
    );
    for manager in cluster.managers() {
        info!(
            "{}: {} (following {:?})",
            manager.leader_id(),
            manager.role(),
            manager.followed_leader()
        );
    }

    cluster.shutdown().await;
    Ok(())
}
