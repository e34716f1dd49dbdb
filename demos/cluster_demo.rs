//! Two managers and a handful of workers in one process.
//!
//! Both managers campaign on a shared in-memory service. Workers register,
//! one rewrites its record, one leaves, and finally the leading manager
//! shuts down so the other takes over.

use std::time::Duration;
use swallow_coordinator::{create_database, Database, EventStream};
use swallow_core::{CoordinatorEvent, KvConfig, NodeSpec};
use swallow_session::CoordinationSession;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::info;

fn print_events(name: &'static str, mut events: EventStream) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                CoordinatorEvent::Membership(delta) => {
                    for node in &delta.added {
                        info!("[{}] + {} {:?}", name, node, node.quota);
                    }
                    for node in &delta.changed {
                        info!("[{}] ~ {} {:?}", name, node, node.quota);
                    }
                    for node in &delta.removed {
                        info!("[{}] - {}", name, node);
                    }
                }
                CoordinatorEvent::Follower(follower) => {
                    info!("[{}] following {}", name, follower.leader_id)
                }
                other => info!("[{}] unrecognized event {:?}", name, other),
            }
        }
        info!("[{}] event stream closed", name);
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = KvConfig::default()
        .with_endpoints(vec!["cluster-demo".to_string()])
        .with_cluster_id("demo");

    let first = create_database(&config.clone().with_leader_id("manager-1:8888")).await?;
    let first_printer = print_events("manager-1", first.start_elect().await?);
    sleep(Duration::from_millis(50)).await;

    let second = create_database(&config.clone().with_leader_id("manager-2:8888")).await?;
    let second_printer = print_events("manager-2", second.start_elect().await?);

    let mut workers = Vec::new();
    for (id, cpus) in [("worker-1", 8), ("worker-2", 4), ("worker-3", 16)] {
        let db = create_database(&config).await?;
        let node = NodeSpec::new(id, "ingest").with_quota("cpu", cpus);
        let registration = db.register(Some(&node)).await?;
        workers.push((db, registration, node));
        sleep(Duration::from_millis(100)).await;
    }
    info!(
        "manager-1 leader: {}, manager-2 leader: {}",
        first.is_leader(),
        second.is_leader()
    );

    // picked up with the next membership change
    let (_, registration, node) = &workers[1];
    registration
        .update(&node.clone().with_quota("cpu", 2).with_version(1))
        .await?;

    let (db, _, _) = workers.remove(0);
    db.session().close().await;
    sleep(Duration::from_millis(200)).await;

    info!("Stopping manager-1");
    first.session().close().await;
    first_printer.await?;
    sleep(Duration::from_millis(200)).await;
    info!("manager-2 leader: {}", second.is_leader());

    second.session().close().await;
    second_printer.await?;
    Ok(())
}
