//! Worker membership as observed by the elected leader.

use std::time::Duration;

use swallow_core::{CoordinatorEvent, NodeSpec};
use swallow_testing::ClusterHarness;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn leader_cluster(name: &str) -> ClusterHarness {
    let mut cluster = ClusterHarness::new(name);
    cluster.add_manager("mgr-a:8888").await.unwrap();
    cluster.wait_for_leader(Duration::from_secs(5)).await.unwrap();
    cluster
}

#[tokio::test]
async fn test_first_delta_lists_existing_workers() {
    init_tracing();
    let mut cluster = ClusterHarness::new("membership-initial");
    cluster.add_worker(NodeSpec::new("w1", "ingest")).await.unwrap();
    cluster.add_worker(NodeSpec::new("w2", "ingest")).await.unwrap();

    let index = cluster.add_manager("mgr-a:8888").await.unwrap();
    match cluster.manager_mut(index).next_event(Duration::from_secs(2)).await {
        Some(CoordinatorEvent::Membership(delta)) => {
            assert_eq!(delta.added.len(), 2);
            assert!(delta.removed.is_empty());
            assert!(delta.changed.is_empty());
        }
        other => panic!("expected membership delta, got {:?}", other),
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_join_and_leave_are_reported() {
    init_tracing();
    let mut cluster = leader_cluster("membership-churn").await;

    cluster.add_worker(NodeSpec::new("w1", "ingest")).await.unwrap();
    cluster.add_worker(NodeSpec::new("w2", "query")).await.unwrap();
    cluster.settle(Duration::from_millis(50)).await;
    assert_eq!(cluster.manager(0).view().ids(), vec!["w1", "w2"]);

    assert!(cluster.remove_worker("w1").await);
    cluster.settle(Duration::from_millis(50)).await;
    assert_eq!(cluster.manager(0).view().ids(), vec!["w2"]);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_rewritten_record_shows_up_as_changed() {
    init_tracing();
    let mut cluster = leader_cluster("membership-changed").await;
    cluster.add_worker(NodeSpec::new("w1", "ingest")).await.unwrap();
    cluster.settle(Duration::from_millis(50)).await;

    cluster
        .update_worker(NodeSpec::new("w1", "ingest").with_version(2))
        .await
        .unwrap();
    // the record rewrite is picked up by the next membership scan
    cluster.add_worker(NodeSpec::new("w2", "ingest")).await.unwrap();

    match cluster.manager_mut(0).next_event(Duration::from_secs(2)).await {
        Some(CoordinatorEvent::Membership(delta)) => {
            assert_eq!(delta.added, vec![NodeSpec::new("w2", "ingest")]);
            assert_eq!(delta.changed, vec![NodeSpec::new("w1", "ingest").with_version(2)]);
            assert!(delta.removed.is_empty());
        }
        other => panic!("expected membership delta, got {:?}", other),
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_new_leader_reports_full_membership() {
    init_tracing();
    let mut cluster = leader_cluster("membership-failover").await;
    cluster.add_manager("mgr-b:8888").await.unwrap();
    cluster.add_worker(NodeSpec::new("w1", "ingest")).await.unwrap();
    cluster.add_worker(NodeSpec::new("w2", "ingest")).await.unwrap();
    cluster.settle(Duration::from_millis(50)).await;
    assert!(cluster.manager(1).view().is_empty());

    cluster.manager(0).crash();
    cluster.settle(Duration::from_millis(50)).await;
    assert_eq!(cluster.wait_for_leader(Duration::from_secs(5)).await, Some(1));
    assert_eq!(cluster.manager(1).view().ids(), vec!["w1", "w2"]);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_registration_closes_with_its_session() {
    init_tracing();
    let mut cluster = leader_cluster("membership-registration").await;
    cluster.add_worker(NodeSpec::new("w1", "ingest")).await.unwrap();

    let worker = cluster.worker_mut("w1").unwrap();
    assert!(!worker.registration().is_closed());
    worker.session().expire();
    tokio::time::timeout(Duration::from_secs(2), worker.registration().closed())
        .await
        .expect("registration did not close");

    cluster.settle(Duration::from_millis(50)).await;
    assert!(!cluster.manager(0).view().contains("w1"));

    cluster.shutdown().await;
}
