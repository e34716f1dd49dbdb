//! Leader election across several managers sharing one coordination service.

use std::time::Duration;

use swallow_core::{CoordinatorEvent, Role};
use swallow_testing::ClusterHarness;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

#[tokio::test]
async fn test_exactly_one_leader() {
    init_tracing();
    let mut cluster = ClusterHarness::new("election-one");
    for i in 0..3 {
        cluster.add_manager(&format!("mgr-{}:8888", i)).await.unwrap();
    }

    let leader = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("no leader elected");
    cluster.settle(Duration::from_millis(50)).await;
    let leader_id = cluster.manager(leader).leader_id().to_string();

    for (i, manager) in cluster.managers().iter().enumerate() {
        if i == leader {
            assert_eq!(manager.role(), Role::Leader);
            assert!(manager.followed_leader().is_none());
        } else {
            assert_eq!(manager.role(), Role::Follower);
            assert_eq!(manager.followed_leader(), Some(leader_id.as_str()));
        }
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_follower_takes_over_after_leader_crash() {
    init_tracing();
    let mut cluster = ClusterHarness::new("election-crash");
    cluster.add_manager("mgr-a:8888").await.unwrap();
    let first = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .unwrap();
    cluster.add_manager("mgr-b:8888").await.unwrap();
    cluster.settle(Duration::from_millis(50)).await;
    assert_eq!(cluster.manager(1).role(), Role::Follower);

    cluster.manager(first).crash();
    cluster.settle(Duration::from_millis(50)).await;

    let next = cluster.wait_for_leader(Duration::from_secs(5)).await.unwrap();
    assert_eq!(next, 1);
    assert_eq!(cluster.manager(first).role(), Role::Terminated);
    assert!(cluster.manager(first).is_closed());

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_clean_stop_hands_over_leadership() {
    init_tracing();
    let mut cluster = ClusterHarness::new("election-stop");
    cluster.add_manager("mgr-a:8888").await.unwrap();
    cluster.wait_for_leader(Duration::from_secs(5)).await.unwrap();
    cluster.add_manager("mgr-b:8888").await.unwrap();
    cluster.settle(Duration::from_millis(50)).await;

    cluster.manager(0).stop().await;
    cluster.settle(Duration::from_millis(50)).await;

    assert_eq!(cluster.wait_for_leader(Duration::from_secs(5)).await, Some(1));
    assert_eq!(cluster.manager(0).role(), Role::Terminated);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_follower_sees_new_leader_identity() {
    init_tracing();
    let mut cluster = ClusterHarness::new("election-identity");
    cluster.add_manager("mgr-a:8888").await.unwrap();
    cluster.wait_for_leader(Duration::from_secs(5)).await.unwrap();
    cluster.add_manager("mgr-b:8888").await.unwrap();
    cluster.add_manager("mgr-c:8888").await.unwrap();
    cluster.settle(Duration::from_millis(50)).await;
    assert_eq!(cluster.manager(2).followed_leader(), Some("mgr-a:8888"));

    // mgr-b's candidate is the lowest once mgr-a is gone
    cluster.manager(0).crash();
    cluster.settle(Duration::from_millis(50)).await;
    assert_eq!(cluster.wait_for_leader(Duration::from_secs(5)).await, Some(1));
    assert_eq!(cluster.manager(2).followed_leader(), Some("mgr-b:8888"));

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_leader_events_are_membership_only() {
    init_tracing();
    let mut cluster = ClusterHarness::new("election-events");
    let index = cluster.add_manager("mgr-a:8888").await.unwrap();

    let event = cluster
        .manager_mut(index)
        .next_event(Duration::from_secs(2))
        .await;
    assert!(matches!(event, Some(CoordinatorEvent::Membership(_))));
    assert!(cluster.manager(index).is_leader());

    cluster.shutdown().await;
}
