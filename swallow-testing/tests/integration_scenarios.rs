//! Canned failure scenarios.

use std::time::Duration;
use tokio::time::timeout;

use swallow_testing::{create_test_scenarios, ClusterHarness};

#[tokio::test]
async fn test_all_scenarios() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();

    for scenario in create_test_scenarios() {
        let name = scenario.name.clone();
        let mut harness = ClusterHarness::new(&name.to_lowercase().replace(' ', "-"));

        let result = timeout(Duration::from_secs(30), harness.run_scenario(scenario))
            .await
            .unwrap_or_else(|_| panic!("scenario {} timed out", name));
        assert!(result.success, "scenario {} failed: {:?}", name, result.errors);

        harness.shutdown().await;
    }
}
