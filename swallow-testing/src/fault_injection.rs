use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

use swallow_core::NodeSpec;

use crate::harness::ClusterHarness;

#[derive(Debug, Clone)]
pub enum FaultType {
    /// Expire the current leader's session
    CrashLeader,
    /// Close the current leader's session cleanly
    StopLeader,
    /// Drop the leader's connection briefly without losing the session
    DisconnectLeader { duration: Duration },
    WorkerJoins { node: NodeSpec },
    WorkerLeaves { id: String },
    WorkerUpdates { node: NodeSpec },
}

#[derive(Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub description: String,
    pub manager_count: usize,
    pub initial_workers: Vec<NodeSpec>,
    pub faults: Vec<(Duration, FaultType)>, // (delay before injecting, fault)
    pub expected_outcome: ExpectedOutcome,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedOutcome {
    /// The first leader keeps leading and sees exactly these workers
    StableLeader { members: Vec<String> },
    /// A different manager ends up leading and sees exactly these workers
    Failover { members: Vec<String> },
}

#[derive(Debug)]
pub struct TestResult {
    pub scenario_name: String,
    pub success: bool,
    pub duration: Duration,
    pub initial_leader: Option<String>,
    pub final_leader: Option<String>,
    pub final_members: Vec<String>,
    pub errors: Vec<String>,
}

impl ClusterHarness {
    pub async fn run_scenario(&mut self, scenario: TestScenario) -> TestResult {
        info!("Running scenario: {}", scenario.name);
        let start = Instant::now();
        let mut errors = Vec::new();

        for i in 0..scenario.manager_count {
            if let Err(e) = self.add_manager(&format!("mgr-{}:8888", i)).await {
                errors.push(format!("start manager {}: {}", i, e));
            }
        }
        for node in &scenario.initial_workers {
            if let Err(e) = self.add_worker(node.clone()).await {
                errors.push(format!("register {}: {}", node.id, e));
            }
        }

        let initial = self.wait_for_leader(scenario.timeout).await;
        let initial_leader = initial.map(|i| self.manager(i).leader_id().to_string());
        if initial.is_none() {
            errors.push("no initial leader".to_string());
        }

        for (delay, fault) in &scenario.faults {
            sleep(*delay).await;
            if let Err(e) = self.inject(fault).await {
                warn!("fault {:?} failed: {}", fault, e);
                errors.push(format!("{:?}: {}", fault, e));
            }
        }

        // let a crashed leader's coordinator notice before looking again
        self.settle(Duration::from_millis(50)).await;
        let last = self.wait_for_leader(scenario.timeout).await;
        self.settle(Duration::from_millis(100)).await;
        let final_leader = last.map(|i| self.manager(i).leader_id().to_string());
        let final_members = last
            .map(|i| self.manager(i).view().ids())
            .unwrap_or_default();

        let (expected_members, expect_change) = match &scenario.expected_outcome {
            ExpectedOutcome::StableLeader { members } => (members, false),
            ExpectedOutcome::Failover { members } => (members, true),
        };
        let mut expected_members = expected_members.clone();
        expected_members.sort();

        if final_leader.is_none() {
            errors.push("no leader at end of scenario".to_string());
        } else if (initial_leader != final_leader) != expect_change {
            errors.push(format!(
                "leader went from {:?} to {:?}",
                initial_leader, final_leader
            ));
        }
        if final_members != expected_members {
            errors.push(format!(
                "expected members {:?}, leader sees {:?}",
                expected_members, final_members
            ));
        }

        let result = TestResult {
            scenario_name: scenario.name,
            success: errors.is_empty(),
            duration: start.elapsed(),
            initial_leader,
            final_leader,
            final_members,
            errors,
        };
        info!(
            "Scenario {} finished: success={} in {:?}",
            result.scenario_name, result.success, result.duration
        );
        result
    }

    async fn inject(&mut self, fault: &FaultType) -> swallow_core::Result<()> {
        match fault {
            FaultType::CrashLeader => {
                if let Some(index) = self.leader_index() {
                    self.manager(index).crash();
                }
            }
            FaultType::StopLeader => {
                if let Some(index) = self.leader_index() {
                    self.manager(index).stop().await;
                }
            }
            FaultType::DisconnectLeader { duration } => {
                if let Some(index) = self.leader_index() {
                    let session = self.manager(index).session().clone();
                    session.disconnect();
                    sleep(*duration).await;
                    session.reconnect();
                }
            }
            FaultType::WorkerJoins { node } => self.add_worker(node.clone()).await?,
            FaultType::WorkerLeaves { id } => {
                self.remove_worker(id).await;
            }
            FaultType::WorkerUpdates { node } => self.update_worker(node.clone()).await?,
        }
        Ok(())
    }
}

pub fn create_test_scenarios() -> Vec<TestScenario> {
    let workers = vec![
        NodeSpec::new("worker-1", "ingest").with_quota("cpu", 8),
        NodeSpec::new("worker-2", "ingest").with_quota("cpu", 4),
    ];

    vec![
        TestScenario {
            name: "Stable Leadership".to_string(),
            description: "Three managers, two workers, no faults".to_string(),
            manager_count: 3,
            initial_workers: workers.clone(),
            faults: vec![],
            expected_outcome: ExpectedOutcome::StableLeader {
                members: vec!["worker-1".to_string(), "worker-2".to_string()],
            },
            timeout: Duration::from_secs(5),
        },
        TestScenario {
            name: "Worker Churn".to_string(),
            description: "Workers join and leave under a stable leader".to_string(),
            manager_count: 2,
            initial_workers: workers.clone(),
            faults: vec![
                (
                    Duration::from_millis(50),
                    FaultType::WorkerJoins {
                        node: NodeSpec::new("worker-3", "query"),
                    },
                ),
                (
                    Duration::from_millis(50),
                    FaultType::WorkerLeaves {
                        id: "worker-1".to_string(),
                    },
                ),
            ],
            expected_outcome: ExpectedOutcome::StableLeader {
                members: vec!["worker-2".to_string(), "worker-3".to_string()],
            },
            timeout: Duration::from_secs(5),
        },
        TestScenario {
            name: "Leader Crash".to_string(),
            description: "The leader's session expires and a follower takes over".to_string(),
            manager_count: 3,
            initial_workers: workers.clone(),
            faults: vec![(Duration::from_millis(50), FaultType::CrashLeader)],
            expected_outcome: ExpectedOutcome::Failover {
                members: vec!["worker-1".to_string(), "worker-2".to_string()],
            },
            timeout: Duration::from_secs(5),
        },
        TestScenario {
            name: "Transient Disconnect".to_string(),
            description: "The leader loses its connection briefly and keeps leading".to_string(),
            manager_count: 2,
            initial_workers: workers,
            faults: vec![(
                Duration::from_millis(50),
                FaultType::DisconnectLeader {
                    duration: Duration::from_millis(50),
                },
            )],
            expected_outcome: ExpectedOutcome::StableLeader {
                members: vec!["worker-1".to_string(), "worker-2".to_string()],
            },
            timeout: Duration::from_secs(5),
        },
    ]
}
