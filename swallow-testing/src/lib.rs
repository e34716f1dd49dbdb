pub mod fault_injection;
pub mod harness;

pub use fault_injection::{create_test_scenarios, ExpectedOutcome, FaultType, TestResult, TestScenario};
pub use harness::{ClusterHarness, ManagerNode, MembershipView, WorkerNode};
