//! Multi-replica simulation harness for the cograph graph types.
//!
//! Drives several replicas of one graph variant through random local edits
//! and state exchange, then checks that repair brought every replica to the
//! same valid state. Used by the `cograph-sim` binary and by the scenario
//! tests.

pub mod driver;
pub mod error;
pub mod workload;

pub use driver::{sync_and_repair_all, verify_converged, StormDriver, StormStats};
pub use error::SimError;
pub use workload::{run_workload, RandomEdits, WorkloadStats};
