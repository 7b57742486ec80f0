//! clup - declarative reconciliation and upgrade orchestration for managed
//! OpenShift clusters.
//!
//! Diffs a desired config against the last observed snapshot, waits for the
//! remote resource to converge, and sequences version upgrades behind
//! version-gate acknowledgment. Each call is stateless; callers own
//! persistence of snapshots between cycles.

pub mod config;
pub mod diff;
pub mod error;
pub mod gate;
pub mod ocm;
pub mod orchestrator;
pub mod reconcile;
pub mod remote;
pub mod snapshot;
pub mod telemetry;
pub mod types;
pub mod version;
pub mod waiter;

pub use config::Config;
pub use diff::{CollectionPolicy, DiffPolicy, diff, should_patch, values_equal};
pub use error::{ClupError, Result};
pub use gate::{Gate, GateEvaluation};
pub use ocm::OcmClient;
pub use orchestrator::{OrchestratorConfig, UpgradeOrchestrator, UpgradeOutcome, UpgradeRequest};
pub use reconcile::{Reconciler, reconcile};
pub use remote::{RemoteApi, ScheduleType, UpgradePolicy};
pub use snapshot::{DesiredConfig, PatchDocument, Snapshot};
pub use types::{AttrValue, TriState};
pub use version::Version;
pub use waiter::{ResourceWaiter, RetryConfig, WaitCondition, WaitConfig, WaitOutcome, wait_until};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
