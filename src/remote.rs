//! Remote resource API seam.
//!
//! Everything that talks to the managed-cluster service goes through
//! [`RemoteApi`], so the reconcile, wait and upgrade logic can run against
//! the OCM REST client or an in-memory fake.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gate::Gate;
use crate::snapshot::{PatchDocument, Snapshot};
use crate::version::Version;

#[cfg(test)]
pub mod fake;

/// How an upgrade policy is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    #[default]
    Manual,
    Automatic,
}

impl ScheduleType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Automatic => "automatic",
        }
    }
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheduled upgrade recorded remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePolicy {
    /// Assigned by the remote system; `None` until created.
    pub id: Option<String>,
    pub target_version: Version,
    pub schedule_type: ScheduleType,
    pub next_run: DateTime<Utc>,
}

impl UpgradePolicy {
    /// A new manual policy, not yet created remotely.
    pub const fn manual(target_version: Version, next_run: DateTime<Utc>) -> Self {
        Self {
            id: None,
            target_version,
            schedule_type: ScheduleType::Manual,
            next_run,
        }
    }

    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or("unknown")
    }
}

/// Operations the core needs from the remote resource service.
///
/// Implementations classify failures with the crate taxonomy: a missing
/// resource is `NotFound`, retryable failures are `Transient`, and
/// non-retryable client errors are `Fatal`.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Fetch the current state of the resource.
    async fn get(&self, id: &str) -> Result<Snapshot>;

    /// Submit a whole patch in a single update call.
    async fn update(&self, id: &str, patch: &PatchDocument) -> Result<Snapshot>;

    async fn list_upgrade_policies(&self, id: &str) -> Result<Vec<UpgradePolicy>>;

    async fn add_upgrade_policy(&self, id: &str, policy: &UpgradePolicy) -> Result<UpgradePolicy>;

    async fn delete_upgrade_policy(&self, id: &str, policy_id: &str) -> Result<()>;

    /// Versions reachable from the version with the given remote id.
    async fn list_available_upgrade_versions(
        &self,
        id: &str,
        from_version_id: &str,
    ) -> Result<Vec<Version>>;

    /// Gates that block an upgrade of the resource to `target`.
    async fn list_required_gates(&self, id: &str, target: &Version) -> Result<Vec<Gate>>;

    /// Record agreement to a gate. Acknowledging an already acknowledged gate succeeds.
    async fn acknowledge_gate(&self, id: &str, gate_id: &str) -> Result<()>;
}
