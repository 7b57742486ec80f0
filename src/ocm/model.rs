//! Wire types for the clusters_mgmt v1 API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClupError, Result};
use crate::gate::Gate;
use crate::remote::{ScheduleType, UpgradePolicy};

/// Upgrade type of cluster (control plane and workers) upgrade policies.
pub const CLUSTER_UPGRADE_TYPE: &str = "OSD";

const VERSION_GATE_KIND: &str = "VersionGate";

fn default_upgrade_type() -> String {
    CLUSTER_UPGRADE_TYPE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradePolicyBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub version: String,
    pub schedule_type: ScheduleType,
    pub next_run: DateTime<Utc>,
    #[serde(default = "default_upgrade_type")]
    pub upgrade_type: String,
}

impl From<&UpgradePolicy> for UpgradePolicyBody {
    fn from(policy: &UpgradePolicy) -> Self {
        Self {
            id: None,
            version: policy.target_version.to_string(),
            schedule_type: policy.schedule_type,
            next_run: policy.next_run,
            upgrade_type: default_upgrade_type(),
        }
    }
}

impl UpgradePolicyBody {
    pub fn into_policy(self) -> Result<UpgradePolicy> {
        Ok(UpgradePolicy {
            id: self.id,
            target_version: self.version.parse()?,
            schedule_type: self.schedule_type,
            next_run: self.next_run,
        })
    }

    pub fn is_cluster_upgrade(&self) -> bool {
        self.upgrade_type == CLUSTER_UPGRADE_TYPE
    }
}

#[derive(Debug, Deserialize)]
pub struct UpgradePolicyList {
    #[serde(default)]
    pub items: Vec<UpgradePolicyBody>,
}

#[derive(Debug, Deserialize)]
pub struct VersionInfo {
    pub id: String,
    #[serde(default)]
    pub available_upgrades: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GateAgreementBody {
    pub version_gate: GateRef,
}

#[derive(Debug, Serialize)]
pub struct GateRef {
    pub id: String,
}

impl GateAgreementBody {
    pub fn new(gate_id: &str) -> Self {
        Self {
            version_gate: GateRef {
                id: gate_id.to_string(),
            },
        }
    }
}

/// Error body returned by the API; `details` may enumerate blocking gates.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub details: Vec<Value>,
}

impl ErrorBody {
    /// Version gates listed in `details`. Other detail kinds are ignored.
    ///
    /// A `VersionGate` entry that cannot be decoded is an error, never skipped.
    pub fn version_gates(&self) -> Result<Vec<Gate>> {
        self.details
            .iter()
            .filter(|d| d.get("kind").and_then(Value::as_str) == Some(VERSION_GATE_KIND))
            .map(|d| {
                serde_json::from_value(d.clone()).map_err(|e| {
                    ClupError::fatal(module_path!(), format!("invalid version gate {d}: {e}"))
                })
            })
            .collect()
    }
}
