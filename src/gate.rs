//! Upgrade policy gates and acknowledgment checks.

use serde::{Deserialize, Serialize};

use crate::version::Version;

/// A policy agreement that may block an upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Gates that only concern STS clusters are acknowledged automatically.
    #[serde(default)]
    pub sts_only: bool,
}

/// Result of checking an acknowledgment token against discovered gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateEvaluation {
    pub requires_ack: bool,
    pub satisfied: bool,
}

impl GateEvaluation {
    /// Returns true if the upgrade must not be scheduled.
    pub const fn is_blocked(&self) -> bool {
        self.requires_ack && !self.satisfied
    }
}

/// Decide whether `ack_token` satisfies the gates blocking an upgrade to `target`.
///
/// Only gates with `sts_only == false` require acknowledgment, and the token must
/// equal the target's `major.minor` exactly.
pub fn evaluate(gates: &[Gate], ack_token: &str, target: &Version) -> GateEvaluation {
    let requires_ack = gates.iter().any(|g| !g.sts_only);
    let satisfied = !requires_ack || ack_token == target.minor_id();
    GateEvaluation {
        requires_ack,
        satisfied,
    }
}

/// Descriptions of the gates that need explicit acknowledgment.
pub fn pending_descriptions(gates: &[Gate]) -> Vec<String> {
    gates
        .iter()
        .filter(|g| !g.sts_only)
        .map(|g| {
            if g.description.is_empty() {
                g.id.clone()
            } else {
                g.description.clone()
            }
        })
        .collect()
}
