//! Upgrade orchestration.
//!
//! One call runs the whole sequence: version ordering, availability check,
//! in-flight policy detection and cleanup, gate acknowledgment and finally
//! scheduling. Every fact is re-read from the remote API on each call, so a
//! failed cycle can simply be run again. Creating the policy is the last
//! mutating call; nothing is scheduled unless every check before it passed.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::error::{ClupError, Result};
use crate::gate;
use crate::remote::{RemoteApi, ScheduleType, UpgradePolicy};
use crate::telemetry::metrics::Metrics;
use crate::version::Version;

/// Delay between scheduling and the upgrade start, so gate agreements can propagate.
pub const DEFAULT_LEAD_TIME: TimeDelta = TimeDelta::minutes(10);

/// Scheduling settings for new upgrade policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub lead_time: TimeDelta,
    pub schedule_type: ScheduleType,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            lead_time: DEFAULT_LEAD_TIME,
            schedule_type: ScheduleType::Manual,
        }
    }
}

/// Inputs for one orchestration cycle.
#[derive(Debug, Clone, Default)]
pub struct UpgradeRequest<'a> {
    pub resource_id: &'a str,
    pub current_version: Option<&'a str>,
    pub desired_version: Option<&'a str>,
    pub channel_group: Option<&'a str>,
    pub ack_token: &'a str,
    /// The caller's desired version differs from the one it recorded last cycle.
    pub version_changed: bool,
}

/// How a successful cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// Nothing to do: a version is missing or the plan is stale.
    NoUpgradeNeeded,
    /// A policy for the desired version is already scheduled.
    AlreadyScheduled(UpgradePolicy),
    /// Desired equals current; off-target policies were removed.
    PoliciesCleared { deleted: usize },
    /// A new policy was created.
    Scheduled(UpgradePolicy),
}

impl UpgradeOutcome {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NoUpgradeNeeded => "no_upgrade_needed",
            Self::AlreadyScheduled(_) => "already_scheduled",
            Self::PoliciesCleared { .. } => "policies_cleared",
            Self::Scheduled(_) => "scheduled",
        }
    }
}

/// Existing policies after off-target ones were deleted.
struct PolicyCleanup {
    on_target: Option<UpgradePolicy>,
    deleted: usize,
}

/// Sequences version upgrades of a remote resource.
pub struct UpgradeOrchestrator<A> {
    api: Arc<A>,
    config: OrchestratorConfig,
    metrics: Option<Arc<Metrics>>,
}

impl<A: RemoteApi> UpgradeOrchestrator<A> {
    pub const fn new(api: Arc<A>, config: OrchestratorConfig) -> Self {
        Self {
            api,
            config,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run one orchestration cycle.
    ///
    /// Any failing step aborts the cycle and is returned as is.
    pub async fn orchestrate(&self, request: &UpgradeRequest<'_>) -> Result<UpgradeOutcome> {
        let result = self.run(request).await;

        match &result {
            Ok(outcome) => info!(
                resource = request.resource_id,
                outcome = outcome.label(),
                "Upgrade orchestration finished"
            ),
            Err(e) => warn!(
                resource = request.resource_id,
                error = %e,
                "Upgrade orchestration failed"
            ),
        }

        if let Some(metrics) = &self.metrics {
            let label = match &result {
                Ok(outcome) => outcome.label(),
                Err(e) => e.kind(),
            };
            metrics.record_upgrade(label);
        }

        result
    }

    async fn run(&self, request: &UpgradeRequest<'_>) -> Result<UpgradeOutcome> {
        let id = request.resource_id;

        let (Some(current), Some(desired)) = (request.current_version, request.desired_version)
        else {
            debug!(resource = id, "Current or desired version not set");
            return Ok(UpgradeOutcome::NoUpgradeNeeded);
        };

        let current: Version = current.parse()?;
        let desired: Version = desired.parse()?;

        if current > desired {
            if request.version_changed {
                return Err(ClupError::DowngradeRejected {
                    current: current.to_string(),
                    desired: desired.to_string(),
                });
            }
            info!(
                resource = id,
                current = %current,
                desired = %desired,
                "Resource is ahead of the desired version, skipping"
            );
            return Ok(UpgradeOutcome::NoUpgradeNeeded);
        }

        let canceling_only = current == desired;
        if !canceling_only {
            self.ensure_available(id, &current, &desired, request.channel_group)
                .await?;
        }

        let cleanup = self.clear_off_target_policies(id, &desired).await?;
        if let Some(existing) = cleanup.on_target {
            info!(
                resource = id,
                policy = existing.id(),
                version = %desired,
                next_run = %existing.next_run,
                "Upgrade already scheduled"
            );
            return Ok(UpgradeOutcome::AlreadyScheduled(existing));
        }

        if canceling_only {
            return Ok(UpgradeOutcome::PoliciesCleared {
                deleted: cleanup.deleted,
            });
        }

        self.acknowledge_gates(id, &desired, request.ack_token)
            .await?;

        let policy = UpgradePolicy {
            id: None,
            target_version: desired.clone(),
            schedule_type: self.config.schedule_type,
            next_run: Utc::now() + self.config.lead_time,
        };
        let created = self.api.add_upgrade_policy(id, &policy).await?;

        info!(
            resource = id,
            policy = created.id(),
            from = %current,
            to = %desired,
            next_run = %created.next_run,
            "Scheduled upgrade"
        );
        Ok(UpgradeOutcome::Scheduled(created))
    }

    /// Fail unless `desired` is a listed upgrade target of `current`.
    async fn ensure_available(
        &self,
        id: &str,
        current: &Version,
        desired: &Version,
        channel_group: Option<&str>,
    ) -> Result<()> {
        let from_version_id = current.version_id(channel_group);
        let available = self
            .api
            .list_available_upgrade_versions(id, &from_version_id)
            .await?;

        debug!(
            resource = id,
            from = from_version_id.as_str(),
            available = available.len(),
            "Fetched available upgrade versions"
        );

        if available.contains(desired) {
            Ok(())
        } else {
            Err(ClupError::VersionNotAvailable {
                current: current.to_string(),
                desired: desired.to_string(),
            })
        }
    }

    /// Keep a policy already targeting `desired` and delete every other one.
    ///
    /// More than one on-target policy is a conflict and nothing is deleted.
    async fn clear_off_target_policies(
        &self,
        id: &str,
        desired: &Version,
    ) -> Result<PolicyCleanup> {
        let policies = self.api.list_upgrade_policies(id).await?;
        let (mut on_target, off_target): (Vec<_>, Vec<_>) = policies
            .into_iter()
            .partition(|p| p.target_version == *desired);

        if on_target.len() > 1 {
            return Err(ClupError::PolicyConflict(format!(
                "{} upgrade policies already target {desired}",
                on_target.len()
            )));
        }

        let mut deleted = 0;
        for policy in &off_target {
            let policy_id = policy.id.as_deref().ok_or_else(|| {
                ClupError::fatal(module_path!(), "remote returned an upgrade policy without id")
            })?;
            info!(
                resource = id,
                policy = policy_id,
                version = %policy.target_version,
                "Deleting upgrade policy with a different target"
            );
            self.api.delete_upgrade_policy(id, policy_id).await?;
            deleted += 1;
        }

        Ok(PolicyCleanup {
            on_target: on_target.pop(),
            deleted,
        })
    }

    /// Check the acknowledgment token against the gates blocking `desired`,
    /// then acknowledge every gate remotely.
    async fn acknowledge_gates(&self, id: &str, desired: &Version, ack_token: &str) -> Result<()> {
        let gates = self.api.list_required_gates(id, desired).await?;
        let evaluation = gate::evaluate(&gates, ack_token, desired);

        if evaluation.is_blocked() {
            return Err(ClupError::AcknowledgmentRequired {
                target_minor: desired.minor_id(),
                gates: gate::pending_descriptions(&gates),
            });
        }

        for g in &gates {
            debug!(resource = id, gate = g.id.as_str(), sts_only = g.sts_only, "Acknowledging gate");
            self.api.acknowledge_gate(id, &g.id).await?;
        }

        Ok(())
    }
}
