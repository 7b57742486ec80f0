//! Reconcile a desired config against the last observed snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::diff::{self, DiffPolicy};
use crate::error::Result;
use crate::remote::RemoteApi;
use crate::snapshot::{DesiredConfig, PatchDocument, Snapshot};
use crate::telemetry::metrics::{Metrics, result_label};

/// Compute the patch that moves `prior` to `desired`. Pure.
pub fn reconcile(
    prior: &Snapshot,
    desired: &DesiredConfig,
    policy: &DiffPolicy,
) -> Result<PatchDocument> {
    diff::diff(prior, desired, policy)
}

/// Applies reconcile patches to remote resources.
///
/// Diff policies are registered per resource type; an unregistered type
/// gets an empty policy (nothing immutable, collections replaced wholesale).
pub struct Reconciler<A> {
    api: Arc<A>,
    policies: BTreeMap<String, DiffPolicy>,
    metrics: Option<Arc<Metrics>>,
}

impl<A: RemoteApi> Reconciler<A> {
    pub const fn new(api: Arc<A>) -> Self {
        Self {
            api,
            policies: BTreeMap::new(),
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, resource_type: &str, policy: DiffPolicy) -> Self {
        self.policies.insert(resource_type.to_string(), policy);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Diff and submit the patch in one remote update.
    ///
    /// Returns the snapshot after the update, or `prior` unchanged when
    /// there is nothing to patch.
    pub async fn apply(
        &self,
        id: &str,
        prior: &Snapshot,
        desired: &DesiredConfig,
        resource_type: &str,
    ) -> Result<Snapshot> {
        let result = self.apply_patch(id, prior, desired, resource_type).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_reconcile(resource_type, result_label(&result));
        }
        result
    }

    async fn apply_patch(
        &self,
        id: &str,
        prior: &Snapshot,
        desired: &DesiredConfig,
        resource_type: &str,
    ) -> Result<Snapshot> {
        let patch = match self.policies.get(resource_type) {
            Some(policy) => reconcile(prior, desired, policy)?,
            None => reconcile(prior, desired, &DiffPolicy::default())?,
        };

        if patch.is_empty() {
            debug!(resource = id, resource_type, "Resource is up to date");
            return Ok(prior.clone());
        }

        info!(
            resource = id,
            resource_type,
            attributes = ?patch.attribute_names(),
            "Updating resource"
        );
        self.api.update(id, &patch).await
    }
}
