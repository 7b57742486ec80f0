//! In-memory [`RemoteApi`] that records every call, for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{RemoteApi, UpgradePolicy};
use crate::error::{ClupError, Result};
use crate::gate::Gate;
use crate::snapshot::{PatchDocument, Snapshot};
use crate::version::Version;

#[derive(Default)]
pub struct FakeState {
    /// Scripted `get` responses. The last one repeats once the queue drains.
    pub responses: VecDeque<Result<Snapshot>>,
    pub policies: Vec<UpgradePolicy>,
    pub available: Vec<Version>,
    pub gates: Vec<Gate>,
    pub updates: Vec<PatchDocument>,
    pub added: Vec<UpgradePolicy>,
    pub deleted: Vec<String>,
    pub acknowledged: Vec<String>,
    pub version_queries: Vec<String>,
    pub fail_delete: Option<ClupError>,
    pub fail_gates: Option<ClupError>,
    pub fail_add: Option<ClupError>,
    pub calls: Vec<&'static str>,
}

#[derive(Default)]
pub struct FakeRemote {
    pub state: Mutex<FakeState>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(f: impl FnOnce(&mut FakeState)) -> Self {
        let fake = Self::new();
        f(&mut fake.state.lock().unwrap());
        fake
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn added(&self) -> Vec<UpgradePolicy> {
        self.state.lock().unwrap().added.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn acknowledged(&self) -> Vec<String> {
        self.state.lock().unwrap().acknowledged.clone()
    }

    pub fn updates(&self) -> Vec<PatchDocument> {
        self.state.lock().unwrap().updates.clone()
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn get(&self, id: &str) -> Result<Snapshot> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("get");
        match state.responses.len() {
            0 => Err(ClupError::NotFound(id.to_string())),
            1 => state.responses[0].clone(),
            _ => state.responses.pop_front().unwrap(),
        }
    }

    async fn update(&self, _id: &str, patch: &PatchDocument) -> Result<Snapshot> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("update");
        state.updates.push(patch.clone());
        let base = match state.responses.front() {
            Some(Ok(s)) => s.clone(),
            _ => Snapshot::new(),
        };
        Ok(base.with_patch(patch))
    }

    async fn list_upgrade_policies(&self, _id: &str) -> Result<Vec<UpgradePolicy>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("list_upgrade_policies");
        Ok(state.policies.clone())
    }

    async fn add_upgrade_policy(&self, _id: &str, policy: &UpgradePolicy) -> Result<UpgradePolicy> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("add_upgrade_policy");
        if let Some(err) = state.fail_add.clone() {
            return Err(err);
        }
        let mut created = policy.clone();
        created.id = Some(format!("policy-{}", state.added.len() + 1));
        state.added.push(created.clone());
        state.policies.push(created.clone());
        Ok(created)
    }

    async fn delete_upgrade_policy(&self, _id: &str, policy_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("delete_upgrade_policy");
        if let Some(err) = state.fail_delete.clone() {
            return Err(err);
        }
        state.deleted.push(policy_id.to_string());
        state.policies.retain(|p| p.id.as_deref() != Some(policy_id));
        Ok(())
    }

    async fn list_available_upgrade_versions(
        &self,
        _id: &str,
        from_version_id: &str,
    ) -> Result<Vec<Version>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("list_available_upgrade_versions");
        state.version_queries.push(from_version_id.to_string());
        Ok(state.available.clone())
    }

    async fn list_required_gates(&self, _id: &str, _target: &Version) -> Result<Vec<Gate>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("list_required_gates");
        if let Some(err) = state.fail_gates.clone() {
            return Err(err);
        }
        Ok(state.gates.clone())
    }

    async fn acknowledge_gate(&self, _id: &str, gate_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("acknowledge_gate");
        if !state.acknowledged.iter().any(|g| g == gate_id) {
            state.acknowledged.push(gate_id.to_string());
        }
        Ok(())
    }
}
