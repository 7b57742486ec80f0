use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::model::{
    ErrorBody, GateAgreementBody, UpgradePolicyBody, UpgradePolicyList, VersionInfo,
};
use crate::config::OcmConfig;
use crate::error::{ClupError, Result};
use crate::gate::Gate;
use crate::orchestrator::DEFAULT_LEAD_TIME;
use crate::remote::{RemoteApi, UpgradePolicy};
use crate::snapshot::{PatchDocument, Snapshot};
use crate::version::Version;

const COMPONENT: &str = "ocm";
const API_PREFIX: &str = "/api/clusters_mgmt/v1";

/// OCM clusters_mgmt REST client.
pub struct OcmClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
    /// Start offset of the dry-run policy used for gate discovery.
    lead_time: TimeDelta,
}

impl OcmClient {
    pub fn new(
        base_url: impl Into<String>,
        token: SecretString,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            lead_time: DEFAULT_LEAD_TIME,
        })
    }

    /// Schedule gate-discovery dry runs with the orchestrator's lead time.
    #[must_use]
    pub fn with_lead_time(mut self, lead_time: TimeDelta) -> Self {
        self.lead_time = lead_time;
        self
    }

    /// Build a client from configuration, reading the token from the environment.
    pub fn from_config(config: &OcmConfig) -> anyhow::Result<Self> {
        let token = config.token()?;
        Self::new(config.url.clone(), token, config.request_timeout())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{API_PREFIX}{path}", self.base_url);
        self.http
            .request(method, url)
            .bearer_auth(self.token.expose_secret())
    }

    /// Send a request; non-success statuses are mapped onto the error taxonomy.
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = send_raw(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClupError::from_status(COMPONENT, status.as_u16(), &body))
    }

    async fn fetch_cluster(&self, path: String) -> Result<Snapshot> {
        let response = self.send(self.request(Method::GET, &path)).await?;
        Snapshot::from_json(read_json(response).await?)
    }
}

async fn send_raw(request: RequestBuilder) -> Result<Response> {
    request
        .send()
        .await
        .map_err(|e| ClupError::from_transport(COMPONENT, &e))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| ClupError::fatal(COMPONENT, format!("invalid response body: {e}")))
}

fn cluster_path(id: &str) -> String {
    format!("/clusters/{id}")
}

#[async_trait]
impl RemoteApi for OcmClient {
    async fn get(&self, id: &str) -> Result<Snapshot> {
        debug!(cluster = id, "Fetching cluster");
        self.fetch_cluster(cluster_path(id)).await
    }

    async fn update(&self, id: &str, patch: &PatchDocument) -> Result<Snapshot> {
        debug!(cluster = id, attributes = ?patch.attribute_names(), "Patching cluster");
        let response = self
            .send(
                self.request(Method::PATCH, &cluster_path(id))
                    .json(&patch.to_json()),
            )
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            return self.fetch_cluster(cluster_path(id)).await;
        }
        Snapshot::from_json(read_json(response).await?)
    }

    async fn list_upgrade_policies(&self, id: &str) -> Result<Vec<UpgradePolicy>> {
        let path = format!("{}/upgrade_policies", cluster_path(id));
        let response = self.send(self.request(Method::GET, &path)).await?;
        let list: UpgradePolicyList = read_json(response).await?;

        list.items
            .into_iter()
            .filter(UpgradePolicyBody::is_cluster_upgrade)
            .map(UpgradePolicyBody::into_policy)
            .collect()
    }

    async fn add_upgrade_policy(&self, id: &str, policy: &UpgradePolicy) -> Result<UpgradePolicy> {
        let path = format!("{}/upgrade_policies", cluster_path(id));
        let response = self
            .send(
                self.request(Method::POST, &path)
                    .json(&UpgradePolicyBody::from(policy)),
            )
            .await?;
        let created: UpgradePolicyBody = read_json(response).await?;
        created.into_policy()
    }

    async fn delete_upgrade_policy(&self, id: &str, policy_id: &str) -> Result<()> {
        let path = format!("{}/upgrade_policies/{policy_id}", cluster_path(id));
        self.send(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }

    async fn list_available_upgrade_versions(
        &self,
        _id: &str,
        from_version_id: &str,
    ) -> Result<Vec<Version>> {
        let path = format!("/versions/{from_version_id}");
        let response = self.send(self.request(Method::GET, &path)).await?;
        let info: VersionInfo = read_json(response).await?;

        let versions = info
            .available_upgrades
            .iter()
            .filter_map(|raw| match raw.parse() {
                Ok(version) => Some(version),
                Err(e) => {
                    warn!(version = info.id.as_str(), error = %e, "Skipping unparsable upgrade version");
                    None
                }
            })
            .collect();
        Ok(versions)
    }

    /// Gates are discovered with a dry-run policy creation: the API rejects it
    /// with a 400 whose `details` list every unacknowledged version gate.
    async fn list_required_gates(&self, id: &str, target: &Version) -> Result<Vec<Gate>> {
        let path = format!("{}/upgrade_policies", cluster_path(id));
        let dry_run = UpgradePolicy::manual(target.clone(), Utc::now() + self.lead_time);
        let response = send_raw(
            self.request(Method::POST, &path)
                .query(&[("dryRun", "true")])
                .json(&UpgradePolicyBody::from(&dry_run)),
        )
        .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(Vec::new());
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST {
            let gates = serde_json::from_str::<ErrorBody>(&body)
                .unwrap_or_default()
                .version_gates()?;
            if !gates.is_empty() {
                debug!(cluster = id, version = %target, gates = gates.len(), "Discovered version gates");
                return Ok(gates);
            }
        }
        Err(ClupError::from_status(COMPONENT, status.as_u16(), &body))
    }

    async fn acknowledge_gate(&self, id: &str, gate_id: &str) -> Result<()> {
        let path = format!("{}/gate_agreements", cluster_path(id));
        let response = send_raw(
            self.request(Method::POST, &path)
                .json(&GateAgreementBody::new(gate_id)),
        )
        .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::CONFLICT {
            debug!(cluster = id, gate = gate_id, "Gate agreement recorded");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClupError::from_status(COMPONENT, status.as_u16(), &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ScheduleType;
    use crate::types::{AttrValue, TriState};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup() -> (MockServer, OcmClient) {
        let server = MockServer::start().await;
        let client = OcmClient::new(
            server.uri(),
            SecretString::from("test-token".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        (server, client)
    }

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_get_cluster() {
        let (server, client) = setup().await;
        Mock::given(method("GET"))
            .and(path("/api/clusters_mgmt/v1/clusters/c1"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "c1",
                "state": "ready",
                "version": {"raw_id": "4.12.0"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = client.get("c1").await.unwrap();
        assert_eq!(snapshot.get("state"), &TriState::Value(AttrValue::from("ready")));
    }

    #[tokio::test]
    async fn test_get_maps_statuses() {
        let (server, client) = setup().await;
        Mock::given(method("GET"))
            .and(path("/api/clusters_mgmt/v1/clusters/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "kind": "Error",
                "reason": "Cluster 'gone' not found"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/clusters_mgmt/v1/clusters/busy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/clusters_mgmt/v1/clusters/denied"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        assert_eq!(
            client.get("gone").await.unwrap_err(),
            ClupError::NotFound("Cluster 'gone' not found".to_string())
        );
        assert!(client.get("busy").await.unwrap_err().is_transient());
        assert!(matches!(
            client.get("denied").await.unwrap_err(),
            ClupError::Fatal { .. }
        ));
    }

    #[tokio::test]
    async fn test_update_sends_patch_body() {
        let (server, client) = setup().await;
        Mock::given(method("PATCH"))
            .and(path("/api/clusters_mgmt/v1/clusters/c1"))
            .and(body_json(json!({"replicas": 5, "labels": null})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "c1",
                "replicas": 5
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut patch = PatchDocument::new();
        patch.push("labels", TriState::Null);
        patch.push("replicas", TriState::Value(AttrValue::Int(5)));

        let snapshot = client.update("c1", &patch).await.unwrap();
        assert_eq!(snapshot.get("replicas"), &TriState::Value(AttrValue::Int(5)));
    }

    #[tokio::test]
    async fn test_list_upgrade_policies_skips_other_types() {
        let (server, client) = setup().await;
        Mock::given(method("GET"))
            .and(path("/api/clusters_mgmt/v1/clusters/c1/upgrade_policies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "UpgradePolicyList",
                "items": [
                    {"id": "p1", "version": "4.12.0", "schedule_type": "manual",
                     "next_run": "2026-01-01T10:00:00Z", "upgrade_type": "OSD"},
                    {"id": "p2", "version": "4.12.0", "schedule_type": "automatic",
                     "next_run": "2026-01-01T10:00:00Z", "upgrade_type": "ADDON"}
                ]
            })))
            .mount(&server)
            .await;

        let policies = client.list_upgrade_policies("c1").await.unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].id(), "p1");
        assert_eq!(policies[0].schedule_type, ScheduleType::Manual);
    }

    #[tokio::test]
    async fn test_add_and_delete_upgrade_policy() {
        let (server, client) = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/clusters_mgmt/v1/clusters/c1/upgrade_policies"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "new-policy",
                "version": "4.12.0",
                "schedule_type": "manual",
                "next_run": "2026-01-01T10:10:00Z",
                "upgrade_type": "OSD"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/clusters_mgmt/v1/clusters/c1/upgrade_policies/old-policy"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let created = client
            .add_upgrade_policy("c1", &UpgradePolicy::manual(v("4.12.0"), Utc::now()))
            .await
            .unwrap();
        assert_eq!(created.id(), "new-policy");

        client.delete_upgrade_policy("c1", "old-policy").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_available_upgrade_versions() {
        let (server, client) = setup().await;
        Mock::given(method("GET"))
            .and(path("/api/clusters_mgmt/v1/versions/openshift-v4.11.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "openshift-v4.11.0",
                "raw_id": "4.11.0",
                "available_upgrades": ["4.11.5", "4.12.0", "not-a-version"]
            })))
            .mount(&server)
            .await;

        let versions = client
            .list_available_upgrade_versions("c1", "openshift-v4.11.0")
            .await
            .unwrap();
        assert_eq!(versions, vec![v("4.11.5"), v("4.12.0")]);
    }

    #[tokio::test]
    async fn test_list_required_gates_from_dry_run() {
        let (server, client) = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/clusters_mgmt/v1/clusters/c1/upgrade_policies"))
            .and(query_param("dryRun", "true"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "kind": "Error",
                "reason": "There are missing version gate agreements",
                "details": [
                    {"kind": "VersionGate", "id": "g1", "description": "Removed APIs", "sts_only": false},
                    {"kind": "VersionGate", "id": "g2", "description": "STS policy", "sts_only": true}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gates = client.list_required_gates("c1", &v("4.12.0")).await.unwrap();
        assert_eq!(
            gates.iter().map(|g| g.id.as_str()).collect::<Vec<_>>(),
            vec!["g1", "g2"]
        );
    }

    /// Matches a policy body whose `next_run` lies `lead_time` from now.
    struct NextRunAfter(TimeDelta);

    impl wiremock::Match for NextRunAfter {
        fn matches(&self, request: &wiremock::Request) -> bool {
            let Ok(body) = serde_json::from_slice::<UpgradePolicyBody>(&request.body) else {
                return false;
            };
            let offset = body.next_run - Utc::now();
            offset > self.0 - TimeDelta::minutes(1) && offset <= self.0
        }
    }

    #[tokio::test]
    async fn test_gate_discovery_uses_configured_lead_time() {
        let (server, client) = setup().await;
        let client = client.with_lead_time(TimeDelta::minutes(45));
        Mock::given(method("POST"))
            .and(path("/api/clusters_mgmt/v1/clusters/c1/upgrade_policies"))
            .and(query_param("dryRun", "true"))
            .and(NextRunAfter(TimeDelta::minutes(45)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        assert!(client.list_required_gates("c1", &v("4.12.0")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_gate_detail_fails_discovery() {
        let (server, client) = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/clusters_mgmt/v1/clusters/c1/upgrade_policies"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "kind": "Error",
                "details": [{"kind": "VersionGate", "sts_only": false}]
            })))
            .mount(&server)
            .await;

        let err = client.list_required_gates("c1", &v("4.12.0")).await.unwrap_err();
        assert!(matches!(err, ClupError::Fatal { .. }));
    }

    #[tokio::test]
    async fn test_list_required_gates_none_pending() {
        let (server, client) = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/clusters_mgmt/v1/clusters/c1/upgrade_policies"))
            .and(query_param("dryRun", "true"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        assert!(client.list_required_gates("c1", &v("4.12.0")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_required_gates_other_bad_request_fails() {
        let (server, client) = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/clusters_mgmt/v1/clusters/c1/upgrade_policies"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "kind": "Error",
                "reason": "Invalid version"
            })))
            .mount(&server)
            .await;

        let err = client.list_required_gates("c1", &v("4.12.0")).await.unwrap_err();
        assert_eq!(err, ClupError::fatal(COMPONENT, "Invalid version"));
    }

    #[tokio::test]
    async fn test_acknowledge_gate_is_idempotent() {
        let (server, client) = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/clusters_mgmt/v1/clusters/c1/gate_agreements"))
            .and(body_json(json!({"version_gate": {"id": "g1"}})))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/clusters_mgmt/v1/clusters/c1/gate_agreements"))
            .and(body_json(json!({"version_gate": {"id": "g2"}})))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        client.acknowledge_gate("c1", "g1").await.unwrap();
        client.acknowledge_gate("c1", "g2").await.unwrap();
    }
}
