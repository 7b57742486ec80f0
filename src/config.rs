//! Host-level configuration: OCM connection, wait timing, upgrade scheduling
//! and per-resource-type diff policies.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::diff::DiffPolicy;
use crate::orchestrator::OrchestratorConfig;
use crate::remote::ScheduleType;
use crate::types::AttrValue;
use crate::waiter::{RetryConfig, WaitConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ocm: OcmConfig,
    #[serde(default)]
    pub wait: WaitSettings,
    #[serde(default)]
    pub upgrade: UpgradeSettings,
    /// Diff settings keyed by resource type (e.g. `machine_pool`).
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcmConfig {
    #[serde(default = "default_ocm_url")]
    pub url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_ocm_url() -> String {
    "https://api.openshift.com".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    30
}

fn default_token_env() -> String {
    "OCM_TOKEN".to_string()
}

impl Default for OcmConfig {
    fn default() -> Self {
        Self {
            url: default_ocm_url(),
            request_timeout_secs: default_request_timeout_secs(),
            token_env: default_token_env(),
        }
    }
}

impl OcmConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Read the bearer token from the configured environment variable.
    pub fn token(&self) -> Result<SecretString> {
        let token = std::env::var(&self.token_env).with_context(|| {
            format!(
                "Environment variable {} is required but not set",
                self.token_env
            )
        })?;
        if token.trim().is_empty() {
            bail!("Environment variable {} is empty", self.token_env);
        }
        Ok(SecretString::from(token))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
    #[serde(default)]
    pub retry: RetrySettings,
}

const fn default_interval_secs() -> u64 {
    30
}

const fn default_timeout_minutes() -> u64 {
    60
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            timeout_minutes: default_timeout_minutes(),
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_initial_delay_ms() -> u64 {
    500
}

const fn default_max_delay_secs() -> u64 {
    30
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeSettings {
    /// Minutes between scheduling an upgrade and its start.
    #[serde(default = "default_lead_time_minutes")]
    pub lead_time_minutes: i64,
    #[serde(default)]
    pub schedule_type: ScheduleType,
}

const fn default_lead_time_minutes() -> i64 {
    10
}

impl Default for UpgradeSettings {
    fn default() -> Self {
        Self {
            lead_time_minutes: default_lead_time_minutes(),
            schedule_type: ScheduleType::Manual,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSettings {
    /// Attributes that cannot change after creation.
    #[serde(default)]
    pub immutable: Vec<String>,
    /// Map attribute -> system-managed keys and their default values.
    #[serde(default)]
    pub reserved_keys: BTreeMap<String, BTreeMap<String, AttrValue>>,
}

impl Config {
    /// Parse configuration from a YAML (or JSON) document.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(contents).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.wait.interval_secs == 0 {
            bail!("wait.interval_secs must be greater than 0");
        }
        if self.wait.timeout_minutes.checked_mul(60).is_none() {
            bail!(
                "wait.timeout_minutes is out of range: {}",
                self.wait.timeout_minutes
            );
        }
        if self.wait.retry.max_attempts == 0 {
            bail!("wait.retry.max_attempts must be at least 1");
        }
        if self.upgrade.lead_time_minutes < 0
            || TimeDelta::try_minutes(self.upgrade.lead_time_minutes).is_none()
        {
            bail!(
                "upgrade.lead_time_minutes is out of range: {}",
                self.upgrade.lead_time_minutes
            );
        }
        Ok(())
    }

    /// Diff policy for a resource type. Unconfigured types get an empty policy.
    pub fn diff_policy(&self, resource_type: &str) -> DiffPolicy {
        let Some(settings) = self.resources.get(resource_type) else {
            return DiffPolicy::new();
        };

        settings.reserved_keys.iter().fold(
            DiffPolicy::new().with_immutable(settings.immutable.iter().cloned()),
            |policy, (attribute, defaults)| policy.with_reserved_keys(attribute, defaults.clone()),
        )
    }

    pub fn wait_config(&self) -> WaitConfig {
        let wait = &self.wait;
        WaitConfig {
            interval: Duration::from_secs(wait.interval_secs),
            timeout: Duration::from_secs(wait.timeout_minutes.saturating_mul(60)),
            retry: RetryConfig {
                max_attempts: wait.retry.max_attempts,
                initial_delay: Duration::from_millis(wait.retry.initial_delay_ms),
                max_delay: Duration::from_secs(wait.retry.max_delay_secs),
            },
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            lead_time: TimeDelta::minutes(self.upgrade.lead_time_minutes),
            schedule_type: self.upgrade.schedule_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.ocm.url, "https://api.openshift.com");
        assert_eq!(config.wait_config(), WaitConfig::default());
        assert_eq!(config.orchestrator_config(), OrchestratorConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
ocm:
  url: https://api.stage.openshift.com
  request_timeout_secs: 10
wait:
  interval_secs: 15
  timeout_minutes: 90
  retry:
    max_attempts: 3
upgrade:
  lead_time_minutes: 5
  schedule_type: automatic
resources:
  machine_pool:
    immutable: [instance_type, name]
    reserved_keys:
      labels:
        rosa_tf_version: "1.6.0"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.ocm.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.ocm.token_env, "OCM_TOKEN");

        let wait = config.wait_config();
        assert_eq!(wait.interval, Duration::from_secs(15));
        assert_eq!(wait.timeout, Duration::from_secs(90 * 60));
        assert_eq!(wait.retry.max_attempts, 3);
        assert_eq!(wait.retry.initial_delay, Duration::from_millis(500));

        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.lead_time, TimeDelta::minutes(5));
        assert_eq!(orchestrator.schedule_type, ScheduleType::Automatic);

        let policy = config.diff_policy("machine_pool");
        assert!(policy.is_immutable("instance_type"));
        assert!(!policy.is_immutable("replicas"));
        assert!(matches!(
            policy.collection_policy("labels"),
            crate::diff::CollectionPolicy::ReservedKeys(keys) if keys.contains_key("rosa_tf_version")
        ));
    }

    #[test]
    fn test_unknown_resource_type_has_empty_policy() {
        let config = Config::default();
        assert_eq!(config.diff_policy("cluster"), DiffPolicy::new());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::from_yaml("wait:\n  interval_secs: 0\n").is_err());
        assert!(Config::from_yaml("upgrade:\n  lead_time_minutes: -1\n").is_err());
        assert!(Config::from_yaml("upgrade:\n  schedule_type: weekly\n").is_err());
        assert!(Config::from_yaml("wait:\n  timeout_minutes: 18446744073709551615\n").is_err());
    }

    #[test]
    fn test_wait_config_never_overflows() {
        let mut config = Config::default();
        config.wait.timeout_minutes = u64::MAX;
        assert_eq!(config.wait_config().timeout, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/clup.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_token_requires_env_var() {
        let ocm = OcmConfig {
            token_env: "CLUP_TEST_TOKEN_NOT_SET".to_string(),
            ..OcmConfig::default()
        };
        assert!(ocm.token().is_err());
    }
}
