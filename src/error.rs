//! Custom error types for clup.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = ClupError> = std::result::Result<T, E>;

/// Errors that can occur while reconciling or upgrading a cluster resource.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClupError {
    #[error("Attribute '{attribute}' cannot be changed after creation")]
    ImmutableAttributeChanged { attribute: String },

    #[error("Attribute '{attribute}' cannot override reserved key '{key}'")]
    ReservedKeyConflict { attribute: String, key: String },

    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    #[error("Version {desired} is not an available upgrade from {current}")]
    VersionNotAvailable { current: String, desired: String },

    #[error("Cannot downgrade from {current} to {desired}")]
    DowngradeRejected { current: String, desired: String },

    #[error(
        "Upgrade to {target_minor} requires acknowledgment of version gates ({}); set the acknowledgment token to \"{target_minor}\"",
        .gates.join("; ")
    )]
    AcknowledgmentRequired {
        target_minor: String,
        gates: Vec<String>,
    },

    #[error("Upgrade policy conflict: {0}")]
    PolicyConflict(String),

    #[error("[{component}] {message}")]
    Transient { component: String, message: String },

    #[error("[{component}] {message}")]
    Fatal { component: String, message: String },

    #[error("Timeout waiting for {operation} after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Resource not found: {0}")]
    NotFound(String),
}

impl ClupError {
    /// Create a transient (retryable) error for the given component.
    pub fn transient(component: &str, message: impl Into<String>) -> Self {
        Self::Transient {
            component: component.to_string(),
            message: message.into(),
        }
    }

    /// Create a fatal (non-retryable) error for the given component.
    pub fn fatal(component: &str, message: impl Into<String>) -> Self {
        Self::Fatal {
            component: component.to_string(),
            message: message.into(),
        }
    }

    /// Map an HTTP status and response body from the remote API onto the taxonomy.
    ///
    /// 404 is `NotFound`, 408/429/5xx are `Transient`, 409 is `PolicyConflict`,
    /// every other status is `Fatal`.
    pub fn from_status(component: &str, status: u16, body: &str) -> Self {
        let details = Self::extract_error_details(body, status);
        match status {
            404 => Self::NotFound(details),
            408 | 429 | 500..=599 => Self::transient(component, details),
            409 => Self::PolicyConflict(details),
            _ => Self::fatal(component, details),
        }
    }

    /// Map a transport-level `reqwest` failure onto the taxonomy.
    pub fn from_transport(component: &str, err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(component, status.as_u16(), &err.to_string());
        }
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return Self::transient(component, err.to_string());
        }
        Self::fatal(component, err.to_string())
    }

    /// Extract a single-line message from a remote error body.
    ///
    /// Prefers the `reason` field, then `message`, then the raw body.
    fn extract_error_details(body: &str, status: u16) -> String {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
            for field in ["reason", "message"] {
                if let Some(text) = value.get(field).and_then(serde_json::Value::as_str)
                    && !text.is_empty()
                {
                    return text.to_string();
                }
            }
        }

        let trimmed = body.trim();
        if trimmed.is_empty() {
            return format!("remote API returned status {status}");
        }
        trimmed.lines().next().unwrap_or(trimmed).to_string()
    }

    /// Returns true if this error is transient and should be retried.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Returns true if the remote resource does not exist.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Short, stable label for metrics and structured logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ImmutableAttributeChanged { .. } => "immutable_attribute_changed",
            Self::ReservedKeyConflict { .. } => "reserved_key_conflict",
            Self::InvalidVersion(_) => "invalid_version",
            Self::VersionNotAvailable { .. } => "version_not_available",
            Self::DowngradeRejected { .. } => "downgrade_rejected",
            Self::AcknowledgmentRequired { .. } => "acknowledgment_required",
            Self::PolicyConflict(_) => "policy_conflict",
            Self::Transient { .. } => "transient",
            Self::Fatal { .. } => "fatal",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled(_) => "cancelled",
            Self::NotFound(_) => "not_found",
        }
    }
}
