//! Cluster version parsing and ordering.

use std::fmt;
use std::str::FromStr;

use crate::error::ClupError;

/// Channel group whose version ids carry no suffix.
pub const DEFAULT_CHANNEL_GROUP: &str = "stable";

const VERSION_ID_PREFIX: &str = "openshift-v";

/// A parsed `major.minor.patch[-channel]` version with a total order.
///
/// Accepts raw versions (`4.12.0`), short forms (`4.12`, patch 0) and remote
/// version ids (`openshift-v4.12.0-candidate`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    inner: semver::Version,
}

impl Version {
    pub const fn major(&self) -> u64 {
        self.inner.major
    }

    pub const fn minor(&self) -> u64 {
        self.inner.minor
    }

    pub const fn patch(&self) -> u64 {
        self.inner.patch
    }

    /// Channel suffix (e.g. `candidate`, `rc.1`), if any.
    pub fn channel(&self) -> Option<&str> {
        (!self.inner.pre.is_empty()).then(|| self.inner.pre.as_str())
    }

    /// The `major.minor` identifier, also the expected acknowledgment token.
    pub fn minor_id(&self) -> String {
        format!("{}.{}", self.inner.major, self.inner.minor)
    }

    /// Remote version id for this version in the given channel group.
    ///
    /// The stable group has no suffix; any other group appends `-<group>`.
    pub fn version_id(&self, channel_group: Option<&str>) -> String {
        match channel_group {
            Some(group) if !group.is_empty() && group != DEFAULT_CHANNEL_GROUP => {
                format!("{VERSION_ID_PREFIX}{self}-{group}")
            }
            _ => format!("{VERSION_ID_PREFIX}{self}"),
        }
    }
}

impl FromStr for Version {
    type Err = ClupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ClupError::InvalidVersion(s.to_string());

        let raw = s.trim();
        let raw = raw
            .strip_prefix(VERSION_ID_PREFIX)
            .or_else(|| raw.strip_prefix('v'))
            .unwrap_or(raw);

        let (core, channel) = match raw.split_once('-') {
            Some((core, channel)) if !channel.is_empty() => (core, Some(channel)),
            Some(_) => return Err(invalid()),
            None => (raw, None),
        };

        let components = core.split('.').count();
        let core = match components {
            2 => format!("{core}.0"),
            3 => core.to_string(),
            _ => return Err(invalid()),
        };

        let full = channel.map_or_else(|| core.clone(), |c| format!("{core}-{c}"));
        let inner = semver::Version::parse(&full).map_err(|_| invalid())?;

        Ok(Self { inner })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_full_version() {
        let version = v("4.12.3");
        assert_eq!(
            (version.major(), version.minor(), version.patch()),
            (4, 12, 3)
        );
        assert_eq!(version.channel(), None);
    }

    #[test]
    fn test_parse_short_version() {
        assert_eq!(v("4.12"), v("4.12.0"));
    }

    #[test]
    fn test_parse_version_id() {
        let version = v("openshift-v4.13.1-candidate");
        assert_eq!(version.minor_id(), "4.13");
        assert_eq!(version.channel(), Some("candidate"));
        assert_eq!(version.to_string(), "4.13.1-candidate");
    }

    #[test]
    fn test_parse_invalid() {
        for bad in ["", "invalid", "4", "4.x.0", "4.12.0.1", "4.12.0-", "v"] {
            assert!(
                matches!(bad.parse::<Version>(), Err(ClupError::InvalidVersion(_))),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_ordering() {
        assert!(v("4.11.0") > v("4.10.0"));
        assert!(v("4.10.10") > v("4.10.9"));
        assert!(v("4.12.0") > v("4.12.0-rc.1"));
        assert!(v("5.0.0") > v("4.99.99"));
    }

    #[test]
    fn test_version_id() {
        let version = v("4.12.0");
        assert_eq!(version.version_id(None), "openshift-v4.12.0");
        assert_eq!(version.version_id(Some("stable")), "openshift-v4.12.0");
        assert_eq!(
            version.version_id(Some("candidate")),
            "openshift-v4.12.0-candidate"
        );
    }
}
