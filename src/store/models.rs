//! Persisted records: the package catalog plus its AUR-side and
//! upstream-side state rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Check outcome recorded on the AUR and upstream state rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateState {
    Unchecked,
    Ok,
    Fail,
}

impl UpdateState {
    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => UpdateState::Ok,
            2 => UpdateState::Fail,
            _ => UpdateState::Unchecked,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            UpdateState::Unchecked => 0,
            UpdateState::Ok => 1,
            UpdateState::Fail => 2,
        }
    }
}

/// A monitored package and its checker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    pub id: i64,
    pub name: String,
    pub upstream_url: String,
    pub upstream_checker: String,
    pub version_extract_key: String,
    pub check_test_version: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when creating or updating a package.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPackage {
    pub name: String,
    pub upstream_url: String,
    #[serde(default)]
    pub upstream_checker: String,
    #[serde(default)]
    pub version_extract_key: String,
    #[serde(default)]
    pub check_test_version: bool,
}

/// Packaging-side state, one row per package.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AurInfo {
    pub id: i64,
    pub package_id: i64,
    pub aur_version: String,
    pub upstream_version_ref: String,
    pub aur_create_date: Option<DateTime<Utc>>,
    pub aur_update_date: Option<DateTime<Utc>>,
    pub aur_update_state: UpdateState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upstream-side state, one row per package.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamInfo {
    pub id: i64,
    pub package_id: i64,
    pub upstream_version: String,
    pub upstream_update_date: Option<DateTime<Utc>>,
    pub upstream_update_state: UpdateState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The merged view the HTTP API serves: a package with whatever state rows
/// exist for it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedPackage {
    #[serde(flatten)]
    pub package: PackageInfo,
    pub aur: Option<AurInfo>,
    pub upstream: Option<UpstreamInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_state_round_trips_through_i64() {
        for state in [UpdateState::Unchecked, UpdateState::Ok, UpdateState::Fail] {
            assert_eq!(UpdateState::from_i64(state.as_i64()), state);
        }
        // Unknown values degrade to unchecked rather than failing a read.
        assert_eq!(UpdateState::from_i64(42), UpdateState::Unchecked);
    }
}
