//! Estate snapshots: a recorded cloud estate served through the provider
//! and collector interfaces.
//!
//! A snapshot is a JSON document describing the caller, the organization,
//! and per-account resources, role trust, and denied actions. It lets the
//! whole orchestration stack run offline, reproducibly, against estates
//! that would be expensive or impossible to stand up for real.
//!
//! ```json
//! {
//!   "caller": { "account_id": "111111111111" },
//!   "organization": [
//!     { "id": "111111111111", "name": "mgmt", "status": "ACTIVE" },
//!     { "id": "222222222222", "name": "prod", "status": "ACTIVE" }
//!   ],
//!   "accounts": [
//!     {
//!       "id": "222222222222",
//!       "assumable_roles": ["OrganizationAccountAccessRole"],
//!       "enabled_regions": ["us-east-1"],
//!       "regions": {
//!         "us-east-1": {
//!           "instances": [{ "instance_id": "i-1", "state": "running" }],
//!           "denied_actions": ["ec2:DescribeVolumes"]
//!         }
//!       }
//!     }
//!   ]
//! }
//! ```

mod collectors;
mod provider;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use cloudtally_core::{
    AccountId, BlockStorage, CallerIdentity, ComputeGroup, ComputeInstance, Function,
    ObjectStorage, OrgAccount, RegionId,
};

pub use collectors::{snapshot_collectors, SnapshotCollector, SnapshotService};
pub use provider::SnapshotProvider;

/// Errors loading a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to read snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid snapshot {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A recorded cloud estate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstateSnapshot {
    /// Identity of the ambient credentials.
    pub caller: CallerIdentity,
    /// Organization listing; `None` when the caller may not list it.
    #[serde(default)]
    pub organization: Option<Vec<OrgAccount>>,
    #[serde(default)]
    pub accounts: Vec<AccountSnapshot>,
}

/// One account of a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub id: AccountId,
    /// Roles the caller may assume into this account.
    #[serde(default)]
    pub assumable_roles: Vec<String>,
    /// Enabled regions; `None` when listing them is denied.
    #[serde(default)]
    pub enabled_regions: Option<Vec<RegionId>>,
    /// Actions denied in every region of the account.
    #[serde(default)]
    pub denied_actions: BTreeSet<String>,
    #[serde(default)]
    pub regions: BTreeMap<RegionId, RegionSnapshot>,
    #[serde(default)]
    pub buckets: Vec<ObjectStorage>,
}

/// Resources and failure modes of one region.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionSnapshot {
    #[serde(default)]
    pub instances: Vec<ComputeInstance>,
    #[serde(default)]
    pub scaling_groups: Vec<ComputeGroup>,
    #[serde(default)]
    pub volumes: Vec<BlockStorage>,
    #[serde(default)]
    pub functions: Vec<Function>,
    /// Actions denied in this region only.
    #[serde(default)]
    pub denied_actions: BTreeSet<String>,
    /// Throttling responses every call receives before it succeeds.
    #[serde(default)]
    pub throttled_responses: u32,
    /// Every call fails at the transport level.
    #[serde(default)]
    pub unreachable: bool,
}

impl EstateSnapshot {
    /// Load a snapshot from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| SnapshotError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse a snapshot from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn account(&self, account_id: &str) -> Option<&AccountSnapshot> {
        self.accounts.iter().find(|a| a.id == account_id)
    }
}

impl AccountSnapshot {
    /// Whether `action` is denied in `region` (or account-wide).
    pub fn denies(&self, region: &str, action: &str) -> bool {
        self.denied_actions.contains(action)
            || self
                .regions
                .get(region)
                .is_some_and(|r| r.denied_actions.contains(action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ESTATE: &str = r#"{
        "caller": { "account_id": "111111111111" },
        "accounts": [
            {
                "id": "111111111111",
                "denied_actions": ["lambda:ListFunctions"],
                "regions": {
                    "us-east-1": { "denied_actions": ["ec2:DescribeVolumes"] }
                }
            }
        ]
    }"#;

    #[test]
    fn test_parse_minimal_snapshot() {
        let estate = EstateSnapshot::from_json(ESTATE).unwrap();
        assert!(estate.organization.is_none());
        let account = estate.account("111111111111").unwrap();
        assert!(account.enabled_regions.is_none());
        assert!(account.denies("us-east-1", "ec2:DescribeVolumes"));
        assert!(!account.denies("us-west-2", "ec2:DescribeVolumes"));
        assert!(account.denies("us-west-2", "lambda:ListFunctions"));
        assert!(estate.account("999999999999").is_none());
    }

    #[test]
    fn test_load_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let err = EstateSnapshot::load(file.path()).unwrap_err();
        assert!(matches!(err, SnapshotError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));

        let missing = EstateSnapshot::load("/nonexistent/estate.json").unwrap_err();
        assert!(matches!(missing, SnapshotError::Io { .. }));
    }
}
