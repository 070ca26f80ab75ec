//! Permission gaps and the per-run issue ledger.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{AccountId, RegionId};

/// An authorization action the scanning identity lacks.
///
/// Gaps are never fatal: they are collected per account and reported once
/// the run completes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionGap {
    pub account_id: AccountId,
    /// Region where the gap was observed; `None` for account-global calls.
    pub region: Option<RegionId>,
    /// Action that was denied, e.g. `ec2:DescribeVolumes`.
    pub required_action: String,
}

impl PermissionGap {
    /// Create a gap observed in a region.
    pub fn regional(
        account_id: impl Into<AccountId>,
        region: impl Into<RegionId>,
        required_action: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            region: Some(region.into()),
            required_action: required_action.into(),
        }
    }

    /// Create a gap for an account-global call.
    pub fn global(account_id: impl Into<AccountId>, required_action: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: None,
            required_action: required_action.into(),
        }
    }
}

impl fmt::Display for PermissionGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{} ({}/{})", self.required_action, self.account_id, region),
            None => write!(f, "{} ({})", self.required_action, self.account_id),
        }
    }
}

/// Category of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IssueKind {
    /// No candidate role could be assumed; the account was not scanned.
    AssumeRoleFailure,
    /// Enabled regions could not be listed; a fallback list was used.
    RegionDiscoveryFailure,
    /// A collector failed outright (not a plain access denial).
    CollectorFailure,
}

/// A structured, human-readable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanIssue {
    pub kind: IssueKind,
    pub account_id: AccountId,
    #[serde(default)]
    pub region: Option<RegionId>,
    #[serde(default)]
    pub collector: Option<String>,
    pub message: String,
}

impl ScanIssue {
    /// Create an account-level issue.
    pub fn account(kind: IssueKind, account_id: impl Into<AccountId>, message: impl Into<String>) -> Self {
        Self {
            kind,
            account_id: account_id.into(),
            region: None,
            collector: None,
            message: message.into(),
        }
    }

    /// Create an issue scoped to one collector call.
    pub fn collector(
        account_id: impl Into<AccountId>,
        region: impl Into<RegionId>,
        collector: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: IssueKind::CollectorFailure,
            account_id: account_id.into(),
            region: Some(region.into()),
            collector: Some(collector.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for ScanIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.account_id)?;
        if let Some(region) = &self.region {
            write!(f, "/{region}")?;
        }
        if let Some(collector) = &self.collector {
            write!(f, " {collector}")?;
        }
        write!(f, ": {}", self.message)
    }
}
