//! Terminal scan result and per-account outcomes.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::account::Account;
use crate::ledger::{PermissionGap, ScanIssue};
use crate::record::ResourceRecord;

/// Lifecycle of a single account scan.
///
/// ```text
/// Pending -> CredentialsAcquired -> RegionsDiscovered -> Scanning -> Complete | Partial
///    \-> Failed (no session)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccountStatus {
    Pending,
    CredentialsAcquired,
    RegionsDiscovered,
    Scanning,
    Complete,
    Partial,
    Failed,
}

impl AccountStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Partial | Self::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_advance_to(self, next: AccountStatus) -> bool {
        use AccountStatus::*;
        matches!(
            (self, next),
            (Pending, CredentialsAcquired)
                | (Pending, Failed)
                | (CredentialsAcquired, RegionsDiscovered)
                | (RegionsDiscovered, Scanning)
                | (Scanning, Complete)
                | (Scanning, Partial)
        )
    }
}

/// How one account scan ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountOutcome {
    pub account: Account,
    pub status: AccountStatus,
    /// Records this account contributed after classification.
    pub records: usize,
    /// Regions that were scanned.
    pub regions_scanned: usize,
    /// Reason the account could not be scanned, for `Failed` outcomes.
    #[serde(default)]
    pub failure: Option<String>,
}

impl AccountOutcome {
    /// Outcome of an account whose credentials could not be obtained.
    pub fn failed(account: Account, reason: impl Into<String>) -> Self {
        Self {
            account,
            status: AccountStatus::Failed,
            records: 0,
            regions_scanned: 0,
            failure: Some(reason.into()),
        }
    }
}

/// Consolidated result of a scan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Flat, classified inventory. Order is not meaningful.
    pub records: Vec<ResourceRecord>,
    /// Permission gaps across all accounts.
    pub gaps: BTreeSet<PermissionGap>,
    /// One outcome per attempted account.
    pub accounts: Vec<AccountOutcome>,
    /// Structured error ledger.
    pub issues: Vec<ScanIssue>,
    pub accounts_attempted: usize,
    /// Accounts that obtained a session and were scanned (fully or partially).
    pub accounts_succeeded: usize,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl ScanResult {
    /// Create an empty result for a run that started at `started_at`.
    pub fn empty(started_at: DateTime<Utc>) -> Self {
        Self {
            records: Vec::new(),
            gaps: BTreeSet::new(),
            accounts: Vec::new(),
            issues: Vec::new(),
            accounts_attempted: 0,
            accounts_succeeded: 0,
            started_at,
            duration: Duration::ZERO,
        }
    }

    /// Records attributed to an account.
    pub fn records_for<'a>(&'a self, account_id: &'a str) -> impl Iterator<Item = &'a ResourceRecord> + 'a {
        self.records.iter().filter(move |r| r.account_id() == account_id)
    }

    /// Gaps recorded for an account.
    pub fn gaps_for<'a>(&'a self, account_id: &'a str) -> impl Iterator<Item = &'a PermissionGap> + 'a {
        self.gaps.iter().filter(move |g| g.account_id == account_id)
    }

    /// Outcome of an account, if it was attempted.
    pub fn outcome(&self, account_id: &str) -> Option<&AccountOutcome> {
        self.accounts.iter().find(|o| o.account.id == account_id)
    }

    /// Number of accounts with the given terminal status.
    pub fn count_status(&self, status: AccountStatus) -> usize {
        self.accounts.iter().filter(|o| o.status == status).count()
    }

    /// Whether every attempted account was scanned without gaps or failures.
    pub fn is_clean(&self) -> bool {
        self.accounts.iter().all(|o| o.status == AccountStatus::Complete)
    }
}
