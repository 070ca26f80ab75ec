//! Collapse per-call failures into per-account reports.
//!
//! A scan over hundreds of accounts can record thousands of gaps, most of
//! them the same action denied in every region. Reports list each missing
//! action once per account together with the regions it was seen in.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::info;

use cloudtally_classify::InventorySummary;
use cloudtally_core::{AccountId, AccountStatus, RegionId, ScanIssue, ScanResult, GLOBAL_REGION};

use crate::error::ReportError;
use crate::sink::write_atomic;

/// An action an account's scan was denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingAction {
    pub action: String,
    /// Regions the denial was observed in; `global` for account-wide calls.
    pub regions: BTreeSet<RegionId>,
}

/// Everything that went wrong (or right) for one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountReport {
    pub account_id: AccountId,
    pub display_name: String,
    pub status: AccountStatus,
    pub records: usize,
    pub regions_scanned: usize,
    pub missing: Vec<MissingAction>,
    pub issues: Vec<ScanIssue>,
    #[serde(default)]
    pub failure: Option<String>,
}

impl AccountReport {
    /// Whether there is anything to report.
    pub fn has_problems(&self) -> bool {
        self.status != AccountStatus::Complete
    }

    /// One human-readable line describing the account's outcome.
    pub fn status_line(&self) -> String {
        let mut line = format!("{} ({}): ", self.display_name, self.account_id);
        match self.status {
            AccountStatus::Failed => {
                line.push_str("[failed] ");
                line.push_str(self.failure.as_deref().unwrap_or("no credentials"));
            }
            AccountStatus::Partial => {
                let _ = write!(
                    line,
                    "[partial] {} records from {} regions",
                    self.records, self.regions_scanned
                );
                if !self.missing.is_empty() {
                    let missing = self
                        .missing
                        .iter()
                        .map(|m| format!("{} [{}]", m.action, m.regions.iter().join(", ")))
                        .join("; ");
                    let _ = write!(line, "; missing {missing}");
                }
                let failures = self
                    .issues
                    .iter()
                    .filter(|i| i.collector.is_some() || i.region.is_none())
                    .count();
                if failures > 0 {
                    let _ = write!(line, "; {failures} errors");
                }
            }
            _ => {
                let _ = write!(
                    line,
                    "[ok] {} records from {} regions",
                    self.records, self.regions_scanned
                );
            }
        }
        line
    }
}

/// Run-level counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub accounts_attempted: usize,
    pub fully_scanned: usize,
    pub partial: usize,
    pub failed: usize,
    pub records: usize,
    /// Distinct (account, action) pairs that were denied.
    pub missing_actions: usize,
    pub issues: usize,
    pub inventory: InventorySummary,
}

impl RunSummary {
    /// Whether every attempted account was fully scanned.
    pub fn is_clean(&self) -> bool {
        self.partial == 0 && self.failed == 0
    }
}

/// How account status was reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    /// Few enough accounts to print every status line.
    Inline(Vec<String>),
    /// Too many accounts; problems were written to a file.
    Written {
        path: PathBuf,
        accounts_with_problems: usize,
    },
}

/// Serialized form of `scan_issues.json`.
#[derive(Debug, Serialize)]
struct IssueDocument<'a> {
    generated_at: DateTime<Utc>,
    accounts_attempted: usize,
    accounts: Vec<&'a AccountReport>,
}

/// Builds account reports and the run summary from a scan result.
#[derive(Debug, Clone)]
pub struct ErrorAggregator {
    inline_issue_threshold: usize,
}

impl ErrorAggregator {
    pub fn new(inline_issue_threshold: usize) -> Self {
        Self {
            inline_issue_threshold,
        }
    }

    /// One report per attempted account, ordered by account id.
    pub fn account_reports(&self, result: &ScanResult) -> Vec<AccountReport> {
        let mut missing_by_account: BTreeMap<&str, BTreeMap<&str, BTreeSet<RegionId>>> = BTreeMap::new();
        for gap in &result.gaps {
            missing_by_account
                .entry(gap.account_id.as_str())
                .or_default()
                .entry(gap.required_action.as_str())
                .or_default()
                .insert(gap.region.clone().unwrap_or_else(|| GLOBAL_REGION.to_string()));
        }

        let mut issues_by_account = result
            .issues
            .iter()
            .into_group_map_by(|i| i.account_id.as_str());

        result
            .accounts
            .iter()
            .map(|outcome| {
                let id = outcome.account.id.as_str();
                let missing = missing_by_account
                    .remove(id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(action, regions)| MissingAction {
                        action: action.to_string(),
                        regions,
                    })
                    .collect();
                let issues = issues_by_account
                    .remove(id)
                    .unwrap_or_default()
                    .into_iter()
                    .cloned()
                    .collect();
                AccountReport {
                    account_id: outcome.account.id.clone(),
                    display_name: outcome.account.display_name.clone(),
                    status: outcome.status,
                    records: outcome.records,
                    regions_scanned: outcome.regions_scanned,
                    missing,
                    issues,
                    failure: outcome.failure.clone(),
                }
            })
            .sorted_by(|a, b| a.account_id.cmp(&b.account_id))
            .collect()
    }

    /// Run-level counts and inventory tallies.
    pub fn summarize(&self, result: &ScanResult) -> RunSummary {
        let missing_actions = result
            .gaps
            .iter()
            .map(|g| (g.account_id.as_str(), g.required_action.as_str()))
            .unique()
            .count();

        RunSummary {
            started_at: result.started_at,
            duration_secs: result.duration.as_secs_f64(),
            accounts_attempted: result.accounts_attempted,
            fully_scanned: result.count_status(AccountStatus::Complete),
            partial: result.count_status(AccountStatus::Partial),
            failed: result.count_status(AccountStatus::Failed),
            records: result.records.len(),
            missing_actions,
            issues: result.issues.len(),
            inventory: InventorySummary::from_records(&result.records),
        }
    }

    /// Status lines for every account.
    pub fn status_lines(&self, reports: &[AccountReport]) -> Vec<String> {
        reports.iter().map(AccountReport::status_line).collect()
    }

    /// Report account status inline, or write it to `issues_path` when
    /// more accounts were attempted than the inline threshold allows.
    pub fn report(&self, result: &ScanResult, issues_path: &Path) -> Result<StatusReport, ReportError> {
        let reports = self.account_reports(result);
        if reports.len() <= self.inline_issue_threshold {
            return Ok(StatusReport::Inline(self.status_lines(&reports)));
        }

        let problems: Vec<&AccountReport> = reports.iter().filter(|r| r.has_problems()).collect();
        let document = IssueDocument {
            generated_at: Utc::now(),
            accounts_attempted: result.accounts_attempted,
            accounts: problems,
        };
        let bytes = serde_json::to_vec_pretty(&document)?;
        write_atomic(issues_path, &bytes)?;

        info!(path = %issues_path.display(), accounts = document.accounts.len(), "wrote issue report");
        Ok(StatusReport::Written {
            path: issues_path.to_path_buf(),
            accounts_with_problems: document.accounts.len(),
        })
    }
}

impl Default for ErrorAggregator {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudtally_core::{Account, AccountOutcome, IssueKind, PermissionGap};

    fn result() -> ScanResult {
        let mut result = ScanResult::empty(Utc::now());
        result.accounts = vec![
            AccountOutcome {
                account: Account::new("222222222222", "prod"),
                status: AccountStatus::Partial,
                records: 4,
                regions_scanned: 3,
                failure: None,
            },
            AccountOutcome::failed(Account::new("333333333333", "dev"), "could not assume role"),
        ];
        result.accounts_attempted = 2;
        result.accounts_succeeded = 1;
        result.gaps.insert(PermissionGap::regional("222222222222", "us-east-1", "ec2:DescribeVolumes"));
        result.gaps.insert(PermissionGap::regional("222222222222", "eu-west-1", "ec2:DescribeVolumes"));
        result.gaps.insert(PermissionGap::global("222222222222", "s3:ListAllMyBuckets"));
        result.issues.push(ScanIssue::account(
            IssueKind::AssumeRoleFailure,
            "333333333333",
            "could not assume role",
        ));
        result
    }

    #[test]
    fn test_gaps_collapse_per_action() {
        let reports = ErrorAggregator::default().account_reports(&result());
        let prod = &reports[0];

        assert_eq!(prod.missing.len(), 2);
        let volumes = prod.missing.iter().find(|m| m.action == "ec2:DescribeVolumes").unwrap();
        assert_eq!(
            volumes.regions.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["eu-west-1", "us-east-1"]
        );
        let buckets = prod.missing.iter().find(|m| m.action == "s3:ListAllMyBuckets").unwrap();
        assert!(buckets.regions.contains(GLOBAL_REGION));

        assert_eq!(reports[1].issues.len(), 1);
        assert!(reports[1].missing.is_empty());
    }

    #[test]
    fn test_status_lines() {
        let aggregator = ErrorAggregator::default();
        let lines = aggregator.status_lines(&aggregator.account_reports(&result()));

        assert!(lines[0].starts_with("prod (222222222222): [partial] 4 records from 3 regions"));
        assert!(lines[0].contains("ec2:DescribeVolumes [eu-west-1, us-east-1]"));
        assert_eq!(lines[1], "dev (333333333333): [failed] could not assume role");
    }

    #[test]
    fn test_summary_counts() {
        let summary = ErrorAggregator::default().summarize(&result());
        assert_eq!(summary.accounts_attempted, 2);
        assert_eq!(summary.fully_scanned, 0);
        assert_eq!(summary.partial, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.missing_actions, 2);
        assert!(!summary.is_clean());
    }
}
