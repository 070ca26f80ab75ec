//! Scan options.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Role assumed in member accounts when nothing else is configured.
pub const DEFAULT_ASSUME_ROLE: &str = "OrganizationAccountAccessRole";

/// Retry mode applied by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RetryMode {
    /// Fixed exponential backoff.
    Standard,
    /// Backoff plus client-side rate limiting on throttling responses.
    #[default]
    Adaptive,
}

/// Transport retry policy, configured once per client.
///
/// The orchestrator never retries on its own: when a client exhausts this
/// policy the failure surfaces as an ordinary collector error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub mode: RetryMode,
}

fn default_max_attempts() -> u32 {
    10
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            mode: RetryMode::Adaptive,
        }
    }
}

/// Options recognized by discovery, collectors and the classification engine.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanOptions {
    /// Count stopped standalone instances.
    #[builder(default = "false")]
    #[serde(default)]
    pub include_stopped: bool,

    /// Count scaling-group members individually instead of one unit per group.
    #[builder(default = "false")]
    #[serde(default)]
    pub count_group_members_individually: bool,

    /// Count capacity owned by managed container clusters.
    #[builder(default = "false")]
    #[serde(default)]
    pub include_cluster_managed_groups: bool,

    /// Restrict the scan to these accounts (None = every discovered account).
    #[builder(default)]
    #[serde(default)]
    pub target_accounts: Option<Vec<String>>,

    /// Restrict the scan to these regions (None = every enabled region).
    #[builder(default)]
    #[serde(default)]
    pub target_regions: Option<Vec<String>>,

    /// First role tried in member accounts.
    #[builder(default = "DEFAULT_ASSUME_ROLE.to_string()")]
    #[serde(default = "default_assume_role")]
    pub assume_role_name: String,

    /// Roles tried, in order, after `assume_role_name` fails.
    #[builder(default = "default_fallback_roles()")]
    #[serde(default = "default_fallback_roles")]
    pub fallback_role_names: Vec<String>,

    /// Accounts scanned concurrently.
    #[builder(default = "4")]
    #[serde(default = "default_account_concurrency")]
    pub account_concurrency: usize,

    /// Regions scanned concurrently within one account.
    #[builder(default = "8")]
    #[serde(default = "default_region_concurrency")]
    pub region_concurrency: usize,

    /// Transport retry policy handed to provider clients.
    #[builder(default)]
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_assume_role() -> String {
    DEFAULT_ASSUME_ROLE.to_string()
}

fn default_fallback_roles() -> Vec<String> {
    vec!["AWSControlTowerExecution".to_string()]
}

fn default_account_concurrency() -> usize {
    4
}

fn default_region_concurrency() -> usize {
    8
}

impl ScanOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref role) = self.assume_role_name {
            if role.trim().is_empty() {
                return Err("Assume-role name cannot be empty".to_string());
            }
        }
        if self.account_concurrency == Some(0) {
            return Err("Account concurrency must be at least 1".to_string());
        }
        if self.region_concurrency == Some(0) {
            return Err("Region concurrency must be at least 1".to_string());
        }
        Ok(())
    }
}

impl ScanOptions {
    /// Create a new options builder.
    pub fn builder() -> ScanOptionsBuilder {
        ScanOptionsBuilder::default()
    }

    /// Ordered, deduplicated role names to try in a member account.
    pub fn role_candidates(&self) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::with_capacity(1 + self.fallback_role_names.len());
        for role in std::iter::once(&self.assume_role_name).chain(&self.fallback_role_names) {
            let role = role.trim();
            if !role.is_empty() && !candidates.iter().any(|c| c == role) {
                candidates.push(role.to_string());
            }
        }
        candidates
    }

    /// Whether an account is selected by `target_accounts`.
    pub fn targets_account(&self, account_id: &str) -> bool {
        self.target_accounts
            .as_ref()
            .is_none_or(|targets| targets.iter().any(|t| t == account_id))
    }

    /// Whether a region is selected by `target_regions`.
    pub fn targets_region(&self, region: &str) -> bool {
        self.target_regions
            .as_ref()
            .is_none_or(|targets| targets.iter().any(|t| t == region))
    }

    /// Check option values that the builder cannot see (e.g. after deserializing).
    pub fn validate(&self) -> Result<(), String> {
        if self.assume_role_name.trim().is_empty() {
            return Err("Assume-role name cannot be empty".to_string());
        }
        if self.account_concurrency == 0 || self.region_concurrency == 0 {
            return Err("Concurrency bounds must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            include_stopped: false,
            count_group_members_individually: false,
            include_cluster_managed_groups: false,
            target_accounts: None,
            target_regions: None,
            assume_role_name: default_assume_role(),
            fallback_role_names: default_fallback_roles(),
            account_concurrency: default_account_concurrency(),
            region_concurrency: default_region_concurrency(),
            retry: RetryPolicy::default(),
        }
    }
}
