//! Account and region discovery.

use cloudtally_core::{
    Account, CredentialScope, OrgAccountStatus, ProviderError, RegionDiscoveryFailure, RegionId,
    ScanError, ScanOptions,
};
use tracing::{debug, info, warn};

use crate::provider::CloudProvider;

/// Regions scanned when an account's enabled regions cannot be listed.
pub const FALLBACK_REGIONS: &[&str] = &["us-east-1", "us-east-2", "us-west-1", "us-west-2", "eu-central-1"];

/// Enumerates the accounts and regions a run should cover.
pub struct ScopeDiscovery<'a> {
    provider: &'a dyn CloudProvider,
    options: &'a ScanOptions,
}

impl<'a> ScopeDiscovery<'a> {
    /// Create a discovery over a provider.
    pub fn new(provider: &'a dyn CloudProvider, options: &'a ScanOptions) -> Self {
        Self { provider, options }
    }

    /// Discover the accounts to scan.
    ///
    /// Lists the organization's active accounts when the caller may do so,
    /// and otherwise falls back to the caller's own account. Missing
    /// organization access is a normal mode, not an error. The only failure
    /// is being unable to resolve the caller identity at all.
    pub fn discover_accounts(&self) -> Result<Vec<Account>, ScanError> {
        let caller = self
            .provider
            .caller_identity()
            .map_err(|source| ScanError::CallerIdentity { source })?;

        let mut accounts = match self.provider.list_organization_accounts() {
            Ok(listed) => {
                let total = listed.len();
                let active: Vec<Account> = listed
                    .into_iter()
                    .filter(|a| a.status == OrgAccountStatus::Active)
                    .map(|a| Account {
                        is_local_scope: a.id == caller.account_id,
                        id: a.id,
                        display_name: a.name,
                    })
                    .collect();
                info!(total, active = active.len(), "listed organization accounts");
                if active.is_empty() {
                    vec![Account::local(caller.account_id.clone())]
                } else {
                    active
                }
            }
            Err(e) => {
                info!(reason = %e, "no organization access, scanning only the caller's account");
                vec![Account::local(caller.account_id.clone())]
            }
        };

        if let Some(targets) = &self.options.target_accounts {
            for target in targets {
                if !accounts.iter().any(|a| &a.id == target) {
                    warn!(account = %target, "requested account was not discovered, skipping");
                }
            }
            accounts.retain(|a| self.options.targets_account(&a.id));
        }

        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        accounts.dedup_by(|a, b| a.id == b.id);
        Ok(accounts)
    }

    /// Discover the regions to scan for one account.
    ///
    /// On failure the fixed fallback list (or the requested target regions)
    /// is returned together with the error, so the account scan continues.
    pub fn discover_regions(
        &self,
        scope: &CredentialScope,
    ) -> (Vec<RegionId>, Option<RegionDiscoveryFailure>) {
        let discovered = self.provider.enabled_regions(scope).and_then(|regions| {
            if regions.is_empty() {
                Err(ProviderError::NotFound {
                    what: "enabled regions".to_string(),
                })
            } else {
                Ok(regions)
            }
        });

        match discovered {
            Ok(mut regions) => {
                regions.sort();
                regions.dedup();
                if let Some(targets) = &self.options.target_regions {
                    for target in targets {
                        if !regions.contains(target) {
                            warn!(
                                account = %scope.account_id,
                                region = %target,
                                "requested region is not enabled for account, skipping"
                            );
                        }
                    }
                    regions.retain(|r| self.options.targets_region(r));
                }
                debug!(account = %scope.account_id, count = regions.len(), "discovered regions");
                (regions, None)
            }
            Err(source) => {
                warn!(
                    account = %scope.account_id,
                    error = %source,
                    "region discovery failed, using fallback regions"
                );
                let regions = match &self.options.target_regions {
                    Some(targets) => targets.clone(),
                    None => FALLBACK_REGIONS.iter().map(|r| r.to_string()).collect(),
                };
                let failure = RegionDiscoveryFailure {
                    account_id: scope.account_id.clone(),
                    source,
                };
                (regions, Some(failure))
            }
        }
    }
}
