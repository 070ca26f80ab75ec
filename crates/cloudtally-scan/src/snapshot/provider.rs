use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::trace;

use cloudtally_core::{
    CallerIdentity, CredentialScope, OrgAccount, ProviderError, RegionId, RetryPolicy,
    SessionCredentials,
};

use super::EstateSnapshot;
use crate::provider::CloudProvider;

/// Lifetime of sessions handed out by assumed roles.
const SESSION_TTL_MINUTES: i64 = 60;

/// [`CloudProvider`] backed by an [`EstateSnapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotProvider {
    estate: Arc<EstateSnapshot>,
    retry: RetryPolicy,
}

impl SnapshotProvider {
    pub fn new(estate: Arc<EstateSnapshot>, retry: RetryPolicy) -> Self {
        Self { estate, retry }
    }

    pub fn estate(&self) -> &Arc<EstateSnapshot> {
        &self.estate
    }

    fn account(&self, account_id: &str) -> Result<&super::AccountSnapshot, ProviderError> {
        self.estate.account(account_id).ok_or_else(|| ProviderError::NotFound {
            what: format!("account {account_id}"),
        })
    }
}

impl CloudProvider for SnapshotProvider {
    fn caller_identity(&self) -> Result<CallerIdentity, ProviderError> {
        Ok(self.estate.caller.clone())
    }

    fn ambient_session(&self) -> Result<SessionCredentials, ProviderError> {
        Ok(SessionCredentials::new(
            format!("ambient-{}", self.estate.caller.account_id),
            "snapshot",
            None,
            None,
        ))
    }

    fn list_organization_accounts(&self) -> Result<Vec<OrgAccount>, ProviderError> {
        self.estate
            .organization
            .clone()
            .ok_or_else(|| ProviderError::access_denied("organizations:ListAccounts"))
    }

    fn assume_role(
        &self,
        account_id: &str,
        role_name: &str,
        session_name: &str,
    ) -> Result<SessionCredentials, ProviderError> {
        let account = self.account(account_id)?;
        if !account.assumable_roles.iter().any(|r| r == role_name) {
            return Err(ProviderError::access_denied("sts:AssumeRole"));
        }
        trace!(account = %account_id, role = %role_name, session = %session_name, "issuing session");
        Ok(SessionCredentials::new(
            format!("{session_name}-{account_id}"),
            "snapshot",
            Some(format!("{role_name}@{account_id}")),
            Some(Utc::now() + Duration::minutes(SESSION_TTL_MINUTES)),
        ))
    }

    fn enabled_regions(&self, scope: &CredentialScope) -> Result<Vec<RegionId>, ProviderError> {
        self.account(&scope.account_id)?
            .enabled_regions
            .clone()
            .ok_or_else(|| ProviderError::access_denied("ec2:DescribeRegions"))
    }
}

/// Apply the transport retry policy to a call that is throttled
/// `throttled` times before it would succeed.
pub(crate) fn absorb_throttling(throttled: u32, policy: &RetryPolicy) -> Result<(), ProviderError> {
    if throttled == 0 {
        return Ok(());
    }
    if throttled >= policy.max_attempts {
        return Err(ProviderError::Throttled {
            attempts: policy.max_attempts,
        });
    }
    trace!(retries = throttled, mode = %policy.mode, "throttled call succeeded after retries");
    Ok(())
}
