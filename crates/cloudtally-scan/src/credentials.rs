//! Per-account credential acquisition.

use cloudtally_core::{
    Account, AssumeRoleFailure, CredentialScope, ProviderError,
};
use tracing::{debug, info, warn};

use crate::provider::{CloudProvider, SESSION_NAME};

/// Obtains a credential scope for each account.
///
/// The caller's own account uses the ambient session. Member accounts are
/// reached by trying each candidate role in order until one succeeds.
pub struct CredentialBroker<'a> {
    provider: &'a dyn CloudProvider,
}

impl<'a> CredentialBroker<'a> {
    pub fn new(provider: &'a dyn CloudProvider) -> Self {
        Self { provider }
    }

    /// Acquire a scope for `account`, trying `candidates` in order.
    pub fn acquire(
        &self,
        account: &Account,
        candidates: &[String],
    ) -> Result<CredentialScope, AssumeRoleFailure> {
        if account.is_local_scope {
            return self
                .provider
                .ambient_session()
                .map(|session| CredentialScope::new(account.id.clone(), session, None))
                .map_err(|last_error| AssumeRoleFailure {
                    account_id: account.id.clone(),
                    tried: Vec::new(),
                    last_error,
                });
        }

        let mut tried = Vec::with_capacity(candidates.len());
        let mut last_error = ProviderError::Other {
            message: "no candidate roles configured".to_string(),
        };

        for role in candidates {
            tried.push(role.clone());
            match self.provider.assume_role(&account.id, role, SESSION_NAME) {
                Ok(session) => {
                    info!(account = %account.id, role = %role, "assumed role");
                    return Ok(CredentialScope::new(account.id.clone(), session, Some(role.clone())));
                }
                Err(e) => {
                    debug!(account = %account.id, role = %role, error = %e, "role assumption failed");
                    last_error = e;
                }
            }
        }

        warn!(account = %account.id, tried = ?tried, "could not assume any candidate role");
        Err(AssumeRoleFailure {
            account_id: account.id.clone(),
            tried,
            last_error,
        })
    }

    /// Obtain a fresh session for the same account and role as `scope`.
    pub fn refresh(&self, scope: &CredentialScope) -> Result<CredentialScope, ProviderError> {
        let session = match &scope.role_name {
            Some(role) => self.provider.assume_role(&scope.account_id, role, SESSION_NAME)?,
            None => self.provider.ambient_session()?,
        };
        debug!(account = %scope.account_id, "refreshed session");
        Ok(CredentialScope::new(scope.account_id.clone(), session, scope.role_name.clone()))
    }
}

/// A borrowed account scope that may be refreshed once.
///
/// Each region task wraps the account's scope in one of these. If a
/// collector reports expired credentials the task refreshes once and
/// retries that call; a second expiry in the same task is not refreshed
/// again.
pub struct RefreshableScope<'a> {
    broker: &'a CredentialBroker<'a>,
    base: &'a CredentialScope,
    refreshed: Option<CredentialScope>,
    attempted: bool,
}

impl<'a> RefreshableScope<'a> {
    pub fn new(broker: &'a CredentialBroker<'a>, base: &'a CredentialScope) -> Self {
        Self {
            broker,
            base,
            refreshed: None,
            attempted: false,
        }
    }

    /// The scope collectors should currently use.
    pub fn current(&self) -> &CredentialScope {
        self.refreshed.as_ref().unwrap_or(self.base)
    }

    /// Whether the one allowed refresh has been spent.
    pub fn is_exhausted(&self) -> bool {
        self.attempted
    }

    /// Refresh the session, at most once per wrapper.
    pub fn refresh_once(&mut self) -> Result<&CredentialScope, ProviderError> {
        if self.attempted {
            return Err(ProviderError::CredentialsExpired);
        }
        self.attempted = true;
        let fresh = self.broker.refresh(self.current())?;
        Ok(self.refreshed.insert(fresh))
    }
}
