//! Cloud provider seam.
//!
//! Everything the orchestration layer needs from the provider's identity,
//! organization and region services. Resource listing lives behind
//! [`Collector`](crate::Collector) instead.

use cloudtally_core::{
    CallerIdentity, CredentialScope, OrgAccount, ProviderError, RegionId, SessionCredentials,
};

/// Session name attached to every assumed-role session.
pub const SESSION_NAME: &str = "CloudTallyScan";

/// Identity, organization and region services of a cloud provider.
///
/// Implementations are shared by every account and region task of a run,
/// so they must be thread-safe. Transport-level retry (throttling,
/// connectivity) belongs inside the implementation.
pub trait CloudProvider: Send + Sync {
    /// Identity of the ambient credentials.
    fn caller_identity(&self) -> Result<CallerIdentity, ProviderError>;

    /// The ambient credentials as a session.
    fn ambient_session(&self) -> Result<SessionCredentials, ProviderError>;

    /// Every account of the caller's organization, in any state.
    fn list_organization_accounts(&self) -> Result<Vec<OrgAccount>, ProviderError>;

    /// Assume a role in another account.
    fn assume_role(
        &self,
        account_id: &str,
        role_name: &str,
        session_name: &str,
    ) -> Result<SessionCredentials, ProviderError>;

    /// Regions enabled for the account behind `scope`.
    ///
    /// Opt-in regions differ per account, so this must be queried with the
    /// account's own scope rather than the caller's.
    fn enabled_regions(&self, scope: &CredentialScope) -> Result<Vec<RegionId>, ProviderError>;
}
