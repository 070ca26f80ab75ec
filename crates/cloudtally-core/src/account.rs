//! Accounts, caller identity and per-account credential scopes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AccountId;

/// A scannable credential scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier.
    pub id: AccountId,
    /// Human-readable name.
    pub display_name: String,
    /// Whether the caller's own credentials already reach this account.
    #[serde(default)]
    pub is_local_scope: bool,
}

impl Account {
    /// Create an account that must be reached through role assumption.
    pub fn new(id: impl Into<AccountId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            is_local_scope: false,
        }
    }

    /// Create the account backing the caller's own identity.
    pub fn local(id: impl Into<AccountId>) -> Self {
        Self {
            id: id.into(),
            display_name: "local".to_string(),
            is_local_scope: true,
        }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

/// Membership status of an account inside an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrgAccountStatus {
    Active,
    Suspended,
    PendingClosure,
    #[serde(other)]
    Unknown,
}

/// An account as listed by the organization service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgAccount {
    pub id: AccountId,
    pub name: String,
    pub status: OrgAccountStatus,
}

/// The identity the scanner itself runs as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// Account the ambient credentials belong to.
    pub account_id: AccountId,
    /// Principal ARN, if the provider reports one.
    #[serde(default)]
    pub arn: Option<String>,
}

/// Temporary session credentials returned by the provider.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl SessionCredentials {
    /// Create session credentials.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
        expiration: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
            expiration,
        }
    }
}

// Secrets never reach logs.
impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Credentials scoped to a single account scan.
///
/// A scope is created by the credential broker when an account scan starts,
/// borrowed by every region task of that account, and dropped when the scan
/// ends. It is intentionally not `Clone`: a scope never outlives or escapes
/// its account task.
#[derive(Debug)]
pub struct CredentialScope {
    /// Account these credentials reach.
    pub account_id: AccountId,
    /// Session handle used by collectors.
    pub session: SessionCredentials,
    /// Role that was assumed, or `None` for ambient credentials.
    pub role_name: Option<String>,
    /// When the scope was acquired.
    pub acquired_at: DateTime<Utc>,
}

impl CredentialScope {
    /// Create a scope from freshly obtained session credentials.
    pub fn new(
        account_id: impl Into<AccountId>,
        session: SessionCredentials,
        role_name: Option<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            session,
            role_name,
            acquired_at: Utc::now(),
        }
    }

    /// Expiry of the underlying session, if it has one.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.session.expiration
    }

    /// Whether the session has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry().is_some_and(|exp| exp <= now)
    }

    /// Whether these are the caller's ambient credentials.
    pub fn is_ambient(&self) -> bool {
        self.role_name.is_none()
    }
}
