//! Error types for scanning operations.
//!
//! Only [`ScanError`] is fatal to a run. Every other error in this module is
//! recovered at the narrowest boundary that can absorb it (a collector call,
//! a region, an account) and surfaces afterwards as a ledger entry.

use thiserror::Error;

use crate::AccountId;

/// Errors returned by the cloud provider seam.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The caller is not authorized for an action.
    #[error("Access denied for {action}")]
    AccessDenied { action: String },

    /// Session credentials expired mid-scan.
    #[error("Credentials expired")]
    CredentialsExpired,

    /// Throttling persisted after the transport retry policy was exhausted.
    #[error("Request throttled after {attempts} attempts")]
    Throttled { attempts: u32 },

    /// Connectivity or endpoint failure.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The requested entity does not exist.
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Other provider error.
    #[error("{message}")]
    Other { message: String },
}

impl ProviderError {
    /// Create an access-denied error for an action.
    pub fn access_denied(action: impl Into<String>) -> Self {
        Self::AccessDenied {
            action: action.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Whether this is an authorization failure.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    /// Whether this error comes from the transport rather than the service.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::Transport { .. })
    }
}

/// Every candidate role failed for an account.
#[derive(Debug, Clone, Error)]
#[error("Could not assume any of [{}] in account {account_id}: {last_error}", .tried.join(", "))]
pub struct AssumeRoleFailure {
    pub account_id: AccountId,
    /// Role names that were tried, in order.
    pub tried: Vec<String>,
    /// Error from the last attempt.
    #[source]
    pub last_error: ProviderError,
}

/// Enabled regions could not be listed for an account.
#[derive(Debug, Clone, Error)]
#[error("Region discovery failed for account {account_id}: {source}")]
pub struct RegionDiscoveryFailure {
    pub account_id: AccountId,
    #[source]
    pub source: ProviderError,
}

/// Errors escaping a collector call.
///
/// Collectors translate expected access denials into a permission gap
/// instead of returning them; anything reaching the orchestrator here is
/// treated as zero records plus a generic gap.
#[derive(Debug, Clone, Error)]
pub enum CollectorError {
    /// Provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Collector failed for a reason unrelated to the provider.
    #[error("Unexpected collector failure: {message}")]
    Unexpected { message: String },
}

impl CollectorError {
    /// Create an unexpected failure.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Whether the session backing the call expired.
    pub fn is_credentials_expired(&self) -> bool {
        matches!(self, Self::Provider(ProviderError::CredentialsExpired))
    }
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The scanner's own identity could not be resolved.
    #[error("Unable to resolve caller identity: {source}")]
    CallerIdentity {
        #[source]
        source: ProviderError,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A worker pool could not be created.
    #[error("Failed to build worker pool: {message}")]
    ThreadPool { message: String },
}

impl ScanError {
    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assume_role_failure_message() {
        let err = AssumeRoleFailure {
            account_id: "123456789012".to_string(),
            tried: vec!["A".to_string(), "B".to_string()],
            last_error: ProviderError::access_denied("sts:AssumeRole"),
        };
        let msg = err.to_string();
        assert!(msg.contains("[A, B]"));
        assert!(msg.contains("123456789012"));
        assert!(msg.contains("sts:AssumeRole"));
    }

    #[test]
    fn test_provider_error_classification() {
        assert!(ProviderError::access_denied("x").is_access_denied());
        assert!(ProviderError::Throttled { attempts: 10 }.is_transient());
        assert!(!ProviderError::CredentialsExpired.is_transient());
        assert!(CollectorError::from(ProviderError::CredentialsExpired).is_credentials_expired());
    }
}
