//! Core types and configuration for cloudtally.
//!
//! This crate provides the data model shared by every other cloudtally
//! crate: accounts and credential scopes, the typed resource records that
//! make up an inventory, the permission-gap and issue ledger, the terminal
//! scan result, scan options, and the error taxonomy.

mod account;
mod config;
mod error;
mod ledger;
mod record;
mod result;

pub use account::{Account, CallerIdentity, CredentialScope, OrgAccount, OrgAccountStatus, SessionCredentials};
pub use config::{RetryMode, RetryPolicy, ScanOptions, ScanOptionsBuilder, DEFAULT_ASSUME_ROLE};
pub use error::{
    AssumeRoleFailure, CollectorError, ProviderError, RegionDiscoveryFailure, ScanError,
};
pub use ledger::{IssueKind, PermissionGap, ScanIssue};
pub use record::{
    BlockStorage, ComputeGroup, ComputeInstance, Function, InstanceState, ObjectStorage,
    RecordHeader, RecordIdentity, ResourceDetail, ResourceKind, ResourceRecord, GLOBAL_REGION,
};
pub use result::{AccountOutcome, AccountStatus, ScanResult};

/// Identifier of a cloud region (e.g. `us-east-1`).
pub type RegionId = String;

/// Identifier of a cloud account.
pub type AccountId = String;
