use std::collections::BTreeSet;

use chrono::Utc;
use cloudtally_core::{
    Account, AccountOutcome, AccountStatus, AssumeRoleFailure, CollectorError, ComputeInstance,
    PermissionGap, ProviderError, ResourceRecord, RetryMode, ScanOptions, ScanResult,
    DEFAULT_ASSUME_ROLE,
};

#[test]
fn test_options_defaults() {
    let options = ScanOptions::default();

    assert!(!options.include_stopped);
    assert!(!options.count_group_members_individually);
    assert!(!options.include_cluster_managed_groups);
    assert_eq!(options.assume_role_name, DEFAULT_ASSUME_ROLE);
    assert_eq!(options.retry.max_attempts, 10);
    assert_eq!(options.retry.mode, RetryMode::Adaptive);
    assert!(options.validate().is_ok());
}

#[test]
fn test_options_builder() {
    let options = ScanOptions::builder()
        .include_stopped(true)
        .target_regions(Some(vec!["eu-west-1".to_string()]))
        .region_concurrency(2usize)
        .build()
        .unwrap();

    assert!(options.include_stopped);
    assert_eq!(options.region_concurrency, 2);
    assert!(options.targets_region("eu-west-1"));
    assert!(!options.targets_region("us-east-1"));
    assert!(options.targets_account("anything"));
}

#[test]
fn test_options_builder_rejects_zero_concurrency() {
    let result = ScanOptions::builder().account_concurrency(0usize).build();
    assert!(result.is_err());

    let result = ScanOptions::builder().assume_role_name("  ").build();
    assert!(result.is_err());
}

#[test]
fn test_options_from_partial_json() {
    let options: ScanOptions =
        serde_json::from_str(r#"{"include_stopped": true, "retry": {"mode": "standard"}}"#).unwrap();

    assert!(options.include_stopped);
    assert_eq!(options.account_concurrency, 4);
    assert_eq!(options.region_concurrency, 8);
    assert_eq!(options.retry.mode, RetryMode::Standard);
    assert_eq!(options.retry.max_attempts, 10);
    assert_eq!(options.role_candidates()[0], DEFAULT_ASSUME_ROLE);
}

#[test]
fn test_deserialized_options_are_validated() {
    let options: ScanOptions = serde_json::from_str(r#"{"account_concurrency": 0}"#).unwrap();
    assert!(options.validate().is_err());
}

#[test]
fn test_role_candidates_deduplicated() {
    let options = ScanOptions {
        assume_role_name: "Scanner".to_string(),
        fallback_role_names: vec![
            "Scanner".to_string(),
            " ".to_string(),
            "Fallback".to_string(),
        ],
        ..ScanOptions::default()
    };

    assert_eq!(options.role_candidates(), vec!["Scanner", "Fallback"]);
}

#[test]
fn test_gap_ordering_is_stable() {
    let gaps: BTreeSet<PermissionGap> = [
        PermissionGap::regional("2", "us-west-2", "ec2:DescribeInstances"),
        PermissionGap::global("1", "s3:ListAllMyBuckets"),
        PermissionGap::regional("1", "us-east-1", "ec2:DescribeVolumes"),
        PermissionGap::global("1", "s3:ListAllMyBuckets"),
    ]
    .into_iter()
    .collect();

    let ordered: Vec<_> = gaps.iter().map(|g| g.account_id.as_str()).collect();
    assert_eq!(ordered, vec!["1", "1", "2"]);
    assert_eq!(gaps.len(), 3);
    assert!(gaps.iter().next().unwrap().region.is_none());
}

#[test]
fn test_result_queries() {
    let mut result = ScanResult::empty(Utc::now());
    result.records = vec![
        ResourceRecord::compute("1", "us-east-1", ComputeInstance::new("i-1")),
        ResourceRecord::compute("2", "us-east-1", ComputeInstance::new("i-2")),
        ResourceRecord::compute("1", "eu-west-1", ComputeInstance::new("i-3")),
    ];
    result.accounts = vec![
        AccountOutcome {
            account: Account::new("1", "prod"),
            status: AccountStatus::Complete,
            records: 2,
            regions_scanned: 2,
            failure: None,
        },
        AccountOutcome::failed(Account::new("3", "sandbox"), "denied"),
    ];
    result.gaps.insert(PermissionGap::global("1", "s3:ListAllMyBuckets"));

    assert_eq!(result.records_for("1").count(), 2);
    assert_eq!(result.gaps_for("1").count(), 1);
    assert_eq!(result.gaps_for("2").count(), 0);
    assert_eq!(result.outcome("3").unwrap().status, AccountStatus::Failed);
    assert!(result.outcome("9").is_none());
    assert_eq!(result.count_status(AccountStatus::Complete), 1);
    assert!(!result.is_clean());
}

#[test]
fn test_error_messages() {
    let failure = AssumeRoleFailure {
        account_id: "123456789012".to_string(),
        tried: vec!["A".to_string(), "B".to_string()],
        last_error: ProviderError::access_denied("sts:AssumeRole"),
    };
    assert_eq!(
        failure.to_string(),
        "Could not assume any of [A, B] in account 123456789012: Access denied for sts:AssumeRole"
    );

    let expired = CollectorError::from(ProviderError::CredentialsExpired);
    assert!(expired.is_credentials_expired());
    assert!(!CollectorError::unexpected("boom").is_credentials_expired());

    assert!(ProviderError::Throttled { attempts: 10 }.is_transient());
    assert!(!ProviderError::access_denied("x").is_transient());
}
