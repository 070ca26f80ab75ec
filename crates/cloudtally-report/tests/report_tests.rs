use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use cloudtally_core::{
    Account, AccountOutcome, AccountStatus, BlockStorage, ComputeGroup, ComputeInstance,
    PermissionGap, ResourceDetail, ResourceRecord, ScanResult,
};
use cloudtally_report::{
    ErrorAggregator, FileSink, OutputSink, ReportConfig, ReportError, ResultSink, RunSummary,
    StatusReport,
};
use tempfile::TempDir;

fn records() -> Vec<ResourceRecord> {
    vec![
        ResourceRecord::compute(
            "222222222222",
            "us-east-1",
            ComputeInstance::new("i-1")
                .with_type("t3.micro")
                .with_tag("env", "prod")
                .with_tag("team", "core"),
        ),
        ResourceRecord::group("222222222222", "us-east-1", ComputeGroup::new("web", 3)),
        ResourceRecord::new(
            "333333333333",
            "eu-west-1",
            ResourceDetail::BlockStorage(BlockStorage {
                volume_id: "vol-1".to_string(),
                size_gb: 100,
                volume_type: Some("gp3".to_string()),
            }),
        ),
    ]
}

fn outcome(id: &str, status: AccountStatus) -> AccountOutcome {
    AccountOutcome {
        account: Account::new(id, format!("acct-{id}")),
        status,
        records: 1,
        regions_scanned: 2,
        failure: None,
    }
}

fn result_with(accounts: Vec<AccountOutcome>, records: Vec<ResourceRecord>) -> ScanResult {
    let mut result = ScanResult::empty(Utc::now());
    result.accounts_attempted = accounts.len();
    result.accounts_succeeded = accounts
        .iter()
        .filter(|a| a.status != AccountStatus::Failed)
        .count();
    result.accounts = accounts;
    result.records = records;
    result
}

fn sink_in(dir: &TempDir) -> FileSink {
    let config = ReportConfig::builder()
        .output_dir(dir.path().join("out"))
        .build()
        .unwrap();
    FileSink::new(config).unwrap()
}

#[test]
fn test_file_sink_writes_json_and_csv() {
    let dir = TempDir::new().unwrap();
    let result = result_with(
        vec![
            outcome("222222222222", AccountStatus::Complete),
            outcome("333333333333", AccountStatus::Complete),
        ],
        records(),
    );
    let summary = ErrorAggregator::default().summarize(&result);

    let paths = ResultSink::new(sink_in(&dir)).publish(&result, &summary).unwrap();
    assert_eq!(paths.len(), 2);

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&paths[0]).unwrap()).unwrap();
    assert_eq!(json["records"].as_array().unwrap().len(), 3);
    assert_eq!(json["summary"]["inventory"]["total"]["compute_units"], 2);
    assert_eq!(json["records"][0]["resource_kind"], "compute");

    let csv = fs::read_to_string(&paths[1]).unwrap();
    let mut lines = csv.lines();
    let header: Vec<&str> = lines.next().unwrap().split(',').collect();
    let mut sorted = header.clone();
    sorted.sort();
    assert_eq!(header, sorted);
    assert!(header.contains(&"volume_id"));
    assert!(header.contains(&"instance_type"));
    assert!(header.contains(&"desired_capacity"));
    assert_eq!(lines.count(), 3);
}

#[test]
fn test_file_sink_skips_csv_without_records() {
    let dir = TempDir::new().unwrap();
    let result = result_with(vec![outcome("222222222222", AccountStatus::Complete)], Vec::new());
    let summary = ErrorAggregator::default().summarize(&result);
    let sink = sink_in(&dir);

    let paths = sink.write(&result.records, &summary).unwrap();

    assert_eq!(paths, vec![sink.config().json_path()]);
    assert!(!sink.config().csv_path().exists());
}

#[test]
fn test_status_inline_at_threshold() {
    let dir = TempDir::new().unwrap();
    let accounts = (0..10)
        .map(|i| outcome(&format!("{:012}", i), AccountStatus::Complete))
        .collect();
    let result = result_with(accounts, Vec::new());
    let issues_path = dir.path().join("scan_issues.json");

    let report = ErrorAggregator::new(10).report(&result, &issues_path).unwrap();

    match report {
        StatusReport::Inline(lines) => assert_eq!(lines.len(), 10),
        other => panic!("expected inline report, got {other:?}"),
    }
    assert!(!issues_path.exists());
}

#[test]
fn test_status_written_above_threshold() {
    let dir = TempDir::new().unwrap();
    let mut accounts: Vec<AccountOutcome> = (0..11)
        .map(|i| outcome(&format!("{:012}", i), AccountStatus::Complete))
        .collect();
    accounts[3].status = AccountStatus::Partial;
    accounts[7] = AccountOutcome::failed(Account::new("000000000007", "dev"), "no role");
    let mut result = result_with(accounts, Vec::new());
    result
        .gaps
        .insert(PermissionGap::regional("000000000003", "us-east-1", "ec2:DescribeVolumes"));
    let issues_path = dir.path().join("scan_issues.json");

    let report = ErrorAggregator::new(10).report(&result, &issues_path).unwrap();

    assert_eq!(
        report,
        StatusReport::Written {
            path: issues_path.clone(),
            accounts_with_problems: 2,
        }
    );
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&issues_path).unwrap()).unwrap();
    let accounts = json["accounts"].as_array().unwrap();
    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[0]["account_id"], "000000000003");
    assert_eq!(accounts[0]["missing"][0]["action"], "ec2:DescribeVolumes");
    assert_eq!(accounts[1]["status"], "failed");
}

/// Sink that keeps what it was given.
#[derive(Default)]
struct MemorySink {
    seen: RefCell<Vec<ResourceRecord>>,
}

impl OutputSink for MemorySink {
    fn write(&self, records: &[ResourceRecord], _summary: &RunSummary) -> Result<Vec<PathBuf>, ReportError> {
        self.seen.borrow_mut().extend_from_slice(records);
        Ok(Vec::new())
    }
}

#[test]
fn test_result_sink_passes_records_untouched() {
    let result = result_with(vec![outcome("222222222222", AccountStatus::Complete)], records());
    let summary = ErrorAggregator::default().summarize(&result);
    let sink = ResultSink::new(MemorySink::default());

    sink.publish(&result, &summary).unwrap();

    assert_eq!(*sink.sink().seen.borrow(), result.records);
}
