//! Resource collector interface.

use cloudtally_core::{
    CollectorError, CredentialScope, PermissionGap, ResourceRecord, ScanOptions,
};

/// Where a collector's resources live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Coverage {
    /// Called once per (account, region).
    Regional,
    /// Account-wide service, called once per account with the `global` region.
    Global,
}

/// What a collector call produced.
#[derive(Debug, Default)]
pub struct CollectorOutput {
    pub records: Vec<ResourceRecord>,
    /// Action the scanning identity was denied, if any.
    pub gap: Option<PermissionGap>,
}

impl CollectorOutput {
    /// Output carrying records and no gap.
    pub fn records(records: Vec<ResourceRecord>) -> Self {
        Self { records, gap: None }
    }

    /// Output for a denied call: no records, one gap.
    pub fn denied(gap: PermissionGap) -> Self {
        Self {
            records: Vec::new(),
            gap: Some(gap),
        }
    }

    /// Attach a gap to otherwise successful output.
    pub fn with_gap(mut self, gap: PermissionGap) -> Self {
        self.gap = Some(gap);
        self
    }
}

/// Lists one resource kind for one (account, region).
///
/// Collectors are shared by every region task, so they must be
/// thread-safe, and they must not keep per-call state. Expected access
/// denials are reported through [`CollectorOutput::gap`] rather than as an
/// error. Every returned record must carry the `account_id` and `region`
/// the collector was called with.
pub trait Collector: Send + Sync {
    /// Short name used in logs and the issue ledger.
    fn name(&self) -> &str;

    /// The provider action this collector needs, e.g. `ec2:DescribeVolumes`.
    fn required_action(&self) -> &str;

    fn coverage(&self) -> Coverage {
        Coverage::Regional
    }

    /// List resources visible to `scope` in `region`.
    fn collect(
        &self,
        scope: &CredentialScope,
        region: &str,
        account_id: &str,
        options: &ScanOptions,
    ) -> Result<CollectorOutput, CollectorError>;
}
