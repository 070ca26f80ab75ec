use std::sync::Arc;

use strum::{Display, EnumIter, IntoEnumIterator};
use tracing::warn;

use cloudtally_core::{
    CollectorError, CredentialScope, PermissionGap, ProviderError, ResourceDetail, ResourceRecord,
    ScanOptions, GLOBAL_REGION,
};

use super::provider::absorb_throttling;
use super::{AccountSnapshot, EstateSnapshot, RegionSnapshot};
use crate::collector::{Collector, CollectorOutput, Coverage};

const GET_BUCKET_LOCATION: &str = "s3:GetBucketLocation";
const GET_METRIC_STATISTICS: &str = "cloudwatch:GetMetricStatistics";

/// Services a snapshot can answer for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum SnapshotService {
    Instances,
    ScalingGroups,
    Volumes,
    Functions,
    Buckets,
}

impl SnapshotService {
    /// Provider action needed to list this service.
    pub fn action(self) -> &'static str {
        match self {
            Self::Instances => "ec2:DescribeInstances",
            Self::ScalingGroups => "autoscaling:DescribeAutoScalingGroups",
            Self::Volumes => "ec2:DescribeVolumes",
            Self::Functions => "lambda:ListFunctions",
            Self::Buckets => "s3:ListAllMyBuckets",
        }
    }

    pub fn coverage(self) -> Coverage {
        match self {
            Self::Buckets => Coverage::Global,
            _ => Coverage::Regional,
        }
    }
}

/// Collector for one service of an [`EstateSnapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotCollector {
    estate: Arc<EstateSnapshot>,
    service: SnapshotService,
    name: String,
}

impl SnapshotCollector {
    pub fn new(estate: Arc<EstateSnapshot>, service: SnapshotService) -> Self {
        Self {
            estate,
            service,
            name: service.to_string(),
        }
    }

    fn collect_regional(
        &self,
        account: &AccountSnapshot,
        region: &str,
        account_id: &str,
        options: &ScanOptions,
    ) -> Result<CollectorOutput, CollectorError> {
        let Some(snapshot) = account.regions.get(region) else {
            if account.denies(region, self.service.action()) {
                return Ok(CollectorOutput::denied(PermissionGap::regional(
                    account_id,
                    region,
                    self.service.action(),
                )));
            }
            return Ok(CollectorOutput::default());
        };

        if snapshot.unreachable {
            return Err(ProviderError::transport(format!("endpoint for {region} unreachable")).into());
        }
        absorb_throttling(snapshot.throttled_responses, &options.retry)?;

        if account.denies(region, self.service.action()) {
            return Ok(CollectorOutput::denied(PermissionGap::regional(
                account_id,
                region,
                self.service.action(),
            )));
        }

        let records = regional_details(snapshot, self.service)
            .into_iter()
            .map(|detail| ResourceRecord::new(account_id, region, detail))
            .collect();
        Ok(CollectorOutput::records(records))
    }

    fn collect_buckets(&self, account: &AccountSnapshot, account_id: &str) -> CollectorOutput {
        if account.denies(GLOBAL_REGION, self.service.action()) {
            return CollectorOutput::denied(PermissionGap::global(account_id, self.service.action()));
        }

        let location_denied = account.denies(GLOBAL_REGION, GET_BUCKET_LOCATION);
        let metrics_denied = account.denies(GLOBAL_REGION, GET_METRIC_STATISTICS);

        let records = account
            .buckets
            .iter()
            .cloned()
            .map(|mut bucket| {
                if location_denied {
                    bucket.location = None;
                }
                if metrics_denied {
                    bucket.size_gb = None;
                }
                let region = bucket
                    .location
                    .clone()
                    .unwrap_or_else(|| GLOBAL_REGION.to_string());
                ResourceRecord::new(account_id, region, ResourceDetail::ObjectStorage(bucket))
            })
            .collect();

        let output = CollectorOutput::records(records);
        if account.buckets.is_empty() {
            return output;
        }
        // One gap per call: location wins, a metrics denial behind it is logged.
        match (location_denied, metrics_denied) {
            (true, also_metrics) => {
                if also_metrics {
                    warn!(
                        account = %account_id,
                        action = GET_METRIC_STATISTICS,
                        buckets = account.buckets.len(),
                        "bucket sizes unavailable"
                    );
                }
                output.with_gap(PermissionGap::global(account_id, GET_BUCKET_LOCATION))
            }
            (false, true) => output.with_gap(PermissionGap::global(account_id, GET_METRIC_STATISTICS)),
            (false, false) => output,
        }
    }
}

impl Collector for SnapshotCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_action(&self) -> &str {
        self.service.action()
    }

    fn coverage(&self) -> Coverage {
        self.service.coverage()
    }

    fn collect(
        &self,
        scope: &CredentialScope,
        region: &str,
        account_id: &str,
        options: &ScanOptions,
    ) -> Result<CollectorOutput, CollectorError> {
        if scope.account_id != account_id {
            return Err(CollectorError::unexpected(format!(
                "session for {} used to scan {account_id}",
                scope.account_id
            )));
        }
        let Some(account) = self.estate.account(account_id) else {
            return Ok(CollectorOutput::default());
        };

        match self.service.coverage() {
            Coverage::Global => Ok(self.collect_buckets(account, account_id)),
            Coverage::Regional => self.collect_regional(account, region, account_id, options),
        }
    }
}

fn regional_details(snapshot: &RegionSnapshot, service: SnapshotService) -> Vec<ResourceDetail> {
    match service {
        SnapshotService::Instances => snapshot
            .instances
            .iter()
            .cloned()
            .map(ResourceDetail::Compute)
            .collect(),
        SnapshotService::ScalingGroups => snapshot
            .scaling_groups
            .iter()
            .cloned()
            .map(ResourceDetail::ComputeGroup)
            .collect(),
        SnapshotService::Volumes => snapshot
            .volumes
            .iter()
            .cloned()
            .map(ResourceDetail::BlockStorage)
            .collect(),
        SnapshotService::Functions => snapshot
            .functions
            .iter()
            .cloned()
            .map(ResourceDetail::Function)
            .collect(),
        SnapshotService::Buckets => Vec::new(),
    }
}

/// One collector per snapshot service.
pub fn snapshot_collectors(estate: &Arc<EstateSnapshot>) -> Vec<Arc<dyn Collector>> {
    SnapshotService::iter()
        .map(|service| Arc::new(SnapshotCollector::new(Arc::clone(estate), service)) as Arc<dyn Collector>)
        .collect()
}
