//! Inventory tallies for sizing estimates.
//!
//! Compute units are the billing-relevant count: one per standalone
//! instance plus `counted_as` per scaling group (1, or the desired capacity
//! when members were counted individually but none were observed).

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use cloudtally_core::{ResourceDetail, ResourceRecord};

/// Tallies for a set of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountTally {
    pub instances: u64,
    pub groups: u64,
    pub compute_units: u64,
    pub volumes: u64,
    pub volume_gb: u64,
    pub buckets: u64,
    pub bucket_gb: f64,
    pub functions: u64,
}

impl AccountTally {
    fn record(&mut self, record: &ResourceRecord) {
        match &record.detail {
            ResourceDetail::Compute(_) => {
                self.instances += 1;
                self.compute_units += 1;
            }
            ResourceDetail::ComputeGroup(group) => {
                self.groups += 1;
                self.compute_units += u64::from(group.counted_as);
            }
            ResourceDetail::BlockStorage(volume) => {
                self.volumes += 1;
                self.volume_gb += volume.size_gb;
            }
            ResourceDetail::ObjectStorage(bucket) => {
                self.buckets += 1;
                self.bucket_gb += bucket.size_gb.unwrap_or(0.0);
            }
            ResourceDetail::Function(_) => self.functions += 1,
        }
    }

    fn absorb(&mut self, other: &AccountTally) {
        self.instances += other.instances;
        self.groups += other.groups;
        self.compute_units += other.compute_units;
        self.volumes += other.volumes;
        self.volume_gb += other.volume_gb;
        self.buckets += other.buckets;
        self.bucket_gb += other.bucket_gb;
        self.functions += other.functions;
    }
}

/// Estimated scope of a scanned estate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventorySummary {
    /// Totals across every account.
    pub total: AccountTally,
    /// Totals per account id.
    pub by_account: BTreeMap<String, AccountTally>,
}

impl InventorySummary {
    /// Tally a classified inventory.
    pub fn from_records(records: &[ResourceRecord]) -> Self {
        let by_account: BTreeMap<String, AccountTally> = records
            .iter()
            .into_group_map_by(|r| r.account_id().to_string())
            .into_iter()
            .map(|(account, records)| {
                let mut tally = AccountTally::default();
                for record in records {
                    tally.record(record);
                }
                (account, tally)
            })
            .collect();

        let mut total = AccountTally::default();
        for tally in by_account.values() {
            total.absorb(tally);
        }

        Self { total, by_account }
    }

    /// Total compute units.
    pub fn compute_units(&self) -> u64 {
        self.total.compute_units
    }

    /// Number of accounts that contributed records.
    pub fn account_count(&self) -> usize {
        self.by_account.len()
    }
}
