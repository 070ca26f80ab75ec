//! Compute classification.
//!
//! A batch of raw records (typically everything the collectors returned for
//! one account and region) goes in; a deduplicated inventory in which every
//! compute workload contributes exactly once comes out.
//!
//! Policy, per compute record and in order:
//!
//! 1. Managed-cluster capacity is excluded unless explicitly included. A
//!    record is cluster capacity when its tags carry a cluster marker, when a
//!    collector flagged it, or when its scaling group is cluster capacity.
//! 2. Stopped instances are excluded unless explicitly included.
//! 3. Scaling-group members are excluded; their group stands in for them.
//!    When members are counted individually the group record is dropped
//!    instead, so a group never contributes both ways. A listed group none
//!    of whose members were observed stands in for them at its desired
//!    capacity, so a denied instance listing does not lose the workload.
//!
//! Scaling groups referenced by members but never listed themselves (e.g.
//! the group listing was denied) are synthesized from their members, so the
//! workload is still counted once whichever collector saw it.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{debug, error, warn};

use cloudtally_core::{
    ComputeGroup, ComputeInstance, RecordHeader, ResourceDetail, ResourceRecord, ScanOptions,
};

use crate::markers::ClusterMarkers;

/// Why a record was left out of the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// Owned by a managed container cluster.
    ClusterManaged,
    /// Stopped standalone instance.
    Stopped,
    /// Represented by its scaling group.
    GroupMember,
    /// Scaling group represented by its individually counted members.
    MembersCounted,
    /// Empty scaling group while members are counted individually.
    EmptyGroup,
}

/// Verdict for a single compute instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Count,
    Skip(SkipReason),
}

/// Counters describing what a classification pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationStats {
    /// Records received.
    pub input: u64,
    /// Records emitted.
    pub emitted: u64,
    pub cluster_managed: u64,
    pub stopped: u64,
    pub grouped: u64,
    /// Groups dropped because their members were counted instead.
    pub members_counted: u64,
    pub empty_groups: u64,
    /// Records whose identity was already seen in the batch.
    pub duplicates: u64,
    /// Groups built from member records alone.
    pub synthesized_groups: u64,
    /// Groups counted at capacity because none of their members were observed.
    pub unobserved_groups: u64,
    /// Records without a mandatory identity field.
    pub malformed: u64,
}

impl ClassificationStats {
    fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::ClusterManaged => self.cluster_managed += 1,
            SkipReason::Stopped => self.stopped += 1,
            SkipReason::GroupMember => self.grouped += 1,
            SkipReason::MembersCounted => self.members_counted += 1,
            SkipReason::EmptyGroup => self.empty_groups += 1,
        }
    }

    /// Total records excluded by policy (not counting duplicates).
    pub fn skipped(&self) -> u64 {
        self.cluster_managed + self.stopped + self.grouped + self.members_counted + self.empty_groups
    }

    /// Accumulate counters from another pass.
    pub fn merge(&mut self, other: &ClassificationStats) {
        self.input += other.input;
        self.emitted += other.emitted;
        self.cluster_managed += other.cluster_managed;
        self.stopped += other.stopped;
        self.grouped += other.grouped;
        self.members_counted += other.members_counted;
        self.empty_groups += other.empty_groups;
        self.duplicates += other.duplicates;
        self.synthesized_groups += other.synthesized_groups;
        self.unobserved_groups += other.unobserved_groups;
        self.malformed += other.malformed;
    }
}

/// Result of classifying a batch.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Records that made it into the inventory.
    pub records: Vec<ResourceRecord>,
    pub stats: ClassificationStats,
}

/// (account, region, group name)
type GroupKey = (String, String, String);

fn group_key(header: &RecordHeader, name: &str) -> GroupKey {
    (header.account_id.clone(), header.region.clone(), name.to_string())
}

/// Facts about a scaling group gathered across the batch.
#[derive(Debug, Default)]
struct GroupFacts {
    cluster: bool,
    members: Vec<String>,
    listed: bool,
}

/// Applies the counting policy to raw collector output.
#[derive(Debug, Clone)]
pub struct ClassificationEngine {
    include_stopped: bool,
    members_individually: bool,
    include_cluster: bool,
    markers: ClusterMarkers,
}

impl ClassificationEngine {
    /// Create an engine for the given options with the default cluster markers.
    pub fn new(options: &ScanOptions) -> Self {
        Self {
            include_stopped: options.include_stopped,
            members_individually: options.count_group_members_individually,
            include_cluster: options.include_cluster_managed_groups,
            markers: ClusterMarkers::default(),
        }
    }

    /// Replace the cluster markers.
    pub fn with_markers(mut self, markers: ClusterMarkers) -> Self {
        self.markers = markers;
        self
    }

    /// Decide whether a single instance is counted.
    ///
    /// `in_cluster_group` tells the engine the instance's scaling group is
    /// known to be cluster capacity.
    pub fn decide(&self, instance: &ComputeInstance, in_cluster_group: bool) -> Decision {
        if !self.include_cluster && (in_cluster_group || self.is_cluster_instance(instance)) {
            return Decision::Skip(SkipReason::ClusterManaged);
        }
        if !self.include_stopped && instance.is_stopped() {
            return Decision::Skip(SkipReason::Stopped);
        }
        if !self.members_individually && instance.scaling_group().is_some() {
            return Decision::Skip(SkipReason::GroupMember);
        }
        Decision::Count
    }

    /// Whether an instance is managed-cluster capacity on its own evidence.
    pub fn is_cluster_instance(&self, instance: &ComputeInstance) -> bool {
        instance.is_cluster_managed || self.markers.matches(&instance.tags)
    }

    /// Whether a group is managed-cluster capacity on its own evidence.
    pub fn is_cluster_group(&self, group: &ComputeGroup) -> bool {
        group.cluster_managed || self.markers.matches(&group.tags)
    }

    /// Classify a batch of raw records.
    ///
    /// Output order follows first appearance in the input, with synthesized
    /// groups appended in key order, so the same input always produces the
    /// same output.
    pub fn classify<I>(&self, records: I) -> Classification
    where
        I: IntoIterator<Item = ResourceRecord>,
    {
        let mut stats = ClassificationStats::default();

        // Pass 1: drop malformed records, dedupe by identity, merge group listings.
        let mut seen = HashSet::new();
        let mut unique: Vec<ResourceRecord> = Vec::new();
        let mut group_slots: HashMap<GroupKey, usize> = HashMap::new();

        for record in records {
            stats.input += 1;

            if !record.has_identity() {
                error!(
                    account = %record.header.account_id,
                    region = %record.header.region,
                    kind = %record.kind(),
                    "record without identity reached the classifier, dropping"
                );
                stats.malformed += 1;
                continue;
            }

            if !seen.insert(record.identity()) {
                stats.duplicates += 1;
                if let ResourceDetail::ComputeGroup(dup) = record.detail {
                    let key = group_key(&record.header, &dup.name);
                    if let Some(&slot) = group_slots.get(&key) {
                        if let ResourceDetail::ComputeGroup(kept) = &mut unique[slot].detail {
                            merge_members(&mut kept.member_ids, dup.member_ids);
                        }
                    }
                }
                continue;
            }

            if let ResourceDetail::ComputeGroup(group) = &record.detail {
                group_slots.insert(group_key(&record.header, &group.name), unique.len());
            }
            unique.push(record);
        }

        // Pass 2: gather what the batch knows about each scaling group.
        let mut groups: BTreeMap<GroupKey, GroupFacts> = BTreeMap::new();
        for record in &unique {
            match &record.detail {
                ResourceDetail::ComputeGroup(group) => {
                    let facts = groups.entry(group_key(&record.header, &group.name)).or_default();
                    facts.listed = true;
                    facts.cluster |= self.is_cluster_group(group);
                }
                ResourceDetail::Compute(instance) => {
                    if let Some(name) = instance.scaling_group() {
                        let facts = groups.entry(group_key(&record.header, name)).or_default();
                        facts.cluster |= self.is_cluster_instance(instance);
                        facts.members.push(instance.instance_id.clone());
                    }
                }
                _ => {}
            }
        }

        // Pass 3: apply the policy.
        let mut out = Vec::with_capacity(unique.len());
        for mut record in unique {
            let verdict = match &mut record.detail {
                ResourceDetail::Compute(instance) => {
                    let in_cluster_group = instance.scaling_group().is_some_and(|name| {
                        groups
                            .get(&group_key(&record.header, name))
                            .is_some_and(|facts| facts.cluster)
                    });
                    self.decide(instance, in_cluster_group)
                }
                ResourceDetail::ComputeGroup(group) => {
                    let facts = groups.get(&group_key(&record.header, &group.name));
                    self.collapse_group(&record.header, group, facts, &mut stats)
                }
                _ => Decision::Count,
            };

            match verdict {
                Decision::Count => out.push(record),
                Decision::Skip(reason) => {
                    debug!(
                        account = %record.header.account_id,
                        region = %record.header.region,
                        id = record.detail.resource_id(),
                        reason = %reason,
                        "skipped record"
                    );
                    stats.record_skip(reason);
                }
            }
        }

        // Groups only known through their members.
        for ((account_id, region, name), facts) in &groups {
            if facts.listed {
                continue;
            }
            stats.synthesized_groups += 1;

            let header = RecordHeader {
                account_id: account_id.clone(),
                region: region.clone(),
            };
            let mut group = ComputeGroup::new(name.clone(), saturating_u32(facts.members.len()));
            group.cluster_managed = facts.cluster;
            match self.collapse_group(&header, &mut group, Some(facts), &mut stats) {
                Decision::Count => out.push(ResourceRecord::group(header.account_id, header.region, group)),
                Decision::Skip(reason) => stats.record_skip(reason),
            }
        }

        stats.emitted = out.len() as u64;
        debug!(
            input = stats.input,
            emitted = stats.emitted,
            skipped = stats.skipped(),
            duplicates = stats.duplicates,
            "classified batch"
        );

        Classification {
            records: out,
            stats,
        }
    }

    /// Decide a scaling group, folding observed members into the record.
    fn collapse_group(
        &self,
        header: &RecordHeader,
        group: &mut ComputeGroup,
        facts: Option<&GroupFacts>,
        stats: &mut ClassificationStats,
    ) -> Decision {
        let cluster = self.is_cluster_group(group) || facts.is_some_and(|f| f.cluster);
        if cluster && !self.include_cluster {
            return Decision::Skip(SkipReason::ClusterManaged);
        }

        let observed = facts.map(|f| f.members.as_slice()).unwrap_or_default();
        if self.members_individually {
            if !observed.is_empty() {
                return Decision::Skip(SkipReason::MembersCounted);
            }
            let units = group.desired_capacity.max(saturating_u32(group.member_ids.len()));
            if units == 0 {
                return Decision::Skip(SkipReason::EmptyGroup);
            }
            warn!(
                account = %header.account_id,
                region = %header.region,
                group = %group.name,
                units,
                "no members observed, counting group at desired capacity"
            );
            stats.unobserved_groups += 1;
            group.cluster_managed = cluster;
            group.counted_as = units;
            return Decision::Count;
        }

        merge_members(&mut group.member_ids, observed.iter().cloned());
        group.cluster_managed = cluster;
        group.counted_as = 1;
        Decision::Count
    }
}

impl Default for ClassificationEngine {
    fn default() -> Self {
        Self::new(&ScanOptions::default())
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn merge_members<I>(members: &mut Vec<String>, extra: I)
where
    I: IntoIterator<Item = String>,
{
    for id in extra {
        if !members.contains(&id) {
            members.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudtally_core::{BlockStorage, InstanceState};

    const ACCOUNT: &str = "111111111111";
    const REGION: &str = "us-east-1";

    fn instance(id: &str) -> ComputeInstance {
        ComputeInstance::new(id).with_state(InstanceState::Running)
    }

    fn compute(inst: ComputeInstance) -> ResourceRecord {
        ResourceRecord::compute(ACCOUNT, REGION, inst)
    }

    fn options(stopped: bool, members: bool, cluster: bool) -> ScanOptions {
        ScanOptions {
            include_stopped: stopped,
            count_group_members_individually: members,
            include_cluster_managed_groups: cluster,
            ..ScanOptions::default()
        }
    }

    #[test]
    fn test_decide_order() {
        let engine = ClassificationEngine::default();
        let inst = instance("i-1")
            .with_state(InstanceState::Stopped)
            .with_group("web")
            .with_tag("kubernetes.io/cluster/prod", "owned");

        // Cluster exclusion wins over every other rule.
        assert_eq!(engine.decide(&inst, false), Decision::Skip(SkipReason::ClusterManaged));

        let stopped_member = instance("i-2").with_state(InstanceState::Stopped).with_group("web");
        assert_eq!(engine.decide(&stopped_member, false), Decision::Skip(SkipReason::Stopped));

        assert_eq!(engine.decide(&instance("i-3"), false), Decision::Count);
        assert_eq!(engine.decide(&instance("i-4"), true), Decision::Skip(SkipReason::ClusterManaged));
    }

    #[test]
    fn test_missing_attributes_are_counted() {
        let engine = ClassificationEngine::default();
        let out = engine.classify(vec![compute(ComputeInstance::new("i-bare"))]);
        assert_eq!(out.records.len(), 1);
    }

    #[test]
    fn test_malformed_record_dropped() {
        let engine = ClassificationEngine::default();
        let out = engine.classify(vec![compute(ComputeInstance::new(""))]);
        assert!(out.records.is_empty());
        assert_eq!(out.stats.malformed, 1);
    }

    #[test]
    fn test_duplicate_instances_counted_once() {
        let engine = ClassificationEngine::default();
        let out = engine.classify(vec![compute(instance("i-1")), compute(instance("i-1"))]);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.stats.duplicates, 1);
    }

    #[test]
    fn test_group_synthesized_from_members() {
        let engine = ClassificationEngine::default();
        let out = engine.classify(vec![
            compute(instance("i-1").with_group("orphan")),
            compute(instance("i-2").with_group("orphan")),
        ]);

        assert_eq!(out.records.len(), 1);
        assert_eq!(out.stats.synthesized_groups, 1);
        match &out.records[0].detail {
            ResourceDetail::ComputeGroup(g) => {
                assert_eq!(g.name, "orphan");
                assert_eq!(g.counted_as, 1);
                assert_eq!(g.member_ids, vec!["i-1".to_string(), "i-2".to_string()]);
            }
            other => panic!("expected group, got {other:?}"),
        }
    }

    #[test]
    fn test_cluster_group_excludes_untagged_members() {
        let engine = ClassificationEngine::new(&options(false, true, false));
        let out = engine.classify(vec![
            ResourceRecord::group(
                ACCOUNT,
                REGION,
                ComputeGroup::new("nodes", 2).with_tag("eks:nodegroup-name", "ng-1"),
            ),
            compute(instance("i-1").with_group("nodes")),
            compute(instance("i-2").with_group("nodes")),
        ]);

        assert!(out.records.is_empty());
        assert_eq!(out.stats.cluster_managed, 3);
    }

    #[test]
    fn test_empty_group_dropped_under_override() {
        let engine = ClassificationEngine::new(&options(false, true, false));
        let out = engine.classify(vec![ResourceRecord::group(ACCOUNT, REGION, ComputeGroup::new("idle", 0))]);
        assert!(out.records.is_empty());
        assert_eq!(out.stats.empty_groups, 1);
    }

    #[test]
    fn test_group_counts_at_capacity_when_members_unseen() {
        let engine = ClassificationEngine::new(&options(false, true, false));
        let out = engine.classify(vec![ResourceRecord::group(ACCOUNT, REGION, ComputeGroup::new("web", 5))]);

        assert_eq!(out.records.len(), 1);
        assert_eq!(out.stats.unobserved_groups, 1);
        assert_eq!(out.stats.members_counted, 0);
        match &out.records[0].detail {
            ResourceDetail::ComputeGroup(g) => assert_eq!(g.counted_as, 5),
            other => panic!("expected group, got {other:?}"),
        }
    }

    #[test]
    fn test_saturating_member_count() {
        assert_eq!(saturating_u32(3), 3);
        assert_eq!(saturating_u32(usize::MAX), u32::MAX);
    }

    #[test]
    fn test_empty_group_counted_by_default() {
        let engine = ClassificationEngine::default();
        let out = engine.classify(vec![ResourceRecord::group(ACCOUNT, REGION, ComputeGroup::new("idle", 0))]);
        assert_eq!(out.records.len(), 1);
    }

    #[test]
    fn test_non_compute_passes_through() {
        let engine = ClassificationEngine::default();
        let volume = ResourceRecord::new(
            ACCOUNT,
            REGION,
            ResourceDetail::BlockStorage(BlockStorage {
                volume_id: "vol-1".into(),
                size_gb: 8,
                volume_type: Some("gp3".into()),
            }),
        );
        let out = engine.classify(vec![volume.clone()]);
        assert_eq!(out.records, vec![volume]);
    }

    #[test]
    fn test_duplicate_group_listings_merge_members() {
        let engine = ClassificationEngine::default();
        let out = engine.classify(vec![
            ResourceRecord::group(ACCOUNT, REGION, ComputeGroup::new("web", 2).with_members(["i-1"])),
            ResourceRecord::group(ACCOUNT, REGION, ComputeGroup::new("web", 2).with_members(["i-2"])),
        ]);

        assert_eq!(out.records.len(), 1);
        match &out.records[0].detail {
            ResourceDetail::ComputeGroup(g) => assert_eq!(g.member_ids.len(), 2),
            other => panic!("expected group, got {other:?}"),
        }
    }

    #[test]
    fn test_stats_merge() {
        let mut a = ClassificationStats {
            input: 2,
            stopped: 1,
            ..Default::default()
        };
        let b = ClassificationStats {
            input: 3,
            grouped: 2,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.input, 5);
        assert_eq!(a.skipped(), 3);
    }
}
