use cloudtally_classify::{ClassificationEngine, InventorySummary};
use cloudtally_core::{
    ComputeGroup, ComputeInstance, InstanceState, ResourceDetail, ResourceKind, ResourceRecord,
    ScanOptions,
};

const ACCOUNT: &str = "123456789012";
const REGION: &str = "eu-central-1";

fn options(include_stopped: bool, members: bool, include_cluster: bool) -> ScanOptions {
    ScanOptions::builder()
        .include_stopped(include_stopped)
        .count_group_members_individually(members)
        .include_cluster_managed_groups(include_cluster)
        .build()
        .unwrap()
}

fn running(id: &str) -> ComputeInstance {
    ComputeInstance::new(id).with_state(InstanceState::Running)
}

fn scaling_group(name: &str, members: usize) -> Vec<ResourceRecord> {
    let ids: Vec<String> = (0..members).map(|i| format!("{name}-i-{i}")).collect();
    let mut records: Vec<ResourceRecord> = ids
        .iter()
        .map(|id| ResourceRecord::compute(ACCOUNT, REGION, running(id).with_group(name)))
        .collect();
    records.push(ResourceRecord::group(
        ACCOUNT,
        REGION,
        ComputeGroup::new(name, members as u32).with_members(ids.clone()),
    ));
    records
}

fn count_kind(records: &[ResourceRecord], kind: ResourceKind) -> usize {
    records.iter().filter(|r| r.kind() == kind).count()
}

fn sorted(mut records: Vec<ResourceRecord>) -> Vec<ResourceRecord> {
    records.sort_by_key(|r| r.identity());
    records
}

#[test]
fn test_group_collapses_to_one_unit_by_default() {
    for n in [0usize, 1, 3, 25] {
        let engine = ClassificationEngine::new(&options(false, false, false));
        let out = engine.classify(scaling_group("web", n));

        assert_eq!(count_kind(&out.records, ResourceKind::ComputeGroup), 1, "n = {n}");
        assert_eq!(count_kind(&out.records, ResourceKind::Compute), 0, "n = {n}");
        assert_eq!(InventorySummary::from_records(&out.records).compute_units(), 1);
    }
}

#[test]
fn test_members_counted_individually_under_override() {
    let engine = ClassificationEngine::new(&options(false, true, false));
    let out = engine.classify(scaling_group("web", 4));

    assert_eq!(count_kind(&out.records, ResourceKind::Compute), 4);
    assert_eq!(count_kind(&out.records, ResourceKind::ComputeGroup), 0);
    assert_eq!(out.stats.members_counted, 1);
}

#[test]
fn test_cluster_marker_excluded_and_included() {
    let raw = vec![
        ResourceRecord::compute(
            ACCOUNT,
            REGION,
            running("i-node").with_tag("kubernetes.io/cluster/prod", "owned"),
        ),
        ResourceRecord::group(
            ACCOUNT,
            REGION,
            ComputeGroup::new("eks-ng", 3).with_tag("alpha.eksctl.io/nodegroup-name", "ng-1"),
        ),
    ];

    let excluded = ClassificationEngine::new(&options(false, false, false)).classify(raw.clone());
    assert!(excluded.records.is_empty());
    assert_eq!(excluded.stats.cluster_managed, 2);

    let included = ClassificationEngine::new(&options(false, false, true)).classify(raw);
    assert_eq!(count_kind(&included.records, ResourceKind::Compute), 1);
    assert_eq!(count_kind(&included.records, ResourceKind::ComputeGroup), 1);
    match &included
        .records
        .iter()
        .find(|r| r.kind() == ResourceKind::ComputeGroup)
        .unwrap()
        .detail
    {
        ResourceDetail::ComputeGroup(g) => assert!(g.cluster_managed),
        other => panic!("expected group, got {other:?}"),
    }
}

#[test]
fn test_stopped_standalone_instance() {
    let raw = vec![ResourceRecord::compute(
        ACCOUNT,
        REGION,
        ComputeInstance::new("i-off").with_state(InstanceState::Stopped),
    )];

    let excluded = ClassificationEngine::new(&options(false, false, false)).classify(raw.clone());
    assert!(excluded.records.is_empty());
    assert_eq!(excluded.stats.stopped, 1);

    let included = ClassificationEngine::new(&options(true, false, false)).classify(raw);
    assert_eq!(included.records.len(), 1);
}

#[test]
fn test_stopped_member_keeps_group_but_is_not_counted_individually() {
    let mut raw = scaling_group("batch", 3);
    raw.push(ResourceRecord::compute(
        ACCOUNT,
        REGION,
        ComputeInstance::new("batch-stopped")
            .with_state(InstanceState::Stopped)
            .with_group("batch"),
    ));

    let default = ClassificationEngine::new(&options(false, false, false)).classify(raw.clone());
    assert_eq!(count_kind(&default.records, ResourceKind::ComputeGroup), 1);
    assert_eq!(count_kind(&default.records, ResourceKind::Compute), 0);

    let individual = ClassificationEngine::new(&options(false, true, false)).classify(raw);
    assert_eq!(count_kind(&individual.records, ResourceKind::Compute), 3);
    assert_eq!(count_kind(&individual.records, ResourceKind::ComputeGroup), 0);
}

#[test]
fn test_compute_unit_invariant() {
    let mut raw = Vec::new();
    raw.extend(scaling_group("web", 3));
    raw.extend(scaling_group("api", 2));
    raw.push(ResourceRecord::compute(ACCOUNT, REGION, running("solo-1")));
    raw.push(ResourceRecord::compute(ACCOUNT, REGION, running("solo-2")));
    raw.push(ResourceRecord::compute(
        ACCOUNT,
        REGION,
        ComputeInstance::new("solo-off").with_state(InstanceState::Stopped),
    ));
    raw.push(ResourceRecord::compute(
        ACCOUNT,
        REGION,
        running("k8s-node").with_tag("eks:cluster-name", "prod"),
    ));

    // 2 standalone + 2 groups
    let default = ClassificationEngine::new(&options(false, false, false)).classify(raw.clone());
    assert_eq!(InventorySummary::from_records(&default.records).compute_units(), 4);

    // 2 standalone + 5 members
    let individual = ClassificationEngine::new(&options(false, true, false)).classify(raw);
    assert_eq!(InventorySummary::from_records(&individual.records).compute_units(), 7);
}

#[test]
fn test_classification_is_idempotent() {
    let mut raw = Vec::new();
    raw.extend(scaling_group("web", 3));
    raw.push(ResourceRecord::compute(ACCOUNT, REGION, running("orphan-1").with_group("ghost")));
    raw.push(ResourceRecord::compute(ACCOUNT, REGION, running("solo")));
    raw.push(ResourceRecord::compute(ACCOUNT, REGION, running("solo")));

    for opts in [
        options(false, false, false),
        options(true, true, false),
        options(false, false, true),
        options(true, true, true),
    ] {
        let engine = ClassificationEngine::new(&opts);
        let first = engine.classify(raw.clone());
        let again = engine.classify(raw.clone());
        let twice = engine.classify(first.records.clone());

        assert_eq!(sorted(first.records.clone()), sorted(again.records));
        assert_eq!(sorted(first.records), sorted(twice.records));
    }
}

#[test]
fn test_records_keep_identity_header() {
    let engine = ClassificationEngine::default();
    let out = engine.classify(scaling_group("web", 2));
    for record in &out.records {
        assert!(!record.account_id().is_empty());
        assert!(!record.region().is_empty());
    }
}

#[test]
fn test_listed_group_stands_in_when_members_unseen() {
    // Instance listing denied: only the group listing came back.
    let raw = vec![
        ResourceRecord::group(ACCOUNT, REGION, ComputeGroup::new("web", 5)),
        ResourceRecord::compute(ACCOUNT, REGION, running("solo")),
    ];

    let individual = ClassificationEngine::new(&options(false, true, false)).classify(raw.clone());
    assert_eq!(count_kind(&individual.records, ResourceKind::ComputeGroup), 1);
    assert_eq!(individual.stats.unobserved_groups, 1);
    assert_eq!(InventorySummary::from_records(&individual.records).compute_units(), 6);

    let default = ClassificationEngine::new(&options(false, false, false)).classify(raw);
    assert_eq!(default.stats.unobserved_groups, 0);
    assert_eq!(InventorySummary::from_records(&default.records).compute_units(), 2);
}
