//! Typed resource records.
//!
//! Every record carries a common identity header (`account_id`, `region`)
//! and a kind-specific detail variant. The variant tag doubles as the
//! `resource_kind` field of the serialized form, so a JSON record reads as
//! a flat, self-describing object.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::{AccountId, RegionId};

/// Sentinel region for account-global resources whose location is unresolved.
pub const GLOBAL_REGION: &str = "global";

/// Tag key the provider attaches to instances launched by a scaling group.
const SCALING_GROUP_TAG: &str = "aws:autoscaling:groupName";

/// Kind of inventoried resource.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKind {
    Compute,
    ComputeGroup,
    BlockStorage,
    ObjectStorage,
    Function,
}

/// Lifecycle state of a compute instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    #[serde(other)]
    Unknown,
}

/// Identity header shared by every record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordHeader {
    pub account_id: AccountId,
    pub region: RegionId,
}

/// A standalone compute instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComputeInstance {
    pub instance_id: String,
    #[serde(default)]
    pub instance_type: Option<String>,
    /// Purchase lifecycle (`spot`, `scheduled`); absent means on-demand.
    #[serde(default)]
    pub lifecycle: Option<String>,
    #[serde(default)]
    pub state: Option<InstanceState>,
    /// Owning scaling group, when the provider reports it directly.
    #[serde(default)]
    pub autoscaling_group: Option<String>,
    /// Set by collectors that know the instance is a managed-cluster node.
    #[serde(default)]
    pub is_cluster_managed: bool,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl ComputeInstance {
    /// Create an instance with only its identity set.
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            ..Self::default()
        }
    }

    /// Set the lifecycle state.
    pub fn with_state(mut self, state: InstanceState) -> Self {
        self.state = Some(state);
        self
    }

    /// Set the instance type.
    pub fn with_type(mut self, instance_type: impl Into<String>) -> Self {
        self.instance_type = Some(instance_type.into());
        self
    }

    /// Mark membership of a scaling group.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.autoscaling_group = Some(group.into());
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// The scaling group this instance belongs to, from the attribute or its launch tag.
    pub fn scaling_group(&self) -> Option<&str> {
        self.autoscaling_group
            .as_deref()
            .or_else(|| self.tags.get(SCALING_GROUP_TAG).map(String::as_str))
            .filter(|g| !g.is_empty())
    }

    /// Whether the instance is stopped. Unknown state counts as running.
    pub fn is_stopped(&self) -> bool {
        matches!(self.state, Some(InstanceState::Stopped))
    }
}

/// A scaling group, counted as a single compute unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeGroup {
    pub name: String,
    #[serde(default)]
    pub desired_capacity: u32,
    #[serde(default)]
    pub member_ids: Vec<String>,
    /// Compute units this record contributes.
    #[serde(default = "default_counted_as")]
    pub counted_as: u32,
    #[serde(default)]
    pub cluster_managed: bool,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

fn default_counted_as() -> u32 {
    1
}

impl ComputeGroup {
    /// Create a group with the given desired capacity and no members.
    pub fn new(name: impl Into<String>, desired_capacity: u32) -> Self {
        Self {
            name: name.into(),
            desired_capacity,
            member_ids: Vec::new(),
            counted_as: 1,
            cluster_managed: false,
            tags: BTreeMap::new(),
        }
    }

    /// Add member instance ids.
    pub fn with_members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.member_ids.extend(members.into_iter().map(Into::into));
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// A block storage volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockStorage {
    pub volume_id: String,
    #[serde(default)]
    pub size_gb: u64,
    #[serde(default)]
    pub volume_type: Option<String>,
}

/// An object storage bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStorage {
    pub bucket_name: String,
    /// Resolved bucket location, if the lookup succeeded.
    #[serde(default)]
    pub location: Option<RegionId>,
    #[serde(default)]
    pub creation_date: Option<DateTime<Utc>>,
    /// Stored size from storage metrics; `None` when metrics were unavailable.
    #[serde(default)]
    pub size_gb: Option<f64>,
}

/// A serverless function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub function_name: String,
    #[serde(default)]
    pub memory_mb: Option<u32>,
    #[serde(default)]
    pub runtime: Option<String>,
}

/// Kind-specific part of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource_kind", rename_all = "snake_case")]
pub enum ResourceDetail {
    Compute(ComputeInstance),
    ComputeGroup(ComputeGroup),
    BlockStorage(BlockStorage),
    ObjectStorage(ObjectStorage),
    Function(Function),
}

impl ResourceDetail {
    /// The record kind of this detail.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Compute(_) => ResourceKind::Compute,
            Self::ComputeGroup(_) => ResourceKind::ComputeGroup,
            Self::BlockStorage(_) => ResourceKind::BlockStorage,
            Self::ObjectStorage(_) => ResourceKind::ObjectStorage,
            Self::Function(_) => ResourceKind::Function,
        }
    }

    /// The provider-side identifier of the resource.
    pub fn resource_id(&self) -> &str {
        match self {
            Self::Compute(c) => &c.instance_id,
            Self::ComputeGroup(g) => &g.name,
            Self::BlockStorage(v) => &v.volume_id,
            Self::ObjectStorage(b) => &b.bucket_name,
            Self::Function(f) => &f.function_name,
        }
    }
}

/// Deduplication key of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordIdentity {
    pub kind: ResourceKind,
    pub account_id: AccountId,
    pub region: RegionId,
    pub resource_id: String,
}

/// A single inventoried resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(flatten)]
    pub header: RecordHeader,
    #[serde(flatten)]
    pub detail: ResourceDetail,
}

impl ResourceRecord {
    /// Create a record.
    pub fn new(
        account_id: impl Into<AccountId>,
        region: impl Into<RegionId>,
        detail: ResourceDetail,
    ) -> Self {
        Self {
            header: RecordHeader {
                account_id: account_id.into(),
                region: region.into(),
            },
            detail,
        }
    }

    /// Create a compute record.
    pub fn compute(
        account_id: impl Into<AccountId>,
        region: impl Into<RegionId>,
        instance: ComputeInstance,
    ) -> Self {
        Self::new(account_id, region, ResourceDetail::Compute(instance))
    }

    /// Create a scaling group record.
    pub fn group(
        account_id: impl Into<AccountId>,
        region: impl Into<RegionId>,
        group: ComputeGroup,
    ) -> Self {
        Self::new(account_id, region, ResourceDetail::ComputeGroup(group))
    }

    pub fn account_id(&self) -> &str {
        &self.header.account_id
    }

    pub fn region(&self) -> &str {
        &self.header.region
    }

    pub fn kind(&self) -> ResourceKind {
        self.detail.kind()
    }

    /// Deduplication key of this record.
    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity {
            kind: self.kind(),
            account_id: self.header.account_id.clone(),
            region: self.header.region.clone(),
            resource_id: self.detail.resource_id().to_string(),
        }
    }

    /// Whether the mandatory identity fields are all present.
    pub fn has_identity(&self) -> bool {
        !self.header.account_id.is_empty()
            && !self.header.region.is_empty()
            && !self.detail.resource_id().is_empty()
    }

    /// Flatten the record into string attributes for tabular output.
    ///
    /// Absent optional fields are omitted, so the key set differs between
    /// kinds and sometimes between records of the same kind.
    pub fn attributes(&self) -> BTreeMap<String, String> {
        let mut attrs = BTreeMap::new();
        attrs.insert("account_id".to_string(), self.header.account_id.clone());
        attrs.insert("region".to_string(), self.header.region.clone());
        attrs.insert("resource_kind".to_string(), self.kind().to_string());

        let mut put = |key: &str, value: Option<String>| {
            if let Some(v) = value {
                attrs.insert(key.to_string(), v);
            }
        };

        match &self.detail {
            ResourceDetail::Compute(c) => {
                put("instance_id", Some(c.instance_id.clone()));
                put("instance_type", c.instance_type.clone());
                put(
                    "lifecycle",
                    Some(c.lifecycle.clone().unwrap_or_else(|| "on-demand".to_string())),
                );
                put("state", c.state.map(|s| s.to_string()));
                put("autoscaling_group", c.scaling_group().map(str::to_string));
                put("is_cluster_managed", Some(c.is_cluster_managed.to_string()));
                put("tags", join_tags(&c.tags));
            }
            ResourceDetail::ComputeGroup(g) => {
                put("name", Some(g.name.clone()));
                put("desired_capacity", Some(g.desired_capacity.to_string()));
                put("instance_count", Some(g.member_ids.len().to_string()));
                put("counted_as", Some(g.counted_as.to_string()));
                put("cluster_managed", Some(g.cluster_managed.to_string()));
                put("tags", join_tags(&g.tags));
            }
            ResourceDetail::BlockStorage(v) => {
                put("volume_id", Some(v.volume_id.clone()));
                put("size_gb", Some(v.size_gb.to_string()));
                put("volume_type", v.volume_type.clone());
            }
            ResourceDetail::ObjectStorage(b) => {
                put("bucket_name", Some(b.bucket_name.clone()));
                put("location", b.location.clone());
                put("creation_date", b.creation_date.map(|d| d.to_rfc3339()));
                put("size_gb", b.size_gb.map(|s| format!("{s:.2}")));
            }
            ResourceDetail::Function(f) => {
                put("function_name", Some(f.function_name.clone()));
                put("memory_mb", f.memory_mb.map(|m| m.to_string()));
                put("runtime", f.runtime.clone());
            }
        }

        attrs
    }
}

fn join_tags(tags: &BTreeMap<String, String>) -> Option<String> {
    if tags.is_empty() {
        return None;
    }
    Some(
        tags.iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaling_group_from_tag() {
        let inst = ComputeInstance::new("i-1").with_tag(SCALING_GROUP_TAG, "web");
        assert_eq!(inst.scaling_group(), Some("web"));

        let direct = ComputeInstance::new("i-2").with_group("api");
        assert_eq!(direct.scaling_group(), Some("api"));

        let none = ComputeInstance::new("i-3");
        assert_eq!(none.scaling_group(), None);
    }

    #[test]
    fn test_missing_state_is_not_stopped() {
        assert!(!ComputeInstance::new("i-1").is_stopped());
        assert!(ComputeInstance::new("i-1").with_state(InstanceState::Stopped).is_stopped());
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = ResourceRecord::compute(
            "111111111111",
            "us-east-1",
            ComputeInstance::new("i-abc").with_state(InstanceState::Running),
        );
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["resource_kind"], "compute");
        assert_eq!(json["account_id"], "111111111111");
        assert_eq!(json["region"], "us-east-1");
        assert_eq!(json["instance_id"], "i-abc");
        assert_eq!(json["state"], "running");

        let back: ResourceRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_attributes_include_header() {
        let record = ResourceRecord::new(
            "222222222222",
            "eu-west-1",
            ResourceDetail::BlockStorage(BlockStorage {
                volume_id: "vol-1".into(),
                size_gb: 100,
                volume_type: None,
            }),
        );
        let attrs = record.attributes();

        assert_eq!(attrs["resource_kind"], "block_storage");
        assert_eq!(attrs["size_gb"], "100");
        assert!(!attrs.contains_key("volume_type"));
    }

    #[test]
    fn test_identity_distinguishes_kinds() {
        let a = ResourceRecord::compute("1", "r", ComputeInstance::new("x"));
        let b = ResourceRecord::group("1", "r", ComputeGroup::new("x", 1));
        assert_ne!(a.identity(), b.identity());
        assert!(a.has_identity());
        assert!(!ResourceRecord::compute("", "r", ComputeInstance::new("x")).has_identity());
    }
}
