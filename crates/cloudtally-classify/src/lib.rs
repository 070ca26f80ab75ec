//! Classification and summaries for cloudtally inventories.
//!
//! This crate decides what a raw batch of collector records is worth:
//!
//! - **Classification** - Filter and merge compute records so every workload
//!   is counted exactly once (standalone instance, scaling group, or cluster node)
//! - **Summaries** - Tally compute units, storage and functions per account
//!
//! # Classification
//!
//! Rules are applied per compute record, in order: managed-cluster exclusion,
//! stopped-instance exclusion, scaling-group membership. Each observed
//! scaling group then collapses into a single `compute_group` record, unless
//! members are counted individually.
//!
//! ```rust
//! use cloudtally_classify::ClassificationEngine;
//! use cloudtally_core::{ComputeGroup, ComputeInstance, ResourceRecord, ScanOptions};
//!
//! let engine = ClassificationEngine::new(&ScanOptions::default());
//! let raw = vec![
//!     ResourceRecord::compute("111111111111", "us-east-1", ComputeInstance::new("i-1").with_group("web")),
//!     ResourceRecord::compute("111111111111", "us-east-1", ComputeInstance::new("i-2").with_group("web")),
//!     ResourceRecord::group("111111111111", "us-east-1", ComputeGroup::new("web", 2)),
//! ];
//!
//! let outcome = engine.classify(raw);
//! assert_eq!(outcome.records.len(), 1);
//! assert_eq!(outcome.stats.grouped, 2);
//! ```

mod engine;
mod markers;
pub mod summary;

pub use engine::{Classification, ClassificationEngine, ClassificationStats, Decision, SkipReason};
pub use markers::{ClusterMarkers, DEFAULT_CLUSTER_MARKERS};
pub use summary::{AccountTally, InventorySummary};
