//! Scan orchestration for cloudtally.
//!
//! This crate turns a provider and a set of collectors into a classified
//! inventory of a whole cloud estate:
//!
//! - **Discovery** of accounts (organization-wide or caller-only) and of
//!   the enabled regions per account
//! - **Credential brokering** with ordered role fallback and a one-shot
//!   session refresh
//! - **Bounded two-level parallelism**: an account pool, and a region pool
//!   per account
//! - **Fault isolation**: a failed account, region or collector never stops
//!   the rest of the run
//! - **Progress updates** via broadcast channels
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cloudtally_core::ScanOptions;
//! use cloudtally_scan::{snapshot_collectors, EstateSnapshot, ScanOrchestrator, SnapshotProvider};
//!
//! let estate = Arc::new(EstateSnapshot::load("estate.json").unwrap());
//! let options = ScanOptions::default();
//! let provider = Arc::new(SnapshotProvider::new(Arc::clone(&estate), options.retry));
//!
//! let orchestrator = ScanOrchestrator::new(provider, options)
//!     .with_collectors(snapshot_collectors(&estate));
//!
//! // Subscribe to progress updates
//! let mut progress_rx = orchestrator.subscribe();
//!
//! let result = orchestrator.run().unwrap();
//! println!("{} records, {} gaps", result.records.len(), result.gaps.len());
//! ```

mod collector;
mod credentials;
mod discovery;
mod guard;
mod orchestrator;
mod progress;
mod provider;
pub mod snapshot;

pub use collector::{Collector, CollectorOutput, Coverage};
pub use credentials::{CredentialBroker, RefreshableScope};
pub use discovery::{ScopeDiscovery, FALLBACK_REGIONS};
pub use guard::GlobalPassGuard;
pub use orchestrator::ScanOrchestrator;
pub use progress::ScanProgress;
pub use provider::{CloudProvider, SESSION_NAME};
pub use snapshot::{snapshot_collectors, EstateSnapshot, SnapshotError, SnapshotProvider};
