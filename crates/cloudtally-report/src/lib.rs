//! Reporting for cloudtally scans.
//!
//! - **Error aggregation** - Collapse gaps and issues into one report per
//!   account, with inline or file-based status output depending on scale
//! - **Run summary** - Fully scanned, partial and failed account counts,
//!   plus inventory tallies
//! - **Inventory output** - JSON and CSV files, written atomically

mod aggregator;
mod config;
mod error;
mod sink;

pub use aggregator::{AccountReport, ErrorAggregator, MissingAction, RunSummary, StatusReport};
pub use config::{ReportConfig, ReportConfigBuilder};
pub use error::ReportError;
pub use sink::{FileSink, OutputSink, ResultSink};
