//! Inventory output.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use cloudtally_core::{ResourceRecord, ScanResult};

use crate::aggregator::RunSummary;
use crate::config::ReportConfig;
use crate::error::ReportError;

/// Destination for a classified inventory.
pub trait OutputSink {
    /// Write the records. Returns the paths that were written.
    fn write(&self, records: &[ResourceRecord], summary: &RunSummary) -> Result<Vec<PathBuf>, ReportError>;
}

/// Hands a finished scan's records to an [`OutputSink`], untouched.
pub struct ResultSink<S> {
    sink: S,
}

impl<S: OutputSink> ResultSink<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Publish the flat record list of `result`.
    pub fn publish(&self, result: &ScanResult, summary: &RunSummary) -> Result<Vec<PathBuf>, ReportError> {
        let paths = self.sink.write(&result.records, summary)?;
        for path in &paths {
            info!(path = %path.display(), "wrote inventory");
        }
        Ok(paths)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

/// Self-describing JSON inventory document.
#[derive(Debug, Serialize)]
struct InventoryDocument<'a> {
    generated_at: DateTime<Utc>,
    summary: &'a RunSummary,
    records: &'a [ResourceRecord],
}

/// Writes `<stem>.json` and `<stem>.csv` into the output directory.
///
/// Both files are written to a temporary file in the same directory and
/// renamed into place, so readers never observe a partial file. The CSV is
/// skipped when there are no records.
#[derive(Debug, Clone)]
pub struct FileSink {
    config: ReportConfig,
}

impl FileSink {
    pub fn new(config: ReportConfig) -> Result<Self, ReportError> {
        config
            .validate()
            .map_err(|message| ReportError::InvalidConfig { message })?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    fn write_json(&self, records: &[ResourceRecord], summary: &RunSummary) -> Result<PathBuf, ReportError> {
        let document = InventoryDocument {
            generated_at: Utc::now(),
            summary,
            records,
        };
        let bytes = if self.config.pretty_json {
            serde_json::to_vec_pretty(&document)?
        } else {
            serde_json::to_vec(&document)?
        };
        let path = self.config.json_path();
        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    fn write_csv(&self, records: &[ResourceRecord]) -> Result<PathBuf, ReportError> {
        let rows: Vec<_> = records.iter().map(ResourceRecord::attributes).collect();
        let header: BTreeSet<&str> = rows
            .iter()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect();

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&header)?;
        for row in &rows {
            writer.write_record(header.iter().map(|key| row.get(*key).map(String::as_str).unwrap_or("")))?;
        }
        let path = self.config.csv_path();
        let bytes = writer
            .into_inner()
            .map_err(|e| ReportError::io(&path, std::io::Error::new(e.error().kind(), e.error().to_string())))?;

        debug!(columns = header.len(), rows = rows.len(), "serialized csv");
        write_atomic(&path, &bytes)?;
        Ok(path)
    }
}

impl OutputSink for FileSink {
    fn write(&self, records: &[ResourceRecord], summary: &RunSummary) -> Result<Vec<PathBuf>, ReportError> {
        let mut written = vec![self.write_json(records, summary)?];
        if records.is_empty() {
            info!("no records, skipping csv");
        } else {
            written.push(self.write_csv(records)?);
        }
        Ok(written)
    }
}

/// Write `bytes` to `path` through a temporary sibling file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| ReportError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ReportError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| ReportError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| ReportError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| ReportError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_replaces_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ReportConfig::default();
        config.file_stem = String::new();
        assert!(matches!(FileSink::new(config), Err(ReportError::InvalidConfig { .. })));
    }
}
