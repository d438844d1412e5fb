//! Local outputs: CSV reports, downloaded files and the progress bar.

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::{debug, error};

use onspring_bulk_core::contract::{FileSink, Progress, ReportError, ReportWriter};
use onspring_bulk_core::model::FileContent;
use onspring_bulk_core::report::Table;

/// Writes tables as comma-separated values with a header row.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvReportWriter;

impl CsvReportWriter {
    fn write(path: &Path, table: &Table) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&table.headers)?;
        for row in &table.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl ReportWriter for CsvReportWriter {
    fn write_report(&self, path: &Path, table: &Table) -> Result<(), ReportError> {
        Self::write(path, table).map_err(|e| ReportError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Saves downloaded files on the local disk, creating folders as needed.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskFileSink;

#[async_trait]
impl FileSink for DiskFileSink {
    async fn write_file(&self, path: &Path, file: &FileContent) -> bool {
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                error!(error = ?e, path = %parent.display(), "Failed to create output directory");
                return false;
            }
        }
        match tokio::fs::write(path, &file.content).await {
            Ok(()) => {
                debug!(path = %path.display(), bytes = file.content.len(), "Wrote file");
                true
            }
            Err(e) => {
                error!(error = ?e, path = %path.display(), "Failed to write file");
                false
            }
        }
    }
}

/// Terminal progress bar.
pub struct ProgressIndicator {
    bar: ProgressBar,
}

impl ProgressIndicator {
    pub fn new() -> Self {
        let style = ProgressStyle::with_template("{msg:30} [{bar:40}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        let bar = ProgressBar::new(0);
        bar.set_style(style);
        ProgressIndicator { bar }
    }

    pub fn hidden() -> Self {
        ProgressIndicator {
            bar: ProgressBar::hidden(),
        }
    }
}

impl Default for ProgressIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for ProgressIndicator {
    fn start(&self, total: u64, label: &str) {
        self.bar.reset();
        self.bar.set_length(total);
        self.bar.set_message(label.to_string());
    }

    fn advance(&self, label: &str) {
        self.bar.inc(1);
        self.bar.set_message(label.to_string());
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
