//! Tabular rows for the CSV outputs.
//!
//! Column order is part of the output format and must not change.

use std::path::PathBuf;

use crate::model::{FileRequest, RecordReference};

/// File name written for files whose metadata could not be fetched.
pub const FILE_INFO_ERROR_NAME: &str = "Unable to retrieve file info";

/// Header plus rows, ready for a [`crate::contract::ReportWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn from_rows<R: ToRow>(items: &[R]) -> Self {
        Table {
            headers: R::HEADERS.iter().map(|h| h.to_string()).collect(),
            rows: items.iter().map(ToRow::to_row).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub trait ToRow {
    const HEADERS: &'static [&'static str];
    fn to_row(&self) -> Vec<String>;
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

impl FileRequest {
    fn identity_cells(&self) -> Vec<String> {
        vec![
            self.record_id.to_string(),
            self.field_id.to_string(),
            self.field_name.clone(),
            self.file_id.to_string(),
        ]
    }
}

impl ToRow for FileRequest {
    const HEADERS: &'static [&'static str] = &["Record Id", "Field Id", "Field Name", "File Id"];

    fn to_row(&self) -> Vec<String> {
        self.identity_cells()
    }
}

/// A file's identity plus its resolved name and size.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfoResult {
    pub file: FileRequest,
    pub file_name: String,
    pub size_in_bytes: u64,
}

impl FileInfoResult {
    pub fn new(file: FileRequest, file_name: impl Into<String>, size_in_bytes: u64) -> Self {
        FileInfoResult {
            file,
            file_name: file_name.into(),
            size_in_bytes,
        }
    }

    /// Stand-in for a file whose metadata could not be retrieved.
    pub fn unavailable(file: FileRequest) -> Self {
        FileInfoResult::new(file, FILE_INFO_ERROR_NAME, 0)
    }

    fn scaled(&self, divisor: f64) -> f64 {
        round4(self.size_in_bytes as f64 / divisor)
    }

    pub fn size_in_kb(&self) -> f64 {
        self.scaled(1_000.0)
    }

    pub fn size_in_kib(&self) -> f64 {
        self.scaled(1_024.0)
    }

    pub fn size_in_mb(&self) -> f64 {
        self.scaled(1_000_000.0)
    }

    pub fn size_in_mib(&self) -> f64 {
        self.scaled(1_048_576.0)
    }

    pub fn size_in_gb(&self) -> f64 {
        self.scaled(1_000_000_000.0)
    }

    pub fn size_in_gib(&self) -> f64 {
        self.scaled(1_073_741_824.0)
    }
}

impl ToRow for FileInfoResult {
    const HEADERS: &'static [&'static str] = &[
        "Record Id",
        "Field Id",
        "Field Name",
        "File Id",
        "File Name",
        "File Size (Bytes)",
        "File Size (KB)",
        "File Size (KiB)",
        "File Size (MB)",
        "File Size (MiB)",
        "File Size (GB)",
        "File Size (GiB)",
    ];

    fn to_row(&self) -> Vec<String> {
        let mut row = self.file.identity_cells();
        row.push(self.file_name.clone());
        row.push(self.size_in_bytes.to_string());
        for size in [
            self.size_in_kb(),
            self.size_in_kib(),
            self.size_in_mb(),
            self.size_in_mib(),
            self.size_in_gb(),
            self.size_in_gib(),
        ] {
            row.push(size.to_string());
        }
        row
    }
}

/// A file that could not be downloaded or saved locally.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadFailure {
    pub file: FileRequest,
    /// Known once the remote fetch succeeded.
    pub file_name: Option<String>,
    pub file_path: Option<PathBuf>,
}

impl DownloadFailure {
    /// A file whose content never arrived.
    pub fn unretrieved(file: FileRequest) -> Self {
        DownloadFailure {
            file,
            file_name: None,
            file_path: None,
        }
    }
}

impl ToRow for DownloadFailure {
    const HEADERS: &'static [&'static str] = &[
        "Record Id",
        "Field Id",
        "Field Name",
        "File Id",
        "File Name",
        "File Path",
    ];

    fn to_row(&self) -> Vec<String> {
        let mut row = self.file.identity_cells();
        row.push(self.file_name.clone().unwrap_or_default());
        row.push(
            self.file_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        );
        row
    }
}

impl ToRow for RecordReference {
    const HEADERS: &'static [&'static str] = &[
        "Source App Id",
        "Source App Name",
        "Source Field Id",
        "Source Field Name",
        "Source Record Id",
        "Target App Id",
        "Target Record Id",
    ];

    fn to_row(&self) -> Vec<String> {
        vec![
            self.source_app_id.to_string(),
            self.source_app_name.clone(),
            self.source_field_id.to_string(),
            self.source_field_name.clone(),
            self.source_record_id.to_string(),
            self.target_app_id.to_string(),
            self.target_record_id.to_string(),
        ]
    }
}

/// A source file that could not be copied to its target record.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferFailure {
    pub file: FileRequest,
    pub target_record_id: i32,
    pub target_field_id: i32,
    pub reason: String,
}

impl ToRow for TransferFailure {
    const HEADERS: &'static [&'static str] = &[
        "Record Id",
        "Field Id",
        "Field Name",
        "File Id",
        "Target Record Id",
        "Target Field Id",
        "Reason",
    ];

    fn to_row(&self) -> Vec<String> {
        let mut row = self.file.identity_cells();
        row.push(self.target_record_id.to_string());
        row.push(self.target_field_id.to_string());
        row.push(self.reason.clone());
        row
    }
}
