//! # contract: interfaces between the core and its collaborators
//!
//! The core never talks HTTP, touches the disk, or draws progress bars
//! itself. It goes through the traits below:
//!
//! - [`RecordApi`]: one un-retried REST call per method. Retrying lives in
//!   [`crate::remote::RemoteAccess`], not in implementors.
//! - [`FileSink`]: persists a downloaded file, reporting success as a bool.
//! - [`ReportWriter`]: writes a [`Table`] to a path.
//! - [`Progress`]: observational tick counter.
//!
//! ## Mocking & Testing
//! `RecordApi`, `FileSink` and `ReportWriter` are annotated for `mockall`;
//! the mocks are exported under the default `test-export-mocks` feature so
//! integration tests can drive the workflows without a network.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::Path;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::model::{
    App, CreatedId, Field, FileContent, FileInfo, FileRequest, FileUpload, Page, PagingRequest,
    QueryRequest, Record, RecordUpdate, RecordsRequest, ReportData,
};
use crate::report::Table;

/// Failure below the HTTP status level: the request never produced a
/// usable response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("transport failure: {0}")]
    Other(String),
}

impl TransportError {
    /// Decode failures repeat on every attempt; everything else may be transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Decode(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// Outcome of a single REST call that reached the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub status: StatusCode,
    /// Present only when the status is a success.
    pub value: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(value: T) -> Self {
        Self::with_status(StatusCode::OK, value)
    }

    pub fn with_status(status: StatusCode, value: T) -> Self {
        ApiResponse {
            status,
            value: Some(value),
            message: None,
        }
    }

    pub fn failed(status: StatusCode, message: Option<String>) -> Self {
        ApiResponse {
            status,
            value: None,
            message,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, TransportError>;

/// Single-attempt access to the record platform's REST API.
///
/// Implementors map HTTP statuses into [`ApiResponse`] and transport-level
/// failures into [`TransportError`]; they never retry.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RecordApi: Send + Sync {
    /// List one page of apps visible to the API key.
    async fn get_apps(&self, paging: PagingRequest) -> ApiResult<Page<App>>;

    /// List one page of an app's field definitions.
    async fn get_fields(&self, app_id: i32, paging: PagingRequest) -> ApiResult<Page<Field>>;

    async fn get_field(&self, field_id: i32) -> ApiResult<Field>;

    /// One page of an app's records, restricted to the requested fields.
    async fn get_records(
        &self,
        request: &RecordsRequest,
        paging: PagingRequest,
    ) -> ApiResult<Page<Record>>;

    /// One page of records matching a filter expression.
    async fn query_records(
        &self,
        request: &QueryRequest,
        paging: PagingRequest,
    ) -> ApiResult<Page<Record>>;

    async fn get_report(&self, report_id: i32) -> ApiResult<ReportData>;

    /// The file's bytes together with its name and content type.
    async fn get_file(&self, file: &FileRequest) -> ApiResult<FileContent>;

    /// Name, type, notes and size of a file without reading its body.
    async fn get_file_info(&self, file: &FileRequest) -> ApiResult<FileInfo>;

    async fn save_file(&self, upload: &FileUpload) -> ApiResult<CreatedId>;

    async fn delete_file(&self, file: &FileRequest) -> ApiResult<()>;

    async fn update_record(&self, update: &RecordUpdate) -> ApiResult<CreatedId>;
}

/// Destination for downloaded files.
///
/// Local failures are logged by the implementor and reported as `false`.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FileSink: Send + Sync {
    async fn write_file(&self, path: &Path, file: &FileContent) -> bool;
}

#[derive(Debug, thiserror::Error)]
#[error("failed to write report {path}: {reason}")]
pub struct ReportError {
    pub path: String,
    pub reason: String,
}

/// Writes tabular output (CSV in the CLI).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ReportWriter: Send + Sync {
    fn write_report(&self, path: &Path, table: &Table) -> Result<(), ReportError>;
}

/// Observational progress reporting. Never affects control flow.
pub trait Progress: Send + Sync {
    fn start(&self, total: u64, label: &str);
    fn advance(&self, label: &str);
    fn finish(&self);
}

/// Progress sink that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl Progress for SilentProgress {
    fn start(&self, _total: u64, _label: &str) {}
    fn advance(&self, _label: &str) {}
    fn finish(&self) {}
}
