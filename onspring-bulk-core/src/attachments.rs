//! # attachments: bulk download, delete and size report of file fields
//!
//! All three workflows share the same front half:
//!
//! 1. Fetch the app's file fields (attachment and image), optionally limited
//!    to a field subset. None → [`ProcessStatus::NoFieldsFound`]. Every
//!    attachment field of the app is still fetched so the "All Attachments"
//!    aggregate is recognised against the whole app.
//! 2. Resolve the record scope (literal ids ∪ report rows).
//! 3. Page through the app's records and run attachment discovery on each
//!    page. No requests → [`ProcessStatus::NoFilesFound`].
//!
//! They differ in what happens per file:
//! - **download**: sequential fetch + local write; failures go to
//!   `download_errors.csv` in request order.
//! - **delete**: bounded fan-out of deletes; failures go to
//!   `delete_errors.csv`. Best effort, not transactional.
//! - **report**: bounded fan-out of metadata fetches; a failed fetch becomes a
//!   placeholder row instead of an error. Written to `attachment_report.csv`.
//!
//! Only transport failures that survived every retry escape as `Err`. Such a
//! failure is recorded like any other failed file and the batch carries on;
//! the error is returned once the failure report has been written.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::config::ProcessorConfig;
use crate::contract::{FileSink, Progress, RecordApi, ReportWriter, TransportError};
use crate::discovery::{discover_file_requests, DiscoveryFilter};
use crate::fanout::fan_out;
use crate::model::{Field, FileRequest, RecordsRequest};
use crate::paging::for_each_page;
use crate::remote::RemoteAccess;
use crate::report::{DownloadFailure, FileInfoResult, Table, ToRow};
use crate::scope::{resolve_record_scope, RecordScope};
use crate::status::ProcessStatus;

pub const DOWNLOAD_ERRORS_FILE: &str = "download_errors.csv";
pub const DELETE_ERRORS_FILE: &str = "delete_errors.csv";
pub const ATTACHMENT_REPORT_FILE: &str = "attachment_report.csv";

/// Replaces characters that are unsafe in file names.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// The file fields a workflow reads from, and every attachment field of the
/// app. The second list only feeds the "All Attachments" check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileFields {
    pub selected: Vec<Field>,
    pub attachments: Vec<Field>,
}

impl FileFields {
    /// Field ids to request record values for: the selected fields first,
    /// then any attachment field not already among them.
    pub fn request_field_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.selected.iter().map(|f| f.id).collect();
        for field in &self.attachments {
            if !ids.contains(&field.id) {
                ids.push(field.id);
            }
        }
        ids
    }
}

/// Success once the failure report is out, or the first transport error
/// that outlasted its retries.
fn finished(transport_error: Option<TransportError>) -> Result<ProcessStatus, TransportError> {
    match transport_error {
        Some(e) => Err(e),
        None => Ok(ProcessStatus::Success),
    }
}

pub struct AttachmentsProcessor<'a, C> {
    remote: &'a RemoteAccess<C>,
    config: &'a ProcessorConfig,
    sink: &'a dyn FileSink,
    writer: &'a dyn ReportWriter,
    progress: &'a dyn Progress,
}

impl<'a, C: RecordApi> AttachmentsProcessor<'a, C> {
    pub fn new(
        remote: &'a RemoteAccess<C>,
        config: &'a ProcessorConfig,
        sink: &'a dyn FileSink,
        writer: &'a dyn ReportWriter,
        progress: &'a dyn Progress,
    ) -> Self {
        AttachmentsProcessor {
            remote,
            config,
            sink,
            writer,
            progress,
        }
    }

    /// Attachment and image fields of the app, limited to the configured
    /// field subset when one is given, plus every attachment field of the app.
    pub async fn get_file_fields(&self) -> Result<FileFields, TransportError> {
        let wanted: HashSet<i32> = self.config.filter.field_ids.iter().copied().collect();
        let fields = self.remote.get_fields(self.config.app_id).await?;
        let selected = fields
            .iter()
            .filter(|f| f.is_file_field())
            .filter(|f| wanted.is_empty() || wanted.contains(&f.id))
            .cloned()
            .collect();
        let attachments = fields.into_iter().filter(|f| f.is_attachment()).collect();
        Ok(FileFields {
            selected,
            attachments,
        })
    }

    /// Runs attachment discovery over every page of the app's records.
    pub async fn get_file_requests(
        &self,
        fields: &FileFields,
        scope: &RecordScope,
    ) -> Result<Vec<FileRequest>, TransportError> {
        let request = RecordsRequest {
            app_id: self.config.app_id,
            field_ids: fields.request_field_ids(),
        };
        let filter = DiscoveryFilter {
            record_ids: scope.record_ids(),
            file_ids: self.config.filter.file_id_set(),
        };

        let mut requests = Vec::new();
        for_each_page(
            "records",
            self.remote.page_size(),
            |paging| self.remote.get_records_page(&request, paging),
            |records| {
                requests.extend(discover_file_requests(
                    &records,
                    &fields.selected,
                    &fields.attachments,
                    &filter,
                ))
            },
        )
        .await?;
        Ok(requests)
    }

    async fn prepare(
        &self,
        workflow: &'static str,
    ) -> Result<ControlFlow<ProcessStatus, Vec<FileRequest>>, TransportError> {
        let fields = self.get_file_fields().await?;
        if fields.selected.is_empty() {
            warn!(workflow, app_id = self.config.app_id, "No file fields found");
            return Ok(ControlFlow::Break(ProcessStatus::NoFieldsFound));
        }
        info!(
            workflow,
            app_id = self.config.app_id,
            fields = fields.selected.len(),
            "Found file fields"
        );

        let Some(scope) = resolve_record_scope(self.remote, &self.config.filter).await? else {
            return Ok(ControlFlow::Break(ProcessStatus::Failed));
        };
        if scope.is_empty() {
            warn!(workflow, app_id = self.config.app_id, "Record filter matched no records");
            return Ok(ControlFlow::Break(ProcessStatus::NoRecordsFound));
        }

        let requests = self.get_file_requests(&fields, &scope).await?;
        if requests.is_empty() {
            warn!(workflow, app_id = self.config.app_id, "No files found");
            return Ok(ControlFlow::Break(ProcessStatus::NoFilesFound));
        }
        info!(workflow, app_id = self.config.app_id, files = requests.len(), "Found files");
        Ok(ControlFlow::Continue(requests))
    }

    fn file_path(&self, request: &FileRequest, file_name: &str) -> PathBuf {
        self.config
            .output_dir
            .join("files")
            .join(request.record_id.to_string())
            .join(request.field_id.to_string())
            .join(format!("{}-{}", request.file_id, sanitize_file_name(file_name)))
    }

    fn write_table<R: ToRow>(&self, file_name: &str, rows: &[R]) {
        let path = self.config.output_dir.join(file_name);
        match self.writer.write_report(&path, &Table::from_rows(rows)) {
            Ok(()) => info!(path = %path.display(), rows = rows.len(), "Wrote report"),
            Err(e) => error!(path = %path.display(), error = %e, "Failed to write report"),
        }
    }

    /// Downloads every discovered file into the output directory.
    pub async fn download(&self) -> Result<ProcessStatus, TransportError> {
        info!(app_id = self.config.app_id, "[DOWNLOAD] Starting attachment download");
        let requests = match self.prepare("download").await? {
            ControlFlow::Continue(requests) => requests,
            ControlFlow::Break(status) => return Ok(status),
        };

        self.progress.start(requests.len() as u64, "Downloading files");
        let mut failures = Vec::new();
        let mut transport_error = None;
        for request in &requests {
            self.progress.advance(&format!("file {}", request.file_id));
            let content = match self.remote.get_file(request).await {
                Ok(Some(content)) => content,
                Ok(None) => {
                    warn!(
                        record_id = request.record_id,
                        field_id = request.field_id,
                        file_id = request.file_id,
                        "[DOWNLOAD] File could not be retrieved"
                    );
                    failures.push(DownloadFailure::unretrieved(request.clone()));
                    continue;
                }
                Err(e) => {
                    error!(
                        record_id = request.record_id,
                        field_id = request.field_id,
                        file_id = request.file_id,
                        error = %e,
                        "[DOWNLOAD] File request failed"
                    );
                    failures.push(DownloadFailure::unretrieved(request.clone()));
                    transport_error.get_or_insert(e);
                    continue;
                }
            };

            let path = self.file_path(request, &content.file_name);
            if self.sink.write_file(&path, &content).await {
                info!(
                    record_id = request.record_id,
                    field_id = request.field_id,
                    file_id = request.file_id,
                    path = %path.display(),
                    "[DOWNLOAD] Saved file"
                );
            } else {
                warn!(
                    record_id = request.record_id,
                    file_id = request.file_id,
                    path = %path.display(),
                    "[DOWNLOAD] File could not be saved"
                );
                failures.push(DownloadFailure {
                    file: request.clone(),
                    file_name: Some(content.file_name.clone()),
                    file_path: Some(path),
                });
            }
        }
        self.progress.finish();

        if !failures.is_empty() {
            warn!(failed = failures.len(), total = requests.len(), "[DOWNLOAD] Some files failed");
            self.write_table(DOWNLOAD_ERRORS_FILE, &failures);
        }
        info!(downloaded = requests.len() - failures.len(), "[DOWNLOAD] Finished");
        finished(transport_error)
    }

    /// Deletes every discovered file. A failed delete is logged and reported;
    /// the rest of the batch carries on.
    pub async fn delete(&self) -> Result<ProcessStatus, TransportError> {
        info!(app_id = self.config.app_id, "[DELETE] Starting attachment delete");
        let requests = match self.prepare("delete").await? {
            ControlFlow::Continue(requests) => requests,
            ControlFlow::Break(status) => return Ok(status),
        };

        let total = requests.len();
        self.progress.start(total as u64, "Deleting files");
        let remote = self.remote;
        let progress = self.progress;
        let outcomes = fan_out(requests, self.config.concurrency, |request| async move {
            let deleted = remote.delete_file(&request).await;
            progress.advance(&format!("file {}", request.file_id));
            (request, deleted)
        })
        .await;
        self.progress.finish();

        let mut failures = Vec::new();
        let mut transport_error = None;
        for (request, deleted) in outcomes {
            match deleted {
                Ok(true) => info!(
                    record_id = request.record_id,
                    field_id = request.field_id,
                    file_id = request.file_id,
                    "[DELETE] Deleted file"
                ),
                Ok(false) => {
                    warn!(
                        record_id = request.record_id,
                        field_id = request.field_id,
                        file_id = request.file_id,
                        "[DELETE] File could not be deleted"
                    );
                    failures.push(request);
                }
                Err(e) => {
                    error!(
                        record_id = request.record_id,
                        field_id = request.field_id,
                        file_id = request.file_id,
                        error = %e,
                        "[DELETE] Delete request failed"
                    );
                    failures.push(request);
                    transport_error.get_or_insert(e);
                }
            }
        }

        if !failures.is_empty() {
            failures.sort();
            self.write_table(DELETE_ERRORS_FILE, &failures);
        }
        info!(deleted = total - failures.len(), failed = failures.len(), "[DELETE] Finished");
        finished(transport_error)
    }

    /// Writes name and size of every discovered file without downloading it.
    pub async fn report(&self) -> Result<ProcessStatus, TransportError> {
        info!(app_id = self.config.app_id, "[REPORT] Starting attachment report");
        let requests = match self.prepare("report").await? {
            ControlFlow::Continue(requests) => requests,
            ControlFlow::Break(status) => return Ok(status),
        };

        self.progress.start(requests.len() as u64, "Fetching file info");
        let remote = self.remote;
        let progress = self.progress;
        let mut results = fan_out(requests, self.config.concurrency, |request| async move {
            let info = remote.get_file_info(&request).await;
            progress.advance(&format!("file {}", request.file_id));
            match info {
                Ok(Some(info)) => FileInfoResult::new(request, info.name, info.size),
                Ok(None) => {
                    warn!(
                        record_id = request.record_id,
                        field_id = request.field_id,
                        file_id = request.file_id,
                        "[REPORT] File info could not be retrieved"
                    );
                    FileInfoResult::unavailable(request)
                }
                Err(e) => {
                    error!(
                        record_id = request.record_id,
                        file_id = request.file_id,
                        error = %e,
                        "[REPORT] File info request failed"
                    );
                    FileInfoResult::unavailable(request)
                }
            }
        })
        .await;
        self.progress.finish();

        results.sort_by(|a, b| a.file.cmp(&b.file));
        self.write_table(ATTACHMENT_REPORT_FILE, &results);
        info!(files = results.len(), "[REPORT] Finished");
        Ok(ProcessStatus::Success)
    }
}
