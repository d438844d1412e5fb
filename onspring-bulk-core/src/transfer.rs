//! # transfer: copy attachments between apps, possibly across instances
//!
//! A source record is copied when its process flag holds the "to process"
//! value. Its partner in the target app is the single record whose match
//! field equals the source record's match field. Every file of each mapped
//! source field is downloaded and re-uploaded to the mapped target field;
//! when all of a record's files made it across, the source flag is set to the
//! "processed" value.
//!
//! ## Validation (before any remote mutation)
//! - Both match fields must be single-valued: Text, AutoNumber, Date,
//!   Number, or a Formula whose output is not a list.
//! - The flag field must belong to the source app and be either a Text field
//!   or a single-select List field whose choices contain both flag values.
//! - Every mapped field must exist and hold files (Attachment or Image).
//!
//! Any violation ends the run with [`ProcessStatus::InvalidSettings`].
//!
//! ## Per-record failures
//! Empty match values, missing or ambiguous targets and failed copies are
//! logged and skipped; the batch continues. A transport failure that
//! outlasts every retry also only ends its own record: the error report is
//! written for the whole batch and the first such error is returned last.

use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use crate::config::{AttachmentTransferSettings, ProcessorConfig};
use crate::contract::{Progress, RecordApi, ReportWriter, TransportError};
use crate::discovery::{discover_file_requests, DiscoveryFilter};
use crate::model::{
    Field, FieldType, FieldValue, FileUpload, Multiplicity, PagingRequest, QueryRequest, Record,
    RecordUpdate,
};
use crate::remote::RemoteAccess;
use crate::report::{Table, TransferFailure};
use crate::scope::{resolve_record_scope, RecordScope};
use crate::status::ProcessStatus;

pub const TRANSFER_ERRORS_FILE: &str = "transfer_errors.csv";

/// A flag value as stored: list fields store the choice id, text fields the
/// text itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagValue {
    pub label: String,
    pub list_value_id: Option<String>,
}

impl FlagValue {
    fn stored(&self) -> &str {
        self.list_value_id.as_deref().unwrap_or(&self.label)
    }

    pub fn matches(&self, value: Option<&FieldValue>) -> bool {
        match value {
            Some(FieldValue::String(s)) | Some(FieldValue::Guid(s)) => {
                s.trim().eq_ignore_ascii_case(self.stored())
            }
            Some(FieldValue::GuidList(ids)) | Some(FieldValue::StringList(ids)) => {
                ids.iter().any(|id| id.eq_ignore_ascii_case(self.stored()))
            }
            _ => false,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::String(self.stored().to_string())
    }
}

/// Flag field and values after validation against the field definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFlags {
    pub field_id: i32,
    pub to_process: FlagValue,
    pub processed: FlagValue,
}

/// An attachment-field mapping after both fields were looked up.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMapping {
    pub source: Field,
    pub target: Field,
}

/// Outcome of one source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordOutcome {
    Transferred,
    Skipped,
    Failed,
}

fn resolve_flag_value(
    field: &Field,
    label: &str,
    list_value_id: Option<&str>,
) -> Option<FlagValue> {
    let label = label.trim();
    match &field.field_type {
        FieldType::Text if !label.is_empty() && list_value_id.is_none() => Some(FlagValue {
            label: label.to_string(),
            list_value_id: None,
        }),
        FieldType::List {
            multiplicity: Multiplicity::SingleSelect,
            values,
        } => {
            let choice = match list_value_id {
                Some(id) => values
                    .iter()
                    .find(|v| v.id.eq_ignore_ascii_case(id) && v.name.eq_ignore_ascii_case(label)),
                None => values.iter().find(|v| v.name.eq_ignore_ascii_case(label)),
            }?;
            Some(FlagValue {
                label: choice.name.clone(),
                list_value_id: Some(choice.id.clone()),
            })
        }
        _ => None,
    }
}

pub struct TransferProcessor<'a, S, T> {
    source: &'a RemoteAccess<S>,
    target: &'a RemoteAccess<T>,
    settings: &'a AttachmentTransferSettings,
    config: &'a ProcessorConfig,
    writer: &'a dyn ReportWriter,
    progress: &'a dyn Progress,
}

impl<'a, S: RecordApi, T: RecordApi> TransferProcessor<'a, S, T> {
    pub fn new(
        source: &'a RemoteAccess<S>,
        target: &'a RemoteAccess<T>,
        settings: &'a AttachmentTransferSettings,
        config: &'a ProcessorConfig,
        writer: &'a dyn ReportWriter,
        progress: &'a dyn Progress,
    ) -> Self {
        TransferProcessor {
            source,
            target,
            settings,
            config,
            writer,
            progress,
        }
    }

    /// `true` when both match fields exist in their apps and are single-valued.
    pub async fn validate_match_fields(&self) -> Result<bool, TransportError> {
        let source_field_id = self.settings.source_match_field_id;
        let target_field_id = self.settings.target_match_field_id;
        let checks = [
            (
                "source",
                self.source.get_field(source_field_id).await?,
                self.settings.source_app_id,
                source_field_id,
            ),
            (
                "target",
                self.target.get_field(target_field_id).await?,
                self.settings.target_app_id,
                target_field_id,
            ),
        ];
        for (side, field, app_id, field_id) in checks {
            let Some(field) = field else {
                error!(side, field_id, "[TRANSFER] Match field could not be retrieved");
                return Ok(false);
            };
            if field.app_id != app_id {
                error!(
                    side,
                    field_id,
                    app_id,
                    field_app_id = field.app_id,
                    "[TRANSFER] Match field belongs to another app"
                );
                return Ok(false);
            }
            if !field.is_supported_match_field() {
                error!(
                    side,
                    field_id,
                    field_type = ?field.field_type,
                    "[TRANSFER] Match field type is not supported"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Checks the process flag configuration against the flag field.
    pub async fn validate_flag_field(&self) -> Result<Option<ResolvedFlags>, TransportError> {
        let field_id = self.settings.process_flag_field_id;
        let Some(field) = self.source.get_field(field_id).await? else {
            error!(field_id, "[TRANSFER] Process flag field could not be retrieved");
            return Ok(None);
        };
        if field.app_id != self.settings.source_app_id {
            error!(
                field_id,
                field_app_id = field.app_id,
                "[TRANSFER] Process flag field is not in the source app"
            );
            return Ok(None);
        }

        let to_process = resolve_flag_value(
            &field,
            &self.settings.process_flag_value,
            self.settings.process_flag_list_value_id.as_deref(),
        );
        let processed = resolve_flag_value(
            &field,
            &self.settings.processed_flag_value,
            self.settings.processed_flag_list_value_id.as_deref(),
        );
        match (to_process, processed) {
            (Some(to_process), Some(processed))
                if !to_process.stored().eq_ignore_ascii_case(processed.stored()) =>
            {
                debug!(field_id, ?to_process, ?processed, "[TRANSFER] Process flag validated");
                Ok(Some(ResolvedFlags {
                    field_id,
                    to_process,
                    processed,
                }))
            }
            (Some(_), Some(_)) => {
                error!(field_id, "[TRANSFER] Process and processed flag values are identical");
                Ok(None)
            }
            _ => {
                error!(
                    field_id,
                    field_type = ?field.field_type,
                    process_value = %self.settings.process_flag_value,
                    processed_value = %self.settings.processed_flag_value,
                    "[TRANSFER] Process flag values do not fit the flag field"
                );
                Ok(None)
            }
        }
    }

    /// Looks up both fields of every attachment mapping.
    pub async fn resolve_mappings(&self) -> Result<Option<Vec<ResolvedMapping>>, TransportError> {
        if self.settings.attachment_field_mappings.is_empty() {
            error!("[TRANSFER] No attachment field mappings configured");
            return Ok(None);
        }
        let mut resolved = Vec::new();
        for mapping in &self.settings.attachment_field_mappings {
            let source = self.source.get_field(mapping.source_field_id).await?;
            let target = self.target.get_field(mapping.target_field_id).await?;
            match (source, target) {
                (Some(source), Some(target))
                    if source.is_file_field()
                        && target.is_file_field()
                        && source.app_id == self.settings.source_app_id
                        && target.app_id == self.settings.target_app_id =>
                {
                    resolved.push(ResolvedMapping { source, target });
                }
                (source, target) => {
                    error!(
                        source_field_id = mapping.source_field_id,
                        target_field_id = mapping.target_field_id,
                        source_type = ?source.map(|f| f.field_type),
                        target_type = ?target.map(|f| f.field_type),
                        "[TRANSFER] Attachment field mapping is invalid"
                    );
                    return Ok(None);
                }
            }
        }
        Ok(Some(resolved))
    }

    /// Source records in scope whose flag says they still need processing.
    pub async fn get_source_records_to_process(
        &self,
        flags: &ResolvedFlags,
        mappings: &[ResolvedMapping],
        scope: &RecordScope,
    ) -> Result<Vec<Record>, TransportError> {
        let mut field_ids = vec![self.settings.source_match_field_id, flags.field_id];
        field_ids.extend(mappings.iter().map(|m| m.source.id));
        let request = QueryRequest {
            app_id: self.settings.source_app_id,
            filter: format!(
                "{} eq '{}'",
                flags.field_id,
                flags.to_process.stored().replace('\'', "\\'")
            ),
            field_ids,
        };
        let records = self.source.query_records(&request).await?;
        Ok(records
            .into_iter()
            .filter(|r| scope.includes(r.record_id))
            .filter(|r| flags.to_process.matches(r.value(flags.field_id)))
            .collect())
    }

    /// The single target record matching `literal`, if there is exactly one.
    pub async fn find_target_record(&self, literal: &str) -> Result<Option<i32>, TransportError> {
        let request = QueryRequest {
            app_id: self.settings.target_app_id,
            filter: format!("{} eq {}", self.settings.target_match_field_id, literal),
            field_ids: vec![self.settings.target_match_field_id],
        };
        let paging = PagingRequest {
            page_number: 1,
            page_size: 2,
        };
        let Some(page) = self.target.query_records_page(&request, paging).await? else {
            return Ok(None);
        };
        match page.items.as_slice() {
            [only] => Ok(Some(only.record_id)),
            [] => Ok(None),
            _ => {
                warn!(
                    match_value = literal,
                    total = page.total_records,
                    "[TRANSFER] Match value is ambiguous in target app"
                );
                Ok(None)
            }
        }
    }

    async fn transfer_record(
        &self,
        record: &Record,
        flags: &ResolvedFlags,
        mappings: &[ResolvedMapping],
        failures: &mut Vec<TransferFailure>,
    ) -> Result<RecordOutcome, TransportError> {
        let record_id = record.record_id;
        let Some(literal) = record
            .value(self.settings.source_match_field_id)
            .and_then(FieldValue::filter_literal)
        else {
            warn!(record_id, "[TRANSFER] Match field is empty, skipping record");
            return Ok(RecordOutcome::Skipped);
        };
        let Some(target_record_id) = self.find_target_record(&literal).await? else {
            warn!(
                record_id,
                match_value = %literal,
                "[TRANSFER] No single target record matches, skipping record"
            );
            return Ok(RecordOutcome::Skipped);
        };

        let failed_before = failures.len();
        for mapping in mappings {
            // A mapped field is copied as a whole, so the aggregate check
            // only ever sees that one field.
            let requests = discover_file_requests(
                std::slice::from_ref(record),
                std::slice::from_ref(&mapping.source),
                std::slice::from_ref(&mapping.source),
                &DiscoveryFilter::default(),
            );
            for request in requests {
                let fail = |reason: String| TransferFailure {
                    file: request.clone(),
                    target_record_id,
                    target_field_id: mapping.target.id,
                    reason,
                };
                let content = match self.source.get_file(&request).await {
                    Ok(Some(content)) => content,
                    Ok(None) => {
                        warn!(
                            record_id,
                            file_id = request.file_id,
                            "[TRANSFER] Source file could not be retrieved"
                        );
                        failures.push(fail("download failed".to_string()));
                        continue;
                    }
                    Err(e) => {
                        failures.push(fail(format!("download failed: {e}")));
                        return Err(e);
                    }
                };
                let upload = FileUpload {
                    record_id: target_record_id,
                    field_id: mapping.target.id,
                    file_name: content.file_name,
                    content_type: content.content_type,
                    notes: record
                        .attachment(request.field_id, request.file_id)
                        .and_then(|a| a.notes.clone()),
                    content: content.content,
                };
                match self.target.save_file(&upload).await {
                    Ok(Some(created)) => info!(
                        record_id,
                        target_record_id,
                        file_id = request.file_id,
                        new_file_id = created.id,
                        "[TRANSFER] Copied file"
                    ),
                    Ok(None) => {
                        warn!(
                            record_id,
                            target_record_id,
                            file_id = request.file_id,
                            "[TRANSFER] File could not be saved to target"
                        );
                        failures.push(fail("upload failed".to_string()));
                    }
                    Err(e) => {
                        failures.push(fail(format!("upload failed: {e}")));
                        return Err(e);
                    }
                }
            }
        }

        if failures.len() > failed_before {
            return Ok(RecordOutcome::Failed);
        }

        let update = RecordUpdate {
            app_id: self.settings.source_app_id,
            record_id,
            fields: HashMap::from([(flags.field_id.to_string(), flags.processed.to_json())]),
        };
        match self.source.update_record(&update).await? {
            Some(_) => {
                info!(record_id, target_record_id, "[TRANSFER] Record transferred");
                Ok(RecordOutcome::Transferred)
            }
            None => {
                error!(record_id, "[TRANSFER] Files copied but process flag could not be updated");
                Ok(RecordOutcome::Failed)
            }
        }
    }

    pub async fn run(&self) -> Result<ProcessStatus, TransportError> {
        self.settings.trace_loaded();
        info!("[TRANSFER] Starting attachment transfer");

        if !self.validate_match_fields().await? {
            return Ok(ProcessStatus::InvalidSettings);
        }
        let Some(flags) = self.validate_flag_field().await? else {
            return Ok(ProcessStatus::InvalidSettings);
        };
        let Some(mappings) = self.resolve_mappings().await? else {
            return Ok(ProcessStatus::InvalidSettings);
        };

        let Some(scope) = resolve_record_scope(self.source, &self.config.filter).await? else {
            return Ok(ProcessStatus::Failed);
        };
        if scope.is_empty() {
            warn!("[TRANSFER] Record filter matched no records");
            return Ok(ProcessStatus::NoRecordsFound);
        }

        let records = self
            .get_source_records_to_process(&flags, &mappings, &scope)
            .await?;
        if records.is_empty() {
            warn!("[TRANSFER] No source records need processing");
            return Ok(ProcessStatus::NoRecordsFound);
        }
        info!(records = records.len(), "[TRANSFER] Found records to process");

        self.progress.start(records.len() as u64, "Transferring records");
        let mut failures = Vec::new();
        let mut counts: HashMap<RecordOutcome, usize> = HashMap::new();
        let mut transport_error = None;
        for record in &records {
            self.progress.advance(&format!("record {}", record.record_id));
            let outcome = match self
                .transfer_record(record, &flags, &mappings, &mut failures)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(
                        record_id = record.record_id,
                        error = %e,
                        "[TRANSFER] Record aborted after repeated transport failures"
                    );
                    transport_error.get_or_insert(e);
                    RecordOutcome::Failed
                }
            };
            *counts.entry(outcome).or_default() += 1;
        }
        self.progress.finish();

        if !failures.is_empty() {
            let path = self.config.output_dir.join(TRANSFER_ERRORS_FILE);
            if let Err(e) = self.writer.write_report(&path, &Table::from_rows(&failures)) {
                error!(
                    path = %path.display(),
                    error = %e,
                    "[TRANSFER] Failed to write error report"
                );
            }
        }
        info!(
            transferred = counts.get(&RecordOutcome::Transferred).copied().unwrap_or(0),
            skipped = counts.get(&RecordOutcome::Skipped).copied().unwrap_or(0),
            failed = counts.get(&RecordOutcome::Failed).copied().unwrap_or(0),
            "[TRANSFER] Finished"
        );
        match transport_error {
            Some(e) => Err(e),
            None => Ok(ProcessStatus::Success),
        }
    }
}
