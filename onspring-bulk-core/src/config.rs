use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info};

/// Optional narrowing of what a workflow touches. Empty lists mean "all".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub field_ids: Vec<i32>,
    pub record_ids: Vec<i32>,
    pub report_id: Option<i32>,
    pub file_ids: Vec<i32>,
}

impl FilterOptions {
    pub fn file_id_set(&self) -> Option<HashSet<i32>> {
        if self.file_ids.is_empty() {
            None
        } else {
            Some(self.file_ids.iter().copied().collect())
        }
    }
}

/// Settings shared by every workflow, built once at startup.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub app_id: i32,
    pub output_dir: PathBuf,
    /// Ceiling of simultaneously running per-file operations.
    pub concurrency: usize,
    pub filter: FilterOptions,
}

impl ProcessorConfig {
    pub fn trace_loaded(&self) {
        info!(
            app_id = self.app_id,
            output_dir = %self.output_dir.display(),
            concurrency = self.concurrency,
            "Loaded ProcessorConfig"
        );
        debug!(?self, "ProcessorConfig loaded (full debug)");
    }
}

/// Connection details of one instance. The API key usually comes from the
/// environment instead of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSettings {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub source_field_id: i32,
    pub target_field_id: i32,
}

/// Everything a cross-app attachment transfer needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentTransferSettings {
    #[serde(default)]
    pub source_instance: InstanceSettings,
    #[serde(default)]
    pub target_instance: InstanceSettings,
    pub source_app_id: i32,
    pub target_app_id: i32,
    pub source_match_field_id: i32,
    pub target_match_field_id: i32,
    pub attachment_field_mappings: Vec<FieldMapping>,
    pub process_flag_field_id: i32,
    /// Flag value marking a source record as waiting for transfer.
    pub process_flag_value: String,
    /// Flag value written back once a record's files were copied.
    pub processed_flag_value: String,
    pub process_flag_list_value_id: Option<String>,
    pub processed_flag_list_value_id: Option<String>,
}

impl AttachmentTransferSettings {
    pub fn trace_loaded(&self) {
        info!(
            source_app_id = self.source_app_id,
            target_app_id = self.target_app_id,
            source_match_field_id = self.source_match_field_id,
            target_match_field_id = self.target_match_field_id,
            mappings = self.attachment_field_mappings.len(),
            process_flag_field_id = self.process_flag_field_id,
            "Loaded AttachmentTransferSettings"
        );
    }
}
