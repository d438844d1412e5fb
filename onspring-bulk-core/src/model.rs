//! # model: data shapes exchanged with the remote platform
//!
//! Apps, fields, records and the file-level values the workflows act on.
//!
//! Remote payloads are camelCase JSON. Fields and records arrive with a
//! string `type` discriminator and a loosely typed value; both are decoded
//! into closed enums ([`FieldType`], [`FieldValue`]) so discovery code can
//! match exhaustively instead of inspecting JSON at runtime.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An app (table-like container) in the remote platform.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub id: i32,
    pub name: String,
}

/// Paging cursor sent with every listing request. Page numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingRequest {
    pub page_number: i32,
    pub page_size: i32,
}

/// One page of a remote listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub page_number: i32,
    #[serde(default)]
    pub total_pages: i32,
    #[serde(default)]
    pub total_records: i32,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    SingleSelect,
    MultiSelect,
}

impl From<Option<&str>> for Multiplicity {
    fn from(raw: Option<&str>) -> Self {
        match raw {
            Some("MultiSelect") => Multiplicity::MultiSelect,
            _ => Multiplicity::SingleSelect,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormulaOutputType {
    Text,
    Numeric,
    DateAndTime,
    ListValue,
    Other(String),
}

impl FormulaOutputType {
    pub fn is_list_valued(&self) -> bool {
        matches!(self, FormulaOutputType::ListValue)
    }
}

impl From<&str> for FormulaOutputType {
    fn from(raw: &str) -> Self {
        match raw {
            "Text" => FormulaOutputType::Text,
            "Numeric" => FormulaOutputType::Numeric,
            "DateAndTime" => FormulaOutputType::DateAndTime,
            "ListValue" => FormulaOutputType::ListValue,
            other => FormulaOutputType::Other(other.to_string()),
        }
    }
}

/// One choice of a list field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListValue {
    pub id: String,
    pub name: String,
}

/// Field type, with the extra data some types carry.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Attachment,
    Image,
    Reference {
        referenced_app_id: i32,
        multiplicity: Multiplicity,
    },
    Text,
    Number,
    Date,
    AutoNumber,
    Formula {
        output_type: FormulaOutputType,
    },
    List {
        multiplicity: Multiplicity,
        values: Vec<ListValue>,
    },
    Other(String),
}

/// A schema field of an app.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawField")]
pub struct Field {
    pub id: i32,
    pub app_id: i32,
    pub name: String,
    pub field_type: FieldType,
}

impl Field {
    pub fn is_attachment(&self) -> bool {
        matches!(self.field_type, FieldType::Attachment)
    }

    /// Attachment and image fields hold files.
    pub fn is_file_field(&self) -> bool {
        matches!(self.field_type, FieldType::Attachment | FieldType::Image)
    }

    pub fn references_app(&self, app_id: i32) -> bool {
        matches!(
            self.field_type,
            FieldType::Reference { referenced_app_id, .. } if referenced_app_id == app_id
        )
    }

    /// Whether a record can be matched on this field by plain equality.
    pub fn is_supported_match_field(&self) -> bool {
        match &self.field_type {
            FieldType::Text | FieldType::AutoNumber | FieldType::Date | FieldType::Number => true,
            FieldType::Formula { output_type } => !output_type.is_list_valued(),
            _ => false,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawField {
    id: i32,
    #[serde(default)]
    app_id: i32,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    referenced_app_id: Option<i32>,
    multiplicity: Option<String>,
    output_type: Option<String>,
    #[serde(default)]
    values: Vec<ListValue>,
}

impl From<RawField> for Field {
    fn from(raw: RawField) -> Self {
        let multiplicity = Multiplicity::from(raw.multiplicity.as_deref());
        let field_type = match raw.kind.as_str() {
            "Attachment" => FieldType::Attachment,
            "Image" => FieldType::Image,
            "Reference" => match raw.referenced_app_id {
                Some(referenced_app_id) => FieldType::Reference {
                    referenced_app_id,
                    multiplicity,
                },
                None => FieldType::Other(raw.kind.clone()),
            },
            "Text" => FieldType::Text,
            "Number" => FieldType::Number,
            "Date" => FieldType::Date,
            "AutoNumber" => FieldType::AutoNumber,
            "Formula" => FieldType::Formula {
                output_type: raw
                    .output_type
                    .as_deref()
                    .map(FormulaOutputType::from)
                    .unwrap_or(FormulaOutputType::Other(String::new())),
            },
            "List" => FieldType::List {
                multiplicity,
                values: raw.values,
            },
            other => FieldType::Other(other.to_string()),
        };
        Field {
            id: raw.id,
            app_id: raw.app_id,
            name: raw.name,
            field_type,
        }
    }
}

/// Where an attachment's bytes live. Only internal files can be fetched
/// through the file endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum StorageLocation {
    Internal,
    External(String),
}

impl From<String> for StorageLocation {
    fn from(raw: String) -> Self {
        if raw == "Internal" {
            StorageLocation::Internal
        } else {
            StorageLocation::External(raw)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDescriptor {
    pub file_id: i32,
    pub storage_location: StorageLocation,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AttachmentDescriptor {
    pub fn is_internal(&self) -> bool {
        self.storage_location == StorageLocation::Internal
    }
}

/// A record's value for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Decimal(f64),
    String(String),
    Date(String),
    Guid(String),
    IntegerList(Vec<i64>),
    StringList(Vec<String>),
    GuidList(Vec<String>),
    AttachmentList(Vec<AttachmentDescriptor>),
    FileList(Vec<i32>),
    Other(serde_json::Value),
}

impl FieldValue {
    /// Renders the value as a literal for an equality query filter.
    /// Empty and multi-valued values have no literal.
    pub fn filter_literal(&self) -> Option<String> {
        match self {
            FieldValue::Integer(n) => Some(n.to_string()),
            FieldValue::Decimal(d) => Some(d.to_string()),
            FieldValue::String(s) | FieldValue::Date(s) | FieldValue::Guid(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(format!("'{}'", trimmed.replace('\'', "\\'")))
                }
            }
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFieldData {
    #[serde(rename = "type")]
    kind: String,
    field_id: i32,
    #[serde(default)]
    value: serde_json::Value,
}

impl RawFieldData {
    fn into_value(self) -> (i32, FieldValue) {
        use serde_json::from_value;

        let raw = self.value.clone();
        let decoded = match self.kind.as_str() {
            "Integer" => from_value(self.value).map(FieldValue::Integer),
            "Decimal" => from_value(self.value).map(FieldValue::Decimal),
            "String" => from_value(self.value).map(FieldValue::String),
            "Date" => from_value(self.value).map(FieldValue::Date),
            "Guid" => from_value(self.value).map(FieldValue::Guid),
            "IntegerList" => from_value(self.value).map(FieldValue::IntegerList),
            "StringList" => from_value(self.value).map(FieldValue::StringList),
            "GuidList" => from_value(self.value).map(FieldValue::GuidList),
            "AttachmentList" => from_value(self.value).map(FieldValue::AttachmentList),
            "FileList" => from_value(self.value).map(FieldValue::FileList),
            _ => Ok(FieldValue::Other(self.value)),
        };
        let value = decoded.unwrap_or_else(|e| {
            tracing::debug!(
                field_id = self.field_id,
                kind = %self.kind,
                error = %e,
                "Undecodable field value kept as raw JSON"
            );
            FieldValue::Other(raw)
        });
        (self.field_id, value)
    }
}

/// A row of an app. Values are keyed by field id.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawRecord")]
pub struct Record {
    pub app_id: i32,
    pub record_id: i32,
    pub values: HashMap<i32, FieldValue>,
}

impl Record {
    pub fn value(&self, field_id: i32) -> Option<&FieldValue> {
        self.values.get(&field_id)
    }

    /// Looks up one attachment descriptor of an attachment field.
    pub fn attachment(&self, field_id: i32, file_id: i32) -> Option<&AttachmentDescriptor> {
        match self.value(field_id) {
            Some(FieldValue::AttachmentList(list)) => list.iter().find(|a| a.file_id == file_id),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    #[serde(default)]
    app_id: i32,
    record_id: i32,
    #[serde(default)]
    field_data: Vec<RawFieldData>,
}

impl From<RawRecord> for Record {
    fn from(raw: RawRecord) -> Self {
        Record {
            app_id: raw.app_id,
            record_id: raw.record_id,
            values: raw
                .field_data
                .into_iter()
                .map(RawFieldData::into_value)
                .collect(),
        }
    }
}

/// Tabular result of a saved report.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<ReportRow>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub record_id: i32,
    #[serde(default)]
    pub cells: Vec<serde_json::Value>,
}

/// Request for a page of an app's records restricted to some fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordsRequest {
    pub app_id: i32,
    pub field_ids: Vec<i32>,
}

/// Request for a page of records matching a filter expression,
/// e.g. `"123 eq 'Ready'"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub app_id: i32,
    pub filter: String,
    pub field_ids: Vec<i32>,
}

/// Identifies one file to act on.
///
/// This is the identity shared by every file-level result: richer results
/// embed it by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileRequest {
    pub record_id: i32,
    pub field_id: i32,
    pub field_name: String,
    pub file_id: i32,
}

/// Bytes and headers of a downloaded file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileContent {
    pub file_name: String,
    pub content_type: Option<String>,
    pub content: Vec<u8>,
}

/// File metadata, fetched without the file body.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub name: String,
    pub content_type: Option<String>,
    pub notes: Option<String>,
    pub size: u64,
}

/// A file to attach to a record's field.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub record_id: i32,
    pub field_id: i32,
    pub file_name: String,
    pub content_type: Option<String>,
    pub notes: Option<String>,
    pub content: Vec<u8>,
}

/// Acknowledgement of a created or updated resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CreatedId {
    pub id: i32,
}

/// New values for some fields of one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
    pub app_id: i32,
    pub record_id: i32,
    pub fields: HashMap<String, serde_json::Value>,
}

/// A record of one app pointing at a record of the target app.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordReference {
    pub source_app_id: i32,
    pub source_app_name: String,
    pub source_field_id: i32,
    pub source_field_name: String,
    pub source_record_id: i32,
    pub target_app_id: i32,
    pub target_record_id: i32,
}
