//! Fixture builders shared by the integration tests. Remote payloads are
//! built as JSON and decoded through the same serde path the HTTP client uses.
#![allow(dead_code)]

use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;

use onspring_bulk_core::config::{FilterOptions, ProcessorConfig};
use onspring_bulk_core::contract::RecordApi;
use onspring_bulk_core::model::{Field, Page, Record};
use onspring_bulk_core::remote::{RemoteAccess, RetryPolicy};

pub fn field(id: i32, app_id: i32, name: &str, kind: &str) -> Field {
    serde_json::from_value(json!({ "id": id, "appId": app_id, "name": name, "type": kind }))
        .expect("field fixture")
}

pub fn field_with(id: i32, app_id: i32, name: &str, kind: &str, extra: Value) -> Field {
    let mut raw = json!({ "id": id, "appId": app_id, "name": name, "type": kind });
    if let (Some(raw), Some(extra)) = (raw.as_object_mut(), extra.as_object()) {
        raw.extend(extra.clone());
    }
    serde_json::from_value(raw).expect("field fixture")
}

pub fn reference_field(id: i32, app_id: i32, name: &str, referenced_app_id: i32) -> Field {
    field_with(
        id,
        app_id,
        name,
        "Reference",
        json!({ "referencedAppId": referenced_app_id, "multiplicity": "MultiSelect" }),
    )
}

pub fn record(app_id: i32, record_id: i32, field_data: Vec<Value>) -> Record {
    serde_json::from_value(json!({
        "appId": app_id,
        "recordId": record_id,
        "fieldData": field_data
    }))
        .expect("record fixture")
}

pub fn attachments(field_id: i32, files: &[(i32, &str)]) -> Value {
    let value: Vec<Value> = files
        .iter()
        .map(|(file_id, location)| {
            json!({
                "fileId": file_id,
                "storageLocation": location,
                "fileName": format!("file-{file_id}.pdf"),
                "notes": null
            })
        })
        .collect();
    json!({ "type": "AttachmentList", "fieldId": field_id, "value": value })
}

pub fn value(kind: &str, field_id: i32, value: Value) -> Value {
    json!({ "type": kind, "fieldId": field_id, "value": value })
}

pub fn page<T>(items: Vec<T>) -> Page<T> {
    page_of(items, 1, 1)
}

pub fn page_of<T>(items: Vec<T>, page_number: i32, total_pages: i32) -> Page<T> {
    Page {
        page_number,
        total_pages,
        total_records: items.len() as i32,
        items,
    }
}

/// Retries without waiting, so tests that exhaust attempts stay fast.
pub fn no_wait_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::ZERO,
    }
}

pub fn remote<C: RecordApi>(client: C) -> RemoteAccess<C> {
    RemoteAccess::new(client, no_wait_policy())
}

pub fn config(app_id: i32, filter: FilterOptions) -> ProcessorConfig {
    ProcessorConfig {
        app_id,
        output_dir: PathBuf::from("out"),
        concurrency: 3,
        filter,
    }
}
