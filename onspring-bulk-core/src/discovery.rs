//! # discovery: turning pages of records into work items
//!
//! - [`discover_file_requests`]: one [`FileRequest`] per retrievable file held
//!   by the file fields of each record.
//! - [`discover_references`]: one [`RecordReference`] per reference value that
//!   points at a searched target record.
//!
//! Both operate on a single page at a time so callers can stream pages from
//! the pagination driver without materialising a whole app.
//!
//! ## "All Attachments" fields
//! Apps with several attachment fields often carry an aggregate field that
//! repeats every attachment of the record. When an attachment field's file
//! ids are exactly the union of all the app's attachment fields on the
//! record, it is treated as that aggregate and contributes nothing. Only
//! exact set equality triggers this; partial overlaps are left alone.
//!
//! The union always spans every attachment field of the app, even when the
//! caller only asks for a subset of fields, so records must be fetched with
//! the values of all of them.

use std::collections::{BTreeSet, HashSet};
use tracing::{debug, trace};

use crate::model::{App, Field, FieldType, FieldValue, FileRequest, Record, RecordReference};

/// Optional allow-lists applied during discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryFilter {
    pub record_ids: Option<HashSet<i32>>,
    pub file_ids: Option<HashSet<i32>>,
}

impl DiscoveryFilter {
    fn allows_record(&self, record_id: i32) -> bool {
        self.record_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&record_id))
    }

    fn allows_file(&self, file_id: i32) -> bool {
        self.file_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&file_id))
    }
}

fn attachment_ids(value: Option<&FieldValue>) -> BTreeSet<i32> {
    match value {
        Some(FieldValue::AttachmentList(list)) => list.iter().map(|a| a.file_id).collect(),
        _ => BTreeSet::new(),
    }
}

/// Extracts the file requests of one page of records.
///
/// `fields` are the file fields that emit requests. `app_fields` are all
/// fields of the app; its attachment fields decide which field is the
/// "All Attachments" aggregate.
pub fn discover_file_requests(
    records: &[Record],
    fields: &[Field],
    app_fields: &[Field],
    filter: &DiscoveryFilter,
) -> Vec<FileRequest> {
    let attachment_fields: Vec<&Field> = app_fields.iter().filter(|f| f.is_attachment()).collect();
    let check_aggregate = attachment_fields.len() > 1;
    let mut requests = Vec::new();

    for record in records {
        if !filter.allows_record(record.record_id) {
            continue;
        }

        let union: BTreeSet<i32> = if check_aggregate {
            attachment_fields
                .iter()
                .flat_map(|f| attachment_ids(record.value(f.id)))
                .collect()
        } else {
            BTreeSet::new()
        };

        for field in fields {
            let Some(value) = record.value(field.id) else {
                continue;
            };
            let request = |file_id: i32| FileRequest {
                record_id: record.record_id,
                field_id: field.id,
                field_name: field.name.clone(),
                file_id,
            };

            match (&field.field_type, value) {
                (FieldType::Attachment, FieldValue::AttachmentList(attachments)) => {
                    if check_aggregate && attachment_ids(Some(value)) == union {
                        debug!(
                            record_id = record.record_id,
                            field_id = field.id,
                            "Skipping aggregate attachment field"
                        );
                        continue;
                    }
                    for attachment in attachments {
                        if !attachment.is_internal() {
                            trace!(
                                record_id = record.record_id,
                                field_id = field.id,
                                file_id = attachment.file_id,
                                location = ?attachment.storage_location,
                                "Skipping externally stored attachment"
                            );
                            continue;
                        }
                        if filter.allows_file(attachment.file_id) {
                            requests.push(request(attachment.file_id));
                        }
                    }
                }
                (FieldType::Image, FieldValue::FileList(file_ids)) => {
                    requests.extend(
                        file_ids
                            .iter()
                            .copied()
                            .filter(|id| filter.allows_file(*id))
                            .map(request),
                    );
                }
                _ => {}
            }
        }
    }

    requests
}

/// Finds reference values in `records` that point at one of `target_ids`.
///
/// `reference_fields` are the source app's reference fields that target
/// `target_app_id`; a multi-valued field matching two targets yields two
/// references.
pub fn discover_references(
    records: &[Record],
    source_app: &App,
    reference_fields: &[Field],
    target_app_id: i32,
    target_ids: &HashSet<i32>,
) -> Vec<RecordReference> {
    let mut references = Vec::new();

    for record in records {
        for field in reference_fields {
            let matched: Vec<i32> = match record.value(field.id) {
                Some(FieldValue::Integer(id)) => i32::try_from(*id)
                    .ok()
                    .filter(|id| target_ids.contains(id))
                    .into_iter()
                    .collect(),
                Some(FieldValue::IntegerList(ids)) => ids
                    .iter()
                    .filter_map(|id| i32::try_from(*id).ok())
                    .filter(|id| target_ids.contains(id))
                    .collect(),
                _ => continue,
            };

            references.extend(matched.into_iter().map(|target_record_id| RecordReference {
                source_app_id: source_app.id,
                source_app_name: source_app.name.clone(),
                source_field_id: field.id,
                source_field_name: field.name.clone(),
                source_record_id: record.record_id,
                target_app_id,
                target_record_id,
            }));
        }
    }

    references
}
