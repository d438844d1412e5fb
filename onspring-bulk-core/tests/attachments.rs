mod common;

use reqwest::StatusCode;

use onspring_bulk_core::attachments::{
    sanitize_file_name, AttachmentsProcessor, ATTACHMENT_REPORT_FILE, DELETE_ERRORS_FILE,
    DOWNLOAD_ERRORS_FILE,
};
use onspring_bulk_core::config::FilterOptions;
use onspring_bulk_core::contract::{
    ApiResponse, MockFileSink, MockRecordApi, MockReportWriter, SilentProgress, TransportError,
};
use onspring_bulk_core::model::{FileContent, FileInfo, ReportData, ReportRow};
use onspring_bulk_core::report::FILE_INFO_ERROR_NAME;
use onspring_bulk_core::ProcessStatus;

use common::{attachments, config, field, page, record, remote};

const APP_ID: i32 = 1;

/// An app with one attachment field (10) and one record (100) holding the
/// given internal files.
fn api_with_files(file_ids: &'static [i32]) -> MockRecordApi {
    let mut api = MockRecordApi::new();
    api.expect_get_fields().returning(|app_id, _| {
        Ok(ApiResponse::ok(page(vec![
            field(9, app_id, "Title", "Text"),
            field(10, app_id, "Files", "Attachment"),
        ])))
    });
    api.expect_get_records()
        .withf(|request, paging| request.field_ids == [10] && paging.page_number == 1)
        .returning(move |request, _| {
            let files: Vec<(i32, &str)> = file_ids.iter().map(|id| (*id, "Internal")).collect();
            Ok(ApiResponse::ok(page(vec![record(
                request.app_id,
                100,
                vec![attachments(10, &files)],
            )])))
        });
    api
}

fn content(file_id: i32) -> FileContent {
    FileContent {
        file_name: format!("report {file_id}.pdf"),
        content_type: Some("application/pdf".to_string()),
        content: vec![1, 2, 3],
    }
}

#[test]
fn sanitized_names_drop_path_and_reserved_characters() {
    assert_eq!(sanitize_file_name("a/b:c*.txt"), "a_b_c_.txt");
    assert_eq!(sanitize_file_name("plain.pdf"), "plain.pdf");
}

#[tokio::test]
async fn download_saves_every_file_without_error_report() {
    let mut api = api_with_files(&[1, 2]);
    api.expect_get_file()
        .times(2)
        .returning(|file| Ok(ApiResponse::ok(content(file.file_id))));
    let mut sink = MockFileSink::new();
    sink.expect_write_file()
        .withf(|path, _| {
            path.starts_with("out/files/100/10") && path.to_string_lossy().contains("report ")
        })
        .times(2)
        .returning(|_, _| true);
    let mut writer = MockReportWriter::new();
    writer.expect_write_report().times(0);

    let remote = remote(api);
    let config = config(APP_ID, FilterOptions::default());
    let processor = AttachmentsProcessor::new(&remote, &config, &sink, &writer, &SilentProgress);

    assert_eq!(processor.download().await.unwrap(), ProcessStatus::Success);
}

#[tokio::test]
async fn download_failures_are_reported_and_batch_continues() {
    let mut api = api_with_files(&[1, 2, 3]);
    api.expect_get_file().returning(|file| {
        if file.file_id == 2 {
            Ok(ApiResponse::failed(StatusCode::NOT_FOUND, None))
        } else {
            Ok(ApiResponse::ok(content(file.file_id)))
        }
    });
    let mut sink = MockFileSink::new();
    sink.expect_write_file()
        .times(2)
        .returning(|path, _| !path.to_string_lossy().contains("/3-"));
    let mut writer = MockReportWriter::new();
    writer
        .expect_write_report()
        .withf(|path, table| {
            path.ends_with(DOWNLOAD_ERRORS_FILE)
                && table.len() == 2
                && table.rows[0][3] == "2"
                && table.rows[0][4].is_empty()
                && table.rows[1][3] == "3"
                && table.rows[1][4] == "report 3.pdf"
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let remote = remote(api);
    let config = config(APP_ID, FilterOptions::default());
    let processor = AttachmentsProcessor::new(&remote, &config, &sink, &writer, &SilentProgress);

    assert_eq!(processor.download().await.unwrap(), ProcessStatus::Success);
}

#[tokio::test]
async fn report_writes_sentinel_rows_when_metadata_is_unavailable() {
    let mut api = api_with_files(&[1, 2, 3, 4]);
    api.expect_get_file_info()
        .returning(|_| Err(TransportError::Timeout("deadline elapsed".to_string())));
    let sink = MockFileSink::new();
    let mut writer = MockReportWriter::new();
    writer
        .expect_write_report()
        .withf(|path, table| {
            path.ends_with(ATTACHMENT_REPORT_FILE)
                && table.len() == 4
                && table
                    .rows
                    .iter()
                    .all(|row| row[4] == FILE_INFO_ERROR_NAME && row[5] == "0")
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let remote = remote(api);
    let config = config(APP_ID, FilterOptions::default());
    let processor = AttachmentsProcessor::new(&remote, &config, &sink, &writer, &SilentProgress);

    assert_eq!(processor.report().await.unwrap(), ProcessStatus::Success);
}

#[tokio::test]
async fn report_lists_sizes_sorted_by_file() {
    let mut api = api_with_files(&[3, 1, 2]);
    api.expect_get_file_info().returning(|file| {
        Ok(ApiResponse::ok(FileInfo {
            name: format!("f{}.txt", file.file_id),
            content_type: None,
            notes: None,
            size: 1024 * file.file_id as u64,
        }))
    });
    let sink = MockFileSink::new();
    let mut writer = MockReportWriter::new();
    writer
        .expect_write_report()
        .withf(|_, table| {
            let ids: Vec<&str> = table.rows.iter().map(|row| row[3].as_str()).collect();
            ids == ["1", "2", "3"] && table.rows[1][5] == "2048" && table.rows[1][7] == "2"
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let remote = remote(api);
    let config = config(APP_ID, FilterOptions::default());
    let processor = AttachmentsProcessor::new(&remote, &config, &sink, &writer, &SilentProgress);

    assert_eq!(processor.report().await.unwrap(), ProcessStatus::Success);
}

#[tokio::test]
async fn delete_continues_past_failures_and_reports_them() {
    let mut api = api_with_files(&[1, 2, 3]);
    api.expect_delete_file().returning(|file| {
        if file.file_id == 2 {
            Ok(ApiResponse::failed(StatusCode::INTERNAL_SERVER_ERROR, None))
        } else {
            Ok(ApiResponse::ok(()))
        }
    });
    let sink = MockFileSink::new();
    let mut writer = MockReportWriter::new();
    writer
        .expect_write_report()
        .withf(|path, table| {
            path.ends_with(DELETE_ERRORS_FILE) && table.len() == 1 && table.rows[0][3] == "2"
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let remote = remote(api);
    let filter = FilterOptions {
        file_ids: vec![1, 2, 3],
        ..FilterOptions::default()
    };
    let config = config(APP_ID, filter);
    let processor = AttachmentsProcessor::new(&remote, &config, &sink, &writer, &SilentProgress);

    assert_eq!(processor.delete().await.unwrap(), ProcessStatus::Success);
}

#[tokio::test]
async fn delete_respects_file_allow_list() {
    let mut api = api_with_files(&[1, 2, 3]);
    api.expect_delete_file()
        .withf(|file| file.file_id == 2)
        .times(1)
        .returning(|_| Ok(ApiResponse::ok(())));
    let sink = MockFileSink::new();
    let mut writer = MockReportWriter::new();
    writer.expect_write_report().times(0);

    let remote = remote(api);
    let filter = FilterOptions {
        file_ids: vec![2],
        ..FilterOptions::default()
    };
    let config = config(APP_ID, filter);
    let processor = AttachmentsProcessor::new(&remote, &config, &sink, &writer, &SilentProgress);

    assert_eq!(processor.delete().await.unwrap(), ProcessStatus::Success);
}

#[tokio::test]
async fn app_without_file_fields_stops_before_reading_records() {
    let mut api = MockRecordApi::new();
    api.expect_get_fields()
        .returning(|app_id, _| Ok(ApiResponse::ok(page(vec![field(9, app_id, "Title", "Text")]))));
    api.expect_get_records().times(0);
    let sink = MockFileSink::new();
    let writer = MockReportWriter::new();

    let remote = remote(api);
    let config = config(APP_ID, FilterOptions::default());
    let processor = AttachmentsProcessor::new(&remote, &config, &sink, &writer, &SilentProgress);

    assert_eq!(processor.download().await.unwrap(), ProcessStatus::NoFieldsFound);
}

#[tokio::test]
async fn records_without_files_yield_no_files_found() {
    let api = api_with_files(&[]);
    let sink = MockFileSink::new();
    let writer = MockReportWriter::new();

    let remote = remote(api);
    let config = config(APP_ID, FilterOptions::default());
    let processor = AttachmentsProcessor::new(&remote, &config, &sink, &writer, &SilentProgress);

    assert_eq!(processor.report().await.unwrap(), ProcessStatus::NoFilesFound);
}

#[tokio::test]
async fn unavailable_report_fails_instead_of_widening_scope() {
    let mut api = MockRecordApi::new();
    api.expect_get_fields().returning(|app_id, _| {
        Ok(ApiResponse::ok(page(vec![field(10, app_id, "Files", "Attachment")])))
    });
    api.expect_get_report()
        .times(1)
        .returning(|_| Ok(ApiResponse::failed(StatusCode::FORBIDDEN, None)));
    api.expect_get_records().times(0);
    let sink = MockFileSink::new();
    let writer = MockReportWriter::new();

    let remote = remote(api);
    let filter = FilterOptions {
        report_id: Some(55),
        ..FilterOptions::default()
    };
    let config = config(APP_ID, filter);
    let processor = AttachmentsProcessor::new(&remote, &config, &sink, &writer, &SilentProgress);

    assert_eq!(processor.download().await.unwrap(), ProcessStatus::Failed);
}

#[tokio::test]
async fn report_and_record_ids_are_combined_into_scope() {
    let mut api = api_with_files(&[1]);
    api.expect_get_report().returning(|_| {
        Ok(ApiResponse::ok(ReportData {
            columns: vec!["Title".to_string()],
            rows: vec![ReportRow {
                record_id: 100,
                cells: Vec::new(),
            }],
        }))
    });
    api.expect_get_file()
        .times(1)
        .returning(|file| Ok(ApiResponse::ok(content(file.file_id))));
    let mut sink = MockFileSink::new();
    sink.expect_write_file().times(1).returning(|_, _| true);
    let writer = MockReportWriter::new();

    let remote = remote(api);
    let filter = FilterOptions {
        record_ids: vec![7],
        report_id: Some(55),
        ..FilterOptions::default()
    };
    let config = config(APP_ID, filter);
    let processor = AttachmentsProcessor::new(&remote, &config, &sink, &writer, &SilentProgress);

    assert_eq!(processor.download().await.unwrap(), ProcessStatus::Success);
}

#[tokio::test]
async fn field_subset_still_fetches_every_attachment_field() {
    let mut api = MockRecordApi::new();
    api.expect_get_fields().returning(|app_id, _| {
        Ok(ApiResponse::ok(page(vec![
            field(10, app_id, "Contracts", "Attachment"),
            field(11, app_id, "Invoices", "Attachment"),
            field(12, app_id, "All Attachments", "Attachment"),
            field(13, app_id, "Signed Contracts", "Attachment"),
        ])))
    });
    api.expect_get_records()
        .withf(|request, _| request.field_ids == [10, 13, 11, 12])
        .times(1)
        .returning(|request, _| {
            Ok(ApiResponse::ok(page(vec![record(
                request.app_id,
                100,
                vec![
                    attachments(10, &[(1, "Internal")]),
                    attachments(11, &[(2, "Internal")]),
                    attachments(12, &[(1, "Internal"), (2, "Internal")]),
                    attachments(13, &[(1, "Internal")]),
                ],
            )])))
        });
    api.expect_delete_file()
        .withf(|file| file.file_id == 1 && (file.field_id == 10 || file.field_id == 13))
        .times(2)
        .returning(|_| Ok(ApiResponse::ok(())));
    let sink = MockFileSink::new();
    let mut writer = MockReportWriter::new();
    writer.expect_write_report().times(0);

    let remote = remote(api);
    let filter = FilterOptions {
        field_ids: vec![10, 13],
        ..FilterOptions::default()
    };
    let config = config(APP_ID, filter);
    let processor = AttachmentsProcessor::new(&remote, &config, &sink, &writer, &SilentProgress);

    assert_eq!(processor.delete().await.unwrap(), ProcessStatus::Success);
}

#[tokio::test]
async fn exhausted_transport_during_delete_propagates() {
    let mut api = api_with_files(&[1, 2, 3]);
    api.expect_delete_file().returning(|file| match file.file_id {
        1 => Ok(ApiResponse::failed(StatusCode::NOT_FOUND, None)),
        2 => Err(TransportError::Connect("refused".to_string())),
        _ => Ok(ApiResponse::ok(())),
    });
    let sink = MockFileSink::new();
    let mut writer = MockReportWriter::new();
    writer
        .expect_write_report()
        .withf(|path, table| {
            path.ends_with(DELETE_ERRORS_FILE)
                && table.len() == 2
                && table.rows[0][3] == "1"
                && table.rows[1][3] == "2"
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let remote = remote(api);
    let config = config(APP_ID, FilterOptions::default());
    let processor = AttachmentsProcessor::new(&remote, &config, &sink, &writer, &SilentProgress);

    assert!(matches!(processor.delete().await, Err(TransportError::Connect(_))));
}

#[tokio::test]
async fn exhausted_transport_during_download_keeps_going_and_reports() {
    let mut api = api_with_files(&[1, 2]);
    api.expect_get_file().returning(|file| match file.file_id {
        1 => Err(TransportError::Timeout("no answer".to_string())),
        _ => Ok(ApiResponse::ok(content(file.file_id))),
    });
    let mut sink = MockFileSink::new();
    sink.expect_write_file()
        .withf(|path, _| path.to_string_lossy().contains("2-report 2.pdf"))
        .times(1)
        .returning(|_, _| true);
    let mut writer = MockReportWriter::new();
    writer
        .expect_write_report()
        .withf(|path, table| {
            path.ends_with(DOWNLOAD_ERRORS_FILE)
                && table.len() == 1
                && table.rows[0][3] == "1"
                && table.rows[0][4].is_empty()
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let remote = remote(api);
    let config = config(APP_ID, FilterOptions::default());
    let processor = AttachmentsProcessor::new(&remote, &config, &sink, &writer, &SilentProgress);

    assert!(matches!(processor.download().await, Err(TransportError::Timeout(_))));
}
