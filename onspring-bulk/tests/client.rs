use reqwest::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION};
use serial_test::serial;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use onspring_bulk::client::{file_name_from_headers, OnspringClient, API_KEY_ENV};
use onspring_bulk_core::contract::RecordApi;
use onspring_bulk_core::model::FileRequest;

fn disposition(value: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_DISPOSITION, HeaderValue::from_static(value));
    headers
}

#[test]
fn file_name_is_read_from_quoted_disposition() {
    let headers = disposition(r#"attachment; filename="Quarterly report.pdf"; size=123"#);
    assert_eq!(
        file_name_from_headers(&headers).as_deref(),
        Some("Quarterly report.pdf")
    );
}

#[test]
fn file_name_is_read_from_extended_disposition() {
    let headers = disposition("attachment; filename*=UTF-8''notes.txt");
    assert_eq!(file_name_from_headers(&headers).as_deref(), Some("notes.txt"));
}

#[test]
fn file_name_is_absent_without_disposition() {
    assert_eq!(file_name_from_headers(&HeaderMap::new()), None);
    assert_eq!(file_name_from_headers(&disposition("inline")), None);
}

#[test]
fn rejects_api_key_that_is_not_a_header_value() {
    assert!(OnspringClient::new("https://api.onspring.com", "bad\nkey").is_err());
}

#[test]
#[serial]
fn new_from_env_requires_api_key() {
    std::env::remove_var(API_KEY_ENV);
    assert!(OnspringClient::new_from_env().is_err());

    std::env::set_var(API_KEY_ENV, "test-key");
    assert!(OnspringClient::new_from_env().is_ok());
    std::env::remove_var(API_KEY_ENV);
}

/// Local API answering file info requests with JSON and file downloads with
/// a chunked body that is never finished.
async fn serve_file_without_length() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&request).to_string();
                let path = head.split_whitespace().nth(1).unwrap_or_default();
                if path.ends_with("/file") {
                    let _ = socket
                        .write_all(
                            b"HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\n\
                              Transfer-Encoding: chunked\r\n\r\n4\r\n%PDF\r\n",
                        )
                        .await;
                    tokio::time::sleep(Duration::from_secs(60)).await;
                } else {
                    let body = r#"{"name":"contract.pdf","contentType":"application/pdf"}"#;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                }
            });
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn file_info_without_content_length_reports_zero_and_skips_body() {
    let base_url = serve_file_without_length().await;
    let client = OnspringClient::new(&base_url, "test-key").unwrap();
    let file = FileRequest {
        record_id: 1,
        field_id: 2,
        field_name: "Files".to_string(),
        file_id: 3,
    };

    let response = tokio::time::timeout(Duration::from_secs(10), client.get_file_info(&file))
        .await
        .expect("file body must not be awaited")
        .unwrap();

    let info = response.value.unwrap();
    assert_eq!(info.name, "contract.pdf");
    assert_eq!(info.size, 0);
}
