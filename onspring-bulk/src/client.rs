#![doc = "HTTP implementation of the core `RecordApi` contract against the Onspring v2 REST API."]
//
//! # Onspring client
//!
//! [`OnspringClient`] issues exactly one HTTP request per trait call (two for
//! file metadata) and maps the outcome into the core's response types:
//!
//! - a success status with a decodable body → `ApiResponse` with a value
//! - any other status → `ApiResponse::failed` with the body text as message
//! - connection, timeout or decode failures → `TransportError`
//!
//! Retrying is not done here; the core wraps this client in its
//! `RemoteAccess` layer.
//!
//! ## Client Usage
//! Construct with [`OnspringClient::new`] or [`OnspringClient::new_from_env`]
//! (`ONSPRING_API_KEY`, optional `ONSPRING_API_URL`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;

use onspring_bulk_core::contract::{ApiResponse, ApiResult, RecordApi};
use onspring_bulk_core::model::{
    App, CreatedId, Field, FileContent, FileInfo, FileRequest, FileUpload, Page, PagingRequest,
    QueryRequest, Record, RecordUpdate, RecordsRequest, ReportData,
};

pub const DEFAULT_BASE_URL: &str = "https://api.onspring.com";
pub const API_KEY_ENV: &str = "ONSPRING_API_KEY";
pub const API_URL_ENV: &str = "ONSPRING_API_URL";
const API_VERSION: &str = "2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OnspringClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileInfoBody {
    name: String,
    content_type: Option<String>,
    notes: Option<String>,
}

fn paging_query(paging: PagingRequest) -> [(&'static str, String); 2] {
    [
        ("PageNumber", paging.page_number.to_string()),
        ("PageSize", paging.page_size.to_string()),
    ]
}

fn file_path(file: &FileRequest) -> String {
    format!(
        "/Files/recordId/{}/fieldId/{}/fileId/{}",
        file.record_id, file.field_id, file.file_id
    )
}

/// File name announced by the `Content-Disposition` header.
pub fn file_name_from_headers(headers: &HeaderMap) -> Option<String> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let disposition = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r#"filename\*?=(?:UTF-8'')?"?([^";]+)"?"#).ok())
        .as_ref()?;
    pattern
        .captures(disposition)
        .map(|c| c[1].trim().to_string())
        .filter(|name| !name.is_empty())
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn failed<T>(response: Response) -> ApiResult<T> {
    let status = response.status();
    let message = response.text().await.ok().filter(|m| !m.is_empty());
    tracing::debug!(
        status = %status,
        message = message.as_deref().unwrap_or(""),
        "Onspring API returned an error status"
    );
    Ok(ApiResponse::failed(status, message))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    if !status.is_success() {
        return failed(response).await;
    }
    let value = response.json::<T>().await?;
    Ok(ApiResponse::with_status(status, value))
}

impl OnspringClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut key =
            HeaderValue::from_str(api_key).context("API key is not a valid header value")?;
        key.set_sensitive(true);
        headers.insert("x-apikey", key);
        headers.insert("x-api-version", HeaderValue::from_static(API_VERSION));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        tracing::info!(base_url, api_key_set = !api_key.is_empty(), "Initialized OnspringClient");
        Ok(OnspringClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn new_from_env() -> Result<Self> {
        let api_key = env::var(API_KEY_ENV).map_err(|e| {
            tracing::error!(error = ?e, var = API_KEY_ENV, "API key missing in environment");
            anyhow::anyhow!("{API_KEY_ENV} must be set: {e}")
        })?;
        let base_url = env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(&base_url, &api_key)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl RecordApi for OnspringClient {
    async fn get_apps(&self, paging: PagingRequest) -> ApiResult<Page<App>> {
        let response = self
            .http
            .get(self.url("/Apps"))
            .query(&paging_query(paging))
            .send()
            .await?;
        read_json(response).await
    }

    async fn get_fields(&self, app_id: i32, paging: PagingRequest) -> ApiResult<Page<Field>> {
        let response = self
            .http
            .get(self.url(&format!("/Fields/appId/{app_id}")))
            .query(&paging_query(paging))
            .send()
            .await?;
        read_json(response).await
    }

    async fn get_field(&self, field_id: i32) -> ApiResult<Field> {
        let response = self
            .http
            .get(self.url(&format!("/Fields/{field_id}")))
            .send()
            .await?;
        read_json(response).await
    }

    async fn get_records(
        &self,
        request: &RecordsRequest,
        paging: PagingRequest,
    ) -> ApiResult<Page<Record>> {
        let field_ids = request
            .field_ids
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let response = self
            .http
            .get(self.url(&format!("/Records/appId/{}", request.app_id)))
            .query(&[("fieldIds", field_ids), ("dataFormat", "Raw".to_string())])
            .query(&paging_query(paging))
            .send()
            .await?;
        read_json(response).await
    }

    async fn query_records(
        &self,
        request: &QueryRequest,
        paging: PagingRequest,
    ) -> ApiResult<Page<Record>> {
        let body = serde_json::json!({
            "appId": request.app_id,
            "filter": request.filter,
            "fieldIds": request.field_ids,
            "dataFormat": "Raw",
        });
        let response = self
            .http
            .post(self.url("/Records/Query"))
            .query(&paging_query(paging))
            .json(&body)
            .send()
            .await?;
        read_json(response).await
    }

    async fn get_report(&self, report_id: i32) -> ApiResult<ReportData> {
        let response = self
            .http
            .get(self.url(&format!("/Reports/{report_id}")))
            .query(&[("apiDataFormat", "Raw"), ("dataType", "ReportData")])
            .send()
            .await?;
        read_json(response).await
    }

    async fn get_file(&self, file: &FileRequest) -> ApiResult<FileContent> {
        let response = self
            .http
            .get(self.url(&format!("{}/file", file_path(file))))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return failed(response).await;
        }
        let headers = response.headers().clone();
        let content = response.bytes().await?.to_vec();
        let file_name = file_name_from_headers(&headers)
            .unwrap_or_else(|| format!("file-{}", file.file_id));
        Ok(ApiResponse::with_status(
            status,
            FileContent {
                file_name,
                content_type: content_type(&headers),
                content,
            },
        ))
    }

    async fn get_file_info(&self, file: &FileRequest) -> ApiResult<FileInfo> {
        let info_response = self.http.get(self.url(&file_path(file))).send().await?;
        let info = match read_json::<FileInfoBody>(info_response).await? {
            ApiResponse { value: Some(info), .. } => info,
            ApiResponse { status, message, .. } => return Ok(ApiResponse::failed(status, message)),
        };

        // Size comes from the content headers; the body is dropped unread.
        let response = self
            .http
            .get(self.url(&format!("{}/file", file_path(file))))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return failed(response).await;
        }
        let size = response.content_length().unwrap_or_else(|| {
            tracing::warn!(
                record_id = file.record_id,
                file_id = file.file_id,
                "File response carried no Content-Length, reporting size 0"
            );
            0
        });
        drop(response);
        Ok(ApiResponse::with_status(
            status,
            FileInfo {
                name: info.name,
                content_type: info.content_type,
                notes: info.notes,
                size,
            },
        ))
    }

    async fn save_file(&self, upload: &FileUpload) -> ApiResult<CreatedId> {
        let mut part = Part::bytes(upload.content.clone()).file_name(upload.file_name.clone());
        if let Some(content_type) = &upload.content_type {
            part = part.mime_str(content_type)?;
        }
        let mut form = Form::new()
            .text("RecordId", upload.record_id.to_string())
            .text("FieldId", upload.field_id.to_string());
        if let Some(notes) = &upload.notes {
            form = form.text("Notes", notes.clone());
        }
        let response = self
            .http
            .post(self.url("/Files"))
            .multipart(form.part("File", part))
            .send()
            .await?;
        read_json(response).await
    }

    async fn delete_file(&self, file: &FileRequest) -> ApiResult<()> {
        let response = self.http.delete(self.url(&file_path(file))).send().await?;
        let status = response.status();
        if !status.is_success() {
            return failed(response).await;
        }
        Ok(ApiResponse::with_status(status, ()))
    }

    async fn update_record(&self, update: &RecordUpdate) -> ApiResult<CreatedId> {
        let response = self
            .http
            .put(self.url("/Records"))
            .json(update)
            .send()
            .await?;
        read_json(response).await
    }
}
