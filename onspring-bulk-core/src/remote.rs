//! # remote: retrying access to the record platform
//!
//! [`RemoteAccess`] wraps a [`RecordApi`] so that every call either yields a
//! payload, resolves to `None` ("no result"), or, only when transport-level
//! retries are exhausted, returns the last [`TransportError`].
//!
//! ## Retry policy
//! - At most [`RetryPolicy::max_attempts`] attempts (default 3).
//! - Statuses 500, 502, 503, 504, 408 and 429 are retried; any other failing
//!   status resolves to `None` immediately.
//! - Before attempt `n + 1` the caller sleeps `n × base_delay` (default 1s).
//!   The sleep is a tokio timer and never blocks sibling tasks.

use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::contract::{ApiResult, RecordApi, TransportError};
use crate::model::{
    App, CreatedId, Field, FileContent, FileInfo, FileRequest, FileUpload, Page, PagingRequest,
    QueryRequest, Record, RecordUpdate, RecordsRequest, ReportData,
};
use crate::paging::collect_pages;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_PAGE_SIZE: i32 = 100;

const RETRYABLE_STATUSES: [StatusCode; 6] = [
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
    StatusCode::REQUEST_TIMEOUT,
    StatusCode::TOO_MANY_REQUESTS,
];

pub fn is_retryable_status(status: StatusCode) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            ..RetryPolicy::default()
        }
    }

    /// Wait before the attempt following `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// The Remote Access Layer: a [`RecordApi`] plus retry policy and page size.
///
/// The wrapped client is read-only configuration shared by every concurrent
/// caller.
pub struct RemoteAccess<C> {
    client: C,
    policy: RetryPolicy,
    page_size: i32,
}

impl<C: RecordApi> RemoteAccess<C> {
    pub fn new(client: C, policy: RetryPolicy) -> Self {
        RemoteAccess {
            client,
            policy,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: i32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn page_size(&self) -> i32 {
        self.page_size
    }

    /// Runs `call` under the retry policy.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<Option<T>, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            debug!(operation, attempt, max_attempts, "[RETRY] Sending request");
            match call().await {
                Ok(response) if response.is_success() => {
                    debug!(
                        operation,
                        attempt,
                        status = %response.status,
                        "[RETRY] Request succeeded"
                    );
                    if response.value.is_none() {
                        warn!(
                            operation,
                            status = %response.status,
                            "[RETRY] Successful response carried no payload"
                        );
                    }
                    return Ok(response.value);
                }
                Ok(response) => {
                    let retryable = is_retryable_status(response.status);
                    warn!(
                        operation,
                        attempt,
                        status = %response.status,
                        message = response.message.as_deref().unwrap_or(""),
                        retryable,
                        "[RETRY] Request was unsuccessful"
                    );
                    if !retryable || attempt >= max_attempts {
                        error!(
                            operation,
                            attempts = attempt,
                            status = %response.status,
                            "[RETRY] Request failed, giving up"
                        );
                        return Ok(None);
                    }
                }
                Err(e) if !e.is_retryable() => {
                    error!(
                        operation,
                        attempt,
                        error = %e,
                        "[RETRY] Request failed with a non-retryable error"
                    );
                    return Ok(None);
                }
                Err(e) => {
                    warn!(operation, attempt, error = %e, "[RETRY] Transport failure");
                    if attempt >= max_attempts {
                        error!(
                            operation,
                            attempts = attempt,
                            error = %e,
                            "[RETRY] Transport failures exhausted all attempts"
                        );
                        return Err(e);
                    }
                }
            }
            let delay = self.policy.delay_after(attempt);
            debug!(operation, attempt, delay_ms = delay.as_millis() as u64, "[RETRY] Backing off");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    pub async fn get_apps_page(
        &self,
        paging: PagingRequest,
    ) -> Result<Option<Page<App>>, TransportError> {
        self.execute("get_apps", || self.client.get_apps(paging)).await
    }

    pub async fn get_fields_page(
        &self,
        app_id: i32,
        paging: PagingRequest,
    ) -> Result<Option<Page<Field>>, TransportError> {
        self.execute("get_fields", || self.client.get_fields(app_id, paging)).await
    }

    pub async fn get_field(&self, field_id: i32) -> Result<Option<Field>, TransportError> {
        self.execute("get_field", || self.client.get_field(field_id)).await
    }

    pub async fn get_records_page(
        &self,
        request: &RecordsRequest,
        paging: PagingRequest,
    ) -> Result<Option<Page<Record>>, TransportError> {
        self.execute("get_records", || self.client.get_records(request, paging)).await
    }

    pub async fn query_records_page(
        &self,
        request: &QueryRequest,
        paging: PagingRequest,
    ) -> Result<Option<Page<Record>>, TransportError> {
        self.execute("query_records", || self.client.query_records(request, paging)).await
    }

    pub async fn get_report(&self, report_id: i32) -> Result<Option<ReportData>, TransportError> {
        self.execute("get_report", || self.client.get_report(report_id)).await
    }

    pub async fn get_file(
        &self,
        file: &FileRequest,
    ) -> Result<Option<FileContent>, TransportError> {
        self.execute("get_file", || self.client.get_file(file)).await
    }

    pub async fn get_file_info(
        &self,
        file: &FileRequest,
    ) -> Result<Option<FileInfo>, TransportError> {
        self.execute("get_file_info", || self.client.get_file_info(file)).await
    }

    pub async fn save_file(
        &self,
        upload: &FileUpload,
    ) -> Result<Option<CreatedId>, TransportError> {
        self.execute("save_file", || self.client.save_file(upload)).await
    }

    /// `true` once the file is gone.
    pub async fn delete_file(&self, file: &FileRequest) -> Result<bool, TransportError> {
        let deleted = self.execute("delete_file", || self.client.delete_file(file)).await?;
        Ok(deleted.is_some())
    }

    pub async fn update_record(
        &self,
        update: &RecordUpdate,
    ) -> Result<Option<CreatedId>, TransportError> {
        self.execute("update_record", || self.client.update_record(update)).await
    }

    /// Every app visible to the API key.
    pub async fn get_apps(&self) -> Result<Vec<App>, TransportError> {
        collect_pages("apps", self.page_size, |paging| self.get_apps_page(paging)).await
    }

    /// Every field of an app.
    pub async fn get_fields(&self, app_id: i32) -> Result<Vec<Field>, TransportError> {
        collect_pages("fields", self.page_size, |paging| {
            self.get_fields_page(app_id, paging)
        })
        .await
    }

    /// Every record of an app, restricted to the requested fields.
    pub async fn get_records(
        &self,
        request: &RecordsRequest,
    ) -> Result<Vec<Record>, TransportError> {
        collect_pages("records", self.page_size, |paging| {
            self.get_records_page(request, paging)
        })
        .await
    }

    /// Every record matching a filter expression.
    pub async fn query_records(
        &self,
        request: &QueryRequest,
    ) -> Result<Vec<Record>, TransportError> {
        collect_pages("query", self.page_size, |paging| {
            self.query_records_page(request, paging)
        })
        .await
    }
}
