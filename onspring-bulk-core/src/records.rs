//! References workflow: which records, in any app, point at a set of target
//! records?
//!
//! Every app is scanned for reference fields aimed at the target app. Apps
//! with such fields are paged through and each page is searched as it
//! arrives, so no app is ever held in memory as a whole.

use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use crate::config::ProcessorConfig;
use crate::contract::{Progress, RecordApi, ReportWriter, TransportError};
use crate::discovery::discover_references;
use crate::model::{App, Field, RecordReference, RecordsRequest};
use crate::paging::for_each_page;
use crate::remote::RemoteAccess;
use crate::report::Table;
use crate::scope::resolve_record_scope;
use crate::status::ProcessStatus;

pub const REFERENCES_REPORT_FILE: &str = "record_references.csv";

pub struct RecordsProcessor<'a, C> {
    remote: &'a RemoteAccess<C>,
    config: &'a ProcessorConfig,
    writer: &'a dyn ReportWriter,
    progress: &'a dyn Progress,
}

impl<'a, C: RecordApi> RecordsProcessor<'a, C> {
    pub fn new(
        remote: &'a RemoteAccess<C>,
        config: &'a ProcessorConfig,
        writer: &'a dyn ReportWriter,
        progress: &'a dyn Progress,
    ) -> Self {
        RecordsProcessor {
            remote,
            config,
            writer,
            progress,
        }
    }

    /// Reference fields of `app_id` that point at the target app.
    pub async fn get_reference_fields(&self, app_id: i32) -> Result<Vec<Field>, TransportError> {
        let fields = self.remote.get_fields(app_id).await?;
        Ok(fields
            .into_iter()
            .filter(|f| f.references_app(self.config.app_id))
            .collect())
    }

    /// Pages through `app` and collects its references to `target_ids`.
    pub async fn get_references(
        &self,
        app: &App,
        fields: &[Field],
        target_ids: &HashSet<i32>,
    ) -> Result<Vec<RecordReference>, TransportError> {
        let request = RecordsRequest {
            app_id: app.id,
            field_ids: fields.iter().map(|f| f.id).collect(),
        };
        let mut references = Vec::new();
        for_each_page(
            "records",
            self.remote.page_size(),
            |paging| self.remote.get_records_page(&request, paging),
            |records| {
                references.extend(discover_references(
                    &records,
                    app,
                    fields,
                    self.config.app_id,
                    target_ids,
                ))
            },
        )
        .await?;
        Ok(references)
    }

    pub async fn find_references(&self) -> Result<ProcessStatus, TransportError> {
        let target_app_id = self.config.app_id;
        info!(target_app_id, "[REFERENCES] Starting reference search");

        let Some(scope) = resolve_record_scope(self.remote, &self.config.filter).await? else {
            return Ok(ProcessStatus::Failed);
        };
        let target_ids = match scope.record_ids() {
            Some(ids) if !ids.is_empty() => ids,
            _ => {
                warn!(target_app_id, "[REFERENCES] No target record ids given");
                return Ok(ProcessStatus::NoRecordsFound);
            }
        };

        let apps = self.remote.get_apps().await?;
        if apps.is_empty() {
            warn!("[REFERENCES] No apps visible to this API key");
            return Ok(ProcessStatus::NoRecordsFound);
        }

        self.progress.start(apps.len() as u64, "Searching apps");
        let mut searched_fields = 0;
        let mut references = Vec::new();
        for app in &apps {
            self.progress.advance(&app.name);
            let fields = self.get_reference_fields(app.id).await?;
            if fields.is_empty() {
                debug!(app_id = app.id, "[REFERENCES] App has no reference to target app");
                continue;
            }
            searched_fields += fields.len();
            let found = self.get_references(app, &fields, &target_ids).await?;
            info!(
                app_id = app.id,
                app_name = %app.name,
                fields = fields.len(),
                references = found.len(),
                "[REFERENCES] Searched app"
            );
            references.extend(found);
        }
        self.progress.finish();

        if searched_fields == 0 {
            warn!(target_app_id, "[REFERENCES] No reference fields point at the target app");
            return Ok(ProcessStatus::NoFieldsFound);
        }

        references.sort();
        let path = self.config.output_dir.join(REFERENCES_REPORT_FILE);
        match self.writer.write_report(&path, &Table::from_rows(&references)) {
            Ok(()) => info!(
                path = %path.display(),
                references = references.len(),
                "[REFERENCES] Wrote report"
            ),
            Err(e) => error!(
                path = %path.display(),
                error = %e,
                "[REFERENCES] Failed to write report"
            ),
        }
        Ok(ProcessStatus::Success)
    }
}
