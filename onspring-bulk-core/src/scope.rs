//! Record scope: which records of an app a workflow may touch.
//!
//! The scope is the union of literal record ids and the ids of the rows of a
//! saved report. With neither given every record is in scope.

use std::collections::HashSet;
use tracing::{error, info};

use crate::config::FilterOptions;
use crate::contract::{RecordApi, TransportError};
use crate::remote::RemoteAccess;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordScope {
    All,
    Only(HashSet<i32>),
}

impl RecordScope {
    pub fn includes(&self, record_id: i32) -> bool {
        match self {
            RecordScope::All => true,
            RecordScope::Only(ids) => ids.contains(&record_id),
        }
    }

    /// An explicit scope that matched nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self, RecordScope::Only(ids) if ids.is_empty())
    }

    pub fn record_ids(&self) -> Option<HashSet<i32>> {
        match self {
            RecordScope::All => None,
            RecordScope::Only(ids) => Some(ids.clone()),
        }
    }
}

/// Resolves the record scope of `filter`. `None` means the report could not
/// be fetched, in which case the caller must not fall back to all records.
pub async fn resolve_record_scope<C: RecordApi>(
    remote: &RemoteAccess<C>,
    filter: &FilterOptions,
) -> Result<Option<RecordScope>, TransportError> {
    if filter.record_ids.is_empty() && filter.report_id.is_none() {
        return Ok(Some(RecordScope::All));
    }

    let mut ids: HashSet<i32> = filter.record_ids.iter().copied().collect();
    if let Some(report_id) = filter.report_id {
        match remote.get_report(report_id).await? {
            Some(report) => {
                info!(report_id, rows = report.rows.len(), "Resolved report into record ids");
                ids.extend(report.rows.iter().map(|row| row.record_id));
            }
            None => {
                error!(report_id, "Report could not be retrieved");
                return Ok(None);
            }
        }
    }
    Ok(Some(RecordScope::Only(ids)))
}
