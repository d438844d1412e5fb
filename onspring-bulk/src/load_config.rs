/// `load_config` module: loads transfer settings and id lists from disk and
/// injects secrets from the environment.
///
/// This module is the only place where user-supplied files are parsed and
/// mapped to the strongly-typed settings the core expects.
///
/// # Responsibilities
/// - Parse the transfer settings file (JSON or YAML; JSON is read through the YAML parser)
/// - Fill missing instance API keys from `ONSPRING_SOURCE_API_KEY` / `ONSPRING_TARGET_API_KEY`
/// - Read record/file id lists from CSV files
///
/// # Errors
/// All errors in this module use `anyhow::Error` for context-rich diagnostics,
/// and are surfaced at the CLI boundary as an invalid-settings exit status.
use anyhow::{bail, Context, Result};
use onspring_bulk_core::config::AttachmentTransferSettings;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info};

pub const SOURCE_API_KEY_ENV: &str = "ONSPRING_SOURCE_API_KEY";
pub const TARGET_API_KEY_ENV: &str = "ONSPRING_TARGET_API_KEY";

fn read_file(path: &Path, what: &str) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => {
            info!(path = ?path, what, "File read successfully");
            Ok(content)
        }
        Err(e) => {
            error!(error = ?e, path = ?path, what, "Failed to read file");
            Err(anyhow::anyhow!("Failed to read {what} {:?}: {}", path, e))
        }
    }
}

/// Loads the transfer settings file and injects API keys from the environment
/// where the file does not carry them.
pub fn load_transfer_settings<P: AsRef<Path>>(path: P) -> Result<AttachmentTransferSettings> {
    let path_ref = path.as_ref();
    info!(settings_path = ?path_ref, "Loading transfer settings from file");
    let content = read_file(path_ref, "settings file")?;

    let mut settings: AttachmentTransferSettings = match serde_yaml::from_str(&content) {
        Ok(settings) => {
            info!(settings_path = ?path_ref, "Parsed transfer settings successfully");
            settings
        }
        Err(e) => {
            error!(error = ?e, settings_path = ?path_ref, "Failed to parse transfer settings");
            return Err(anyhow::anyhow!("Failed to parse transfer settings: {e}"));
        }
    };

    for (instance, var) in [
        (&mut settings.source_instance, SOURCE_API_KEY_ENV),
        (&mut settings.target_instance, TARGET_API_KEY_ENV),
    ] {
        if instance.api_key.as_deref().map_or(true, str::is_empty) {
            match env::var(var) {
                Ok(key) if !key.is_empty() => instance.api_key = Some(key),
                _ => {
                    error!(
                        var,
                        settings_path = ?path_ref,
                        "API key missing in settings and environment"
                    );
                    bail!("No API key configured: set {var} or add it to the settings file");
                }
            }
        }
    }

    Ok(settings)
}

/// Reads ids from the first column of a CSV file. Rows whose first cell is
/// not an integer (such as a header) are skipped.
pub fn load_ids_from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<i32>> {
    let path_ref = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path_ref)
        .with_context(|| format!("Failed to open id file {:?}", path_ref))?;

    let mut ids = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row =
            row.with_context(|| format!("Failed to read line {} of {:?}", line + 1, path_ref))?;
        let Some(cell) = row.get(0).map(str::trim) else {
            continue;
        };
        match cell.parse::<i32>() {
            Ok(id) => ids.push(id),
            Err(_) => debug!(line = line + 1, cell, "Skipping non-numeric id row"),
        }
    }
    info!(path = ?path_ref, ids = ids.len(), "Loaded ids from CSV");
    Ok(ids)
}

/// Merges literal ids with ids read from an optional CSV file, keeping the
/// first occurrence of each id.
pub fn merge_ids(literal: &[i32], csv_path: Option<&Path>) -> Result<Vec<i32>> {
    let mut merged = literal.to_vec();
    if let Some(path) = csv_path {
        merged.extend(load_ids_from_csv(path)?);
    }
    let mut seen = std::collections::HashSet::new();
    merged.retain(|id| seen.insert(*id));
    Ok(merged)
}
