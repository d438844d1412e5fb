/// # onspring-bulk CLI Interface (Module)
///
/// This module implements the full CLI interface for onspring-bulk: command parsing,
/// argument validation, and the mapping from commands to the core workflows.
///
/// All business logic (discovery, retrying, fan-out, the workflows) lives in the
/// [`onspring-bulk-core`] crate. This module is strictly CLI glue: it builds one
/// [`ProcessorConfig`], wires the real collaborators (HTTP client, CSV writer,
/// disk sink, progress bar) and translates outcomes into a [`ProcessStatus`].
///
/// ## How To Use
/// - For command-line users: use the installed `onspring-bulk` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// ## Extending
/// When adding subcommands, update [`Commands`] below and keep all non-trivial
/// logic inside `onspring-bulk-core`.
///
/// [`onspring-bulk-core`]: ../../onspring-bulk-core/
/// [`ProcessorConfig`]: onspring_bulk_core::config::ProcessorConfig
/// [`ProcessStatus`]: onspring_bulk_core::ProcessStatus
use clap::{Args, Parser, Subcommand};
use std::env;
use std::path::PathBuf;

use onspring_bulk_core::attachments::AttachmentsProcessor;
use onspring_bulk_core::config::{FilterOptions, InstanceSettings, ProcessorConfig};
use onspring_bulk_core::contract::TransportError;
use onspring_bulk_core::fanout::DEFAULT_CONCURRENCY;
use onspring_bulk_core::records::RecordsProcessor;
use onspring_bulk_core::remote::{
    RemoteAccess, RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_PAGE_SIZE,
};
use onspring_bulk_core::transfer::TransferProcessor;
use onspring_bulk_core::ProcessStatus;

use crate::client::{OnspringClient, API_URL_ENV, DEFAULT_BASE_URL};
use crate::load_config::{load_transfer_settings, merge_ids};
use crate::output::{CsvReportWriter, DiskFileSink, ProgressIndicator};

/// CLI for onspring-bulk: bulk operations on Onspring attachment fields.
#[derive(Parser, Debug)]
#[clap(
    name = "onspring-bulk",
    version,
    about = "Download, delete, report on and transfer Onspring attachments in bulk"
)]
pub struct Cli {
    #[clap(flatten)]
    pub global: GlobalArgs,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Records or fields requested per page
    #[clap(long, global = true, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: i32,

    /// Maximum number of files processed at the same time
    #[clap(long, global = true, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Attempts per API call before giving up
    #[clap(long, global = true, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Folder receiving downloaded files and CSV reports
    #[clap(long, global = true, default_value = "output")]
    pub output_dir: PathBuf,

    /// Log filter (e.g. `debug`, `onspring_bulk_core=trace`); falls back to RUST_LOG
    #[clap(long, global = true)]
    pub log_level: Option<String>,
}

/// Target app plus the optional narrowing shared by the attachment commands.
#[derive(Args, Debug, Clone)]
pub struct AppArgs {
    /// Id of the app holding the attachments
    #[clap(long)]
    pub app_id: i32,

    /// Only these attachment or image fields
    #[clap(long, value_delimiter = ',')]
    pub field_ids: Vec<i32>,

    /// Only these records
    #[clap(long, value_delimiter = ',')]
    pub record_ids: Vec<i32>,

    /// Only records listed by this saved report
    #[clap(long)]
    pub report_id: Option<i32>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download every attachment of an app to the output folder
    Download {
        #[clap(flatten)]
        app: AppArgs,
    },
    /// Delete attachments of an app
    Delete {
        #[clap(flatten)]
        app: AppArgs,

        /// Only these files
        #[clap(long, value_delimiter = ',')]
        file_ids: Vec<i32>,
    },
    /// Write a CSV report with name and size of every attachment
    Report {
        #[clap(flatten)]
        app: AppArgs,

        /// Only these files
        #[clap(long, value_delimiter = ',')]
        file_ids: Vec<i32>,

        /// CSV file whose first column lists file ids
        #[clap(long)]
        files_csv: Option<PathBuf>,
    },
    /// List records of any app that reference the given records
    References {
        /// Id of the referenced (target) app
        #[clap(long)]
        app_id: i32,

        #[clap(long, value_delimiter = ',')]
        record_ids: Vec<i32>,

        /// CSV file whose first column lists target record ids
        #[clap(long)]
        records_csv: Option<PathBuf>,

        #[clap(long)]
        report_id: Option<i32>,
    },
    /// Copy attachments from flagged source records to matching target records
    Transfer {
        /// Path to the JSON or YAML transfer settings file
        #[clap(long)]
        settings: PathBuf,

        /// Only these source records
        #[clap(long, value_delimiter = ',')]
        record_ids: Vec<i32>,

        #[clap(long)]
        report_id: Option<i32>,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Download { .. } => "download",
            Commands::Delete { .. } => "delete",
            Commands::Report { .. } => "report",
            Commands::References { .. } => "references",
            Commands::Transfer { .. } => "transfer",
        }
    }
}

fn base_url_from_env() -> String {
    env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn processor_config(global: &GlobalArgs, app_id: i32, filter: FilterOptions) -> ProcessorConfig {
    let config = ProcessorConfig {
        app_id,
        output_dir: global.output_dir.clone(),
        concurrency: global.concurrency.max(1),
        filter,
    };
    config.trace_loaded();
    config
}

fn remote_access(global: &GlobalArgs, client: OnspringClient) -> RemoteAccess<OnspringClient> {
    RemoteAccess::new(client, RetryPolicy::new(global.max_attempts))
        .with_page_size(global.page_size)
}

fn app_filter(app: AppArgs, file_ids: Vec<i32>) -> FilterOptions {
    FilterOptions {
        field_ids: app.field_ids,
        record_ids: app.record_ids,
        report_id: app.report_id,
        file_ids,
    }
}

fn instance_client(instance: &InstanceSettings, which: &str) -> anyhow::Result<OnspringClient> {
    let base_url = instance.base_url.clone().unwrap_or_else(base_url_from_env);
    let api_key = instance
        .api_key
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("No API key for the {which} instance"))?;
    OnspringClient::new(&base_url, api_key)
}

fn invalid_settings(command: &str, e: anyhow::Error) -> ProcessStatus {
    tracing::error!(command, error = %e, "Invalid settings");
    ProcessStatus::InvalidSettings
}

fn finish(command: &str, outcome: Result<ProcessStatus, TransportError>) -> ProcessStatus {
    match outcome {
        Ok(status) => {
            tracing::info!(command, %status, "Command finished");
            status
        }
        Err(e) => {
            tracing::error!(
                command,
                error = %e,
                "Command aborted after repeated transport failures"
            );
            ProcessStatus::Failed
        }
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> ProcessStatus {
    tracing::info!("trace_initialised");
    let Cli { global, command } = cli;
    let name = command.name();
    tracing::info!(command = name, "Starting command");

    let writer = CsvReportWriter;
    let progress = ProgressIndicator::new();
    let sink = DiskFileSink;

    match command {
        Commands::Download { app } => {
            let remote = match OnspringClient::new_from_env() {
                Ok(client) => remote_access(&global, client),
                Err(e) => return invalid_settings(name, e),
            };
            let config = processor_config(&global, app.app_id, app_filter(app, Vec::new()));
            let processor = AttachmentsProcessor::new(&remote, &config, &sink, &writer, &progress);
            finish(name, processor.download().await)
        }
        Commands::Delete { app, file_ids } => {
            let remote = match OnspringClient::new_from_env() {
                Ok(client) => remote_access(&global, client),
                Err(e) => return invalid_settings(name, e),
            };
            let config = processor_config(&global, app.app_id, app_filter(app, file_ids));
            let processor = AttachmentsProcessor::new(&remote, &config, &sink, &writer, &progress);
            finish(name, processor.delete().await)
        }
        Commands::Report {
            app,
            file_ids,
            files_csv,
        } => {
            let file_ids = match merge_ids(&file_ids, files_csv.as_deref()) {
                Ok(ids) => ids,
                Err(e) => return invalid_settings(name, e),
            };
            let remote = match OnspringClient::new_from_env() {
                Ok(client) => remote_access(&global, client),
                Err(e) => return invalid_settings(name, e),
            };
            let config = processor_config(&global, app.app_id, app_filter(app, file_ids));
            let processor = AttachmentsProcessor::new(&remote, &config, &sink, &writer, &progress);
            finish(name, processor.report().await)
        }
        Commands::References {
            app_id,
            record_ids,
            records_csv,
            report_id,
        } => {
            let record_ids = match merge_ids(&record_ids, records_csv.as_deref()) {
                Ok(ids) => ids,
                Err(e) => return invalid_settings(name, e),
            };
            let remote = match OnspringClient::new_from_env() {
                Ok(client) => remote_access(&global, client),
                Err(e) => return invalid_settings(name, e),
            };
            let filter = FilterOptions {
                record_ids,
                report_id,
                ..FilterOptions::default()
            };
            let config = processor_config(&global, app_id, filter);
            let processor = RecordsProcessor::new(&remote, &config, &writer, &progress);
            finish(name, processor.find_references().await)
        }
        Commands::Transfer {
            settings,
            record_ids,
            report_id,
        } => {
            let settings = match load_transfer_settings(&settings) {
                Ok(settings) => settings,
                Err(e) => return invalid_settings(name, e),
            };
            let clients = instance_client(&settings.source_instance, "source").and_then(|source| {
                Ok((source, instance_client(&settings.target_instance, "target")?))
            });
            let (source, target) = match clients {
                Ok((source, target)) => {
                    (remote_access(&global, source), remote_access(&global, target))
                }
                Err(e) => return invalid_settings(name, e),
            };
            let filter = FilterOptions {
                record_ids,
                report_id,
                ..FilterOptions::default()
            };
            let config = processor_config(&global, settings.source_app_id, filter);
            let processor =
                TransferProcessor::new(&source, &target, &settings, &config, &writer, &progress);
            finish(name, processor.run().await)
        }
    }
}
