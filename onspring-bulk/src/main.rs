use clap::Parser;
use onspring_bulk::cli::{run, Cli};
use onspring_bulk_core::ProcessStatus;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.global.log_level.as_deref() {
        Some(level) => EnvFilter::try_new(level).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    }
    .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let status = tokio::select! {
        status = run(cli) => status,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, stopping outstanding work");
            ProcessStatus::Failed
        }
    };

    if status.is_success() {
        tracing::info!(%status, "CLI completed successfully");
    } else {
        tracing::error!(%status, code = status.code(), "CLI exited with error status");
    }
    ExitCode::from(status.code())
}
