use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use ocrdesk_lib::backend::config::{get_data_dir, get_settings_path, load_settings};

/// OCR Desk host: runs the OCR backend and keeps it supervised.
#[derive(Debug, Parser)]
#[command(name = "ocrdesk", version, about)]
struct Cli {
    /// Data directory holding settings.json
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Backend port
    #[arg(long)]
    port: Option<u16>,
    /// Backend executable
    #[arg(long)]
    executable: Option<PathBuf>,
    /// Backend working directory
    #[arg(long)]
    working_dir: Option<PathBuf>,
    /// Health check attempts before giving up
    #[arg(long)]
    max_attempts: Option<u32>,
    /// Delay between health checks in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let data_dir = cli.data_dir.clone().unwrap_or_else(get_data_dir);
    let settings_path = get_settings_path(&data_dir);
    log::info!("[Startup] Settings: {}", settings_path.display());

    let mut settings = load_settings(&settings_path);
    settings.apply_env_overrides();
    if let Some(port) = cli.port {
        settings.port = port;
    }
    if let Some(exe) = cli.executable {
        settings.executable = Some(exe);
    }
    if let Some(dir) = cli.working_dir {
        settings.working_dir = Some(dir);
    }
    if let Some(n) = cli.max_attempts {
        settings.probe.max_attempts = n;
    }
    if let Some(ms) = cli.delay_ms {
        settings.probe.delay_ms = ms;
    }

    if let Err(e) = settings.validate() {
        log::error!("[Startup] {}", e);
        return ExitCode::from(2);
    }

    match ocrdesk_lib::run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("[Startup] {}", e);
            ExitCode::FAILURE
        }
    }
}
