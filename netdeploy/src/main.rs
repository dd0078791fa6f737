//! Netdeploy - Entry Point
//!
//! Renders intended configurations from inventory and templates, then pushes
//! the missing lines to every device in parallel.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::Context;
use netdeploy::app::run::{run, Mode, RunOutcome, RunRequest};
use netdeploy::errors::DeployError;
use netdeploy::logs::{init_logging, LogOptions};
use netdeploy::session::ssh::SshConnector;
use netdeploy::storage::env::DotEnv;
use netdeploy::storage::layout::StorageLayout;
use netdeploy::storage::settings::Settings;
use netdeploy::utils::version_info;

use tracing::{error, info, warn};

/// Exit status when a standalone validation flagged a device
const EXIT_VALIDATION_FAILED: i32 = 2;

/// Exit status when the run could not start at all
const EXIT_SETUP_ERROR: i32 = 3;

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("{e}"),
        }
        return;
    }

    let code = match execute(&cli_args).await {
        Ok(RunOutcome::Success) => 0,
        Ok(RunOutcome::Failure) => 1,
        Ok(RunOutcome::ValidationFailed) => EXIT_VALIDATION_FAILED,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("netdeploy: {e:#}");
            EXIT_SETUP_ERROR
        }
    };
    std::process::exit(code);
}

async fn execute(cli_args: &HashMap<String, String>) -> anyhow::Result<RunOutcome> {
    let layout = cli_args
        .get("root")
        .map(StorageLayout::new)
        .unwrap_or_default();

    // Project .env, then the settings file with overrides on top
    let dotenv = DotEnv::load(&layout.env_file())
        .await
        .context("unable to read .env")?;
    let (settings, warnings) = load_settings(&layout, &dotenv)
        .await
        .context("unable to load settings")?;

    // Initialize logging; the guard flushes the file sink on drop
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: Some(layout.logs_dir().path().to_path_buf()),
        json_format: settings.json_logs,
        ..Default::default()
    };
    let _guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };
    if !dotenv.is_empty() {
        info!("Read {} entries from {}", dotenv.len(), layout.env_file().path().display());
    }
    for warning in &warnings {
        warn!("{}", warning);
    }

    let mode = if cli_args.contains_key("cleanup") {
        Mode::Cleanup
    } else if cli_args.contains_key("backup") {
        Mode::Backup
    } else if cli_args.contains_key("validate") {
        Mode::Validate
    } else if cli_args.contains_key("plan") {
        Mode::Plan
    } else if cli_args.contains_key("generate-only") {
        Mode::GenerateOnly
    } else {
        Mode::Deploy
    };

    let max_workers = match cli_args.get("max-workers") {
        Some(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("invalid --max-workers value '{raw}'"))?,
        None => settings.max_workers,
    };

    info!(
        "Running netdeploy {} ({:?}, root {}, {} workers)",
        env!("CARGO_PKG_VERSION"),
        mode,
        layout.base_dir.display(),
        max_workers
    );

    let request = RunRequest {
        layout,
        mode,
        max_workers,
        password: dotenv.get("NET_PASSWORD"),
        connector: Arc::new(SshConnector),
    };
    let outcome = run(request, &settings).await?;
    Ok(outcome)
}

/// Read `settings.json` when present and apply environment overrides.
///
/// Returns the settings together with any override warnings.
async fn load_settings(
    layout: &StorageLayout,
    dotenv: &DotEnv,
) -> Result<(Settings, Vec<String>), DeployError> {
    let settings_file = layout.settings_file();
    let mut settings = if settings_file.exists().await {
        settings_file.read_json::<Settings>().await.map_err(|e| {
            DeployError::StorageError(format!(
                "{}: {}",
                settings_file.path().display(),
                e
            ))
        })?
    } else {
        Settings::default()
    };
    let warnings = settings.apply_overrides(|key| dotenv.get(key));
    Ok((settings, warnings))
}
