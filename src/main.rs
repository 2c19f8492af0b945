use std::fs::{self, OpenOptions};
use std::path::Path;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};
use simplelog::{
    ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};
use tokio::runtime::Runtime;

use rust_uploader::cli::{Args, Commands, SourceKind};
use rust_uploader::config::{PlatformConfig, TaskInfo};
use rust_uploader::models::ReturnCode;
use rust_uploader::orchestrator;

fn main() {
    // Parse arguments
    let args = Args::parse();

    let code = match run(&args) {
        Ok(code) => code,
        Err(err) => {
            // Logging may not be live yet when setup fails
            eprintln!("fleet-uploader: {:#}", err);
            ReturnCode::UnknownError
        }
    };
    process::exit(code.code());
}

fn run(args: &Args) -> Result<ReturnCode> {
    // Handle subcommands
    if let Some(Commands::InitConfig { path }) = &args.command {
        initialize_logging(args.verbose, None)?;
        PlatformConfig::write_template(path)?;
        info!("Platform config template written to {}", path.display());
        return Ok(ReturnCode::Success);
    }

    let (info, kind) = load_task(args)?;
    initialize_logging(args.verbose, Some(&info.output_root))?;
    info!(
        "fleet-uploader {} starting ({} mode, {} source)",
        env!("CARGO_PKG_VERSION"),
        args.mode,
        kind
    );

    // Fold platform config for this environment over the task tags
    let info = apply_platform_config(info, &args.mode)?;
    let sn = resolve_serial(args)?;

    let runtime = Runtime::new().context("Failed to create Tokio runtime")?;
    Ok(runtime.block_on(orchestrator::run(
        info,
        kind,
        sn,
        args.force_upload,
        args.skip_notify,
    )))
}

/// Load the task description and the discovery strategy from the arguments.
fn load_task(args: &Args) -> Result<(TaskInfo, SourceKind)> {
    let path = args
        .task_info
        .as_deref()
        .context("--task-info is required")?;
    let kind = args.source_type.context("--source-type is required")?;
    let info = TaskInfo::from_json_file(path)?;
    Ok((info, kind))
}

/// Initialize console logging, plus a log file under `<output_root>/logs/`
/// once the task info tells us where the output root is.
fn initialize_logging(verbose: bool, output_root: Option<&Path>) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    if let Some(root) = output_root {
        let log_dir = root.join("logs");
        let opened = fs::create_dir_all(&log_dir).and_then(|_| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_dir.join("fleet-uploader.log"))
        });
        match opened {
            Ok(file) => loggers.push(WriteLogger::new(level, Config::default(), file)),
            Err(err) => eprintln!(
                "fleet-uploader: log file unavailable under {}: {}",
                log_dir.display(),
                err
            ),
        }
    }

    CombinedLogger::init(loggers).context("Failed to initialize logger")
}

/// Overlay the platform configuration section for this task's data type
/// onto the task tags. Config values win over tag values so deployments
/// stay in control of service endpoints.
fn apply_platform_config(mut info: TaskInfo, mode: &str) -> Result<TaskInfo> {
    let config = PlatformConfig::load(mode)?;
    let data_type = info.tag("data_type").unwrap_or_default().to_string();
    let source_type = info.tag("source_type").unwrap_or_default().to_string();
    info.apply_overlay(config.overlay(&data_type, &source_type));
    Ok(info)
}

/// Disk serial from the command line, falling back to the local hostname.
fn resolve_serial(args: &Args) -> Result<String> {
    if let Some(sn) = &args.sn {
        return Ok(sn.clone());
    }
    let name = hostname::get().context("Failed to read hostname")?;
    Ok(name.to_string_lossy().into_owned())
}
