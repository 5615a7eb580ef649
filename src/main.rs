//! vmtend - main entry point
//!
//! Invoked by a scheduler once per maintenance tick. Each invocation runs
//! one patch phase or one encryption tick and exits.

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use vmtend::cli::{Cli, Commands, EncryptCommand, PatchCommand};
use vmtend::{
    Context, CycleMode, CycleOutcome, EncryptionStateMachine, MaintConfig, PatchController,
    process_guard,
};

/// Initialize the tracing subscriber. `RUST_LOG` overrides the default `info`.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    info!("vmtend starting up");

    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    debug!("Signal handlers initialized");

    let cli = Cli::parse_args();
    debug!("CLI arguments parsed: {:?}", cli);

    match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::Patch { action } => {
            let config = load_config(cli.config.as_deref(), cli.lib_dir)?;
            run_patch(action, Context::from_config(config, cli.dry_run)?)
        }
        Commands::Encrypt { action } => {
            let config = load_config(cli.config.as_deref(), cli.lib_dir)?;
            run_encrypt(action, Context::from_config(config, cli.dry_run)?)
        }
    }
}

fn validate(path: &Path) -> Result<()> {
    info!("Validating configuration file: {:?}", path);
    let config = MaintConfig::load_from_file(path)?;
    match config.validate() {
        Ok(()) => {
            info!("Configuration validation successful");
            println!("✓ Configuration file is valid: {:?}", path);
            Ok(())
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Load the configuration file, or defaults when none is given, then apply
/// command-line overrides.
fn load_config(path: Option<&Path>, lib_dir: Option<PathBuf>) -> Result<MaintConfig> {
    let mut config = match path {
        Some(path) => MaintConfig::load_from_file(path)?,
        None => {
            debug!("No configuration file given, using defaults");
            MaintConfig::default()
        }
    };

    if let Some(lib_dir) = lib_dir {
        config.lib_dir = lib_dir;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn run_patch(action: PatchCommand, ctx: Context) -> Result<()> {
    let one_off = ctx.config().is_one_off();
    let controller = PatchController::new(ctx);

    let mode = match action {
        PatchCommand::InstallDeps => {
            if !controller.install_dependencies() {
                std::process::exit(1);
            }
            return Ok(());
        }
        PatchCommand::Download => CycleMode::Download,
        PatchCommand::Patch => CycleMode::Patch,
        PatchCommand::OneOff => CycleMode::OneOff,
        PatchCommand::Cycle if one_off => CycleMode::OneOff,
        PatchCommand::Cycle => CycleMode::Full,
    };

    match controller.run_cycle(mode)? {
        CycleOutcome::NoUpgrades => {
            info!("Nothing to upgrade, exiting");
            std::process::exit(0);
        }
        CycleOutcome::Completed(report) => {
            if !report.failed.is_empty() {
                warn!("Packages that failed to patch: {}", report.failed.join(" "));
            }
            Ok(())
        }
    }
}

fn run_encrypt(action: EncryptCommand, ctx: Context) -> Result<()> {
    let machine = EncryptionStateMachine::new(ctx);
    if machine.states().is_empty() {
        warn!("No encryption states configured");
    }

    match action {
        EncryptCommand::Run => {
            let report = machine.run();
            if let Some(failed) = report.failed {
                error!("Encryption state {} failed, it will be retried on the next run", failed);
                std::process::exit(1);
            }
        }
        EncryptCommand::Status => {
            for state in machine.status()? {
                let mark = if state.completed { "✓" } else { " " };
                println!("[{}] {}", mark, state.name);
            }
        }
    }
    Ok(())
}
