//! lamco-wallpaperd - Wayland wallpaper daemon
//!
//! Entry point for the daemon binary.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lamco_wallpaper::config::{Config, LoggingConfig};
use lamco_wallpaper::server::{block_termination_signals, Daemon};
use lamco_wallpaper::utils::{format_user_error, log_startup_diagnostics};

const LOG_FILE_NAME: &str = "lamco-wallpaperd.log";

/// Command-line arguments for lamco-wallpaperd
#[derive(Parser, Debug)]
#[command(name = "lamco-wallpaperd")]
#[command(version, about = "Wayland wallpaper daemon", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, env = "LAMCO_WALLPAPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Stay attached to the terminal
    #[arg(short, long)]
    pub foreground: bool,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Write logs to file (in addition to stdout)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", format_user_error(&e));
            1
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    // Before anything can spawn a thread
    block_termination_signals().context("Failed to block termination signals")?;

    let args = Args::parse();

    let config = Config::load_or_default(args.config.as_deref())?;
    init_logging(&args, &config.logging)?;

    info!("════════════════════════════════════════════════════════");
    info!("  lamco-wallpaperd v{}", env!("CARGO_PKG_VERSION"));
    info!("  Built: {}", env!("BUILD_DATE"));
    info!("  Commit: {}", env!("GIT_HASH"));
    info!("  Profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });
    info!("════════════════════════════════════════════════════════");

    tracing::debug!("Config: {:?}", config);

    // Detaching changes the working directory, so pin the path first
    let socket_path = std::path::absolute(config.socket_path()?)
        .context("Failed to resolve socket path")?;

    log_startup_diagnostics(&socket_path);

    let mut daemon = Daemon::new(&config, socket_path)?;

    if !args.foreground {
        info!("Detaching from terminal");
        nix::unistd::daemon(false, false).context("Failed to detach from terminal")?;
    }

    let reason = daemon.run();
    daemon.shutdown();

    info!("lamco-wallpaperd shut down");
    Ok(reason.exit_code())
}

fn file_writer(args: &Args, logging: &LoggingConfig) -> Result<Option<BoxMakeWriter>> {
    if let Some(path) = &args.log_file {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        return Ok(Some(BoxMakeWriter::new(file)));
    }

    if let Some(dir) = &logging.log_dir {
        let dir = absolute_dir(dir)?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        return Ok(Some(BoxMakeWriter::new(tracing_appender::rolling::never(
            dir,
            LOG_FILE_NAME,
        ))));
    }

    Ok(None)
}

fn absolute_dir(dir: &Path) -> Result<PathBuf> {
    std::path::absolute(dir).with_context(|| format!("Invalid log directory {}", dir.display()))
}

fn init_logging(args: &Args, logging: &LoggingConfig) -> Result<()> {
    let log_level = match args.verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Our crate at the requested level, wayland-client and friends only when noisy
        tracing_subscriber::EnvFilter::new(format!(
            "lamco_wallpaper={level},lamco_wallpaperd={level},warn",
            level = log_level
        ))
    });

    let file = file_writer(args, logging)?;
    let to_file = file.is_some();

    match args.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stdout),
                )
                .with(file.map(|w| {
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(w)
                        .with_ansi(false)
                }))
                .init();
        }
        "compact" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_writer(std::io::stdout),
                )
                .with(file.map(|w| {
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_writer(w)
                        .with_ansi(false)
                }))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stdout),
                )
                .with(file.map(|w| {
                    tracing_subscriber::fmt::layer()
                        .with_writer(w)
                        .with_ansi(false)
                }))
                .init();
        }
    }

    if to_file {
        info!("Logging to file");
    } else if !args.foreground {
        warn!("No log file configured; logs are lost once the daemon detaches");
    }

    Ok(())
}
