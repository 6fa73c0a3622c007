//! lamco-wallpaperctl entry point
//!
//! Hands an image, or a clear request, to a running lamco-wallpaperd.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, warn};

use lamco_wallpaper::config::Config;
use lamco_wallpaper::transfer::client::{self, Payload};
use lamco_wallpaper::utils::format_user_error;

mod decode;

/// Command-line arguments for lamco-wallpaperctl
#[derive(Parser, Debug)]
#[command(name = "lamco-wallpaperctl")]
#[command(version, about = "Set or clear the wallpaper of a running lamco-wallpaperd", long_about = None)]
struct Args {
    /// Only affect the output with this name
    #[arg(short = 'd', long = "display", value_name = "NAME")]
    display: Option<String>,

    /// Clear the wallpaper instead of drawing one
    #[arg(short, long)]
    clear: bool,

    /// Configuration file path (only the socket path is used)
    #[arg(long, env = "LAMCO_WALLPAPER_CONFIG")]
    config: Option<PathBuf>,

    /// Image file, or `-` for stdin
    #[arg(value_name = "FILE", default_value = "-")]
    file: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    if let Err(e) = run(Args::parse()) {
        eprintln!("{}", format_user_error(&e));
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::load_or_default(args.config.as_deref())?;
    let socket = config.socket_path()?;
    debug!("Daemon socket: {}", socket.display());

    let name = args.display.as_deref();

    if args.clear {
        if args.file != Path::new("-") {
            warn!("Ignoring {} because --clear was given", args.file.display());
        }
        client::send(&socket, name, None).context("Failed to send clear request")?;
        return Ok(());
    }

    let image = decode::load(&args.file)?;
    let region = decode::seal(&image)?;
    debug!("Sending {}x{} image", image.width(), image.height());

    client::send(
        &socket,
        name,
        Some(Payload {
            region: &region,
            width: image.width(),
            height: image.height(),
        }),
    )
    .context("Failed to send image")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_defaults_to_stdin() {
        let args = Args::try_parse_from(["lamco-wallpaperctl"]).unwrap();
        assert_eq!(args.file, Path::new("-"));
        assert!(!args.clear);
        assert!(args.display.is_none());
    }

    #[test]
    fn test_file_and_output_name() {
        let args =
            Args::try_parse_from(["lamco-wallpaperctl", "-d", "DP-1", "/tmp/bg.png"]).unwrap();
        assert_eq!(args.file, Path::new("/tmp/bg.png"));
        assert_eq!(args.display.as_deref(), Some("DP-1"));
    }

    #[test]
    fn test_clear_needs_no_file() {
        let args = Args::try_parse_from(["lamco-wallpaperctl", "--clear"]).unwrap();
        assert!(args.clear);
        assert_eq!(args.file, Path::new("-"));
    }
}
