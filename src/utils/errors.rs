//! User-Friendly Error Formatting
//!
//! Turns fatal errors into a message with troubleshooting hints, printed to
//! stderr by both binaries before they exit.

use std::fmt::Write;

use crate::error::WallpaperError;
use crate::transfer::TransferError;

/// What went wrong, as far as the hints are concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    RuntimeDir,
    SocketInUse,
    DaemonNotRunning,
    Display,
    LayerShell,
    Config,
    Image,
    Other,
}

fn categorize(error: &anyhow::Error) -> Category {
    for cause in error.chain() {
        if let Some(err) = cause.downcast_ref::<WallpaperError>() {
            return match err {
                WallpaperError::RuntimeDirUnset
                | WallpaperError::RuntimeDirEmpty
                | WallpaperError::SocketPathTooLong(_) => Category::RuntimeDir,
                WallpaperError::SocketInUse(_) => Category::SocketInUse,
                WallpaperError::WaylandConnect(_) | WallpaperError::Protocol(_) => {
                    Category::Display
                }
                WallpaperError::MissingGlobal(_) | WallpaperError::UnsupportedVersion { .. } => {
                    Category::LayerShell
                }
                _ => Category::Other,
            };
        }
        if let Some(TransferError::DaemonNotRunning(_)) = cause.downcast_ref::<TransferError>() {
            return Category::DaemonNotRunning;
        }
        if cause.downcast_ref::<image::ImageError>().is_some() {
            return Category::Image;
        }
        if cause.downcast_ref::<toml::de::Error>().is_some() {
            return Category::Config;
        }
    }

    let msg = error.to_string();
    if msg.contains("config") {
        Category::Config
    } else {
        Category::Other
    }
}

/// Format error for user consumption
///
/// Takes technical error and produces user-friendly message with
/// troubleshooting steps and context.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "╔════════════════════════════════════════════════════════════╗"
    )
    .ok();
    writeln!(
        &mut output,
        "║                     ERROR                                  ║"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();
    writeln!(&mut output).ok();

    match categorize(error) {
        Category::RuntimeDir => format_runtime_dir_error(&mut output),
        Category::SocketInUse => format_socket_in_use_error(&mut output),
        Category::DaemonNotRunning => format_not_running_error(&mut output),
        Category::Display => format_display_error(&mut output),
        Category::LayerShell => format_layer_shell_error(&mut output),
        Category::Config => format_config_error(&mut output),
        Category::Image => format_image_error(&mut output),
        Category::Other => {
            writeln!(&mut output, "Wallpaper Error").ok();
        }
    }

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Technical Details:").ok();
    writeln!(&mut output).ok();
    writeln!(&mut output, "{:#}", error).ok();
    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Need Help?").ok();
    writeln!(
        &mut output,
        "  - Run the daemon in the foreground with logs: lamco-wallpaperd -f -vv"
    )
    .ok();
    writeln!(
        &mut output,
        "  - Report issues: https://github.com/lamco-admin/lamco-wallpaper/issues"
    )
    .ok();

    output
}

fn format_runtime_dir_error(output: &mut String) {
    writeln!(output, "Socket Location Error").ok();
    writeln!(output).ok();
    writeln!(output, "Could not work out where the wallpaper socket lives.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. XDG_RUNTIME_DIR is not set").ok();
    writeln!(output, "     → Check: echo $XDG_RUNTIME_DIR").ok();
    writeln!(output, "     → Usually set by the login manager or pam_systemd").ok();
    writeln!(output).ok();
    writeln!(output, "  2. The socket path is longer than 107 bytes").ok();
    writeln!(output, "     → Set LAMCO_WALLPAPER_SOCKET to a shorter path").ok();
}

fn format_socket_in_use_error(output: &mut String) {
    writeln!(output, "Socket Already Exists").ok();
    writeln!(output).ok();
    writeln!(output, "Something already exists at the wallpaper socket path.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Another lamco-wallpaperd is running").ok();
    writeln!(output, "     → Check: pgrep -a lamco-wallpaperd").ok();
    writeln!(output).ok();
    writeln!(output, "  2. A previous daemon was killed without cleaning up").ok();
    writeln!(output, "     → Remove the stale socket named below and retry").ok();
}

fn format_not_running_error(output: &mut String) {
    writeln!(output, "Daemon Not Running").ok();
    writeln!(output).ok();
    writeln!(output, "No wallpaper daemon is listening on the socket.").ok();
    writeln!(output).ok();
    writeln!(output, "  → Start it: lamco-wallpaperd").ok();
    writeln!(
        output,
        "  → If it runs with LAMCO_WALLPAPER_SOCKET, export the same value here"
    )
    .ok();
}

fn format_display_error(output: &mut String) {
    writeln!(output, "Wayland Connection Error").ok();
    writeln!(output).ok();
    writeln!(output, "Could not talk to the Wayland compositor.").ok();
    writeln!(output).ok();
    writeln!(output, "  → Check: echo $WAYLAND_DISPLAY (should not be empty)").ok();
    writeln!(output, "  → The daemon must run inside the graphical session").ok();
}

fn format_layer_shell_error(output: &mut String) {
    writeln!(output, "Unsupported Compositor").ok();
    writeln!(output).ok();
    writeln!(
        output,
        "The compositor lacks a protocol needed for background surfaces."
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "  → zwlr_layer_shell_v1 is required (Sway, Hyprland, river,").ok();
    writeln!(output, "    labwc, KDE Plasma and other wlroots-style compositors)").ok();
    writeln!(output, "  → GNOME Shell does not offer it").ok();
}

fn format_config_error(output: &mut String) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "Problem with configuration file.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Invalid TOML syntax").ok();
    writeln!(output, "     → Check for typos, missing quotes, etc.").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Unknown value").ok();
    writeln!(
        output,
        "     → render.filter: nearest, triangle, catmull-rom or lanczos3"
    )
    .ok();
    writeln!(output, "     → logging.level: trace, debug, info, warn or error").ok();
}

fn format_image_error(output: &mut String) {
    writeln!(output, "Image Error").ok();
    writeln!(output).ok();
    writeln!(output, "The image could not be decoded.").ok();
    writeln!(output).ok();
    writeln!(output, "  → Supported formats: PNG, JPEG, BMP").ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_user_error() {
        let error = anyhow::Error::new(WallpaperError::SocketInUse(PathBuf::from(
            "/run/user/1000/lamco-wallpaper.sock",
        )));
        let formatted = format_user_error(&error);
        assert!(formatted.contains("ERROR"));
        assert!(formatted.contains("Socket Already Exists"));
        assert!(formatted.contains("/run/user/1000/lamco-wallpaper.sock"));
    }

    #[test]
    fn test_category_survives_context() {
        let error = anyhow::Error::new(WallpaperError::MissingGlobal("zwlr_layer_shell_v1"))
            .context("Wayland startup failed");
        assert_eq!(categorize(&error), Category::LayerShell);
    }

    #[test]
    fn test_daemon_not_running_hint() {
        let error = anyhow::Error::new(TransferError::DaemonNotRunning(PathBuf::from("/x")));
        let formatted = format_user_error(&error);
        assert!(formatted.contains("lamco-wallpaperd"));
    }

    #[test]
    fn test_unknown_error_still_formats() {
        let error = anyhow::anyhow!("something odd");
        assert_eq!(categorize(&error), Category::Other);
        assert!(format_user_error(&error).contains("something odd"));
    }
}
