//! System Diagnostics and Status Reporting
//!
//! Environment details logged at startup and request counters logged at
//! shutdown.

use std::path::Path;
use std::time::{Duration, Instant};

use sysinfo::System;
use tracing::info;

use crate::output::ApplyReport;

/// System information for diagnostics
#[derive(Debug, Clone)]
pub struct SystemInfo {
    /// Operating system name (e.g., "Arch Linux")
    pub os_name: String,
    /// Operating system version string
    pub os_version: String,
    /// Kernel version string
    pub kernel_version: String,
    /// System hostname
    pub hostname: String,
}

impl SystemInfo {
    /// Gather system information
    pub fn gather() -> Self {
        Self {
            os_name: System::name().unwrap_or_else(|| "Unknown".to_string()),
            os_version: System::os_version().unwrap_or_else(|| "Unknown".to_string()),
            kernel_version: System::kernel_version().unwrap_or_else(|| "Unknown".to_string()),
            hostname: System::host_name().unwrap_or_else(|| "Unknown".to_string()),
        }
    }

    /// Log system information
    pub fn log(&self) {
        info!("=== System Information ===");
        info!("  OS: {} {}", self.os_name, self.os_version);
        info!("  Kernel: {}", self.kernel_version);
        info!("  Hostname: {}", self.hostname);
    }
}

/// Request counters for the daemon
#[derive(Debug, Clone)]
pub struct DaemonStats {
    /// Daemon start time
    pub start_time: Instant,
    /// Connections accepted
    pub requests: u64,
    /// Connections dropped because the request was unusable
    pub rejected: u64,
    /// Frames put on screen, summed over monitors
    pub frames_drawn: u64,
    /// Monitors cleared
    pub clears: u64,
    /// Per-monitor failures
    pub monitor_failures: u64,
}

impl DaemonStats {
    /// Create new stats
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            requests: 0,
            rejected: 0,
            frames_drawn: 0,
            clears: 0,
            monitor_failures: 0,
        }
    }

    /// Fold in the outcome of one request
    pub fn record(&mut self, report: &ApplyReport) {
        self.frames_drawn += report.drawn as u64;
        self.clears += report.cleared as u64;
        self.monitor_failures += report.failed as u64;
    }

    /// Get uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Format uptime as string
    pub fn uptime_string(&self) -> String {
        let secs = self.uptime().as_secs();
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }

    /// Log current status
    pub fn log_status(&self) {
        info!("=== Daemon Status ===");
        info!("  Uptime: {}", self.uptime_string());
        info!("  Requests: {} ({} rejected)", self.requests, self.rejected);
        info!("  Frames drawn: {}", self.frames_drawn);
        info!("  Clears: {}", self.clears);
        info!("  Monitor failures: {}", self.monitor_failures);
    }
}

impl Default for DaemonStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Detect Wayland compositor
pub fn detect_compositor() -> Option<String> {
    if let Ok(compositor) = std::env::var("XDG_CURRENT_DESKTOP") {
        return Some(compositor);
    }

    if let Ok(wayland_display) = std::env::var("WAYLAND_DISPLAY") {
        return Some(format!("Wayland ({})", wayland_display));
    }

    None
}

/// Log complete diagnostics on startup
pub fn log_startup_diagnostics(socket: &Path) {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║          Startup Diagnostics                               ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    SystemInfo::gather().log();

    info!("=== Environment ===");
    match detect_compositor() {
        Some(compositor) => info!("  Compositor: {}", compositor),
        None => info!("  Compositor: Unknown (not in Wayland session?)"),
    }
    match std::env::var("WAYLAND_DISPLAY") {
        Ok(wayland_display) => info!("  WAYLAND_DISPLAY: {}", wayland_display),
        Err(_) => info!("  WAYLAND_DISPLAY: unset"),
    }
    info!("  Socket: {}", socket.display());

    info!("=== Build ===");
    info!("  Version: {}", env!("CARGO_PKG_VERSION"));
    #[cfg(debug_assertions)]
    info!("  Build: debug");
    #[cfg(not(debug_assertions))]
    info!("  Build: release");
}
