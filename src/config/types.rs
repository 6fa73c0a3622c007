//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Transfer socket configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Explicit socket path (None = `$XDG_RUNTIME_DIR/lamco-wallpaper.sock`)
    pub path: Option<PathBuf>,

    /// Drop a client that stalls longer than this while sending (None = wait forever)
    pub read_timeout_ms: Option<u64>,
}

/// Rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Resampling filter ("nearest", "triangle", "catmull-rom", "lanczos3")
    pub filter: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            filter: "catmull-rom".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    pub level: String,

    /// Directory for log files (None = console only)
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}
