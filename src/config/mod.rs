//! Configuration management
//!
//! Handles loading and validation of configuration from:
//! - An optional TOML file
//! - Environment variables (socket path override)
//! - CLI arguments (config path, log overrides)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::WallpaperError;
use crate::scale::ScaleFilter;

pub mod types;

pub use types::{LoggingConfig, RenderConfig, SocketConfig};

/// Environment variable that overrides the socket path
pub const SOCKET_ENV: &str = "LAMCO_WALLPAPER_SOCKET";

/// Socket file name inside `$XDG_RUNTIME_DIR`
pub const SOCKET_FILE: &str = "lamco-wallpaper.sock";

/// Longest path `sockaddr_un.sun_path` holds, excluding the NUL
pub const MAX_SOCKET_PATH: usize = 107;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Transfer socket configuration
    #[serde(default)]
    pub socket: SocketConfig,
    /// Rendering configuration
    #[serde(default)]
    pub render: RenderConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Load an explicit file, or the default file if it exists, or defaults
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `$XDG_CONFIG_HOME/lamco-wallpaper/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("lamco-wallpaper").join("config.toml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if ScaleFilter::from_name(&self.render.filter).is_none() {
            anyhow::bail!("Invalid render filter: {}", self.render.filter);
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        if self.socket.read_timeout_ms == Some(0) {
            anyhow::bail!("socket.read_timeout_ms must be positive when set");
        }

        Ok(())
    }

    /// Resampling filter
    pub fn filter(&self) -> ScaleFilter {
        ScaleFilter::from_name(&self.render.filter).unwrap_or_default()
    }

    /// Per-connection read timeout
    pub fn read_timeout(&self) -> Option<Duration> {
        self.socket.read_timeout_ms.map(Duration::from_millis)
    }

    /// Socket path from the environment and this configuration
    pub fn socket_path(&self) -> crate::error::Result<PathBuf> {
        resolve_socket_path(
            std::env::var_os(SOCKET_ENV).map(PathBuf::from),
            self.socket.path.clone(),
            std::env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from),
        )
    }
}

/// Pick the socket path: override, then configured path, then runtime dir
pub fn resolve_socket_path(
    override_path: Option<PathBuf>,
    configured: Option<PathBuf>,
    runtime_dir: Option<PathBuf>,
) -> crate::error::Result<PathBuf> {
    let path = match override_path
        .filter(|p| !p.as_os_str().is_empty())
        .or(configured)
    {
        Some(path) => path,
        None => {
            let dir = runtime_dir.ok_or(WallpaperError::RuntimeDirUnset)?;
            if dir.as_os_str().is_empty() {
                return Err(WallpaperError::RuntimeDirEmpty);
            }
            dir.join(SOCKET_FILE)
        }
    };

    if path.as_os_str().len() > MAX_SOCKET_PATH {
        return Err(WallpaperError::SocketPathTooLong(path));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.filter(), ScaleFilter::CatmullRom);
        assert_eq!(config.logging.level, "info");
        assert!(config.read_timeout().is_none());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[render]\nfilter = \"lanczos3\"\n\n[socket]\nread_timeout_ms = 250\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.filter(), ScaleFilter::Lanczos3);
        assert_eq!(config.read_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_validation_invalid_filter() {
        let mut config = Config::default();
        config.render.filter = "bicubic".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_or_default(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_socket_path_from_runtime_dir() {
        let path = resolve_socket_path(None, None, Some("/run/user/1000".into())).unwrap();
        assert_eq!(path, PathBuf::from("/run/user/1000/lamco-wallpaper.sock"));
    }

    #[test]
    fn test_socket_path_precedence() {
        let path = resolve_socket_path(
            Some("/tmp/override.sock".into()),
            Some("/tmp/configured.sock".into()),
            Some("/run/user/1000".into()),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/tmp/override.sock"));

        let path =
            resolve_socket_path(None, Some("/tmp/configured.sock".into()), None).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/configured.sock"));

        // An empty override counts as unset
        let path = resolve_socket_path(Some("".into()), None, Some("/run/user/1".into())).unwrap();
        assert_eq!(path, PathBuf::from("/run/user/1/lamco-wallpaper.sock"));
    }

    #[test]
    fn test_runtime_dir_required() {
        assert!(matches!(
            resolve_socket_path(None, None, None),
            Err(WallpaperError::RuntimeDirUnset)
        ));
        assert!(matches!(
            resolve_socket_path(None, None, Some("".into())),
            Err(WallpaperError::RuntimeDirEmpty)
        ));
    }

    #[test]
    fn test_overlong_socket_path() {
        let long = PathBuf::from("/").join("d".repeat(120));
        assert!(matches!(
            resolve_socket_path(None, None, Some(long)),
            Err(WallpaperError::SocketPathTooLong(_))
        ));
    }
}
