//! Daemon Error Types
//!
//! Top-level error type for the wallpaper daemon plus the classification
//! used by the event loop to decide whether an error ends the process,
//! ends one request, or only affects one monitor.

use std::path::PathBuf;

use thiserror::Error;

use crate::scale::ScaleError;
use crate::shm::ShmError;
use crate::transfer::TransferError;

/// Result type for daemon operations
pub type Result<T> = std::result::Result<T, WallpaperError>;

/// Daemon error types
#[derive(Error, Debug)]
pub enum WallpaperError {
    /// `$XDG_RUNTIME_DIR` is not set
    #[error("$XDG_RUNTIME_DIR is unset")]
    RuntimeDirUnset,

    /// `$XDG_RUNTIME_DIR` is set but empty
    #[error("$XDG_RUNTIME_DIR is empty")]
    RuntimeDirEmpty,

    /// Socket path does not fit in `sockaddr_un.sun_path`
    #[error("socket path {} is too long", .0.display())]
    SocketPathTooLong(PathBuf),

    /// Something already exists at the socket path (another daemon, or a stale socket)
    #[error("socket {} already exists; is another daemon running?", .0.display())]
    SocketInUse(PathBuf),

    /// Failed to create or bind the transfer socket
    #[error("failed to set up socket {}: {source}", path.display())]
    SocketSetup {
        /// Socket path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Connection to the Wayland display failed
    #[error("failed to connect to wayland display: {0}")]
    WaylandConnect(String),

    /// A required global was never announced by the compositor
    #[error("compositor does not provide the {0} global")]
    MissingGlobal(&'static str),

    /// A required global is advertised at a version lower than we need
    #[error("the v{required} {interface} interface is required, but the compositor only supports v{offered}")]
    UnsupportedVersion {
        /// Interface name
        interface: String,
        /// Minimum version we bind
        required: u32,
        /// Version the compositor offered
        offered: u32,
    },

    /// Wayland protocol or dispatch error
    #[error("wayland protocol error: {0}")]
    Protocol(String),

    /// Signal setup failed
    #[error("signal setup failed: {0}")]
    Signal(#[source] nix::Error),

    /// Surface creation requested before the required globals are bound
    #[error("surface prerequisites (compositor, layer shell) are not bound yet")]
    SurfaceNotReady,

    /// Shared memory error
    #[error(transparent)]
    Shm(#[from] ShmError),

    /// Scaling error
    #[error(transparent)]
    Scale(#[from] ScaleError),

    /// Transfer protocol error
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error classification, mirrors how the daemon reacts to each error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Startup failure: report and exit
    Fatal,
    /// One transfer request failed: drop the connection, keep serving
    Request,
    /// One monitor failed during a request: other monitors still draw
    Monitor,
    /// Display connection broke: orderly shutdown
    Protocol,
}

impl WallpaperError {
    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RuntimeDirUnset
            | Self::RuntimeDirEmpty
            | Self::SocketPathTooLong(_)
            | Self::SocketInUse(_)
            | Self::SocketSetup { .. }
            | Self::WaylandConnect(_)
            | Self::MissingGlobal(_)
            | Self::UnsupportedVersion { .. }
            | Self::Signal(_) => ErrorClass::Fatal,
            Self::Protocol(_) => ErrorClass::Protocol,
            Self::Shm(_) | Self::Scale(_) | Self::SurfaceNotReady => ErrorClass::Monitor,
            Self::Transfer(_) | Self::Io(_) => ErrorClass::Request,
        }
    }

    /// Whether the process must stop because of this error
    pub fn is_fatal(&self) -> bool {
        matches!(self.class(), ErrorClass::Fatal | ErrorClass::Protocol)
    }
}
