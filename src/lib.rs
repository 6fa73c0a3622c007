//! # lamco-wallpaper
//!
//! Wayland wallpaper daemon for layer-shell compositors, plus the control
//! client that feeds it.
//!
//! The daemon puts one background-layer surface on every monitor. The
//! client decodes an image into a sealed memory region and hands the
//! daemon an open descriptor to it over a local socket; the daemon maps the
//! region, cover-scales it onto each target monitor and commits.
//!
//! # Architecture
//!
//! ```text
//! lamco-wallpaperd
//!   ├─> Event Loop (poll: wayland fd, signalfd, transfer socket)
//!   ├─> Wayland Session (registry, globals, dispatch)
//!   │     └─> Output Registry (monitors, layer surfaces, buffers)
//!   ├─> Transfer Server (header + name + SCM_RIGHTS descriptor)
//!   └─> Scaler (cover-fit resample into wl_shm buffers)
//!
//! lamco-wallpaperctl
//!   └─> decode → SealedRegion → Transfer Client
//! ```
//!
//! # Data Flow
//!
//! **Draw Path:** Image file → ctl decode → sealed memfd → socket → daemon
//! mmap → Scaler → wl_shm buffer → layer surface commit
//!
//! **Release Path:** Compositor `wl_buffer.release` → Output Registry →
//! buffer freed once it has been replaced

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Daemon configuration
pub mod config;

/// Error types and classification
pub mod error;

/// Sealed shared memory regions
pub mod shm;

/// Cover-fit scaler
pub mod scale;

/// Monitor records and the layer-surface state machine
pub mod output;

/// Display server seam and its Wayland implementation
pub mod compositor;

/// Image transfer protocol
pub mod transfer;

/// Daemon lifecycle and event loop
pub mod server;

/// Diagnostics and error formatting
pub mod utils;

pub use error::{ErrorClass, Result, WallpaperError};
