//! Utility Functions and Diagnostics
//!
//! Startup diagnostics, daemon counters, and user-friendly error formatting.
//!
//! ## Diagnostics
//!
//! ```rust,no_run
//! use lamco_wallpaper::utils::{detect_compositor, SystemInfo};
//!
//! SystemInfo::gather().log();
//! if let Some(compositor) = detect_compositor() {
//!     println!("Running on: {}", compositor);
//! }
//! ```
//!
//! ## Error Formatting
//!
//! ```rust,no_run
//! use lamco_wallpaper::utils::format_user_error;
//!
//! fn run() -> anyhow::Result<()> {
//!     Ok(())
//! }
//!
//! if let Err(e) = run() {
//!     eprintln!("{}", format_user_error(&e));
//! }
//! ```
//!
//! Error categories with context-aware help:
//! - Runtime directory / socket path problems
//! - Stale or foreign socket at the daemon path
//! - Daemon not running (client side)
//! - Compositor without layer-shell support
//! - Config syntax and values

pub mod diagnostics;
pub mod errors;

pub use diagnostics::{detect_compositor, log_startup_diagnostics, DaemonStats, SystemInfo};
pub use errors::format_user_error;
