//! Wallpaper Daemon
//!
//! Owns the Wayland session, the signal descriptor and the transfer socket,
//! and runs the single-threaded loop that multiplexes them.
//!
//! # Startup
//!
//! ```text
//! Daemon::new
//!   ├─> check socket path free   (fails before touching the display)
//!   ├─> Wayland handshake        (globals, outputs, surfaces)
//!   ├─> block SIGINT/SIGQUIT/SIGTERM, open signalfd
//!   └─> bind transfer socket     (refuses an existing path)
//! ```
//!
//! # Teardown
//!
//! Whatever ends the loop, [`Daemon::shutdown`] destroys every surface,
//! buffer, output and global, flushes, and removes the socket path so the
//! next daemon can bind it.

use std::fmt;
use std::path::{Path, PathBuf};

use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};
use tracing::{debug, info, warn};

use crate::compositor::wayland::WaylandSession;
use crate::compositor::Compositor;
use crate::config::Config;
use crate::error::{Result, WallpaperError};
use crate::output::{ApplyReport, Content, OutputRegistry};
use crate::scale::ScaleFilter;
use crate::shm::SourceRegion;
use crate::transfer::{RequestKind, TransferError, TransferRequest, TransferServer};
use crate::utils::DaemonStats;

pub mod event_multiplexer;
mod multiplexer_loop;

pub use event_multiplexer::{Readiness, Wake};

/// Why the event loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Termination signal, by name
    Signal(String),
    /// Compositor closed the connection
    DisplayHangup,
    /// Wayland protocol or dispatch failure
    DisplayError(String),
}

impl ShutdownReason {
    /// Process exit code for this reason
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Signal(_) | Self::DisplayHangup => 0,
            Self::DisplayError(_) => 1,
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(name) => write!(f, "received {}", name),
            Self::DisplayHangup => write!(f, "compositor closed the connection"),
            Self::DisplayError(msg) => write!(f, "wayland error: {}", msg),
        }
    }
}

/// Apply one received request to the registry
///
/// The client's region is mapped for the duration of this call and
/// released before it returns, whatever happens on each monitor.
pub fn handle_request<C: Compositor>(
    outputs: &mut OutputRegistry<C>,
    backend: &mut C,
    request: TransferRequest,
    filter: ScaleFilter,
) -> Result<ApplyReport> {
    let target = request.name.as_deref();

    let report = match request.kind {
        RequestKind::Clear => outputs.apply(backend, target, Content::Clear, filter),
        RequestKind::Draw {
            width,
            height,
            region,
        } => {
            let source = SourceRegion::map(region, width, height).map_err(TransferError::from)?;
            outputs.apply(
                backend,
                target,
                Content::Image {
                    pixels: source.pixels(),
                    width: source.width(),
                    height: source.height(),
                },
                filter,
            )
        }
    };

    Ok(report)
}

fn termination_mask() -> SigSet {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGINT);
    mask.add(Signal::SIGQUIT);
    mask.add(Signal::SIGTERM);
    mask
}

/// Block SIGINT, SIGQUIT and SIGTERM for this thread and threads it spawns
///
/// Must run before any other thread exists, or one of them could receive
/// the signal with its default disposition.
pub fn block_termination_signals() -> Result<()> {
    termination_mask()
        .thread_block()
        .map_err(WallpaperError::Signal)
}

/// Descriptor that becomes readable when a termination signal is pending
fn termination_signals() -> Result<SignalFd> {
    block_termination_signals()?;
    SignalFd::with_flags(
        &termination_mask(),
        SfdFlags::SFD_CLOEXEC | SfdFlags::SFD_NONBLOCK,
    )
    .map_err(WallpaperError::Signal)
}

/// The running daemon
pub struct Daemon {
    session: WaylandSession,
    signals: SignalFd,
    server: TransferServer,
    filter: ScaleFilter,
    stats: DaemonStats,
}

impl Daemon {
    /// Connect, bind and prepare everything the loop waits on
    pub fn new(config: &Config, socket_path: PathBuf) -> Result<Self> {
        if socket_path.symlink_metadata().is_ok() {
            return Err(WallpaperError::SocketInUse(socket_path));
        }

        let mut session = WaylandSession::connect()?;
        session.handshake()?;

        let signals = termination_signals()?;
        let server = TransferServer::bind(&socket_path, config.read_timeout())?;

        Ok(Self {
            session,
            signals,
            server,
            filter: config.filter(),
            stats: DaemonStats::new(),
        })
    }

    /// Socket path the daemon listens on
    pub fn socket_path(&self) -> &Path {
        self.server.path()
    }

    /// Run until a signal arrives or the display goes away
    pub fn run(&mut self) -> ShutdownReason {
        info!("Wallpaper daemon running on {}", self.socket_path().display());
        let reason = multiplexer_loop::run(self);
        info!("Stopping: {}", reason);
        reason
    }

    fn serve_transfer(&mut self) {
        self.stats.requests += 1;

        let request = match self.server.serve_one() {
            Ok(request) => request,
            Err(e) => {
                warn!("Dropped transfer request: {}", e);
                self.stats.rejected += 1;
                return;
            }
        };

        let target = request.target().to_string();
        let (outputs, backend) = self.session.parts_mut();
        match handle_request(outputs, backend, request, self.filter) {
            Ok(report) => {
                info!(
                    "Request for {}: {} matched, {} drawn, {} cleared, {} skipped, {} failed",
                    target,
                    report.matched,
                    report.drawn,
                    report.cleared,
                    report.skipped,
                    report.failed
                );
                self.stats.record(&report);
            }
            Err(e) => {
                warn!("Dropped transfer request for {}: {}", target, e);
                self.stats.rejected += 1;
            }
        }
    }

    fn signal_name(&mut self) -> String {
        match self.signals.read_signal() {
            Ok(Some(info)) => Signal::try_from(info.ssi_signo as i32)
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|_| format!("signal {}", info.ssi_signo)),
            Ok(None) => "termination signal".to_string(),
            Err(e) => {
                debug!("Failed to read signalfd: {}", e);
                "termination signal".to_string()
            }
        }
    }

    /// Release every Wayland object and remove the socket path
    pub fn shutdown(mut self) {
        self.session.shutdown();
        self.stats.log_status();
        // Dropping the server unlinks the socket path
        drop(self.server);
    }
}
