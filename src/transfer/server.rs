//! Listening side of the transfer socket

use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{read_request, TransferRequest};
use crate::error::{Result, WallpaperError};

/// Bound transfer socket
///
/// The socket path is removed when the server is dropped. A path that
/// already exists is never taken over.
#[derive(Debug)]
pub struct TransferServer {
    listener: UnixListener,
    path: PathBuf,
    read_timeout: Option<Duration>,
}

impl TransferServer {
    /// Bind and listen on `path`
    pub fn bind(path: &Path, read_timeout: Option<Duration>) -> Result<Self> {
        if path.symlink_metadata().is_ok() {
            return Err(WallpaperError::SocketInUse(path.to_path_buf()));
        }

        let listener = UnixListener::bind(path).map_err(|source| WallpaperError::SocketSetup {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Listening on {}", path.display());

        Ok(Self {
            listener,
            path: path.to_path_buf(),
            read_timeout,
        })
    }

    /// Socket path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Listening descriptor, for readiness polling
    pub fn listen_fd(&self) -> BorrowedFd<'_> {
        self.listener.as_fd()
    }

    /// Accept one pending connection and read its request
    ///
    /// The connection is closed when this returns, whatever the outcome.
    pub fn serve_one(&self) -> Result<TransferRequest> {
        let (stream, _) = self.listener.accept()?;
        self.read_from(&stream)
    }

    fn read_from(&self, stream: &UnixStream) -> Result<TransferRequest> {
        stream.set_read_timeout(self.read_timeout)?;
        let request = read_request(stream)?;
        debug!("Received request for {}", request.target());
        Ok(request)
    }
}

impl Drop for TransferServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove socket {}: {}", self.path.display(), e);
        }
    }
}
