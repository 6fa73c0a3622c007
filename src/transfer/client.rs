//! Sending side of the transfer socket

use std::io::ErrorKind;
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::path::Path;

use tracing::debug;

use super::{write_request, Result, TransferError};
use crate::shm::SealedRegion;

/// Image to hand over, or nothing for a clear request
#[derive(Debug)]
pub struct Payload<'a> {
    /// Sealed RGBA pixels
    pub region: &'a SealedRegion,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Connect to the daemon at `path`
pub fn connect(path: &Path) -> Result<UnixStream> {
    UnixStream::connect(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused => {
            TransferError::DaemonNotRunning(path.to_path_buf())
        }
        _ => TransferError::Io(e),
    })
}

/// Send one request and close the connection
pub fn send(path: &Path, name: Option<&str>, payload: Option<Payload<'_>>) -> Result<()> {
    let stream = connect(path)?;

    let region = payload
        .as_ref()
        .map(|p| (p.width, p.height, p.region.as_fd()));
    write_request(&stream, name, region)?;

    debug!(
        "Sent {} request for {}",
        if payload.is_some() { "draw" } else { "clear" },
        name.unwrap_or("all outputs")
    );
    Ok(())
}
