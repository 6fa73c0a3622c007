//! Image Transfer Protocol
//!
//! Local-socket protocol used by the control client to hand a decoded image
//! to the daemon. Pixels are never copied through the socket: the client
//! passes an open descriptor to a sealed memory region and the daemon maps it.
//!
//! # Wire Format
//!
//! ```text
//! ┌──────────┬──────────┬──────────────┬────────────────────┐
//! │ width    │ height   │ name_len     │ name (UTF-8)       │
//! │ u32      │ u32      │ usize        │ name_len bytes     │
//! └──────────┴──────────┴──────────────┴────────────────────┘
//!   host byte order; one SCM_RIGHTS descriptor rides on the first byte
//! ```
//!
//! | width × height | descriptor | meaning                     |
//! |----------------|------------|-----------------------------|
//! | 0 × 0          | ignored    | clear the target monitor(s) |
//! | w × h, both >0 | required   | draw the region             |
//! | one of them 0  | -          | malformed                   |
//!
//! An empty name targets every monitor. The exchange is fire-and-forget:
//! the daemon never answers, the client closes after sending.

use std::os::fd::OwnedFd;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

use crate::shm::ShmError;

pub mod ancillary;
pub mod client;
pub mod server;

pub use ancillary::RegionChannel;
pub use server::TransferServer;

/// Size of the fixed header on the wire
pub const HEADER_LEN: usize = 8 + std::mem::size_of::<usize>();

/// Longest accepted monitor name in bytes
pub const MAX_NAME_LEN: usize = 4096;

/// Result type for transfer operations
pub type Result<T> = std::result::Result<T, TransferError>;

/// Transfer protocol error types
#[derive(Error, Debug)]
pub enum TransferError {
    /// Peer closed the connection before a complete request arrived
    #[error("connection closed after {received} of {expected} bytes")]
    Truncated {
        /// Bytes required
        expected: usize,
        /// Bytes received before EOF
        received: usize,
    },

    /// Only one of width and height is zero
    #[error("malformed dimensions {width}x{height}")]
    BadDimensions {
        /// Width on the wire
        width: u32,
        /// Height on the wire
        height: u32,
    },

    /// Name length exceeds [`MAX_NAME_LEN`]
    #[error("monitor name of {0} bytes exceeds the {MAX_NAME_LEN} byte limit")]
    NameTooLong(usize),

    /// Name is not valid UTF-8
    #[error("monitor name is not valid UTF-8")]
    InvalidName(#[source] std::string::FromUtf8Error),

    /// Draw request arrived without a descriptor
    #[error("draw request for {width}x{height} carried no descriptor")]
    MissingDescriptor {
        /// Width on the wire
        width: u32,
        /// Height on the wire
        height: u32,
    },

    /// The supplied region could not be mapped
    #[error("client region unusable: {0}")]
    Region(#[from] ShmError),

    /// Nothing is listening on the socket path
    #[error("daemon is not running (no socket at {})", .0.display())]
    DaemonNotRunning(PathBuf),

    /// Read timeout expired while waiting for the client
    #[error("client timed out")]
    TimedOut,

    /// sendmsg/recvmsg failure
    #[error("socket message failed: {0}")]
    Message(#[source] Errno),

    /// Other socket I/O error
    #[error("socket I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Fixed-size request header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Source width in pixels, 0 for a clear request
    pub width: u32,
    /// Source height in pixels, 0 for a clear request
    pub height: u32,
    /// Length of the monitor name that follows
    pub name_len: usize,
}

impl RequestHeader {
    /// Serialize in host byte order
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.width.to_ne_bytes());
        out[4..8].copy_from_slice(&self.height.to_ne_bytes());
        out[8..].copy_from_slice(&self.name_len.to_ne_bytes());
        out
    }

    /// Parse a header received in host byte order
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Self {
        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[0..4]);
        let width = u32::from_ne_bytes(word);
        word.copy_from_slice(&bytes[4..8]);
        let height = u32::from_ne_bytes(word);
        let mut len = [0u8; std::mem::size_of::<usize>()];
        len.copy_from_slice(&bytes[8..]);

        Self {
            width,
            height,
            name_len: usize::from_ne_bytes(len),
        }
    }

    /// Reject headers that can never form a valid request
    pub fn validate(&self) -> Result<()> {
        if (self.width == 0) != (self.height == 0) {
            return Err(TransferError::BadDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.name_len > MAX_NAME_LEN {
            return Err(TransferError::NameTooLong(self.name_len));
        }
        Ok(())
    }

    /// Whether this header describes a clear request
    pub fn is_clear(&self) -> bool {
        self.width == 0 && self.height == 0
    }
}

/// What a request asks the daemon to do
#[derive(Debug)]
pub enum RequestKind {
    /// Remove the wallpaper
    Clear,
    /// Draw the `width` x `height` RGBA region behind `region`
    Draw {
        /// Source width
        width: u32,
        /// Source height
        height: u32,
        /// Descriptor for the sealed pixel region
        region: OwnedFd,
    },
}

/// A fully received and validated request
#[derive(Debug)]
pub struct TransferRequest {
    /// Target monitor, `None` for all monitors
    pub name: Option<String>,
    /// Requested action
    pub kind: RequestKind,
}

impl TransferRequest {
    /// Assemble a request from its wire parts
    pub fn from_parts(header: RequestHeader, name: Vec<u8>, fd: Option<OwnedFd>) -> Result<Self> {
        header.validate()?;

        let name = if name.is_empty() {
            None
        } else {
            Some(String::from_utf8(name).map_err(TransferError::InvalidName)?)
        };

        let kind = if header.is_clear() {
            RequestKind::Clear
        } else {
            let region = fd.ok_or(TransferError::MissingDescriptor {
                width: header.width,
                height: header.height,
            })?;
            RequestKind::Draw {
                width: header.width,
                height: header.height,
                region,
            }
        };

        Ok(Self { name, kind })
    }

    /// Human readable target for logs
    pub fn target(&self) -> &str {
        self.name.as_deref().unwrap_or("*")
    }
}

/// Read one complete request from `channel`
///
/// The header and the descriptor arrive in the first message; the rest of
/// the header and the name are read until complete. Descriptors that arrive
/// with later chunks are closed.
pub fn read_request<C: RegionChannel + ?Sized>(channel: &C) -> Result<TransferRequest> {
    let mut head = [0u8; HEADER_LEN];
    let fd = read_exact_with_fd(channel, &mut head)?;
    let header = RequestHeader::decode(&head);
    header.validate()?;

    let mut name = vec![0u8; header.name_len];
    read_exact_with_fd(channel, &mut name)?;

    TransferRequest::from_parts(header, name, fd)
}

/// Write one request to `channel`
pub fn write_request<C: RegionChannel + ?Sized>(
    channel: &C,
    name: Option<&str>,
    region: Option<(u32, u32, std::os::fd::BorrowedFd<'_>)>,
) -> Result<()> {
    let name = name.unwrap_or("");
    if name.len() > MAX_NAME_LEN {
        return Err(TransferError::NameTooLong(name.len()));
    }

    let (width, height, fd) = match region {
        Some((w, h, fd)) => (w, h, Some(fd)),
        None => (0, 0, None),
    };
    let header = RequestHeader {
        width,
        height,
        name_len: name.len(),
    };
    header.validate()?;

    let mut payload = Vec::with_capacity(HEADER_LEN + name.len());
    payload.extend_from_slice(&header.encode());
    payload.extend_from_slice(name.as_bytes());

    let mut sent = channel.send_with_fd(&payload, fd)?;
    while sent < payload.len() {
        sent += channel.send_with_fd(&payload[sent..], None)?;
    }
    Ok(())
}

/// Fill `buf`, returning the first descriptor seen
fn read_exact_with_fd<C: RegionChannel + ?Sized>(
    channel: &C,
    buf: &mut [u8],
) -> Result<Option<OwnedFd>> {
    let mut fd = None;
    let mut filled = 0;

    while filled < buf.len() {
        let (n, received) = channel.recv_with_fd(&mut buf[filled..])?;
        if n == 0 {
            return Err(TransferError::Truncated {
                expected: buf.len(),
                received: filled,
            });
        }
        if fd.is_none() {
            fd = received;
        }
        filled += n;
    }

    Ok(fd)
}
