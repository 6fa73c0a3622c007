//! Descriptor passing over unix stream sockets

use std::io::{IoSlice, IoSliceMut};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

use nix::errno::Errno;
use nix::sys::socket::{self, ControlMessage, ControlMessageOwned, MsgFlags};
use tracing::debug;

use super::{Result, TransferError};

/// Byte stream that can carry one file descriptor alongside its data
pub trait RegionChannel {
    /// Send `bytes`, attaching `fd` to the first byte when given
    ///
    /// Returns the number of bytes written, which may be short.
    fn send_with_fd(&self, bytes: &[u8], fd: Option<BorrowedFd<'_>>) -> Result<usize>;

    /// Receive into `buf`, returning the byte count and the first descriptor
    /// that arrived with it. Zero bytes means the peer closed.
    fn recv_with_fd(&self, buf: &mut [u8]) -> Result<(usize, Option<OwnedFd>)>;
}

impl RegionChannel for UnixStream {
    fn send_with_fd(&self, bytes: &[u8], fd: Option<BorrowedFd<'_>>) -> Result<usize> {
        let iov = [IoSlice::new(bytes)];
        let raw: Vec<RawFd> = fd.iter().map(|fd| fd.as_raw_fd()).collect();
        let cmsgs: Vec<ControlMessage<'_>> = if raw.is_empty() {
            Vec::new()
        } else {
            vec![ControlMessage::ScmRights(&raw)]
        };

        loop {
            match socket::sendmsg::<()>(self.as_raw_fd(), &iov, &cmsgs, MsgFlags::MSG_NOSIGNAL, None) {
                Ok(n) => return Ok(n),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(TransferError::Message(e)),
            }
        }
    }

    fn recv_with_fd(&self, buf: &mut [u8]) -> Result<(usize, Option<OwnedFd>)> {
        let mut cmsg_space = nix::cmsg_space!([RawFd; 4]);

        loop {
            let mut iov = [IoSliceMut::new(buf)];
            let msg = match socket::recvmsg::<()>(
                self.as_raw_fd(),
                &mut iov,
                Some(&mut cmsg_space),
                MsgFlags::MSG_CMSG_CLOEXEC,
            ) {
                Ok(msg) => msg,
                Err(Errno::EINTR) => continue,
                Err(Errno::EAGAIN) => return Err(TransferError::TimedOut),
                Err(e) => return Err(TransferError::Message(e)),
            };

            let mut received = Vec::new();
            for cmsg in msg.cmsgs().map_err(TransferError::Message)? {
                if let ControlMessageOwned::ScmRights(fds) = cmsg {
                    for fd in fds {
                        // SAFETY: the kernel just installed this descriptor in
                        // our table and nothing else refers to it.
                        #[allow(unsafe_code)]
                        received.push(unsafe { OwnedFd::from_raw_fd(fd) });
                    }
                }
            }

            if received.len() > 1 {
                debug!("Closing {} extra descriptors", received.len() - 1);
            }
            let first = received.into_iter().next();
            return Ok((msg.bytes, first));
        }
    }
}
