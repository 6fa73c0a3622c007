//! Daemon Event Loop
//!
//! One iteration: dispatch queued Wayland events, flush outgoing requests,
//! arm a read on the connection, wait on all three descriptors, then act on
//! the single [`Wake`] the readiness maps to.

use std::os::fd::AsFd;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, error, trace};
use wayland_client::backend::WaylandError;

use super::event_multiplexer::{Readiness, Wake};
use super::{Daemon, ShutdownReason};

pub(super) fn run(daemon: &mut Daemon) -> ShutdownReason {
    let mut iterations = 0u64;

    loop {
        iterations += 1;

        if let Err(e) = daemon.session.dispatch_pending() {
            error!("Wayland dispatch failed: {}", e);
            return ShutdownReason::DisplayError(e.to_string());
        }
        if let Err(e) = daemon.session.check_fatal() {
            return ShutdownReason::DisplayError(e.to_string());
        }
        if let Err(e) = daemon.session.flush() {
            error!("Wayland flush failed: {}", e);
            return ShutdownReason::DisplayError(e.to_string());
        }

        // None means events were queued between dispatch and here
        let Some(guard) = daemon.session.prepare_read() else {
            continue;
        };

        let readiness = {
            let mut fds = [
                PollFd::new(guard.connection_fd(), PollFlags::POLLIN),
                PollFd::new(daemon.signals.as_fd(), PollFlags::POLLIN),
                PollFd::new(daemon.server.listen_fd(), PollFlags::POLLIN),
            ];

            loop {
                match poll(&mut fds, PollTimeout::NONE) {
                    Ok(_) => break,
                    Err(Errno::EINTR) => continue,
                    Err(e) => {
                        error!("poll failed: {}", e);
                        return ShutdownReason::DisplayError(format!("poll failed: {}", e));
                    }
                }
            }

            Readiness::from_revents(fds[0].revents(), fds[1].revents(), fds[2].revents())
        };

        let wake = readiness.classify();
        trace!("Wake #{}: {:?}", iterations, wake);

        match wake {
            Wake::Signal => {
                drop(guard);
                return ShutdownReason::Signal(daemon.signal_name());
            }
            Wake::DisplayHangup => return ShutdownReason::DisplayHangup,
            Wake::DisplayError => {
                return ShutdownReason::DisplayError("error condition on the display connection".into())
            }
            Wake::Display => match guard.read() {
                Ok(n) => trace!("Read {} Wayland events", n),
                Err(WaylandError::Io(e)) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    error!("Failed to read Wayland events: {}", e);
                    return ShutdownReason::DisplayError(e.to_string());
                }
            },
            Wake::Transfer => {
                drop(guard);
                daemon.serve_transfer();
            }
            Wake::Spurious => {
                drop(guard);
                debug!("Spurious wake");
            }
        }
    }
}
