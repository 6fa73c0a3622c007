//! Wake Classification
//!
//! The daemon waits on three descriptors at once:
//!
//! ```text
//! Event Sources                 Readiness            Action
//! ━━━━━━━━━━━━━                 ━━━━━━━━━            ━━━━━━
//!
//! Wayland connection ─────────> HUP / ERR   ──────> stop (display gone)
//!                    ─────────> IN          ──────> read + dispatch events
//! signalfd           ─────────> IN          ──────> stop (signal)
//! transfer socket    ─────────> IN          ──────> serve one request
//! ```
//!
//! # Priority
//!
//! On each wake exactly one action runs:
//! 1. **Stop**: a signal arrived, or the display connection hung up or errored
//! 2. **Display**: inbound protocol events; the socket is not looked at this round
//! 3. **Transfer**: a client is waiting on the socket
//!
//! Anything left over is picked up by the next wait, so a busy display
//! connection delays but never loses a transfer request.

use nix::poll::PollFlags;

/// Readiness of the three sources after one wait
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// Wayland connection has data
    pub display_in: bool,
    /// Wayland connection hung up
    pub display_hup: bool,
    /// Wayland connection is in an error state
    pub display_err: bool,
    /// signalfd has a pending signal
    pub signal: bool,
    /// Listening socket has a pending connection
    pub transfer: bool,
}

/// Action chosen for one wake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// Termination signal
    Signal,
    /// Compositor closed the connection
    DisplayHangup,
    /// Error condition on the connection
    DisplayError,
    /// Read and dispatch protocol events
    Display,
    /// Accept and serve one transfer request
    Transfer,
    /// Nothing we care about
    Spurious,
}

impl Readiness {
    /// Build from the `revents` of the display, signal and transfer descriptors
    pub fn from_revents(
        display: Option<PollFlags>,
        signal: Option<PollFlags>,
        transfer: Option<PollFlags>,
    ) -> Self {
        let display = display.unwrap_or(PollFlags::empty());
        let readable = |flags: Option<PollFlags>| {
            flags.is_some_and(|f| f.intersects(PollFlags::POLLIN | PollFlags::POLLHUP))
        };

        Self {
            display_in: display.contains(PollFlags::POLLIN),
            display_hup: display.contains(PollFlags::POLLHUP),
            display_err: display.intersects(PollFlags::POLLERR | PollFlags::POLLNVAL),
            signal: readable(signal),
            transfer: readable(transfer),
        }
    }

    /// Pick the single action for this wake
    pub fn classify(self) -> Wake {
        if self.signal {
            Wake::Signal
        } else if self.display_hup {
            Wake::DisplayHangup
        } else if self.display_err {
            Wake::DisplayError
        } else if self.display_in {
            Wake::Display
        } else if self.transfer {
            Wake::Transfer
        } else {
            Wake::Spurious
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_beats_everything() {
        let r = Readiness {
            display_in: true,
            signal: true,
            transfer: true,
            ..Default::default()
        };
        assert_eq!(r.classify(), Wake::Signal);

        let r = Readiness {
            display_in: true,
            display_hup: true,
            transfer: true,
            ..Default::default()
        };
        assert_eq!(r.classify(), Wake::DisplayHangup);
    }

    #[test]
    fn test_display_beats_transfer() {
        let r = Readiness {
            display_in: true,
            transfer: true,
            ..Default::default()
        };
        assert_eq!(r.classify(), Wake::Display);
    }

    #[test]
    fn test_transfer_alone() {
        let r = Readiness {
            transfer: true,
            ..Default::default()
        };
        assert_eq!(r.classify(), Wake::Transfer);
        assert_eq!(Readiness::default().classify(), Wake::Spurious);
    }

    #[test]
    fn test_from_revents() {
        let r = Readiness::from_revents(
            Some(PollFlags::POLLIN | PollFlags::POLLHUP),
            Some(PollFlags::empty()),
            None,
        );
        assert!(r.display_in);
        assert!(r.display_hup);
        assert!(!r.signal);
        assert!(!r.transfer);
        assert_eq!(r.classify(), Wake::DisplayHangup);

        let r = Readiness::from_revents(None, None, Some(PollFlags::POLLIN));
        assert_eq!(r.classify(), Wake::Transfer);

        let r = Readiness::from_revents(Some(PollFlags::POLLERR), None, None);
        assert_eq!(r.classify(), Wake::DisplayError);
    }
}
