//! Layer-surface state machine
//!
//! ```text
//!            create_surface              configure(w, h)
//! Uncreated ───────────────> PendingConfigure ───────────────> Drawable
//!     ^                            │    ^      clear (unmap)      │  │
//!     │                            │    └─────────────────────────┤  │ configure(same w, h)
//!     │          closed            │          closed              │  └──> recommit
//!     └────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! Committing a null buffer unmaps the layer surface and returns it to the
//! state it had right after creation: it has to be committed empty again and
//! wait for a fresh configure before the next frame.

/// Where a monitor's layer surface is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayerState {
    /// No surface exists
    #[default]
    Uncreated,
    /// Surface created, waiting for the first configure
    PendingConfigure,
    /// Configured at least once; content may be committed
    Drawable,
}

/// What to do with a configure event after acknowledging it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureAction {
    /// Same size as the drawable surface already has: commit what is attached
    Recommit,
    /// Record the new size and become drawable
    Resize {
        /// Configured width in surface coordinates
        width: u32,
        /// Configured height in surface coordinates
        height: u32,
    },
    /// Zero-sized configure; stay where we are
    Ignore,
}

impl LayerState {
    /// Decide how to handle `configure(width, height)` given the current size
    pub fn on_configure(self, current: (u32, u32), width: u32, height: u32) -> ConfigureAction {
        if width == 0 || height == 0 {
            return ConfigureAction::Ignore;
        }
        match self {
            LayerState::Drawable if current == (width, height) => ConfigureAction::Recommit,
            _ => ConfigureAction::Resize { width, height },
        }
    }

    /// Whether content may be committed
    pub fn is_drawable(self) -> bool {
        self == LayerState::Drawable
    }
}
