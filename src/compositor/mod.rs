//! Display Server Seam
//!
//! The output registry drives surfaces and buffers through the [`Compositor`]
//! trait rather than talking to Wayland directly. The production
//! implementation is [`wayland::WaylandBackend`]; tests drive the registry
//! with a recording implementation instead of a live compositor.
//!
//! # Required Globals
//!
//! | Interface             | Version | Purpose                          |
//! |-----------------------|---------|----------------------------------|
//! | `wl_compositor`       | 4       | surfaces, `damage_buffer`        |
//! | `wl_shm`              | 1       | shared memory buffers            |
//! | `wl_output`           | 4       | monitor names                    |
//! | `zwlr_layer_shell_v1` | 2       | background layer surfaces        |
//!
//! A compositor offering a lower version of any of these is rejected at
//! startup.

use crate::error::{Result, WallpaperError};
use crate::output::{BufferId, OutputId};

pub mod wayland;

/// Minimum `wl_compositor` version
pub const COMPOSITOR_VERSION: u32 = 4;
/// Minimum `wl_shm` version
pub const SHM_VERSION: u32 = 1;
/// Minimum `wl_output` version
pub const OUTPUT_VERSION: u32 = 4;
/// Minimum `zwlr_layer_shell_v1` version
pub const LAYER_SHELL_VERSION: u32 = 2;

/// Layer-shell namespace of our surfaces
pub const LAYER_NAMESPACE: &str = "wallpaper";

/// Minimum version we bind for `interface`, if we bind it at all
pub fn required_version(interface: &str) -> Option<u32> {
    match interface {
        "wl_compositor" => Some(COMPOSITOR_VERSION),
        "wl_shm" => Some(SHM_VERSION),
        "wl_output" => Some(OUTPUT_VERSION),
        "zwlr_layer_shell_v1" => Some(LAYER_SHELL_VERSION),
        _ => None,
    }
}

/// Fail when the compositor offers `interface` below the version we need
pub fn check_version(interface: &str, required: u32, offered: u32) -> Result<()> {
    if offered < required {
        return Err(WallpaperError::UnsupportedVersion {
            interface: interface.to_string(),
            required,
            offered,
        });
    }
    Ok(())
}

/// Writable pixels of a display buffer
pub trait PixelBuffer {
    /// XRGB8888 pixels, `width * height * 4` bytes
    fn pixels_mut(&mut self) -> &mut [u8];
}

/// Operations the output registry needs from the display server
///
/// Every method is called from the event loop thread; requests are queued
/// and reach the server on the next flush.
pub trait Compositor {
    /// Bound output object
    type Output;
    /// Surface plus its layer-surface role object
    type Surface;
    /// Shared memory buffer
    type Buffer: PixelBuffer;

    /// Whether the globals needed to create surfaces are bound
    fn surfaces_ready(&self) -> bool;

    /// Create a background layer surface on `output`, anchored to all edges
    /// with no exclusive zone, and commit it to request a configure.
    fn create_surface(&mut self, id: OutputId, output: &Self::Output) -> Result<Self::Surface>;

    /// Destroy the layer surface and its surface
    fn destroy_surface(&mut self, surface: Self::Surface);

    /// Acknowledge a configure event
    fn ack_configure(&mut self, surface: &Self::Surface, serial: u32);

    /// Commit pending surface state
    fn commit(&mut self, surface: &Self::Surface);

    /// Allocate a sealed `width` x `height` buffer
    fn allocate_buffer(&mut self, id: BufferId, width: u32, height: u32) -> Result<Self::Buffer>;

    /// Attach `buffer` (or nothing), damage it fully and commit
    fn attach(
        &mut self,
        surface: &Self::Surface,
        buffer: Option<&Self::Buffer>,
        scale: i32,
        width: u32,
        height: u32,
    );

    /// Destroy a buffer the server no longer reads from
    fn free_buffer(&mut self, buffer: Self::Buffer);

    /// Release a removed output
    fn release_output(&mut self, output: Self::Output);
}
