//! Shared Memory Regions
//!
//! Anonymous, sealed memory regions used for `wl_shm` buffers and for
//! handing decoded images from the control client to the daemon.
//!
//! # Lifecycle
//!
//! ```text
//! memfd_create (NOEXEC_SEAL, retried without on EINVAL)
//!   └─> ftruncate(width * height * 4)
//!       └─> mmap read-write
//!           └─> F_ADD_SEALS(SHRINK | GROW | SEAL)
//! ```
//!
//! Once sealed the size of the region can never change, so a peer holding
//! the descriptor cannot truncate it underneath our mapping.
//!
//! The daemon side of a transfer uses [`SourceRegion`], a read-only mapping
//! of a descriptor received from a client.

use std::ffi::CStr;
use std::fs::File;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

use memmap2::{Mmap, MmapMut, MmapOptions};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, SealFlag};
use nix::sys::memfd::{memfd_create, MemFdCreateFlag};
use thiserror::Error;
use tracing::{debug, trace};

/// Bytes per pixel for every buffer we handle (32-bit pixels)
pub const BYTES_PER_PIXEL: usize = 4;

/// Result type for shared memory operations
pub type Result<T> = std::result::Result<T, ShmError>;

/// Shared memory error types
#[derive(Error, Debug)]
pub enum ShmError {
    /// A zero-sized region was requested
    #[error("refusing to create a zero-sized region")]
    ZeroSize,

    /// `width * height * 4` does not fit in the address space
    #[error("region size for {width}x{height} overflows")]
    SizeOverflow {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    /// memfd_create failed
    #[error("memfd_create failed: {0}")]
    Create(#[source] Errno),

    /// ftruncate failed
    #[error("failed to size region to {len} bytes: {source}")]
    Resize {
        /// Requested length
        len: usize,
        /// errno
        #[source]
        source: Errno,
    },

    /// mmap failed
    #[error("failed to map region: {0}")]
    Map(#[source] std::io::Error),

    /// Adding seals failed
    #[error("failed to seal region: {0}")]
    Seal(#[source] Errno),

    /// A received region is smaller than the dimensions it was sent with
    #[error("region holds {actual} bytes but {expected} are required")]
    TooSmall {
        /// Bytes required by the advertised dimensions
        expected: usize,
        /// Bytes actually present
        actual: u64,
    },

    /// fstat on a received region failed
    #[error("failed to inspect region: {0}")]
    Stat(#[source] std::io::Error),

    /// The compositor-side pool cannot describe a region this large
    #[error("region of {0} bytes exceeds the wl_shm pool limit")]
    PoolTooLarge(usize),
}

/// Byte length of a `width` x `height` buffer of 32-bit pixels
pub fn pixel_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
        .ok_or(ShmError::SizeOverflow { width, height })
}

/// Anonymous sealed memory region mapped read-write
pub struct SealedRegion {
    map: MmapMut,
    fd: OwnedFd,
}

impl SealedRegion {
    /// Create a sealed region of exactly `len` bytes
    ///
    /// Partially created state is released on failure.
    pub fn create(name: &CStr, len: usize) -> Result<Self> {
        if len == 0 {
            return Err(ShmError::ZeroSize);
        }

        let fd = create_memfd(name)?;

        nix::unistd::ftruncate(&fd, len as libc::off_t)
            .map_err(|source| ShmError::Resize { len, source })?;

        // SAFETY: the memfd is private to this process until it is shared,
        // and it is sealed against shrinking right below, so the mapping
        // can't be invalidated by truncation.
        #[allow(unsafe_code)]
        let map = unsafe { MmapOptions::new().len(len).map_mut(&fd) }.map_err(ShmError::Map)?;

        fcntl(
            fd.as_raw_fd(),
            FcntlArg::F_ADD_SEALS(
                SealFlag::F_SEAL_SHRINK | SealFlag::F_SEAL_GROW | SealFlag::F_SEAL_SEAL,
            ),
        )
        .map_err(ShmError::Seal)?;

        trace!("Created sealed region of {} bytes", len);

        Ok(Self { map, fd })
    }

    /// Create a region sized for a `width` x `height` image
    pub fn for_image(name: &CStr, width: u32, height: u32) -> Result<Self> {
        Self::create(name, pixel_len(width, height)?)
    }

    /// Region length in bytes
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Regions are never empty; kept for API symmetry with slices
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Mapped bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    /// Mapped bytes, writable
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.map
    }
}

impl AsFd for SealedRegion {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl std::fmt::Debug for SealedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedRegion")
            .field("fd", &self.fd.as_raw_fd())
            .field("len", &self.map.len())
            .finish()
    }
}

/// Create the memfd, dropping `MFD_NOEXEC_SEAL` on kernels that reject it
fn create_memfd(name: &CStr) -> Result<OwnedFd> {
    let base = MemFdCreateFlag::MFD_CLOEXEC | MemFdCreateFlag::MFD_ALLOW_SEALING;
    let noexec = MemFdCreateFlag::from_bits_retain(libc::MFD_NOEXEC_SEAL);

    match memfd_create(name, base | noexec) {
        Ok(fd) => Ok(fd),
        Err(Errno::EINVAL) => {
            debug!("MFD_NOEXEC_SEAL rejected by kernel, retrying without it");
            memfd_create(name, base).map_err(ShmError::Create)
        }
        Err(e) => Err(ShmError::Create(e)),
    }
}

/// Read-only mapping of a client-supplied pixel region
///
/// The mapping and the descriptor are released when this value is dropped;
/// the transfer server never keeps one past the request that delivered it.
pub struct SourceRegion {
    map: Mmap,
    width: u32,
    height: u32,
}

impl SourceRegion {
    /// Map exactly `width * height * 4` bytes of `fd` read-only
    pub fn map(fd: OwnedFd, width: u32, height: u32) -> Result<Self> {
        let len = pixel_len(width, height)?;
        if len == 0 {
            return Err(ShmError::ZeroSize);
        }

        let file = File::from(fd);
        let actual = file.metadata().map_err(ShmError::Stat)?.len();
        if actual < len as u64 {
            return Err(ShmError::TooSmall {
                expected: len,
                actual,
            });
        }

        // SAFETY: the size was checked above. A client that does not seal its
        // region could still shrink it; clients built on SealedRegion can't.
        #[allow(unsafe_code)]
        let map = unsafe { MmapOptions::new().len(len).map(&file) }.map_err(ShmError::Map)?;

        Ok(Self { map, width, height })
    }

    /// Source pixels
    pub fn pixels(&self) -> &[u8] {
        &self.map
    }

    /// Source width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Source height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }
}
