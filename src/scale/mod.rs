//! Cover-Fit Scaler
//!
//! Resamples a source image into a display buffer with one uniform factor.
//!
//! # Pixel Layout
//!
//! | Buffer      | Byte order in memory | Notes                         |
//! |-------------|----------------------|-------------------------------|
//! | Source      | R, G, B, A           | as produced by the codec      |
//! | Destination | B, G, R, X           | `wl_shm` XRGB8888, little end |
//!
//! Converting between the two is a swap of bytes 0 and 2 of every pixel,
//! done while the destination is written.
//!
//! # Geometry
//!
//! The factor is a destination-to-source sampling step,
//! `factor = max(sw / dw, sh / dh)`: destination pixel (x, y) is sampled
//! from source (x * factor, y * factor), starting at (0, 0) and running over
//! the whole destination. Along the larger-ratio axis the source spans the
//! destination exactly. Destination pixels whose sample lands past the source
//! edge are written as zero.
//!
//! Only the sampled window, `ceil(sw / factor)` x `ceil(sh / factor)`, is
//! ever resampled, so the intermediate image is never larger than the
//! destination.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shm::BYTES_PER_PIXEL;

/// Scaler error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScaleError {
    /// Source or destination has a zero dimension
    #[error("cannot scale {src_w}x{src_h} into {dst_w}x{dst_h}: zero-sized extent")]
    ZeroExtent {
        /// Source width
        src_w: u32,
        /// Source height
        src_h: u32,
        /// Destination width
        dst_w: u32,
        /// Destination height
        dst_h: u32,
    },

    /// A slice is too short for the dimensions it was given with
    #[error("{what} buffer holds {actual} bytes, {expected} required")]
    LengthMismatch {
        /// "source" or "destination"
        what: &'static str,
        /// Required bytes
        expected: usize,
        /// Provided bytes
        actual: usize,
    },
}

/// Resampling filter applied when the cover factor is not exactly 1.0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScaleFilter {
    /// Nearest neighbour
    Nearest,
    /// Bilinear
    Triangle,
    /// Bicubic (Catmull-Rom)
    #[default]
    CatmullRom,
    /// Lanczos, window 3
    Lanczos3,
}

impl ScaleFilter {
    /// Parse a filter name as used in the configuration file
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "nearest" => Some(Self::Nearest),
            "triangle" => Some(Self::Triangle),
            "catmull-rom" => Some(Self::CatmullRom),
            "lanczos3" => Some(Self::Lanczos3),
            _ => None,
        }
    }

    fn filter_type(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Uniform factor: the larger of the two source-to-destination ratios
///
/// Callers guarantee all four extents are non-zero.
pub fn cover_factor(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> f64 {
    let x = src_w as f64 / dst_w as f64;
    let y = src_h as f64 / dst_h as f64;
    x.max(y)
}

/// Destination window that samples fall inside of
///
/// The larger-ratio axis spans the destination, the other is rounded up.
/// Never larger than the destination and never empty.
pub fn sampled_size(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> (u32, u32) {
    let (sw, sh, dw, dh) = (src_w as u64, src_h as u64, dst_w as u64, dst_h as u64);
    if sw * dh >= sh * dw {
        (dst_w, (sh * dw).div_ceil(sw).clamp(1, dh) as u32)
    } else {
        ((sw * dh).div_ceil(sh).clamp(1, dw) as u32, dst_h)
    }
}

/// Scale `src` (RGBA, `src_w` x `src_h`) into `dst` (XRGB8888, `dst_w` x `dst_h`)
///
/// Returns the factor that was applied.
pub fn scale(
    dst: &mut [u8],
    dst_w: u32,
    dst_h: u32,
    src: &[u8],
    src_w: u32,
    src_h: u32,
    filter: ScaleFilter,
) -> Result<f64, ScaleError> {
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return Err(ScaleError::ZeroExtent {
            src_w,
            src_h,
            dst_w,
            dst_h,
        });
    }
    check_len("source", src, src_w, src_h)?;
    check_len("destination", dst, dst_w, dst_h)?;

    let src = &src[..src_w as usize * src_h as usize * BYTES_PER_PIXEL];
    let factor = cover_factor(src_w, src_h, dst_w, dst_h);
    let (win_w, win_h) = sampled_size(src_w, src_h, dst_w, dst_h);

    if (win_w, win_h) == (src_w, src_h) {
        composite(dst, dst_w, dst_h, src, src_w, src_h);
        return Ok(factor);
    }

    // from_raw only fails when the container is shorter than w*h*4,
    // which check_len already ruled out.
    let view: ImageBuffer<Rgba<u8>, &[u8]> =
        ImageBuffer::from_raw(src_w, src_h, src).ok_or(ScaleError::LengthMismatch {
            what: "source",
            expected: src_w as usize * src_h as usize * BYTES_PER_PIXEL,
            actual: src.len(),
        })?;
    let sampled = imageops::resize(&view, win_w, win_h, filter.filter_type());
    composite(dst, dst_w, dst_h, sampled.as_raw(), win_w, win_h);

    Ok(factor)
}

fn check_len(what: &'static str, buf: &[u8], w: u32, h: u32) -> Result<(), ScaleError> {
    let expected = w as usize * h as usize * BYTES_PER_PIXEL;
    if buf.len() < expected {
        return Err(ScaleError::LengthMismatch {
            what,
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Copy `src` to the top-left of `dst`, swapping R and B
///
/// Whatever part of `dst` lies outside `src` is zeroed.
fn composite(dst: &mut [u8], dst_w: u32, dst_h: u32, src: &[u8], src_w: u32, src_h: u32) {
    let row_bytes = dst_w as usize * BYTES_PER_PIXEL;
    let src_stride = src_w as usize * BYTES_PER_PIXEL;
    let copy_bytes = row_bytes.min(src_stride);

    for (y, dst_row) in dst
        .chunks_exact_mut(row_bytes)
        .take(dst_h as usize)
        .enumerate()
    {
        if y >= src_h as usize {
            dst_row.fill(0);
            continue;
        }

        let src_row = &src[y * src_stride..y * src_stride + copy_bytes];
        let (visible, rest) = dst_row.split_at_mut(copy_bytes);
        for (d, s) in visible
            .chunks_exact_mut(BYTES_PER_PIXEL)
            .zip(src_row.chunks_exact(BYTES_PER_PIXEL))
        {
            d[0] = s[2];
            d[1] = s[1];
            d[2] = s[0];
            d[3] = s[3];
        }
        rest.fill(0);
    }
}

/// Swap bytes 0 and 2 of every pixel in place (RGBA <-> BGRA)
pub fn swap_red_blue(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
        px.swap(0, 2);
    }
}
