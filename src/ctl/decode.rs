//! Image loading for the control client

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use image::RgbaImage;

use lamco_wallpaper::shm::SealedRegion;

/// Decode a file, or standard input for `-`, into RGBA8888
pub(crate) fn load(source: &Path) -> Result<RgbaImage> {
    let image = if source == Path::new("-") {
        let mut bytes = Vec::new();
        std::io::stdin()
            .lock()
            .read_to_end(&mut bytes)
            .context("Failed to read image from stdin")?;
        image::load_from_memory(&bytes).context("Failed to decode image from stdin")?
    } else {
        image::ImageReader::open(source)
            .with_context(|| format!("Failed to open {}", source.display()))?
            .with_guessed_format()
            .with_context(|| format!("Failed to read {}", source.display()))?
            .decode()
            .with_context(|| format!("Failed to decode {}", source.display()))?
    };

    Ok(image.to_rgba8())
}

/// Copy decoded pixels into a fresh sealed region
pub(crate) fn seal(image: &RgbaImage) -> Result<SealedRegion> {
    let mut region = SealedRegion::for_image(c"lamco-wallpaperctl", image.width(), image.height())
        .context("Failed to allocate shared memory for the image")?;
    region.as_mut_slice().copy_from_slice(image.as_raw());
    Ok(region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_load_png_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.png");

        let mut img = RgbaImage::new(3, 2);
        img.put_pixel(2, 1, Rgba([10, 20, 30, 255]));
        img.save(&path).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.dimensions(), (3, 2));
        assert_eq!(loaded.get_pixel(2, 1), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("nope.png")).is_err());
    }

    #[test]
    fn test_garbage_is_not_an_image() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"definitely not pixels").unwrap();
        let err = load(file.path()).unwrap_err();
        assert!(err.chain().any(|c| c.is::<image::ImageError>()));
    }

    #[test]
    fn test_seal_copies_pixels() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 4]));
        let region = seal(&img).unwrap();
        assert_eq!(region.len(), 4 * 4 * 4);
        assert_eq!(&region.as_slice()[..4], &[1, 2, 3, 4]);
    }
}
