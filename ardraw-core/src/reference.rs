//! Loading bitmaps from disk or memory, and preparing reference images for the tracking database.

use crate::raster::{RasterError, RasterImage};

/// Reference images are normalized to a square of this side length before being added to the
/// tracking database, whatever their source size.
pub const REFERENCE_IMAGE_SIZE: u32 = 640;
/// Side length of a normalized cropped capture.
pub const CROPPED_IMAGE_SIZE: u32 = 512;

#[derive(thiserror::Error, Debug)]
pub enum ReferenceError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Raster(#[from] RasterError),
}

/// Decode an image file of any format `image` supports.
pub fn load_raster(path: impl AsRef<std::path::Path>) -> Result<RasterImage, ReferenceError> {
    let decoded = image::open(path)?;
    Ok(RasterImage::from_rgba_image(&decoded.to_rgba8())?)
}

/// Decode an in-memory encoded image (e.g. a capture handed over by the host).
pub fn decode_raster(bytes: &[u8]) -> Result<RasterImage, ReferenceError> {
    let decoded = image::load_from_memory(bytes)?;
    Ok(RasterImage::from_rgba_image(&decoded.to_rgba8())?)
}

/// Encode to a file, format chosen by the extension.
pub fn save_raster(
    image: &RasterImage,
    path: impl AsRef<std::path::Path>,
) -> Result<(), ReferenceError> {
    image.to_rgba_image().save(path)?;
    Ok(())
}

/// Stretch to [`REFERENCE_IMAGE_SIZE`] squared. Aspect ratio is not preserved, the tracking
/// database only cares about features and the physical size is supplied separately.
pub fn prepare_reference_image(source: &RasterImage) -> Result<RasterImage, ReferenceError> {
    if source.dimensions() == [REFERENCE_IMAGE_SIZE; 2] {
        return Ok(source.clone());
    }
    let resized = image::imageops::resize(
        &source.to_rgba_image(),
        REFERENCE_IMAGE_SIZE,
        REFERENCE_IMAGE_SIZE,
        image::imageops::FilterType::Triangle,
    );
    Ok(RasterImage::from_rgba_image(&resized)?)
}

/// Center a crop on a transparent square as wide as its longer side, then scale that to
/// [`CROPPED_IMAGE_SIZE`] squared. Unlike reference images, the crop keeps its aspect ratio.
pub fn prepare_cropped_image(crop: &RasterImage) -> Result<RasterImage, ReferenceError> {
    let [width, height] = crop.dimensions();
    let side = width.max(height);
    // Zeroed, so fully transparent.
    let mut square = image::RgbaImage::new(side, side);
    image::imageops::overlay(
        &mut square,
        &crop.to_rgba_image(),
        i64::from((side - width) / 2),
        i64::from((side - height) / 2),
    );
    let square = if side == CROPPED_IMAGE_SIZE {
        square
    } else {
        image::imageops::resize(
            &square,
            CROPPED_IMAGE_SIZE,
            CROPPED_IMAGE_SIZE,
            image::imageops::FilterType::Triangle,
        )
    };
    log::debug!("Cropped image {width}x{height} normalized to {CROPPED_IMAGE_SIZE} square");
    Ok(RasterImage::from_rgba_image(&square)?)
}

#[cfg(test)]
mod test {
    use super::{
        decode_raster, load_raster, prepare_cropped_image, prepare_reference_image, save_raster,
        CROPPED_IMAGE_SIZE, REFERENCE_IMAGE_SIZE,
    };
    use crate::color::Argb;
    use crate::raster::RasterImage;

    #[test]
    fn resizes_to_square() {
        let source = RasterImage::new_filled(37, 120, Argb::WHITE).unwrap();
        let prepared = prepare_reference_image(&source).unwrap();
        assert_eq!(prepared.dimensions(), [REFERENCE_IMAGE_SIZE; 2]);
        // Uniform input stays uniform.
        assert_eq!(prepared.count_of(Argb::WHITE), 640 * 640);
    }
    #[test]
    fn crop_is_padded_then_scaled() {
        // 2:1, so a quarter of the square is padding above and below.
        let crop = RasterImage::new_filled(40, 20, Argb::WHITE).unwrap();
        let prepared = prepare_cropped_image(&crop).unwrap();
        assert_eq!(prepared.dimensions(), [CROPPED_IMAGE_SIZE; 2]);

        assert_eq!(prepared.get(0, 0), Some(Argb::TRANSPARENT));
        assert_eq!(prepared.get(256, 10), Some(Argb::TRANSPARENT));
        assert_eq!(prepared.get(256, 500), Some(Argb::TRANSPARENT));
        // Full width, no padding left or right.
        assert_eq!(prepared.get(0, 256), Some(Argb::WHITE));
        assert_eq!(prepared.get(256, 256), Some(Argb::WHITE));
        assert_eq!(prepared.get(511, 256), Some(Argb::WHITE));
    }
    #[test]
    fn tall_crop_is_padded_sideways() {
        let crop = RasterImage::new_filled(10, 30, Argb::BLACK).unwrap();
        let prepared = prepare_cropped_image(&crop).unwrap();
        assert_eq!(prepared.get(20, 256), Some(Argb::TRANSPARENT));
        assert_eq!(prepared.get(256, 0), Some(Argb::BLACK));
        assert_eq!(prepared.get(490, 256), Some(Argb::TRANSPARENT));
    }
    #[test]
    fn decodes_png() {
        let source = RasterImage::from_fn(3, 2, |x, _| {
            if x == 0 {
                Argb::BLACK
            } else {
                Argb::WHITE
            }
        })
        .unwrap();
        let mut bytes = std::io::Cursor::new(Vec::new());
        source
            .to_rgba_image()
            .write_to(&mut bytes, image::ImageFormat::Png)
            .unwrap();
        let decoded = decode_raster(bytes.get_ref()).unwrap();
        assert_eq!(decoded, source);
    }
    #[test]
    fn saves_and_reloads() {
        let source = RasterImage::from_fn(4, 3, |x, y| {
            Argb::from_channels(255, 0, (x * 60) as u8, (y * 80) as u8)
        })
        .unwrap();
        let path = std::env::temp_dir().join(format!("ardraw-save-{}.png", std::process::id()));
        save_raster(&source, &path).unwrap();
        let reloaded = load_raster(&path);
        let _ = std::fs::remove_file(&path);
        assert_eq!(reloaded.unwrap(), source);
    }
    #[test]
    fn garbage_is_an_error() {
        assert!(decode_raster(b"not an image").is_err());
    }
}
