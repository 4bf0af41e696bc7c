//! # Raster images
//!
//! CPU-side bitmaps in packed [`Argb`] pixels. These are what the bitmap sources (gallery,
//! camera, bundled assets) hand to the core, what the fill engine mutates, and what gets
//! uploaded as overlay textures.

use crate::color::Argb;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterError {
    #[error("raster dimensions {width}x{height} contain no pixels")]
    Empty { width: u32, height: u32 },
    #[error("raster dimensions {width}x{height} exceed addressable memory")]
    TooLarge { width: u32, height: u32 },
    #[error("pixel buffer holds {actual} pixels, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// A `width × height` grid of [`Argb`] pixels, row-major, top-left origin.
///
/// Never empty: both dimensions are at least one, so there is always a pixel to seed from.
#[derive(Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    /// Invariant: `pixels.len() == width * height`
    pixels: Vec<Argb>,
}
impl RasterImage {
    fn pixel_count(width: u32, height: u32) -> Result<usize, RasterError> {
        if width == 0 || height == 0 {
            return Err(RasterError::Empty { width, height });
        }
        // Both the pixel count and the byte size must fit, or allocation would abort.
        usize::try_from(u64::from(width) * u64::from(height))
            .ok()
            .filter(|&count| {
                count
                    .checked_mul(std::mem::size_of::<Argb>())
                    .is_some_and(|bytes| isize::try_from(bytes).is_ok())
            })
            .ok_or(RasterError::TooLarge { width, height })
    }
    /// Create an image where every pixel is `color`.
    pub fn new_filled(width: u32, height: u32, color: Argb) -> Result<Self, RasterError> {
        let count = Self::pixel_count(width, height)?;
        Ok(Self {
            width,
            height,
            pixels: vec![color; count],
        })
    }
    /// Wrap an existing row-major pixel buffer.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<Argb>) -> Result<Self, RasterError> {
        let expected = Self::pixel_count(width, height)?;
        if pixels.len() == expected {
            Ok(Self {
                width,
                height,
                pixels,
            })
        } else {
            Err(RasterError::LengthMismatch {
                expected,
                actual: pixels.len(),
            })
        }
    }
    /// Build an image by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut f: impl FnMut(u32, u32) -> Argb,
    ) -> Result<Self, RasterError> {
        let count = Self::pixel_count(width, height)?;
        let mut pixels = Vec::with_capacity(count);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }
    #[must_use]
    pub fn dimensions(&self) -> [u32; 2] {
        [self.width, self.height]
    }
    fn index_of(&self, x: u32, y: u32) -> Option<usize> {
        if x < self.width && y < self.height {
            // As OK - bounded by pixels.len(), which is a usize.
            Some(y as usize * self.width as usize + x as usize)
        } else {
            None
        }
    }
    /// Fetch a pixel. `None` if out-of-bounds.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<Argb> {
        self.index_of(x, y).map(|idx| self.pixels[idx])
    }
    /// Overwrite a pixel. Returns `None` (and does nothing) if out-of-bounds.
    pub fn put(&mut self, x: u32, y: u32, color: Argb) -> Option<()> {
        let idx = self.index_of(x, y)?;
        self.pixels[idx] = color;
        Some(())
    }
    #[must_use]
    pub fn pixels(&self) -> &[Argb] {
        &self.pixels
    }
    pub fn pixels_mut(&mut self) -> &mut [Argb] {
        &mut self.pixels
    }
    /// Count the pixels exactly equal to `color`.
    #[must_use]
    pub fn count_of(&self, color: Argb) -> usize {
        self.pixels.iter().filter(|&&p| p == color).count()
    }
    /// Tightly packed `RGBA8` bytes, the layout GPU uploads expect.
    #[must_use]
    pub fn to_rgba8_bytes(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|p| p.to_rgba8()).collect()
    }
    pub fn from_rgba_image(image: &image::RgbaImage) -> Result<Self, RasterError> {
        let pixels = image.pixels().map(|p| Argb::from_rgba8(p.0)).collect();
        Self::from_pixels(image.width(), image.height(), pixels)
    }
    #[must_use]
    pub fn to_rgba_image(&self) -> image::RgbaImage {
        image::RgbaImage::from_fn(self.width, self.height, |x, y| {
            // In bounds - from_fn only visits our own dimensions.
            image::Rgba(self.pixels[self.index_of(x, y).unwrap_or_default()].to_rgba8())
        })
    }
}
impl std::fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Dumping every pixel is never useful.
        f.debug_struct("RasterImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}
