//! Camera frame conversion: planar YUV 4:2:0 into [`RasterImage`]s, for capturing what the camera
//! sees as an overlay or coloring source.

use crate::color::Argb;
use crate::raster::{RasterError, RasterImage};

/// One plane of a camera image, with the layout the camera reports.
#[derive(Copy, Clone, Debug)]
pub struct YuvPlane<'a> {
    pub data: &'a [u8],
    /// Bytes between the starts of consecutive rows.
    pub row_stride: usize,
    /// Bytes between consecutive samples in a row. 2 for interleaved chroma.
    pub pixel_stride: usize,
}
impl YuvPlane<'_> {
    fn sample(&self, plane: Plane, column: usize, row: usize) -> Result<u8, ConvertError> {
        let index = row * self.row_stride + column * self.pixel_stride;
        self.data
            .get(index)
            .copied()
            .ok_or(ConvertError::PlaneTooShort {
                plane,
                index,
                len: self.data.len(),
            })
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Plane {
    Y,
    U,
    V,
}

/// A YUV 4:2:0 frame. Chroma planes are subsampled by two on both axes.
#[derive(Copy, Clone, Debug)]
pub struct Yuv420Frame<'a> {
    pub width: u32,
    pub height: u32,
    pub y: YuvPlane<'a>,
    pub u: YuvPlane<'a>,
    pub v: YuvPlane<'a>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    #[error("{plane:?} plane has {len} bytes, sample {index} is out of range")]
    PlaneTooShort {
        plane: Plane,
        index: usize,
        len: usize,
    },
    #[error(transparent)]
    Raster(#[from] RasterError),
}

/// Full-range BT.601 conversion, truncating then clamping each channel. Alpha is opaque.
#[must_use]
pub fn yuv_to_argb(y: u8, u: u8, v: u8) -> Argb {
    use az::SaturatingAs;
    let y = f32::from(y);
    let u = f32::from(u) - 128.0;
    let v = f32::from(v) - 128.0;

    let r = (y + 1.402 * v).saturating_as::<u8>();
    let g = (y - 0.344 * u - 0.714 * v).saturating_as::<u8>();
    let b = (y + 1.772 * u).saturating_as::<u8>();
    Argb::from_channels(255, r, g, b)
}

pub fn yuv420_to_raster(frame: &Yuv420Frame<'_>) -> Result<RasterImage, ConvertError> {
    let mut pixels = Vec::with_capacity(frame.width as usize * frame.height as usize);
    for row in 0..frame.height as usize {
        for column in 0..frame.width as usize {
            let y = frame.y.sample(Plane::Y, column, row)?;
            let u = frame.u.sample(Plane::U, column / 2, row / 2)?;
            let v = frame.v.sample(Plane::V, column / 2, row / 2)?;
            pixels.push(yuv_to_argb(y, u, v));
        }
    }
    Ok(RasterImage::from_pixels(frame.width, frame.height, pixels)?)
}
