/// A packed 8-bit-per-channel pixel, laid out as `0xAARRGGBB`.
///
/// This is the pixel format of every [`crate::raster::RasterImage`], and the format camera frames
/// and decoded bitmaps are normalized into before they reach the fill engine or the GPU.
#[repr(transparent)]
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Default, bytemuck::Pod, bytemuck::Zeroable, Debug,
)]
pub struct Argb(pub u32);
impl Argb {
    pub const TRANSPARENT: Self = Self(0);
    pub const BLACK: Self = Self(0xFF00_0000);
    pub const WHITE: Self = Self(0xFFFF_FFFF);
    #[must_use]
    pub const fn from_channels(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self((a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32)
    }
    #[must_use]
    pub const fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }
    #[must_use]
    pub const fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }
    #[must_use]
    pub const fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }
    #[must_use]
    pub const fn blue(self) -> u8 {
        self.0 as u8
    }
    /// Channels in `[a, r, g, b]` order.
    #[must_use]
    pub const fn channels(self) -> [u8; 4] {
        [self.alpha(), self.red(), self.green(), self.blue()]
    }
    /// The largest absolute per-channel difference between two pixels, alpha included.
    #[must_use]
    pub fn max_channel_difference(self, other: Self) -> u8 {
        self.channels()
            .into_iter()
            .zip(other.channels())
            .map(|(a, b)| a.abs_diff(b))
            .max()
            .unwrap_or(0)
    }
    /// Bytes in `[r, g, b, a]` order, as expected by texture uploads and the `image` crate.
    #[must_use]
    pub const fn to_rgba8(self) -> [u8; 4] {
        [self.red(), self.green(), self.blue(), self.alpha()]
    }
    #[must_use]
    pub const fn from_rgba8([r, g, b, a]: [u8; 4]) -> Self {
        Self::from_channels(a, r, g, b)
    }
}
impl From<Rgba> for Argb {
    fn from(value: Rgba) -> Self {
        use az::SaturatingAs;
        // Saturating cast also takes care of the (unreachable, finite-checked) NaN case.
        let [r, g, b, a] = value.as_array().map(|c| (c * 255.0).round().saturating_as::<u8>());
        Self::from_channels(a, r, g, b)
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorError {
    #[error("color channel is not finite")]
    NotFinite,
}

/// A straight (non-premultiplied) RGBA color with channels in `[0, 1]`.
/// Used for uniform colors: stroke colors and wireframe tints.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable, Debug)]
pub struct Rgba([f32; 4]);
impl Rgba {
    pub const TRANSPARENT: Self = Self([0.0; 4]);
    pub const WHITE: Self = Self([1.0; 4]);
    pub const BLACK: Self = Self([0.0, 0.0, 0.0, 1.0]);
    pub const RED: Self = Self([1.0, 0.0, 0.0, 1.0]);
    /// Create a color, clamping each channel into `[0, 1]`.
    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Result<Self, ColorError> {
        Self::from_array([r, g, b, a])
    }
    pub fn from_array(channels: [f32; 4]) -> Result<Self, ColorError> {
        if channels.iter().all(|c| c.is_finite()) {
            Ok(Self(channels.map(|c| c.clamp(0.0, 1.0))))
        } else {
            Err(ColorError::NotFinite)
        }
    }
    /// Const constructor for known-good literals. Channels must already be finite and in range.
    #[must_use]
    pub(crate) const fn from_array_unchecked(channels: [f32; 4]) -> Self {
        Self(channels)
    }
    #[must_use]
    pub fn as_array(&self) -> [f32; 4] {
        self.0
    }
    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.0[3]
    }
}
impl Default for Rgba {
    fn default() -> Self {
        Self::RED
    }
}
impl From<Argb> for Rgba {
    fn from(value: Argb) -> Self {
        let [r, g, b, a] = value.to_rgba8();
        Self([r, g, b, a].map(|c| f32::from(c) / 255.0))
    }
}
