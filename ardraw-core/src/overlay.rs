//! # Overlay selection
//!
//! Which bitmap the overlay shows. Screens hand images to the tracking view through this explicit
//! state instead of through globals: a picked image, a cropped capture, or a raw camera capture.

use std::sync::Arc;

use crate::raster::RasterImage;
use crate::reference::{prepare_cropped_image, ReferenceError};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, strum::AsRefStr)]
pub enum OverlaySource {
    Selected,
    Cropped,
    Captured,
}

/// Images are shared, not copied, between the selection and whoever displays them.
#[derive(Clone, Debug, Default)]
pub struct OverlaySelection {
    selected: Option<Arc<RasterImage>>,
    cropped: Option<Arc<RasterImage>>,
    captured: Option<Arc<RasterImage>>,
}
impl OverlaySelection {
    pub fn set_selected(&mut self, image: impl Into<Arc<RasterImage>>) {
        self.selected = Some(image.into());
    }
    /// Store a crop of the capture, normalized with [`prepare_cropped_image`]. On error the
    /// previous crop is kept.
    pub fn set_cropped(&mut self, crop: &RasterImage) -> Result<(), ReferenceError> {
        self.cropped = Some(Arc::new(prepare_cropped_image(crop)?));
        Ok(())
    }
    /// A new capture invalidates any crop of the previous one.
    pub fn set_captured(&mut self, image: impl Into<Arc<RasterImage>>) {
        self.captured = Some(image.into());
        self.cropped = None;
    }
    #[must_use]
    pub fn get(&self, source: OverlaySource) -> Option<&Arc<RasterImage>> {
        match source {
            OverlaySource::Selected => self.selected.as_ref(),
            OverlaySource::Cropped => self.cropped.as_ref(),
            OverlaySource::Captured => self.captured.as_ref(),
        }
    }
    /// The image to display, preferring selected, then cropped, then captured.
    #[must_use]
    pub fn display_image(&self) -> Option<(OverlaySource, &Arc<RasterImage>)> {
        [
            OverlaySource::Selected,
            OverlaySource::Cropped,
            OverlaySource::Captured,
        ]
        .into_iter()
        .find_map(|source| self.get(source).map(|image| (source, image)))
    }
    pub fn clear(&mut self) {
        *self = Self::default();
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.display_image().is_none()
    }
}

#[cfg(test)]
mod test {
    use super::{OverlaySelection, OverlaySource};
    use crate::color::Argb;
    use crate::raster::RasterImage;
    use crate::reference::CROPPED_IMAGE_SIZE;

    fn image(color: Argb) -> RasterImage {
        RasterImage::new_filled(1, 1, color).unwrap()
    }

    #[test]
    fn priority() {
        let mut selection = OverlaySelection::default();
        assert!(selection.is_empty());

        selection.set_captured(image(Argb::BLACK));
        assert_eq!(selection.display_image().unwrap().0, OverlaySource::Captured);
        selection.set_cropped(&image(Argb::WHITE)).unwrap();
        assert_eq!(selection.display_image().unwrap().0, OverlaySource::Cropped);
        selection.set_selected(image(Argb::TRANSPARENT));
        let (source, shown) = selection.display_image().unwrap();
        assert_eq!(source, OverlaySource::Selected);
        assert_eq!(shown.get(0, 0), Some(Argb::TRANSPARENT));

        selection.clear();
        assert!(selection.is_empty());
    }
    #[test]
    fn crop_is_normalized() {
        let mut selection = OverlaySelection::default();
        let capture = RasterImage::new_filled(30, 12, Argb::WHITE).unwrap();
        selection.set_cropped(&capture).unwrap();
        let cropped = selection.get(OverlaySource::Cropped).unwrap();
        assert_eq!(cropped.dimensions(), [CROPPED_IMAGE_SIZE; 2]);
        assert_eq!(cropped.get(0, 0), Some(Argb::TRANSPARENT));
        assert_eq!(cropped.get(256, 256), Some(Argb::WHITE));
    }
    #[test]
    fn new_capture_drops_crop() {
        let mut selection = OverlaySelection::default();
        selection.set_captured(image(Argb::BLACK));
        selection.set_cropped(&image(Argb::WHITE)).unwrap();
        selection.set_captured(image(Argb::WHITE));
        assert!(selection.get(OverlaySource::Cropped).is_none());
        assert_eq!(selection.display_image().unwrap().0, OverlaySource::Captured);
    }
}
