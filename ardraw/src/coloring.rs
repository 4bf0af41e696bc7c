//! Bucket tool for coloring pages. The page is shown fitted inside a view, taps on it are mapped
//! back to pixels and flood filled off the calling thread.

use ardraw_core::fill::{FillError, FillTicket, FillWorker, Tolerance};
use ardraw_core::raster::RasterImage;
use ardraw_core::{Argb, Rgba};

use crate::settings::ColoringSettings;

/// Placement of an image scaled to fit inside a view, preserving aspect and centered.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Fit {
    pub scale: f32,
    /// Top-left corner of the image in view coordinates.
    pub offset: [f32; 2],
    pub image_size: [u32; 2],
}
impl Fit {
    /// `None` if either the view or the image is empty.
    #[must_use]
    pub fn new(view_size: [f32; 2], image_size: [u32; 2]) -> Option<Self> {
        let [view_w, view_h] = view_size;
        let [image_w, image_h] = image_size;
        if !(view_w > 0.0 && view_h > 0.0) || image_w == 0 || image_h == 0 {
            return None;
        }
        // As OK - image dimensions are far below f32 precision limits.
        let (image_w, image_h) = (image_w as f32, image_h as f32);
        let scale = (view_w / image_w).min(view_h / image_h);
        Some(Self {
            scale,
            offset: [
                (view_w - image_w * scale) / 2.0,
                (view_h - image_h * scale) / 2.0,
            ],
            image_size,
        })
    }
    /// Size of the image on screen.
    #[must_use]
    pub fn scaled_size(&self) -> [f32; 2] {
        // As OK - see above.
        [
            self.image_size[0] as f32 * self.scale,
            self.image_size[1] as f32 * self.scale,
        ]
    }
    /// Pixel under a view position, or `None` in the letterbox around the image.
    #[must_use]
    pub fn to_image(&self, view_position: [f32; 2]) -> Option<[u32; 2]> {
        let x = ((view_position[0] - self.offset[0]) / self.scale).floor();
        let y = ((view_position[1] - self.offset[1]) / self.scale).floor();
        // As OK - saturating float to int, range checked right after.
        let (x, y) = (x as i64, y as i64);
        let x = u32::try_from(x).ok().filter(|&x| x < self.image_size[0])?;
        let y = u32::try_from(y).ok().filter(|&y| y < self.image_size[1])?;
        Some([x, y])
    }
}

pub struct ColoringCanvas {
    displayed: RasterImage,
    worker: FillWorker,
    pending: Vec<FillTicket>,
    tolerance: Tolerance,
}
impl ColoringCanvas {
    #[must_use]
    pub fn new(image: RasterImage, settings: &ColoringSettings) -> Self {
        Self {
            displayed: image,
            worker: FillWorker::new(),
            pending: Vec::new(),
            tolerance: Tolerance(settings.tolerance),
        }
    }
    #[must_use]
    pub fn displayed(&self) -> &RasterImage {
        &self.displayed
    }
    /// Take the page back, e.g. to save it. Fills still running are abandoned.
    #[must_use]
    pub fn into_image(self) -> RasterImage {
        self.displayed
    }
    /// Fills are in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        !self.pending.is_empty()
    }
    #[must_use]
    pub fn fit(&self, view_size: [f32; 2]) -> Option<Fit> {
        Fit::new(view_size, self.displayed.dimensions())
    }
    /// Start a fill at the tapped position. Returns `false` if the tap missed the image.
    pub fn tap(
        &mut self,
        view_size: [f32; 2],
        position: [f32; 2],
        color: Rgba,
    ) -> Result<bool, FillError> {
        let Some([x, y]) = self.fit(view_size).and_then(|fit| fit.to_image(position)) else {
            log::trace!("Tap at {position:?} missed the page");
            return Ok(false);
        };
        let ticket = self.worker.request(
            &self.displayed,
            [i64::from(x), i64::from(y)],
            Argb::from(color),
            self.tolerance,
        )?;
        log::debug!("Fill #{} requested at ({x}, {y})", ticket.generation());
        self.pending.push(ticket);
        Ok(true)
    }
    /// Collect finished fills without blocking. Returns `true` if the displayed image changed.
    ///
    /// Only the most recent request's result is shown. Earlier ones were computed against an
    /// image that has since been superseded and are dropped.
    pub fn poll(&mut self) -> Result<bool, FillError> {
        let mut changed = false;
        let mut lost = None;
        let mut still_pending = Vec::with_capacity(self.pending.len());
        for mut ticket in self.pending.drain(..) {
            match ticket.try_take() {
                Ok(Some(result)) => {
                    if self.worker.is_current(&result) {
                        log::debug!("Fill #{} done, {} pixels", result.generation, result.filled);
                        self.displayed = result.image;
                        changed = true;
                    } else {
                        log::debug!("Dropping stale fill #{}", result.generation);
                    }
                }
                Ok(None) => still_pending.push(ticket),
                Err(e) => lost = Some(e),
            }
        }
        self.pending = still_pending;
        match lost {
            Some(e) => Err(e),
            None => Ok(changed),
        }
    }
    /// Block until every fill in flight is done, then apply the latest.
    pub fn finish(&mut self) -> Result<bool, FillError> {
        let mut changed = false;
        for ticket in std::mem::take(&mut self.pending) {
            let result = ticket.wait()?;
            if self.worker.is_current(&result) {
                self.displayed = result.image;
                changed = true;
            }
        }
        Ok(changed)
    }
}
