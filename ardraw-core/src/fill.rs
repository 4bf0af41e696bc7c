//! # Flood fill
//!
//! Bucket fill for the coloring tool. Breadth-first over a FIFO queue, 4-connected, with a
//! per-channel tolerance so fills run up to (but not past) anti-aliased line art.
//!
//! Pixels touching only at a diagonal corner are *not* connected. Thin diagonal line art therefore
//! leaks, and diagonally adjacent regions of the same color are filled separately.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::color::Argb;
use crate::raster::RasterImage;

pub const DEFAULT_TOLERANCE: u8 = 30;

/// Maximum absolute difference, per channel, for a pixel to count as "the same color"
/// as the seed. Applies to alpha as well.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Tolerance(pub u8);
impl Tolerance {
    /// Only exact matches.
    pub const EXACT: Self = Self(0);
    #[must_use]
    pub fn accepts(self, seed: Argb, pixel: Argb) -> bool {
        seed.max_channel_difference(pixel) <= self.0
    }
}
impl Default for Tolerance {
    fn default() -> Self {
        Self(DEFAULT_TOLERANCE)
    }
}

/// Clamp a possibly out-of-bounds seed into the image.
fn clamp_seed(image: &RasterImage, [x, y]: [i64; 2]) -> [u32; 2] {
    use az::SaturatingAs;
    // Images are never empty, so `dim - 1` never underflows.
    let max_x = i64::from(image.width() - 1);
    let max_y = i64::from(image.height() - 1);
    [x.clamp(0, max_x).saturating_as(), y.clamp(0, max_y).saturating_as()]
}

/// Fill in place, returning how many pixels were written.
pub fn fill_in_place(
    image: &mut RasterImage,
    seed: [i64; 2],
    color: Argb,
    tolerance: Tolerance,
) -> usize {
    let [seed_x, seed_y] = clamp_seed(image, seed);
    // Seed was clamped in bounds, the fallback is unreachable.
    let seed_color = image.get(seed_x, seed_y).unwrap_or(color);
    if seed_color == color {
        return 0;
    }

    let [width, height] = image.dimensions();
    // As OK - the image's pixel count already fits in memory.
    let index = |x: u32, y: u32| y as usize * width as usize + x as usize;
    let mut visited = bitvec::vec::BitVec::<usize>::repeat(false, image.pixels().len());
    let mut queue = VecDeque::new();
    queue.push_back((seed_x, seed_y));
    let mut filled = 0;

    while let Some((x, y)) = queue.pop_front() {
        let idx = index(x, y);
        if visited[idx] {
            continue;
        }
        let Some(pixel) = image.get(x, y) else {
            continue;
        };
        if !tolerance.accepts(seed_color, pixel) {
            continue;
        }
        visited.set(idx, true);
        image.pixels_mut()[idx] = color;
        filled += 1;

        // Four axis-aligned neighbors, skipping those off the edge.
        if x + 1 < width {
            queue.push_back((x + 1, y));
        }
        if let Some(left) = x.checked_sub(1) {
            queue.push_back((left, y));
        }
        if y + 1 < height {
            queue.push_back((x, y + 1));
        }
        if let Some(up) = y.checked_sub(1) {
            queue.push_back((x, up));
        }
    }

    filled
}

/// Bucket-fill the region connected to `seed` with `color`, returning the same image.
///
/// Out-of-bounds seeds are clamped to the nearest edge pixel. If the seed pixel is already exactly
/// `color` the image is returned untouched.
#[must_use = "the filled image is returned, not modified through a reference"]
pub fn flood_fill(
    mut image: RasterImage,
    seed: [i64; 2],
    color: Argb,
    tolerance: Tolerance,
) -> RasterImage {
    let filled = fill_in_place(&mut image, seed, color, tolerance);
    log::trace!("flood fill from {seed:?} wrote {filled} pixels");
    image
}

#[derive(thiserror::Error, Debug)]
pub enum FillError {
    #[error("failed to spawn fill worker: {0}")]
    Spawn(#[from] std::io::Error),
    /// The worker thread went away without responding. It panicked, most likely.
    #[error("fill worker exited without a result")]
    WorkerLost,
}

pub struct FillResult {
    pub generation: u64,
    pub image: RasterImage,
    /// Number of pixels written.
    pub filled: usize,
}

/// A fill in flight on a worker thread.
pub struct FillTicket {
    generation: u64,
    receiver: tokio::sync::oneshot::Receiver<FillResult>,
}
impl FillTicket {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
    /// Block until the fill completes.
    ///
    /// # Panics
    /// If called from within an async runtime. Use [`FillTicket::recv`] there instead.
    pub fn wait(self) -> Result<FillResult, FillError> {
        self.receiver
            .blocking_recv()
            .map_err(|_| FillError::WorkerLost)
    }
    pub async fn recv(self) -> Result<FillResult, FillError> {
        self.receiver.await.map_err(|_| FillError::WorkerLost)
    }
    /// Non-blocking check. `Ok(None)` if still running.
    pub fn try_take(&mut self) -> Result<Option<FillResult>, FillError> {
        use tokio::sync::oneshot::error::TryRecvError;
        match self.receiver.try_recv() {
            Ok(result) => Ok(Some(result)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Closed) => Err(FillError::WorkerLost),
        }
    }
}

/// Runs fills off the UI thread, one short-lived thread per request.
///
/// Every request works on its own copy of the displayed image, so the displayed image is never
/// written from another thread. Requests are numbered; when several are in flight, only the result
/// of the most recent request is [current](FillWorker::is_current). Older results should be dropped.
#[derive(Default, Clone)]
pub struct FillWorker {
    latest: Arc<AtomicU64>,
}
impl FillWorker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    pub fn request(
        &self,
        displayed: &RasterImage,
        seed: [i64; 2],
        color: Argb,
        tolerance: Tolerance,
    ) -> Result<FillTicket, FillError> {
        let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        let mut image = displayed.clone();
        let (send, receiver) = tokio::sync::oneshot::channel();

        std::thread::Builder::new()
            .name(format!("Flood fill #{generation}"))
            .spawn(move || {
                let filled = fill_in_place(&mut image, seed, color, tolerance);
                // Receiver may have lost interest, that's fine.
                let _ = send.send(FillResult {
                    generation,
                    image,
                    filled,
                });
            })?;

        Ok(FillTicket {
            generation,
            receiver,
        })
    }
    /// Is this the result of the most recent request?
    #[must_use]
    pub fn is_current(&self, result: &FillResult) -> bool {
        result.generation == self.latest.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod test {
    use super::{fill_in_place, flood_fill, FillWorker, Tolerance};
    use crate::color::Argb;
    use crate::raster::RasterImage;

    const RED: Argb = Argb::from_channels(255, 255, 0, 0);
    const GREEN: Argb = Argb::from_channels(255, 0, 255, 0);
    const BLUE: Argb = Argb::from_channels(255, 0, 0, 255);

    /// 10x10 blue with a red square covering `[2, 6)` on both axes.
    fn red_square_on_blue() -> RasterImage {
        RasterImage::from_fn(10, 10, |x, y| {
            if (2..6).contains(&x) && (2..6).contains(&y) {
                RED
            } else {
                BLUE
            }
        })
        .unwrap()
    }

    #[test]
    fn already_target_color_is_untouched() {
        let image = RasterImage::new_filled(8, 8, GREEN).unwrap();
        let before = image.clone();
        let after = flood_fill(image, [3, 3], GREEN, Tolerance::default());
        assert_eq!(after, before);
    }
    #[test]
    fn fill_stays_inside_boundary() {
        let image = red_square_on_blue();
        let blue_before = image.count_of(BLUE);
        let after = flood_fill(image, [3, 4], GREEN, Tolerance::default());

        assert_eq!(after.count_of(RED), 0);
        assert_eq!(after.count_of(GREEN), 16);
        assert_eq!(after.count_of(BLUE), blue_before);
        for y in 0..10 {
            for x in 0..10 {
                let inside = (2..6).contains(&x) && (2..6).contains(&y);
                let expected = if inside { GREEN } else { BLUE };
                assert_eq!(after.get(x, y), Some(expected), "pixel {x},{y}");
            }
        }
    }
    #[test]
    fn diagonal_regions_are_not_merged() {
        // Two red 2x2 blocks touching only at the (1,1)-(2,2) corner.
        let image = RasterImage::from_fn(4, 4, |x, y| {
            if (x < 2 && y < 2) || (x >= 2 && y >= 2) {
                RED
            } else {
                BLUE
            }
        })
        .unwrap();
        let after = flood_fill(image, [0, 0], GREEN, Tolerance::default());
        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            assert_eq!(after.get(x, y), Some(GREEN));
        }
        for (x, y) in [(2, 2), (3, 2), (2, 3), (3, 3)] {
            assert_eq!(after.get(x, y), Some(RED));
        }
    }
    #[test]
    fn tolerance_crosses_antialiasing() {
        // A white canvas with a slightly-off-white column, then a black wall.
        let off_white = Argb::from_channels(255, 230, 230, 230);
        let mut image = RasterImage::from_fn(6, 3, |x, _| match x {
            2 => off_white,
            4 => Argb::BLACK,
            _ => Argb::WHITE,
        })
        .unwrap();
        let mut exact = image.clone();

        let filled = fill_in_place(&mut image, [0, 0], GREEN, Tolerance::default());
        // Columns 0..4 are filled, the black wall and beyond are not.
        assert_eq!(filled, 4 * 3);
        assert_eq!(image.get(5, 1), Some(Argb::WHITE));

        // Without tolerance, the off-white column stops the fill.
        let filled = fill_in_place(&mut exact, [0, 0], GREEN, Tolerance::EXACT);
        assert_eq!(filled, 2 * 3);
    }
    #[test]
    fn alpha_counts_toward_tolerance() {
        let translucent = Argb::from_channels(128, 255, 255, 255);
        let mut image =
            RasterImage::from_fn(4, 1, |x, _| if x < 2 { Argb::WHITE } else { translucent })
                .unwrap();
        let filled = fill_in_place(&mut image, [0, 0], GREEN, Tolerance::default());
        assert_eq!(filled, 2);
    }
    #[test]
    fn out_of_bounds_seed_is_clamped() {
        let image = red_square_on_blue();
        // Clamped to (9, 0), which is in the blue region.
        let after = flood_fill(image, [100, -5], GREEN, Tolerance::default());
        assert_eq!(after.count_of(BLUE), 0);
        assert_eq!(after.count_of(RED), 16);
    }
    #[test]
    fn worker_leaves_displayed_image_alone() {
        let displayed = red_square_on_blue();
        let worker = FillWorker::new();
        let ticket = worker
            .request(&displayed, [3, 3], GREEN, Tolerance::default())
            .unwrap();
        let result = ticket.wait().unwrap();

        assert_eq!(result.filled, 16);
        assert_eq!(result.image.count_of(GREEN), 16);
        assert_eq!(displayed.count_of(GREEN), 0);
        assert!(worker.is_current(&result));
    }
    #[test]
    fn only_latest_result_is_current() {
        let displayed = red_square_on_blue();
        let worker = FillWorker::new();
        let first = worker
            .request(&displayed, [3, 3], GREEN, Tolerance::default())
            .unwrap();
        let second = worker
            .request(&displayed, [0, 0], GREEN, Tolerance::default())
            .unwrap();
        assert!(first.generation() < second.generation());

        let first = first.wait().unwrap();
        let second = second.wait().unwrap();
        assert!(!worker.is_current(&first));
        assert!(worker.is_current(&second));
    }
}
