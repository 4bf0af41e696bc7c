//! Platform-independent core of ardraw: pose math, the tracking data model and stabilizer,
//! strokes, raster images and the flood fill used by the coloring tool.

pub mod color;
pub mod convert;
pub mod fill;
pub mod overlay;
pub mod pose;
pub mod raster;
pub mod reference;
pub mod stabilizer;
pub mod stroke;
pub mod tracking;
pub mod transform;

pub use color::{Argb, Rgba};
pub use pose::Pose;
pub use raster::RasterImage;
