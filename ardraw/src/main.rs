#![warn(clippy::pedantic)]

pub mod coloring;
pub mod gpu;
pub mod orchestrator;
pub mod passes;
pub mod settings;
pub mod sim;

use anyhow::Result as AnyResult;
use ardraw_core::convert::{yuv420_to_raster, Yuv420Frame, YuvPlane};
use ardraw_core::reference::{load_raster, prepare_reference_image, save_raster};
use ardraw_core::tracking::DisplayRotation;
use ardraw_core::transform::PhysicalExtent;
use ardraw_core::{Argb, Pose, RasterImage, Rgba};

use gpu::wgpu_backend::{OffscreenTarget, WgpuDevice};
use orchestrator::{Orchestrator, TrackingStatus};
use sim::{ScriptedEngine, Step};

/// Side length of the generated stand-in images.
const GENERATED_SIZE: u32 = 64;
/// Size of the offscreen surface frames are rendered into.
const VIEW_SIZE: [u32; 2] = [540, 960];
/// Where the last rendered frame ends up.
const FRAME_PATH: &str = "ardraw-frame.png";

/// Checkerboard with an outlined circle, a reasonable stand-in for both an overlay and a page.
fn generated_image() -> AnyResult<RasterImage> {
    let center = GENERATED_SIZE as f32 / 2.0;
    Ok(RasterImage::from_fn(
        GENERATED_SIZE,
        GENERATED_SIZE,
        |x, y| {
            // As OK - tiny coordinates.
            let (dx, dy) = (x as f32 - center, y as f32 - center);
            let radius = (dx * dx + dy * dy).sqrt();
            if (radius - center * 0.6).abs() < 1.0 {
                Argb::BLACK
            } else if (x / 8 + y / 8) % 2 == 0 {
                Argb::WHITE
            } else {
                Argb::from_channels(255, 230, 230, 230)
            }
        },
    )?)
}

/// A flat mid-gray camera frame, as a capture would deliver it.
fn captured_frame() -> AnyResult<RasterImage> {
    const SIDE: u32 = 16;
    let luma = vec![128u8; (SIDE * SIDE) as usize];
    let chroma = vec![128u8; (SIDE * SIDE / 4) as usize];
    let frame = Yuv420Frame {
        width: SIDE,
        height: SIDE,
        y: YuvPlane {
            data: &luma,
            row_stride: SIDE as usize,
            pixel_stride: 1,
        },
        u: YuvPlane {
            data: &chroma,
            row_stride: (SIDE / 2) as usize,
            pixel_stride: 1,
        },
        v: YuvPlane {
            data: &chroma,
            row_stride: (SIDE / 2) as usize,
            pixel_stride: 1,
        },
    };
    Ok(yuv420_to_raster(&frame)?)
}

/// The middle of a capture, as a user would crop it. Deliberately not square.
fn cropped_capture(capture: &RasterImage) -> AnyResult<RasterImage> {
    let [width, height] = capture.dimensions();
    let (crop_width, crop_height) = ((width * 3 / 4).max(1), (height / 2).max(1));
    let (left, top) = ((width - crop_width) / 2, (height - crop_height) / 2);
    Ok(RasterImage::from_fn(crop_width, crop_height, |x, y| {
        capture.get(left + x, top + y).unwrap_or(Argb::TRANSPARENT)
    })?)
}

/// Load the image at `path`, or generate one if none was given or it failed to load.
fn image_or_generated(path: Option<&std::path::Path>) -> AnyResult<RasterImage> {
    if let Some(path) = path {
        match load_raster(path) {
            Ok(image) => {
                log::info!("Loaded {}: {image:?}", path.display());
                return Ok(image);
            }
            Err(e) => log::error!("failed to open image {path:?}: {e:#}"),
        }
    }
    generated_image()
}

/// The camera is aimed, looks away for a moment, then holds still over the image. Later the image
/// drops out of view for a few frames.
fn demo_session() -> Vec<Step> {
    let rest = Pose::from_translation([0.0, 0.0, -0.3]);
    let mut steps = ScriptedEngine::sweeping(rest, 4);
    steps.extend([Step::Hidden, Step::Hidden]);
    steps.extend(ScriptedEngine::settling(rest, 8));
    steps.extend(std::iter::repeat(Step::Hidden).take(5));
    steps.extend(ScriptedEngine::settling(rest, 2));
    steps
}

fn main() -> AnyResult<()> {
    let has_term = std::io::IsTerminal::is_terminal(&std::io::stdin());
    // Log to a terminal, if available. Else, log to "log.out" in the working directory.
    if has_term {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        let _ = simple_logging::log_to_file("log.out", log::LevelFilter::Debug);
    }

    let settings = settings::Settings::load();
    if settings.did_fail_to_load() {
        // Write the defaults out so there's something to edit.
        if let Err(e) = settings.save() {
            log::warn!("Failed to save settings:\n{e:?}");
        }
    }

    // Args are an optional overlay image, then an optional coloring page.
    let paths: Vec<std::path::PathBuf> = std::env::args_os().skip(1).map(Into::into).collect();
    let overlay = image_or_generated(paths.first().map(std::path::PathBuf::as_path))?;
    let page = image_or_generated(paths.get(1).map(std::path::PathBuf::as_path))?;

    // What the tracking database would be given for this overlay.
    let reference = prepare_reference_image(&overlay)?;
    log::debug!("Reference image prepared: {reference:?}");

    let engine = ScriptedEngine::new(PhysicalExtent::new(0.21, 0.297), demo_session());
    let mut orchestrator = Orchestrator::new(engine, &settings.data);
    let mut device = WgpuDevice::request(OffscreenTarget::FORMAT)?;
    let target = OffscreenTarget::new(&device, VIEW_SIZE);

    orchestrator.on_surface_created(&mut device);
    orchestrator.on_surface_changed(VIEW_SIZE[0], VIEW_SIZE[1], DisplayRotation::Deg0);
    let capture = captured_frame()?;
    if let Err(e) = orchestrator.set_camera_frame(&mut device, &capture) {
        log::error!("Camera frame unavailable: {e}");
    }
    if let Err(e) = orchestrator
        .overlay_mut()
        .set_cropped(&cropped_capture(&capture)?)
    {
        log::error!("Crop unavailable: {e}");
    }
    orchestrator.overlay_mut().set_captured(capture);
    orchestrator.overlay_mut().set_selected(overlay);
    if let Err(e) = orchestrator.apply_overlay(&mut device) {
        log::error!("Overlay unavailable: {e}");
    }

    let mut last_status = None;
    for frame in 0..40 {
        device.begin_frame(target.view(), target.size())?;
        let report = orchestrator.draw_frame(&mut device);
        if let Err(e) = device.end_frame() {
            log::error!("Frame {frame} failed to submit: {e}");
        }

        // Trace a diagonal across the image while it's anchored.
        if let TrackingStatus::Anchored { tracking: true } = report.status {
            // As OK - small frame counts.
            let t = (frame % 10) as f32 / 10.0 - 0.45;
            let world = [t * 0.21, 0.0, -0.3 + t * 0.297];
            if let Some(point) = orchestrator.anchor_local(world) {
                if !orchestrator.strokes().is_open() {
                    orchestrator.begin_stroke(Rgba::RED);
                }
                orchestrator.extend_stroke(point);
            }
        } else if orchestrator.strokes().is_open() {
            orchestrator.end_stroke();
        }

        if last_status.as_ref() != Some(&report.status) {
            log::info!(
                "Frame {frame}: {:?}, passes {:?}",
                report.status,
                report.passes_run,
            );
        }
        for pass in &report.passes_failed {
            log::warn!("Frame {frame}: {} pass failed", pass.as_ref());
        }
        last_status = Some(report.status);
    }
    orchestrator.end_stroke();
    log::info!(
        "{} stroke(s), {} point(s) in the first",
        orchestrator.strokes().len(),
        orchestrator
            .strokes()
            .iter()
            .next()
            .map_or(0, |stroke| stroke.points.len()),
    );
    save_raster(&target.read(&device)?, FRAME_PATH)?;
    log::info!("Last frame written to {FRAME_PATH}");
    orchestrator.on_surface_destroyed(&mut device);

    // Bucket fill the middle of the page.
    let mut canvas = coloring::ColoringCanvas::new(page, &settings.data.coloring);
    let view = [360.0, 640.0];
    let center = [view[0] / 2.0, view[1] / 2.0];
    if canvas.tap(view, center, Rgba::RED)? {
        canvas.finish()?;
        log::info!(
            "Filled {} pixels",
            canvas.displayed().count_of(Argb::from(Rgba::RED))
        );
    }
    Ok(())
}
