//! Vision engines demo
//!
//! Runs the four engines over an input image and writes the depth and mask
//! maps next to it. The age/gender and hand landmark engines are seeded with
//! frame-centered regions; in a full pipeline those come from upstream
//! detectors.

use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use percept::engine::{AgeGenderEngine, DepthEngine, HandLandmarkEngine, SegmentationEngine, StageTimings};
use percept::inference::backend::{create_backend, BackendKind};
use percept::utils::image::{decode_image, encode_png, Rect, RotatedRect};
use percept::Config;

fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let image_path = std::env::args()
        .nth(1)
        .context("usage: percept <image file>")?;

    let config = Config::load(Config::default_path()).unwrap_or_else(|e| {
        info!("Using default config ({e})");
        Config::default()
    });
    let backend_kind: BackendKind = config.inference.backend.parse()?;
    let work_dir = config.inference.work_dir.as_path();
    let device = config.inference.device.as_str();
    let threads = config.inference.num_threads;

    let frame = decode_image(&std::fs::read(&image_path)?)
        .with_context(|| format!("decoding {image_path}"))?
        .to_rgb8();
    info!("Loaded {} ({}x{})", image_path, frame.width(), frame.height());

    // Depth
    let mut depth = DepthEngine::new(create_backend(backend_kind, device)?, work_dir, threads)?;
    let result = depth.process(&frame)?;
    log_timings("depth", &result.timings);
    save_gray(&result.depth_map, &format!("{image_path}.depth.png"))?;
    depth.finalize()?;

    // Person mask
    let mut segmentation =
        SegmentationEngine::new(create_backend(backend_kind, device)?, work_dir, threads)?;
    let result = segmentation.process(&frame)?;
    log_timings("segmentation", &result.timings);
    save_gray(&result.mask, &format!("{image_path}.mask.png"))?;
    segmentation.finalize()?;

    // Age/gender over a frame-centered face box
    let mut age_gender = AgeGenderEngine::new(
        create_backend(backend_kind, device)?,
        work_dir,
        threads,
        config.age_gender.gender_threshold,
    )?;
    let face_box = Rect::new(
        frame.width() as i32 / 4,
        frame.height() as i32 / 4,
        frame.width() as i32 / 2,
        frame.height() as i32 / 2,
    );
    let result = age_gender.process(&frame, face_box)?;
    log_timings("age/gender", &result.timings);
    info!(
        "Age {} gender {} ({:.2})",
        result.age,
        result.gender.map(|g| g.as_str()).unwrap_or("unknown"),
        result.gender_confidence
    );
    age_gender.finalize()?;

    // Hand landmarks over a frame-centered palm
    let mut hand =
        HandLandmarkEngine::new(create_backend(backend_kind, device)?, work_dir, threads)?;
    let side = frame.width().min(frame.height()) as f32;
    let palm = RotatedRect {
        cx: frame.width() as f32 / 2.0,
        cy: frame.height() as f32 / 2.0,
        w: side,
        h: side,
        rotation: 0.0,
    };
    let result = hand.invoke(&frame, &palm)?;
    log_timings("hand landmark", &result.timings);
    let lm = &result.landmark;
    info!(
        "Hand flag {:.2} handedness {:.2} wrist ({:.0}, {:.0}) next rect {:.0}x{:.0} at ({:.0}, {:.0}) rot {:.2}",
        lm.hand_flag,
        lm.handedness,
        lm.pos[0].x,
        lm.pos[0].y,
        lm.rect.w,
        lm.rect.h,
        lm.rect.cx,
        lm.rect.cy,
        lm.rect.rotation
    );
    hand.finalize()?;

    Ok(())
}

fn log_timings(engine: &str, timings: &StageTimings) {
    info!(
        "{engine}: pre {:.2} ms, inference {:.2} ms, post {:.2} ms",
        timings.pre_process_ms, timings.inference_ms, timings.post_process_ms
    );
}

fn save_gray(map: &image::GrayImage, path: &str) -> Result<()> {
    let png = encode_png(&DynamicImage::ImageLuma8(map.clone()))?;
    std::fs::write(Path::new(path), png)?;
    info!("Wrote {path}");
    Ok(())
}
