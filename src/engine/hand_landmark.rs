//! Hand landmark engine (MediaPipe hand landmark model)
//!
//! Takes a rotated palm rectangle from a palm detector (or from the previous
//! frame's landmarks), crops it upright, and decodes 21 keypoints plus hand
//! presence and handedness scores. Decoded keypoints are rotated back onto
//! the source frame, and a new tracking rectangle is derived from them.

use std::f32::consts::{FRAC_PI_2, PI};
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use image::RgbImage;
use tracing::debug;

use super::{ms_since, StageTimings};
use crate::inference::backend::InferenceBackend;
use crate::inference::tensor::{InputTensorInfo, Normalize, OutputTensorInfo, TensorType};
use crate::utils::image::{crop_resize, rotate_crop, CropMode, Rect, RotatedRect};
use crate::utils::math::rotate_point;

const MODEL_NAME: &str = "hand_landmark.tflite";
const INPUT_NAME: &str = "input_1";
const INPUT_DIMS: [i64; 4] = [1, 256, 256, 3];
const OUTPUT_NAME_LANDMARK: &str = "ld_21_3d";
const OUTPUT_NAME_HANDFLAG: &str = "output_handflag";
const OUTPUT_NAME_HANDEDNESS: &str = "output_handedness";

pub const NUM_LANDMARKS: usize = 21;

/// Landmark indices used for orientation: wrist and middle-finger MCP
const WRIST: usize = 0;
const MIDDLE_MCP: usize = 9;

/// Side of the landmark-derived tracking square relative to the landmark
/// bounding box
const RECT_SCALE: f32 = 2.3;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Decoded hand: presence/handedness scores, keypoints on the source frame,
/// and the tracking rectangle derived from them
#[derive(Debug, Clone)]
pub struct HandLandmark {
    pub hand_flag: f32,
    pub handedness: f32,
    pub pos: [Point3; NUM_LANDMARKS],
    pub rect: RotatedRect,
}

#[derive(Debug, Clone)]
pub struct HandLandmarkResult {
    pub landmark: HandLandmark,
    pub timings: StageTimings,
}

pub struct HandLandmarkEngine {
    backend: Box<dyn InferenceBackend>,
    inputs: Vec<InputTensorInfo>,
    outputs: Vec<OutputTensorInfo>,
}

impl HandLandmarkEngine {
    pub fn new(
        mut backend: Box<dyn InferenceBackend>,
        work_dir: &Path,
        num_threads: i32,
    ) -> Result<Self> {
        let model_path = work_dir.join("model").join(MODEL_NAME);

        let mut input = InputTensorInfo::new(INPUT_NAME, TensorType::F32, INPUT_DIMS.to_vec(), false);
        input.is_rgb = true;
        // values scaled to [0, 1]
        input.normalize = Normalize {
            mean: [0.0; 3],
            norm: [1.0; 3],
        };
        let mut inputs = vec![input];
        let mut outputs = vec![
            OutputTensorInfo::new(OUTPUT_NAME_LANDMARK, TensorType::F32),
            OutputTensorInfo::new(OUTPUT_NAME_HANDFLAG, TensorType::F32),
            OutputTensorInfo::new(OUTPUT_NAME_HANDEDNESS, TensorType::F32),
        ];

        backend.set_num_threads(num_threads)?;
        backend
            .initialize(&model_path, &mut inputs, &mut outputs)
            .with_context(|| format!("initializing hand landmark model {}", model_path.display()))?;
        for input in &inputs {
            input.validate()?;
        }

        Ok(Self {
            backend,
            inputs,
            outputs,
        })
    }

    /// Decode hand landmarks inside the rotated palm rectangle
    pub fn invoke(&mut self, frame: &RgbImage, palm: &RotatedRect) -> Result<HandLandmarkResult> {
        // PreProcess: rotate the palm upright, then stretch to the model input
        let t0 = Instant::now();
        let input = &mut self.inputs[0];
        let (w, h) = (input.width(), input.height());
        let upright = rotate_crop(frame, palm);
        input.frame = Some(crop_resize(
            &upright,
            Rect::full(upright.width(), upright.height()),
            w,
            h,
            CropMode::Stretch,
        )?);
        self.backend.pre_process(&self.inputs)?;
        let pre_process_ms = ms_since(t0);

        // Inference
        let t1 = Instant::now();
        self.backend.process(&mut self.outputs)?;
        let inference_ms = ms_since(t1);

        // PostProcess
        let t2 = Instant::now();
        let landmark = self.decode_landmarks(palm)?;
        let post_process_ms = ms_since(t2);

        debug!(
            hand_flag = landmark.hand_flag,
            handedness = landmark.handedness,
            "hand landmarks decoded"
        );

        Ok(HandLandmarkResult {
            landmark,
            timings: StageTimings {
                pre_process_ms,
                inference_ms,
                post_process_ms,
            },
        })
    }

    fn decode_landmarks(&self, palm: &RotatedRect) -> Result<HandLandmark> {
        let ld = &self.outputs[0].data;
        anyhow::ensure!(
            ld.len() >= NUM_LANDMARKS * 3,
            "landmark output has {} values, expected {}",
            ld.len(),
            NUM_LANDMARKS * 3
        );
        let hand_flag = self.outputs[1]
            .data
            .first()
            .copied()
            .context("hand flag output is empty")?;
        let handedness = self.outputs[2]
            .data
            .first()
            .copied()
            .context("handedness output is empty")?;

        let input = &self.inputs[0];
        let (in_w, in_h) = (input.width() as f32, input.height() as f32);
        let palm_x = palm.cx - palm.w / 2.0;
        let palm_y = palm.cy - palm.h / 2.0;

        // scale tensor-space keypoints into the upright palm rectangle, then
        // rotate them around the palm center onto the source frame
        let mut pos = [Point3::default(); NUM_LANDMARKS];
        for (i, p) in pos.iter_mut().enumerate() {
            let x = ld[i * 3] / in_w * palm.w + palm_x;
            let y = ld[i * 3 + 1] / in_h * palm.h + palm_y;
            let (x, y) = rotate_point(x, y, palm.cx, palm.cy, palm.rotation);
            p.x = x;
            p.y = y;
            p.z = ld[i * 3 + 2] / in_w * palm.w;
        }

        let mut landmark = HandLandmark {
            hand_flag,
            handedness,
            pos,
            rect: *palm,
        };
        landmark.rect = landmark_to_rect(&landmark);
        Ok(landmark)
    }

    pub fn finalize(&mut self) -> Result<()> {
        self.backend.finalize()
    }
}

/// Hand orientation from the wrist to the middle-finger MCP, in radians.
/// Zero means the fingers point up in image coordinates.
pub fn calculate_rotation(landmark: &HandLandmark) -> f32 {
    let dx = landmark.pos[MIDDLE_MCP].x - landmark.pos[WRIST].x;
    let dy = landmark.pos[MIDDLE_MCP].y - landmark.pos[WRIST].y;
    normalize_radians(FRAC_PI_2 - (-dy).atan2(dx))
}

/// Derive the tracking rectangle for the next frame: a square around the
/// landmark bounding box, carrying the hand orientation
pub fn landmark_to_rect(landmark: &HandLandmark) -> RotatedRect {
    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for p in &landmark.pos {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    let side = (max_x - min_x).max(max_y - min_y) * RECT_SCALE;
    RotatedRect {
        cx: (min_x + max_x) / 2.0,
        cy: (min_y + max_y) / 2.0,
        w: side,
        h: side,
        rotation: calculate_rotation(landmark),
    }
}

/// Wrap an angle to [-pi, pi)
fn normalize_radians(angle: f32) -> f32 {
    angle - 2.0 * PI * ((angle + PI) / (2.0 * PI)).floor()
}
