//! Semantic segmentation engine (person mask)

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use image::{GrayImage, RgbImage};
use tracing::debug;

use super::{ms_since, StageTimings};
use crate::inference::backend::InferenceBackend;
use crate::inference::tensor::{InputTensorInfo, Normalize, OutputTensorInfo, TensorType};
use crate::utils::image::{crop_resize, CropMode, Rect};

const MODEL_NAME: &str = "mobilenet_v3_segm_256.tflite";
const INPUT_NAME: &str = "input_1";
const INPUT_DIMS: [i64; 4] = [1, 256, 256, 3];
const OUTPUT_NAME: &str = "Identity";

#[derive(Debug, Clone)]
pub struct SegmentationResult {
    /// Per-pixel mask confidence scaled to 0-255, at the model's output size
    pub mask: GrayImage,
    pub timings: StageTimings,
}

pub struct SegmentationEngine {
    backend: Box<dyn InferenceBackend>,
    inputs: Vec<InputTensorInfo>,
    outputs: Vec<OutputTensorInfo>,
}

impl SegmentationEngine {
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
        let mut outputs = vec![OutputTensorInfo::new(OUTPUT_NAME, TensorType::F32)];

        backend.set_num_threads(num_threads)?;
        backend
            .initialize(&model_path, &mut inputs, &mut outputs)
            .with_context(|| format!("initializing segmentation model {}", model_path.display()))?;
        for input in &inputs {
            input.validate()?;
        }

        Ok(Self {
            backend,
            inputs,
            outputs,
        })
    }

    /// Produce a person mask for the whole frame
    pub fn process(&mut self, frame: &RgbImage) -> Result<SegmentationResult> {
        // PreProcess: plain resize, aspect ratio is not preserved
        let t0 = Instant::now();
        let input = &mut self.inputs[0];
        let (w, h) = (input.width(), input.height());
        input.frame = Some(crop_resize(
            frame,
            Rect::full(frame.width(), frame.height()),
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
        let output = &self.outputs[0];
        anyhow::ensure!(
            output.channels() == 1,
            "mask output has {} channels, expected 1",
            output.channels()
        );
        let mask = decode_mask(&output.data, output.width(), output.height())?;
        let post_process_ms = ms_since(t2);

        debug!(pre_process_ms, inference_ms, post_process_ms, "mask decoded");

        Ok(SegmentationResult {
            mask,
            timings: StageTimings {
                pre_process_ms,
                inference_ms,
                post_process_ms,
            },
        })
    }

    pub fn finalize(&mut self) -> Result<()> {
        self.backend.finalize()
    }
}

/// Scale [0, 1] mask confidences to bytes, saturating out-of-range values
fn decode_mask(values: &[f32], width: u32, height: u32) -> Result<GrayImage> {
    let expected = (width * height) as usize;
    anyhow::ensure!(
        values.len() >= expected && expected > 0,
        "mask output has {} values, expected {}x{}",
        values.len(),
        width,
        height
    );

    let bytes: Vec<u8> = values[..expected]
        .iter()
        .map(|&v| (v * 255.0).clamp(0.0, 255.0) as u8)
        .collect();

    GrayImage::from_raw(width, height, bytes).context("building mask image")
}
