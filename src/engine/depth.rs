//! Monocular depth estimation engine (MiDaS v2.1 small)
//!
//! The model emits relative depth with no fixed range; the decode step
//! contrast-stretches the observed values into an 8-bit map.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use image::{GrayImage, RgbImage};
use tracing::debug;

use super::{ms_since, StageTimings};
use crate::inference::backend::InferenceBackend;
use crate::inference::tensor::{InputTensorInfo, Normalize, OutputTensorInfo, TensorType};
use crate::utils::image::{crop_resize, CropMode, LetterboxInfo, Rect};
use crate::utils::math::min_max;

const MODEL_NAME: &str = "lite-model_midas_v2_1_small_1_lite_1.tflite";
const INPUT_NAME: &str = "Const";
const INPUT_DIMS: [i64; 4] = [1, 256, 256, 3];
const OUTPUT_NAME: &str = "midas_net_custom/sequential/re_lu_9/Relu";

#[derive(Debug, Clone)]
pub struct DepthResult {
    /// Contrast-stretched depth map in the letterboxed model space
    pub depth_map: GrayImage,
    /// Maps depth-map coordinates back to the source frame
    pub letterbox: LetterboxInfo,
    pub timings: StageTimings,
}

pub struct DepthEngine {
    backend: Box<dyn InferenceBackend>,
    inputs: Vec<InputTensorInfo>,
    outputs: Vec<OutputTensorInfo>,
}

impl DepthEngine {
    pub fn new(
        mut backend: Box<dyn InferenceBackend>,
        work_dir: &Path,
        num_threads: i32,
    ) -> Result<Self> {
        let model_path = work_dir.join("model").join(MODEL_NAME);

        let mut input = InputTensorInfo::new(INPUT_NAME, TensorType::F32, INPUT_DIMS.to_vec(), false);
        input.is_rgb = true;
        // ImageNet mean/std, per the MiDaS mobilenet preprocessing
        input.normalize = Normalize {
            mean: [0.485, 0.456, 0.406],
            norm: [0.229, 0.224, 0.225],
        };
        let mut inputs = vec![input];
        let mut outputs = vec![OutputTensorInfo::new(OUTPUT_NAME, TensorType::F32)];

        backend.set_num_threads(num_threads)?;
        backend
            .initialize(&model_path, &mut inputs, &mut outputs)
            .with_context(|| format!("initializing depth model {}", model_path.display()))?;
        for input in &inputs {
            input.validate()?;
        }

        Ok(Self {
            backend,
            inputs,
            outputs,
        })
    }

    /// Estimate relative depth for the whole frame
    pub fn process(&mut self, frame: &RgbImage) -> Result<DepthResult> {
        // PreProcess: letterbox the frame into the model input
        let t0 = Instant::now();
        let input = &mut self.inputs[0];
        let (w, h) = (input.width(), input.height());
        input.frame = Some(crop_resize(
            frame,
            Rect::full(frame.width(), frame.height()),
            w,
            h,
            CropMode::Expand,
        )?);
        let letterbox = LetterboxInfo::new(frame.dimensions(), (w, h));
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
            "depth output has {} channels, expected 1",
            output.channels()
        );
        let depth_map = decode_depth(&output.data, output.width(), output.height())?;
        let post_process_ms = ms_since(t2);

        debug!(pre_process_ms, inference_ms, post_process_ms, "depth frame processed");

        Ok(DepthResult {
            depth_map,
            letterbox,
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

/// Map raw depth values to u8 via `255 * (v - min) / (max - min)`. A flat
/// buffer (min == max) comes out all zeros.
fn decode_depth(values: &[f32], width: u32, height: u32) -> Result<GrayImage> {
    let expected = (width * height) as usize;
    anyhow::ensure!(
        values.len() >= expected && expected > 0,
        "depth output has {} values, expected {}x{}",
        values.len(),
        width,
        height
    );

    let (depth_min, depth_max) = min_max(&values[..expected]);
    let range = depth_max - depth_min;
    let bytes: Vec<u8> = if range > 0.0 {
        values[..expected]
            .iter()
            .map(|&v| (255.0 * (v - depth_min) / range).clamp(0.0, 255.0) as u8)
            .collect()
    } else {
        vec![0u8; expected]
    };

    GrayImage::from_raw(width, height, bytes).context("building depth map image")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::FakeBackend;

    #[test]
    fn test_decode_depth_maps_extremes() {
        let values = vec![2.0, 4.0, 6.0, 10.0];
        let map = decode_depth(&values, 2, 2).unwrap();
        assert_eq!(map.get_pixel(0, 0)[0], 0); // observed min
        assert_eq!(map.get_pixel(1, 1)[0], 255); // observed max
        // 4.0 -> 255 * 2/8
        assert_eq!(map.get_pixel(1, 0)[0], 63);
    }

    #[test]
    fn test_decode_depth_flat_buffer() {
        let values = vec![5.0; 4];
        let map = decode_depth(&values, 2, 2).unwrap();
        assert!(map.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_decode_depth_size_mismatch() {
        assert!(decode_depth(&[1.0, 2.0], 2, 2).is_err());
    }

    #[test]
    fn test_process_with_fake_backend() {
        let canned = vec![(vec![1, 2, 2, 1], vec![1.0, 2.0, 3.0, 5.0])];
        let backend = Box::new(FakeBackend::new(canned));
        let mut engine = DepthEngine::new(backend, Path::new("/work"), 4).unwrap();

        let frame = RgbImage::from_pixel(64, 32, image::Rgb([10, 20, 30]));
        let result = engine.process(&frame).unwrap();

        assert_eq!(result.depth_map.dimensions(), (2, 2));
        assert_eq!(result.depth_map.get_pixel(0, 0)[0], 0);
        assert_eq!(result.depth_map.get_pixel(1, 1)[0], 255);
        // letterbox maps the model-space center column back near the frame center
        let (sx, _) = result.letterbox.to_source(128.0, 128.0);
        assert!((sx - 32.0).abs() < 1.0);
        assert!(engine.finalize().is_ok());
    }

    #[test]
    fn test_model_path_composition() {
        let backend = Box::new(FakeBackend::new(vec![]));
        let recorder = backend.recorder();
        let _engine = DepthEngine::new(backend, Path::new("/work"), 2).unwrap();
        let recorded = recorder.lock().unwrap();
        assert_eq!(
            recorded.model_path.as_deref(),
            Some(Path::new("/work/model/lite-model_midas_v2_1_small_1_lite_1.tflite"))
        );
        assert_eq!(recorded.num_threads, 2);
    }
}
