//! Age and gender recognition engine
//!
//! Takes a face bounding box, expands it into a square crop, and decodes the
//! model's two heads: a scaled age value and a two-class gender head.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use image::RgbImage;
use tracing::debug;

use super::{ms_since, StageTimings};
use crate::inference::backend::InferenceBackend;
use crate::inference::tensor::{InputTensorInfo, Normalize, OutputTensorInfo, TensorType};
use crate::utils::image::{crop_resize, CropMode, Rect};

const MODEL_NAME: &str = "age-gender-recognition.tflite";
const INPUT_NAME: &str = "data";
const INPUT_DIMS: [i64; 4] = [1, 62, 62, 3];
const OUTPUT_NAME_AGE: &str = "Identity";
const OUTPUT_NAME_GENDER: &str = "Identity_1";

/// Face bounding box expansion factor before cropping
const FACE_EXPAND: f32 = 1.7;

/// Default probability a gender class must exceed to be reported
pub const DEFAULT_GENDER_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Female,
    Male,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Female => "female",
            Gender::Male => "male",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgeGenderResult {
    pub age: i32,
    /// Unset when neither class clears the threshold
    pub gender: Option<Gender>,
    pub gender_confidence: f32,
    pub timings: StageTimings,
}

pub struct AgeGenderEngine {
    backend: Box<dyn InferenceBackend>,
    inputs: Vec<InputTensorInfo>,
    outputs: Vec<OutputTensorInfo>,
    gender_threshold: f32,
}

impl AgeGenderEngine {
    pub fn new(
        mut backend: Box<dyn InferenceBackend>,
        work_dir: &Path,
        num_threads: i32,
        gender_threshold: f32,
    ) -> Result<Self> {
        let model_path = work_dir.join("model").join(MODEL_NAME);

        let mut input = InputTensorInfo::new(INPUT_NAME, TensorType::F32, INPUT_DIMS.to_vec(), false);
        input.is_rgb = false;
        // this model takes raw 0-255 values
        input.normalize = Normalize {
            mean: [0.0; 3],
            norm: [1.0 / 255.0; 3],
        };
        let mut inputs = vec![input];
        let mut outputs = vec![
            OutputTensorInfo::new(OUTPUT_NAME_AGE, TensorType::F32),
            OutputTensorInfo::new(OUTPUT_NAME_GENDER, TensorType::F32),
        ];

        backend.set_num_threads(num_threads)?;
        backend
            .initialize(&model_path, &mut inputs, &mut outputs)
            .with_context(|| format!("initializing age/gender model {}", model_path.display()))?;
        for input in &inputs {
            input.validate()?;
        }

        Ok(Self {
            backend,
            inputs,
            outputs,
            gender_threshold,
        })
    }

    /// Estimate age and gender for the face inside `face_box`
    pub fn process(&mut self, frame: &RgbImage, face_box: Rect) -> Result<AgeGenderResult> {
        // PreProcess: widen the face box into a square crop, stretch to the
        // model input
        let t0 = Instant::now();
        let input = &mut self.inputs[0];
        let (w, h) = (input.width(), input.height());
        let crop = face_box.expand_to_square(FACE_EXPAND);
        input.frame = Some(crop_resize(frame, crop, w, h, CropMode::Stretch)?);
        self.backend.pre_process(&self.inputs)?;
        let pre_process_ms = ms_since(t0);

        // Inference
        let t1 = Instant::now();
        self.backend.process(&mut self.outputs)?;
        let inference_ms = ms_since(t1);

        // PostProcess
        let t2 = Instant::now();
        let raw_age = self.outputs[0]
            .data
            .first()
            .copied()
            .context("age output is empty")?;
        let age = (raw_age * 100.0).round() as i32;
        let (gender, gender_confidence) =
            decode_gender(&self.outputs[1].data, self.gender_threshold)?;
        let post_process_ms = ms_since(t2);

        debug!(
            age,
            gender = gender.map(|g| g.as_str()).unwrap_or("unknown"),
            gender_confidence,
            "face attributes decoded"
        );

        Ok(AgeGenderResult {
            age,
            gender,
            gender_confidence,
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

/// Pick the higher-probability class only when it clears `threshold`;
/// otherwise the gender stays unset. Probabilities are `[female, male]`.
fn decode_gender(probs: &[f32], threshold: f32) -> Result<(Option<Gender>, f32)> {
    anyhow::ensure!(
        probs.len() >= 2,
        "gender output has {} values, expected 2",
        probs.len()
    );
    let (female, male) = (probs[0], probs[1]);
    if female > male && female > threshold {
        Ok((Some(Gender::Female), female))
    } else if male > female && male > threshold {
        Ok((Some(Gender::Male), male))
    } else {
        Ok((None, female.max(male)))
    }
}
