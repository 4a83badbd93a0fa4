//! Vision inference engines
//!
//! Each engine owns its tensor descriptors and a boxed backend, and runs the
//! same three stages per frame: crop/resize/convert, backend pre-process +
//! process, numeric decode of the output buffer.

pub mod age_gender;
pub mod depth;
pub mod hand_landmark;
pub mod segmentation;

pub use age_gender::{AgeGenderEngine, AgeGenderResult, Gender};
pub use depth::{DepthEngine, DepthResult};
pub use hand_landmark::{HandLandmark, HandLandmarkEngine, HandLandmarkResult, Point3};
pub use segmentation::{SegmentationEngine, SegmentationResult};

use std::time::Instant;

/// Wall-clock milliseconds spent in each stage of one invocation
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
    pub pre_process_ms: f64,
    pub inference_ms: f64,
    pub post_process_ms: f64,
}

pub(crate) fn ms_since(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use anyhow::Result;

    use crate::inference::backend::InferenceBackend;
    use crate::inference::tensor::{self, InputTensorInfo, OutputTensorInfo};

    /// Calls observed by a [`FakeBackend`], shared with the test
    #[derive(Default)]
    pub struct Recorded {
        pub model_path: Option<PathBuf>,
        pub num_threads: i32,
        pub pre_process_calls: u32,
        pub finalized: bool,
    }

    /// Backend stub that checks staged inputs convert cleanly and replays
    /// canned output buffers
    pub struct FakeBackend {
        canned: Vec<(Vec<i64>, Vec<f32>)>,
        pub recorded: Arc<Mutex<Recorded>>,
        pub fail_process: bool,
    }

    impl FakeBackend {
        pub fn new(canned: Vec<(Vec<i64>, Vec<f32>)>) -> Self {
            Self {
                canned,
                recorded: Arc::new(Mutex::new(Recorded::default())),
                fail_process: false,
            }
        }

        pub fn recorder(&self) -> Arc<Mutex<Recorded>> {
            self.recorded.clone()
        }
    }

    impl InferenceBackend for FakeBackend {
        fn set_num_threads(&mut self, n: i32) -> Result<()> {
            self.recorded.lock().unwrap().num_threads = n;
            Ok(())
        }

        fn initialize(
            &mut self,
            model_path: &Path,
            _inputs: &mut [InputTensorInfo],
            _outputs: &mut [OutputTensorInfo],
        ) -> Result<()> {
            self.recorded.lock().unwrap().model_path = Some(model_path.to_path_buf());
            Ok(())
        }

        fn pre_process(&mut self, inputs: &[InputTensorInfo]) -> Result<()> {
            for info in inputs {
                tensor::to_tensor_data(info)?;
            }
            self.recorded.lock().unwrap().pre_process_calls += 1;
            Ok(())
        }

        fn process(&mut self, outputs: &mut [OutputTensorInfo]) -> Result<()> {
            if self.fail_process {
                anyhow::bail!("inference failed");
            }
            for (slot, (dims, data)) in outputs.iter_mut().zip(self.canned.iter()) {
                slot.dims = dims.clone();
                slot.data = data.clone();
            }
            Ok(())
        }

        fn finalize(&mut self) -> Result<()> {
            self.recorded.lock().unwrap().finalized = true;
            Ok(())
        }
    }
}
