//! OpenVINO-backed implementation of the inference contract

use std::path::Path;

use anyhow::{Context, Result};
use ndarray::Array4;
use openvino::{CompiledModel, Core, ElementType, Shape, Tensor};
use tracing::info;

use super::backend::InferenceBackend;
use super::tensor::{self, InputTensorInfo, OutputTensorInfo};

pub struct OpenVinoBackend {
    core: Core,
    device: String,
    num_threads: i32,
    model: Option<CompiledModel>,
    staged: Vec<Array4<f32>>,
}

impl OpenVinoBackend {
    pub fn new(device: &str) -> Result<Self> {
        Ok(Self {
            core: Core::new()?,
            device: device.to_string(),
            num_threads: 0,
            model: None,
            staged: Vec::new(),
        })
    }
}

impl InferenceBackend for OpenVinoBackend {
    fn set_num_threads(&mut self, n: i32) -> Result<()> {
        // thread count is applied by the device plugin configuration
        self.num_threads = n;
        Ok(())
    }

    fn initialize(
        &mut self,
        model_path: &Path,
        inputs: &mut [InputTensorInfo],
        _outputs: &mut [OutputTensorInfo],
    ) -> Result<()> {
        let path = model_path.to_str().context("non-UTF-8 model path")?;
        info!(
            "Loading model {} on {} ({} threads)",
            path, self.device, self.num_threads
        );

        let model = self
            .core
            .read_model_from_file(path, "")
            .with_context(|| format!("reading model {path}"))?;
        let compiled = self
            .core
            .compile_model(&model, self.device.as_str().into())
            .with_context(|| format!("compiling model for {}", self.device))?;
        self.model = Some(compiled);

        for input in inputs.iter() {
            input.validate()?;
        }
        Ok(())
    }

    fn pre_process(&mut self, inputs: &[InputTensorInfo]) -> Result<()> {
        self.staged.clear();
        for info in inputs {
            self.staged.push(tensor::to_tensor_data(info)?);
        }
        Ok(())
    }

    fn process(&mut self, outputs: &mut [OutputTensorInfo]) -> Result<()> {
        let model = self.model.as_mut().context("backend not initialized")?;
        anyhow::ensure!(
            self.staged.len() == 1,
            "openvino backend supports a single staged input, got {}",
            self.staged.len()
        );

        let mut request = model.create_infer_request()?;

        let staged = &self.staged[0];
        let dims: Vec<i64> = staged.shape().iter().map(|&d| d as i64).collect();
        let shape = Shape::new(&dims)?;
        let mut input = Tensor::new(ElementType::F32, &shape)?;
        let data = staged.as_slice().context("staged tensor not contiguous")?;
        unsafe {
            let dst = input.get_raw_data_mut()?.as_mut_ptr() as *mut f32;
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        request.set_input_tensor(&input)?;

        request.infer()?;

        for (idx, out) in outputs.iter_mut().enumerate() {
            let t = request
                .get_output_tensor_by_index(idx)
                .with_context(|| format!("reading output tensor {} ({})", idx, out.name))?;
            let t_shape = t.get_shape()?;
            out.dims = t_shape.get_dimensions().to_vec();
            let len: i64 = out.dims.iter().product();
            out.data = unsafe {
                let ptr = t.get_raw_data()?.as_ptr() as *const f32;
                std::slice::from_raw_parts(ptr, len.max(0) as usize).to_vec()
            };
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.model = None;
        self.staged.clear();
        Ok(())
    }
}
