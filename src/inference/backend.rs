//! The external inference collaborator contract
//!
//! Engines talk to the runtime through this narrow synchronous trait; which
//! concrete runtime is available is a compile-time choice via cargo features.

use std::path::Path;
use std::str::FromStr;

use anyhow::Result;

use super::tensor::{InputTensorInfo, OutputTensorInfo};

/// Synchronous contract exposed by an external inference runtime.
///
/// Every method returns plain ok/error; a failure aborts the caller's current
/// invocation and is surfaced unchanged.
pub trait InferenceBackend {
    /// Hint for the runtime's intra-op thread count. Must be called before
    /// [`initialize`](Self::initialize).
    fn set_num_threads(&mut self, n: i32) -> Result<()>;

    /// Load and prepare the model. Backends may refine `inputs`/`outputs`
    /// dims from the loaded graph.
    fn initialize(
        &mut self,
        model_path: &Path,
        inputs: &mut [InputTensorInfo],
        outputs: &mut [OutputTensorInfo],
    ) -> Result<()>;

    /// Convert the staged frames into the runtime's input buffers
    fn pre_process(&mut self, inputs: &[InputTensorInfo]) -> Result<()>;

    /// Execute the graph and copy results into `outputs`
    fn process(&mut self, outputs: &mut [OutputTensorInfo]) -> Result<()>;

    /// Release the model and any runtime resources
    fn finalize(&mut self) -> Result<()>;
}

/// Available runtime kinds. Which ones are actually compiled in depends on
/// cargo features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    OpenVino,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::OpenVino => "openvino",
        }
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "openvino" => Ok(BackendKind::OpenVino),
            other => anyhow::bail!("unknown inference backend: {other}"),
        }
    }
}

/// Instantiate a backend for `kind`, with `device` passed through to the
/// runtime (e.g. `CPU`, `GPU`).
pub fn create_backend(kind: BackendKind, device: &str) -> Result<Box<dyn InferenceBackend>> {
    match kind {
        #[cfg(feature = "openvino")]
        BackendKind::OpenVino => Ok(Box::new(super::openvino::OpenVinoBackend::new(device)?)),
        #[cfg(not(feature = "openvino"))]
        BackendKind::OpenVino => {
            let _ = device;
            anyhow::bail!("openvino backend not compiled in; rebuild with --features openvino")
        }
    }
}
