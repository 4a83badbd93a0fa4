//! Inference backend contract and tensor descriptors
//!
//! The actual model execution lives in an external runtime behind the
//! [`backend::InferenceBackend`] trait; this module only carries the
//! descriptor bookkeeping and the image-to-tensor conversion backends use.

pub mod backend;
#[cfg(feature = "openvino")]
pub mod openvino;
pub mod tensor;

pub use backend::{create_backend, BackendKind, InferenceBackend};
pub use tensor::{InputTensorInfo, Normalize, OutputTensorInfo, TensorType};
