//! Vision inference engine wrappers
//!
//! A family of synchronous engines (hand landmark, monocular depth,
//! age/gender, semantic segmentation) that configure tensor descriptors,
//! forward frames to an externally-supplied inference backend, and decode
//! the raw output buffers into plain result records.

pub mod config;
pub mod engine;
pub mod inference;
pub mod utils;

pub use config::Config;
pub use inference::backend::{create_backend, BackendKind, InferenceBackend};
