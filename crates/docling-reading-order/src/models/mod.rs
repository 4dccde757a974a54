//! # Ordering model bindings
//!
//! The decoding loop only sees the [`InferenceOracle`] trait. Concrete bindings live
//! next to it.
//!
//! | Binding | Module | Feature | Notes |
//! |---------|--------|---------|-------|
//! | ONNX Runtime | `onnx` | `onnx` (default) | exported encoder + decoder, CPU/CUDA/CoreML |
//!
//! Test doubles implement the trait directly; see `tests/common`.

pub mod oracle;

#[cfg(feature = "onnx")]
pub mod onnx;

pub use oracle::{InferenceOracle, OracleInput, OracleOutput};
