//! # Docling Reading Order
//!
//! Learned reading-order inference for document pages. Given a page image and the
//! layout boxes detected on it, an encoder/decoder model emits one rank per box,
//! autoregressively. Page headers are then pulled to the front and page footers to
//! the back, and every box comes back with a dense 0-based reading position.
//!
//! ## Quick Start
//!
//! ```no_run
//! use docling_reading_order::models::onnx::OnnxOrderOracle;
//! use docling_reading_order::{infer_reading_order, BoundingBox, OrderConfigBuilder, Result};
//! use ndarray::Array3;
//!
//! # fn main() -> Result<()> {
//! let config = OrderConfigBuilder::from_env().build()?;
//! let oracle = OnnxOrderOracle::load("encoder.onnx", "decoder.onnx", config.device)?;
//!
//! # let page_image = Array3::<u8>::zeros((792, 612, 3));
//! let boxes = vec![vec![
//!     BoundingBox::new(72.0, 40.0, 540.0, 60.0),
//!     BoundingBox::new(72.0, 100.0, 540.0, 400.0),
//! ]];
//! let labels = vec![vec!["Page-header".to_string(), "Text".to_string()]];
//!
//! let results = infer_reading_order(&[page_image], &boxes, Some(labels.as_slice()), oracle, &config)?;
//! for item in results[0].in_reading_order() {
//!     println!("{}: {:?}", item.position, item.bbox);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! [`OrderConfigBuilder::from_env`] reads:
//! - `ORDER_BATCH_SIZE`: pages per batch (default depends on the device: CPU 4, MPS 4, CUDA 32)
//! - `ORDER_MAX_BOXES`: decoding step cap and box limit per page (default 256)
//! - `ORDER_DEVICE`: `cpu`, `mps`, `cuda` or `cuda:N`
//!
//! ## Custom models
//!
//! Anything implementing [`InferenceOracle`] can drive the decoder; the ONNX binding
//! in [`models::onnx`] is behind the default `onnx` feature.

pub mod batch;
pub mod config;
pub mod data_structures;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod preprocessing;
pub mod rank;

pub use batch::{default_batch_size, Batch, BatchProgress, BatchScheduler};
pub use config::{Device, GridSize, OrderConfig, OrderConfigBuilder};
pub use data_structures::{
    BoundingBox, OrderBox, OrderResult, PageSample, ReadingGroup, PAGE_FOOTER_LABEL,
    PAGE_HEADER_LABEL,
};
pub use error::{OrderError, Result};
pub use models::{InferenceOracle, OracleInput, OracleOutput};
pub use pipeline::{infer_reading_order, ReadingOrderPredictor};
pub use preprocessing::{OrderPreprocessor, PreprocessedBatch, Preprocessor};
pub use rank::rank_elements;
