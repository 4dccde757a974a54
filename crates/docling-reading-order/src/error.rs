//! Error types for reading-order inference
//!
//! All public APIs use the [`Result<T>`] alias which wraps [`OrderError`].
//!
//! # Examples
//!
//! ```no_run
//! use docling_reading_order::{OrderError, Result};
//!
//! fn report(result: Result<()>) {
//!     match result {
//!         Ok(()) => log::debug!("Success"),
//!         Err(OrderError::OracleContract { sample_index, reason }) => {
//!             log::warn!("Sample {} could not be ordered: {}", sample_index, reason);
//!         }
//!         Err(e) => log::warn!("Other error: {}", e),
//!     }
//! }
//! ```

use thiserror::Error;

/// Errors that can occur while inferring reading order
///
/// # Error Categories
///
/// - **Input errors** ([`InputShape`]): malformed requests, rejected before any decoding
/// - **Model errors** ([`ModelLoad`], [`Inference`]): model setup or execution failures
/// - **Contract errors** ([`OracleContract`]): the model produced an unusable rank sequence
///   for one sample
/// - **Processing errors** ([`Preprocessing`], [`Assembly`], [`BatchFailed`])
/// - **Configuration errors** ([`Config`])
///
/// [`InputShape`]: OrderError::InputShape
/// [`ModelLoad`]: OrderError::ModelLoad
/// [`Inference`]: OrderError::Inference
/// [`OracleContract`]: OrderError::OracleContract
/// [`Preprocessing`]: OrderError::Preprocessing
/// [`Assembly`]: OrderError::Assembly
/// [`BatchFailed`]: OrderError::BatchFailed
/// [`Config`]: OrderError::Config
#[derive(Error, Debug)]
pub enum OrderError {
    /// Image, box and label counts do not line up
    ///
    /// Raised before decoding starts. Common causes:
    /// - different number of images and box lists
    /// - a label list whose length differs from its box list
    /// - more boxes on one page than the configured decoding step cap
    #[error("Invalid input shape: {reason}")]
    InputShape {
        /// What did not match
        reason: String,
    },

    /// The model did not emit exactly one distinct, in-range rank per box
    ///
    /// Only the affected sample fails; the rest of its batch is still returned
    /// by [`ReadingOrderPredictor::predict_each`](crate::ReadingOrderPredictor::predict_each).
    #[error("Oracle contract violated for sample {sample_index}: {reason}")]
    OracleContract {
        /// Index of the sample in the caller's input
        sample_index: usize,
        /// Description of the violation
        reason: String,
    },

    /// Model loading failed
    #[error("Failed to load {model_name} model: {source}")]
    ModelLoad {
        /// Name of the model that failed to load
        model_name: String,
        /// The underlying error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Model execution failed
    #[error("Inference failed for {model_name}: {source}")]
    Inference {
        /// Name of the model that failed
        model_name: String,
        /// The underlying error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Image or box preprocessing failed
    #[error("Preprocessing failed: {reason}")]
    Preprocessing {
        /// Description of what went wrong
        reason: String,
    },

    /// Packaging ranked boxes into results failed
    #[error("Result assembly failed: {reason}")]
    Assembly {
        /// Description of what went wrong
        reason: String,
    },

    /// A whole batch failed before per-sample results existed
    ///
    /// Reported once per sample of the failed batch so that callers of
    /// `predict_each` still get one entry per input.
    #[error("Batch {batch_index} failed: {reason}")]
    BatchFailed {
        /// Index of the failed batch
        batch_index: usize,
        /// Rendered cause of the batch failure
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {reason}")]
    Config {
        /// Description of what is invalid
        reason: String,
    },
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for OrderError {
    #[inline]
    fn from(err: ort::Error) -> Self {
        Self::Inference {
            model_name: "ONNX".to_string(),
            source: Box::new(err),
        }
    }
}

impl From<anyhow::Error> for OrderError {
    #[inline]
    fn from(err: anyhow::Error) -> Self {
        Self::Preprocessing {
            reason: err.to_string(),
        }
    }
}

impl From<ndarray::ShapeError> for OrderError {
    #[inline]
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Preprocessing {
            reason: format!("tensor shape error: {err}"),
        }
    }
}

impl OrderError {
    /// Returns true if this error is a configuration error (user-fixable)
    ///
    /// # Examples
    ///
    /// ```
    /// use docling_reading_order::OrderError;
    ///
    /// let err = OrderError::Config {
    ///     reason: "batch size must be positive".to_string(),
    /// };
    /// assert!(err.is_config_error());
    /// ```
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if the request was rejected before decoding
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_input_shape_error(&self) -> bool {
        matches!(self, Self::InputShape { .. })
    }

    /// Returns true if the model produced an unusable rank sequence
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_oracle_contract_error(&self) -> bool {
        matches!(self, Self::OracleContract { .. })
    }

    /// Returns true if this error occurred while running a model
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_inference_error(&self) -> bool {
        matches!(self, Self::Inference { .. })
    }

    /// Wrap any error raised by an oracle implementation
    pub fn inference(
        model_name: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Inference {
            model_name: model_name.into(),
            source: source.into(),
        }
    }
}

/// Type alias for Result with [`OrderError`]
pub type Result<T> = std::result::Result<T, OrderError>;
