//! Inference oracle interface
//!
//! The ordering model is consumed as a stateful step function. Each call receives the
//! box tokens produced since the previous call plus whatever cache the previous call
//! returned, and yields one logits row per sample. The cache is opaque to the decoding
//! loop; implementations use it to avoid re-encoding the page image.

use crate::error::Result;
use crate::preprocessing::PreprocessedBatch;
use ndarray::{Array2, Array4, ArrayView2, ArrayView3};

/// Inputs of one oracle step
#[derive(Debug, Clone, Copy)]
pub struct OracleInput<'a> {
    /// `[B, 3, H, W]` normalized pixels, identical on every step of a batch
    pub pixel_values: &'a Array4<f32>,
    /// `[B, S, 4]` box tokens: the whole padded sequence at step 0, then `S = 1`
    pub input_boxes: ArrayView3<'a, i64>,
    /// `[B, S]` validity mask matching `input_boxes`
    pub input_boxes_mask: ArrayView2<'a, i64>,
    /// `[B, 2]` rows of `(pad_len, width)` from preprocessing
    pub input_boxes_counts: ArrayView2<'a, i64>,
    /// 0-based decoding step
    pub step: usize,
}

impl<'a> OracleInput<'a> {
    /// Step-0 input built straight from a preprocessed batch
    #[must_use]
    pub fn initial(batch: &'a PreprocessedBatch) -> Self {
        Self {
            pixel_values: &batch.pixel_values,
            input_boxes: batch.input_boxes.view(),
            input_boxes_mask: batch.input_boxes_mask.view(),
            input_boxes_counts: batch.input_boxes_counts.view(),
            step: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.input_boxes.dim().0
    }
}

/// Output of one oracle step
#[derive(Debug, Clone)]
pub struct OracleOutput<C> {
    /// `[B, num_classes]` next-token logits
    pub logits: Array2<f32>,
    /// State to hand back on the next call (encoder output, decoder history)
    pub cache: C,
}

/// Per-step prediction function of the ordering model
pub trait InferenceOracle {
    /// Incremental decoding state; never inspected by callers
    type Cache;

    /// Run one decoding step
    ///
    /// `cache` is `None` on the first step of every batch and the previous call's
    /// cache afterwards.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Inference` when the model cannot be executed.
    fn step(
        &mut self,
        input: &OracleInput<'_>,
        cache: Option<Self::Cache>,
    ) -> Result<OracleOutput<Self::Cache>>;
}

impl<O: InferenceOracle + ?Sized> InferenceOracle for &mut O {
    type Cache = O::Cache;

    #[inline]
    fn step(
        &mut self,
        input: &OracleInput<'_>,
        cache: Option<Self::Cache>,
    ) -> Result<OracleOutput<Self::Cache>> {
        (**self).step(input, cache)
    }
}
