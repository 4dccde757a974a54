//! Reading order executor
//!
//! Runs the full per-page flow over a list of samples:
//!
//! ```text
//! samples ─▶ validate ─▶ batches ─▶ preprocess ─▶ decode ─▶ rank ─▶ reorder ─▶ assemble
//! ```
//!
//! Batches run strictly one after another and share nothing; a sample's result does
//! not depend on which batch it landed in.

use crate::batch::{BatchProgress, BatchScheduler};
use crate::config::OrderConfig;
use crate::data_structures::{BoundingBox, OrderResult, PageSample};
use crate::error::{OrderError, Result};
use crate::models::InferenceOracle;
use crate::pipeline::assembly::assemble_result;
use crate::pipeline::decoding::{decode_batch, DecodeParams};
use crate::pipeline::reorder::apply_structural_order;
use crate::preprocessing::{OrderPreprocessor, Preprocessor};
use crate::rank::rank_elements;
use ndarray::Array3;
use std::time::Instant;

/// Reading order predictor over an inference oracle
///
/// # Example
///
/// ```no_run
/// use docling_reading_order::models::onnx::OnnxOrderOracle;
/// use docling_reading_order::{BoundingBox, OrderConfigBuilder, PageSample, ReadingOrderPredictor};
/// use ndarray::Array3;
///
/// let config = OrderConfigBuilder::from_env().build()?;
/// let oracle = OnnxOrderOracle::load("encoder.onnx", "decoder.onnx", config.device)?;
/// let mut predictor = ReadingOrderPredictor::new(oracle, config)?;
///
/// let image = Array3::<u8>::zeros((792, 612, 3));
/// let boxes = [BoundingBox::new(72.0, 72.0, 540.0, 120.0)];
/// let results = predictor.predict(&[PageSample::new(&image, &boxes)])?;
/// assert_eq!(results[0].bboxes[0].position, 0);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct ReadingOrderPredictor<O, P = OrderPreprocessor> {
    oracle: O,
    preprocessor: P,
    config: OrderConfig,
    scheduler: BatchScheduler,
    params: DecodeParams,
}

impl<O: InferenceOracle> ReadingOrderPredictor<O> {
    /// Predictor with the default preprocessor built from `config`
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Config` if the effective batch size is 0.
    pub fn new(oracle: O, config: OrderConfig) -> Result<Self> {
        let preprocessor = OrderPreprocessor::from_config(&config);
        Self::with_preprocessor(oracle, preprocessor, config)
    }
}

impl<O: InferenceOracle, P: Preprocessor> ReadingOrderPredictor<O, P> {
    /// # Errors
    ///
    /// Returns `OrderError::Config` if the effective batch size is 0.
    pub fn with_preprocessor(oracle: O, preprocessor: P, config: OrderConfig) -> Result<Self> {
        let scheduler = BatchScheduler::new(config.batch_size())?;
        let params = DecodeParams::from_config(&config);
        log::debug!(
            "ReadingOrderPredictor: device {}, batch size {}, max boxes {}",
            config.device,
            scheduler.batch_size(),
            config.max_boxes
        );
        Ok(Self {
            oracle,
            preprocessor,
            config,
            scheduler,
            params,
        })
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &OrderConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub const fn oracle(&self) -> &O {
        &self.oracle
    }

    #[must_use]
    pub fn into_oracle(self) -> O {
        self.oracle
    }

    /// Check one sample against the shape rules
    ///
    /// # Errors
    ///
    /// Returns `OrderError::InputShape` if labels do not match the boxes or the page has
    /// more boxes than `max_boxes`.
    pub fn validate_sample(&self, sample: &PageSample<'_>) -> Result<()> {
        if let Some(labels) = sample.labels {
            if labels.len() != sample.box_count() {
                return Err(OrderError::InputShape {
                    reason: format!(
                        "{} labels for {} boxes",
                        labels.len(),
                        sample.box_count()
                    ),
                });
            }
        }
        if sample.box_count() > self.config.max_boxes {
            return Err(OrderError::InputShape {
                reason: format!(
                    "{} boxes exceed max_boxes = {}",
                    sample.box_count(),
                    self.config.max_boxes
                ),
            });
        }
        Ok(())
    }

    /// Check every sample before any inference runs
    ///
    /// # Errors
    ///
    /// Returns the first `OrderError::InputShape` found.
    pub fn validate_samples(&self, samples: &[PageSample<'_>]) -> Result<()> {
        samples.iter().try_for_each(|s| self.validate_sample(s))
    }

    /// Predict every page, failing on the first error
    ///
    /// Results of batches that already succeeded are discarded on failure.
    /// [`predict_each`](Self::predict_each) keeps them and reports errors per sample.
    ///
    /// # Errors
    ///
    /// Input shape errors are reported before any inference. Otherwise the first
    /// preprocessing, inference or oracle contract error is returned.
    #[must_use = "reading order prediction returns results that should be processed"]
    pub fn predict(&mut self, samples: &[PageSample<'_>]) -> Result<Vec<OrderResult>> {
        self.validate_samples(samples)?;
        let indices: Vec<usize> = (0..samples.len()).collect();

        let scheduler = self.scheduler;
        let mut results = Vec::with_capacity(samples.len());
        for batch in scheduler.batches(&indices) {
            for result in self.run_batch(samples, batch.samples)? {
                results.push(result?);
            }
        }
        Ok(results)
    }

    /// Predict every page, isolating failures to the samples (or batch) they hit
    #[must_use = "reading order prediction returns results that should be processed"]
    pub fn predict_each(&mut self, samples: &[PageSample<'_>]) -> Vec<Result<OrderResult>> {
        self.predict_each_with_progress(samples, |_| {})
    }

    /// Like [`predict_each`](Self::predict_each), reporting progress after every batch
    pub fn predict_each_with_progress<F>(
        &mut self,
        samples: &[PageSample<'_>],
        mut on_progress: F,
    ) -> Vec<Result<OrderResult>>
    where
        F: FnMut(BatchProgress),
    {
        let mut results: Vec<Option<Result<OrderResult>>> = Vec::with_capacity(samples.len());
        let mut valid = Vec::with_capacity(samples.len());
        for (i, sample) in samples.iter().enumerate() {
            match self.validate_sample(sample) {
                Ok(()) => {
                    valid.push(i);
                    results.push(None);
                }
                Err(e) => results.push(Some(Err(e))),
            }
        }

        let scheduler = self.scheduler;
        let num_batches = scheduler.num_batches(valid.len());
        let mut samples_done = 0;
        for batch in scheduler.batches(&valid) {
            match self.run_batch(samples, batch.samples) {
                Ok(batch_results) => {
                    for (&i, result) in batch.samples.iter().zip(batch_results) {
                        results[i] = Some(result);
                    }
                }
                Err(e) => {
                    log::warn!("Batch {} (samples {:?}) failed: {e}", batch.index, batch.samples);
                    for &i in batch.samples {
                        results[i] = Some(Err(OrderError::BatchFailed {
                            batch_index: batch.index,
                            reason: e.to_string(),
                        }));
                    }
                }
            }

            samples_done += batch.len();
            on_progress(BatchProgress {
                batch_index: batch.index,
                num_batches,
                samples_done,
                samples_total: valid.len(),
            });
        }

        results
            .into_iter()
            .map(|r| {
                r.unwrap_or_else(|| {
                    Err(OrderError::Assembly {
                        reason: "sample was never scheduled".to_string(),
                    })
                })
            })
            .collect()
    }

    /// Run one batch; the outer error is batch-level, the inner ones per sample
    fn run_batch(
        &mut self,
        samples: &[PageSample<'_>],
        indices: &[usize],
    ) -> Result<Vec<Result<OrderResult>>> {
        let start = Instant::now();
        let batch_samples: Vec<PageSample<'_>> = indices.iter().map(|&i| samples[i]).collect();

        let tensors = self.preprocessor.preprocess(&batch_samples)?;
        let preprocess_time = start.elapsed();

        let outcome = decode_batch(&mut self.oracle, &tensors, &self.params)?;
        drop(tensors);

        let steps = outcome.steps;
        let results = outcome
            .finish(indices)
            .into_iter()
            .zip(&batch_samples)
            .map(|(predicted, sample)| {
                let predicted = predicted?;
                let raw_ranks = rank_elements(&predicted);
                let final_ranks = apply_structural_order(&raw_ranks, sample.labels)?;
                assemble_result(sample.bboxes, &final_ranks, sample.image_size())
            })
            .collect();

        log::debug!(
            "Ordered batch of {} pages in {:.2} ms (preprocess {:.2} ms, {steps} decoding steps)",
            indices.len(),
            start.elapsed().as_secs_f64() * 1000.0,
            preprocess_time.as_secs_f64() * 1000.0
        );
        Ok(results)
    }
}

/// Predict the reading order of every page
///
/// `images[i]`, `bboxes[i]` and `labels[i]` (when given) describe page `i`. Results
/// come back in input order.
///
/// Stops at the first failing page. Use [`ReadingOrderPredictor::predict_each`] to keep
/// the results of the other batches.
///
/// # Errors
///
/// Returns `OrderError::InputShape` if the lists disagree in length, and otherwise the
/// first error raised by [`ReadingOrderPredictor::predict`].
pub fn infer_reading_order<O: InferenceOracle>(
    images: &[Array3<u8>],
    bboxes: &[Vec<BoundingBox>],
    labels: Option<&[Vec<String>]>,
    oracle: O,
    config: &OrderConfig,
) -> Result<Vec<OrderResult>> {
    if images.len() != bboxes.len() {
        return Err(OrderError::InputShape {
            reason: format!("{} images but {} box lists", images.len(), bboxes.len()),
        });
    }
    if let Some(labels) = labels {
        if labels.len() != images.len() {
            return Err(OrderError::InputShape {
                reason: format!("{} images but {} label lists", images.len(), labels.len()),
            });
        }
    }

    let samples: Vec<PageSample<'_>> = images
        .iter()
        .zip(bboxes)
        .enumerate()
        .map(|(i, (image, boxes))| {
            let sample = PageSample::new(image, boxes);
            match labels {
                Some(labels) => sample.with_labels(&labels[i]),
                None => sample,
            }
        })
        .collect();

    let mut predictor = ReadingOrderPredictor::new(oracle, config.clone())?;
    predictor.predict(&samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrderConfigBuilder;
    use crate::models::{OracleInput, OracleOutput};
    use ndarray::Array2;

    /// Emits ranks in reverse box order, then terminates
    struct ReverseOracle {
        calls: usize,
    }

    impl InferenceOracle for ReverseOracle {
        type Cache = ();

        fn step(&mut self, input: &OracleInput<'_>, _cache: Option<()>) -> Result<OracleOutput<()>> {
            self.calls += 1;
            let offset = 16_i64;
            let pad = offset + 8 + 2;
            let batch = input.batch_size();
            let mut logits = Array2::<f32>::zeros((batch, (pad + 1) as usize));
            for i in 0..batch {
                let (pad_len, width) = (input.input_boxes_counts[[i, 0]], input.input_boxes_counts[[i, 1]]);
                let n = width - pad_len - 1;
                // Score rank r as r: arg-max picks the highest unmasked rank
                for r in 0..n {
                    logits[[i, (offset + r) as usize]] = 1.0 + r as f32;
                }
                logits[[i, pad as usize]] = 0.5;
            }
            Ok(OracleOutput { logits, cache: () })
        }
    }

    fn config() -> OrderConfig {
        OrderConfigBuilder::new()
            .image_size(4, 4)
            .box_size(16, 16)
            .max_boxes(8)
            .rank_tokens(8)
            .batch_size(2)
            .build()
            .unwrap()
    }

    #[test]
    fn test_predict_reverse_order() {
        let image = Array3::<u8>::zeros((10, 20, 3));
        let boxes = vec![BoundingBox::new(0.0, 0.0, 1.0, 1.0); 3];
        let mut predictor = ReadingOrderPredictor::new(ReverseOracle { calls: 0 }, config()).unwrap();

        let results = predictor.predict(&[PageSample::new(&image, &boxes)]).unwrap();
        assert_eq!(results[0].positions(), vec![2, 1, 0]);
        assert_eq!(results[0].image_bbox, [0.0, 0.0, 20.0, 10.0]);
        assert_eq!(predictor.oracle().calls, 4);
    }

    #[test]
    fn test_lower_box_limit_keeps_terminator_id() {
        let config = OrderConfigBuilder::new()
            .image_size(4, 4)
            .box_size(16, 16)
            .max_boxes(3)
            .rank_tokens(8)
            .build()
            .unwrap();
        assert_eq!(config.token_pad_id, self::config().token_pad_id);

        let image = Array3::<u8>::zeros((4, 4, 3));
        let boxes = vec![BoundingBox::default(); 3];
        let mut predictor = ReadingOrderPredictor::new(ReverseOracle { calls: 0 }, config).unwrap();
        let results = predictor.predict(&[PageSample::new(&image, &boxes)]).unwrap();
        assert_eq!(results[0].positions(), vec![2, 1, 0]);
    }

    #[test]
    fn test_too_many_boxes_rejected_before_inference() {
        let image = Array3::<u8>::zeros((4, 4, 3));
        let boxes = vec![BoundingBox::default(); 9];
        let mut predictor = ReadingOrderPredictor::new(ReverseOracle { calls: 0 }, config()).unwrap();

        let err = predictor.predict(&[PageSample::new(&image, &boxes)]).unwrap_err();
        assert!(err.is_input_shape_error());
        assert_eq!(predictor.oracle().calls, 0);
    }

    #[test]
    fn test_predict_each_isolates_invalid_samples() {
        let image = Array3::<u8>::zeros((4, 4, 3));
        let good = vec![BoundingBox::default(); 2];
        let bad = vec![BoundingBox::default(); 9];
        let samples = [
            PageSample::new(&image, &good),
            PageSample::new(&image, &bad),
            PageSample::new(&image, &good),
        ];
        let mut predictor = ReadingOrderPredictor::new(ReverseOracle { calls: 0 }, config()).unwrap();

        let mut events = Vec::new();
        let results = predictor.predict_each_with_progress(&samples, |p| events.push(p));
        assert!(results[0].is_ok());
        assert!(results[1].as_ref().unwrap_err().is_input_shape_error());
        assert_eq!(results[2].as_ref().unwrap().positions(), vec![1, 0]);

        // Two valid samples, batch size 2
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].samples_done, 2);
        assert_eq!(events[0].samples_total, 2);
    }

    #[test]
    fn test_infer_reading_order_length_mismatch() {
        let images = vec![Array3::<u8>::zeros((4, 4, 3))];
        let err = infer_reading_order(&images, &[], None, ReverseOracle { calls: 0 }, &config())
            .unwrap_err();
        assert!(err.is_input_shape_error());
    }
}
