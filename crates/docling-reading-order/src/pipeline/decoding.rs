// Token ids are i64 (model I/O), ranks and counts are usize (indexing)
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

//! Autoregressive rank decoding
//!
//! Every sample of a batch moves through the same steps in lockstep. A sample is
//! `Active` until it emits the terminator token (`token_pad_id`), after which it is fed
//! padding with a zero mask. Each step masks the tokens a sample already emitted before
//! taking the arg-max, so a rank can be chosen at most once. The loop stops when no
//! sample is active or after `max_steps` oracle calls.
//!
//! ```text
//!            token == pad                    step cap
//!  Active ─────────────────▶ Done     Active ─────────▶ (finalized as is)
//!    │
//!    │ token outside [offset, offset + N) or repeated
//!    ▼
//!  Violated
//! ```

use crate::config::OrderConfig;
use crate::error::{OrderError, Result};
use crate::models::{InferenceOracle, OracleInput};
use crate::preprocessing::PreprocessedBatch;
use ndarray::{s, Array2, Array3, ArrayView1};

/// Score assigned to tokens a sample already emitted
pub const MASKED_LOGIT: f32 = -1e9;

/// Token-space parameters of the decoding loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeParams {
    /// Maximum number of oracle calls per batch
    pub max_steps: usize,
    /// Terminator token
    pub token_pad_id: i64,
    /// Token id of rank 0
    pub rank_token_offset: i64,
}

impl DecodeParams {
    #[must_use]
    pub const fn from_config(config: &OrderConfig) -> Self {
        Self {
            max_steps: config.max_boxes,
            token_pad_id: config.token_pad_id,
            rank_token_offset: config.rank_token_offset(),
        }
    }

    /// Token id that encodes `rank`
    #[inline]
    #[must_use]
    pub const fn rank_token(&self, rank: usize) -> i64 {
        self.rank_token_offset + rank as i64
    }
}

/// Lifecycle of one sample inside the loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStatus {
    /// Still emitting ranks
    Active,
    /// Emitted the terminator
    Done,
    /// Emitted a token that cannot be a rank for this sample
    Violated(String),
}

/// Per-sample decoding state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeState {
    predicted_ranks: Vec<usize>,
    status: DecodeStatus,
    box_count: usize,
}

impl DecodeState {
    #[must_use]
    pub fn new(box_count: usize) -> Self {
        Self {
            predicted_ranks: Vec::with_capacity(box_count),
            status: DecodeStatus::Active,
            box_count,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == DecodeStatus::Active
    }

    /// Rank tokens emitted so far, one per box in input order
    #[inline]
    #[must_use]
    pub fn predicted_ranks(&self) -> &[usize] {
        &self.predicted_ranks
    }

    #[inline]
    #[must_use]
    pub const fn status(&self) -> &DecodeStatus {
        &self.status
    }

    /// Arg-max over `logits` with this sample's emitted tokens masked out
    ///
    /// Returns `None` when no logit is selectable (empty or all-NaN row).
    #[must_use]
    pub fn select(&self, logits: ArrayView1<'_, f32>, params: &DecodeParams) -> Option<i64> {
        let mut masked = logits.to_owned();
        for &rank in &self.predicted_ranks {
            let token = params.rank_token(rank);
            if let Some(score) = usize::try_from(token).ok().and_then(|t| masked.get_mut(t)) {
                *score = MASKED_LOGIT;
            }
        }
        argmax(masked.view()).map(|idx| idx as i64)
    }

    /// Apply the token selected for this step
    pub fn apply(&mut self, token: i64, params: &DecodeParams) {
        if token == params.token_pad_id {
            self.status = DecodeStatus::Done;
            return;
        }

        let slot = token - params.rank_token_offset;
        if slot < 0 || slot >= self.box_count as i64 {
            self.status = DecodeStatus::Violated(format!(
                "token {token} is not a rank for {} boxes",
                self.box_count
            ));
            return;
        }

        let rank = slot as usize;
        if self.predicted_ranks.contains(&rank) {
            self.status = DecodeStatus::Violated(format!("rank {rank} emitted twice"));
            return;
        }
        self.predicted_ranks.push(rank);
    }

    /// Validate the finished sequence
    ///
    /// # Errors
    ///
    /// Returns `OrderError::OracleContract` if the sample was violated or did not emit
    /// exactly one rank per box. The sequence is never truncated or padded.
    pub fn finish(self, sample_index: usize) -> Result<Vec<usize>> {
        let emitted = self.predicted_ranks.len();
        match self.status {
            DecodeStatus::Violated(reason) => Err(OrderError::OracleContract {
                sample_index,
                reason,
            }),
            status if emitted != self.box_count => {
                let how = if status == DecodeStatus::Done {
                    "terminated"
                } else {
                    "hit the step cap"
                };
                Err(OrderError::OracleContract {
                    sample_index,
                    reason: format!(
                        "expected {} ranks, got {emitted} before the model {how}",
                        self.box_count
                    ),
                })
            }
            _ => Ok(self.predicted_ranks),
        }
    }
}

/// First index of the maximum; NaN never wins
fn argmax(row: ArrayView1<'_, f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &value) in row.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if value <= top => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// States of a decoded batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOutcome {
    pub states: Vec<DecodeState>,
    /// Oracle calls made
    pub steps: usize,
}

impl DecodeOutcome {
    /// Validate every sample; `sample_indices[i]` is the input index of state `i`
    #[must_use]
    pub fn finish(self, sample_indices: &[usize]) -> Vec<Result<Vec<usize>>> {
        debug_assert_eq!(self.states.len(), sample_indices.len());
        self.states
            .into_iter()
            .zip(sample_indices)
            .map(|(state, &index)| state.finish(index))
            .collect()
    }
}

/// Drive the oracle until every sample terminates or the step cap is reached
///
/// # Errors
///
/// Returns `OrderError::Inference` if the oracle fails or returns a logits matrix
/// whose row count differs from the batch size. Per-sample problems are recorded in
/// the returned states instead.
pub fn decode_batch<O>(
    oracle: &mut O,
    batch: &PreprocessedBatch,
    params: &DecodeParams,
) -> Result<DecodeOutcome>
where
    O: InferenceOracle + ?Sized,
{
    let batch_size = batch.len();
    let mut states: Vec<DecodeState> = batch.box_counts.iter().map(|&n| DecodeState::new(n)).collect();

    let mut cache: Option<O::Cache> = None;
    let mut next_inputs: Option<(Array3<i64>, Array2<i64>)> = None;
    let mut steps = 0;

    while steps < params.max_steps {
        let input = match &next_inputs {
            None => OracleInput::initial(batch),
            Some((boxes, mask)) => OracleInput {
                pixel_values: &batch.pixel_values,
                input_boxes: boxes.view(),
                input_boxes_mask: mask.view(),
                input_boxes_counts: batch.input_boxes_counts.view(),
                step: steps,
            },
        };

        let output = oracle.step(&input, cache.take())?;
        steps += 1;

        let (rows, _) = output.logits.dim();
        if rows != batch_size {
            return Err(OrderError::inference(
                "OrderOracle",
                format!("expected logits for {batch_size} samples, got {rows}"),
            ));
        }

        // Samples that are already finished are fed padding with a zero mask
        let mut boxes = Array3::<i64>::from_elem((batch_size, 1, 4), params.token_pad_id);
        let mut mask = Array2::<i64>::zeros((batch_size, 1));

        for (i, state) in states.iter_mut().enumerate() {
            if !state.is_active() {
                continue;
            }
            let Some(token) = state.select(output.logits.row(i), params) else {
                state.status = DecodeStatus::Violated("no selectable logit".to_string());
                continue;
            };
            state.apply(token, params);
            boxes.slice_mut(s![i, 0, ..]).fill(token);
            if state.is_active() {
                mask[[i, 0]] = 1;
            }
        }

        let active = states.iter().filter(|s| s.is_active()).count();
        log::trace!("Decoding step {steps}: {active}/{batch_size} samples active");
        if active == 0 {
            break;
        }

        cache = Some(output.cache);
        next_inputs = Some((boxes, mask));
    }

    let still_active = states.iter().filter(|s| s.is_active()).count();
    if still_active > 0 {
        log::warn!(
            "Reached the decoding cap of {} steps with {still_active} samples still active",
            params.max_steps
        );
    }

    Ok(DecodeOutcome { states, steps })
}
