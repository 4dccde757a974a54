//! Shared test fixtures: a scripted oracle and page builders.
//!
//! Pages are built on a 64x64 image with a 64x64 box grid, so box coordinates survive
//! quantization unchanged. The scripted oracle reads each box's left edge as the rank
//! the "model" wants to emit for that box.
#![allow(dead_code)]

use docling_reading_order::{
    BoundingBox, InferenceOracle, OracleInput, OracleOutput, OrderConfig, OrderConfigBuilder,
    OrderError, Result,
};
use ndarray::{Array2, Array3};

pub const GRID: usize = 64;
pub const MAX_BOXES: usize = 16;

pub fn test_config(batch_size: usize) -> OrderConfig {
    OrderConfigBuilder::new()
        .image_size(8, 8)
        .box_size(GRID, GRID)
        .max_boxes(MAX_BOXES)
        .batch_size(batch_size)
        .build()
        .expect("test config is valid")
}

pub fn blank_image() -> Array3<u8> {
    Array3::zeros((GRID, GRID, 3))
}

/// Boxes whose left edge encodes the rank the scripted oracle will emit for them
pub fn ranked_boxes(ranks: &[usize]) -> Vec<BoundingBox> {
    ranks
        .iter()
        .enumerate()
        .map(|(i, &rank)| {
            let (l, t) = (rank as f32, (i * 2) as f32);
            BoundingBox::new(l, t, l + 1.0, t + 1.0)
        })
        .collect()
}

pub fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

/// How the scripted model behaves once it has a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Emit the planned ranks, then the terminator
    Follow,
    /// Emit the terminator at this step, even if ranks are missing
    StopAfter(usize),
    /// Never score the terminator
    NeverStop,
}

/// Per-batch plan carried through the oracle cache
#[derive(Debug, Clone)]
pub struct ScriptCache {
    plans: Vec<Vec<i64>>,
    step: usize,
}

/// Test double driven by the box coordinates it is given
///
/// Every unused rank keeps a small fallback score (lower ranks first), so when the
/// planned token is masked the loop falls back to the lowest unused rank.
#[derive(Debug)]
pub struct ScriptedOracle {
    script: Script,
    rank_offset: i64,
    pad: i64,
    fail_on_call: Option<usize>,
    /// Total `step` calls
    pub calls: usize,
    /// Calls that started a batch (no cache)
    pub batches: usize,
}

impl ScriptedOracle {
    pub fn new(config: &OrderConfig, script: Script) -> Self {
        Self {
            script,
            rank_offset: config.rank_token_offset(),
            pad: config.token_pad_id,
            fail_on_call: None,
            calls: 0,
            batches: 0,
        }
    }

    /// Fail the n-th call (1-based) with an inference error
    pub fn failing_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    fn plan(&self, input: &OracleInput<'_>) -> Vec<Vec<i64>> {
        (0..input.batch_size())
            .map(|i| {
                let pad_len = input.input_boxes_counts[[i, 0]] as usize;
                let width = input.input_boxes_counts[[i, 1]] as usize;
                (pad_len..width - 1)
                    .map(|slot| self.rank_offset + input.input_boxes[[i, slot, 0]])
                    .collect()
            })
            .collect()
    }
}

impl InferenceOracle for ScriptedOracle {
    type Cache = ScriptCache;

    fn step(
        &mut self,
        input: &OracleInput<'_>,
        cache: Option<ScriptCache>,
    ) -> Result<OracleOutput<ScriptCache>> {
        self.calls += 1;
        if self.fail_on_call == Some(self.calls) {
            return Err(OrderError::inference("ScriptedOracle", "injected failure"));
        }

        let cache = match cache {
            None => {
                assert_eq!(input.step, 0, "a batch must start without a cache");
                self.batches += 1;
                ScriptCache {
                    plans: self.plan(input),
                    step: 0,
                }
            }
            Some(prev) => {
                assert_eq!(prev.step + 1, input.step, "cache must come from the previous step");
                assert_eq!(input.input_boxes.dim().1, 1);
                ScriptCache {
                    step: input.step,
                    ..prev
                }
            }
        };

        let classes = (self.pad + 1) as usize;
        let mut logits = Array2::<f32>::zeros((input.batch_size(), classes));
        for (i, plan) in cache.plans.iter().enumerate() {
            for r in 0..plan.len() {
                logits[[i, (self.rank_offset + r as i64) as usize]] = 1.0 - r as f32 * 0.01;
            }

            let step = cache.step;
            let stop = match self.script {
                Script::Follow => step >= plan.len(),
                Script::StopAfter(k) => step >= k.min(plan.len()),
                Script::NeverStop => false,
            };
            if stop {
                logits[[i, self.pad as usize]] = 10.0;
            } else if let Some(&token) = plan.get(step) {
                logits[[i, token as usize]] = 10.0;
            }
            if self.script == Script::NeverStop {
                logits[[i, self.pad as usize]] = -10.0;
            }
        }

        Ok(OracleOutput { logits, cache })
    }
}
