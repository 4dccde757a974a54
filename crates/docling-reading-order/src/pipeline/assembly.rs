// Image dimensions fit comfortably in f32
#![allow(clippy::cast_precision_loss)]

//! Result assembly
//!
//! Pairs every input box with its final position. Boxes stay in the caller's order;
//! use [`OrderResult::in_reading_order`] to walk them by position.

use crate::data_structures::{BoundingBox, OrderBox, OrderResult};
use crate::error::{OrderError, Result};
use crate::rank::is_dense_permutation;

/// Build the per-page result from final ranks
///
/// `image_size` is `(width, height)` of the original image.
///
/// # Errors
///
/// Returns `OrderError::Assembly` if `ranks` is not a permutation of `0..bboxes.len()`.
pub fn assemble_result(
    bboxes: &[BoundingBox],
    ranks: &[usize],
    image_size: (usize, usize),
) -> Result<OrderResult> {
    if ranks.len() != bboxes.len() {
        return Err(OrderError::Assembly {
            reason: format!("{} ranks for {} boxes", ranks.len(), bboxes.len()),
        });
    }
    if !is_dense_permutation(ranks) {
        return Err(OrderError::Assembly {
            reason: format!("ranks {ranks:?} are not a permutation of 0..{}", ranks.len()),
        });
    }

    let (width, height) = image_size;
    Ok(OrderResult {
        bboxes: bboxes
            .iter()
            .zip(ranks)
            .map(|(&bbox, &position)| OrderBox { bbox, position })
            .collect(),
        image_bbox: [0.0, 0.0, width as f32, height as f32],
    })
}
