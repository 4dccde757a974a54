//! Structural reordering
//!
//! Page headers always read before the body and page footers after it, whatever the
//! model predicted. Within each group the model's relative order is kept.

use crate::data_structures::ReadingGroup;
use crate::error::{OrderError, Result};

/// Move page headers to the front and page footers to the back
///
/// `ranks[i]` is the model rank of box `i`. Returns the final rank of each box, still
/// indexed by input position. Without labels the ranks pass through untouched.
///
/// # Errors
///
/// Returns `OrderError::InputShape` if `labels` and `ranks` differ in length.
pub fn apply_structural_order(ranks: &[usize], labels: Option<&[String]>) -> Result<Vec<usize>> {
    let Some(labels) = labels else {
        return Ok(ranks.to_vec());
    };
    if labels.len() != ranks.len() {
        return Err(OrderError::InputShape {
            reason: format!(
                "{} labels for {} ranked boxes",
                labels.len(),
                ranks.len()
            ),
        });
    }

    // Stable: ties keep input order
    let mut by_rank: Vec<usize> = (0..ranks.len()).collect();
    by_rank.sort_by_key(|&i| ranks[i]);

    let group_of = |i: usize| ReadingGroup::from_label(&labels[i]);
    let ordered = [ReadingGroup::Header, ReadingGroup::Body, ReadingGroup::Footer]
        .into_iter()
        .flat_map(|group| by_rank.iter().filter(move |&&i| group_of(i) == group));

    let mut final_ranks = vec![0; ranks.len()];
    for (rank, &index) in ordered.enumerate() {
        final_ranks[index] = rank;
    }
    Ok(final_ranks)
}
