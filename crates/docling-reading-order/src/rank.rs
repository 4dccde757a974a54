//! Dense ranking of arbitrary comparable values

use std::cmp::Ordering;

/// Rank each value among all values, ascending, 0-based
///
/// Entry `i` of the result is the position value `i` would take if the input were
/// sorted. Equal values keep their input order (stable sort), so the earlier one gets
/// the lower rank. Values that do not compare equal to themselves (NaN) rank last.
///
/// # Examples
///
/// ```
/// use docling_reading_order::rank::rank_elements;
///
/// assert_eq!(rank_elements(&[3, 1, 2]), vec![2, 0, 1]);
/// assert_eq!(rank_elements(&[5, 5, 5]), vec![0, 1, 2]);
/// ```
#[must_use]
pub fn rank_elements<T: PartialOrd>(values: &[T]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| total_cmp(&values[a], &values[b]));

    let mut ranks = vec![0; values.len()];
    for (rank, original_index) in order.into_iter().enumerate() {
        ranks[original_index] = rank;
    }
    ranks
}

fn total_cmp<T: PartialOrd>(a: &T, b: &T) -> Ordering {
    let unordered = |v: &T| v.partial_cmp(v).is_none();
    match (unordered(a), unordered(b)) {
        (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        (true, true) => Ordering::Equal,
    }
}

/// Returns true if `ranks` is exactly a permutation of `0..ranks.len()`
#[must_use]
pub fn is_dense_permutation(ranks: &[usize]) -> bool {
    let mut seen = vec![false; ranks.len()];
    for &rank in ranks {
        match seen.get_mut(rank) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}
