//! Relevance Segregator: dynamic read-masks over coincidence rows.
//!
//! After learning has drifted a row's weights, the row is resorted
//! descending by weight and its relevance boundary recomputed: the leading
//! entries whose weight strictly exceeds the histogram threshold form the
//! "relevant" prefix used for matching; the rest stay in the row (and keep
//! learning) but are ignored by inference.
//!
//! Sorting is O(entries_per_row log entries_per_row) per row, too costly
//! per call, so this runs only from the periodic pass in
//! [`Pooler::compute`](crate::Pooler::compute), and then over *every* row,
//! because normalization drifts weights on rows that never won.

use crate::matrix::CoincidenceMatrix;

/// Resort one row descending by weight and return its new boundary.
///
/// Ties sort ascending by column, so equal-weight entries land in a
/// deterministic order; entries exactly at the threshold count as
/// irrelevant (the boundary counts strictly greater weights only).
pub(crate) fn segregate_row(
    indices: &mut [u32],
    weights: &mut [f32],
    threshold: f32,
    scratch: &mut Vec<(u32, f32)>,
) -> usize {
    scratch.clear();
    scratch.extend(indices.iter().copied().zip(weights.iter().copied()));
    scratch.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    for (slot, &(column, weight)) in scratch.iter().enumerate() {
        indices[slot] = column;
        weights[slot] = weight;
    }

    scratch.iter().take_while(|&&(_, w)| w > threshold).count()
}

/// Recompute the relevance boundary of every row in the matrix.
pub(crate) fn resegregate(matrix: &mut CoincidenceMatrix, threshold: f32) {
    let mut scratch = Vec::with_capacity(matrix.entries_per_row());
    for row in 0..matrix.rows() {
        let (indices, weights) = matrix.row_entries_mut(row);
        let boundary = segregate_row(indices, weights, threshold, &mut scratch);
        matrix.boundary[row] = boundary;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_segregate_row_sorts_and_splits() {
        let mut indices = vec![3, 7, 1, 9];
        let mut weights = vec![0.5, 2.0, 1.5, 0.1];
        let mut scratch = Vec::new();

        let boundary = segregate_row(&mut indices, &mut weights, 1.0, &mut scratch);

        assert_eq!(weights, vec![2.0, 1.5, 0.5, 0.1]);
        assert_eq!(indices, vec![7, 1, 3, 9]);
        assert_eq!(boundary, 2);
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut indices = vec![0, 1, 2];
        let mut weights = vec![2.0, 1.0, 0.5];
        let mut scratch = Vec::new();

        // The entry exactly at the threshold falls on the irrelevant side.
        let boundary = segregate_row(&mut indices, &mut weights, 1.0, &mut scratch);
        assert_eq!(boundary, 1);
    }

    #[test]
    fn test_ties_order_by_column() {
        let mut indices = vec![9, 2, 5];
        let mut weights = vec![1.0, 1.0, 1.0];
        let mut scratch = Vec::new();

        segregate_row(&mut indices, &mut weights, 0.5, &mut scratch);
        assert_eq!(indices, vec![2, 5, 9]);
    }

    #[test]
    fn test_resegregate_invariant_holds_matrix_wide() {
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let mut matrix = CoincidenceMatrix::uniform(12, 40, 6, 1.0, &mut rng);

        // Spread the weights out so rows straddle the threshold.
        for (slot, w) in matrix.weights.iter_mut().enumerate() {
            *w = (slot % 7) as f32;
        }

        let threshold = 3.0;
        resegregate(&mut matrix, threshold);

        for row in 0..matrix.rows() {
            let boundary = matrix.boundaries()[row];
            let weights = matrix.row_weights(row);
            assert!(weights.windows(2).all(|w| w[0] >= w[1]));
            assert!(weights[..boundary].iter().all(|&w| w > threshold));
            assert!(weights[boundary..].iter().all(|&w| w <= threshold));
        }
    }
}
