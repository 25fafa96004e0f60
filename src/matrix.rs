//! Coincidence Store: fixed-width sparse prototype storage.
//!
//! Every row holds exactly `entries_per_row` (column, weight) entries, so
//! the whole matrix lives in two flat parallel arrays (`indices` and
//! `weights`) with a constant row stride. This is deliberately *not* CSR:
//! row starts need no offset table, rows never grow or shrink, and the
//! inference hot loop walks a contiguous prefix of each row.
//!
//! # The relevance boundary
//!
//! Alongside the entries, each row carries one integer `boundary[row]`
//! partitioning the row into a "relevant" prefix (weights above the
//! histogram threshold, kept sorted descending by weight) and an
//! "irrelevant" suffix. Inference reads only the prefix; learning updates
//! the whole row. The boundary is recomputed by the periodic segregation
//! pass in [`relevance`](crate::relevance).

use crate::error::{PoolerError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;

/// Fixed-arity sparse matrix of coincidence prototypes.
#[derive(Clone, Debug)]
pub struct CoincidenceMatrix {
    pub(crate) rows: usize,
    pub(crate) cols: usize,
    pub(crate) entries_per_row: usize,
    /// Column index of every entry, row-major with stride `entries_per_row`.
    pub(crate) indices: Vec<u32>,
    /// Weight of every entry, parallel to `indices`.
    pub(crate) weights: Vec<f32>,
    /// Relevant-prefix length per row, 0..=entries_per_row.
    pub(crate) boundary: Vec<usize>,
}

impl CoincidenceMatrix {
    /// Build a matrix whose rows each hold `entries_per_row` distinct
    /// columns drawn uniformly from `[0, cols)`, every weight set to
    /// `initial_weight`. Columns are stored ascending within each row.
    pub fn uniform<R: Rng>(
        rows: usize,
        cols: usize,
        entries_per_row: usize,
        initial_weight: f32,
        rng: &mut R,
    ) -> Self {
        assert!(
            entries_per_row > 0 && entries_per_row <= cols,
            "entries_per_row {} out of range for {} columns",
            entries_per_row,
            cols
        );

        let mut indices = Vec::with_capacity(rows * entries_per_row);
        let mut pool: Vec<u32> = (0..cols as u32).collect();

        for _ in 0..rows {
            let (chosen, _) = pool.partial_shuffle(rng, entries_per_row);
            chosen.sort_unstable();
            indices.extend_from_slice(chosen);
        }

        Self {
            rows,
            cols,
            entries_per_row,
            indices,
            weights: vec![initial_weight; rows * entries_per_row],
            boundary: vec![entries_per_row; rows],
        }
    }

    /// Build a matrix with locally-connected rows: the column space is read
    /// as a `field_width x (cols / field_width)` grid and columns are drawn
    /// without replacement from a symmetric 2-D Gaussian centered on the
    /// grid center, renormalized over the finite grid.
    pub fn gaussian_2d<R: Rng>(
        rows: usize,
        cols: usize,
        entries_per_row: usize,
        field_width: usize,
        sigma: f32,
        initial_weight: f32,
        rng: &mut R,
    ) -> Self {
        assert!(
            field_width > 0 && cols % field_width == 0,
            "field_width {} must divide cols {}",
            field_width,
            cols
        );
        assert!(sigma > 0.0, "sigma must be > 0");
        assert!(
            entries_per_row > 0 && entries_per_row <= cols,
            "entries_per_row {} out of range for {} columns",
            entries_per_row,
            cols
        );

        let field_height = cols / field_width;
        let center_x = (field_width as f64 - 1.0) / 2.0;
        let center_y = (field_height as f64 - 1.0) / 2.0;
        let inv_two_sigma_sq = 1.0 / (2.0 * sigma as f64 * sigma as f64);

        // Density of each grid cell, renormalized because the Gaussian
        // loses mass over a compact domain.
        let mut density: Vec<f64> = (0..cols)
            .map(|column| {
                let x = (column / field_height) as f64;
                let y = (column % field_height) as f64;
                let d2 = (x - center_x).powi(2) + (y - center_y).powi(2);
                (-d2 * inv_two_sigma_sq).exp()
            })
            .collect();
        let total: f64 = density.iter().sum();
        for d in &mut density {
            *d /= total;
        }

        let mut indices = Vec::with_capacity(rows * entries_per_row);

        for _ in 0..rows {
            let mut chosen: BTreeSet<u32> = BTreeSet::new();
            while chosen.len() < entries_per_row {
                // Inverse-CDF walk over the grid densities.
                let p: f64 = rng.gen();
                let mut acc = density[0];
                let mut column = 0;
                while acc < p && column < cols - 1 {
                    column += 1;
                    acc += density[column];
                }
                chosen.insert(column as u32);
            }
            indices.extend(chosen);
        }

        Self {
            rows,
            cols,
            entries_per_row,
            indices,
            weights: vec![initial_weight; rows * entries_per_row],
            boundary: vec![entries_per_row; rows],
        }
    }

    /// Reassemble a matrix from raw parts (used by the persistence codec;
    /// the codec has already validated column bounds and arity).
    pub(crate) fn from_parts(
        rows: usize,
        cols: usize,
        entries_per_row: usize,
        indices: Vec<u32>,
        weights: Vec<f32>,
        boundary: Vec<usize>,
    ) -> Self {
        debug_assert_eq!(indices.len(), rows * entries_per_row);
        debug_assert_eq!(weights.len(), indices.len());
        debug_assert_eq!(boundary.len(), rows);
        debug_assert!(indices.iter().all(|&c| (c as usize) < cols));

        Self {
            rows,
            cols,
            entries_per_row,
            indices,
            weights,
            boundary,
        }
    }

    /// Number of rows (prototypes).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Size of the column (input) space.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Fixed number of entries per row.
    pub fn entries_per_row(&self) -> usize {
        self.entries_per_row
    }

    /// Relevant-prefix lengths, one per row.
    pub fn boundaries(&self) -> &[usize] {
        &self.boundary
    }

    #[inline]
    fn span(&self, row: usize) -> std::ops::Range<usize> {
        let start = row * self.entries_per_row;
        start..start + self.entries_per_row
    }

    /// Column indices of a row, in storage order.
    #[inline]
    pub fn row_indices(&self, row: usize) -> &[u32] {
        &self.indices[self.span(row)]
    }

    /// Weights of a row, in storage order.
    #[inline]
    pub fn row_weights(&self, row: usize) -> &[f32] {
        &self.weights[self.span(row)]
    }

    /// Column indices of a row's relevant prefix only.
    #[inline]
    pub(crate) fn relevant_indices(&self, row: usize) -> &[u32] {
        let start = row * self.entries_per_row;
        &self.indices[start..start + self.boundary[row]]
    }

    /// Mutable view of one row as parallel (indices, weights) slices.
    #[inline]
    pub(crate) fn row_entries_mut(&mut self, row: usize) -> (&mut [u32], &mut [f32]) {
        let span = self.span(row);
        (&mut self.indices[span.clone()], &mut self.weights[span])
    }

    /// One row as (column, weight) pairs sorted ascending by column.
    ///
    /// This is a presentation-order copy; the storage order (weight-sorted
    /// after segregation) is untouched.
    pub fn row_pairs(&self, row: usize) -> Vec<(u32, f32)> {
        let mut pairs: Vec<(u32, f32)> = self
            .row_indices(row)
            .iter()
            .copied()
            .zip(self.row_weights(row).iter().copied())
            .collect();
        pairs.sort_unstable_by_key(|&(column, _)| column);
        pairs
    }

    /// Materialize one row into a dense column vector.
    pub fn row_dense(&self, row: usize, out: &mut [f32]) {
        assert_eq!(out.len(), self.cols, "dense row buffer length mismatch");
        out.fill(0.0);
        for (&column, &weight) in self.row_indices(row).iter().zip(self.row_weights(row)) {
            out[column as usize] = weight;
        }
    }

    /// Replace every entry from a dense `rows x cols` row-major array.
    ///
    /// Each row must contain exactly `entries_per_row` nonzero values;
    /// otherwise the matrix is left unchanged and a
    /// [`PoolerError::RowArity`] is returned. Boundaries are not touched.
    pub fn set_from_dense(&mut self, values: &[f32]) -> Result<()> {
        assert_eq!(
            values.len(),
            self.rows * self.cols,
            "dense matrix length mismatch"
        );

        let mut indices = Vec::with_capacity(self.rows * self.entries_per_row);
        let mut weights = Vec::with_capacity(self.rows * self.entries_per_row);

        for row in 0..self.rows {
            let offset = row * self.cols;
            let start = indices.len();
            for column in 0..self.cols {
                let v = values[offset + column];
                if v != 0.0 {
                    indices.push(column as u32);
                    weights.push(v);
                }
            }
            let got = indices.len() - start;
            if got != self.entries_per_row {
                return Err(PoolerError::RowArity {
                    row,
                    expected: self.entries_per_row,
                    got,
                });
            }
        }

        self.indices = indices;
        self.weights = weights;
        Ok(())
    }

    /// Rescale every row's weights so they sum to `target`.
    ///
    /// A row whose current sum is exactly zero is skipped; every other row
    /// is rescaled independently.
    pub fn normalize_rows(&mut self, target: f32) {
        assert!(target > 0.0, "normalization target must be > 0");

        for row in 0..self.rows {
            let span = self.span(row);
            let sum: f32 = self.weights[span.clone()].iter().sum();
            if sum == 0.0 {
                continue;
            }
            let scale = target / sum;
            for w in &mut self.weights[span] {
                *w *= scale;
            }
        }
    }

    /// Sum of one row's weights.
    pub fn row_sum(&self, row: usize) -> f32 {
        self.row_weights(row).iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    fn distinct_and_bounded(m: &CoincidenceMatrix) {
        for row in 0..m.rows() {
            let idx = m.row_indices(row);
            let set: BTreeSet<u32> = idx.iter().copied().collect();
            assert_eq!(set.len(), m.entries_per_row(), "duplicate column in row {}", row);
            assert!(idx.iter().all(|&c| (c as usize) < m.cols()));
        }
    }

    #[test]
    fn test_uniform_shape_and_bounds() {
        let m = CoincidenceMatrix::uniform(20, 50, 8, 1.0, &mut rng(7));
        assert_eq!(m.rows(), 20);
        assert_eq!(m.cols(), 50);
        assert_eq!(m.entries_per_row(), 8);
        assert!(m.row_weights(3).iter().all(|&w| w == 1.0));
        assert!(m.boundaries().iter().all(|&b| b == 8));
        distinct_and_bounded(&m);
        // Fresh rows are stored ascending by column.
        for row in 0..m.rows() {
            assert!(m.row_indices(row).windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_uniform_deterministic_by_seed() {
        let a = CoincidenceMatrix::uniform(10, 40, 5, 1.0, &mut rng(42));
        let b = CoincidenceMatrix::uniform(10, 40, 5, 1.0, &mut rng(42));
        assert_eq!(a.indices, b.indices);

        let c = CoincidenceMatrix::uniform(10, 40, 5, 1.0, &mut rng(43));
        assert_ne!(a.indices, c.indices);
    }

    #[test]
    fn test_gaussian_shape_and_bounds() {
        let m = CoincidenceMatrix::gaussian_2d(50, 64, 10, 8, 1.5, 1.0, &mut rng(11));
        assert_eq!(m.rows(), 50);
        distinct_and_bounded(&m);
    }

    #[test]
    fn test_gaussian_concentrates_near_center() {
        // 8x8 grid, tight sigma: the center cell should be drawn far more
        // often than the corner across many rows.
        let m = CoincidenceMatrix::gaussian_2d(200, 64, 10, 8, 1.0, 1.0, &mut rng(3));
        let count_of = |column: u32| {
            (0..m.rows())
                .filter(|&row| m.row_indices(row).contains(&column))
                .count()
        };
        // Column 27 is grid cell (3, 3), next to the center (3.5, 3.5);
        // column 0 is the corner (0, 0).
        assert!(
            count_of(27) > count_of(0),
            "expected center cell to outdraw the corner, got {} vs {}",
            count_of(27),
            count_of(0)
        );
    }

    #[test]
    fn test_set_from_dense() {
        let mut m = CoincidenceMatrix::uniform(2, 6, 2, 1.0, &mut rng(1));
        #[rustfmt::skip]
        let dense = vec![
            0.0, 3.0, 0.0, 0.0, 2.0, 0.0,
            1.0, 0.0, 0.0, 5.0, 0.0, 0.0,
        ];
        m.set_from_dense(&dense).expect("dense load failed");
        assert_eq!(m.row_pairs(0), vec![(1, 3.0), (4, 2.0)]);
        assert_eq!(m.row_pairs(1), vec![(0, 1.0), (3, 5.0)]);
    }

    #[test]
    fn test_set_from_dense_rejects_wrong_arity() {
        let mut m = CoincidenceMatrix::uniform(2, 6, 2, 1.0, &mut rng(1));
        let before = m.indices.clone();
        #[rustfmt::skip]
        let dense = vec![
            0.0, 3.0, 1.0, 0.0, 2.0, 0.0, // three nonzeros
            1.0, 0.0, 0.0, 5.0, 0.0, 0.0,
        ];
        let err = m.set_from_dense(&dense).unwrap_err();
        assert!(matches!(
            err,
            crate::PoolerError::RowArity {
                row: 0,
                expected: 2,
                got: 3
            }
        ));
        // Failed load leaves the matrix unchanged.
        assert_eq!(m.indices, before);
    }

    #[test]
    fn test_normalize_rows_hits_target() {
        let mut m = CoincidenceMatrix::uniform(5, 30, 6, 2.5, &mut rng(9));
        m.normalize_rows(1000.0);
        for row in 0..m.rows() {
            assert!(
                (m.row_sum(row) - 1000.0).abs() < 1e-3,
                "row {} sums to {}",
                row,
                m.row_sum(row)
            );
        }
    }

    #[test]
    fn test_normalize_rows_skips_zero_sum_row() {
        let mut m = CoincidenceMatrix::uniform(3, 30, 6, 1.0, &mut rng(9));
        let (_, weights) = m.row_entries_mut(1);
        weights.fill(0.0);

        m.normalize_rows(500.0);

        assert!((m.row_sum(0) - 500.0).abs() < 1e-3);
        assert_eq!(m.row_sum(1), 0.0);
        // Rows after the zero-sum row are still normalized.
        assert!((m.row_sum(2) - 500.0).abs() < 1e-3);
    }

    #[test]
    fn test_row_dense_roundtrip() {
        let m = CoincidenceMatrix::uniform(4, 12, 3, 2.0, &mut rng(5));
        let mut dense = vec![0.0; 12];
        m.row_dense(2, &mut dense);
        assert_eq!(dense.iter().filter(|&&v| v != 0.0).count(), 3);
        for &column in m.row_indices(2) {
            assert_eq!(dense[column as usize], 2.0);
        }
    }
}
