//! The pooler: competitive matching plus online learning.
//!
//! [`Pooler`] owns a [`CoincidenceMatrix`] and turns sparse inputs into
//! fixed-sparsity outputs: each [`compute`](Pooler::compute) call scores
//! every prototype row against the input (over its relevant prefix only),
//! optionally boosts the previous step's winners, and emits a binary
//! vector with ones at the top-scoring rows.
//!
//! # Learning
//!
//! When learning is enabled, winner rows are reinforced Hebbian-style:
//! every entry of a winning row gains the input value at its column, so
//! entries that keep matching grow and the rest fall behind. Periodically
//! the whole matrix is renormalized (each row's weight sum rescaled to a
//! fixed target) and resegregated, which is what actually demotes
//! rarely-matching entries out of the relevant prefix: normalization acts
//! as inhibition between the entries of a row.
//!
//! # Determinism
//!
//! Randomness exists only at construction (seeded via
//! [`PoolerConfig::seed`]). Everything after that, including both tie-break
//! policies, is deterministic.

use crate::config::{InitMode, PoolerConfig};
use crate::error::Result;
use crate::matrix::CoincidenceMatrix;
use crate::relevance;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Competitive online-learning sparse pattern pooler.
///
/// # Example
///
/// ```rust
/// use protopool::{Pooler, PoolerConfig};
///
/// let mut pooler = Pooler::new(PoolerConfig {
///     rows: 64,
///     cols: 256,
///     entries_per_row: 16,
///     output_sparsity: 4,
///     seed: Some(42),
///     ..Default::default()
/// })?;
///
/// let mut input = vec![0.0; 256];
/// for column in [3, 17, 40, 101, 200] {
///     input[column] = 1.0;
/// }
/// let mut output = vec![0.0; 64];
///
/// pooler.compute(0, &input, &mut output, true, true);
/// assert!(output.iter().filter(|&&v| v == 1.0).count() <= 4);
/// # Ok::<(), protopool::PoolerError>(())
/// ```
#[derive(Debug)]
pub struct Pooler {
    pub(crate) matrix: CoincidenceMatrix,
    pub(crate) output_sparsity: usize,
    pub(crate) stimulus_threshold: f32,
    pub(crate) histogram_threshold: f32,
    pub(crate) normalization_target: f32,
    pub(crate) normalization_period: u64,
    pub(crate) hysteresis: f32,
    pub(crate) replicas: usize,
    /// Learning-enabled compute calls so far; paces the periodic pass.
    pub(crate) iteration: u64,
    /// Winner rows of the previous compute call (hysteresis only).
    pub(crate) prev_winners: Vec<u32>,
    /// Per-replica raw score capture; empty unless capture is enabled.
    pub(crate) captured: Vec<Vec<f32>>,
}

impl Pooler {
    /// Build a pooler from a validated configuration.
    ///
    /// The initial matrix is drawn according to `config.init` and
    /// row-normalized to the normalization target; every boundary starts
    /// at `entries_per_row`, so before the first periodic pass all entries
    /// participate in matching.
    pub fn new(config: PoolerConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut matrix = match config.init {
            InitMode::Uniform => CoincidenceMatrix::uniform(
                config.rows,
                config.cols,
                config.entries_per_row,
                config.initial_weight,
                &mut rng,
            ),
            InitMode::Gaussian2d { field_width, sigma } => CoincidenceMatrix::gaussian_2d(
                config.rows,
                config.cols,
                config.entries_per_row,
                field_width,
                sigma,
                config.initial_weight,
                &mut rng,
            ),
        };
        matrix.normalize_rows(config.normalization_target);

        Ok(Self {
            matrix,
            output_sparsity: config.output_sparsity,
            stimulus_threshold: config.stimulus_threshold,
            histogram_threshold: config.histogram_threshold(),
            normalization_target: config.normalization_target,
            normalization_period: config.normalization_period,
            hysteresis: config.hysteresis,
            replicas: config.replicas,
            iteration: 0,
            prev_winners: Vec::with_capacity(config.rows),
            captured: Vec::new(),
        })
    }

    /// One discrete time-step: match `input` against every prototype and
    /// write a binary top-N pattern into `output`.
    ///
    /// `input` must have length [`cols`](Self::cols) and `output` length
    /// [`rows`](Self::rows); `replica` selects the diagnostic capture slot
    /// and must be below [`replicas`](Self::replicas). An input element
    /// counts as "on" iff it is exactly nonzero. `output` is never left
    /// partially written: it is either all zero (input below the stimulus
    /// threshold, or no row scored above it) or a valid top-N pattern with
    /// `min(output_sparsity, matching rows)` ones. Among tied scores the
    /// lower row index wins.
    ///
    /// With `learn` set, winner rows are reinforced and the iteration
    /// counter advances. `infer` is accepted for host-interface parity;
    /// the output is produced regardless.
    pub fn compute(
        &mut self,
        replica: usize,
        input: &[f32],
        output: &mut [f32],
        learn: bool,
        infer: bool,
    ) {
        assert_eq!(input.len(), self.matrix.cols, "input length mismatch");
        assert_eq!(output.len(), self.matrix.rows, "output length mismatch");
        assert!(replica < self.replicas, "replica index out of range");
        let _ = infer;

        // Too few on-bits: nothing can match above threshold.
        let on_bits = input.iter().filter(|&&v| v != 0.0).count();
        if on_bits as f32 <= self.stimulus_threshold {
            output.fill(0.0);
            return;
        }

        // Overlap scores over the relevant prefix of each row, computed
        // directly into the caller's output buffer. Hot loop.
        for row in 0..self.matrix.rows {
            let mut score = 0.0f32;
            for &column in self.matrix.relevant_indices(row) {
                score += input[column as usize];
            }
            output[row] = score;
        }

        if self.hysteresis > 1.0 {
            for &row in &self.prev_winners {
                output[row as usize] *= self.hysteresis;
            }
        }

        let matching = output
            .iter()
            .filter(|&&score| score > self.stimulus_threshold)
            .count();

        // Diagnostic capture, off the default path.
        if !self.captured.is_empty() {
            self.captured[replica].copy_from_slice(output);
        }

        let top_n = self.output_sparsity.min(matching);
        if top_n == 0 {
            output.fill(0.0);
            return;
        }

        let winners = select_top_n(output, top_n);

        if learn {
            self.update(&winners, input);
            self.iteration += 1;
        }

        if self.hysteresis > 1.0 {
            self.prev_winners.clear();
            self.prev_winners.extend_from_slice(&winners);
        }

        output.fill(0.0);
        for &row in &winners {
            output[row as usize] = 1.0;
        }
    }

    /// Reinforce the winner rows and run the periodic pass when due.
    fn update(&mut self, winners: &[u32], input: &[f32]) {
        // Reinforce every entry of each winner, not just the relevant
        // prefix: demoted entries must be able to re-enter the relevant
        // set if the input statistics shift back toward them.
        for &row in winners {
            let (indices, weights) = self.matrix.row_entries_mut(row as usize);
            for (&column, weight) in indices.iter().zip(weights.iter_mut()) {
                *weight += input[column as usize];
            }
        }

        // Matrix-wide, so rows updated since the last pass and rows that
        // never won both stay numerically consistent.
        if self.iteration % self.normalization_period == 0 {
            self.matrix.normalize_rows(self.normalization_target);
            relevance::resegregate(&mut self.matrix, self.histogram_threshold);
        }
    }

    /// Enable or disable raw score capture.
    ///
    /// When enabled, each `compute` call copies the full post-hysteresis
    /// score vector (before winner selection) into the calling replica's
    /// slot. This turns per-call bookkeeping from O(matching rows) into an
    /// O(rows) copy, so it is off by default.
    pub fn set_capture_scores(&mut self, enabled: bool) {
        if enabled {
            self.captured = vec![vec![0.0; self.matrix.rows]; self.replicas];
        } else {
            self.captured = Vec::new();
        }
    }

    /// The raw scores captured for `replica` on its last compute call,
    /// or `None` if capture is disabled.
    pub fn captured_scores(&self, replica: usize) -> Option<&[f32]> {
        assert!(replica < self.replicas, "replica index out of range");
        self.captured.get(replica).map(|scores| scores.as_slice())
    }

    /// Forget the previous step's winners (stops hysteresis carrying over
    /// a sequence break).
    pub fn reset(&mut self) {
        self.prev_winners.clear();
    }

    /// Replace every matrix entry from a dense `rows x cols` row-major
    /// array; see [`CoincidenceMatrix::set_from_dense`].
    pub fn set_from_dense(&mut self, values: &[f32]) -> Result<()> {
        self.matrix.set_from_dense(values)
    }

    /// Number of prototype rows.
    pub fn rows(&self) -> usize {
        self.matrix.rows
    }

    /// Size of the input space.
    pub fn cols(&self) -> usize {
        self.matrix.cols
    }

    /// Fixed entry count per row.
    pub fn entries_per_row(&self) -> usize {
        self.matrix.entries_per_row
    }

    /// Desired winners per inference call.
    pub fn output_sparsity(&self) -> usize {
        self.output_sparsity
    }

    /// Minimum activity/overlap to be considered at all.
    pub fn stimulus_threshold(&self) -> f32 {
        self.stimulus_threshold
    }

    /// Relevance threshold derived at construction.
    pub fn histogram_threshold(&self) -> f32 {
        self.histogram_threshold
    }

    /// Row weight sum restored by the periodic pass.
    pub fn normalization_target(&self) -> f32 {
        self.normalization_target
    }

    /// Learning iterations between periodic passes.
    pub fn normalization_period(&self) -> u64 {
        self.normalization_period
    }

    /// Score boost applied to the previous step's winners.
    pub fn hysteresis(&self) -> f32 {
        self.hysteresis
    }

    /// Number of logical processing units sharing this pooler.
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Learning-enabled compute calls so far.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Relevant-prefix lengths, one per row.
    pub fn boundaries(&self) -> &[usize] {
        self.matrix.boundaries()
    }

    /// Winner rows of the previous compute call.
    pub fn previous_winners(&self) -> &[u32] {
        &self.prev_winners
    }

    /// One row as (column, weight) pairs sorted ascending by column.
    pub fn row_pairs(&self, row: usize) -> Vec<(u32, f32)> {
        self.matrix.row_pairs(row)
    }

    /// Materialize one row into a dense column vector.
    pub fn row_dense(&self, row: usize, out: &mut [f32]) {
        self.matrix.row_dense(row, out)
    }

    /// Read access to the underlying coincidence matrix.
    pub fn matrix(&self) -> &CoincidenceMatrix {
        &self.matrix
    }
}

/// Indices of the `top_n` highest scores, by partial selection.
///
/// Total order: score descending, then row index ascending, so ties go to
/// the lower row, deterministically, without a full sort.
fn select_top_n(scores: &[f32], top_n: usize) -> Vec<u32> {
    debug_assert!(top_n > 0 && top_n <= scores.len());

    let mut ranked: Vec<(f32, u32)> = scores
        .iter()
        .enumerate()
        .map(|(row, &score)| (score, row as u32))
        .collect();
    ranked.select_nth_unstable_by(top_n - 1, |a, b| {
        b.0.total_cmp(&a.0).then(a.1.cmp(&b.1))
    });

    ranked[..top_n].iter().map(|&(_, row)| row).collect()
}
