//! # Protopool: Competitive Sparse Pattern Memory
//!
//! Protopool is a competitive, online-learning pattern-matching engine:
//! it keeps a bank of sparse "coincidence" prototypes, matches each
//! high-dimensional sparse input against all of them, and emits a
//! fixed-sparsity binary vector naming the best-matching prototypes.
//! Winners are reinforced from the inputs they match, so the bank adapts
//! to the statistics of the stream it sees.
//!
//! ## Quick Start
//!
//! ```rust
//! use protopool::{Pooler, PoolerConfig};
//!
//! // A bank of 128 prototypes over a 512-bit input space.
//! let mut pooler = Pooler::new(PoolerConfig {
//!     rows: 128,
//!     cols: 512,
//!     entries_per_row: 32,
//!     output_sparsity: 8,
//!     seed: Some(42),
//!     ..Default::default()
//! })?;
//!
//! let mut input = vec![0.0; 512];
//! for column in [7, 64, 130, 255, 300, 481] {
//!     input[column] = 1.0;
//! }
//! let mut output = vec![0.0; 128];
//!
//! // One time-step: match, learn, emit the top-8 pattern.
//! pooler.compute(0, &input, &mut output, true, true);
//! assert!(output.iter().filter(|&&v| v == 1.0).count() <= 8);
//!
//! // Checkpoint and restore, bit-for-bit.
//! let mut saved = Vec::new();
//! pooler.save(&mut saved)?;
//! let restored = Pooler::load(saved.as_slice())?;
//! assert_eq!(restored.boundaries(), pooler.boundaries());
//! # Ok::<(), protopool::PoolerError>(())
//! ```
//!
//! ## Core Concepts
//!
//! - **Coincidence**: one prototype row, a fixed number of
//!   (column, weight) entries over the input space.
//! - **Overlap score**: sum of the input values at a row's relevant
//!   columns; the matching metric.
//! - **Relevant prefix**: the leading entries of a row whose weights
//!   exceed the histogram threshold; only these are scored. The rest stay
//!   in the row and keep learning, ready to be promoted back.
//! - **Hysteresis**: an optional score boost for the previous step's
//!   winners, stabilizing the output across consecutive similar inputs.
//! - **Periodic normalization**: every row's weight sum is periodically
//!   rescaled to a fixed target and the relevant prefixes recomputed;
//!   this is the inhibition that makes rarely-matching entries fade.
//!
//! Poolers are single-threaded values: mutating calls take `&mut self`,
//! and independent instances share nothing.

pub mod codec;
pub mod config;
pub mod error;
pub mod matrix;
pub mod pooler;

mod relevance;

// Re-exports for convenience
pub use codec::STATE_VERSION;
pub use config::{InitMode, PoolerConfig};
pub use error::{PoolerError, Result};
pub use matrix::CoincidenceMatrix;
pub use pooler::Pooler;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_to_end_learn_save_restore() {
        let mut pooler = Pooler::new(PoolerConfig {
            rows: 32,
            cols: 128,
            entries_per_row: 12,
            output_sparsity: 4,
            stimulus_threshold: 0.0,
            hysteresis: 1.2,
            normalization_period: 3,
            seed: Some(2024),
            ..Default::default()
        })
        .expect("valid config rejected");

        let mut output = vec![0.0; 32];
        for step in 0..12u32 {
            let mut input = vec![0.0; 128];
            for offset in 0..8 {
                input[((step * 13 + offset * 17) % 128) as usize] = 1.0;
            }
            pooler.compute(0, &input, &mut output, true, true);
            let ones = output.iter().filter(|&&v| v == 1.0).count();
            assert!(ones <= 4, "step {} emitted {} winners", step, ones);
        }
        assert_eq!(pooler.iteration(), 12);

        let mut saved = Vec::new();
        pooler.save(&mut saved).expect("save failed");
        let mut restored = Pooler::load(saved.as_slice()).expect("load failed");

        let mut input = vec![0.0; 128];
        for column in (0..128).step_by(9) {
            input[column] = 1.0;
        }
        let mut a = vec![0.0; 32];
        let mut b = vec![0.0; 32];
        pooler.compute(0, &input, &mut a, false, true);
        restored.compute(0, &input, &mut b, false, true);
        assert_eq!(a, b);
    }

    #[test]
    fn test_interchange_feeds_a_fresh_pooler() {
        let mut source = Pooler::new(PoolerConfig {
            rows: 16,
            cols: 64,
            entries_per_row: 6,
            output_sparsity: 2,
            seed: Some(8),
            ..Default::default()
        })
        .unwrap();

        let dump = source.export_matrix();

        let mut sink = Pooler::new(PoolerConfig {
            rows: 16,
            cols: 64,
            entries_per_row: 6,
            output_sparsity: 2,
            seed: Some(9), // different initial matrix
            ..Default::default()
        })
        .unwrap();
        sink.load_matrix(&dump).expect("interchange load failed");

        let mut input = vec![0.0; 64];
        for column in [4, 18, 33, 50] {
            input[column] = 1.0;
        }
        let mut a = vec![0.0; 16];
        let mut b = vec![0.0; 16];
        source.compute(0, &input, &mut a, false, true);
        sink.compute(0, &input, &mut b, false, true);
        assert_eq!(a, b, "loaded matrix must match the exporter's inference");
    }
}
