//! Configuration for constructing a [`Pooler`](crate::Pooler).
//!
//! All structural parameters are fixed at construction time: the matrix is
//! never resized afterwards, and the thresholds derived here never change
//! over the pooler's lifetime. Invalid combinations are rejected eagerly
//! with [`PoolerError::Config`] rather than surfacing later as corrupt
//! state.

use crate::error::{PoolerError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How the initial coincidence columns are drawn.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InitMode {
    /// Each row gets distinct columns drawn uniformly from the whole
    /// column space.
    Uniform,

    /// Columns are drawn from a 2-D reinterpretation of the column space
    /// with a Gaussian spatial falloff, for locally-connected prototypes.
    ///
    /// The column space is read as a `field_width x (cols / field_width)`
    /// grid and the sampling density peaks at the grid center.
    Gaussian2d {
        /// Width of the 2-D receptive field; must divide `cols` evenly.
        field_width: usize,
        /// Spread of the Gaussian falloff, in grid cells. Must be > 0.
        sigma: f32,
    },
}

/// Parameters for creating a [`Pooler`](crate::Pooler).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolerConfig {
    /// Number of coincidence rows (prototypes).
    pub rows: usize,

    /// Size of the input space each coincidence matches against.
    pub cols: usize,

    /// Fixed number of (column, weight) entries per row.
    pub entries_per_row: usize,

    /// Desired number of winners per inference call (<= `rows`).
    pub output_sparsity: usize,

    /// Minimum input activity / minimum overlap score for a row or an
    /// input to be considered at all.
    pub stimulus_threshold: f32,

    /// How the initial columns are drawn.
    pub init: InitMode,

    /// Seed for the construction RNG. `Some` makes runs repeatable; there
    /// is no randomness anywhere after construction.
    pub seed: Option<u64>,

    /// Initial weight given to every entry.
    pub initial_weight: f32,

    /// The relevance threshold is `threshold_constant / entries_per_row`;
    /// entries whose weight exceeds it participate in matching.
    pub threshold_constant: f32,

    /// Sum each row's weights are periodically rescaled to.
    pub normalization_target: f32,

    /// Learning iterations between rescale/resegregate passes.
    pub normalization_period: u64,

    /// Must be >= 1.0. When > 1.0, the previous step's winners get their
    /// scores multiplied by this factor before winner selection.
    pub hysteresis: f32,

    /// Number of logical processing units sharing this pooler; only used
    /// to size the per-replica diagnostic score capture.
    pub replicas: usize,
}

impl Default for PoolerConfig {
    fn default() -> Self {
        Self {
            rows: 512,
            cols: 1024,
            entries_per_row: 64,
            output_sparsity: 20,
            stimulus_threshold: 0.0,
            init: InitMode::Uniform,
            seed: None,
            initial_weight: 1.0,
            threshold_constant: 800.0,
            normalization_target: 1000.0,
            normalization_period: 20,
            hysteresis: 1.0,
            replicas: 1,
        }
    }
}

impl PoolerConfig {
    /// The derived relevance threshold for this configuration.
    pub fn histogram_threshold(&self) -> f32 {
        self.threshold_constant / self.entries_per_row as f32
    }

    /// Check every construction-time constraint.
    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 {
            return Err(PoolerError::Config("rows must be > 0".into()));
        }
        if self.entries_per_row == 0 || self.entries_per_row > self.cols {
            return Err(PoolerError::Config(format!(
                "entries_per_row must be in 1..={}, got {}",
                self.cols, self.entries_per_row
            )));
        }
        if self.output_sparsity > self.rows {
            return Err(PoolerError::Config(format!(
                "output_sparsity {} exceeds rows {}",
                self.output_sparsity, self.rows
            )));
        }
        if self.hysteresis < 1.0 {
            return Err(PoolerError::Config(format!(
                "hysteresis must be >= 1.0, got {}",
                self.hysteresis
            )));
        }
        if self.threshold_constant <= 0.0 {
            return Err(PoolerError::Config(format!(
                "threshold_constant must be > 0, got {}",
                self.threshold_constant
            )));
        }
        if self.normalization_target <= 0.0 {
            return Err(PoolerError::Config(format!(
                "normalization_target must be > 0, got {}",
                self.normalization_target
            )));
        }
        if self.normalization_period == 0 {
            return Err(PoolerError::Config(
                "normalization_period must be > 0".into(),
            ));
        }
        if self.replicas == 0 {
            return Err(PoolerError::Config("replicas must be > 0".into()));
        }
        if let InitMode::Gaussian2d { field_width, sigma } = self.init {
            if field_width == 0 {
                return Err(PoolerError::Config("field_width must be > 0".into()));
            }
            if self.cols % field_width != 0 {
                return Err(PoolerError::Config(format!(
                    "field_width {} must divide cols {} evenly",
                    field_width, self.cols
                )));
            }
            if sigma <= 0.0 {
                return Err(PoolerError::Config(format!(
                    "sigma must be > 0, got {}",
                    sigma
                )));
            }
        }
        Ok(())
    }
}
