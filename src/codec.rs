//! Persistence Codec: textual state serialization.
//!
//! Two forms, both whitespace-separated token streams:
//!
//! - **Full state** (`save`/`load`): version tag, every scalar parameter,
//!   the boundary array, every (column, weight) entry in storage order,
//!   and the previous-winners bookkeeping. Restores the exact internal
//!   representation; rows are NOT resorted.
//! - **Interchange** (`export_matrix` / `export_relevant_matrix` /
//!   `load_matrix`): the `sm_csr_1.5` sparse-matrix dump consumed by the
//!   external scripting layer: format tag, payload byte length, rows,
//!   cols, total nonzeros, then per row an entry count followed by
//!   (column, weight) pairs re-sorted ascending by column. The sort is a
//!   presentation-order transform applied at serialization time only.
//!
//! Malformed input is reported as a typed [`PoolerError`]; the pooler is
//! left untouched on any decode failure.

use crate::error::{PoolerError, Result};
use crate::matrix::CoincidenceMatrix;
use crate::pooler::Pooler;
use std::fmt::Write as _;
use std::io::{Read, Write};
use std::str::FromStr;

/// Version tag for the full-state form; must match exactly on load.
pub const STATE_VERSION: &str = "pooler_1.0";

/// Format tag for the interchange form.
const INTERCHANGE_TAG: &str = "sm_csr_1.5";
/// Older interchange dumps carry a bare tag with the same payload shape.
const LEGACY_TAG: &str = "csr";

/// Cursor over a whitespace-separated token stream.
struct Tokens<'a> {
    iter: std::str::SplitAsciiWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            iter: text.split_ascii_whitespace(),
        }
    }

    fn next(&mut self, expected: &'static str) -> Result<&'a str> {
        self.iter
            .next()
            .ok_or(PoolerError::UnexpectedEnd(expected))
    }

    fn parse<T: FromStr>(&mut self, expected: &'static str) -> Result<T> {
        let token = self.next(expected)?;
        token.parse().map_err(|_| PoolerError::MalformedToken {
            token: token.to_string(),
            expected,
        })
    }
}

impl Pooler {
    /// Version tag written at the head of the full-state form.
    pub fn version(&self) -> &'static str {
        STATE_VERSION
    }

    /// Serialize the full internal state.
    pub fn save<W: Write>(&self, mut writer: W) -> Result<()> {
        let m = &self.matrix;

        write!(
            writer,
            "{} {} {} {} {} {} {} {} {} {} {} {} ",
            STATE_VERSION,
            self.replicas,
            m.rows,
            m.cols,
            m.entries_per_row,
            self.iteration,
            self.output_sparsity,
            self.hysteresis,
            self.stimulus_threshold,
            self.histogram_threshold,
            self.normalization_target,
            self.normalization_period,
        )?;

        write!(writer, "{} ", m.boundary.len())?;
        for &boundary in &m.boundary {
            write!(writer, "{} ", boundary)?;
        }

        write!(writer, "{} ", m.indices.len())?;
        for (&column, &weight) in m.indices.iter().zip(&m.weights) {
            write!(writer, "{} {} ", column, weight)?;
        }

        write!(writer, "{} ", self.prev_winners.len())?;
        for &row in &self.prev_winners {
            write!(writer, "{} ", row)?;
        }

        Ok(())
    }

    /// Reconstruct a pooler from a full-state stream produced by
    /// [`save`](Self::save).
    pub fn load<R: Read>(mut reader: R) -> Result<Pooler> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        let mut tokens = Tokens::new(&text);

        let version = tokens.next("version tag")?;
        if version != STATE_VERSION {
            return Err(PoolerError::VersionMismatch {
                expected: STATE_VERSION,
                got: version.to_string(),
            });
        }

        let replicas: usize = tokens.parse("replica count")?;
        let rows: usize = tokens.parse("row count")?;
        let cols: usize = tokens.parse("column count")?;
        let entries_per_row: usize = tokens.parse("entries per row")?;
        let iteration: u64 = tokens.parse("iteration counter")?;
        let output_sparsity: usize = tokens.parse("output sparsity")?;
        let hysteresis: f32 = tokens.parse("hysteresis")?;
        let stimulus_threshold: f32 = tokens.parse("stimulus threshold")?;
        let histogram_threshold: f32 = tokens.parse("histogram threshold")?;
        let normalization_target: f32 = tokens.parse("normalization target")?;
        let normalization_period: u64 = tokens.parse("normalization period")?;

        if replicas == 0
            || hysteresis < 1.0
            || histogram_threshold <= 0.0
            || normalization_target <= 0.0
            || normalization_period == 0
        {
            return Err(PoolerError::Config(
                "saved state carries out-of-range parameters".into(),
            ));
        }

        let boundary_len: usize = tokens.parse("boundary array length")?;
        if boundary_len != rows {
            return Err(PoolerError::Config(format!(
                "boundary array length {} does not match {} rows",
                boundary_len, rows
            )));
        }
        let mut boundary = Vec::with_capacity(rows);
        for _ in 0..rows {
            let b: usize = tokens.parse("boundary value")?;
            if b > entries_per_row {
                return Err(PoolerError::MalformedToken {
                    token: b.to_string(),
                    expected: "boundary <= entries per row",
                });
            }
            boundary.push(b);
        }

        let nnz: usize = tokens.parse("nonzero count")?;
        if nnz != rows * entries_per_row {
            return Err(PoolerError::NonzeroCount {
                header: nnz,
                actual: rows * entries_per_row,
            });
        }
        let mut indices = Vec::with_capacity(nnz);
        let mut weights = Vec::with_capacity(nnz);
        for k in 0..nnz {
            let column: u32 = tokens.parse("column index")?;
            let weight: f32 = tokens.parse("weight")?;
            if column as usize >= cols {
                return Err(PoolerError::ColumnOutOfRange {
                    row: k / entries_per_row,
                    column,
                    cols,
                });
            }
            indices.push(column);
            weights.push(weight);
        }

        let prev_len: usize = tokens.parse("previous winner count")?;
        let mut prev_winners = Vec::with_capacity(rows.max(prev_len));
        for _ in 0..prev_len {
            let row: u32 = tokens.parse("previous winner row")?;
            if row as usize >= rows {
                return Err(PoolerError::MalformedToken {
                    token: row.to_string(),
                    expected: "previous winner row < rows",
                });
            }
            prev_winners.push(row);
        }

        Ok(Pooler {
            matrix: CoincidenceMatrix::from_parts(
                rows,
                cols,
                entries_per_row,
                indices,
                weights,
                boundary,
            ),
            output_sparsity,
            stimulus_threshold,
            histogram_threshold,
            normalization_target,
            normalization_period,
            hysteresis,
            replicas,
            iteration,
            prev_winners,
            captured: Vec::new(),
        })
    }

    /// The whole matrix in the interchange form: every row emits all of
    /// its entries.
    pub fn export_matrix(&self) -> String {
        self.export_interchange(false)
    }

    /// The matrix in the interchange form, truncated to relevance: every
    /// row emits only its relevant prefix, and the header nonzero count
    /// reflects what is actually emitted.
    pub fn export_relevant_matrix(&self) -> String {
        self.export_interchange(true)
    }

    fn export_interchange(&self, relevant_only: bool) -> String {
        let m = &self.matrix;
        let total: usize = if relevant_only {
            m.boundary.iter().sum()
        } else {
            m.rows * m.entries_per_row
        };

        let mut payload = String::new();
        let _ = write!(payload, "{} {} {} ", m.rows, m.cols, total);

        for row in 0..m.rows {
            let count = if relevant_only {
                m.boundary[row]
            } else {
                m.entries_per_row
            };
            let _ = write!(payload, "{} ", count);

            let mut pairs: Vec<(u32, f32)> = m.row_indices(row)[..count]
                .iter()
                .copied()
                .zip(m.row_weights(row)[..count].iter().copied())
                .collect();
            pairs.sort_unstable_by_key(|&(column, _)| column);
            for (column, weight) in pairs {
                let _ = write!(payload, "{} {} ", column, weight);
            }
        }

        format!("{} {} {}", INTERCHANGE_TAG, payload.len(), payload)
    }

    /// Replace the matrix from an interchange-form dump.
    ///
    /// The dump's row/column/arity figures override the current
    /// configuration. Every row must carry the same entry count as the
    /// first row; boundaries are reset to the full arity (nothing is
    /// excluded from relevance) and the previous-winners buffer is
    /// cleared. The histogram threshold fixed at construction is kept.
    /// On any decode error the pooler is unchanged.
    pub fn load_matrix(&mut self, text: &str) -> Result<()> {
        let mut tokens = Tokens::new(text);

        let tag = tokens.next("format tag")?;
        if tag != INTERCHANGE_TAG && tag != LEGACY_TAG {
            return Err(PoolerError::UnknownTag(tag.to_string()));
        }

        // Payload byte length is carried for the scripting layer's
        // benefit; it is not needed to decode.
        let _bytes: usize = tokens.parse("payload byte length")?;
        let rows: usize = tokens.parse("row count")?;
        let cols: usize = tokens.parse("column count")?;
        let nnz: usize = tokens.parse("nonzero count")?;

        let mut entries_per_row = 0;
        let mut indices = Vec::with_capacity(nnz);
        let mut weights = Vec::with_capacity(nnz);

        for row in 0..rows {
            let count: usize = tokens.parse("row entry count")?;
            if row == 0 {
                entries_per_row = count;
            } else if count != entries_per_row {
                return Err(PoolerError::RowArity {
                    row,
                    expected: entries_per_row,
                    got: count,
                });
            }

            for _ in 0..count {
                let column: u32 = tokens.parse("column index")?;
                let weight: f32 = tokens.parse("weight")?;
                if column as usize >= cols {
                    return Err(PoolerError::ColumnOutOfRange { row, column, cols });
                }
                indices.push(column);
                weights.push(weight);
            }
        }

        if indices.len() != nnz {
            return Err(PoolerError::NonzeroCount {
                header: nnz,
                actual: indices.len(),
            });
        }

        self.matrix = CoincidenceMatrix::from_parts(
            rows,
            cols,
            entries_per_row,
            indices,
            weights,
            vec![entries_per_row; rows],
        );
        self.prev_winners.clear();
        if !self.captured.is_empty() {
            self.captured = vec![vec![0.0; rows]; self.replicas];
        }
        Ok(())
    }
}
