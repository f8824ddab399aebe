//! Column-wise merging of window matrices into the running result.

use crate::aggregate::WindowMatrix;
use crate::error::{AggregationError, Result};
use crate::matrix::SeriesMatrix;
use crate::types::Window;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// What to do when two windows produce the same period column.
///
/// A period straddles two windows whenever window boundaries do not line up
/// with period boundaries, so overlaps are expected with `Sum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Add the overlapping cells together.
    #[default]
    Sum,
    /// Fail with an aggregation consistency error.
    Reject,
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergePolicy::Sum => write!(f, "sum"),
            MergePolicy::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for MergePolicy {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sum" => Ok(MergePolicy::Sum),
            "reject" => Ok(MergePolicy::Reject),
            other => Err(AggregationError::ConfigError(format!(
                "Unknown merge policy '{}': expected 'sum' or 'reject'",
                other
            ))),
        }
    }
}

/// Running matrix owned by the caller and moved through each merge.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    matrix: SeriesMatrix,
    /// Window that first produced each column.
    column_origin: BTreeMap<NaiveDate, Window>,
    last_window: Option<Window>,
    windows_merged: usize,
    records_merged: usize,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matrix(&self) -> &SeriesMatrix {
        &self.matrix
    }

    pub fn into_matrix(self) -> SeriesMatrix {
        self.matrix
    }

    /// Window that first produced `period`.
    pub fn origin(&self, period: NaiveDate) -> Option<Window> {
        self.column_origin.get(&period).copied()
    }

    pub fn last_window(&self) -> Option<Window> {
        self.last_window
    }

    pub fn windows_merged(&self) -> usize {
        self.windows_merged
    }

    /// Input records accounted for by the merged windows.
    pub fn records_merged(&self) -> usize {
        self.records_merged
    }
}

/// Appends window matrices to an [`Accumulator`] in window order.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatrixMerger {
    policy: MergePolicy,
}

impl MatrixMerger {
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Merge `part` into `acc` and return the updated accumulator.
    ///
    /// Windows must arrive in strictly increasing index order.
    pub fn merge(&self, mut acc: Accumulator, part: WindowMatrix) -> Result<Accumulator> {
        let window = part.window;

        if let Some(last) = acc.last_window {
            if window.index <= last.index {
                return Err(AggregationError::DataIntegrity(format!(
                    "window {} merged after window {}",
                    window, last
                )));
            }
        }

        if self.policy == MergePolicy::Reject {
            if let Some(period) = part.matrix.columns().find(|p| acc.column_origin.contains_key(p)) {
                return Err(AggregationError::AggregationConsistency {
                    period,
                    first_window: acc.column_origin[&period],
                    second_window: window,
                });
            }
        }

        for period in part.matrix.columns() {
            acc.column_origin.entry(period).or_insert(window);
        }
        for (unique_id, row) in part.matrix.into_rows() {
            acc.matrix.add_series(&unique_id);
            for (period, value) in row {
                acc.matrix.add(&unique_id, period, value);
            }
        }

        acc.last_window = Some(window);
        acc.windows_merged += 1;
        acc.records_merged += part.records;
        Ok(acc)
    }
}
