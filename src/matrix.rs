//! Sparse series-by-period matrix.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Aggregated values keyed by series id and period start.
///
/// Cells that never received a value are absent, which is distinct from an
/// explicit zero. Rows and columns are kept in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesMatrix {
    rows: BTreeMap<String, BTreeMap<NaiveDate, f64>>,
    columns: BTreeSet<NaiveDate>,
}

impl SeriesMatrix {
    /// Create an empty matrix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` to the cell at (`unique_id`, `period`), creating it if absent.
    pub fn add(&mut self, unique_id: &str, period: NaiveDate, value: f64) {
        self.add_series(unique_id);
        if let Some(row) = self.rows.get_mut(unique_id) {
            *row.entry(period).or_insert(0.0) += value;
        }
        self.columns.insert(period);
    }

    /// Register a column without any cells.
    pub fn add_column(&mut self, period: NaiveDate) {
        self.columns.insert(period);
    }

    /// Register a series without any cells.
    pub fn add_series(&mut self, unique_id: &str) {
        if !self.rows.contains_key(unique_id) {
            self.rows.insert(unique_id.to_string(), BTreeMap::new());
        }
    }

    /// Value of a cell, or None when the series had no activity in the period.
    pub fn get(&self, unique_id: &str, period: NaiveDate) -> Option<f64> {
        self.rows.get(unique_id)?.get(&period).copied()
    }

    /// All cells of one series.
    pub fn row(&self, unique_id: &str) -> Option<&BTreeMap<NaiveDate, f64>> {
        self.rows.get(unique_id)
    }

    /// Iterate over rows in id order.
    pub fn rows(&self) -> impl Iterator<Item = (&str, &BTreeMap<NaiveDate, f64>)> {
        self.rows.iter().map(|(id, row)| (id.as_str(), row))
    }

    /// Consume the matrix into its rows.
    pub fn into_rows(self) -> BTreeMap<String, BTreeMap<NaiveDate, f64>> {
        self.rows
    }

    /// Series ids in ascending order.
    pub fn series_ids(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// Period columns in ascending order.
    pub fn columns(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.columns.iter().copied()
    }

    pub fn contains_column(&self, period: NaiveDate) -> bool {
        self.columns.contains(&period)
    }

    pub fn n_series(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of non-absent cells.
    pub fn cell_count(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum over every cell.
    pub fn total(&self) -> f64 {
        self.rows.values().flat_map(|row| row.values()).sum()
    }

    /// Sum over one series.
    pub fn series_total(&self, unique_id: &str) -> Option<f64> {
        self.rows.get(unique_id).map(|row| row.values().sum())
    }

    /// Remove series whose cells are all zero (or that have no cells).
    ///
    /// Columns left without any cell are removed as well. Returns the number
    /// of series dropped.
    pub fn drop_all_zero_series(&mut self) -> usize {
        let before = self.rows.len();
        self.rows.retain(|_, row| row.values().any(|v| *v != 0.0));
        let dropped = before - self.rows.len();
        if dropped > 0 {
            self.columns = self
                .rows
                .values()
                .flat_map(|row| row.keys().copied())
                .collect();
        }
        dropped
    }

    /// First and last period, if any.
    pub fn period_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((*self.columns.first()?, *self.columns.last()?))
    }
}
