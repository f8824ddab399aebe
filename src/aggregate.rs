//! Per-window aggregation: filter, daily subtotal, pivot, resample.

use crate::data::RecordSource;
use crate::error::Result;
use crate::matrix::SeriesMatrix;
use crate::types::{Record, ResampleFrequency, Window};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

/// Aggregated output of a single window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMatrix {
    pub window: Window,
    pub matrix: SeriesMatrix,
    /// Number of input records that fell inside the window.
    pub records: usize,
}

/// Daily id-by-date subtotals for one window.
///
/// Records outside the window are ignored; duplicates on the same id and day
/// are summed. Only id/date pairs that were observed get a cell.
#[derive(Debug, Clone)]
pub struct DailyPivot {
    window: Window,
    cells: BTreeMap<String, BTreeMap<NaiveDate, f64>>,
    records: usize,
}

impl DailyPivot {
    pub fn new(window: Window) -> Self {
        Self {
            window,
            cells: BTreeMap::new(),
            records: 0,
        }
    }

    /// Add a record if it falls inside the window. Returns whether it did.
    pub fn add(&mut self, record: &Record) -> bool {
        if !self.window.contains(record.date) {
            return false;
        }

        if let Some(row) = self.cells.get_mut(&record.unique_id) {
            *row.entry(record.date).or_insert(0.0) += record.y;
        } else {
            let mut row = BTreeMap::new();
            row.insert(record.date, record.y);
            self.cells.insert(record.unique_id.clone(), row);
        }
        self.records += 1;
        true
    }

    /// Number of records accepted so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Number of distinct id/day cells.
    pub fn cell_count(&self) -> usize {
        self.cells.values().map(BTreeMap::len).sum()
    }

    /// Subtotal for one id and day.
    pub fn get(&self, unique_id: &str, date: NaiveDate) -> Option<f64> {
        self.cells.get(unique_id)?.get(&date).copied()
    }

    /// Sum daily columns into period buckets.
    pub fn resample(self, frequency: ResampleFrequency) -> WindowMatrix {
        let mut matrix = SeriesMatrix::new();
        for (unique_id, row) in &self.cells {
            for (date, value) in row {
                debug_assert!(
                    self.window.contains(*date),
                    "{} outside window {}",
                    date,
                    self.window
                );
                matrix.add(unique_id, frequency.period_start(*date), *value);
            }
        }

        WindowMatrix {
            window: self.window,
            matrix,
            records: self.records,
        }
    }
}

/// Turns the records of one window into a window-local [`SeriesMatrix`].
#[derive(Debug, Clone, Copy)]
pub struct WindowAggregator {
    frequency: ResampleFrequency,
}

impl WindowAggregator {
    pub fn new(frequency: ResampleFrequency) -> Self {
        Self { frequency }
    }

    pub fn frequency(&self) -> ResampleFrequency {
        self.frequency
    }

    /// Aggregate the records of `window` from an in-memory collection.
    pub fn aggregate<'a, I>(&self, records: I, window: Window) -> WindowMatrix
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut pivot = DailyPivot::new(window);
        for record in records {
            pivot.add(record);
        }
        pivot.resample(self.frequency)
    }

    /// Aggregate the records of `window` with one scan over `source`.
    pub fn aggregate_source<S>(&self, source: &S, window: Window) -> Result<WindowMatrix>
    where
        S: RecordSource + ?Sized,
    {
        let mut pivot = DailyPivot::new(window);
        for batch in source.scan()? {
            for record in &batch? {
                pivot.add(record);
            }
        }

        debug!(
            "Window {}: {} records into {} daily cells",
            window,
            pivot.records(),
            pivot.cell_count()
        );

        Ok(pivot.resample(self.frequency))
    }
}
