//! Segmentation of a date range into fixed-span processing windows.
//!
//! Consecutive windows share one boundary date: window `k + 1` starts at
//! window `k`'s `end - 1 day`. Since both window bounds are exclusive, that
//! shared date is counted by the left window only and every date in
//! `(start_date, end_date]` belongs to exactly one window.

use crate::error::{AggregationError, Result};
use crate::types::Window;
use chrono::{Days, NaiveDate};

/// Splits `(start_date, end_date]` into contiguous windows of `span_days`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSegmenter {
    start_date: NaiveDate,
    end_date: NaiveDate,
    span_days: i64,
}

impl WindowSegmenter {
    /// Create a new segmenter.
    ///
    /// `start_date` is the exclusive lower bound of the first window, so a
    /// caller that wants its earliest record covered passes the day before it.
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, span_days: i64) -> Result<Self> {
        if span_days <= 0 {
            return Err(AggregationError::ConfigError(format!(
                "Window span must be positive, got {} days",
                span_days
            )));
        }
        if span_days == 1 {
            // (start, start + 1) holds no date and the next window would
            // start where this one did.
            return Err(AggregationError::ConfigError(
                "Window span of 1 day covers no dates; use at least 2".to_string(),
            ));
        }
        if end_date <= start_date {
            return Err(AggregationError::ConfigError(format!(
                "End date {} must be after start date {}",
                end_date, start_date
            )));
        }
        // Every window ends at most one span past end_date.
        let span = Days::new(span_days as u64);
        if end_date.checked_add_days(span).is_none() {
            return Err(AggregationError::ConfigError(format!(
                "Window span of {} days from {} exceeds the supported date range",
                span_days, end_date
            )));
        }

        Ok(Self {
            start_date,
            end_date,
            span_days,
        })
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn span_days(&self) -> i64 {
        self.span_days
    }

    /// Lazily iterate over the windows. Each call restarts from the first.
    pub fn iter(&self) -> Windows {
        Windows {
            next: Window::starting_at(0, self.start_date, self.span_days),
            end_date: self.end_date,
        }
    }

    /// Number of windows the segmenter produces.
    pub fn window_count(&self) -> usize {
        self.iter().count()
    }

}

impl<'a> IntoIterator for &'a WindowSegmenter {
    type Item = Window;
    type IntoIter = Windows;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the windows of a [`WindowSegmenter`].
#[derive(Debug, Clone)]
pub struct Windows {
    next: Option<Window>,
    end_date: NaiveDate,
}

impl Iterator for Windows {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        let current = self.next.take()?;

        // The last window is the first one whose exclusive end passes end_date.
        if current.end <= self.end_date {
            self.next = current.end.pred_opt().and_then(|start| {
                Window::starting_at(current.index + 1, start, current.span_days)
            });
        }

        Some(current)
    }
}
