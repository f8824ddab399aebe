//! Windowed aggregation engine.
//!
//! The engine makes one pass over the source to find the observed date
//! range, splits it into windows, and then for each window scans the source,
//! aggregates the window's records, merges the result into the running
//! matrix and optionally checkpoints it.
//!
//! In parallel mode windows are aggregated in groups of one window per
//! worker thread. Each group is merged and checkpointed in window order
//! before the next group starts, so at most one group of window results is
//! held at a time.

use crate::aggregate::{WindowAggregator, WindowMatrix};
use crate::checkpoint::{CheckpointFailure, Checkpointer, FileCheckpointer};
use crate::data::{MemorySource, RecordSource};
use crate::error::{AggregationError, Result};
use crate::matrix::SeriesMatrix;
use crate::merge::{Accumulator, MatrixMerger, MergePolicy};
use crate::metadata::{compute_config_hash, generate_run_id};
use crate::types::{Record, ResampleFrequency, Window};
use crate::window::WindowSegmenter;
use chrono::{DateTime, NaiveDate, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Configuration for the aggregation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Target period frequency.
    pub frequency: ResampleFrequency,
    /// Days per processing window. Larger windows mean fewer passes over the
    /// source and more memory per pass.
    pub window_span_days: i64,
    /// Persist the running matrix after each window.
    pub checkpoint_enabled: bool,
    /// Checkpoint location; the extension selects CSV or JSON.
    pub checkpoint_path: Option<PathBuf>,
    /// Handling of period columns produced by two windows.
    #[serde(default)]
    pub merge_policy: MergePolicy,
    /// Aggregate windows on the rayon pool; merges stay in window order.
    #[serde(default)]
    pub parallel: bool,
    /// Drop series whose cells are all zero from the final matrix.
    #[serde(default)]
    pub drop_zero_series: bool,
    /// Show progress bar while processing windows.
    #[serde(default)]
    pub show_progress: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let frequency = ResampleFrequency::default();
        Self {
            frequency,
            window_span_days: frequency.default_window_span(),
            checkpoint_enabled: false,
            checkpoint_path: None,
            merge_policy: MergePolicy::Sum,
            parallel: false,
            drop_zero_series: false,
            show_progress: false,
        }
    }
}

impl EngineConfig {
    /// Configuration for `frequency` with its default window span.
    pub fn new(frequency: ResampleFrequency) -> Self {
        Self {
            frequency,
            window_span_days: frequency.default_window_span(),
            ..Default::default()
        }
    }

    /// Enable checkpointing to `path`.
    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_enabled = true;
        self.checkpoint_path = Some(path.into());
        self
    }

    /// Check the settings that can be rejected before reading any data.
    pub fn validate(&self) -> Result<()> {
        if self.window_span_days <= 0 {
            return Err(AggregationError::ConfigError(format!(
                "window_span_days must be positive, got {}",
                self.window_span_days
            )));
        }
        if self.window_span_days == 1 {
            return Err(AggregationError::ConfigError(
                "window_span_days must be at least 2".to_string(),
            ));
        }
        if self.checkpoint_enabled && self.checkpoint_path.is_none() {
            return Err(AggregationError::ConfigError(
                "checkpoint_enabled requires checkpoint_path".to_string(),
            ));
        }
        Ok(())
    }
}

/// Totals from the first pass over a source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub records: usize,
    pub total: f64,
    pub min_date: NaiveDate,
    pub max_date: NaiveDate,
}

impl SourceSummary {
    /// Scan `source` once for its record count, value total and date range.
    pub fn scan<S: RecordSource + ?Sized>(source: &S) -> Result<Self> {
        let mut records = 0usize;
        let mut total = 0.0;
        let mut range: Option<(NaiveDate, NaiveDate)> = None;

        for batch in source.scan()? {
            for record in &batch? {
                records += 1;
                total += record.y;
                range = Some(match range {
                    None => (record.date, record.date),
                    Some((lo, hi)) => (lo.min(record.date), hi.max(record.date)),
                });
            }
        }

        let (min_date, max_date) = range.ok_or(AggregationError::NoData)?;
        Ok(Self {
            records,
            total,
            min_date,
            max_date,
        })
    }
}

/// What happened during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// SHA256 of the engine configuration.
    pub config_hash: String,
    /// SHA256 of the input file, for file-backed sources.
    #[serde(default)]
    pub input_checksum: Option<String>,
    pub frequency: ResampleFrequency,
    pub window_span_days: i64,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub windows_processed: usize,
    pub records_read: usize,
    /// Sum of `y` over the input.
    pub input_total: f64,
    /// Sum over every cell of the output.
    pub matrix_total: f64,
    pub series: usize,
    pub periods: usize,
    pub dropped_zero_series: usize,
    /// Window after which the last successful checkpoint was written.
    pub last_checkpoint: Option<Window>,
    pub checkpoint_failures: Vec<CheckpointFailure>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl RunReport {
    /// Absolute difference between input and output totals.
    pub fn conservation_gap(&self) -> f64 {
        (self.matrix_total - self.input_total).abs()
    }
}

/// Output of a run.
#[derive(Debug, Clone)]
pub struct AggregationResult {
    pub matrix: SeriesMatrix,
    pub report: RunReport,
}

#[derive(Default)]
struct CheckpointLog {
    last: Option<Window>,
    failures: Vec<CheckpointFailure>,
}

/// Windowed aggregation engine.
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    /// Create a new engine with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Aggregate an in-memory record set.
    pub fn run_records(&self, records: Vec<Record>) -> Result<AggregationResult> {
        self.run(&MemorySource::new(records))
    }

    /// Aggregate `source`, checkpointing to files when enabled.
    pub fn run<S>(&self, source: &S) -> Result<AggregationResult>
    where
        S: RecordSource + ?Sized,
    {
        self.run_with_checkpointer(source, &FileCheckpointer)
    }

    /// Aggregate `source` using a custom checkpoint hook.
    pub fn run_with_checkpointer<S, C>(&self, source: &S, checkpointer: &C) -> Result<AggregationResult>
    where
        S: RecordSource + ?Sized,
        C: Checkpointer + ?Sized,
    {
        self.config.validate()?;
        let started = Instant::now();
        let started_at = Utc::now();

        let summary = SourceSummary::scan(source)?;
        info!(
            "Aggregating {} records from {} ({} to {}) at {}",
            summary.records,
            source.describe(),
            summary.min_date,
            summary.max_date,
            self.config.frequency
        );

        // The lower bound is exclusive, so start one day early
        let before_first = summary.min_date.pred_opt().ok_or_else(|| {
            AggregationError::DataIntegrity(format!(
                "earliest date {} leaves no room for a window start",
                summary.min_date
            ))
        })?;
        if self.config.frequency.checked_period_start(summary.min_date).is_none() {
            return Err(AggregationError::DataIntegrity(format!(
                "period containing {} starts before the supported date range",
                summary.min_date
            )));
        }
        let segmenter = WindowSegmenter::new(
            before_first,
            summary.max_date,
            self.config.window_span_days,
        )?;
        let windows: Vec<Window> = segmenter.iter().collect();
        info!(
            "Processing {} windows of {} days",
            windows.len(),
            self.config.window_span_days
        );

        let aggregator = WindowAggregator::new(self.config.frequency);
        let merger = MatrixMerger::new(self.config.merge_policy);
        let progress = self.progress_bar(windows.len());
        let mut checkpoints = CheckpointLog::default();
        let mut acc = Accumulator::new();

        if self.config.parallel {
            let group_size = rayon::current_num_threads().max(1);
            for group in windows.chunks(group_size) {
                let parts = group
                    .par_iter()
                    .map(|window| aggregator.aggregate_source(source, *window))
                    .collect::<Result<Vec<WindowMatrix>>>()?;
                for part in parts {
                    acc = self.absorb(&merger, acc, part, checkpointer, &mut checkpoints)?;
                    if let Some(pb) = &progress {
                        pb.inc(1);
                    }
                }
            }
        } else {
            for window in &windows {
                let part = aggregator.aggregate_source(source, *window)?;
                acc = self.absorb(&merger, acc, part, checkpointer, &mut checkpoints)?;
                if let Some(pb) = &progress {
                    pb.inc(1);
                }
            }
        }

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        if acc.records_merged() != summary.records {
            return Err(AggregationError::DataIntegrity(format!(
                "{} of {} records fell outside every window",
                summary.records.abs_diff(acc.records_merged()),
                summary.records
            )));
        }

        let input_checksum = source.checksum()?;
        let windows_processed = acc.windows_merged();
        let mut matrix = acc.into_matrix();
        let dropped_zero_series = if self.config.drop_zero_series {
            let dropped = matrix.drop_all_zero_series();
            if dropped > 0 {
                info!("Dropped {} all-zero series", dropped);
            }
            dropped
        } else {
            0
        };

        let report = RunReport {
            run_id: generate_run_id(),
            config_hash: compute_config_hash(&self.config),
            input_checksum,
            frequency: self.config.frequency,
            window_span_days: self.config.window_span_days,
            first_date: summary.min_date,
            last_date: summary.max_date,
            windows_processed,
            records_read: summary.records,
            input_total: summary.total,
            matrix_total: matrix.total(),
            series: matrix.n_series(),
            periods: matrix.n_columns(),
            dropped_zero_series,
            last_checkpoint: checkpoints.last,
            checkpoint_failures: checkpoints.failures,
            started_at,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        if !report.checkpoint_failures.is_empty() {
            warn!(
                "{} checkpoint writes failed; last good checkpoint: {}",
                report.checkpoint_failures.len(),
                report
                    .last_checkpoint
                    .map(|w| w.to_string())
                    .unwrap_or_else(|| "none".to_string())
            );
        }
        info!(
            "Built {} series x {} periods in {} ms",
            report.series, report.periods, report.elapsed_ms
        );

        Ok(AggregationResult { matrix, report })
    }

    /// Merge one window result and checkpoint the running matrix.
    fn absorb<C: Checkpointer + ?Sized>(
        &self,
        merger: &MatrixMerger,
        acc: Accumulator,
        part: WindowMatrix,
        checkpointer: &C,
        checkpoints: &mut CheckpointLog,
    ) -> Result<Accumulator> {
        let window = part.window;
        let acc = merger.merge(acc, part)?;
        debug!(
            "Merged window {}: {} series x {} periods so far",
            window,
            acc.matrix().n_series(),
            acc.matrix().n_columns()
        );

        if let (true, Some(path)) = (self.config.checkpoint_enabled, &self.config.checkpoint_path) {
            match checkpointer.persist(acc.matrix(), path) {
                Ok(()) => checkpoints.last = Some(window),
                Err(e) => {
                    warn!("Checkpoint after window {} failed: {}", window, e);
                    checkpoints.failures.push(CheckpointFailure {
                        window,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(acc)
    }

    fn progress_bar(&self, len: usize) -> Option<ProgressBar> {
        if !self.config.show_progress {
            return None;
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} windows ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Some(pb)
    }
}
