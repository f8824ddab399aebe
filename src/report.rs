//! Terminal and JSON reporting for aggregation runs and matrices.

use crate::engine::{AggregationResult, RunReport};
use crate::matrix::SeriesMatrix;
use chrono::NaiveDate;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{builder::Builder, settings::Style};

/// Shape and fill statistics of a matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixSummary {
    pub series: usize,
    pub periods: usize,
    pub cells: usize,
    /// Share of present cells over `series * periods`.
    pub fill_ratio: f64,
    pub total: f64,
    pub first_period: Option<NaiveDate>,
    pub last_period: Option<NaiveDate>,
}

impl MatrixSummary {
    pub fn from_matrix(matrix: &SeriesMatrix) -> Self {
        let grid = matrix.n_series() * matrix.n_columns();
        let range = matrix.period_range();
        Self {
            series: matrix.n_series(),
            periods: matrix.n_columns(),
            cells: matrix.cell_count(),
            fill_ratio: if grid == 0 {
                0.0
            } else {
                matrix.cell_count() as f64 / grid as f64
            },
            total: matrix.total(),
            first_period: range.map(|(first, _)| first),
            last_period: range.map(|(_, last)| last),
        }
    }
}

/// Format results for terminal display.
pub struct ResultFormatter;

impl ResultFormatter {
    /// Print a run report to stdout.
    pub fn print_report(result: &AggregationResult) {
        let report = &result.report;

        println!();
        println!("{}", "═".repeat(60).blue());
        println!("{}", " AGGREGATION RESULTS ".bold().blue());
        println!("{}", "═".repeat(60).blue());
        println!();

        println!("{}", "Run".bold().underline());
        println!("  Run ID:          {}", report.run_id);
        println!("  Config Hash:     {}", &report.config_hash[..report.config_hash.len().min(16)]);
        if let Some(checksum) = &report.input_checksum {
            println!("  Input SHA256:    {}", &checksum[..checksum.len().min(16)]);
        }
        println!("  Frequency:       {}", report.frequency);
        println!("  Window Span:     {} days", report.window_span_days);
        println!(
            "  Input Dates:     {} to {}",
            report.first_date, report.last_date
        );
        println!("  Elapsed:         {} ms", report.elapsed_ms);
        println!();

        println!("{}", "Processing".bold().underline());
        println!("  Windows:         {:>12}", report.windows_processed);
        println!("  Records Read:    {:>12}", report.records_read);
        println!("  Input Total:     {:>12.2}", report.input_total);
        println!(
            "  Matrix Total:    {:>12.2}  {}",
            report.matrix_total,
            Self::format_gap(report)
        );
        println!();

        let summary = MatrixSummary::from_matrix(&result.matrix);
        Self::print_summary(&summary);
        if report.dropped_zero_series > 0 {
            println!("  Dropped Zero:    {:>12}", report.dropped_zero_series);
        }
        println!();

        println!("{}", "Checkpoints".bold().underline());
        match report.last_checkpoint {
            Some(window) => println!("  Last Written:    after window {}", window),
            None => println!("  Last Written:    none"),
        }
        if report.checkpoint_failures.is_empty() {
            println!("  Failures:        {:>12}", 0);
        } else {
            println!(
                "  Failures:        {:>12}",
                report.checkpoint_failures.len().to_string().yellow()
            );
            for failure in &report.checkpoint_failures {
                println!("    {} {}", failure.window, failure.message.yellow());
            }
        }
        println!();

        println!("{}", "═".repeat(60).blue());
    }

    /// Print matrix shape statistics.
    pub fn print_summary(summary: &MatrixSummary) {
        println!("{}", "Matrix".bold().underline());
        println!("  Series:          {:>12}", summary.series);
        println!("  Periods:         {:>12}", summary.periods);
        println!(
            "  Cells:           {:>12}  ({:.1}% filled)",
            summary.cells,
            summary.fill_ratio * 100.0
        );
        println!("  Total:           {:>12.2}", summary.total);
        if let (Some(first), Some(last)) = (summary.first_period, summary.last_period) {
            println!("  Periods:         {} to {}", first, last);
        }
    }

    fn format_gap(report: &RunReport) -> String {
        let gap = report.conservation_gap();
        if gap <= 1e-6 * report.input_total.abs().max(1.0) {
            "(conserved)".green().to_string()
        } else {
            format!("(gap {:.6})", gap).red().to_string()
        }
    }

    /// Render the first `rows` series and the last `columns` periods as a table.
    pub fn preview_table(matrix: &SeriesMatrix, rows: usize, columns: usize) -> String {
        let periods: Vec<NaiveDate> = matrix.columns().collect();
        let shown = &periods[periods.len().saturating_sub(columns)..];

        let mut builder = Builder::new();
        let mut header = vec!["unique_id".to_string()];
        if shown.len() < periods.len() {
            header.push("…".to_string());
        }
        header.extend(shown.iter().map(|p| p.to_string()));
        builder.push_record(header);

        for (unique_id, row) in matrix.rows().take(rows) {
            let mut record = vec![unique_id.to_string()];
            if shown.len() < periods.len() {
                record.push("…".to_string());
            }
            record.extend(
                shown
                    .iter()
                    .map(|p| row.get(p).map(|v| format!("{:.2}", v)).unwrap_or_default()),
            );
            builder.push_record(record);
        }

        builder.build().with(Style::rounded()).to_string()
    }

    /// Print a preview of the matrix.
    pub fn print_preview(matrix: &SeriesMatrix, rows: usize, columns: usize) {
        println!("{}", Self::preview_table(matrix, rows, columns));
        if rows < matrix.n_series() {
            println!("... and {} more series", matrix.n_series() - rows);
        }
    }

    /// Export a run report to JSON.
    pub fn to_json(report: &RunReport) -> String {
        serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
    }
}
