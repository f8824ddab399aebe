//! Salesgrid - memory-bounded temporal aggregation of sales records.
//!
//! # Overview
//!
//! Salesgrid turns a long list of `(unique_id, date, y)` observations into a
//! wide matrix with one row per series and one column per period. Input is
//! processed in overlapping date windows so that only one window's daily
//! data is held in memory at a time:
//!
//! - **Windowed processing**: the date range is split into windows of a
//!   configurable span; each window is scanned, pivoted and resampled alone
//! - **Exact totals**: every record is counted in exactly one window, and
//!   periods that straddle two windows are summed when merged
//! - **Sparse output**: a series with no sales in a period has no cell,
//!   which is different from a cell holding zero
//! - **Checkpointing**: the running matrix can be persisted after every
//!   window; a failed write is reported without stopping the run
//! - **Parallel windows**: window aggregation can run on the rayon pool
//!   while merges stay in window order
//! - **Configuration files**: TOML-based configuration for reproducible runs
//!
//! # Quick Start
//!
//! ```no_run
//! use salesgrid::{
//!     data::{CsvSource, DataConfig},
//!     engine::{Engine, EngineConfig},
//!     types::ResampleFrequency,
//! };
//!
//! let source = CsvSource::open("data/sales.csv", DataConfig::default()).unwrap();
//! let engine = Engine::new(EngineConfig::new(ResampleFrequency::Monthly));
//! let result = engine.run(&source).unwrap();
//!
//! println!("{} series x {} periods", result.matrix.n_series(), result.matrix.n_columns());
//! ```
//!
//! # Custom Sources
//!
//! Anything that can be scanned more than once can feed the engine:
//!
//! ```
//! use salesgrid::data::{RecordBatches, RecordSource};
//! use salesgrid::error::Result;
//! use salesgrid::types::Record;
//!
//! struct Fixed(Vec<Record>);
//!
//! impl RecordSource for Fixed {
//!     fn scan(&self) -> Result<RecordBatches<'_>> {
//!         Ok(Box::new(std::iter::once(Ok(self.0.clone()))))
//!     }
//!
//!     fn describe(&self) -> String {
//!         "fixed records".to_string()
//!     }
//! }
//! ```
//!
//! # Modules
//!
//! - [`types`]: Records, frequencies and windows
//! - [`window`]: Date range segmentation
//! - [`data`]: Record sources and CSV loading
//! - [`aggregate`]: Per-window pivot and resampling
//! - [`matrix`]: Sparse series x period matrix
//! - [`merge`]: Ordered merging with overlap policies
//! - [`checkpoint`]: Persisting the running matrix
//! - [`engine`]: Run orchestration and reporting
//! - [`export`]: Matrix file formats
//! - [`config`]: TOML configuration file support
//! - [`report`]: Terminal and JSON output

pub mod aggregate;
pub mod checkpoint;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod export;
pub mod matrix;
pub mod merge;
pub mod metadata;
pub mod report;
pub mod types;
pub mod window;

// Re-exports for convenience
pub use aggregate::{WindowAggregator, WindowMatrix};
pub use checkpoint::{Checkpointer, FileCheckpointer};
pub use config::EngineFileConfig;
pub use data::{CsvSource, DataConfig, MemorySource, RecordSource};
pub use engine::{AggregationResult, Engine, EngineConfig, RunReport};
pub use error::{AggregationError, Result};
pub use export::{read_matrix, write_matrix};
pub use matrix::SeriesMatrix;
pub use merge::{Accumulator, MatrixMerger, MergePolicy};
pub use report::ResultFormatter;
pub use types::{Record, ResampleFrequency, Window};
pub use window::WindowSegmenter;
