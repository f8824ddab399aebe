//! Configuration file support for aggregation runs.
//!
//! Allows loading run configurations from TOML files for reproducibility.

use crate::data::{DataConfig, DEFAULT_BATCH_SIZE};
use crate::engine::EngineConfig;
use crate::error::{AggregationError, Result};
use crate::merge::MergePolicy;
use crate::types::ResampleFrequency;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Complete run configuration loaded from a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineFileConfig {
    /// Aggregation settings.
    #[serde(default)]
    pub engine: EngineSettings,
    /// Checkpoint settings.
    #[serde(default)]
    pub checkpoint: CheckpointSettings,
    /// Input settings.
    #[serde(default)]
    pub data: DataSettings,
    /// Output settings.
    #[serde(default)]
    pub output: OutputSettings,
}

/// Aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Frequency code: "W", "W-WED", "M", ...
    #[serde(default = "default_frequency")]
    pub frequency: String,
    /// Days per window. Defaults to the frequency's span when unset.
    #[serde(default)]
    pub window_span_days: Option<i64>,
    /// "sum" or "reject".
    #[serde(default)]
    pub merge_policy: MergePolicy,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub drop_zero_series: bool,
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

fn default_frequency() -> String { "W".to_string() }
fn default_true() -> bool { true }

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            frequency: "W".to_string(),
            window_span_days: None,
            merge_policy: MergePolicy::Sum,
            parallel: false,
            drop_zero_series: false,
            show_progress: true,
        }
    }
}

/// Checkpoint settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Checkpoint file; `.json` selects JSON, anything else CSV.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Input settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSettings {
    /// Path to the long-format CSV file.
    pub path: Option<PathBuf>,
    /// Date format in CSV.
    pub date_format: Option<String>,
    /// CSV delimiter. Auto-detected when unset.
    pub delimiter: Option<char>,
    #[serde(default = "default_true")]
    pub has_headers: bool,
    #[serde(default)]
    pub decimal_comma: bool,
    #[serde(default)]
    pub skip_invalid: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize { DEFAULT_BATCH_SIZE }

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            path: None,
            date_format: None,
            delimiter: None,
            has_headers: true,
            decimal_comma: false,
            skip_invalid: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Where to write the final matrix.
    pub path: Option<PathBuf>,
    /// Where to write the JSON run report.
    pub report_path: Option<PathBuf>,
}

impl EngineFileConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: EngineFileConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Convert to a validated EngineConfig.
    pub fn to_engine_config(&self) -> Result<EngineConfig> {
        let frequency: ResampleFrequency = self.engine.frequency.parse()?;

        let config = EngineConfig {
            frequency,
            window_span_days: self
                .engine
                .window_span_days
                .unwrap_or_else(|| frequency.default_window_span()),
            checkpoint_enabled: self.checkpoint.enabled,
            checkpoint_path: self.checkpoint.path.clone(),
            merge_policy: self.engine.merge_policy,
            parallel: self.engine.parallel,
            drop_zero_series: self.engine.drop_zero_series,
            show_progress: self.engine.show_progress,
        };
        config.validate()?;
        Ok(config)
    }

    /// Convert to the CSV reader settings.
    pub fn to_data_config(&self) -> Result<DataConfig> {
        let delimiter = match self.data.delimiter {
            None => None,
            Some(c) if c.is_ascii() => Some(c as u8),
            Some(c) => {
                return Err(AggregationError::ConfigError(format!(
                    "Delimiter must be a single ASCII character, got '{}'",
                    c
                )))
            }
        };
        if self.data.batch_size == 0 {
            return Err(AggregationError::ConfigError(
                "batch_size must be positive".to_string(),
            ));
        }

        Ok(DataConfig {
            date_format: self.data.date_format.clone(),
            has_headers: self.data.has_headers,
            delimiter,
            decimal_comma: self.data.decimal_comma,
            skip_invalid: self.data.skip_invalid,
            batch_size: self.data.batch_size,
        })
    }

    /// Generate an example configuration file content.
    pub fn example() -> String {
        r#"# salesgrid configuration file
# Aggregates long-format sales records into a series x period matrix

[engine]
frequency = "W"          # W, W-MON..W-SUN, M
# window_span_days = 14  # defaults to 14 for weekly, 59 for monthly
merge_policy = "sum"     # sum | reject
parallel = false
drop_zero_series = false
show_progress = true

[checkpoint]
enabled = false
# path = "out/checkpoint.csv"

[data]
path = "data/sales.csv"
# date_format = "%Y-%m-%d"
# delimiter = ","
has_headers = true
decimal_comma = false
skip_invalid = false
batch_size = 100000

[output]
path = "out/matrix.csv"
# report_path = "out/report.json"
"#
        .to_string()
    }
}
