//! Command-line interface for the aggregation engine.

use salesgrid::config::EngineFileConfig;
use salesgrid::data::{CsvSource, DataConfig, DEFAULT_BATCH_SIZE};
use salesgrid::engine::{AggregationResult, Engine, EngineConfig};
use salesgrid::error::{AggregationError, Result};
use salesgrid::export::{read_matrix, write_matrix};
use salesgrid::merge::MergePolicy;
use salesgrid::report::{MatrixSummary, ResultFormatter};
use salesgrid::types::ResampleFrequency;

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Salesgrid - memory-bounded aggregation of sales records into series x period matrices.
#[derive(Parser)]
#[command(name = "salesgrid")]
#[command(version)]
#[command(about = "Aggregate long-format sales records into a wide series x period matrix")]
#[command(long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Aggregate a long-format CSV file
    Aggregate {
        /// Path to the unique_id,date,y CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Where to write the matrix (.csv or .json)
        #[arg(short, long)]
        matrix: Option<PathBuf>,

        /// Frequency: W, W-MON..W-SUN, M
        #[arg(short, long, default_value = "W")]
        frequency: String,

        /// Days per processing window (defaults to 14 weekly, 59 monthly)
        #[arg(short, long)]
        span: Option<i64>,

        /// Checkpoint the running matrix to this file after each window
        #[arg(short, long)]
        checkpoint: Option<PathBuf>,

        /// How to treat a period produced by two windows
        #[arg(long, value_enum, default_value = "sum")]
        merge_policy: MergePolicyArg,

        /// Aggregate windows in parallel
        #[arg(long)]
        parallel: bool,

        /// Drop series whose cells are all zero
        #[arg(long)]
        drop_zero_series: bool,

        /// Records per batch when scanning the file
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Date format (e.g. %Y-%m-%d); common formats are tried when omitted
        #[arg(long)]
        date_format: Option<String>,

        /// CSV delimiter; auto-detected when omitted
        #[arg(long)]
        delimiter: Option<char>,

        /// Values use a decimal comma
        #[arg(long)]
        decimal_comma: bool,

        /// Skip unparseable rows instead of failing
        #[arg(long)]
        skip_invalid: bool,

        /// Write the JSON run report to this file
        #[arg(long)]
        report: Option<PathBuf>,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Show statistics and a preview of a matrix or checkpoint file
    Inspect {
        /// Matrix file (.csv or .json)
        #[arg(short, long)]
        matrix: PathBuf,

        /// Number of series to preview
        #[arg(short, long, default_value = "10")]
        rows: usize,

        /// Number of trailing periods to preview
        #[arg(short, long, default_value = "6")]
        columns: usize,
    },

    /// Generate an example configuration file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "salesgrid.toml")]
        output: PathBuf,
    },

    /// Run an aggregation from a configuration file
    RunConfig {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum MergePolicyArg {
    /// Add overlapping period cells
    Sum,
    /// Fail when two windows produce the same period
    Reject,
}

impl From<MergePolicyArg> for MergePolicy {
    fn from(arg: MergePolicyArg) -> Self {
        match arg {
            MergePolicyArg::Sum => MergePolicy::Sum,
            MergePolicyArg::Reject => MergePolicy::Reject,
        }
    }
}

impl Cli {
    /// Initialize logging based on verbosity level.
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .finish();

        if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Failed to set tracing subscriber: {}", e);
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();
    execute(&cli)
}

fn execute(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Aggregate {
            data,
            matrix,
            frequency,
            span,
            checkpoint,
            merge_policy,
            parallel,
            drop_zero_series,
            batch_size,
            date_format,
            delimiter,
            decimal_comma,
            skip_invalid,
            report,
            no_progress,
        } => {
            let frequency: ResampleFrequency = frequency.parse()?;
            let engine_config = EngineConfig {
                frequency,
                window_span_days: span.unwrap_or_else(|| frequency.default_window_span()),
                checkpoint_enabled: checkpoint.is_some(),
                checkpoint_path: checkpoint.clone(),
                merge_policy: (*merge_policy).into(),
                parallel: *parallel,
                drop_zero_series: *drop_zero_series,
                show_progress: !*no_progress && cli.output == OutputFormat::Text,
            };
            let data_config = DataConfig {
                date_format: date_format.clone(),
                delimiter: delimiter.map(delimiter_byte).transpose()?,
                decimal_comma: *decimal_comma,
                skip_invalid: *skip_invalid,
                batch_size: *batch_size,
                ..Default::default()
            };
            run_aggregation(
                data,
                data_config,
                engine_config,
                matrix.as_deref(),
                report.as_deref(),
                cli.output,
            )
        }

        Commands::Inspect {
            matrix,
            rows,
            columns,
        } => inspect_matrix(matrix, *rows, *columns, cli.output),

        Commands::Init { output } => init_config(output),

        Commands::RunConfig { config } => run_from_config(config, cli.output),
    }
}

fn delimiter_byte(c: char) -> Result<u8> {
    if c.is_ascii() {
        Ok(c as u8)
    } else {
        Err(AggregationError::ConfigError(format!(
            "Delimiter must be a single ASCII character, got '{}'",
            c
        )))
    }
}

fn run_aggregation(
    data: &Path,
    data_config: DataConfig,
    engine_config: EngineConfig,
    matrix_path: Option<&Path>,
    report_path: Option<&Path>,
    output: OutputFormat,
) -> Result<()> {
    engine_config.validate()?;
    info!("Reading records from: {}", data.display());
    let source = CsvSource::open(data, data_config)?;

    let engine = Engine::new(engine_config);
    let result = engine.run(&source)?;

    if let Some(path) = matrix_path {
        write_matrix(&result.matrix, path)?;
        info!("Matrix written to: {}", path.display());
    }
    if let Some(path) = report_path {
        fs::write(path, ResultFormatter::to_json(&result.report))?;
        info!("Report written to: {}", path.display());
    }

    print_result(&result, output);
    Ok(())
}

fn print_result(result: &AggregationResult, output: OutputFormat) {
    match output {
        OutputFormat::Text => {
            ResultFormatter::print_report(result);
            ResultFormatter::print_preview(&result.matrix, 10, 6);
        }
        OutputFormat::Json => println!("{}", ResultFormatter::to_json(&result.report)),
    }
}

fn inspect_matrix(path: &Path, rows: usize, columns: usize, output: OutputFormat) -> Result<()> {
    let matrix = read_matrix(path)?;
    let summary = MatrixSummary::from_matrix(&matrix);

    match output {
        OutputFormat::Text => {
            println!("Matrix: {}", path.display());
            println!();
            ResultFormatter::print_summary(&summary);
            println!();
            if !matrix.is_empty() {
                ResultFormatter::print_preview(&matrix, rows, columns);
            }
        }
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string())
        ),
    }
    Ok(())
}

fn init_config(output: &Path) -> Result<()> {
    let example = EngineFileConfig::example();
    fs::write(output, example)?;
    println!("Created example configuration file: {}", output.display());
    println!("\nEdit this file to point at your data, then run:");
    println!("  salesgrid run-config -c {}", output.display());
    Ok(())
}

fn run_from_config(config_path: &Path, output: OutputFormat) -> Result<()> {
    let file_config = EngineFileConfig::load(config_path)?;
    let mut engine_config = file_config.to_engine_config()?;
    engine_config.show_progress &= output == OutputFormat::Text;
    let data_config = file_config.to_data_config()?;

    let data_path = file_config.data.path.as_deref().ok_or_else(|| {
        AggregationError::ConfigError("No data path specified in config".to_string())
    })?;

    run_aggregation(
        data_path,
        data_config,
        engine_config,
        file_config.output.path.as_deref(),
        file_config.output.report_path.as_deref(),
        output,
    )
}
