//! Record sources feeding the aggregation engine.
//!
//! A source hands out records in bounded batches and can be scanned more than
//! once: the engine makes one pass to find the date range and then one pass
//! per window, so only a single window's daily subtotals are ever resident.

use crate::error::{AggregationError, Result};
use crate::metadata::compute_file_checksum;
use crate::types::Record;
use chrono::{NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default number of records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// Batches of records produced by one scan of a source.
pub type RecordBatches<'a> = Box<dyn Iterator<Item = Result<Vec<Record>>> + 'a>;

/// A finite, re-scannable supply of normalized records.
pub trait RecordSource: Sync {
    /// Start a new pass over every record, in bounded-size batches.
    fn scan(&self) -> Result<RecordBatches<'_>>;

    /// Human-readable description for logs.
    fn describe(&self) -> String {
        "record source".to_string()
    }

    /// Content hash of the underlying input, when it has one.
    fn checksum(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Records held in memory, handed out in fixed-size batches.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<Record>,
    batch_size: usize,
}

impl MemorySource {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Use `batch_size` records per batch (at least one).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl From<Vec<Record>> for MemorySource {
    fn from(records: Vec<Record>) -> Self {
        MemorySource::new(records)
    }
}

impl RecordSource for MemorySource {
    fn scan(&self) -> Result<RecordBatches<'_>> {
        Ok(Box::new(
            self.records
                .chunks(self.batch_size.max(1))
                .map(|chunk| Ok(chunk.to_vec())),
        ))
    }

    fn describe(&self) -> String {
        format!("{} in-memory records", self.records.len())
    }
}

/// Raw CSV row with flexible column naming.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(
        alias = "id",
        alias = "ID",
        alias = "Id",
        alias = "series_id",
        alias = "item",
        alias = "Item",
        alias = "item_id"
    )]
    unique_id: String,
    #[serde(
        alias = "Date",
        alias = "DATE",
        alias = "ds",
        alias = "datum",
        alias = "Datum",
        alias = "timestamp"
    )]
    date: String,
    #[serde(
        alias = "Y",
        alias = "value",
        alias = "Value",
        alias = "sales",
        alias = "Sales",
        alias = "quantity",
        alias = "qty"
    )]
    y: String,
}

/// Settings for reading long-format `unique_id,date,y` CSV files.
#[derive(Debug, Clone)]
pub struct DataConfig {
    /// Date format string (e.g., "%Y-%m-%d"). If None, common formats are tried.
    pub date_format: Option<String>,
    /// Whether the CSV has headers.
    pub has_headers: bool,
    /// CSV delimiter character. If None, delimiter is auto-detected.
    pub delimiter: Option<u8>,
    /// Values use a comma as decimal separator (e.g., "1,5").
    pub decimal_comma: bool,
    /// Skip invalid rows instead of failing.
    pub skip_invalid: bool,
    /// Records per batch.
    pub batch_size: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            date_format: None,
            has_headers: true,
            delimiter: None,
            decimal_comma: false,
            skip_invalid: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Detect the CSV delimiter by analyzing the first few lines of the file.
///
/// Tries comma, tab, semicolon and pipe, and keeps the one producing a
/// consistent field count of at least three (id, date, value).
fn detect_delimiter(path: &Path) -> Result<u8> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let lines: Vec<String> = reader.lines().take(5).filter_map(|l| l.ok()).collect();

    if lines.is_empty() {
        return Ok(b',');
    }

    let delimiters = [b',', b'\t', b';', b'|'];

    let mut best_delimiter = b',';
    let mut best_score = 0;

    for &delim in &delimiters {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| line.as_bytes().iter().filter(|&&b| b == delim).count() + 1)
            .collect();

        let first_count = counts[0];
        let all_consistent = counts.iter().all(|&c| c == first_count);

        // Ties go to the earlier delimiter
        if all_consistent && first_count >= 3 && first_count > best_score {
            best_score = first_count;
            best_delimiter = delim;
        }
    }

    debug!(
        "Detected delimiter {:?} with score {}",
        best_delimiter as char, best_score
    );
    Ok(best_delimiter)
}

/// Parse a calendar date, trying an explicit format first and then common ones.
///
/// Time-of-day components are accepted and dropped.
pub fn parse_date(s: &str, format: Option<&str>) -> Result<NaiveDate> {
    let s = s.trim();

    if let Some(fmt) = format {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }

    let date_formats = [
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%d-%m-%Y",
        "%d/%m/%Y",
        "%d.%m.%Y",
        "%Y%m%d",
        "%d-%b-%Y",
        "%d %b %Y",
        "%b %d, %Y",
    ];

    for fmt in &date_formats {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }

    let datetime_formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%SZ",
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%d/%m/%Y %H:%M:%S",
    ];

    for fmt in &datetime_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }

    Err(AggregationError::DataError(format!(
        "Could not parse date: '{}'",
        s
    )))
}

/// Parse a numeric value, optionally with a decimal comma.
fn parse_value(s: &str, decimal_comma: bool) -> Result<f64> {
    let trimmed = s.trim();
    let parsed = if decimal_comma {
        trimmed.replace('.', "").replace(',', ".").parse::<f64>()
    } else {
        trimmed.parse::<f64>()
    };
    parsed.map_err(|_| AggregationError::DataError(format!("Could not parse value: '{}'", s)))
}

impl CsvRow {
    fn into_record(self, config: &DataConfig) -> Result<Record> {
        let date = parse_date(&self.date, config.date_format.as_deref())?;
        let y = parse_value(&self.y, config.decimal_comma)?;
        if !y.is_finite() {
            return Err(AggregationError::DataError(format!(
                "Non-finite value for '{}' on {}",
                self.unique_id, date
            )));
        }
        Ok(Record {
            unique_id: self.unique_id,
            date,
            y,
        })
    }
}

/// Long-format CSV file read lazily in batches.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    config: DataConfig,
    delimiter: u8,
}

impl CsvSource {
    /// Open a CSV source, detecting the delimiter when not configured.
    pub fn open(path: impl AsRef<Path>, config: DataConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Opening record source: {}", path.display());

        let delimiter = match config.delimiter {
            Some(d) => d,
            None => {
                let detected = detect_delimiter(&path)?;
                debug!("Auto-detected delimiter: {:?}", char::from(detected));
                detected
            }
        };

        Ok(Self {
            path,
            config,
            delimiter,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Read every record at once.
    pub fn read_all(&self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for batch in self.scan()? {
            records.extend(batch?);
        }
        if records.is_empty() {
            return Err(AggregationError::NoData);
        }
        Ok(records)
    }
}

impl RecordSource for CsvSource {
    fn scan(&self) -> Result<RecordBatches<'_>> {
        let reader = ReaderBuilder::new()
            .has_headers(self.config.has_headers)
            .delimiter(self.delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)?;

        Ok(Box::new(CsvBatches {
            rows: reader.into_deserialize(),
            config: &self.config,
            row_num: 0,
            skipped: 0,
            done: false,
        }))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn checksum(&self) -> Result<Option<String>> {
        Ok(Some(compute_file_checksum(&self.path)?))
    }
}

struct CsvBatches<'a> {
    rows: csv::DeserializeRecordsIntoIter<File, CsvRow>,
    config: &'a DataConfig,
    row_num: usize,
    skipped: usize,
    done: bool,
}

impl CsvBatches<'_> {
    fn next_record(&mut self) -> Option<Result<Record>> {
        let row = self.rows.next()?;
        self.row_num += 1;
        Some(row.map_err(AggregationError::from).and_then(|row| {
            row.into_record(self.config).map_err(|e| match e {
                AggregationError::DataError(msg) => {
                    AggregationError::DataError(format!("row {}: {}", self.row_num, msg))
                }
                other => other,
            })
        }))
    }
}

impl Iterator for CsvBatches<'_> {
    type Item = Result<Vec<Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let batch_size = self.config.batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size.min(DEFAULT_BATCH_SIZE));

        while batch.len() < batch_size {
            match self.next_record() {
                None => {
                    self.done = true;
                    if self.skipped > 0 {
                        warn!("Skipped {} invalid rows", self.skipped);
                    }
                    break;
                }
                Some(Ok(record)) => batch.push(record),
                Some(Err(e)) => {
                    if self.config.skip_invalid {
                        debug!("Skipping row {}: {}", self.row_num, e);
                        self.skipped += 1;
                    } else {
                        self.done = true;
                        return Some(Err(e));
                    }
                }
            }
        }

        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}
