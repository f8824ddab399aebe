//! Reading and writing series matrices.
//!
//! The same readers load final outputs and checkpoints.
//!
//! # Supported Formats
//!
//! | Format | Layout |
//! |--------|--------|
//! | CSV | Wide table: `unique_id` then one ISO date column per period; absent cells empty |
//! | JSON | Serialized [`SeriesMatrix`] |

use crate::data::parse_date;
use crate::error::{AggregationError, Result};
use crate::matrix::SeriesMatrix;
use csv::{ReaderBuilder, WriterBuilder};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Header of the id column in wide CSV output.
pub const ID_COLUMN: &str = "unique_id";

/// Serialization format for a matrix file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixFormat {
    Csv,
    Json,
}

impl MatrixFormat {
    /// Pick the format from the file extension; anything but `.json` is CSV.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        match path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("json") => MatrixFormat::Json,
            _ => MatrixFormat::Csv,
        }
    }
}

/// Write a matrix in the format implied by `path`.
pub fn write_matrix(matrix: &SeriesMatrix, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match MatrixFormat::from_path(path) {
        MatrixFormat::Csv => write_matrix_csv(matrix, path),
        MatrixFormat::Json => write_matrix_json(matrix, path),
    }
}

/// Read a matrix in the format implied by `path`.
pub fn read_matrix(path: impl AsRef<Path>) -> Result<SeriesMatrix> {
    let path = path.as_ref();
    match MatrixFormat::from_path(path) {
        MatrixFormat::Csv => read_matrix_csv(path),
        MatrixFormat::Json => read_matrix_json(path),
    }
}

/// Write the wide CSV layout to any writer.
pub fn write_matrix_csv_to<W: Write>(matrix: &SeriesMatrix, writer: W) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(writer);

    let mut header = Vec::with_capacity(matrix.n_columns() + 1);
    header.push(ID_COLUMN.to_string());
    header.extend(matrix.columns().map(|p| p.format("%Y-%m-%d").to_string()));
    writer.write_record(&header)?;

    let columns: Vec<_> = matrix.columns().collect();
    for (unique_id, row) in matrix.rows() {
        let mut record = Vec::with_capacity(columns.len() + 1);
        record.push(unique_id.to_string());
        for period in &columns {
            record.push(row.get(period).map(|v| v.to_string()).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write the wide CSV layout to a file.
pub fn write_matrix_csv(matrix: &SeriesMatrix, path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path)?;
    write_matrix_csv_to(matrix, BufWriter::new(file))
}

/// Render the wide CSV layout as a string.
pub fn matrix_to_csv_string(matrix: &SeriesMatrix) -> Result<String> {
    let mut buffer = Vec::new();
    write_matrix_csv_to(matrix, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| AggregationError::DataError(e.to_string()))
}

/// Read the wide CSV layout from any reader.
pub fn read_matrix_csv_from<R: Read>(reader: R) -> Result<SeriesMatrix> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);

    let headers = reader.headers()?.clone();
    if headers.get(0) != Some(ID_COLUMN) {
        return Err(AggregationError::DataError(format!(
            "Matrix header must start with '{}'",
            ID_COLUMN
        )));
    }
    let periods = headers
        .iter()
        .skip(1)
        .map(|h| parse_date(h, Some("%Y-%m-%d")))
        .collect::<Result<Vec<_>>>()?;

    let mut matrix = SeriesMatrix::new();
    for period in &periods {
        matrix.add_column(*period);
    }

    for (row_num, result) in reader.records().enumerate() {
        let record = result?;
        let unique_id = record.get(0).unwrap_or_default();
        matrix.add_series(unique_id);

        for (period, field) in periods.iter().zip(record.iter().skip(1)) {
            if field.trim().is_empty() {
                continue;
            }
            let value: f64 = field.trim().parse().map_err(|_| {
                AggregationError::DataError(format!(
                    "Invalid value '{}' in row {} for period {}",
                    field,
                    row_num + 1,
                    period
                ))
            })?;
            matrix.add(unique_id, *period, value);
        }
    }

    Ok(matrix)
}

/// Read the wide CSV layout from a file.
pub fn read_matrix_csv(path: impl AsRef<Path>) -> Result<SeriesMatrix> {
    let file = File::open(path)?;
    read_matrix_csv_from(BufReader::new(file))
}

/// Write a matrix as JSON.
pub fn write_matrix_json(matrix: &SeriesMatrix, path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, matrix)?;
    writer.flush()?;
    Ok(())
}

/// Read a matrix written by [`write_matrix_json`].
pub fn read_matrix_json(path: impl AsRef<Path>) -> Result<SeriesMatrix> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
