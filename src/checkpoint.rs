//! Durable snapshots of the running matrix.
//!
//! Checkpointing is a hook the engine calls after each merged window. A
//! failed write never invalidates the in-memory result, so implementations
//! report failures as [`AggregationError::CheckpointError`] and the engine
//! carries on.

use crate::error::{AggregationError, Result};
use crate::export::{write_matrix_csv, write_matrix_json, MatrixFormat};
use crate::matrix::SeriesMatrix;
use crate::types::Window;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Persists a matrix snapshot to `location`, replacing any earlier one.
pub trait Checkpointer: Send + Sync {
    fn persist(&self, matrix: &SeriesMatrix, location: &Path) -> Result<()>;
}

/// Writes checkpoints as matrix files (CSV or JSON, by extension).
///
/// The snapshot is written next to the target and renamed over it, so a
/// crash mid-write leaves the previous checkpoint intact.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCheckpointer;

impl FileCheckpointer {
    fn staging_path(location: &Path) -> PathBuf {
        let mut name = location
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".partial");
        location.with_file_name(name)
    }
}

impl Checkpointer for FileCheckpointer {
    fn persist(&self, matrix: &SeriesMatrix, location: &Path) -> Result<()> {
        let wrap = |e: AggregationError| {
            AggregationError::CheckpointError(format!("{}: {}", location.display(), e))
        };

        if let Some(parent) = location.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| wrap(e.into()))?;
        }

        let staging = Self::staging_path(location);
        let written = match MatrixFormat::from_path(location) {
            MatrixFormat::Csv => write_matrix_csv(matrix, &staging),
            MatrixFormat::Json => write_matrix_json(matrix, &staging),
        }
        .and_then(|_| std::fs::rename(&staging, location).map_err(AggregationError::from));

        if let Err(e) = written {
            let _ = std::fs::remove_file(&staging);
            return Err(wrap(e));
        }

        debug!(
            "Checkpointed {} series x {} periods to {}",
            matrix.n_series(),
            matrix.n_columns(),
            location.display()
        );
        Ok(())
    }
}

/// A checkpoint write that failed during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointFailure {
    pub window: Window,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::read_matrix;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn sample_matrix(value: f64) -> SeriesMatrix {
        let mut matrix = SeriesMatrix::new();
        matrix.add("A", NaiveDate::from_ymd_opt(2020, 1, 6).unwrap(), value);
        matrix
    }

    #[test]
    fn test_persist_overwrites_previous_checkpoint() {
        let dir = TempDir::new().unwrap();
        let location = dir.path().join("ckpt").join("matrix.csv");

        FileCheckpointer.persist(&sample_matrix(1.0), &location).unwrap();
        FileCheckpointer.persist(&sample_matrix(2.0), &location).unwrap();

        assert_eq!(read_matrix(&location).unwrap(), sample_matrix(2.0));
        // No staging file left behind
        let entries = std::fs::read_dir(dir.path().join("ckpt")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_persist_json() {
        let dir = TempDir::new().unwrap();
        let location = dir.path().join("matrix.json");
        FileCheckpointer.persist(&sample_matrix(4.0), &location).unwrap();
        assert_eq!(read_matrix(&location).unwrap(), sample_matrix(4.0));
    }

    #[test]
    fn test_persist_failure_is_checkpoint_error() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be replaced by a file
        let location = dir.path().join("occupied.csv");
        std::fs::create_dir_all(location.join("child")).unwrap();

        let err = FileCheckpointer.persist(&sample_matrix(1.0), &location).unwrap_err();
        assert!(matches!(err, AggregationError::CheckpointError(_)));
        assert!(!err.is_fatal());
    }
}
