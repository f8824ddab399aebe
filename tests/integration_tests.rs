//! Integration tests for the aggregation engine.

use chrono::NaiveDate;
use salesgrid::checkpoint::FileCheckpointer;
use salesgrid::config::EngineFileConfig;
use salesgrid::data::{CsvSource, DataConfig, MemorySource, RecordSource};
use salesgrid::engine::{Engine, EngineConfig};
use salesgrid::error::AggregationError;
use salesgrid::export::{read_matrix, write_matrix};
use salesgrid::merge::MergePolicy;
use salesgrid::metadata::compute_file_checksum;
use salesgrid::types::{Record, ResampleFrequency};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Create synthetic sales: several stores over `days` days, with gaps.
fn create_synthetic_sales(days: i64, stores: usize) -> Vec<Record> {
    let start = date(2021, 1, 1);
    let mut records = Vec::new();
    for i in 0..days {
        let day = start + chrono::Duration::days(i);
        for s in 0..stores {
            // Every store skips some days so the matrix is sparse
            if (i as usize + s) % (s + 3) == 0 {
                continue;
            }
            let y = ((i as f64 * 0.7 + s as f64).sin() * 10.0).round();
            records.push(Record::new(format!("store_{:02}", s), day, y));
        }
    }
    records
}

fn write_long_csv(path: &Path, records: &[Record]) {
    let mut file = fs::File::create(path).unwrap();
    writeln!(file, "unique_id,date,y").unwrap();
    for r in records {
        writeln!(file, "{},{},{}", r.unique_id, r.date, r.y).unwrap();
    }
}

fn total(records: &[Record]) -> f64 {
    records.iter().map(|r| r.y).sum()
}

#[test]
fn test_csv_end_to_end_weekly() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sales.csv");
    let records = create_synthetic_sales(200, 6);
    write_long_csv(&path, &records);

    let source = CsvSource::open(
        &path,
        DataConfig {
            batch_size: 97,
            ..Default::default()
        },
    )
    .unwrap();
    let result = Engine::new(EngineConfig::default()).run(&source).unwrap();

    assert_eq!(result.report.records_read, records.len());
    assert!((result.matrix.total() - total(&records)).abs() < 1e-6);
    assert_eq!(result.matrix.n_series(), 6);

    // Every column is a Monday
    for period in result.matrix.columns() {
        assert_eq!(period.format("%a").to_string(), "Mon");
    }
}

#[test]
fn test_csv_matches_in_memory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sales.csv");
    let records = create_synthetic_sales(90, 4);
    write_long_csv(&path, &records);

    let config = EngineConfig::new(ResampleFrequency::Monthly);
    let from_csv = Engine::new(config.clone())
        .run(&CsvSource::open(&path, DataConfig::default()).unwrap())
        .unwrap();
    let from_memory = Engine::new(config).run_records(records).unwrap();

    assert_eq!(from_csv.matrix, from_memory.matrix);
}

#[test]
fn test_report_carries_input_checksum() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sales.csv");
    write_long_csv(&path, &create_synthetic_sales(30, 2));

    let source = CsvSource::open(&path, DataConfig::default()).unwrap();
    let result = Engine::new(EngineConfig::default()).run(&source).unwrap();
    let expected = compute_file_checksum(&path).unwrap();
    assert_eq!(result.report.input_checksum.as_deref(), Some(expected.as_str()));
    assert_eq!(expected.len(), 64);

    // A different file hashes differently
    write_long_csv(&path, &create_synthetic_sales(31, 2));
    let rerun = Engine::new(EngineConfig::default()).run(&source).unwrap();
    assert_ne!(rerun.report.input_checksum, result.report.input_checksum);
}

#[test]
fn test_series_totals_preserved() {
    let records = create_synthetic_sales(150, 5);
    let result = Engine::new(EngineConfig {
        window_span_days: 11,
        ..EngineConfig::new(ResampleFrequency::Monthly)
    })
    .run_records(records.clone())
    .unwrap();

    for s in 0..5 {
        let id = format!("store_{:02}", s);
        let expected: f64 = records
            .iter()
            .filter(|r| r.unique_id == id)
            .map(|r| r.y)
            .sum();
        let actual = result.matrix.series_total(&id).unwrap();
        assert!((actual - expected).abs() < 1e-6, "{}", id);
    }
}

#[test]
fn test_checkpoint_matches_final_matrix() {
    let dir = TempDir::new().unwrap();
    for name in ["checkpoint.csv", "checkpoint.json"] {
        let checkpoint = dir.path().join("ckpt").join(name);
        let config = EngineConfig {
            window_span_days: 20,
            ..EngineConfig::default()
        }
        .with_checkpoint(&checkpoint);

        let result = Engine::new(config)
            .run_records(create_synthetic_sales(120, 3))
            .unwrap();

        assert!(result.report.checkpoint_failures.is_empty());
        assert_eq!(read_matrix(&checkpoint).unwrap(), result.matrix, "{}", name);
    }
}

#[test]
fn test_checkpoint_failure_reported_not_fatal() {
    let dir = TempDir::new().unwrap();
    // A directory where the checkpoint file should go
    let checkpoint = dir.path().join("blocked.csv");
    fs::create_dir_all(checkpoint.join("inner")).unwrap();

    let config = EngineConfig {
        window_span_days: 30,
        ..EngineConfig::default()
    }
    .with_checkpoint(&checkpoint);
    let records = create_synthetic_sales(60, 2);

    let result = Engine::new(config)
        .run_with_checkpointer(&MemorySource::new(records.clone()), &FileCheckpointer)
        .unwrap();

    assert_eq!(
        result.report.checkpoint_failures.len(),
        result.report.windows_processed
    );
    assert!(result.report.last_checkpoint.is_none());
    assert!((result.matrix.total() - total(&records)).abs() < 1e-6);
}

#[test]
fn test_parallel_matches_sequential_from_csv() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sales.csv");
    write_long_csv(&path, &create_synthetic_sales(365, 8));
    let source = CsvSource::open(&path, DataConfig::default()).unwrap();

    let sequential = Engine::new(EngineConfig {
        window_span_days: 10,
        ..EngineConfig::default()
    })
    .run(&source)
    .unwrap();
    let parallel = Engine::new(EngineConfig {
        window_span_days: 10,
        parallel: true,
        ..EngineConfig::default()
    })
    .run(&source)
    .unwrap();

    assert_eq!(sequential.matrix, parallel.matrix);
}

#[test]
fn test_semicolon_decimal_comma_aliases() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sales.csv");
    fs::write(
        &path,
        "item;Date;sales\nA;01.01.2020;1,5\nA;15.01.2020;2,25\nB;03.02.2020;1.000,0\n",
    )
    .unwrap();

    let source = CsvSource::open(
        &path,
        DataConfig {
            decimal_comma: true,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(source.delimiter(), b';');

    let result = Engine::new(EngineConfig::new(ResampleFrequency::Monthly))
        .run(&source)
        .unwrap();
    assert_eq!(result.matrix.get("A", date(2020, 1, 1)), Some(3.75));
    assert_eq!(result.matrix.get("B", date(2020, 2, 1)), Some(1000.0));
    assert_eq!(result.matrix.get("B", date(2020, 1, 1)), None);
}

#[test]
fn test_invalid_rows_fail_unless_skipped() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sales.csv");
    fs::write(
        &path,
        "unique_id,date,y\nA,2020-01-01,5\nA,not-a-date,1\nB,2020-01-02,2\n",
    )
    .unwrap();

    let strict = CsvSource::open(&path, DataConfig::default()).unwrap();
    let err = Engine::new(EngineConfig::default()).run(&strict).unwrap_err();
    assert!(err.to_string().contains("row 2"));

    let lenient = CsvSource::open(
        &path,
        DataConfig {
            skip_invalid: true,
            ..Default::default()
        },
    )
    .unwrap();
    let result = Engine::new(EngineConfig::default()).run(&lenient).unwrap();
    assert_eq!(result.report.records_read, 2);
    assert_eq!(result.matrix.total(), 7.0);
}

#[test]
fn test_header_only_file_is_no_data() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.csv");
    fs::write(&path, "unique_id,date,y\n").unwrap();

    let source = CsvSource::open(&path, DataConfig::default()).unwrap();
    assert!(matches!(
        Engine::new(EngineConfig::default()).run(&source),
        Err(AggregationError::NoData)
    ));
}

#[test]
fn test_reject_policy_with_single_window() {
    // A single window covering the whole range never produces overlaps
    let records = create_synthetic_sales(100, 3);
    let result = Engine::new(EngineConfig {
        window_span_days: 400,
        merge_policy: MergePolicy::Reject,
        ..EngineConfig::new(ResampleFrequency::Monthly)
    })
    .run_records(records.clone())
    .unwrap();
    assert_eq!(result.report.windows_processed, 1);
    assert!((result.matrix.total() - total(&records)).abs() < 1e-6);
}

#[test]
fn test_single_day_input() {
    let records = vec![
        Record::new("A", date(2020, 5, 13), 4.0),
        Record::new("B", date(2020, 5, 13), 0.0),
    ];
    let result = Engine::new(EngineConfig::new(ResampleFrequency::Monthly))
        .run_records(records)
        .unwrap();
    assert_eq!(result.matrix.n_columns(), 1);
    assert_eq!(result.matrix.get("A", date(2020, 5, 1)), Some(4.0));
    // Explicit zero is present, not absent
    assert_eq!(result.matrix.get("B", date(2020, 5, 1)), Some(0.0));
}

#[test]
fn test_config_file_run() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("sales.csv");
    let records = create_synthetic_sales(60, 3);
    write_long_csv(&data, &records);

    let mut file_config = EngineFileConfig::default();
    file_config.engine.frequency = "W-SUN".to_string();
    file_config.engine.show_progress = false;
    file_config.data.path = Some(data.clone());
    let config_path = dir.path().join("salesgrid.toml");
    file_config.save(&config_path).unwrap();

    let loaded = EngineFileConfig::load(&config_path).unwrap();
    let source = CsvSource::open(&data, loaded.to_data_config().unwrap()).unwrap();
    let result = Engine::new(loaded.to_engine_config().unwrap())
        .run(&source)
        .unwrap();

    for period in result.matrix.columns() {
        assert_eq!(period.format("%a").to_string(), "Sun");
    }
    assert!(source.describe().ends_with("sales.csv"));

    let out = dir.path().join("matrix.csv");
    write_matrix(&result.matrix, &out).unwrap();
    assert_eq!(read_matrix(&out).unwrap(), result.matrix);
}
