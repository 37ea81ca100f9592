//! Oracle derivation and Parquet persistence of target data.
//!
//! Both datasets are cast into fixed Arrow schemas before writing: dates are
//! `Date32`, strings are plain `Utf8` and parquet dictionary encoding is off,
//! so readers in other toolchains see the same types and raw strings.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::types::Date32Type;
use arrow_array::{Array, Date32Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use chrono::{Duration, NaiveDate};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::models::{DenseGridRow, OracleRow};

/// Oracle output covers target dates from this many days before the nowcast date.
pub const ORACLE_WINDOW_DAYS: i64 = 31;

pub const TIME_SERIES_DIR: &str = "time-series";
pub const ORACLE_DIR: &str = "oracle-output";
pub const TIME_SERIES_FILE: &str = "timeseries.parquet";
pub const ORACLE_FILE: &str = "oracle.parquet";

pub fn time_series_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("target_date", DataType::Date32, false),
        Field::new("location", DataType::Utf8, false),
        Field::new("clade", DataType::Utf8, false),
        Field::new("observation", DataType::Int64, false),
        Field::new("nowcast_date", DataType::Date32, false),
        Field::new("as_of", DataType::Date32, false),
    ]))
}

pub fn oracle_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("location", DataType::Utf8, false),
        Field::new("target_date", DataType::Date32, false),
        Field::new("clade", DataType::Utf8, false),
        Field::new("oracle_value", DataType::Int64, false),
        Field::new("nowcast_date", DataType::Date32, false),
        Field::new("as_of", DataType::Date32, false),
    ]))
}

/// Grid rows within the scoring window of the round, unchanged apart from the
/// column rename.
pub fn oracle_rows(grid: &[DenseGridRow], nowcast_date: NaiveDate) -> Vec<OracleRow> {
    let earliest = nowcast_date
        .checked_sub_signed(Duration::days(ORACLE_WINDOW_DAYS))
        .unwrap_or(NaiveDate::MIN);
    grid.iter()
        .filter(|row| row.target_date >= earliest)
        .map(|row| OracleRow {
            nowcast_date,
            location: row.location.clone(),
            target_date: row.target_date,
            clade: row.clade.clone(),
            oracle_value: row.observation,
        })
        .collect()
}

fn repeated_date(date: NaiveDate, len: usize) -> Date32Array {
    Date32Array::from(vec![Date32Type::from_naive_date(date); len])
}

/// Check every column against the persisted schema, by position, name, type
/// and nullability.
fn ensure_schema(dataset: &'static str, batch: &RecordBatch, expected: &Schema) -> Result<()> {
    let actual = batch.schema();
    if actual.fields().len() != expected.fields().len() {
        return Err(PipelineError::SchemaMismatch {
            dataset,
            detail: format!(
                "expected {} columns, found {}",
                expected.fields().len(),
                actual.fields().len()
            ),
        });
    }
    for (found, wanted) in actual.fields().iter().zip(expected.fields().iter()) {
        if found.name() != wanted.name()
            || found.data_type() != wanted.data_type()
            || found.is_nullable() != wanted.is_nullable()
        {
            return Err(PipelineError::SchemaMismatch {
                dataset,
                detail: format!(
                    "column {} ({:?}) does not match {} ({:?})",
                    found.name(),
                    found.data_type(),
                    wanted.name(),
                    wanted.data_type()
                ),
            });
        }
    }
    Ok(())
}

fn cast_batch(
    dataset: &'static str,
    schema: SchemaRef,
    columns: Vec<Arc<dyn Array>>,
) -> Result<RecordBatch> {
    let batch = RecordBatch::try_new(schema.clone(), columns).map_err(|e| {
        PipelineError::SchemaMismatch {
            dataset,
            detail: e.to_string(),
        }
    })?;
    ensure_schema(dataset, &batch, &schema)?;
    Ok(batch)
}

pub fn time_series_batch(
    grid: &[DenseGridRow],
    nowcast_date: NaiveDate,
    as_of: NaiveDate,
) -> Result<RecordBatch> {
    let target_date = Date32Array::from(
        grid.iter()
            .map(|row| Date32Type::from_naive_date(row.target_date))
            .collect::<Vec<_>>(),
    );
    let location = StringArray::from_iter_values(grid.iter().map(|row| row.location.as_str()));
    let clade = StringArray::from_iter_values(grid.iter().map(|row| row.clade.as_str()));
    let observation = Int64Array::from_iter_values(grid.iter().map(|row| row.observation));

    cast_batch(
        "time-series",
        time_series_schema(),
        vec![
            Arc::new(target_date) as Arc<dyn Array>,
            Arc::new(location),
            Arc::new(clade),
            Arc::new(observation),
            Arc::new(repeated_date(nowcast_date, grid.len())),
            Arc::new(repeated_date(as_of, grid.len())),
        ],
    )
}

pub fn oracle_batch(oracle: &[OracleRow], as_of: NaiveDate) -> Result<RecordBatch> {
    let location = StringArray::from_iter_values(oracle.iter().map(|row| row.location.as_str()));
    let target_date = Date32Array::from(
        oracle
            .iter()
            .map(|row| Date32Type::from_naive_date(row.target_date))
            .collect::<Vec<_>>(),
    );
    let clade = StringArray::from_iter_values(oracle.iter().map(|row| row.clade.as_str()));
    let oracle_value = Int64Array::from_iter_values(oracle.iter().map(|row| row.oracle_value));
    let nowcast_date = Date32Array::from(
        oracle
            .iter()
            .map(|row| Date32Type::from_naive_date(row.nowcast_date))
            .collect::<Vec<_>>(),
    );

    cast_batch(
        "oracle",
        oracle_schema(),
        vec![
            Arc::new(location) as Arc<dyn Array>,
            Arc::new(target_date),
            Arc::new(clade),
            Arc::new(oracle_value),
            Arc::new(nowcast_date),
            Arc::new(repeated_date(as_of, oracle.len())),
        ],
    )
}

pub fn time_series_partition(root: &Path, nowcast_date: NaiveDate, as_of: NaiveDate) -> PathBuf {
    root.join(TIME_SERIES_DIR)
        .join(format!("as_of={as_of}"))
        .join(format!("nowcast_date={nowcast_date}"))
}

pub fn oracle_partition(root: &Path, nowcast_date: NaiveDate) -> PathBuf {
    root.join(ORACLE_DIR)
        .join(format!("nowcast_date={nowcast_date}"))
}

/// Replace the partition directory with a single parquet file holding `batch`.
fn write_partition(dir: &Path, file_name: &str, batch: &RecordBatch) -> Result<PathBuf> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)?;

    let path = dir.join(file_name);
    let props = WriterProperties::builder()
        .set_dictionary_enabled(false)
        .set_compression(Compression::SNAPPY)
        .build();
    let file = File::create(&path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(path)
}

#[derive(Debug, Clone)]
pub struct TargetDataPaths {
    pub time_series: PathBuf,
    pub oracle: PathBuf,
}

pub fn write_target_data(
    grid: &[DenseGridRow],
    nowcast_date: NaiveDate,
    as_of: NaiveDate,
    output_root: &Path,
) -> Result<TargetDataPaths> {
    let oracle = oracle_rows(grid, nowcast_date);

    let time_series_batch = time_series_batch(grid, nowcast_date, as_of)?;
    let oracle_batch = oracle_batch(&oracle, as_of)?;

    let time_series = write_partition(
        &time_series_partition(output_root, nowcast_date, as_of),
        TIME_SERIES_FILE,
        &time_series_batch,
    )?;
    info!(rows = grid.len(), path = %time_series.display(), "target time series saved");

    let oracle = write_partition(
        &oracle_partition(output_root, nowcast_date),
        ORACLE_FILE,
        &oracle_batch,
    )?;
    info!(rows = oracle_batch.num_rows(), path = %oracle.display(), "oracle output saved");

    Ok(TargetDataPaths {
        time_series,
        oracle,
    })
}
