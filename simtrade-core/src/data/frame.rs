//! Conversions between rows and Polars frames, and the Parquet I/O helpers.
//!
//! Writes are always staged: bytes are produced in memory, hashed with BLAKE3,
//! written to `{path}.tmp`, synced, and only then renamed into place.

use crate::domain::{from_epoch_days, to_epoch_days, Key, KeyPart, Row, Value};
use crate::error::StoreError;
use crate::schema::{ColumnRole, ColumnType, TableSchema};
use chrono::NaiveDate;
use polars::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Build a frame with exactly the declared columns, in declared order.
///
/// Fails with `SchemaMismatch` on an undeclared column, a value of the wrong
/// type, or a null key/required column.
pub fn rows_to_frame(schema: &TableSchema, rows: &[Row]) -> Result<DataFrame, StoreError> {
    let table = schema.table;

    for (i, row) in rows.iter().enumerate() {
        if let Some(unknown) = row.columns().find(|c| schema.column(c).is_none()) {
            return Err(StoreError::mismatch(
                table,
                format!("row {i}: unexpected column '{unknown}'"),
            ));
        }
    }

    let mut columns = Vec::with_capacity(schema.columns.len());
    for def in schema.columns {
        let cell = |i: usize, row: &Row| -> Result<Value, StoreError> {
            let v = row.get(def.name).cloned().unwrap_or(Value::Null);
            if v.is_null() && matches!(def.role, ColumnRole::Key | ColumnRole::Required) {
                return Err(StoreError::mismatch(
                    table,
                    format!("row {i}: '{}' must not be null", def.name),
                ));
            }
            Ok(v)
        };
        let type_err = |i: usize, v: &Value| {
            StoreError::mismatch(
                table,
                format!(
                    "row {i}: column '{}' expects {}, got {}",
                    def.name,
                    def.dtype,
                    v.type_name()
                ),
            )
        };

        let column = match def.dtype {
            ColumnType::Date => {
                let mut values: Vec<Option<i32>> = Vec::with_capacity(rows.len());
                for (i, row) in rows.iter().enumerate() {
                    match cell(i, row)? {
                        Value::Null => values.push(None),
                        Value::Date(d) => values.push(Some(to_epoch_days(d))),
                        other => return Err(type_err(i, &other)),
                    }
                }
                Column::new(def.name.into(), values)
                    .cast(&DataType::Date)
                    .map_err(|e| StoreError::mismatch(table, format!("date cast: {e}")))?
            }
            ColumnType::Float64 => {
                let mut values: Vec<Option<f64>> = Vec::with_capacity(rows.len());
                for (i, row) in rows.iter().enumerate() {
                    match cell(i, row)? {
                        Value::Null if def.role == ColumnRole::ZeroDefault => values.push(Some(0.0)),
                        Value::Null => values.push(None),
                        Value::Float(v) => values.push(Some(v)),
                        other => return Err(type_err(i, &other)),
                    }
                }
                Column::new(def.name.into(), values)
            }
            ColumnType::Utf8 => {
                let mut values: Vec<Option<String>> = Vec::with_capacity(rows.len());
                for (i, row) in rows.iter().enumerate() {
                    match cell(i, row)? {
                        Value::Null => values.push(None),
                        Value::Str(s) => values.push(Some(s)),
                        other => return Err(type_err(i, &other)),
                    }
                }
                Column::new(def.name.into(), values)
            }
        };
        columns.push(column);
    }

    DataFrame::new(columns)
        .map_err(|e| StoreError::mismatch(table, format!("dataframe creation: {e}")))
}

/// Convert a frame holding (at least) the declared columns back into rows.
pub fn frame_to_rows(schema: &TableSchema, df: &DataFrame) -> Result<Vec<Row>, StoreError> {
    let table = schema.table;
    let err = |e: PolarsError| StoreError::mismatch(table, format!("column read: {e}"));

    let mut rows = vec![Row::new(); df.height()];
    for def in schema.columns {
        match def.dtype {
            ColumnType::Date => {
                for (row, v) in rows.iter_mut().zip(date_values(df, def.name).map_err(err)?) {
                    row.insert(def.name, v);
                }
            }
            ColumnType::Float64 => {
                for (row, v) in rows.iter_mut().zip(f64_values(df, def.name).map_err(err)?) {
                    row.insert(def.name, v);
                }
            }
            ColumnType::Utf8 => {
                for (row, v) in rows.iter_mut().zip(str_values(df, def.name).map_err(err)?) {
                    row.insert(def.name, v);
                }
            }
        }
    }
    Ok(rows)
}

/// Keys of every row of a frame, in row order.
pub fn frame_keys(schema: &TableSchema, df: &DataFrame) -> Result<Vec<Key>, StoreError> {
    let table = schema.table;
    let err = |e: PolarsError| StoreError::mismatch(table, format!("key read: {e}"));

    let mut keys: Vec<Key> = vec![Vec::new(); df.height()];
    for def in schema.key_columns() {
        let parts: Vec<Option<KeyPart>> = match def.dtype {
            ColumnType::Date => date_values(df, def.name)
                .map_err(err)?
                .into_iter()
                .map(|d| d.map(KeyPart::Date))
                .collect(),
            ColumnType::Utf8 => str_values(df, def.name)
                .map_err(err)?
                .into_iter()
                .map(|s| s.map(KeyPart::Str))
                .collect(),
            ColumnType::Float64 => {
                return Err(StoreError::mismatch(table, "float key column"));
            }
        };
        for (key, part) in keys.iter_mut().zip(parts) {
            let part = part.ok_or_else(|| {
                StoreError::mismatch(table, format!("null in key column '{}'", def.name))
            })?;
            key.push(part);
        }
    }
    Ok(keys)
}

// ── Column extractors ───────────────────────────────────────────────

pub fn date_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<NaiveDate>>> {
    let days = df.column(name)?.cast(&DataType::Int32)?;
    Ok(days
        .i32()?
        .into_iter()
        .map(|d| d.and_then(from_epoch_days))
        .collect())
}

pub fn f64_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    let values = df.column(name)?.cast(&DataType::Float64)?;
    Ok(values.f64()?.into_iter().collect())
}

pub fn str_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    Ok(df
        .column(name)?
        .str()?
        .into_iter()
        .map(|s| s.map(str::to_string))
        .collect())
}

/// Build a `Date` column from optional dates.
pub fn date_column(name: &str, dates: &[Option<NaiveDate>]) -> PolarsResult<Column> {
    let days: Vec<Option<i32>> = dates.iter().map(|d| d.map(to_epoch_days)).collect();
    Column::new(name.into(), days).cast(&DataType::Date)
}

// ── Merge ───────────────────────────────────────────────────────────

/// Upsert `incoming` into `existing`: rows sharing a key are replaced by the
/// last incoming occurrence, and the result is sorted by key ascending.
pub fn merge_frames(
    existing: Option<DataFrame>,
    incoming: DataFrame,
    keys: &[&str],
) -> PolarsResult<DataFrame> {
    let stacked = match existing {
        Some(existing) => concat([existing.lazy(), incoming.lazy()], UnionArgs::default())?,
        None => incoming.lazy(),
    };
    stacked
        .unique_stable(
            Some(keys.iter().map(|k| (*k).into()).collect()),
            UniqueKeepStrategy::Last,
        )
        .sort(
            keys.to_vec(),
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()
}

// ── Parquet I/O ─────────────────────────────────────────────────────

/// A file written next to its destination but not yet visible.
#[derive(Debug)]
pub struct StagedFile {
    pub staging: PathBuf,
    pub target: PathBuf,
    /// BLAKE3 of the staged bytes.
    pub hash: String,
}

impl StagedFile {
    /// Atomically move the staged file into place.
    pub fn commit(self) -> Result<String, StoreError> {
        fs::rename(&self.staging, &self.target).map_err(|e| {
            let _ = fs::remove_file(&self.staging);
            StoreError::write(&self.target, format!("atomic rename failed: {e}"))
        })?;
        Ok(self.hash)
    }

    /// Drop the staged file without touching the target.
    pub fn discard(self) {
        let _ = fs::remove_file(&self.staging);
    }
}

/// Write `bytes` to `{path}.tmp`, synced to disk.
pub fn stage_bytes(path: &Path, bytes: &[u8]) -> Result<StagedFile, StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| StoreError::write(parent, format!("create dir: {e}")))?;
    }
    let staging = staging_path(path);
    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&staging)?;
        file.write_all(bytes)?;
        file.sync_all()
    };
    write().map_err(|e| {
        let _ = fs::remove_file(&staging);
        StoreError::write(&staging, e)
    })?;

    Ok(StagedFile {
        staging,
        target: path.to_path_buf(),
        hash: blake3::hash(bytes).to_hex().to_string(),
    })
}

/// Serialize `df` as Parquet and stage it next to `path`.
pub fn stage_parquet(df: &mut DataFrame, path: &Path) -> Result<StagedFile, StoreError> {
    // row groups follow chunk boundaries; one chunk keeps equal frames byte-equal
    df.as_single_chunk_par();
    let mut bytes = Vec::new();
    ParquetWriter::new(&mut bytes)
        .finish(df)
        .map_err(|e| StoreError::write(path, format!("parquet encode: {e}")))?;
    stage_bytes(path, &bytes)
}

/// Stage and commit in one step. Returns the BLAKE3 of the written bytes.
pub fn write_parquet_atomic(df: &mut DataFrame, path: &Path) -> Result<String, StoreError> {
    stage_parquet(df, path)?.commit()
}

pub fn read_parquet(path: &Path) -> Result<DataFrame, StoreError> {
    let file = fs::File::open(path).map_err(|e| StoreError::read(path, format!("open: {e}")))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::read(path, format!("parquet decode: {e}")))
}

/// BLAKE3 of a file's bytes.
pub fn hash_file(path: &Path) -> Result<String, StoreError> {
    let bytes = fs::read(path).map_err(|e| StoreError::read(path, e))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Write a small file (JSON) with the same stage-then-rename dance.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    stage_bytes(path, bytes)?.commit().map(|_| ())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableKind;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn bar(date: NaiveDate, close: f64) -> Row {
        Row::new()
            .with("date", date)
            .with("open", close)
            .with("high", close)
            .with("low", close)
            .with("close", close)
            .with("preclose", close)
            .with("volume", 100.0)
            .with("money", close * 100.0)
    }

    #[test]
    fn rows_to_frame_and_back() {
        let schema = TableKind::DailyBar.schema();
        let rows = vec![bar(d(2024, 1, 2), 10.0), bar(d(2024, 1, 3), 10.5)];

        let df = rows_to_frame(&schema, &rows).unwrap();
        assert_eq!(df.height(), 2);
        assert!(schema.check_frame(&df).is_ok());

        let back = frame_to_rows(&schema, &df).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn missing_value_columns_become_null_or_zero() {
        let bars = TableKind::DailyBar.schema();
        let df = rows_to_frame(&bars, &[Row::new().with("date", d(2024, 1, 2))]).unwrap();
        assert_eq!(f64_values(&df, "close").unwrap(), vec![None]);

        let exrights = TableKind::Exrights.schema();
        let df = rows_to_frame(
            &exrights,
            &[Row::new().with("date", d(2024, 6, 1)).with("dividend", 0.3)],
        )
        .unwrap();
        assert_eq!(f64_values(&df, "bonus_ps").unwrap(), vec![Some(0.0)]);
        assert_eq!(f64_values(&df, "dividend").unwrap(), vec![Some(0.3)]);
    }

    #[test]
    fn schema_violations_are_mismatches() {
        let schema = TableKind::DailyBar.schema();

        let unknown = bar(d(2024, 1, 2), 10.0).with("vwap", 10.0);
        assert!(matches!(
            rows_to_frame(&schema, &[unknown]),
            Err(StoreError::SchemaMismatch { .. })
        ));

        let wrong_type = bar(d(2024, 1, 2), 10.0).with("close", "ten");
        assert!(matches!(
            rows_to_frame(&schema, &[wrong_type]),
            Err(StoreError::SchemaMismatch { .. })
        ));

        let null_key = Row::new().with("close", 10.0);
        assert!(matches!(
            rows_to_frame(&schema, &[null_key]),
            Err(StoreError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn merge_replaces_and_sorts() {
        let schema = TableKind::DailyBar.schema();
        let existing =
            rows_to_frame(&schema, &[bar(d(2024, 1, 3), 11.0), bar(d(2024, 1, 4), 12.0)]).unwrap();
        let incoming = rows_to_frame(
            &schema,
            &[
                bar(d(2024, 1, 2), 10.0),
                bar(d(2024, 1, 3), 99.0),
                bar(d(2024, 1, 3), 11.5),
            ],
        )
        .unwrap();

        let merged = merge_frames(Some(existing), incoming, &["date"]).unwrap();
        assert_eq!(
            date_values(&merged, "date").unwrap(),
            vec![Some(d(2024, 1, 2)), Some(d(2024, 1, 3)), Some(d(2024, 1, 4))]
        );
        assert_eq!(
            f64_values(&merged, "close").unwrap(),
            vec![Some(10.0), Some(11.5), Some(12.0)]
        );
    }

    #[test]
    fn staged_write_is_invisible_until_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t").join("data.parquet");
        let schema = TableKind::DailyBar.schema();
        let mut df = rows_to_frame(&schema, &[bar(d(2024, 1, 2), 10.0)]).unwrap();

        let staged = stage_parquet(&mut df, &path).unwrap();
        assert!(!path.exists());
        assert!(staged.staging.exists());

        let hash = staged.commit().unwrap();
        assert!(path.exists());
        assert_eq!(hash_file(&path).unwrap(), hash);
        assert_eq!(read_parquet(&path).unwrap().height(), 1);
    }

    #[test]
    fn identical_frames_hash_identically() {
        let dir = tempfile::tempdir().unwrap();
        let schema = TableKind::DailyBar.schema();
        let rows = vec![bar(d(2024, 1, 2), 10.0)];

        let mut a = rows_to_frame(&schema, &rows).unwrap();
        let mut b = rows_to_frame(&schema, &rows).unwrap();
        let ha = write_parquet_atomic(&mut a, &dir.path().join("a.parquet")).unwrap();
        let hb = write_parquet_atomic(&mut b, &dir.path().join("b.parquet")).unwrap();
        assert_eq!(ha, hb);
    }

    #[test]
    fn failed_staging_is_a_retryable_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.parquet");
        let schema = TableKind::DailyBar.schema();
        let mut old = rows_to_frame(&schema, &[bar(d(2024, 1, 2), 10.0)]).unwrap();
        write_parquet_atomic(&mut old, &path).unwrap();
        let before = fs::read(&path).unwrap();

        // a directory where the staging file should go makes File::create fail
        let blocker = path.with_file_name("data.parquet.tmp");
        fs::create_dir(&blocker).unwrap();
        let mut new = rows_to_frame(&schema, &[bar(d(2024, 1, 3), 11.0)]).unwrap();
        let err = write_parquet_atomic(&mut new, &path).unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }), "{err}");
        assert!(err.is_retryable());
        assert_eq!(fs::read(&path).unwrap(), before);

        fs::remove_dir(&blocker).unwrap();
        let hash = write_parquet_atomic(&mut new, &path).unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash);
        assert_eq!(read_parquet(&path).unwrap().height(), 1);
        assert!(!blocker.exists());
    }
}
