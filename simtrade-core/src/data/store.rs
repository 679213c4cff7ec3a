//! Partitioned Parquet store with incremental upsert.
//!
//! Layout (Hive-style):
//! - per-symbol tables: `{root}/{table}/symbol={SYMBOL}/data.parquet`
//! - global tables:     `{root}/{table}/data.parquet`
//!
//! Each partition has a `meta.json` sidecar next to its data file.
//!
//! Upsert semantics:
//! - existing rows whose key is not in the batch are preserved
//! - rows sharing a key with the batch are replaced whole (last write wins)
//! - the partition is re-sorted by key before commit
//! - data and sidecar are both staged before the data rename; a failure
//!   before that rename leaves the old partition intact
//! - an identical batch leaves the partition byte-identical (no rewrite)

use super::frame::{frame_keys, merge_frames, read_parquet, rows_to_frame, stage_bytes, stage_parquet};
use crate::domain::{format_key, Key, Row};
use crate::error::StoreError;
use crate::schema::{Scope, TableKind, SCHEMA_VERSION};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

const DATA_FILE: &str = "data.parquet";
const META_FILE: &str = "meta.json";

/// Metadata sidecar of one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionMeta {
    pub table: TableKind,
    /// `None` for global tables.
    pub symbol: Option<String>,
    pub rows: usize,
    pub first_key: Option<String>,
    pub last_key: Option<String>,
    /// BLAKE3 of the committed Parquet bytes.
    pub data_hash: String,
    pub schema_version: u32,
}

/// Outcome of one upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertSummary {
    /// Rows in the incoming batch.
    pub incoming: usize,
    /// Keys that did not exist before.
    pub inserted: usize,
    /// Keys that existed and were overwritten.
    pub replaced: usize,
    /// Rows in the partition after commit.
    pub total_rows: usize,
    /// True when the partition content did not change and nothing was written.
    pub unchanged: bool,
}

/// The store. Cheap to share across threads (`&PartitionStore` is `Sync`).
#[derive(Debug)]
pub struct PartitionStore {
    root: PathBuf,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PartitionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_dir(&self, table: TableKind) -> PathBuf {
        self.root.join(table.name())
    }

    /// Directory of a partition: `{root}/{table}/symbol={SYMBOL}` or `{root}/{table}`.
    fn partition_dir(&self, table: TableKind, symbol: Option<&str>) -> PathBuf {
        match symbol {
            Some(symbol) => self.table_dir(table).join(format!("symbol={symbol}")),
            None => self.table_dir(table),
        }
    }

    pub fn data_path(&self, table: TableKind, symbol: Option<&str>) -> PathBuf {
        self.partition_dir(table, symbol).join(DATA_FILE)
    }

    fn meta_path(&self, table: TableKind, symbol: Option<&str>) -> PathBuf {
        self.partition_dir(table, symbol).join(META_FILE)
    }

    /// In-process lock serializing writers of one partition.
    fn partition_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    /// Merge rows into the partition of a per-symbol table.
    pub fn upsert(
        &self,
        table: TableKind,
        symbol: &str,
        rows: &[Row],
    ) -> Result<UpsertSummary, StoreError> {
        if table.scope() != Scope::PerSymbol {
            return Err(StoreError::mismatch(
                table,
                "global table cannot be written per symbol; use upsert_global",
            ));
        }
        check_symbol(symbol)?;
        self.upsert_partition(table, Some(symbol), rows)
    }

    /// Merge rows into a global table.
    pub fn upsert_global(&self, table: TableKind, rows: &[Row]) -> Result<UpsertSummary, StoreError> {
        if table.scope() != Scope::Global {
            return Err(StoreError::mismatch(
                table,
                "per-symbol table cannot be written globally; use upsert",
            ));
        }
        self.upsert_partition(table, None, rows)
    }

    fn upsert_partition(
        &self,
        table: TableKind,
        symbol: Option<&str>,
        rows: &[Row],
    ) -> Result<UpsertSummary, StoreError> {
        let path = self.data_path(table, symbol);
        if rows.is_empty() {
            return Ok(UpsertSummary {
                total_rows: self.meta(table, symbol).map_or(0, |m| m.rows),
                unchanged: true,
                ..Default::default()
            });
        }

        let schema = table.schema();
        let keys = schema.key_names();
        let incoming = rows_to_frame(&schema, rows)?;
        let incoming_keys: HashSet<Key> = frame_keys(&schema, &incoming)?.into_iter().collect();

        let lock = self.partition_lock(&path);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let existing = if path.exists() {
            let df = read_parquet(&path)?;
            schema
                .check_frame(&df)
                .map_err(|detail| StoreError::mismatch(table, format!("persisted partition drifted: {detail}")))?;
            let df = df
                .select(schema.column_names())
                .map_err(|e| StoreError::read(&path, e))?;
            Some(df)
        } else {
            None
        };

        let existing_keys: HashSet<Key> = match &existing {
            Some(df) => frame_keys(&schema, df)?.into_iter().collect(),
            None => HashSet::new(),
        };
        let replaced = incoming_keys.intersection(&existing_keys).count();
        let inserted = incoming_keys.len() - replaced;

        let mut merged = merge_frames(existing, incoming, &keys)
            .map_err(|e| StoreError::write(&path, format!("merge: {e}")))?;

        let staged = stage_parquet(&mut merged, &path)?;
        let previous = self.meta(table, symbol);
        if path.exists() && previous.as_ref().is_some_and(|m| m.data_hash == staged.hash) {
            staged.discard();
            debug!(table = %table, symbol = symbol.unwrap_or("-"), "partition unchanged");
            return Ok(UpsertSummary {
                incoming: rows.len(),
                inserted,
                replaced,
                total_rows: merged.height(),
                unchanged: true,
            });
        }

        let merged_keys = frame_keys(&schema, &merged)?;
        let meta = PartitionMeta {
            table,
            symbol: symbol.map(str::to_string),
            rows: merged.height(),
            first_key: merged_keys.first().map(|k| format_key(k)),
            last_key: merged_keys.last().map(|k| format_key(k)),
            data_hash: staged.hash.clone(),
            schema_version: SCHEMA_VERSION,
        };
        let meta_path = self.meta_path(table, symbol);
        // both files are staged before either target is touched
        let staged_meta = serde_json::to_vec_pretty(&meta)
            .map_err(|e| StoreError::write(&meta_path, format!("meta serialization: {e}")))
            .and_then(|bytes| stage_bytes(&meta_path, &bytes));
        let staged_meta = match staged_meta {
            Ok(staged_meta) => staged_meta,
            Err(e) => {
                staged.discard();
                return Err(e);
            }
        };
        if let Err(e) = staged.commit() {
            staged_meta.discard();
            return Err(e);
        }
        if let Err(e) = staged_meta.commit() {
            // data is in place; the next upsert rewrites a stale sidecar
            warn!(
                table = %table,
                symbol = symbol.unwrap_or("-"),
                error = %e,
                "partition committed but sidecar update failed"
            );
        }

        info!(
            table = %table,
            symbol = symbol.unwrap_or("-"),
            inserted,
            replaced,
            rows = meta.rows,
            "partition committed"
        );

        Ok(UpsertSummary {
            incoming: rows.len(),
            inserted,
            replaced,
            total_rows: meta.rows,
            unchanged: false,
        })
    }

    /// Load a per-symbol partition. `None` when nothing was ever written.
    pub fn load(&self, table: TableKind, symbol: &str) -> Result<Option<DataFrame>, StoreError> {
        check_symbol(symbol)?;
        self.load_partition(table, Some(symbol))
    }

    /// Load a global table. `None` when nothing was ever written.
    pub fn load_global(&self, table: TableKind) -> Result<Option<DataFrame>, StoreError> {
        self.load_partition(table, None)
    }

    fn load_partition(
        &self,
        table: TableKind,
        symbol: Option<&str>,
    ) -> Result<Option<DataFrame>, StoreError> {
        let path = self.data_path(table, symbol);
        if !path.exists() {
            return Ok(None);
        }
        let schema = table.schema();
        let df = read_parquet(&path)?;
        schema
            .check_frame(&df)
            .map_err(|detail| StoreError::mismatch(table, format!("persisted partition drifted: {detail}")))?;
        let df = df
            .select(schema.column_names())
            .map_err(|e| StoreError::read(&path, e))?;
        Ok(Some(df))
    }

    /// Symbols that have a committed partition in `table`, sorted.
    pub fn symbols(&self, table: TableKind) -> Result<Vec<String>, StoreError> {
        let dir = self.table_dir(table);
        if table.scope() == Scope::Global || !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|e| StoreError::read(&dir, format!("read dir: {e}")))?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::read(&dir, format!("dir entry: {e}")))?;
            let name = entry.file_name();
            let Some(symbol) = name.to_str().and_then(|n| n.strip_prefix("symbol=")) else {
                continue;
            };
            if entry.path().join(DATA_FILE).exists() {
                symbols.push(symbol.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    /// Sidecar of a partition, if present and readable.
    pub fn meta(&self, table: TableKind, symbol: Option<&str>) -> Option<PartitionMeta> {
        let content = fs::read_to_string(self.meta_path(table, symbol)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Sidecars of every partition in the store.
    pub fn status(&self) -> Result<Vec<PartitionMeta>, StoreError> {
        let mut metas = Vec::new();
        for table in TableKind::ALL {
            match table.scope() {
                Scope::Global => metas.extend(self.meta(table, None)),
                Scope::PerSymbol => {
                    for symbol in self.symbols(table)? {
                        metas.extend(self.meta(table, Some(&symbol)));
                    }
                }
            }
        }
        Ok(metas)
    }

    /// Remove every partition of a table (full reimport). Returns the number
    /// of partitions removed.
    pub fn drop_table(&self, table: TableKind) -> Result<usize, StoreError> {
        let dir = self.table_dir(table);
        if !dir.exists() {
            return Ok(0);
        }
        let removed = match table.scope() {
            Scope::Global => usize::from(self.data_path(table, None).exists()),
            Scope::PerSymbol => self.symbols(table)?.len(),
        };
        fs::remove_dir_all(&dir).map_err(|e| StoreError::write(&dir, format!("remove: {e}")))?;
        info!(table = %table, partitions = removed, "table dropped");
        Ok(removed)
    }
}

/// Symbols become directory names; refuse anything that could escape the table dir.
fn check_symbol(symbol: &str) -> Result<(), StoreError> {
    let bad = symbol.is_empty()
        || symbol == "."
        || symbol == ".."
        || symbol.contains(['/', '\\', '='])
        || symbol.chars().any(char::is_whitespace);
    if bad {
        return Err(StoreError::InvalidSymbol {
            symbol: symbol.to_string(),
        });
    }
    Ok(())
}
