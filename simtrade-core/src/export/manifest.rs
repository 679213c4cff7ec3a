//! Export manifest: the single descriptor of a completed export.
//!
//! The manifest is written last: its presence means every file it lists was
//! already durably renamed into place. Consumers use `verify` to check that
//! the directory still matches it.
//!
//! The content hash is BLAKE3 over the sorted `path:hash` lines of every file,
//! so two exports of the same store at the same `asOf` have the same manifest.
//!
//! The export directories (`stocks/`, ..., `metadata/`) belong to the export:
//! any `*.parquet` in them that the manifest does not list is stale.

use crate::data::frame::{hash_file, read_parquet, write_bytes_atomic};
use super::engine::{METADATA_DIR, SYMBOL_TABLES};
use crate::error::{ExportError, StoreError};
use crate::schema::SCHEMA_VERSION;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";

/// One exported file, relative to the export directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Export table directory (`stocks`, `valuation`, ..., `metadata`).
    pub table: String,
    /// Path relative to the export root, `/`-separated.
    pub path: String,
    pub rows: usize,
    /// BLAKE3 of the file bytes.
    pub hash: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub files: usize,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub num_stocks: usize,
    /// The `asOf` of the export.
    pub export_date: NaiveDate,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub tables: BTreeMap<String, TableStats>,
    pub content_hash: String,
    pub files: Vec<FileEntry>,
}

/// Result of checking an export directory against its manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub problems: Vec<String>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Accumulates per-symbol results; `build` is called once all files are in place.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    export_date: NaiveDate,
    symbols: BTreeSet<String>,
    files: Vec<FileEntry>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

impl ManifestBuilder {
    pub fn new(export_date: NaiveDate) -> Self {
        Self {
            export_date,
            symbols: BTreeSet::new(),
            files: Vec::new(),
            start_date: None,
            end_date: None,
        }
    }

    /// Record one exported symbol and the date range of its daily bars.
    /// A symbol with no files at this `asOf` is not counted.
    pub fn add_symbol(
        &mut self,
        symbol: &str,
        files: impl IntoIterator<Item = FileEntry>,
        range: Option<(NaiveDate, NaiveDate)>,
    ) {
        let before = self.files.len();
        self.files.extend(files);
        if self.files.len() == before {
            return;
        }
        self.symbols.insert(symbol.to_string());
        if let Some((first, last)) = range {
            self.start_date = Some(self.start_date.map_or(first, |s| s.min(first)));
            self.end_date = Some(self.end_date.map_or(last, |e| e.max(last)));
        }
    }

    pub fn add_files(&mut self, files: impl IntoIterator<Item = FileEntry>) {
        self.files.extend(files);
    }

    pub fn build(mut self) -> Manifest {
        self.files.sort_by(|a, b| a.path.cmp(&b.path));

        let mut tables: BTreeMap<String, TableStats> = BTreeMap::new();
        for f in &self.files {
            let stats = tables.entry(f.table.clone()).or_default();
            stats.files += 1;
            stats.rows += f.rows;
        }

        Manifest {
            version: SCHEMA_VERSION,
            num_stocks: self.symbols.len(),
            export_date: self.export_date,
            start_date: self.start_date,
            end_date: self.end_date,
            content_hash: content_hash(&self.files),
            tables,
            files: self.files,
        }
    }
}

/// `*.parquet` files under the export directories that `files` does not list,
/// as `/`-separated paths relative to `dir`.
fn unlisted_files(dir: &Path, files: &[FileEntry]) -> Result<Vec<String>, StoreError> {
    let listed: BTreeSet<&str> = files.iter().map(|f| f.path.as_str()).collect();
    let tables = SYMBOL_TABLES
        .iter()
        .map(|t| t.name().to_string())
        .chain(std::iter::once(METADATA_DIR.to_string()));

    let mut unlisted = Vec::new();
    for table in tables {
        let table_dir = dir.join(&table);
        if !table_dir.is_dir() {
            continue;
        }
        let entries = fs::read_dir(&table_dir).map_err(|e| StoreError::read(&table_dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| StoreError::read(&table_dir, e))?.path();
            if !path.is_file() || path.extension().map_or(true, |e| e != "parquet") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let rel = format!("{table}/{name}");
            if !listed.contains(rel.as_str()) {
                unlisted.push(rel);
            }
        }
    }
    unlisted.sort();
    Ok(unlisted)
}

fn content_hash(files: &[FileEntry]) -> String {
    let mut lines: Vec<String> = files.iter().map(|f| format!("{}:{}", f.path, f.hash)).collect();
    lines.sort();
    blake3::hash(lines.join("\n").as_bytes()).to_hex().to_string()
}

impl Manifest {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    /// Write `manifest.json` atomically.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| ExportError::Manifest(format!("serialization: {e}")))?;
        let path = Self::path(dir);
        write_bytes_atomic(&path, &json)?;
        Ok(path)
    }

    /// Delete export files left over from an earlier run that this manifest
    /// does not list. Returns the removed paths.
    pub fn prune_unlisted(&self, dir: &Path) -> Result<Vec<String>, ExportError> {
        let stale = unlisted_files(dir, &self.files)?;
        for rel in &stale {
            let path = dir.join(rel);
            fs::remove_file(&path).map_err(|e| StoreError::write(&path, format!("remove: {e}")))?;
        }
        Ok(stale)
    }

    pub fn load(dir: &Path) -> Result<Manifest, ExportError> {
        let path = Self::path(dir);
        let content = fs::read_to_string(&path)
            .map_err(|e| ExportError::Manifest(format!("read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| ExportError::Manifest(format!("parse {}: {e}", path.display())))
    }

    /// Recompute file hashes, row counts, per-table totals and the content hash,
    /// and flag export files the manifest does not list.
    pub fn verify(&self, dir: &Path) -> Result<VerifyReport, ExportError> {
        let mut report = VerifyReport::default();

        for f in &self.files {
            let path = dir.join(&f.path);
            if !path.exists() {
                report.problems.push(format!("{}: missing", f.path));
                continue;
            }
            let hash = hash_file(&path)?;
            if hash != f.hash {
                report.problems.push(format!("{}: hash mismatch", f.path));
            }
            let rows = read_parquet(&path)?.height();
            if rows != f.rows {
                report
                    .problems
                    .push(format!("{}: {} rows, manifest says {}", f.path, rows, f.rows));
            }
        }

        let mut tables: BTreeMap<String, TableStats> = BTreeMap::new();
        for f in &self.files {
            let stats = tables.entry(f.table.clone()).or_default();
            stats.files += 1;
            stats.rows += f.rows;
        }
        if tables != self.tables {
            report.problems.push("per-table totals do not match file list".to_string());
        }
        if content_hash(&self.files) != self.content_hash {
            report.problems.push("content hash mismatch".to_string());
        }
        for rel in unlisted_files(dir, &self.files)? {
            report.problems.push(format!("{rel}: not in manifest"));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn entry(table: &str, path: &str, rows: usize) -> FileEntry {
        FileEntry {
            table: table.to_string(),
            path: path.to_string(),
            rows,
            hash: format!("h-{path}"),
        }
    }

    #[test]
    fn builder_totals_and_range() {
        let mut b = ManifestBuilder::new(d(2024, 6, 28));
        b.add_symbol(
            "600000.SS",
            vec![entry("stocks", "stocks/600000.SS.parquet", 10)],
            Some((d(2024, 1, 2), d(2024, 6, 28))),
        );
        b.add_symbol(
            "000001.SZ",
            vec![
                entry("stocks", "stocks/000001.SZ.parquet", 5),
                entry("valuation", "valuation/000001.SZ.parquet", 5),
            ],
            Some((d(2023, 12, 29), d(2024, 3, 1))),
        );
        b.add_files(vec![entry("metadata", "metadata/trade_days.parquet", 100)]);
        let m = b.build();

        assert_eq!(m.version, SCHEMA_VERSION);
        assert_eq!(m.num_stocks, 2);
        assert_eq!(m.export_date, d(2024, 6, 28));
        assert_eq!(m.start_date, Some(d(2023, 12, 29)));
        assert_eq!(m.end_date, Some(d(2024, 6, 28)));
        assert_eq!(m.tables["stocks"], TableStats { files: 2, rows: 15 });
        assert_eq!(m.tables["metadata"].files, 1);
        assert_eq!(m.files[0].path, "metadata/trade_days.parquet");
    }

    #[test]
    fn content_hash_ignores_insertion_order() {
        let mut a = ManifestBuilder::new(d(2024, 6, 28));
        a.add_files(vec![entry("stocks", "stocks/a.parquet", 1), entry("stocks", "stocks/b.parquet", 1)]);
        let mut b = ManifestBuilder::new(d(2024, 6, 28));
        b.add_files(vec![entry("stocks", "stocks/b.parquet", 1), entry("stocks", "stocks/a.parquet", 1)]);
        assert_eq!(a.build(), b.build());
    }

    #[test]
    fn write_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let m = ManifestBuilder::new(d(2024, 6, 28)).build();
        m.write(dir.path()).unwrap();
        assert_eq!(Manifest::load(dir.path()).unwrap(), m);
        assert!(m.verify(dir.path()).unwrap().is_ok());
    }

    #[test]
    fn verify_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = ManifestBuilder::new(d(2024, 6, 28));
        b.add_files(vec![entry("stocks", "stocks/gone.parquet", 1)]);
        let report = b.build().verify(dir.path()).unwrap();
        assert_eq!(report.problems, vec!["stocks/gone.parquet: missing".to_string()]);
    }

    #[test]
    fn symbols_without_files_are_not_counted() {
        let mut b = ManifestBuilder::new(d(2024, 3, 1));
        b.add_symbol(
            "000001.SZ",
            vec![entry("stocks", "stocks/000001.SZ.parquet", 1)],
            Some((d(2024, 1, 2), d(2024, 1, 2))),
        );
        b.add_symbol("600000.SS", Vec::new(), None);
        let m = b.build();
        assert_eq!(m.num_stocks, 1);
        assert_eq!(m.end_date, Some(d(2024, 1, 2)));
    }

    #[test]
    fn unlisted_export_files_are_flagged_and_pruned() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("stocks")).unwrap();
        fs::create_dir_all(dir.path().join("notes")).unwrap();
        fs::write(dir.path().join("stocks/600000.SS.parquet"), b"old").unwrap();
        fs::write(dir.path().join("stocks/readme.txt"), b"keep").unwrap();
        fs::write(dir.path().join("notes/x.parquet"), b"keep").unwrap();

        let m = ManifestBuilder::new(d(2024, 3, 1)).build();
        let report = m.verify(dir.path()).unwrap();
        assert_eq!(report.problems, vec!["stocks/600000.SS.parquet: not in manifest".to_string()]);

        assert_eq!(m.prune_unlisted(dir.path()).unwrap(), vec!["stocks/600000.SS.parquet".to_string()]);
        assert!(!dir.path().join("stocks/600000.SS.parquet").exists());
        assert!(dir.path().join("stocks/readme.txt").exists());
        assert!(dir.path().join("notes/x.parquet").exists());
        assert!(m.verify(dir.path()).unwrap().is_ok());
    }
}
