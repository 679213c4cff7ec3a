//! Sync pipeline: unified rows → split → validate → upsert, per symbol.
//!
//! Symbols are processed in a bounded rayon pool. A failure on one symbol is
//! recorded in the report and never aborts the others; within a symbol each
//! table commits or fails on its own.

use crate::config::PipelineConfig;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use simtrade_core::data::frame::frame_to_rows;
use simtrade_core::data::{PartitionStore, Splitter, Validator, ValidatorConfig, STATUS_TARGET};
use simtrade_core::domain::{date_from_number, parse_date, status, Row, Value};
use simtrade_core::schema::{Scope, TableKind};
use simtrade_core::StoreError;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Column carrying the partition symbol in unified and table-shaped input.
pub const SYMBOL_COLUMN: &str = "symbol";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to build worker pool: {0}")]
    Pool(String),

    #[error("stock status update failed: {0}")]
    Status(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-table counters of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableSyncStats {
    pub incoming: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub inserted: usize,
    pub replaced: usize,
    pub partitions_written: usize,
}

impl TableSyncStats {
    fn absorb(&mut self, other: &TableSyncStats) {
        self.incoming += other.incoming;
        self.accepted += other.accepted;
        self.rejected += other.rejected;
        self.inserted += other.inserted;
        self.replaced += other.replaced;
        self.partitions_written += other.partitions_written;
    }
}

/// A row rejected by validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowRejection {
    pub symbol: Option<String>,
    pub table: TableKind,
    /// Position within the symbol's batch for that table.
    pub index: usize,
    pub reasons: Vec<String>,
}

/// A partition that could not be committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionFailure {
    pub symbol: Option<String>,
    pub table: TableKind,
    pub error: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub symbols: usize,
    pub tables: BTreeMap<TableKind, TableSyncStats>,
    pub rejections: Vec<RowRejection>,
    pub failures: Vec<PartitionFailure>,
    /// Unmapped column → rows carrying it.
    pub unmapped: BTreeMap<String, usize>,
    /// Input rows without a usable symbol.
    pub missing_symbol: usize,
}

impl SyncReport {
    pub fn committed_rows(&self) -> usize {
        self.tables.values().map(|s| s.accepted).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.rejections.is_empty() && self.failures.is_empty() && self.missing_symbol == 0
    }

    fn absorb(&mut self, outcome: PartitionOutcome) {
        self.tables
            .entry(outcome.table)
            .or_default()
            .absorb(&outcome.stats);
        self.rejections.extend(outcome.rejections);
        self.failures.extend(outcome.failure);
    }
}

/// Status flags seen for one symbol on one date.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StatusObservation {
    symbol: String,
    date: NaiveDate,
    is_st: bool,
    halted: bool,
}

struct PartitionOutcome {
    table: TableKind,
    stats: TableSyncStats,
    rejections: Vec<RowRejection>,
    failure: Option<PartitionFailure>,
}

#[derive(Default)]
struct SymbolOutcome {
    partitions: Vec<PartitionOutcome>,
    unmapped: BTreeMap<String, usize>,
    status: Vec<StatusObservation>,
}

pub struct SyncPipeline<'a> {
    store: &'a PartitionStore,
    splitter: Splitter,
    validator_config: ValidatorConfig,
    workers: usize,
}

impl<'a> SyncPipeline<'a> {
    pub fn new(store: &'a PartitionStore, config: &PipelineConfig) -> Self {
        Self {
            store,
            splitter: Splitter::new(config.split_config()),
            validator_config: config.validator_config(),
            workers: config.workers.max(1),
        }
    }

    fn pool(&self) -> Result<rayon::ThreadPool, SyncError> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| SyncError::Pool(e.to_string()))
    }

    /// Route unified rows (one wide row per symbol and date) into the store.
    pub fn sync(&self, rows: Vec<Row>) -> Result<SyncReport, SyncError> {
        let (groups, missing_symbol) = group_by_symbol(rows);
        let mut report = SyncReport {
            symbols: groups.len(),
            missing_symbol,
            ..Default::default()
        };

        let outcomes: Vec<SymbolOutcome> = self.pool()?.install(|| {
            groups
                .par_iter()
                .map(|(symbol, rows)| self.sync_symbol(symbol, rows))
                .collect()
        });

        let mut observations = Vec::new();
        for outcome in outcomes {
            for (column, n) in outcome.unmapped {
                *report.unmapped.entry(column).or_insert(0) += n;
            }
            observations.extend(outcome.status);
            for partition in outcome.partitions {
                report.absorb(partition);
            }
        }

        if !report.unmapped.is_empty() {
            warn!(
                fields = ?report.unmapped.keys().collect::<Vec<_>>(),
                "unmapped fields dropped"
            );
        }
        if !observations.is_empty() {
            report.absorb(self.update_status(&observations)?);
        }

        log_report("sync", &report);
        Ok(report)
    }

    fn sync_symbol(&self, symbol: &str, rows: &[Row]) -> SymbolOutcome {
        let mut outcome = SymbolOutcome::default();
        let mut by_target: BTreeMap<String, Vec<Row>> = BTreeMap::new();
        for row in rows {
            let split = self.splitter.split_row(row);
            for (target, projected) in split.projections {
                by_target.entry(target).or_default().push(projected);
            }
            for column in split.unmapped {
                *outcome.unmapped.entry(column).or_insert(0) += 1;
            }
        }

        for target in self.splitter.targets() {
            let Some(rows) = by_target.remove(&target.name) else {
                continue;
            };
            match target.table {
                Some(table) => outcome.partitions.push(self.commit(table, Some(symbol), rows)),
                None if target.name == STATUS_TARGET => {
                    outcome.status.extend(status_observations(symbol, &rows));
                }
                None => debug!(target = %target.name, "projection has no store table"),
            }
        }
        outcome
    }

    /// Ingest rows already shaped for one table. Per-symbol tables take the
    /// partition from the `symbol` column.
    pub fn ingest(&self, table: TableKind, rows: Vec<Row>) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();

        match table.scope() {
            Scope::Global => {
                report.absorb(self.commit(table, None, rows));
            }
            Scope::PerSymbol => {
                let (groups, missing_symbol) = group_by_symbol(rows);
                report.symbols = groups.len();
                report.missing_symbol = missing_symbol;
                let outcomes: Vec<PartitionOutcome> = self.pool()?.install(|| {
                    groups
                        .into_par_iter()
                        .map(|(symbol, rows)| self.commit(table, Some(&symbol), rows))
                        .collect()
                });
                for outcome in outcomes {
                    report.absorb(outcome);
                }
            }
        }

        log_report("ingest", &report);
        Ok(report)
    }

    /// Validate and upsert one partition's batch.
    fn commit(&self, table: TableKind, symbol: Option<&str>, rows: Vec<Row>) -> PartitionOutcome {
        let validation = Validator::new(table, self.validator_config).validate(rows);
        let mut stats = TableSyncStats {
            incoming: validation.accepted.len() + validation.rejected.len(),
            accepted: validation.accepted.len(),
            rejected: validation.rejected.len(),
            ..Default::default()
        };
        let rejections = validation
            .rejected
            .iter()
            .map(|r| RowRejection {
                symbol: symbol.map(str::to_string),
                table,
                index: r.index,
                reasons: r.reasons.iter().map(ToString::to_string).collect(),
            })
            .collect();

        let result = match symbol {
            Some(symbol) => self.store.upsert(table, symbol, &validation.accepted),
            None => self.store.upsert_global(table, &validation.accepted),
        };
        let failure = match result {
            Ok(summary) => {
                stats.inserted = summary.inserted;
                stats.replaced = summary.replaced;
                stats.partitions_written = usize::from(!summary.unchanged);
                None
            }
            Err(e) => {
                warn!(table = %table, symbol = symbol.unwrap_or("-"), error = %e, "partition not committed");
                stats.accepted = 0;
                Some(PartitionFailure {
                    symbol: symbol.map(str::to_string),
                    table,
                    retryable: e.is_retryable(),
                    error: e.to_string(),
                })
            }
        };

        PartitionOutcome {
            table,
            stats,
            rejections,
            failure,
        }
    }

    /// Fold this run's status flags into `stock_status`.
    ///
    /// For every observed date, symbols seen in this run replace their own
    /// membership in the ST / HALT lists; symbols not seen keep theirs.
    fn update_status(&self, observations: &[StatusObservation]) -> Result<PartitionOutcome, SyncError> {
        let existing = self.existing_status().map_err(SyncError::Status)?;

        let mut seen: BTreeMap<NaiveDate, BTreeSet<&str>> = BTreeMap::new();
        let mut flagged: BTreeMap<(NaiveDate, &str), BTreeSet<&str>> = BTreeMap::new();
        for o in observations {
            seen.entry(o.date).or_default().insert(&o.symbol);
            if o.is_st {
                flagged.entry((o.date, status::ST)).or_default().insert(&o.symbol);
            }
            if o.halted {
                flagged.entry((o.date, status::HALT)).or_default().insert(&o.symbol);
            }
        }

        let mut rows = Vec::new();
        for (date, seen_here) in &seen {
            for kind in [status::ST, status::HALT] {
                let before = existing.get(&(*date, kind.to_string()));
                let mut after: BTreeSet<String> = before
                    .map(|set| {
                        set.iter()
                            .filter(|s| !seen_here.contains(s.as_str()))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                if let Some(set) = flagged.get(&(*date, kind)) {
                    after.extend(set.iter().map(|s| s.to_string()));
                }
                if before.map_or(after.is_empty(), |b| *b == after) {
                    continue;
                }
                let list: Vec<&String> = after.iter().collect();
                let json = serde_json::to_string(&list).unwrap_or_else(|_| "[]".to_string());
                rows.push(
                    Row::new()
                        .with("date", *date)
                        .with("status_type", kind)
                        .with("symbols", json),
                );
            }
        }
        Ok(self.commit(TableKind::StockStatus, None, rows))
    }

    fn existing_status(&self) -> Result<BTreeMap<(NaiveDate, String), BTreeSet<String>>, StoreError> {
        let mut out = BTreeMap::new();
        let Some(df) = self.store.load_global(TableKind::StockStatus)? else {
            return Ok(out);
        };
        let schema = TableKind::StockStatus.schema();
        for row in frame_to_rows(&schema, &df)? {
            let (Some(date), Some(kind)) = (row.date("date"), row.str("status_type")) else {
                continue;
            };
            let symbols: Vec<String> = row
                .str("symbols")
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_default();
            out.insert((date, kind.to_string()), symbols.into_iter().collect());
        }
        Ok(out)
    }
}

/// Group rows by their symbol column, removing it (it names the partition and
/// is not stored). Returns the groups and the number of rows without a symbol.
fn group_by_symbol(rows: Vec<Row>) -> (BTreeMap<String, Vec<Row>>, usize) {
    let mut groups: BTreeMap<String, Vec<Row>> = BTreeMap::new();
    let mut missing = 0;
    for mut row in rows {
        let symbol = match row.get(SYMBOL_COLUMN) {
            Some(Value::Str(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => {
                missing += 1;
                continue;
            }
        };
        row.remove(SYMBOL_COLUMN);
        groups.entry(symbol).or_default().push(row);
    }
    if missing > 0 {
        warn!(rows = missing, "rows without symbol skipped");
    }
    (groups, missing)
}

fn flag(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Float(v) if v.is_finite() => Some(*v),
        Value::Str(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn status_observations(symbol: &str, rows: &[Row]) -> Vec<StatusObservation> {
    rows.iter()
        .filter_map(|row| {
            let date = match row.get("date")? {
                Value::Date(d) => *d,
                Value::Str(s) => parse_date(s)?,
                Value::Float(v) => date_from_number(*v)?,
                Value::Null => return None,
            };
            let is_st = flag(row.get("isST")).is_some_and(|v| v == 1.0);
            let halted = flag(row.get("tradestatus")).is_some_and(|v| v == 0.0);
            Some(StatusObservation {
                symbol: symbol.to_string(),
                date,
                is_st,
                halted,
            })
        })
        .collect()
}

fn log_report(kind: &str, report: &SyncReport) {
    info!(
        kind,
        symbols = report.symbols,
        committed = report.committed_rows(),
        rejected = report.rejections.len(),
        failed_partitions = report.failures.len(),
        "run complete"
    );
}
