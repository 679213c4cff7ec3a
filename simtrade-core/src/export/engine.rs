//! Per-symbol export with derived fields recomputed from raw store columns.
//!
//! The engine only reads the store. Derived fields:
//! - `stocks`: `high_limit`, `low_limit` from `preclose`, board and ST status
//! - `valuation`: `roe`, `roa`, `total_shares`, `a_floats` forward-filled by
//!   publication date; `roe_ttm`, `roa_ttm`; `naps`; `total_value`,
//!   `float_value`
//! - `fundamentals`: the five TTM metrics
//! - `exrights`: adjust factors as of each event date
//!
//! A derived field that cannot be computed is null and reported as a
//! `ComputationIssue`; the row is still emitted.

use super::asof::{asof_indices, exact_indices, forward_fill};
use super::manifest::FileEntry;
use super::ttm::{ttm_at, QuarterReport, TtmMetrics, ZeroDenominator};
use crate::data::frame::{date_values, f64_values, str_values, write_parquet_atomic};
use crate::data::store::PartitionStore;
use crate::domain::{limit_prices, status, to_epoch_days, Board};
use crate::error::{ComputationIssue, ExportError};
use crate::schema::{Scope, TableKind};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::warn;

/// Per-symbol tables in export order.
pub const SYMBOL_TABLES: [TableKind; 6] = [
    TableKind::DailyBar,
    TableKind::Valuation,
    TableKind::Fundamentals,
    TableKind::Exrights,
    TableKind::AdjPre,
    TableKind::AdjPost,
];

/// Global tables, exported under `metadata/`.
pub const GLOBAL_TABLES: [TableKind; 4] = [
    TableKind::StockMetadata,
    TableKind::TradeDays,
    TableKind::IndexConstituents,
    TableKind::StockStatus,
];

pub const METADATA_DIR: &str = "metadata";

/// Output of one table for one symbol.
#[derive(Debug, Clone)]
pub struct TableExport {
    pub table: TableKind,
    pub frame: DataFrame,
    pub issues: Vec<ComputationIssue>,
}

/// Files written for one symbol.
#[derive(Debug, Clone, Default)]
pub struct SymbolExport {
    pub symbol: String,
    pub files: Vec<FileEntry>,
    pub issues: Vec<ComputationIssue>,
    /// First and last exported daily-bar date.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

/// One fundamentals record with the fields the valuation series needs.
#[derive(Debug, Clone)]
struct Fundamental {
    publ_date: NaiveDate,
    roe: Option<f64>,
    roa: Option<f64>,
    total_shares: Option<f64>,
    a_floats: Option<f64>,
    quarter: QuarterReport,
}

pub struct ExportEngine<'a> {
    store: &'a PartitionStore,
    as_of: NaiveDate,
    st_by_date: HashMap<NaiveDate, HashSet<String>>,
}

impl<'a> ExportEngine<'a> {
    /// Prepare an export of `store` as known at `as_of`.
    pub fn open(store: &'a PartitionStore, as_of: NaiveDate) -> Result<Self, ExportError> {
        let mut st_by_date: HashMap<NaiveDate, HashSet<String>> = HashMap::new();

        if let Some(df) = store.load_global(TableKind::StockStatus)? {
            let table = TableKind::StockStatus;
            let err = |e: PolarsError| frame_error(table, "-", e);
            let dates = date_values(&df, "date").map_err(err)?;
            let kinds = str_values(&df, "status_type").map_err(err)?;
            let lists = str_values(&df, "symbols").map_err(err)?;

            for ((date, kind), list) in dates.into_iter().zip(kinds).zip(lists) {
                let (Some(date), Some(kind)) = (date, kind) else {
                    continue;
                };
                if kind != status::ST || date > as_of {
                    continue;
                }
                let list = list.unwrap_or_default();
                match serde_json::from_str::<Vec<String>>(&list) {
                    Ok(symbols) => st_by_date.entry(date).or_default().extend(symbols),
                    Err(e) => warn!(%date, error = %e, "unreadable ST symbol list skipped"),
                }
            }
        }

        Ok(Self {
            store,
            as_of,
            st_by_date,
        })
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn is_st(&self, symbol: &str, date: NaiveDate) -> bool {
        self.st_by_date
            .get(&date)
            .is_some_and(|symbols| symbols.contains(symbol))
    }

    /// Every symbol with data in any per-symbol table, sorted.
    pub fn symbols(&self) -> Result<Vec<String>, ExportError> {
        let mut all = BTreeSet::new();
        for table in SYMBOL_TABLES {
            all.extend(self.store.symbols(table)?);
        }
        Ok(all.into_iter().collect())
    }

    /// Export one per-symbol table, ordered by key.
    pub fn export(&self, table: TableKind, symbol: &str) -> Result<TableExport, ExportError> {
        if table.scope() == Scope::Global {
            return Err(ExportError::Frame {
                table,
                symbol: symbol.to_string(),
                reason: "global table; use export_global".to_string(),
            });
        }
        match table {
            TableKind::DailyBar => self.export_bars(symbol),
            TableKind::Valuation => self.export_valuation(symbol),
            TableKind::Fundamentals => self.export_fundamentals(symbol),
            TableKind::Exrights => self.export_exrights(symbol),
            _ => Ok(TableExport {
                table,
                frame: self.load_dated(table, symbol, "date")?,
                issues: Vec::new(),
            }),
        }
    }

    /// Export a global table: dated tables are cut at `as_of`.
    pub fn export_global(&self, table: TableKind) -> Result<TableExport, ExportError> {
        let df = match self.store.load_global(table)? {
            Some(df) => df,
            None => empty_frame(table),
        };
        let frame = match table {
            TableKind::StockMetadata => df,
            _ => cut(df, "date", self.as_of).map_err(|e| frame_error(table, "-", e))?,
        };
        Ok(TableExport {
            table,
            frame,
            issues: Vec::new(),
        })
    }

    /// Raw partition with `date_col ≤ as_of`; empty (but typed) when absent.
    fn load_dated(&self, table: TableKind, symbol: &str, date_col: &str) -> Result<DataFrame, ExportError> {
        let df = match self.store.load(table, symbol)? {
            Some(df) => df,
            None => empty_frame(table),
        };
        cut(df, date_col, self.as_of).map_err(|e| frame_error(table, symbol, e))
    }

    fn export_bars(&self, symbol: &str) -> Result<TableExport, ExportError> {
        let table = TableKind::DailyBar;
        let err = |e: PolarsError| frame_error(table, symbol, e);
        let mut df = self.load_dated(table, symbol, "date")?;

        let dates = date_values(&df, "date").map_err(err)?;
        let preclose = f64_values(&df, "preclose").map_err(err)?;
        let board = Board::from_symbol(symbol);

        let mut high = Vec::with_capacity(dates.len());
        let mut low = Vec::with_capacity(dates.len());
        let mut issues = Vec::new();
        for (date, pre) in dates.iter().zip(&preclose) {
            let Some(date) = *date else {
                high.push(None);
                low.push(None);
                continue;
            };
            let pct = board.limit_pct(self.is_st(symbol, date));
            match pre.and_then(|p| limit_prices(p, pct)) {
                Some(limits) => {
                    high.push(Some(limits.high));
                    low.push(Some(limits.low));
                }
                None => {
                    let reason = match pre {
                        None => "missing preclose".to_string(),
                        Some(p) => format!("preclose {p} is not a positive price"),
                    };
                    for field in ["high_limit", "low_limit"] {
                        issues.push(issue(table, symbol, date, field, &reason));
                    }
                    high.push(None);
                    low.push(None);
                }
            }
        }

        df.with_column(Column::new("high_limit".into(), high)).map_err(err)?;
        df.with_column(Column::new("low_limit".into(), low)).map_err(err)?;
        Ok(TableExport {
            table,
            frame: df,
            issues,
        })
    }

    /// Fundamentals known at `as_of`, sorted by report date.
    fn fundamentals(&self, symbol: &str) -> Result<(DataFrame, Vec<Fundamental>), ExportError> {
        let table = TableKind::Fundamentals;
        let err = |e: PolarsError| frame_error(table, symbol, e);
        let df = self.load_dated(table, symbol, "publ_date")?;

        let report_dates = date_values(&df, "report_date").map_err(err)?;
        let publ_dates = date_values(&df, "publ_date").map_err(err)?;
        let col = |name: &str| f64_values(&df, name).map_err(err);
        let (roe, roa) = (col("roe")?, col("roa")?);
        let (total_shares, a_floats) = (col("total_shares")?, col("a_floats")?);
        let (revenue, cost) = (col("operating_revenue")?, col("operating_cost")?);
        let (profit, ebit) = (col("net_profit")?, col("ebit")?);
        let (assets, equity) = (col("total_assets")?, col("total_equity")?);

        let mut records = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let (Some(report_date), Some(publ_date)) = (report_dates[i], publ_dates[i]) else {
                continue;
            };
            records.push(Fundamental {
                publ_date,
                roe: roe[i],
                roa: roa[i],
                total_shares: total_shares[i],
                a_floats: a_floats[i],
                quarter: QuarterReport {
                    report_date,
                    operating_revenue: revenue[i],
                    operating_cost: cost[i],
                    net_profit: profit[i],
                    ebit: ebit[i],
                    total_assets: assets[i],
                    total_equity: equity[i],
                },
            });
        }
        records.sort_by_key(|r| r.quarter.report_date);
        Ok((df, records))
    }

    fn export_fundamentals(&self, symbol: &str) -> Result<TableExport, ExportError> {
        let table = TableKind::Fundamentals;
        let err = |e: PolarsError| frame_error(table, symbol, e);
        let (mut df, records) = self.fundamentals(symbol)?;
        let quarters: Vec<QuarterReport> = records.iter().map(|r| r.quarter).collect();

        let mut issues = Vec::new();
        let mut columns: [Vec<Option<f64>>; 5] = Default::default();
        for (i, q) in quarters.iter().enumerate() {
            let (metrics, zeros) = ttm_at(&quarters, i);
            push_zero_issues(&mut issues, table, symbol, q.report_date, &zeros);
            for (column, value) in columns.iter_mut().zip(metrics.values()) {
                column.push(value);
            }
        }
        for (name, values) in TtmMetrics::FIELDS.iter().zip(columns) {
            df.with_column(Column::new((*name).into(), values)).map_err(err)?;
        }
        Ok(TableExport {
            table,
            frame: df,
            issues,
        })
    }

    fn export_valuation(&self, symbol: &str) -> Result<TableExport, ExportError> {
        let table = TableKind::Valuation;
        let err = |e: PolarsError| frame_error(table, symbol, e);
        let mut df = self.load_dated(table, symbol, "date")?;
        let dates: Vec<NaiveDate> = date_values(&df, "date")
            .map_err(err)?
            .into_iter()
            .flatten()
            .collect();
        let pb = f64_values(&df, "pb").map_err(err)?;

        // close from the same-date daily bar
        let bars = self.load_dated(TableKind::DailyBar, symbol, "date")?;
        let bar_dates: Vec<NaiveDate> = date_values(&bars, "date")
            .map_err(err)?
            .into_iter()
            .flatten()
            .collect();
        let bar_close = f64_values(&bars, "close").map_err(err)?;
        let close: Vec<Option<f64>> = exact_indices(&dates, &bar_dates)
            .into_iter()
            .map(|i| i.and_then(|i| bar_close[i]))
            .collect();

        // quarter-sourced values, effective from their publication date
        let (_, records) = self.fundamentals(symbol)?;
        let mut by_publication: Vec<&Fundamental> = records.iter().collect();
        by_publication.sort_by_key(|r| (r.publ_date, r.quarter.report_date));
        let publ_dates: Vec<NaiveDate> = by_publication.iter().map(|r| r.publ_date).collect();
        let published = forward_fill(&dates, &publ_dates, &by_publication);

        // TTM window ends at the latest report dated on or before the row
        let quarters: Vec<QuarterReport> = records.iter().map(|r| r.quarter).collect();
        let report_dates: Vec<NaiveDate> = quarters.iter().map(|q| q.report_date).collect();
        let ttm_by_report: Vec<(TtmMetrics, Vec<ZeroDenominator>)> =
            (0..quarters.len()).map(|i| ttm_at(&quarters, i)).collect();
        let ttm_end = asof_indices(&dates, &report_dates);

        let n = dates.len();
        let mut roe = Vec::with_capacity(n);
        let mut roa = Vec::with_capacity(n);
        let mut total_shares = Vec::with_capacity(n);
        let mut a_floats = Vec::with_capacity(n);
        let mut roe_ttm = Vec::with_capacity(n);
        let mut roa_ttm = Vec::with_capacity(n);
        let mut naps = Vec::with_capacity(n);
        let mut total_value = Vec::with_capacity(n);
        let mut float_value = Vec::with_capacity(n);
        let mut issues = Vec::new();

        for i in 0..n {
            let date = dates[i];
            let fund = published[i];
            roe.push(fund.and_then(|f| f.roe));
            roa.push(fund.and_then(|f| f.roa));
            let shares = fund.and_then(|f| f.total_shares);
            let floats = fund.and_then(|f| f.a_floats);
            total_shares.push(shares);
            a_floats.push(floats);

            match ttm_end[i].map(|end| &ttm_by_report[end]) {
                Some((metrics, zeros)) => {
                    roe_ttm.push(metrics.roe_ttm);
                    roa_ttm.push(metrics.roa_ttm);
                    let relevant: Vec<ZeroDenominator> = zeros
                        .iter()
                        .copied()
                        .filter(|z| z.field == "roe_ttm" || z.field == "roa_ttm")
                        .collect();
                    push_zero_issues(&mut issues, table, symbol, date, &relevant);
                }
                None => {
                    roe_ttm.push(None);
                    roa_ttm.push(None);
                }
            }

            naps.push(match (close[i], pb[i]) {
                (_, None) => None,
                (_, Some(p)) if p == 0.0 => {
                    issues.push(issue(table, symbol, date, "naps", "pb is zero"));
                    None
                }
                (None, Some(_)) => {
                    issues.push(issue(table, symbol, date, "naps", "no daily bar on this date"));
                    None
                }
                (Some(c), Some(p)) => Some(c / p),
            });
            total_value.push(close[i].zip(shares).map(|(c, s)| c * s));
            float_value.push(close[i].zip(floats).map(|(c, f)| c * f));
        }

        let derived: [(&str, Vec<Option<f64>>); 9] = [
            ("roe", roe),
            ("roa", roa),
            ("total_shares", total_shares),
            ("a_floats", a_floats),
            ("roe_ttm", roe_ttm),
            ("roa_ttm", roa_ttm),
            ("naps", naps),
            ("total_value", total_value),
            ("float_value", float_value),
        ];
        for (name, values) in derived {
            df.with_column(Column::new(name.into(), values)).map_err(err)?;
        }
        Ok(TableExport {
            table,
            frame: df,
            issues,
        })
    }

    fn export_exrights(&self, symbol: &str) -> Result<TableExport, ExportError> {
        let table = TableKind::Exrights;
        let err = |e: PolarsError| frame_error(table, symbol, e);
        let mut df = self.load_dated(table, symbol, "date")?;
        let dates: Vec<NaiveDate> = date_values(&df, "date")
            .map_err(err)?
            .into_iter()
            .flatten()
            .collect();

        let mut issues = Vec::new();
        let variants = [
            (TableKind::AdjPre, "exer_forward_a", "exer_forward_b"),
            (TableKind::AdjPost, "exer_backward_a", "exer_backward_b"),
        ];
        for (adj_table, a_name, b_name) in variants {
            let adj = self.load_dated(adj_table, symbol, "date")?;
            let adj_dates: Vec<NaiveDate> = date_values(&adj, "date")
                .map_err(err)?
                .into_iter()
                .flatten()
                .collect();
            let adj_a = f64_values(&adj, "adj_a").map_err(err)?;
            let adj_b = f64_values(&adj, "adj_b").map_err(err)?;

            let idx = asof_indices(&dates, &adj_dates);
            if !adj_dates.is_empty() {
                for (date, i) in dates.iter().zip(&idx) {
                    if i.is_none() {
                        let reason = format!("no {adj_table} factor on or before event");
                        issues.push(issue(table, symbol, *date, a_name, &reason));
                    }
                }
            }
            let a: Vec<Option<f64>> = idx.iter().map(|i| i.and_then(|i| adj_a[i])).collect();
            let b: Vec<Option<f64>> = idx.iter().map(|i| i.and_then(|i| adj_b[i])).collect();
            df.with_column(Column::new(a_name.into(), a)).map_err(err)?;
            df.with_column(Column::new(b_name.into(), b)).map_err(err)?;
        }
        Ok(TableExport {
            table,
            frame: df,
            issues,
        })
    }

    /// Export every per-symbol table of `symbol` into `out_dir/{table}/{symbol}.parquet`.
    ///
    /// Tables without rows for the symbol produce no file.
    pub fn write_symbol(&self, symbol: &str, out_dir: &Path) -> Result<SymbolExport, ExportError> {
        let mut result = SymbolExport {
            symbol: symbol.to_string(),
            ..Default::default()
        };

        for table in SYMBOL_TABLES {
            let TableExport { mut frame, issues, .. } = self.export(table, symbol)?;
            result.issues.extend(issues);
            if frame.height() == 0 {
                continue;
            }
            if table == TableKind::DailyBar {
                let dates = date_values(&frame, "date").map_err(|e| frame_error(table, symbol, e))?;
                let first = dates.iter().flatten().min().copied();
                let last = dates.iter().flatten().max().copied();
                result.date_range = first.zip(last);
            }
            let rel = format!("{}/{symbol}.parquet", table.name());
            let hash = write_parquet_atomic(&mut frame, &out_dir.join(&rel))?;
            result.files.push(FileEntry {
                table: table.name().to_string(),
                path: rel,
                rows: frame.height(),
                hash,
            });
        }

        if !result.issues.is_empty() {
            warn!(
                symbol,
                issues = result.issues.len(),
                first = %result.issues[0],
                "derived fields left null"
            );
        }
        Ok(result)
    }

    /// Export the global tables into `out_dir/metadata/{table}.parquet`.
    pub fn write_globals(&self, out_dir: &Path) -> Result<Vec<FileEntry>, ExportError> {
        let mut files = Vec::new();
        for table in GLOBAL_TABLES {
            let TableExport { mut frame, .. } = self.export_global(table)?;
            if frame.height() == 0 {
                continue;
            }
            let rel = format!("{METADATA_DIR}/{}.parquet", table.name());
            let hash = write_parquet_atomic(&mut frame, &out_dir.join(&rel))?;
            files.push(FileEntry {
                table: METADATA_DIR.to_string(),
                path: rel,
                rows: frame.height(),
                hash,
            });
        }
        Ok(files)
    }
}

fn frame_error(table: TableKind, symbol: &str, e: PolarsError) -> ExportError {
    ExportError::Frame {
        table,
        symbol: symbol.to_string(),
        reason: e.to_string(),
    }
}

fn issue(table: TableKind, symbol: &str, date: NaiveDate, field: &str, reason: &str) -> ComputationIssue {
    ComputationIssue {
        table,
        symbol: symbol.to_string(),
        date,
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn push_zero_issues(
    issues: &mut Vec<ComputationIssue>,
    table: TableKind,
    symbol: &str,
    date: NaiveDate,
    zeros: &[ZeroDenominator],
) {
    for z in zeros {
        issues.push(issue(table, symbol, date, z.field, "zero denominator"));
    }
}

/// Rows with `date_col ≤ as_of`, compared on the physical day count.
fn cut(df: DataFrame, date_col: &str, as_of: NaiveDate) -> PolarsResult<DataFrame> {
    df.lazy()
        .filter(
            col(date_col)
                .cast(DataType::Int32)
                .lt_eq(lit(to_epoch_days(as_of))),
        )
        .collect()
}

/// A zero-row frame with the table's declared columns.
fn empty_frame(table: TableKind) -> DataFrame {
    DataFrame::empty_with_schema(&table.schema().polars_schema())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Row;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn bar(date: NaiveDate, preclose: Option<f64>, close: f64) -> Row {
        Row::new()
            .with("date", date)
            .with("open", close)
            .with("high", close)
            .with("low", close)
            .with("close", close)
            .with("preclose", preclose)
            .with("volume", 1.0)
            .with("money", close)
    }

    fn limits_of(export: &TableExport) -> Vec<(Option<f64>, Option<f64>)> {
        f64_values(&export.frame, "high_limit")
            .unwrap()
            .into_iter()
            .zip(f64_values(&export.frame, "low_limit").unwrap())
            .collect()
    }

    #[test]
    fn limit_prices_follow_board_and_st() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        store
            .upsert(
                TableKind::DailyBar,
                "600000.SS",
                &[bar(d(2024, 1, 2), Some(10.0), 10.0), bar(d(2024, 1, 3), Some(10.0), 10.0)],
            )
            .unwrap();
        store
            .upsert_global(
                TableKind::StockStatus,
                &[Row::new()
                    .with("date", d(2024, 1, 3))
                    .with("status_type", "ST")
                    .with("symbols", r#"["600000.SS"]"#)],
            )
            .unwrap();

        let engine = ExportEngine::open(&store, d(2024, 12, 31)).unwrap();
        let export = engine.export(TableKind::DailyBar, "600000.SS").unwrap();
        assert_eq!(
            limits_of(&export),
            vec![(Some(11.0), Some(9.0)), (Some(10.5), Some(9.5))]
        );
        assert!(export.issues.is_empty());
    }

    #[test]
    fn missing_preclose_is_an_issue_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        store
            .upsert(
                TableKind::DailyBar,
                "000001.SZ",
                &[bar(d(2024, 1, 2), None, 10.0), bar(d(2024, 1, 3), Some(10.05), 10.0)],
            )
            .unwrap();

        let engine = ExportEngine::open(&store, d(2024, 12, 31)).unwrap();
        let export = engine.export(TableKind::DailyBar, "000001.SZ").unwrap();
        assert_eq!(export.frame.height(), 2);
        assert_eq!(limits_of(&export), vec![(None, None), (Some(11.06), Some(9.05))]);
        assert_eq!(export.issues.len(), 2);
        assert_eq!(export.issues[0].date, d(2024, 1, 2));
        assert_eq!(export.issues[0].reason, "missing preclose");
    }

    #[test]
    fn as_of_cuts_daily_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        store
            .upsert(
                TableKind::DailyBar,
                "000001.SZ",
                &[bar(d(2024, 1, 2), Some(10.0), 10.0), bar(d(2024, 1, 3), Some(10.0), 10.0)],
            )
            .unwrap();

        let engine = ExportEngine::open(&store, d(2024, 1, 2)).unwrap();
        let export = engine.export(TableKind::DailyBar, "000001.SZ").unwrap();
        assert_eq!(export.frame.height(), 1);
    }

    #[test]
    fn exrights_pick_up_factors_as_of_event() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        store
            .upsert(
                TableKind::Exrights,
                "000001.SZ",
                &[Row::new().with("date", d(2024, 6, 14)).with("dividend", 0.72)],
            )
            .unwrap();
        let factor = |date, a: f64| Row::new().with("date", date).with("adj_a", a).with("adj_b", 0.0);
        store
            .upsert(
                TableKind::AdjPre,
                "000001.SZ",
                &[factor(d(2024, 1, 2), 0.9), factor(d(2024, 6, 14), 0.95)],
            )
            .unwrap();

        let engine = ExportEngine::open(&store, d(2024, 12, 31)).unwrap();
        let export = engine.export(TableKind::Exrights, "000001.SZ").unwrap();
        assert_eq!(f64_values(&export.frame, "exer_forward_a").unwrap(), vec![Some(0.95)]);
        assert_eq!(f64_values(&export.frame, "exer_backward_a").unwrap(), vec![None]);
        assert_eq!(f64_values(&export.frame, "bonus_ps").unwrap(), vec![Some(0.0)]);
        assert!(export.issues.is_empty());
    }

    #[test]
    fn global_tables_are_not_per_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        let engine = ExportEngine::open(&store, d(2024, 12, 31)).unwrap();
        assert!(engine.export(TableKind::TradeDays, "000001.SZ").is_err());
        assert_eq!(engine.export_global(TableKind::TradeDays).unwrap().frame.height(), 0);
    }
}
