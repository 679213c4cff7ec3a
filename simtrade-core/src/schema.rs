//! Table schema registry: the contract between the writer and the export engine.
//!
//! Every persisted table is declared here with its exact columns, types and key.
//! The writer refuses rows or files that drift from these declarations, and the
//! export engine reads columns by the names declared here.
//!
//! - Per-symbol tables carry no `symbol` column: the symbol is the partition.
//! - Key columns are never null.
//! - Derived export fields (limit prices, TTM, forward-filled values) are absent
//!   on purpose: they are recomputed from raw columns at export time.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of the persisted layout. Bumped whenever a declared column changes.
pub const SCHEMA_VERSION: u32 = 3;

/// Column types used by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Date,
    Float64,
    Utf8,
}

impl ColumnType {
    /// The Polars dtype this column is persisted as.
    pub fn dtype(&self) -> DataType {
        match self {
            ColumnType::Date => DataType::Date,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Utf8 => DataType::String,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Date => "date",
            ColumnType::Float64 => "f64",
            ColumnType::Utf8 => "utf8",
        };
        f.write_str(name)
    }
}

/// How a column participates in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// Part of the table key. Never null.
    Key,
    /// Not part of the key, but never null (e.g. `publ_date`).
    Required,
    /// Nullable value; missing means null.
    Value,
    /// Nullable value; missing means 0.0 (sparse event tables).
    ZeroDefault,
}

/// A single declared column.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub dtype: ColumnType,
    pub role: ColumnRole,
}

impl ColumnDef {
    pub fn is_key(&self) -> bool {
        self.role == ColumnRole::Key
    }
}

const fn key(name: &'static str, dtype: ColumnType) -> ColumnDef {
    ColumnDef {
        name,
        dtype,
        role: ColumnRole::Key,
    }
}

const fn required(name: &'static str, dtype: ColumnType) -> ColumnDef {
    ColumnDef {
        name,
        dtype,
        role: ColumnRole::Required,
    }
}

const fn value(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        dtype: ColumnType::Float64,
        role: ColumnRole::Value,
    }
}

const fn text(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        dtype: ColumnType::Utf8,
        role: ColumnRole::Value,
    }
}

const fn zero(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        dtype: ColumnType::Float64,
        role: ColumnRole::ZeroDefault,
    }
}

const DAILY_BAR: &[ColumnDef] = &[
    key("date", ColumnType::Date),
    value("open"),
    value("high"),
    value("low"),
    value("close"),
    value("preclose"),
    value("volume"),
    value("money"),
];

const EXRIGHTS: &[ColumnDef] = &[
    key("date", ColumnType::Date),
    zero("allotted_ps"),
    zero("rationed_ps"),
    zero("rationed_px"),
    zero("bonus_ps"),
    zero("dividend"),
];

const VALUATION: &[ColumnDef] = &[
    key("date", ColumnType::Date),
    value("pe_ttm"),
    value("pb"),
    value("ps_ttm"),
    value("pcf"),
    value("turnover_rate"),
];

const FUNDAMENTALS: &[ColumnDef] = &[
    key("report_date", ColumnType::Date),
    required("publ_date", ColumnType::Date),
    // Stored ratio metrics
    value("accounts_receivables_turnover_rate"),
    value("basic_eps_yoy"),
    value("current_assets_turnover_rate"),
    value("current_ratio"),
    value("debt_equity_ratio"),
    value("gross_income_ratio"),
    value("interest_cover"),
    value("inventory_turnover_rate"),
    value("net_profit_grow_rate"),
    value("net_profit_ratio"),
    value("np_parent_company_yoy"),
    value("operating_revenue_grow_rate"),
    value("quick_ratio"),
    value("roa"),
    value("roe"),
    value("roic"),
    value("total_asset_grow_rate"),
    value("total_asset_turnover_rate"),
    // Share capital, forward-filled onto valuation
    value("total_shares"),
    value("a_floats"),
    // Single-quarter flows and period-end balances feeding TTM
    value("operating_revenue"),
    value("operating_cost"),
    value("net_profit"),
    value("ebit"),
    value("total_assets"),
    value("total_equity"),
];

const ADJUST_FACTOR: &[ColumnDef] = &[key("date", ColumnType::Date), value("adj_a"), value("adj_b")];

const STOCK_METADATA: &[ColumnDef] = &[
    key("symbol", ColumnType::Utf8),
    text("name"),
    ColumnDef {
        name: "listed_date",
        dtype: ColumnType::Date,
        role: ColumnRole::Value,
    },
    ColumnDef {
        name: "delisted_date",
        dtype: ColumnType::Date,
        role: ColumnRole::Value,
    },
    text("blocks"),
];

const TRADE_DAYS: &[ColumnDef] = &[key("date", ColumnType::Date)];

const INDEX_CONSTITUENTS: &[ColumnDef] = &[
    key("date", ColumnType::Date),
    key("index_code", ColumnType::Utf8),
    text("symbols"),
];

const STOCK_STATUS: &[ColumnDef] = &[
    key("date", ColumnType::Date),
    key("status_type", ColumnType::Utf8),
    text("symbols"),
];

/// Whether a table is partitioned by symbol or stored as one global partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    PerSymbol,
    Global,
}

/// Every logical table the store knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    #[serde(rename = "stocks")]
    DailyBar,
    Exrights,
    Valuation,
    Fundamentals,
    AdjPre,
    AdjPost,
    StockMetadata,
    TradeDays,
    IndexConstituents,
    StockStatus,
}

impl TableKind {
    pub const ALL: [TableKind; 10] = [
        TableKind::DailyBar,
        TableKind::Exrights,
        TableKind::Valuation,
        TableKind::Fundamentals,
        TableKind::AdjPre,
        TableKind::AdjPost,
        TableKind::StockMetadata,
        TableKind::TradeDays,
        TableKind::IndexConstituents,
        TableKind::StockStatus,
    ];

    /// Directory / file stem used on disk.
    pub fn name(&self) -> &'static str {
        match self {
            TableKind::DailyBar => "stocks",
            TableKind::Exrights => "exrights",
            TableKind::Valuation => "valuation",
            TableKind::Fundamentals => "fundamentals",
            TableKind::AdjPre => "adj_pre",
            TableKind::AdjPost => "adj_post",
            TableKind::StockMetadata => "stock_metadata",
            TableKind::TradeDays => "trade_days",
            TableKind::IndexConstituents => "index_constituents",
            TableKind::StockStatus => "stock_status",
        }
    }

    pub fn from_name(name: &str) -> Option<TableKind> {
        TableKind::ALL.iter().copied().find(|t| t.name() == name)
    }

    pub fn scope(&self) -> Scope {
        match self {
            TableKind::StockMetadata
            | TableKind::TradeDays
            | TableKind::IndexConstituents
            | TableKind::StockStatus => Scope::Global,
            _ => Scope::PerSymbol,
        }
    }

    pub fn schema(&self) -> TableSchema {
        let columns = match self {
            TableKind::DailyBar => DAILY_BAR,
            TableKind::Exrights => EXRIGHTS,
            TableKind::Valuation => VALUATION,
            TableKind::Fundamentals => FUNDAMENTALS,
            TableKind::AdjPre | TableKind::AdjPost => ADJUST_FACTOR,
            TableKind::StockMetadata => STOCK_METADATA,
            TableKind::TradeDays => TRADE_DAYS,
            TableKind::IndexConstituents => INDEX_CONSTITUENTS,
            TableKind::StockStatus => STOCK_STATUS,
        };
        TableSchema {
            table: *self,
            columns,
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared columns of one table.
#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub table: TableKind,
    pub columns: &'static [ColumnDef],
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&'static ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn key_columns(&self) -> impl Iterator<Item = &'static ColumnDef> {
        self.columns.iter().filter(|c| c.is_key())
    }

    pub fn key_names(&self) -> Vec<&'static str> {
        self.key_columns().map(|c| c.name).collect()
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    /// The Polars schema a persisted partition must have.
    pub fn polars_schema(&self) -> Schema {
        Schema::from_iter(
            self.columns
                .iter()
                .map(|c| Field::new(c.name.into(), c.dtype.dtype())),
        )
    }

    /// Check a DataFrame against the declaration: same columns, same types.
    ///
    /// Column order is not checked; callers reorder with `select` afterwards.
    pub fn check_frame(&self, df: &DataFrame) -> Result<(), String> {
        let actual = df.schema();
        let mut errors = Vec::new();

        for col in self.columns {
            match actual.get(col.name) {
                Some(dtype) if *dtype == col.dtype.dtype() => {}
                Some(dtype) => errors.push(format!(
                    "column '{}': expected {}, got {dtype:?}",
                    col.name, col.dtype
                )),
                None => errors.push(format!("missing column '{}'", col.name)),
            }
        }
        for name in actual.iter_names() {
            if self.column(name.as_str()).is_none() {
                errors.push(format!("unexpected column '{name}'"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_has_a_key() {
        for table in TableKind::ALL {
            assert!(
                !table.schema().key_names().is_empty(),
                "{table} declares no key"
            );
        }
    }

    #[test]
    fn names_roundtrip() {
        for table in TableKind::ALL {
            assert_eq!(TableKind::from_name(table.name()), Some(table));
        }
        assert_eq!(TableKind::from_name("nope"), None);
    }

    #[test]
    fn derived_fields_are_not_persisted() {
        let bars = TableKind::DailyBar.schema();
        assert!(bars.column("high_limit").is_none());
        assert!(bars.column("low_limit").is_none());

        let valuation = TableKind::Valuation.schema();
        for derived in ["roe", "roa", "total_shares", "a_floats", "naps", "roe_ttm"] {
            assert!(valuation.column(derived).is_none(), "{derived} persisted");
        }

        let fundamentals = TableKind::Fundamentals.schema();
        assert!(fundamentals.column("roe_ttm").is_none());
    }

    #[test]
    fn check_frame_accepts_declared_layout() {
        let df = DataFrame::new(vec![
            Column::new("date".into(), &[19723i32])
                .cast(&DataType::Date)
                .unwrap(),
            Column::new("adj_a".into(), &[1.0f64]),
            Column::new("adj_b".into(), &[0.0f64]),
        ])
        .unwrap();

        assert!(TableKind::AdjPre.schema().check_frame(&df).is_ok());
    }

    #[test]
    fn check_frame_reports_drift() {
        let df = DataFrame::new(vec![
            Column::new("date".into(), &[19723i32])
                .cast(&DataType::Date)
                .unwrap(),
            Column::new("adj_a".into(), &["1.0"]),
            Column::new("extra".into(), &[0.0f64]),
        ])
        .unwrap();

        let err = TableKind::AdjPre.schema().check_frame(&df).unwrap_err();
        assert!(err.contains("adj_a"));
        assert!(err.contains("missing column 'adj_b'"));
        assert!(err.contains("unexpected column 'extra'"));
    }

    #[test]
    fn global_tables_are_global() {
        assert_eq!(TableKind::StockStatus.scope(), Scope::Global);
        assert_eq!(TableKind::TradeDays.scope(), Scope::Global);
        assert_eq!(TableKind::DailyBar.scope(), Scope::PerSymbol);
    }
}
