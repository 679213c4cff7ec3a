//! Row validation ahead of the writer.
//!
//! Every rule is evaluated per row and independently: a bad row is reported,
//! never fatal for its batch. Validation also normalizes the cells it can
//! (date strings into dates, NaN into null) so the writer only sees
//! well-typed values.

use crate::domain::{date_from_number, format_key, parse_date, status, Key, Row, Value};
use crate::schema::{ColumnRole, ColumnType, TableKind, TableSchema};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

const PRICE_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "preclose"];
const AMOUNT_COLUMNS: [&str; 2] = ["volume", "money"];
/// JSON array of symbols in `stock_status` and `index_constituents`.
const SYMBOL_LIST_COLUMN: &str = "symbols";

/// Why a row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum RejectReason {
    #[error("invalid-date: '{column}'")]
    InvalidDate { column: String },

    #[error("out-of-calendar-range: '{column}' = {date}")]
    OutOfCalendarRange { column: String, date: NaiveDate },

    #[error("negative-value: '{column}'")]
    NegativeValue { column: String },

    #[error("high-below-low")]
    HighBelowLow,

    #[error("duplicate-in-batch")]
    DuplicateInBatch,

    #[error("published-before-report")]
    PublishedBeforeReport,

    #[error("missing-required: '{column}'")]
    MissingRequired { column: String },

    #[error("unknown-status-type: '{value}'")]
    UnknownStatusType { value: String },

    #[error("malformed-symbol-list: '{column}'")]
    MalformedSymbolList { column: String },
}

/// A row that will not reach the writer.
#[derive(Debug, Clone)]
pub struct Rejection {
    /// Position in the input batch.
    pub index: usize,
    pub row: Row,
    pub reasons: Vec<RejectReason>,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub accepted: Vec<Row>,
    pub rejected: Vec<Rejection>,
}

impl ValidationOutcome {
    /// Rejection counts by reason tag (e.g. `"duplicate-in-batch"`).
    pub fn reason_counts(&self) -> HashMap<&'static str, usize> {
        let mut counts = HashMap::new();
        for rejection in &self.rejected {
            for reason in &rejection.reasons {
                *counts.entry(reason.tag()).or_insert(0) += 1;
            }
        }
        counts
    }
}

impl RejectReason {
    pub fn tag(&self) -> &'static str {
        match self {
            RejectReason::InvalidDate { .. } => "invalid-date",
            RejectReason::OutOfCalendarRange { .. } => "out-of-calendar-range",
            RejectReason::NegativeValue { .. } => "negative-value",
            RejectReason::HighBelowLow => "high-below-low",
            RejectReason::DuplicateInBatch => "duplicate-in-batch",
            RejectReason::PublishedBeforeReport => "published-before-report",
            RejectReason::MissingRequired { .. } => "missing-required",
            RejectReason::UnknownStatusType { .. } => "unknown-status-type",
            RejectReason::MalformedSymbolList { .. } => "malformed-symbol-list",
        }
    }
}

/// Declared trading-calendar range. Unset bounds are not checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub calendar_start: Option<NaiveDate>,
    pub calendar_end: Option<NaiveDate>,
}

impl ValidatorConfig {
    fn in_range(&self, date: NaiveDate) -> bool {
        self.calendar_start.map_or(true, |s| date >= s) && self.calendar_end.map_or(true, |e| date <= e)
    }
}

/// Validator for one table.
#[derive(Debug, Clone)]
pub struct Validator {
    schema: TableSchema,
    config: ValidatorConfig,
}

impl Validator {
    pub fn new(table: TableKind, config: ValidatorConfig) -> Self {
        Self {
            schema: table.schema(),
            config,
        }
    }

    pub fn table(&self) -> TableKind {
        self.schema.table
    }

    /// Split a batch into accepted and rejected rows.
    ///
    /// Duplicate keys among otherwise valid rows collapse to the last
    /// occurrence; the earlier ones are rejected as `duplicate-in-batch`.
    /// Accepted rows keep their input order.
    pub fn validate(&self, rows: Vec<Row>) -> ValidationOutcome {
        let keys = self.schema.key_names();
        let mut checked: Vec<(usize, Row, Vec<RejectReason>)> = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let (row, reasons) = self.check_row(row);
                (i, row, reasons)
            })
            .collect();

        let mut last_seen: HashMap<Key, usize> = HashMap::new();
        for (pos, (_, row, reasons)) in checked.iter().enumerate() {
            if reasons.is_empty() {
                if let Some(key) = row.key(&keys) {
                    last_seen.insert(key, pos);
                }
            }
        }
        for (pos, (_, row, reasons)) in checked.iter_mut().enumerate() {
            if !reasons.is_empty() {
                continue;
            }
            if let Some(key) = row.key(&keys) {
                if last_seen.get(&key) != Some(&pos) {
                    reasons.push(RejectReason::DuplicateInBatch);
                }
            }
        }

        let mut outcome = ValidationOutcome::default();
        for (index, row, reasons) in checked {
            if reasons.is_empty() {
                outcome.accepted.push(row);
            } else {
                outcome.rejected.push(Rejection {
                    index,
                    row,
                    reasons,
                });
            }
        }

        if !outcome.rejected.is_empty() {
            let first = &outcome.rejected[0];
            warn!(
                table = %self.schema.table,
                rejected = outcome.rejected.len(),
                accepted = outcome.accepted.len(),
                first_index = first.index,
                first_key = %first.row.key(&keys).map(|k| format_key(&k)).unwrap_or_default(),
                first_reason = %first.reasons[0],
                "rows rejected by validation"
            );
        }
        outcome
    }

    /// Normalize one row and collect every rule it violates.
    pub fn check_row(&self, mut row: Row) -> (Row, Vec<RejectReason>) {
        let mut reasons = Vec::new();

        for (name, value) in row.iter_mut() {
            let Some(def) = self.schema.column(name) else {
                // undeclared columns are the writer's schema mismatch
                continue;
            };
            let normalized = match (def.dtype, &*value) {
                (_, Value::Float(v)) if !v.is_finite() => Ok(Some(Value::Null)),
                (ColumnType::Date, Value::Str(s)) if s.trim().is_empty() => Ok(Some(Value::Null)),
                (ColumnType::Date, Value::Str(s)) => parse_date(s).map(|d| Some(Value::Date(d))).ok_or(()),
                (ColumnType::Date, Value::Float(v)) => {
                    date_from_number(*v).map(|d| Some(Value::Date(d))).ok_or(())
                }
                _ => Ok(None),
            };
            match normalized {
                Ok(Some(v)) => *value = v,
                Ok(None) => {}
                Err(()) => reasons.push(RejectReason::InvalidDate {
                    column: name.to_string(),
                }),
            }
        }

        for def in self.schema.columns {
            let value = row.get(def.name).unwrap_or(&Value::Null);
            let required = matches!(def.role, ColumnRole::Key | ColumnRole::Required);
            if value.is_null() && required {
                reasons.push(match def.dtype {
                    ColumnType::Date => RejectReason::InvalidDate {
                        column: def.name.to_string(),
                    },
                    _ => RejectReason::MissingRequired {
                        column: def.name.to_string(),
                    },
                });
            }
            if def.is_key() {
                if let Value::Date(d) = value {
                    if !self.config.in_range(*d) {
                        reasons.push(RejectReason::OutOfCalendarRange {
                            column: def.name.to_string(),
                            date: *d,
                        });
                    }
                }
            }
        }

        for column in PRICE_COLUMNS.iter().chain(AMOUNT_COLUMNS.iter()) {
            if self.schema.column(column).is_none() {
                continue;
            }
            if row.f64(column).is_some_and(|v| v < 0.0) {
                reasons.push(RejectReason::NegativeValue {
                    column: column.to_string(),
                });
            }
        }
        if let (Some(high), Some(low)) = (row.f64("high"), row.f64("low")) {
            if high < low {
                reasons.push(RejectReason::HighBelowLow);
            }
        }

        if self.schema.table == TableKind::StockStatus {
            if let Some(kind) = row.str("status_type") {
                if !status::ALL.contains(&kind) {
                    reasons.push(RejectReason::UnknownStatusType {
                        value: kind.to_string(),
                    });
                }
            }
        }
        if self.schema.column(SYMBOL_LIST_COLUMN).is_some() {
            let parsed = row
                .str(SYMBOL_LIST_COLUMN)
                .map(serde_json::from_str::<Vec<String>>);
            if matches!(parsed, Some(Err(_))) {
                reasons.push(RejectReason::MalformedSymbolList {
                    column: SYMBOL_LIST_COLUMN.to_string(),
                });
            }
        }

        if self.schema.table == TableKind::Fundamentals {
            if let (Some(report), Some(publ)) = (row.date("report_date"), row.date("publ_date")) {
                if publ < report {
                    reasons.push(RejectReason::PublishedBeforeReport);
                }
            }
        }

        (row, reasons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn bar(date: NaiveDate) -> Row {
        Row::new()
            .with("date", date)
            .with("open", 10.0)
            .with("high", 10.5)
            .with("low", 9.8)
            .with("close", 10.2)
            .with("preclose", 10.0)
            .with("volume", 1000.0)
            .with("money", 10_200.0)
    }

    fn bars() -> Validator {
        Validator::new(TableKind::DailyBar, ValidatorConfig::default())
    }

    #[test]
    fn clean_rows_pass() {
        let out = bars().validate(vec![bar(d(2024, 1, 2)), bar(d(2024, 1, 3))]);
        assert_eq!(out.accepted.len(), 2);
        assert!(out.rejected.is_empty());
    }

    #[test]
    fn three_bad_rows_out_of_hundred() {
        let start = d(2020, 1, 1);
        let mut rows: Vec<Row> = (0..100)
            .map(|i| bar(start + chrono::Duration::days(i)))
            .collect();
        rows[10].insert("close", -1.0);
        rows[50] = rows[50].clone().with("high", 9.0).with("low", 9.5);
        rows[90].insert("date", "not-a-date");

        let out = bars().validate(rows);
        assert_eq!(out.accepted.len(), 97);
        assert_eq!(out.rejected.len(), 3);
        let indexes: Vec<usize> = out.rejected.iter().map(|r| r.index).collect();
        assert_eq!(indexes, vec![10, 50, 90]);
        assert_eq!(
            out.rejected[0].reasons,
            vec![RejectReason::NegativeValue {
                column: "close".into()
            }]
        );
        assert_eq!(out.rejected[1].reasons, vec![RejectReason::HighBelowLow]);
    }

    #[test]
    fn duplicates_collapse_to_last() {
        let first = bar(d(2024, 1, 2)).with("close", 1.0);
        let second = bar(d(2024, 1, 3));
        let last = bar(d(2024, 1, 2)).with("close", 2.0);

        let out = bars().validate(vec![first, second, last]);
        assert_eq!(out.accepted.len(), 2);
        assert_eq!(out.accepted[0].date("date"), Some(d(2024, 1, 3)));
        assert_eq!(out.accepted[1].f64("close"), Some(2.0));
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].index, 0);
        assert_eq!(out.rejected[0].reasons, vec![RejectReason::DuplicateInBatch]);
        assert_eq!(RejectReason::DuplicateInBatch.to_string(), "duplicate-in-batch");
    }

    #[test]
    fn invalid_duplicate_does_not_shadow_valid_row() {
        let good = bar(d(2024, 1, 2));
        let bad = bar(d(2024, 1, 2)).with("volume", -5.0);

        let out = bars().validate(vec![good, bad]);
        assert_eq!(out.accepted.len(), 1);
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].index, 1);
    }

    #[test]
    fn date_strings_and_numbers_are_normalized() {
        let out = bars().validate(vec![
            bar(d(2024, 1, 2)).with("date", "2024-01-02"),
            bar(d(2024, 1, 3)).with("date", "20240103"),
            bar(d(2024, 1, 4)).with("date", 20240104.0),
        ]);
        assert_eq!(out.accepted.len(), 3);
        assert_eq!(out.accepted[1].date("date"), Some(d(2024, 1, 3)));
        assert_eq!(out.accepted[2].date("date"), Some(d(2024, 1, 4)));
    }

    #[test]
    fn nan_becomes_null() {
        let out = bars().validate(vec![bar(d(2024, 1, 2)).with("money", f64::NAN)]);
        assert_eq!(out.accepted.len(), 1);
        assert_eq!(out.accepted[0].get("money"), Some(&Value::Null));
    }

    #[test]
    fn calendar_range_is_enforced() {
        let v = Validator::new(
            TableKind::DailyBar,
            ValidatorConfig {
                calendar_start: Some(d(2005, 1, 4)),
                calendar_end: Some(d(2024, 12, 31)),
            },
        );
        let out = v.validate(vec![bar(d(2004, 12, 31)), bar(d(2024, 6, 3)), bar(d(2025, 1, 2))]);
        assert_eq!(out.accepted.len(), 1);
        assert_eq!(out.reason_counts().get("out-of-calendar-range"), Some(&2));
    }

    #[test]
    fn all_reasons_are_collected() {
        let row = bar(d(2024, 1, 2))
            .with("open", -1.0)
            .with("high", 1.0)
            .with("low", 2.0);
        let out = bars().validate(vec![row]);
        let reasons = &out.rejected[0].reasons;
        assert!(reasons.contains(&RejectReason::NegativeValue {
            column: "open".into()
        }));
        assert!(reasons.contains(&RejectReason::HighBelowLow));
    }

    #[test]
    fn fundamentals_require_publication_after_report() {
        let v = Validator::new(TableKind::Fundamentals, ValidatorConfig::default());
        let ok = Row::new()
            .with("report_date", d(2024, 3, 31))
            .with("publ_date", d(2024, 4, 25))
            .with("roe", 3.1);
        let early = Row::new()
            .with("report_date", d(2024, 6, 30))
            .with("publ_date", d(2024, 6, 1));
        let unpublished = Row::new().with("report_date", d(2024, 9, 30));

        let out = v.validate(vec![ok, early, unpublished]);
        assert_eq!(out.accepted.len(), 1);
        assert_eq!(out.rejected[0].reasons, vec![RejectReason::PublishedBeforeReport]);
        assert_eq!(
            out.rejected[1].reasons,
            vec![RejectReason::InvalidDate {
                column: "publ_date".into()
            }]
        );
    }

    #[test]
    fn global_string_keys_are_required() {
        let v = Validator::new(TableKind::StockStatus, ValidatorConfig::default());
        let out = v.validate(vec![Row::new()
            .with("date", d(2024, 1, 2))
            .with("symbols", "[]")]);
        assert_eq!(
            out.rejected[0].reasons,
            vec![RejectReason::MissingRequired {
                column: "status_type".into()
            }]
        );
    }

    #[test]
    fn status_rows_need_known_type_and_json_list() {
        let v = Validator::new(TableKind::StockStatus, ValidatorConfig::default());
        let status_row = |kind: &str, symbols: &str| {
            Row::new()
                .with("date", d(2024, 1, 2))
                .with("status_type", kind)
                .with("symbols", symbols)
        };
        let out = v.validate(vec![
            status_row("ST", r#"["600000.SS"]"#),
            status_row("DELISTING", "[]"),
            status_row("st", "not json"),
            status_row("HALT", r#"{"symbol": "600000.SS"}"#),
        ]);

        assert_eq!(out.accepted.len(), 2);
        assert_eq!(
            out.rejected[0].reasons,
            vec![
                RejectReason::UnknownStatusType { value: "st".into() },
                RejectReason::MalformedSymbolList {
                    column: "symbols".into()
                },
            ]
        );
        assert_eq!(out.rejected[1].index, 3);
        assert_eq!(out.rejected[1].reasons[0].tag(), "malformed-symbol-list");
    }

    #[test]
    fn index_constituents_need_json_list() {
        let v = Validator::new(TableKind::IndexConstituents, ValidatorConfig::default());
        let row = |symbols: &str| {
            Row::new()
                .with("date", d(2024, 1, 2))
                .with("index_code", "000300.SS")
                .with("symbols", symbols)
        };
        let out = v.validate(vec![row(r#"["600000.SS","000001.SZ"]"#), row("600000.SS,000001.SZ")]);
        assert_eq!(out.accepted.len(), 1);
        assert_eq!(out.reason_counts()["malformed-symbol-list"], 1);
    }
}
