//! Error taxonomy of the store and the export engine.
//!
//! - Row-level validation failures are not errors: they come back as
//!   rejections from the validator.
//! - `StoreError::SchemaMismatch` is fatal for a whole batch; nothing commits.
//! - `StoreError::Write` happens before the atomic swap and is safe to retry.
//! - Derived-field failures during export are `ComputationIssue` diagnostics:
//!   the field is null and the row is still emitted.

use crate::schema::TableKind;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the partition store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("schema mismatch in '{table}': {detail}")]
    SchemaMismatch { table: TableKind, detail: String },

    #[error("invalid symbol '{symbol}'")]
    InvalidSymbol { symbol: String },

    #[error("write failed for {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },

    #[error("read failed for {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },
}

impl StoreError {
    pub fn mismatch(table: TableKind, detail: impl Into<String>) -> Self {
        StoreError::SchemaMismatch {
            table,
            detail: detail.into(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        StoreError::Write {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn read(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        StoreError::Read {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether retrying the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Write { .. })
    }
}

/// Errors that abort an export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("computation failed for {table} {symbol}: {reason}")]
    Frame {
        table: TableKind,
        symbol: String,
        reason: String,
    },

    #[error("export cancelled after {completed}/{total} symbols")]
    Cancelled { completed: usize, total: usize },

    #[error("manifest error: {0}")]
    Manifest(String),
}

/// A derived field that could not be computed for one output row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationIssue {
    pub table: TableKind,
    pub symbol: String,
    pub date: NaiveDate,
    pub field: String,
    pub reason: String,
}

impl fmt::Display for ComputationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}: {}",
            self.table, self.symbol, self.date, self.field, self.reason
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_write_errors_are_retryable() {
        assert!(StoreError::write("/tmp/x", "disk full").is_retryable());
        assert!(!StoreError::mismatch(TableKind::DailyBar, "bad").is_retryable());
        assert!(!StoreError::read("/tmp/x", "gone").is_retryable());
    }

    #[test]
    fn messages_name_the_table() {
        let e = StoreError::mismatch(TableKind::Valuation, "unexpected column 'foo'");
        assert_eq!(
            e.to_string(),
            "schema mismatch in 'valuation': unexpected column 'foo'"
        );
    }
}
