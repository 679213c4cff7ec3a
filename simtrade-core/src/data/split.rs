//! Projection of wide unified rows onto per-table column subsets.
//!
//! Routing is an explicit, versioned declaration handed to the splitter at
//! construction; it is never inferred from the shape of a row.

use crate::domain::Row;
use crate::schema::TableKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Name of the in-memory status projection (not a store table).
pub const STATUS_TARGET: &str = "status";

/// One routing target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitTarget {
    /// Target name; a store table name, or an in-memory projection like `status`.
    pub name: String,
    /// Store table this target feeds, if any.
    #[serde(default)]
    pub table: Option<TableKind>,
    /// Source columns forming the key (source names, before renaming).
    pub keys: Vec<String>,
    /// Every source column routed to this target, keys included.
    pub columns: Vec<String>,
    /// Source name → target name.
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
}

impl SplitTarget {
    fn target_name<'a>(&'a self, source: &'a str) -> &'a str {
        self.rename.get(source).map(String::as_str).unwrap_or(source)
    }
}

/// Versioned routing declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub version: u32,
    pub targets: Vec<SplitTarget>,
}

fn target(
    name: &str,
    table: Option<TableKind>,
    columns: &[&str],
    rename: &[(&str, &str)],
) -> SplitTarget {
    SplitTarget {
        name: name.to_string(),
        table,
        keys: vec!["date".to_string()],
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rename: rename
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect(),
    }
}

impl SplitConfig {
    /// Routing for the daily market feed: bars, valuation ratios and the
    /// trading-status flags.
    pub fn default_routing() -> Self {
        Self {
            version: 1,
            targets: vec![
                target(
                    "stocks",
                    Some(TableKind::DailyBar),
                    &["date", "open", "high", "low", "close", "preclose", "volume", "amount"],
                    &[("amount", "money")],
                ),
                target(
                    "valuation",
                    Some(TableKind::Valuation),
                    &["date", "peTTM", "pbMRQ", "psTTM", "pcfNcfTTM", "turn"],
                    &[
                        ("peTTM", "pe_ttm"),
                        ("pbMRQ", "pb"),
                        ("psTTM", "ps_ttm"),
                        ("pcfNcfTTM", "pcf"),
                        ("turn", "turnover_rate"),
                    ],
                ),
                target(STATUS_TARGET, None, &["date", "isST", "tradestatus"], &[]),
            ],
        }
    }

    /// Check the declaration is usable: unique target names, keys routed.
    pub fn check(&self) -> Result<(), String> {
        let mut names = BTreeSet::new();
        for t in &self.targets {
            if !names.insert(t.name.as_str()) {
                return Err(format!("duplicate split target '{}'", t.name));
            }
            if t.keys.is_empty() {
                return Err(format!("split target '{}' declares no key", t.name));
            }
            if let Some(k) = t.keys.iter().find(|k| !t.columns.contains(k)) {
                return Err(format!("split target '{}': key '{k}' is not routed", t.name));
            }
            if let Some(table) = t.table {
                let schema = table.schema();
                for c in &t.columns {
                    let out = t.target_name(c);
                    if schema.column(out).is_none() {
                        return Err(format!(
                            "split target '{}': column '{out}' is not in table '{table}'",
                            t.name
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self::default_routing()
    }
}

/// Projections of one unified row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitRow {
    /// Target name → projected row.
    pub projections: BTreeMap<String, Row>,
    /// Columns no target declares.
    pub unmapped: Vec<String>,
}

/// Projections of a batch, grouped by target.
#[derive(Debug, Clone, Default)]
pub struct SplitBatch {
    pub targets: BTreeMap<String, Vec<Row>>,
    /// Unmapped column → number of rows carrying it.
    pub unmapped: BTreeMap<String, usize>,
}

impl SplitBatch {
    pub fn rows(&self, target: &str) -> &[Row] {
        self.targets.get(target).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone)]
pub struct Splitter {
    config: SplitConfig,
    routed: BTreeSet<String>,
}

impl Splitter {
    pub fn new(config: SplitConfig) -> Self {
        let routed = config
            .targets
            .iter()
            .flat_map(|t| t.columns.iter().cloned())
            .collect();
        Self { config, routed }
    }

    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    pub fn targets(&self) -> &[SplitTarget] {
        &self.config.targets
    }

    /// Project one row onto every target that declares any of its columns.
    ///
    /// A projection holding nothing but key columns is not emitted.
    pub fn split_row(&self, row: &Row) -> SplitRow {
        let mut out = SplitRow::default();

        for t in &self.config.targets {
            let mut projected = Row::new();
            let mut has_payload = false;
            for source in &t.columns {
                if let Some(v) = row.get(source) {
                    projected.insert(t.target_name(source), v.clone());
                    if !t.keys.contains(source) {
                        has_payload = true;
                    }
                }
            }
            if has_payload {
                out.projections.insert(t.name.clone(), projected);
            }
        }

        out.unmapped = row
            .columns()
            .filter(|c| !self.routed.contains(*c))
            .map(str::to_string)
            .collect();
        out
    }

    /// Split a batch, reporting unmapped columns once for the whole batch.
    pub fn split_batch<'a>(&self, rows: impl IntoIterator<Item = &'a Row>) -> SplitBatch {
        let mut batch = SplitBatch::default();
        for row in rows {
            let split = self.split_row(row);
            for (name, projected) in split.projections {
                batch.targets.entry(name).or_default().push(projected);
            }
            for column in split.unmapped {
                *batch.unmapped.entry(column).or_insert(0) += 1;
            }
        }
        if !batch.unmapped.is_empty() {
            warn!(
                fields = ?batch.unmapped.keys().collect::<Vec<_>>(),
                "unmapped fields dropped"
            );
        }
        batch
    }
}
