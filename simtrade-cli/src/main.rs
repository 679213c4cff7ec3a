//! SimTrade CLI — store maintenance, sync and export commands.
//!
//! Commands:
//! - `ingest`: load a CSV of table-shaped rows into one table
//! - `sync`: route a CSV of unified rows through the splitter into the store
//! - `export`: write per-symbol files and the manifest as of a date
//! - `status`: list partitions with row counts and key ranges
//! - `drop-table`: remove every partition of a table for a full reimport
//! - `verify`: check an export directory against its manifest

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use simtrade_core::data::PartitionStore;
use simtrade_core::domain::{parse_date, Row, Value};
use simtrade_core::export::Manifest;
use simtrade_core::schema::{ColumnType, TableKind, TableSchema};
use simtrade_runner::{
    run_export, CancelToken, PipelineConfig, SyncPipeline, SyncReport, SYMBOL_COLUMN,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "simtrade",
    about = "SimTrade CLI — A-share daily data store and export engine"
)]
struct Cli {
    /// Pipeline config (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store directory, overrides the config.
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Worker threads, overrides the config.
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a CSV of rows shaped like one table.
    Ingest {
        /// Table name (stocks, valuation, fundamentals, adj_pre, ...).
        table: String,

        /// CSV file with a header row. Per-symbol tables need a `symbol` column.
        file: PathBuf,

        /// Print the full report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Route a CSV of unified rows (symbol, date, fields...) into the store.
    Sync {
        file: PathBuf,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Export the store as known at a date.
    Export {
        /// Knowledge cut-off (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        as_of: Option<String>,

        /// Output directory, overrides the config.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// List partitions with row counts and key ranges.
    Status {
        /// Only this table.
        #[arg(long)]
        table: Option<String>,
    },
    /// Remove every partition of a table.
    DropTable {
        table: String,

        /// Actually delete (without this flag, only previews what would be removed).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
    /// Check an export directory against its manifest.
    Verify {
        /// Export directory. Defaults to the configured output directory.
        dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::load_or_default(cli.config.as_deref())
        .context("failed to load pipeline config")?;
    if let Some(dir) = cli.store_dir {
        config.store_dir = dir;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    config.validate()?;

    match cli.command {
        Commands::Ingest { table, file, json } => run_ingest(&config, &table, &file, json),
        Commands::Sync { file, json } => run_sync(&config, &file, json),
        Commands::Export { as_of, output_dir } => {
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            run_export_cmd(&config, as_of.as_deref())
        }
        Commands::Status { table } => run_status(&config, table.as_deref()),
        Commands::DropTable { table, confirm } => run_drop_table(&config, &table, confirm),
        Commands::Verify { dir } => run_verify(dir.as_deref().unwrap_or(&config.output_dir)),
    }
}

fn parse_table(name: &str) -> Result<TableKind> {
    match TableKind::from_name(name) {
        Some(table) => Ok(table),
        None => {
            let known: Vec<&str> = TableKind::ALL.iter().map(|t| t.name()).collect();
            bail!("unknown table '{name}' (known: {})", known.join(", "))
        }
    }
}

fn run_ingest(config: &PipelineConfig, table: &str, file: &Path, json: bool) -> Result<()> {
    let table = parse_table(table)?;
    let schema = table.schema();
    let rows = read_csv(file, |column, raw| typed_cell(&schema, column, raw))?;

    let store = PartitionStore::new(&config.store_dir);
    let report = SyncPipeline::new(&store, config)
        .ingest(table, rows)
        .with_context(|| format!("ingest into {table} failed"))?;
    print_report(&report, json)
}

fn run_sync(config: &PipelineConfig, file: &Path, json: bool) -> Result<()> {
    let rows = read_csv(file, |column, raw| match column {
        SYMBOL_COLUMN => Value::Str(raw.to_string()),
        _ => loose_cell(raw),
    })?;

    let store = PartitionStore::new(&config.store_dir);
    let report = SyncPipeline::new(&store, config)
        .sync(rows)
        .context("sync failed")?;
    print_report(&report, json)
}

fn run_export_cmd(config: &PipelineConfig, as_of: Option<&str>) -> Result<()> {
    let as_of = match as_of {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --as-of '{s}'"))?,
        None => chrono::Local::now().date_naive(),
    };

    let store = PartitionStore::new(&config.store_dir);
    let manifest = run_export(
        &store,
        &config.output_dir,
        as_of,
        config.workers,
        &CancelToken::new(),
    )
    .context("export failed")?;

    println!("Export: {}", config.output_dir.display());
    println!("As of: {}", manifest.export_date);
    println!("Symbols: {}", manifest.num_stocks);
    if let (Some(start), Some(end)) = (manifest.start_date, manifest.end_date) {
        println!("Date range: {start} .. {end}");
    }
    println!();
    println!("{:<20} {:>8} {:>12}", "Table", "Files", "Rows");
    println!("{}", "-".repeat(42));
    for (name, stats) in &manifest.tables {
        println!("{:<20} {:>8} {:>12}", name, stats.files, stats.rows);
    }
    Ok(())
}

fn run_status(config: &PipelineConfig, table: Option<&str>) -> Result<()> {
    let filter = table.map(parse_table).transpose()?;
    let store = PartitionStore::new(&config.store_dir);
    let metas: Vec<_> = store
        .status()
        .context("failed to read store")?
        .into_iter()
        .filter(|m| filter.map_or(true, |t| m.table == t))
        .collect();

    if metas.is_empty() {
        println!("Store is empty: {}", config.store_dir.display());
        return Ok(());
    }

    let mut per_table: BTreeMap<TableKind, (usize, usize)> = BTreeMap::new();
    println!("Store: {}", config.store_dir.display());
    println!();
    println!(
        "{:<20} {:<12} {:>8}  {:<25} {:<25}",
        "Table", "Symbol", "Rows", "First key", "Last key"
    );
    println!("{}", "-".repeat(94));
    for m in &metas {
        let entry = per_table.entry(m.table).or_default();
        entry.0 += 1;
        entry.1 += m.rows;
        println!(
            "{:<20} {:<12} {:>8}  {:<25} {:<25}",
            m.table.name(),
            m.symbol.as_deref().unwrap_or("-"),
            m.rows,
            m.first_key.as_deref().unwrap_or("-"),
            m.last_key.as_deref().unwrap_or("-"),
        );
    }
    println!();
    for (table, (partitions, rows)) in per_table {
        println!("{table}: {partitions} partition(s), {rows} row(s)");
    }
    Ok(())
}

fn run_drop_table(config: &PipelineConfig, table: &str, confirm: bool) -> Result<()> {
    let table = parse_table(table)?;
    let store = PartitionStore::new(&config.store_dir);

    if !confirm {
        let partitions = store
            .status()?
            .into_iter()
            .filter(|m| m.table == table)
            .count();
        println!("Would remove {partitions} partition(s) of {table}.");
        println!("Dry run: pass --confirm to actually delete.");
        return Ok(());
    }

    let removed = store
        .drop_table(table)
        .with_context(|| format!("failed to drop {table}"))?;
    println!("Removed {removed} partition(s) of {table}.");
    Ok(())
}

fn run_verify(dir: &Path) -> Result<()> {
    let manifest = Manifest::load(dir).with_context(|| format!("no readable manifest in {}", dir.display()))?;
    let report = manifest.verify(dir)?;
    if !report.is_ok() {
        for problem in &report.problems {
            eprintln!("{problem}");
        }
        bail!("export in {} does not match its manifest", dir.display());
    }
    println!(
        "OK: {} file(s), {} symbol(s), content hash {}",
        manifest.files.len(),
        manifest.num_stocks,
        manifest.content_hash
    );
    Ok(())
}

fn print_report(report: &SyncReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Symbols: {}", report.symbols);
    println!();
    println!(
        "{:<20} {:>9} {:>9} {:>9} {:>9} {:>9}",
        "Table", "Incoming", "Accepted", "Rejected", "Inserted", "Replaced"
    );
    println!("{}", "-".repeat(70));
    for (table, s) in &report.tables {
        println!(
            "{:<20} {:>9} {:>9} {:>9} {:>9} {:>9}",
            table.name(),
            s.incoming,
            s.accepted,
            s.rejected,
            s.inserted,
            s.replaced
        );
    }
    if report.missing_symbol > 0 {
        println!("Rows without symbol: {}", report.missing_symbol);
    }
    if !report.unmapped.is_empty() {
        let fields: Vec<&str> = report.unmapped.keys().map(String::as_str).collect();
        println!("Unmapped fields: {}", fields.join(", "));
    }
    for f in &report.failures {
        eprintln!(
            "Failed: {} {}: {}{}",
            f.table,
            f.symbol.as_deref().unwrap_or("-"),
            f.error,
            if f.retryable { " (retryable)" } else { "" }
        );
    }
    if !report.failures.is_empty() {
        bail!("{} partition(s) not committed", report.failures.len());
    }
    Ok(())
}

/// Read a headed CSV into rows, converting each non-empty cell with `cell`.
fn read_csv(path: &Path, cell: impl Fn(&str, &str) -> Value) -> Result<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("{}: bad record {}", path.display(), line + 1))?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(column, raw)| {
                let value = if raw.is_empty() { Value::Null } else { cell(column, raw) };
                (column.to_string(), value)
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Cell of a table-shaped CSV, typed by the table's declared column.
fn typed_cell(schema: &TableSchema, column: &str, raw: &str) -> Value {
    match schema.column(column).map(|c| c.dtype) {
        Some(ColumnType::Float64) => raw
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::Str(raw.to_string())),
        Some(ColumnType::Date) => parse_date(raw)
            .map(Value::Date)
            .unwrap_or_else(|| Value::Str(raw.to_string())),
        Some(ColumnType::Utf8) | None => Value::Str(raw.to_string()),
    }
}

/// Cell of a unified CSV: numbers become floats, everything else text.
fn loose_cell(raw: &str) -> Value {
    raw.parse::<f64>()
        .map(Value::Float)
        .unwrap_or_else(|_| Value::Str(raw.to_string()))
}
