//! Batch export: every symbol in a bounded pool, global tables, manifest last.
//!
//! A previous `manifest.json` in the output directory is removed before any
//! file is touched, so a directory is only ever described by a manifest that
//! was written after all of its files. Per-symbol or metadata files from an
//! earlier run that the new manifest does not list are deleted before the
//! manifest is written.

use rayon::prelude::*;
use simtrade_core::data::PartitionStore;
use simtrade_core::export::{ExportEngine, Manifest, ManifestBuilder, SymbolExport};
use simtrade_core::ExportError;
use chrono::NaiveDate;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared cancellation flag, checked between symbols.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Export the store as known at `as_of` into `out_dir`.
///
/// Per-symbol files are written in a pool of `workers` threads. When the
/// token is cancelled, symbols not yet started are skipped, already written
/// files stay in place and no manifest is produced.
pub fn run_export(
    store: &PartitionStore,
    out_dir: &Path,
    as_of: NaiveDate,
    workers: usize,
    cancel: &CancelToken,
) -> Result<Manifest, ExportError> {
    remove_stale_manifest(out_dir)?;

    let engine = ExportEngine::open(store, as_of)?;
    let symbols = engine.symbols()?;
    let total = symbols.len();
    info!(symbols = total, %as_of, out = %out_dir.display(), "export started");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| ExportError::Manifest(format!("failed to build worker pool: {e}")))?;

    let completed = AtomicUsize::new(0);
    let results: Vec<Option<Result<SymbolExport, ExportError>>> = pool.install(|| {
        symbols
            .par_iter()
            .map(|symbol| {
                if cancel.is_cancelled() {
                    return None;
                }
                let result = engine.write_symbol(symbol, out_dir);
                if result.is_ok() {
                    completed.fetch_add(1, Ordering::Relaxed);
                }
                Some(result)
            })
            .collect()
    });

    if cancel.is_cancelled() {
        let completed = completed.load(Ordering::Relaxed);
        warn!(completed, total, "export cancelled, no manifest written");
        return Err(ExportError::Cancelled { completed, total });
    }

    let mut builder = ManifestBuilder::new(as_of);
    let mut issues = 0;
    for result in results.into_iter().flatten() {
        let export = result?;
        issues += export.issues.len();
        builder.add_symbol(&export.symbol, export.files, export.date_range);
    }
    builder.add_files(engine.write_globals(out_dir)?);

    let manifest = builder.build();
    let pruned = manifest.prune_unlisted(out_dir)?;
    if !pruned.is_empty() {
        info!(files = pruned.len(), "removed export files from an earlier run");
    }
    manifest.write(out_dir)?;

    if issues > 0 {
        warn!(issues, "derived-field diagnostics recorded during export");
    }
    info!(
        symbols = manifest.num_stocks,
        files = manifest.files.len(),
        start = ?manifest.start_date,
        end = ?manifest.end_date,
        content_hash = %manifest.content_hash,
        "export complete"
    );
    Ok(manifest)
}

fn remove_stale_manifest(out_dir: &Path) -> Result<(), ExportError> {
    let path = Manifest::path(out_dir);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ExportError::Manifest(format!(
            "failed to remove stale manifest {}: {e}",
            path.display()
        ))),
    }
}
