//! Export side: derived-field computation, per-symbol files and the manifest.

pub mod asof;
pub mod engine;
pub mod manifest;
pub mod ttm;

pub use engine::{ExportEngine, SymbolExport, TableExport, GLOBAL_TABLES, METADATA_DIR, SYMBOL_TABLES};
pub use manifest::{FileEntry, Manifest, ManifestBuilder, TableStats, VerifyReport, MANIFEST_FILE};
pub use ttm::{QuarterReport, TtmMetrics};
