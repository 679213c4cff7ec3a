//! SimTrade Runner — sync and export orchestration.
//!
//! This crate builds on `simtrade-core` to provide:
//! - TOML pipeline configuration with defaults
//! - Sync pipeline: unified rows split, validated and upserted per symbol
//! - Stock status aggregation into the global `stock_status` table
//! - Batch export over a bounded worker pool with cooperative cancellation
//! - Manifest written as the last step of a completed export

pub mod config;
pub mod export;
pub mod sync;

pub use config::{ConfigError, PipelineConfig};
pub use export::{run_export, CancelToken};
pub use sync::{
    PartitionFailure, RowRejection, SyncError, SyncPipeline, SyncReport, TableSyncStats,
    SYMBOL_COLUMN,
};
