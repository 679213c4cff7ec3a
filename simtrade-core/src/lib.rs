//! SimTrade Core — storage and export engine for A-share daily data.
//!
//! This crate contains:
//! - Schema registry for every persisted table
//! - Row validator and declarative splitter
//! - Partitioned Parquet store with atomic incremental upsert
//! - Export engine recomputing derived fields (limit prices, TTM, forward fill)
//! - Export manifest builder and verifier

pub mod data;
pub mod domain;
pub mod error;
pub mod export;
pub mod schema;

pub use error::{ComputationIssue, ExportError, StoreError};
