//! Ingest side of the store: validation, splitting, Parquet I/O and upsert.

pub mod frame;
pub mod split;
pub mod store;
pub mod validate;

pub use split::{SplitBatch, SplitConfig, SplitRow, SplitTarget, Splitter, STATUS_TARGET};
pub use store::{PartitionMeta, PartitionStore, UpsertSummary};
pub use validate::{RejectReason, Rejection, ValidationOutcome, Validator, ValidatorConfig};
