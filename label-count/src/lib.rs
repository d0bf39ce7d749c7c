//! Per-class annotation counting for YOLO datasets kept in object storage.
//!
//! The pipeline loads the class manifest, scans the train, validation and
//! test partitions for annotation files, tallies the class id of every label
//! record and publishes a `class_counts.json` summary back to the store.

pub mod adapter;
pub mod aggregate;
mod common;
pub mod config;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod pipeline;
pub mod scan;
pub mod store;
pub mod summary;

pub use adapter::{InvocationEvent, InvocationResult, InvocationStatus};
pub use aggregate::{ClassCounts, RecordFault, SkippedRecord};
pub use config::{Config, CountConfig, RecordPolicy};
pub use error::CountError;
pub use manifest::ClassManifest;
pub use pipeline::{run, RunReport};
pub use store::{LocalStore, MemoryStore, ObjectLocation, ObjectStore, StoreError};
pub use summary::SummaryRecord;
