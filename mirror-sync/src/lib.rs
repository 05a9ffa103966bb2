//! # mirror-sync
//!
//! Keeps an object store container a mirror of a published HTTP directory.
//!
//! Call [`pipeline::run`] for a configured end-to-end run, or
//! [`reconcile::run_pass`] with any [`Source`] and [`ObjectStore`] to drive
//! a single pass directly.

pub mod digest;
pub mod error;
pub mod http;
pub mod payload;
pub mod pipeline;
pub mod plan;
pub mod reconcile;
pub mod source;
pub mod store;

pub use error::{EntryError, FailureKind, StoreError, SyncError};
pub use payload::{fetch_payload, PayloadOutcome};
pub use pipeline::{Job, RunReport, StoreTarget};
pub use plan::{PlannedUpload, SyncPlan};
pub use reconcile::{
    run_pass, DeleteOutcome, EntryOutcome, PassCounts, PassOptions, PassStatus, PassSummary,
};
pub use source::{FetchedFile, HttpSource, Source};
pub use store::{LocalStore, MemoryStore, ObjectStore, S3Credentials, S3Store, StoreOp};
