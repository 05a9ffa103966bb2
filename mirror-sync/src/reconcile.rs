//! One reconciliation pass: list, inventory, diff, delete, upload.
//!
//! ## Pass protocol
//!
//! 1. List the source. Failure aborts the pass.
//! 2. Take the store inventory. Failure aborts the pass before anything
//!    is mutated.
//! 3. Build the [`SyncPlan`] and the upload worker pool.
//! 4. Delete every orphaned key, sequentially. Failures are recorded.
//! 5. Fetch, hash and compare every source entry on a bounded worker pool,
//!    writing the ones that are new or changed. Failures are recorded.
//!
//! All deletions finish before the first upload starts.

use std::time::Instant;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;

use mirror_core::config::DEFAULT_WORKERS;
use mirror_core::{Fingerprint, Presence};

use crate::digest;
use crate::error::{EntryError, FailureKind, SyncError};
use crate::plan::{PlannedUpload, SyncPlan};
use crate::source::Source;
use crate::store::ObjectStore;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOptions {
    /// Upload pass parallelism.
    pub workers: usize,
    /// Compute the plan and digests but issue no store mutation.
    pub dry_run: bool,
    /// Abort instead of wiping a non-empty container when the source lists
    /// nothing.
    pub refuse_empty_source: bool,
    /// Look up the stored content digest even when the listed ETag looks
    /// like an MD5. Needed for SSE-KMS buckets, whose ETags are not digests.
    pub verify_metadata: bool,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            dry_run: false,
            refuse_empty_source: false,
            verify_metadata: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to one store key during the deletion pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted { key: String },
    WouldDelete { key: String },
    Failed { key: String, error: String },
}

impl DeleteOutcome {
    pub fn key(&self) -> &str {
        match self {
            DeleteOutcome::Deleted { key }
            | DeleteOutcome::WouldDelete { key }
            | DeleteOutcome::Failed { key, .. } => key,
        }
    }
}

/// What happened to one source entry during the upload pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntryOutcome {
    /// Key did not exist; uploaded.
    Created { key: String, fingerprint: Fingerprint },
    /// Key existed with a different fingerprint; overwritten.
    Updated { key: String, fingerprint: Fingerprint },
    /// Fingerprints matched; nothing written.
    Unchanged { key: String },
    /// `--dry-run`: the key would have been created.
    WouldCreate { key: String, fingerprint: Fingerprint },
    /// `--dry-run`: the key would have been overwritten.
    WouldUpdate { key: String, fingerprint: Fingerprint },
    Failed {
        key: String,
        kind: FailureKind,
        error: String,
    },
}

impl EntryOutcome {
    pub fn key(&self) -> &str {
        match self {
            EntryOutcome::Created { key, .. }
            | EntryOutcome::Updated { key, .. }
            | EntryOutcome::Unchanged { key }
            | EntryOutcome::WouldCreate { key, .. }
            | EntryOutcome::WouldUpdate { key, .. }
            | EntryOutcome::Failed { key, .. } => key,
        }
    }

    fn failed(key: &str, err: &EntryError) -> Self {
        EntryOutcome::Failed {
            key: key.to_string(),
            kind: err.kind(),
            error: err.to_string(),
        }
    }
}

/// Whether a completed pass left the container a full mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PassStatus {
    FullySynced,
    /// Some deletions or entries failed; a later pass will retry them.
    Degraded { failed: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassCounts {
    pub deleted: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Result of a completed pass. Whole-pass aborts never produce one.
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub container: String,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub dry_run: bool,
    pub deletions: Vec<DeleteOutcome>,
    pub entries: Vec<EntryOutcome>,
}

impl PassSummary {
    /// Dry-run outcomes count as the action they stand in for.
    pub fn counts(&self) -> PassCounts {
        let mut counts = PassCounts::default();
        for deletion in &self.deletions {
            match deletion {
                DeleteOutcome::Deleted { .. } | DeleteOutcome::WouldDelete { .. } => {
                    counts.deleted += 1
                }
                DeleteOutcome::Failed { .. } => counts.failed += 1,
            }
        }
        for entry in &self.entries {
            match entry {
                EntryOutcome::Created { .. } | EntryOutcome::WouldCreate { .. } => {
                    counts.created += 1
                }
                EntryOutcome::Updated { .. } | EntryOutcome::WouldUpdate { .. } => {
                    counts.updated += 1
                }
                EntryOutcome::Unchanged { .. } => counts.unchanged += 1,
                EntryOutcome::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }

    pub fn deleted(&self) -> usize {
        self.counts().deleted
    }

    pub fn created(&self) -> usize {
        self.counts().created
    }

    pub fn updated(&self) -> usize {
        self.counts().updated
    }

    pub fn unchanged(&self) -> usize {
        self.counts().unchanged
    }

    pub fn failed(&self) -> usize {
        self.counts().failed
    }

    pub fn status(&self) -> PassStatus {
        match self.failed() {
            0 => PassStatus::FullySynced,
            failed => PassStatus::Degraded { failed },
        }
    }

    pub fn is_fully_synced(&self) -> bool {
        self.status() == PassStatus::FullySynced
    }
}

// ---------------------------------------------------------------------------
// run_pass
// ---------------------------------------------------------------------------

/// Reconcile `store` against `source` once.
///
/// Returns `Err` only for whole-pass aborts; per-key failures are reported
/// in the returned summary.
pub fn run_pass(
    source: &dyn Source,
    store: &dyn ObjectStore,
    options: &PassOptions,
) -> Result<PassSummary, SyncError> {
    let started_at = Utc::now();
    let clock = Instant::now();

    let entries = source.list()?;
    let objects = store
        .inventory()
        .map_err(|err| SyncError::StoreUnreachable {
            container: store.container().to_string(),
            source: err,
        })?;
    tracing::info!(
        source = %source.describe(),
        container = store.container(),
        listed = entries.len(),
        stored = objects.len(),
        "snapshots taken"
    );

    if entries.is_empty() && !objects.is_empty() {
        if options.refuse_empty_source {
            return Err(SyncError::EmptySource {
                container: store.container().to_string(),
                existing: objects.len(),
            });
        }
        tracing::warn!(
            container = store.container(),
            existing = objects.len(),
            "source listing is empty; every stored object will be deleted"
        );
    }

    let plan = SyncPlan::build(entries, objects);
    tracing::debug!(
        deletes = plan.to_delete.len(),
        uploads = plan.to_upload.len(),
        new = plan.new_count(),
        "plan built"
    );

    // The pool must exist before the first deletion so a build failure
    // still leaves the container untouched.
    let pool = worker_pool(options.workers)?;
    let deletions = delete_pass(store, &plan.to_delete, options.dry_run);
    let entries = upload_pass(&pool, source, store, &plan.to_upload, options);

    let summary = PassSummary {
        container: store.container().to_string(),
        source: source.describe(),
        started_at,
        duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
        dry_run: options.dry_run,
        deletions,
        entries,
    };

    let counts = summary.counts();
    tracing::info!(
        deleted = counts.deleted,
        created = counts.created,
        updated = counts.updated,
        unchanged = counts.unchanged,
        failed = counts.failed,
        dry_run = options.dry_run,
        "pass complete"
    );
    Ok(summary)
}

fn delete_pass(store: &dyn ObjectStore, keys: &[String], dry_run: bool) -> Vec<DeleteOutcome> {
    keys.iter()
        .map(|key| {
            if dry_run {
                return DeleteOutcome::WouldDelete { key: key.clone() };
            }
            match store.delete(key) {
                Ok(()) => {
                    tracing::info!(key = %key, "deleted");
                    DeleteOutcome::Deleted { key: key.clone() }
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "delete failed");
                    DeleteOutcome::Failed {
                        key: key.clone(),
                        error: e.to_string(),
                    }
                }
            }
        })
        .collect()
}

fn worker_pool(workers: usize) -> Result<ThreadPool, SyncError> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("mirror-upload-{i}"))
        .build()?)
}

fn upload_pass(
    pool: &ThreadPool,
    source: &dyn Source,
    store: &dyn ObjectStore,
    uploads: &[PlannedUpload],
    options: &PassOptions,
) -> Vec<EntryOutcome> {
    if uploads.is_empty() {
        return Vec::new();
    }
    pool.install(|| {
        uploads
            .par_iter()
            .map(|upload| {
                let key = upload.key();
                match sync_entry(source, store, upload, options) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "entry failed");
                        EntryOutcome::failed(key, &e)
                    }
                }
            })
            .collect()
    })
}

/// Fetch, hash, compare and (if needed) write one entry.
///
/// The fetched temp file is dropped, and so removed, on every return path.
fn sync_entry(
    source: &dyn Source,
    store: &dyn ObjectStore,
    upload: &PlannedUpload,
    options: &PassOptions,
) -> Result<EntryOutcome, EntryError> {
    let key = upload.key();
    let fetched = source.fetch(&upload.entry)?;
    let local = digest::md5_file(fetched.path())?;

    let existing = match &upload.existing {
        None => None,
        Some(listed) if listed.is_content_md5() && !options.verify_metadata => {
            Some(listed.clone())
        }
        // Multipart and SSE-KMS ETags are not content digests; ask the store.
        Some(_) => match store.fingerprint(key) {
            Ok(Presence::Present(fp)) => Some(fp),
            Ok(Presence::Absent) => None,
            Err(err) => {
                return Err(EntryError::StoreRead {
                    key: key.to_string(),
                    source: err,
                })
            }
        },
    };

    if existing.as_ref() == Some(&local) {
        tracing::debug!(key = %key, "unchanged");
        return Ok(EntryOutcome::Unchanged {
            key: key.to_string(),
        });
    }

    let is_new = existing.is_none();
    if options.dry_run {
        return Ok(if is_new {
            EntryOutcome::WouldCreate {
                key: key.to_string(),
                fingerprint: local,
            }
        } else {
            EntryOutcome::WouldUpdate {
                key: key.to_string(),
                fingerprint: local,
            }
        });
    }

    store
        .put(key, fetched.path(), &local)
        .map_err(|err| EntryError::StoreWrite {
            key: key.to_string(),
            source: err,
        })?;
    tracing::info!(key = %key, bytes = fetched.size(), created = is_new, "uploaded");

    Ok(if is_new {
        EntryOutcome::Created {
            key: key.to_string(),
            fingerprint: local,
        }
    } else {
        EntryOutcome::Updated {
            key: key.to_string(),
            fingerprint: local,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(deletions: Vec<DeleteOutcome>, entries: Vec<EntryOutcome>) -> PassSummary {
        PassSummary {
            container: "bucket".to_string(),
            source: "https://src.example/".to_string(),
            started_at: Utc::now(),
            duration_ms: 0,
            dry_run: false,
            deletions,
            entries,
        }
    }

    #[test]
    fn counts_fold_dry_run_outcomes_into_actions() {
        let s = summary(
            vec![
                DeleteOutcome::WouldDelete { key: "x".into() },
                DeleteOutcome::Deleted { key: "y".into() },
            ],
            vec![
                EntryOutcome::WouldCreate {
                    key: "a".into(),
                    fingerprint: Fingerprint::from("1"),
                },
                EntryOutcome::Updated {
                    key: "b".into(),
                    fingerprint: Fingerprint::from("2"),
                },
                EntryOutcome::Unchanged { key: "c".into() },
            ],
        );
        assert_eq!(
            s.counts(),
            PassCounts {
                deleted: 2,
                created: 1,
                updated: 1,
                unchanged: 1,
                failed: 0,
            }
        );
        assert_eq!(s.status(), PassStatus::FullySynced);
    }

    #[test]
    fn failures_on_either_pass_degrade_status() {
        let s = summary(
            vec![DeleteOutcome::Failed {
                key: "x".into(),
                error: "denied".into(),
            }],
            vec![EntryOutcome::Failed {
                key: "a".into(),
                kind: FailureKind::Fetch,
                error: "HTTP 500".into(),
            }],
        );
        assert_eq!(s.status(), PassStatus::Degraded { failed: 2 });
        assert!(!s.is_fully_synced());
    }

    #[test]
    fn worker_pool_clamps_to_one_thread() {
        assert_eq!(worker_pool(0).expect("pool").current_num_threads(), 1);
        assert_eq!(worker_pool(3).expect("pool").current_num_threads(), 3);
    }

    #[test]
    fn outcomes_serialize_with_tag() {
        let json = serde_json::to_value(EntryOutcome::Failed {
            key: "a".into(),
            kind: FailureKind::StoreWrite,
            error: "boom".into(),
        })
        .unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["kind"], "store_write");

        let json = serde_json::to_value(PassStatus::Degraded { failed: 3 }).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["failed"], 3);
    }
}
