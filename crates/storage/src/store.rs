// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The store facade consumed by the reaper.

use crate::error::StoreError;
use corral_core::{
    BuildId, JobId, JobLogEntry, LogLevel, LogSource, ProvisionerJob, WorkspaceBuild, WorkspaceId,
};

/// Cutoffs for the candidate query. Jobs strictly older than the relevant
/// cutoff qualify.
#[derive(Debug, Clone, Copy)]
pub struct ReapCandidates {
    /// Running jobs with `updated_at_ms` before this are hung.
    pub hung_since_ms: u64,
    /// Pending jobs with `created_at_ms` before this are stale.
    pub pending_since_ms: u64,
    /// Upper bound on returned rows.
    pub max: usize,
}

/// Parameters for appending a block of log lines to a job.
///
/// All lines in the block share a timestamp, level, stage, and source; the
/// store assigns monotone ids and returns the inserted rows in order.
#[derive(Debug, Clone)]
pub struct InsertJobLogs {
    pub job_id: JobId,
    pub created_at_ms: u64,
    pub level: LogLevel,
    pub stage: String,
    pub source: LogSource,
    pub outputs: Vec<String>,
}

/// Parameters for finalizing a job with a terminal error.
///
/// `error_code` and `canceled_at_ms` are never touched by this operation.
#[derive(Debug, Clone)]
pub struct CompleteJob {
    pub id: JobId,
    pub updated_at_ms: u64,
    pub completed_at_ms: u64,
    /// Backfill only: applied when the stored value is absent, otherwise
    /// the existing start time is preserved. `None` leaves it untouched.
    pub started_at_ms: Option<u64>,
    pub error: String,
}

/// Transactional view of the store.
///
/// All writes made through a `StoreTx` become durable only when the closure
/// passed to [`JobStore::in_transaction`] returns `Ok`.
pub trait StoreTx {
    fn job_by_id(&self, id: JobId) -> Result<ProvisionerJob, StoreError>;

    fn workspace_build_by_job_id(&self, job_id: JobId) -> Result<WorkspaceBuild, StoreError>;

    /// The most recent build for `workspace_id` with a build number strictly
    /// below `before_build_number` and non-empty provisioner state.
    fn latest_earlier_build_with_state(
        &self,
        workspace_id: WorkspaceId,
        before_build_number: i32,
    ) -> Result<Option<WorkspaceBuild>, StoreError>;

    fn update_workspace_build_state(
        &mut self,
        id: BuildId,
        state: Vec<u8>,
    ) -> Result<(), StoreError>;

    /// Stage of the last log line appended to the job, if any.
    fn last_log_stage(&self, job_id: JobId) -> Result<Option<String>, StoreError>;

    fn insert_job_logs(&mut self, params: InsertJobLogs) -> Result<Vec<JobLogEntry>, StoreError>;

    fn complete_job(&mut self, params: CompleteJob) -> Result<(), StoreError>;
}

/// Facade over the relational job store.
///
/// Implementations are shared and concurrent-safe; per-job atomicity comes
/// from [`in_transaction`](Self::in_transaction), not from caller-side locks.
pub trait JobStore: Clone + Send + Sync + 'static {
    /// Jobs currently eligible for reaping, ordered by `(created_at_ms, id)`
    /// and truncated to `params.max`. Canceled-but-uncompleted jobs are
    /// included under the same staleness tests.
    fn reap_candidates(&self, params: ReapCandidates) -> Result<Vec<ProvisionerJob>, StoreError>;

    /// Run `f` against a transactional view. Writes commit iff `f` returns
    /// `Ok`; any `Err` aborts with no visible effects.
    fn in_transaction<T, E>(
        &self,
        f: impl FnOnce(&mut dyn StoreTx) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>;

    /// Log lines for a job with `created_at_ms` at or after `since_ms`,
    /// in append order.
    fn job_logs_since(&self, job_id: JobId, since_ms: u64) -> Result<Vec<JobLogEntry>, StoreError>;
}
