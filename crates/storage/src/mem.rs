// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory job store.
//!
//! Reference implementation of [`JobStore`] with clone-and-swap transaction
//! semantics: a transaction stages a copy of the whole state and swaps it in
//! on commit, so an aborted transaction leaves no trace. Backs the reaper
//! test suites and single-process embeddings.

use crate::error::StoreError;
use crate::store::{CompleteJob, InsertJobLogs, JobStore, ReapCandidates, StoreTx};
use corral_core::{
    BuildId, JobId, JobLogEntry, JobStatus, ProvisionerJob, WorkspaceBuild, WorkspaceId,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
struct StoreState {
    jobs: HashMap<JobId, ProvisionerJob>,
    builds: HashMap<BuildId, WorkspaceBuild>,
    /// Append-only; `next_log_id` keeps ids monotone across all jobs.
    logs: Vec<JobLogEntry>,
    next_log_id: i64,
}

impl StoreState {
    fn insert_logs(&mut self, params: InsertJobLogs) -> Vec<JobLogEntry> {
        let mut inserted = Vec::with_capacity(params.outputs.len());
        for output in params.outputs {
            self.next_log_id += 1;
            let entry = JobLogEntry {
                id: self.next_log_id,
                job_id: params.job_id,
                created_at_ms: params.created_at_ms,
                level: params.level,
                stage: params.stage.clone(),
                source: params.source,
                output,
            };
            self.logs.push(entry.clone());
            inserted.push(entry);
        }
        inserted
    }
}

/// Shared in-memory store handle.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
    fail_candidates: Arc<Mutex<Option<String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a job row.
    pub fn insert_job(&self, job: ProvisionerJob) {
        self.state.lock().jobs.insert(job.id, job);
    }

    /// Seed a workspace build row.
    pub fn insert_build(&self, build: WorkspaceBuild) {
        self.state.lock().builds.insert(build.id, build);
    }

    /// Append log lines outside any transaction (seeding pre-existing logs).
    pub fn seed_logs(&self, params: InsertJobLogs) -> Vec<JobLogEntry> {
        self.state.lock().insert_logs(params)
    }

    pub fn job(&self, id: JobId) -> Option<ProvisionerJob> {
        self.state.lock().jobs.get(&id).cloned()
    }

    pub fn build(&self, id: BuildId) -> Option<WorkspaceBuild> {
        self.state.lock().builds.get(&id).cloned()
    }

    /// All log lines for a job, in append order.
    pub fn logs(&self, job_id: JobId) -> Vec<JobLogEntry> {
        self.state
            .lock()
            .logs
            .iter()
            .filter(|l| l.job_id == job_id)
            .cloned()
            .collect()
    }

    /// Make the next `reap_candidates` call fail with `msg`.
    pub fn fail_next_candidates(&self, msg: &str) {
        *self.fail_candidates.lock() = Some(msg.to_string());
    }
}

fn eligible(job: &ProvisionerJob, params: &ReapCandidates) -> bool {
    match job.status() {
        JobStatus::Terminal => false,
        JobStatus::Running => job.updated_at_ms < params.hung_since_ms,
        JobStatus::Pending => job.created_at_ms < params.pending_since_ms,
    }
}

impl JobStore for InMemoryStore {
    fn reap_candidates(&self, params: ReapCandidates) -> Result<Vec<ProvisionerJob>, StoreError> {
        if let Some(msg) = self.fail_candidates.lock().take() {
            return Err(StoreError::Unavailable(msg));
        }
        let state = self.state.lock();
        let mut rows: Vec<ProvisionerJob> = state
            .jobs
            .values()
            .filter(|job| eligible(job, &params))
            .cloned()
            .collect();
        rows.sort_by_key(|job| (job.created_at_ms, job.id));
        rows.truncate(params.max);
        Ok(rows)
    }

    fn in_transaction<T, E>(&self, f: impl FnOnce(&mut dyn StoreTx) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut guard = self.state.lock();
        let mut staged = guard.clone();
        let result = f(&mut MemTx { state: &mut staged });
        if result.is_ok() {
            *guard = staged;
        }
        result
    }

    fn job_logs_since(&self, job_id: JobId, since_ms: u64) -> Result<Vec<JobLogEntry>, StoreError> {
        Ok(self
            .state
            .lock()
            .logs
            .iter()
            .filter(|l| l.job_id == job_id && l.created_at_ms >= since_ms)
            .cloned()
            .collect())
    }
}

struct MemTx<'a> {
    state: &'a mut StoreState,
}

impl StoreTx for MemTx<'_> {
    fn job_by_id(&self, id: JobId) -> Result<ProvisionerJob, StoreError> {
        self.state
            .jobs
            .get(&id)
            .cloned()
            .ok_or(StoreError::JobNotFound(id))
    }

    fn workspace_build_by_job_id(&self, job_id: JobId) -> Result<WorkspaceBuild, StoreError> {
        self.state
            .builds
            .values()
            .find(|b| b.job_id == job_id)
            .cloned()
            .ok_or(StoreError::BuildNotFoundForJob(job_id))
    }

    fn latest_earlier_build_with_state(
        &self,
        workspace_id: WorkspaceId,
        before_build_number: i32,
    ) -> Result<Option<WorkspaceBuild>, StoreError> {
        Ok(self
            .state
            .builds
            .values()
            .filter(|b| {
                b.workspace_id == workspace_id
                    && b.build_number < before_build_number
                    && b.has_state()
            })
            .max_by_key(|b| b.build_number)
            .cloned())
    }

    fn update_workspace_build_state(
        &mut self,
        id: BuildId,
        state: Vec<u8>,
    ) -> Result<(), StoreError> {
        let build = self
            .state
            .builds
            .get_mut(&id)
            .ok_or(StoreError::BuildNotFound(id))?;
        build.provisioner_state = state;
        Ok(())
    }

    fn last_log_stage(&self, job_id: JobId) -> Result<Option<String>, StoreError> {
        Ok(self
            .state
            .logs
            .iter()
            .rev()
            .find(|l| l.job_id == job_id)
            .map(|l| l.stage.clone()))
    }

    fn insert_job_logs(&mut self, params: InsertJobLogs) -> Result<Vec<JobLogEntry>, StoreError> {
        Ok(self.state.insert_logs(params))
    }

    fn complete_job(&mut self, params: CompleteJob) -> Result<(), StoreError> {
        let job = self
            .state
            .jobs
            .get_mut(&params.id)
            .ok_or(StoreError::JobNotFound(params.id))?;
        job.updated_at_ms = params.updated_at_ms;
        job.completed_at_ms = Some(params.completed_at_ms);
        if let Some(started_at_ms) = params.started_at_ms {
            job.started_at_ms.get_or_insert(started_at_ms);
        }
        job.error = Some(params.error);
        Ok(())
    }
}

#[cfg(test)]
#[path = "mem_tests.rs"]
mod tests;
