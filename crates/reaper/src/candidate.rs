// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reap thresholds and candidate classification.

use corral_core::{JobId, JobStatus, JobType, ProvisionerJob};
use std::time::Duration;

/// A running job whose `updated_at` is older than this is hung.
///
/// Provisioner daemons heartbeat by touching `updated_at` while a job
/// executes, so a stale value means the daemon died or lost the job.
pub const HUNG_JOB_DURATION: Duration = Duration::from_secs(5 * 60);

/// A pending job whose `created_at` is older than this has been queued
/// past any reasonable admission window.
pub const PENDING_JOB_DURATION: Duration = Duration::from_secs(30 * 60);

/// Upper bound on terminations per tick. Excess candidates are picked up
/// by subsequent ticks.
pub const MAX_JOBS_PER_RUN: usize = 10;

/// Why a job is being reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapReason {
    Hung,
    Pending,
}

corral_core::simple_display! {
    ReapReason {
        Hung => "hung",
        Pending => "pending",
    }
}

impl ReapReason {
    /// The liveness threshold that classified the job.
    pub fn threshold(self) -> Duration {
        match self {
            ReapReason::Hung => HUNG_JOB_DURATION,
            ReapReason::Pending => PENDING_JOB_DURATION,
        }
    }
}

/// A job selected for termination in the current tick.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub job_id: JobId,
    pub job_type: JobType,
    pub reason: ReapReason,
}

impl Candidate {
    /// Build a candidate from a store row, if the row still classifies.
    pub fn from_job(job: &ProvisionerJob, now_ms: u64) -> Option<Self> {
        classify(job, now_ms).map(|reason| Candidate {
            job_id: job.id,
            job_type: job.job_type,
            reason,
        })
    }
}

/// Classify a job against the liveness deadlines at `now_ms`.
///
/// Strict inequalities: a job exactly at a threshold is left alone.
/// Completed jobs never classify; canceled-but-uncompleted jobs classify
/// like any other pending or running job.
pub fn classify(job: &ProvisionerJob, now_ms: u64) -> Option<ReapReason> {
    match job.status() {
        JobStatus::Terminal => None,
        JobStatus::Running => (job.updated_at_ms
            < now_ms.saturating_sub(HUNG_JOB_DURATION.as_millis() as u64))
        .then_some(ReapReason::Hung),
        JobStatus::Pending => (job.created_at_ms
            < now_ms.saturating_sub(PENDING_JOB_DURATION.as_millis() as u64))
        .then_some(ReapReason::Pending),
    }
}

#[cfg(test)]
#[path = "candidate_tests.rs"]
mod tests;
