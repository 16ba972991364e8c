// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job transactional terminate-and-recover routine.

use crate::candidate::{Candidate, ReapReason};
use crate::messages::{
    job_log_messages, job_logs_notify_channel, reap_error_message, LogsNotifyMessage,
};
use corral_adapters::Pubsub;
use corral_core::{DryRunInput, JobId, JobType, LogLevel, LogSource};
use corral_storage::{CompleteJob, InsertJobLogs, JobStore, StoreError, StoreTx};
use thiserror::Error;

/// Stage recorded on terminal log lines when a job has no prior logs or
/// the last line's stage is empty.
const UNKNOWN_STAGE: &str = "Unknown";

/// Errors from reaping a single candidate.
#[derive(Debug, Error)]
pub enum ReapError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid dry-run input for job {job_id}: {message}")]
    InvalidDryRunInput { job_id: JobId, message: String },
}

impl ReapError {
    /// Programming errors skip the candidate without failing the tick;
    /// retrying them next tick cannot help.
    pub(crate) fn is_programming(&self) -> bool {
        matches!(self, ReapError::InvalidDryRunInput { .. })
    }
}

/// Outcome of processing one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReapOutcome {
    /// The job was finalized in this transaction.
    Terminated,
    /// The job completed between the candidate query and the reload.
    AlreadyCompleted,
}

/// Terminate one candidate at `now_ms`.
///
/// Everything up to the commit happens in a single store transaction; the
/// log notification is published only after the commit succeeds, so
/// watchers never observe a watermark for rows that were rolled back.
pub(crate) async fn reap_job<S, P>(
    store: &S,
    pubsub: &P,
    candidate: &Candidate,
    now_ms: u64,
) -> Result<ReapOutcome, ReapError>
where
    S: JobStore,
    P: Pubsub,
{
    let reason = candidate.reason;
    let threshold = reason.threshold();

    let notify = store.in_transaction(|tx| -> Result<Option<LogsNotifyMessage>, ReapError> {
        let job = tx.job_by_id(candidate.job_id)?;
        if job.is_terminal() {
            // Another actor finished the job after the candidate query.
            return Ok(None);
        }

        match job.job_type {
            JobType::WorkspaceBuild => restore_build_state(tx, job.id)?,
            JobType::TemplateVersionImport => {}
            JobType::TemplateVersionDryRun => {
                // The input names the template version the dry run was
                // exercising; surface it for operators chasing the reap.
                let input = DryRunInput::parse(&job.input).map_err(|e| {
                    ReapError::InvalidDryRunInput {
                        job_id: job.id,
                        message: e.to_string(),
                    }
                })?;
                tracing::debug!(
                    job_id = %job.id,
                    template_version_id = %input.template_version_id,
                    "reaping template version dry run"
                );
            }
        }

        let stage = tx
            .last_log_stage(job.id)?
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_STAGE.to_string());

        let inserted = tx.insert_job_logs(InsertJobLogs {
            job_id: job.id,
            created_at_ms: now_ms,
            level: LogLevel::Error,
            stage,
            source: LogSource::ProvisionerDaemon,
            outputs: job_log_messages(reason, threshold),
        })?;
        let created_after = inserted.iter().map(|l| l.created_at_ms).max().unwrap_or(0);

        // Pending jobs never started; stamp the start so the terminal row
        // reads as a zero-length run rather than a malformed record.
        let started_at_ms = match (reason, job.started_at_ms) {
            (ReapReason::Pending, None) => Some(now_ms),
            _ => None,
        };

        tx.complete_job(CompleteJob {
            id: job.id,
            updated_at_ms: now_ms,
            completed_at_ms: now_ms,
            started_at_ms,
            error: reap_error_message(reason, threshold),
        })?;

        Ok(Some(LogsNotifyMessage {
            end_of_logs: true,
            created_after,
        }))
    })?;

    let Some(message) = notify else {
        return Ok(ReapOutcome::AlreadyCompleted);
    };

    // The terminal write is already durable; log delivery is best-effort.
    match serde_json::to_vec(&message) {
        Ok(payload) => {
            let channel = job_logs_notify_channel(candidate.job_id);
            if let Err(e) = pubsub.publish(&channel, &payload).await {
                tracing::warn!(
                    job_id = %candidate.job_id,
                    error = %e,
                    "failed to notify log watchers of reaped job"
                );
            }
        }
        Err(e) => {
            tracing::warn!(
                job_id = %candidate.job_id,
                error = %e,
                "failed to encode log notification"
            );
        }
    }

    Ok(ReapOutcome::Terminated)
}

/// Copy forward the provisioner state from the workspace's previous build
/// when the reaped build never computed any.
///
/// A build with its own state keeps it; a workspace with no earlier
/// stateful build is left untouched.
fn restore_build_state(tx: &mut dyn StoreTx, job_id: JobId) -> Result<(), StoreError> {
    let build = tx.workspace_build_by_job_id(job_id)?;
    if build.has_state() {
        return Ok(());
    }
    let Some(prev) = tx.latest_earlier_build_with_state(build.workspace_id, build.build_number)?
    else {
        return Ok(());
    };
    tracing::debug!(
        job_id = %job_id,
        build_id = %build.id,
        prev_build_number = prev.build_number,
        "restoring provisioner state from previous build"
    );
    tx.update_workspace_build_state(build.id, prev.provisioner_state)
}
