// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use corral_core::{BuildId, JobId};
use thiserror::Error;

/// Errors from job-store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("no workspace build for job: {0}")]
    BuildNotFoundForJob(JobId),

    #[error("workspace build not found: {0}")]
    BuildNotFound(BuildId),

    /// Transient failure (connectivity, contention). Callers retry on the
    /// next tick rather than within the current one.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
