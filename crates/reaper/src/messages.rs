// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stable strings and payloads recorded for reaped jobs.

use crate::candidate::ReapReason;
use corral_core::JobId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pub/sub channel carrying "new logs available" notifications for a job.
pub fn job_logs_notify_channel(job_id: JobId) -> String {
    format!("provisioner_job_logs:{job_id}")
}

/// Payload published on a job's log channel once the terminal log block is
/// durably written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsNotifyMessage {
    pub end_of_logs: bool,
    /// Highest `created_at_ms` of the inserted log lines, `0` if none.
    /// Readers fetch everything at or after this watermark.
    pub created_after: u64,
}

/// Terminal log block appended to a reaped job.
///
/// Consumers rely on byte-equality of these lines; change them only with a
/// migration story for anything parsing job logs.
pub fn job_log_messages(reason: ReapReason, threshold: Duration) -> Vec<String> {
    vec![
        String::new(),
        "====================".to_string(),
        format!(
            "Corral: Build has been detected as {} for {} minutes and will be terminated.",
            reason,
            threshold.as_secs() / 60
        ),
        "====================".to_string(),
        String::new(),
    ]
}

/// Terminal error recorded on a reaped job.
///
/// The `"Build has been detected as <reason>"` prefix is the contract;
/// the remainder is informative.
pub fn reap_error_message(reason: ReapReason, threshold: Duration) -> String {
    format!(
        "Build has been detected as {} for {} minutes and has been terminated by the reaper.",
        reason,
        threshold.as_secs() / 60
    )
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
