// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only provisioner job logs.

use crate::id::JobId;
use serde::{Deserialize, Serialize};

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

crate::simple_display! {
    LogLevel {
        Trace => "trace",
        Debug => "debug",
        Info => "info",
        Warn => "warn",
        Error => "error",
    }
}

/// Which side of the provisioning pipeline emitted a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    Provisioner,
    ProvisionerDaemon,
}

crate::simple_display! {
    LogSource {
        Provisioner => "provisioner",
        ProvisionerDaemon => "provisioner_daemon",
    }
}

/// One ordered log line for a provisioner job.
///
/// `id` is store-assigned and monotone across all jobs; within one job it
/// gives the append order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub id: i64,
    pub job_id: JobId,
    pub created_at_ms: u64,
    pub level: LogLevel,
    pub stage: String,
    pub source: LogSource,
    pub output: String,
}
