// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provisioner job entity and its derived lifecycle status.

use crate::id::{JobId, TemplateVersionId};
use serde::{Deserialize, Serialize};

/// Kind of work a provisioner job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    WorkspaceBuild,
    TemplateVersionImport,
    TemplateVersionDryRun,
}

crate::simple_display! {
    JobType {
        WorkspaceBuild => "workspace_build",
        TemplateVersionImport => "template_version_import",
        TemplateVersionDryRun => "template_version_dry_run",
    }
}

/// Lifecycle status derived from a job's timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Queued; no daemon has picked it up.
    Pending,
    /// Picked up and not yet completed.
    Running,
    /// Completed, whether successfully or not.
    Terminal,
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        Running => "running",
        Terminal => "terminal",
    }
}

/// A unit of work executed by an external provisioner daemon.
///
/// All timestamps are epoch milliseconds assigned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionerJob {
    pub id: JobId,
    pub job_type: JobType,
    /// Opaque job input. Only dry-run jobs carry a shape the server
    /// itself interprets (see [`DryRunInput`]).
    pub input: Vec<u8>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub started_at_ms: Option<u64>,
    pub canceled_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

impl ProvisionerJob {
    /// Derived status. Cancellation alone is not completion: a canceled
    /// job without `completed_at_ms` still reports pending or running.
    pub fn status(&self) -> JobStatus {
        if self.completed_at_ms.is_some() {
            JobStatus::Terminal
        } else if self.started_at_ms.is_some() {
            JobStatus::Running
        } else {
            JobStatus::Pending
        }
    }

    /// Check if the job has completed.
    pub fn is_terminal(&self) -> bool {
        self.status() == JobStatus::Terminal
    }
}

/// Input payload of a `template_version_dry_run` job, naming the template
/// version the dry run exercises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DryRunInput {
    pub template_version_id: TemplateVersionId,
}

impl DryRunInput {
    /// Parse a dry-run job's input bytes.
    pub fn parse(input: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(input)
    }
}

crate::builder! {
    pub struct ProvisionerJobBuilder => ProvisionerJob {
        set {
            id: JobId = JobId::new(),
            job_type: JobType = JobType::WorkspaceBuild,
            input: Vec<u8> = b"{}".to_vec(),
            created_at_ms: u64 = 1_000_000,
            updated_at_ms: u64 = 1_000_000,
        }
        option {
            started_at_ms: u64 = None,
            canceled_at_ms: u64 = None,
            completed_at_ms: u64 = None,
            error: String = None,
            error_code: String = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
