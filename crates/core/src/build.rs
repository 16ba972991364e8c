// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace build entity.

use crate::id::{BuildId, JobId, TemplateVersionId, WorkspaceId};
use serde::{Deserialize, Serialize};

/// A record linking a workspace to the provisioner job that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceBuild {
    pub id: BuildId,
    pub workspace_id: WorkspaceId,
    pub template_version_id: TemplateVersionId,
    /// Monotone per workspace; build N+1 supersedes build N.
    pub build_number: i32,
    pub job_id: JobId,
    /// Opaque provisioner-side state the build computed. Empty means the
    /// build never checkpointed any.
    pub provisioner_state: Vec<u8>,
}

impl WorkspaceBuild {
    /// Check whether the build carries provisioner state.
    pub fn has_state(&self) -> bool {
        !self.provisioner_state.is_empty()
    }
}
