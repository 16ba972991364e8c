// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! corral-reaper: detection and termination of stuck provisioner jobs
//!
//! The reaper is a background control loop embedded in the Corral server.
//! On every tick it queries the store for provisioner jobs that are hung
//! (started but no longer heartbeating) or pending (queued past any
//! reasonable admission window), terminates each one in its own store
//! transaction, repairs workspace build state where a prior build can
//! supply it, appends a terminal log block, and notifies log watchers over
//! pub/sub.
//!
//! The reaper enforces liveness deadlines only. It never judges whether a
//! job should have succeeded, and it never restarts or requeues what it
//! terminates; owners observe the terminal state and decide recovery.

mod candidate;
mod detector;
mod messages;
mod terminator;

pub use candidate::{
    classify, Candidate, ReapReason, HUNG_JOB_DURATION, MAX_JOBS_PER_RUN, PENDING_JOB_DURATION,
};
pub use detector::{Detector, TickStats};
pub use messages::{
    job_log_messages, job_logs_notify_channel, reap_error_message, LogsNotifyMessage,
};
pub use terminator::ReapError;
