// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! corral-storage: Job-store facade for the Corral workspace orchestrator
//!
//! The relational store itself (and its migrations, and the authorization
//! wrapper around it) lives outside this repository. This crate defines the
//! transactional facade the server programs against, plus an in-memory
//! implementation that backs the test suites.

mod error;
mod mem;
mod store;

pub use error::StoreError;
pub use mem::InMemoryStore;
pub use store::{CompleteJob, InsertJobLogs, JobStore, ReapCandidates, StoreTx};
