// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! corral-adapters: External-service adapters for the Corral workspace
//! orchestrator
//!
//! The broker behind the pub/sub adapter lives outside this repository;
//! this crate defines the trait the server programs against and an
//! in-memory implementation for tests and single-process embeddings.

mod pubsub;

pub use pubsub::{InMemoryPubsub, PublishedMessage, Pubsub, PubsubError};
