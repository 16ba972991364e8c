// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reap loop lifecycle: tick handling, per-tick fan-out, stats, shutdown.

use crate::candidate::{Candidate, HUNG_JOB_DURATION, MAX_JOBS_PER_RUN, PENDING_JOB_DURATION};
use crate::terminator::{reap_job, ReapError, ReapOutcome};
use corral_adapters::Pubsub;
use corral_core::JobId;
use corral_storage::{JobStore, ReapCandidates};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::{JoinHandle, JoinSet};

/// Outcome of one tick, emitted on the stats channel when one is attached.
#[derive(Debug, Default)]
pub struct TickStats {
    /// First transient error hit this tick, if any. The affected jobs are
    /// reconsidered on the next tick.
    pub error: Option<ReapError>,
    /// Jobs finalized this tick. Order is not significant.
    pub terminated_job_ids: Vec<JobId>,
}

/// Background loop that terminates hung and pending provisioner jobs.
///
/// Construct with [`Detector::new`], optionally attach a stats channel,
/// then [`start`](Self::start) the worker from within a tokio runtime.
/// Shutdown is two-phase: [`close`](Self::close) requests termination and
/// [`wait`](Self::wait) blocks until the in-flight tick (if any) drains.
pub struct Detector<S, P> {
    store: S,
    pubsub: P,
    ticks: Option<mpsc::Receiver<u64>>,
    stats_tx: Option<mpsc::Sender<TickStats>>,
    shutdown: Arc<Notify>,
    worker: Option<JoinHandle<()>>,
}

impl<S, P> Detector<S, P>
where
    S: JobStore,
    P: Pubsub,
{
    /// Create a detector driven by `ticks`. Each tick carries the wall
    /// clock (epoch milliseconds) the scan evaluates against, which keeps
    /// tests in full control of time.
    pub fn new(store: S, pubsub: P, ticks: mpsc::Receiver<u64>) -> Self {
        Self {
            store,
            pubsub,
            ticks: Some(ticks),
            stats_tx: None,
            shutdown: Arc::new(Notify::new()),
            worker: None,
        }
    }

    /// Attach a channel receiving exactly one [`TickStats`] per tick.
    ///
    /// A slow consumer imposes its rate on the loop; production embeddings
    /// either skip the channel or drain it eagerly.
    pub fn with_stats_channel(mut self, tx: mpsc::Sender<TickStats>) -> Self {
        self.stats_tx = Some(tx);
        self
    }

    /// Spawn the background worker. Subsequent calls are no-ops.
    pub fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }
        let Some(ticks) = self.ticks.take() else {
            return;
        };
        let worker = Worker {
            store: self.store.clone(),
            pubsub: self.pubsub.clone(),
            stats_tx: self.stats_tx.clone(),
            shutdown: Arc::clone(&self.shutdown),
        };
        self.worker = Some(tokio::spawn(worker.run(ticks)));
    }

    /// Request shutdown. Safe to call repeatedly; never blocks.
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    /// Wait for the worker to exit. Returns immediately if the detector
    /// was never started.
    pub async fn wait(&mut self) {
        if let Some(handle) = self.worker.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "reaper worker panicked");
            }
        }
    }
}

struct Worker<S, P> {
    store: S,
    pubsub: P,
    stats_tx: Option<mpsc::Sender<TickStats>>,
    shutdown: Arc<Notify>,
}

impl<S, P> Worker<S, P>
where
    S: JobStore,
    P: Pubsub,
{
    async fn run(self, mut ticks: mpsc::Receiver<u64>) {
        loop {
            let now_ms = tokio::select! {
                _ = self.shutdown.notified() => break,
                tick = ticks.recv() => match tick {
                    Some(now_ms) => now_ms,
                    // Tick source dropped; nothing further will arrive.
                    None => break,
                },
            };

            let stats = self.run_tick(now_ms).await;

            if let Some(tx) = &self.stats_tx {
                // Racing shutdown here keeps close()/wait() from hanging
                // on a consumer that stopped reading.
                tokio::select! {
                    _ = self.shutdown.notified() => break,
                    sent = tx.send(stats) => {
                        if sent.is_err() {
                            tracing::debug!("stats receiver dropped");
                        }
                    }
                }
            }
        }
        tracing::debug!("reaper worker exited");
    }

    async fn run_tick(&self, now_ms: u64) -> TickStats {
        let params = ReapCandidates {
            hung_since_ms: now_ms.saturating_sub(HUNG_JOB_DURATION.as_millis() as u64),
            pending_since_ms: now_ms.saturating_sub(PENDING_JOB_DURATION.as_millis() as u64),
            max: MAX_JOBS_PER_RUN,
        };
        let rows = match self.store.reap_candidates(params) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "candidate query failed, deferring to next tick");
                return TickStats {
                    error: Some(e.into()),
                    terminated_job_ids: Vec::new(),
                };
            }
        };

        let mut tasks: JoinSet<(Candidate, Result<ReapOutcome, ReapError>)> = JoinSet::new();
        for job in &rows {
            let Some(candidate) = Candidate::from_job(job, now_ms) else {
                // The row stopped qualifying between the query and here.
                continue;
            };
            let store = self.store.clone();
            let pubsub = self.pubsub.clone();
            tasks.spawn(async move {
                let outcome = reap_job(&store, &pubsub, &candidate, now_ms).await;
                (candidate, outcome)
            });
        }

        let mut stats = TickStats::default();
        while let Some(joined) = tasks.join_next().await {
            let (candidate, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!(error = %e, "reap task failed");
                    continue;
                }
            };
            match outcome {
                Ok(ReapOutcome::Terminated) => {
                    tracing::info!(
                        job_id = %candidate.job_id,
                        job_type = %candidate.job_type,
                        reason = %candidate.reason,
                        "terminated stuck provisioner job"
                    );
                    stats.terminated_job_ids.push(candidate.job_id);
                }
                Ok(ReapOutcome::AlreadyCompleted) => {
                    tracing::debug!(
                        job_id = %candidate.job_id,
                        "job completed before reap, skipping"
                    );
                }
                Err(e) if e.is_programming() => {
                    tracing::error!(
                        job_id = %candidate.job_id,
                        error = %e,
                        "cannot reap job, skipping"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %candidate.job_id,
                        error = %e,
                        "failed to reap job, will retry next tick"
                    );
                    if stats.error.is_none() {
                        stats.error = Some(e);
                    }
                }
            }
        }
        stats
    }
}

#[cfg(test)]
#[path = "detector_tests.rs"]
mod tests;
