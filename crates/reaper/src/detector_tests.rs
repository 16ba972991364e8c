// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests for the reap loop against the in-memory store.

use super::{Detector, TickStats};
use crate::candidate::{ReapReason, HUNG_JOB_DURATION, MAX_JOBS_PER_RUN};
use crate::messages::{job_log_messages, job_logs_notify_channel, LogsNotifyMessage};
use corral_adapters::InMemoryPubsub;
use corral_core::{
    BuildId, DryRunInput, JobId, JobType, LogLevel, LogSource, ProvisionerJob, TemplateVersionId,
    WorkspaceBuild, WorkspaceId,
};
use corral_storage::{InMemoryStore, InsertJobLogs, JobStore};
use tokio::sync::mpsc;

const NOW: u64 = 1_700_000_000_000;

fn mins_ago(minutes: u64) -> u64 {
    NOW - minutes * 60_000
}

struct TestHarness {
    store: InMemoryStore,
    pubsub: InMemoryPubsub,
    tick_tx: mpsc::Sender<u64>,
    stats_rx: mpsc::Receiver<TickStats>,
    detector: Detector<InMemoryStore, InMemoryPubsub>,
}

fn harness() -> TestHarness {
    let store = InMemoryStore::new();
    let pubsub = InMemoryPubsub::new();
    let (tick_tx, tick_rx) = mpsc::channel(1);
    let (stats_tx, stats_rx) = mpsc::channel(1);
    let mut detector =
        Detector::new(store.clone(), pubsub.clone(), tick_rx).with_stats_channel(stats_tx);
    detector.start();
    TestHarness {
        store,
        pubsub,
        tick_tx,
        stats_rx,
        detector,
    }
}

impl TestHarness {
    /// Send one tick and wait for its stats.
    async fn tick(&mut self, now_ms: u64) -> TickStats {
        self.tick_tx.send(now_ms).await.unwrap();
        self.stats_rx.recv().await.unwrap()
    }

    async fn shutdown(mut self) {
        self.detector.close();
        self.detector.wait().await;
    }
}

/// A hung template version import: no workspace build row required.
fn hung_import_job() -> ProvisionerJob {
    ProvisionerJob::builder()
        .job_type(JobType::TemplateVersionImport)
        .created_at_ms(mins_ago(60))
        .updated_at_ms(mins_ago(60))
        .started_at_ms(mins_ago(60))
        .build()
}

fn build_row(
    workspace_id: WorkspaceId,
    build_number: i32,
    job_id: JobId,
    state: &[u8],
) -> WorkspaceBuild {
    WorkspaceBuild {
        id: BuildId::new(),
        workspace_id,
        template_version_id: TemplateVersionId::new(),
        build_number,
        job_id,
        provisioner_state: state.to_vec(),
    }
}

/// Seed a completed earlier build carrying `state` for `workspace_id`.
fn seed_previous_build(store: &InMemoryStore, workspace_id: WorkspaceId, state: &[u8]) {
    let job = ProvisionerJob::builder()
        .created_at_ms(mins_ago(20))
        .updated_at_ms(mins_ago(20))
        .started_at_ms(mins_ago(20))
        .completed_at_ms(mins_ago(20))
        .build();
    store.insert_job(job.clone());
    store.insert_build(build_row(workspace_id, 1, job.id, state));
}

#[tokio::test]
async fn no_jobs_tick_emits_empty_stats() {
    let mut h = harness();

    let stats = h.tick(NOW).await;
    assert!(stats.error.is_none());
    assert!(stats.terminated_job_ids.is_empty());

    h.shutdown().await;
}

#[tokio::test]
async fn running_jobs_within_threshold_are_not_reaped() {
    let mut h = harness();
    for minutes in 0..5u64 {
        h.store.insert_job(
            ProvisionerJob::builder()
                .created_at_ms(mins_ago(5))
                .updated_at_ms(mins_ago(minutes))
                .started_at_ms(mins_ago(5))
                .build(),
        );
    }

    let stats = h.tick(NOW).await;
    assert!(stats.error.is_none());
    assert!(stats.terminated_job_ids.is_empty());

    h.shutdown().await;
}

#[tokio::test]
async fn hung_workspace_build_restores_previous_state() {
    let mut h = harness();
    let workspace_id = WorkspaceId::new();
    let prev_state: &[u8] = br#"{"dean":"cool","colin":"also cool"}"#;
    seed_previous_build(&h.store, workspace_id, prev_state);

    let job = ProvisionerJob::builder()
        .created_at_ms(mins_ago(10))
        .updated_at_ms(mins_ago(6))
        .started_at_ms(mins_ago(10))
        .build();
    h.store.insert_job(job.clone());
    let build = build_row(workspace_id, 2, job.id, b"");
    h.store.insert_build(build.clone());

    let stats = h.tick(NOW).await;
    assert!(stats.error.is_none());
    assert_eq!(stats.terminated_job_ids, vec![job.id]);

    let reaped = h.store.job(job.id).unwrap();
    assert_eq!(reaped.updated_at_ms, NOW);
    assert_eq!(reaped.completed_at_ms, Some(NOW));
    let error = reaped.error.unwrap();
    assert!(
        error.starts_with("Build has been detected as hung"),
        "{error}"
    );
    assert!(reaped.error_code.is_none());

    assert_eq!(
        h.store.build(build.id).unwrap().provisioner_state,
        prev_state.to_vec()
    );

    h.shutdown().await;
}

#[tokio::test]
async fn hung_workspace_build_keeps_its_own_state() {
    let mut h = harness();
    let workspace_id = WorkspaceId::new();
    seed_previous_build(&h.store, workspace_id, br#"{"dean":"NOT cool"}"#);

    let own_state: &[u8] = br#"{"dean":"cool","colin":"also cool"}"#;
    let job = ProvisionerJob::builder()
        .created_at_ms(mins_ago(10))
        .updated_at_ms(mins_ago(6))
        .started_at_ms(mins_ago(10))
        .build();
    h.store.insert_job(job.clone());
    let build = build_row(workspace_id, 2, job.id, own_state);
    h.store.insert_build(build.clone());

    let stats = h.tick(NOW).await;
    assert_eq!(stats.terminated_job_ids, vec![job.id]);

    // The build got far enough to checkpoint; the prior state must not
    // clobber it.
    assert_eq!(
        h.store.build(build.id).unwrap().provisioner_state,
        own_state.to_vec()
    );

    h.shutdown().await;
}

#[tokio::test]
async fn hung_workspace_build_without_prior_build_keeps_empty_state() {
    let mut h = harness();
    let workspace_id = WorkspaceId::new();

    let job = ProvisionerJob::builder()
        .created_at_ms(mins_ago(10))
        .updated_at_ms(mins_ago(6))
        .started_at_ms(mins_ago(10))
        .build();
    h.store.insert_job(job.clone());
    let build = build_row(workspace_id, 1, job.id, b"");
    h.store.insert_build(build.clone());

    let stats = h.tick(NOW).await;
    assert_eq!(stats.terminated_job_ids, vec![job.id]);
    assert!(h.store.build(build.id).unwrap().provisioner_state.is_empty());

    h.shutdown().await;
}

#[tokio::test]
async fn pending_workspace_build_backfills_start_and_terminates() {
    let mut h = harness();
    let workspace_id = WorkspaceId::new();

    let job = ProvisionerJob::builder()
        .created_at_ms(mins_ago(35))
        .updated_at_ms(mins_ago(35))
        .build();
    h.store.insert_job(job.clone());
    let build = build_row(workspace_id, 1, job.id, b"");
    h.store.insert_build(build.clone());

    let stats = h.tick(NOW).await;
    assert!(stats.error.is_none());
    assert_eq!(stats.terminated_job_ids, vec![job.id]);

    let reaped = h.store.job(job.id).unwrap();
    assert_eq!(reaped.started_at_ms, Some(NOW));
    assert_eq!(reaped.completed_at_ms, Some(NOW));
    let error = reaped.error.unwrap();
    assert!(
        error.starts_with("Build has been detected as pending"),
        "{error}"
    );
    assert!(reaped.error_code.is_none());
    assert!(h.store.build(build.id).unwrap().provisioner_state.is_empty());

    h.shutdown().await;
}

#[tokio::test]
async fn hung_canceled_job_is_still_terminated() {
    let mut h = harness();
    let job = ProvisionerJob::builder()
        .job_type(JobType::TemplateVersionImport)
        .created_at_ms(mins_ago(10))
        .updated_at_ms(mins_ago(6))
        .started_at_ms(mins_ago(10))
        .canceled_at_ms(mins_ago(10))
        .build();
    h.store.insert_job(job.clone());

    let stats = h.tick(NOW).await;
    assert_eq!(stats.terminated_job_ids, vec![job.id]);

    let reaped = h.store.job(job.id).unwrap();
    assert_eq!(reaped.completed_at_ms, Some(NOW));
    // Cancellation is preserved; the reaper only adds completion.
    assert_eq!(reaped.canceled_at_ms, Some(mins_ago(10)));
    let error = reaped.error.unwrap();
    assert!(
        error.starts_with("Build has been detected as hung"),
        "{error}"
    );

    h.shutdown().await;
}

#[tokio::test]
async fn hung_template_version_dry_run_is_terminated() {
    let mut h = harness();
    let template_version_id = TemplateVersionId::new();
    let input = serde_json::to_vec(&DryRunInput {
        template_version_id,
    })
    .unwrap();
    let job = ProvisionerJob::builder()
        .job_type(JobType::TemplateVersionDryRun)
        .input(input)
        .created_at_ms(mins_ago(10))
        .updated_at_ms(mins_ago(6))
        .started_at_ms(mins_ago(10))
        .build();
    h.store.insert_job(job.clone());

    let stats = h.tick(NOW).await;
    assert!(stats.error.is_none());
    assert_eq!(stats.terminated_job_ids, vec![job.id]);

    h.shutdown().await;
}

#[tokio::test]
async fn malformed_dry_run_input_skips_only_that_candidate() {
    let mut h = harness();
    let bad = ProvisionerJob::builder()
        .job_type(JobType::TemplateVersionDryRun)
        .input(b"not json".to_vec())
        .created_at_ms(mins_ago(10))
        .updated_at_ms(mins_ago(6))
        .started_at_ms(mins_ago(10))
        .build();
    h.store.insert_job(bad.clone());
    let good = hung_import_job();
    h.store.insert_job(good.clone());

    let stats = h.tick(NOW).await;
    // A malformed candidate is a programming error: logged and skipped,
    // not surfaced as a tick error.
    assert!(stats.error.is_none());
    assert_eq!(stats.terminated_job_ids, vec![good.id]);
    assert!(h.store.job(bad.id).unwrap().completed_at_ms.is_none());

    h.shutdown().await;
}

#[tokio::test]
async fn max_jobs_per_run_caps_each_tick() {
    let mut h = harness();
    for _ in 0..MAX_JOBS_PER_RUN + 1 {
        h.store.insert_job(hung_import_job());
    }

    let stats = h.tick(NOW).await;
    assert!(stats.error.is_none());
    assert_eq!(stats.terminated_job_ids.len(), MAX_JOBS_PER_RUN);

    // The deferred candidate is picked up by the next tick.
    let stats = h.tick(NOW).await;
    assert!(stats.error.is_none());
    assert_eq!(stats.terminated_job_ids.len(), 1);

    h.shutdown().await;
}

#[tokio::test]
async fn second_tick_terminates_nothing_new() {
    let mut h = harness();
    h.store.insert_job(hung_import_job());

    let stats = h.tick(NOW).await;
    assert_eq!(stats.terminated_job_ids.len(), 1);

    let stats = h.tick(NOW).await;
    assert!(stats.error.is_none());
    assert!(stats.terminated_job_ids.is_empty());

    h.shutdown().await;
}

#[tokio::test]
async fn completed_stale_job_is_untouched() {
    let mut h = harness();
    let job = ProvisionerJob::builder()
        .job_type(JobType::TemplateVersionImport)
        .created_at_ms(mins_ago(120))
        .updated_at_ms(mins_ago(120))
        .started_at_ms(mins_ago(120))
        .completed_at_ms(mins_ago(119))
        .build();
    h.store.insert_job(job.clone());

    let stats = h.tick(NOW).await;
    assert!(stats.terminated_job_ids.is_empty());
    assert_eq!(h.store.job(job.id).unwrap(), job);

    h.shutdown().await;
}

#[tokio::test]
async fn candidate_query_failure_sets_tick_error_and_next_tick_retries() {
    let mut h = harness();
    h.store.insert_job(hung_import_job());
    h.store.fail_next_candidates("connection reset");

    let stats = h.tick(NOW).await;
    assert!(stats.error.is_some());
    assert!(stats.terminated_job_ids.is_empty());

    let stats = h.tick(NOW).await;
    assert!(stats.error.is_none());
    assert_eq!(stats.terminated_job_ids.len(), 1);

    h.shutdown().await;
}

#[tokio::test]
async fn publish_failure_still_counts_termination() {
    let mut h = harness();
    let job = hung_import_job();
    h.store.insert_job(job.clone());
    h.pubsub.fail_next("broker down");

    let stats = h.tick(NOW).await;
    // The terminal write committed; losing the best-effort notification
    // must not fail the tick.
    assert!(stats.error.is_none());
    assert_eq!(stats.terminated_job_ids, vec![job.id]);
    assert!(h
        .pubsub
        .messages_on(&job_logs_notify_channel(job.id))
        .is_empty());

    h.shutdown().await;
}

async fn assert_log_emission(pre_log_count: usize, pre_log_stage: &str, expect_stage: &str) {
    let mut h = harness();
    let job = hung_import_job();
    h.store.insert_job(job.clone());
    if pre_log_count > 0 {
        h.store.seed_logs(InsertJobLogs {
            job_id: job.id,
            created_at_ms: mins_ago(10),
            level: LogLevel::Info,
            stage: pre_log_stage.to_string(),
            source: LogSource::Provisioner,
            outputs: (0..pre_log_count).map(|i| format!("Output {i}")).collect(),
        });
    }

    let stats = h.tick(NOW).await;
    assert!(stats.error.is_none());
    assert_eq!(stats.terminated_job_ids, vec![job.id]);

    // Exactly one end-of-logs notification on the job's channel.
    let messages = h.pubsub.messages_on(&job_logs_notify_channel(job.id));
    assert_eq!(messages.len(), 1);
    let notify: LogsNotifyMessage = serde_json::from_slice(&messages[0]).unwrap();
    assert!(notify.end_of_logs);
    assert_eq!(notify.created_after, NOW);

    // Everything at or after the watermark is exactly the terminal block.
    let expected = job_log_messages(ReapReason::Hung, HUNG_JOB_DURATION);
    let tail = h.store.job_logs_since(job.id, notify.created_after).unwrap();
    assert_eq!(tail.len(), expected.len());
    for (entry, output) in tail.iter().zip(&expected) {
        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.source, LogSource::ProvisionerDaemon);
        assert_eq!(entry.stage, expect_stage);
        assert_eq!(&entry.output, output);
    }

    let all = h.store.job_logs_since(job.id, 0).unwrap();
    assert_eq!(all.len(), pre_log_count + expected.len());

    h.shutdown().await;
}

#[tokio::test]
async fn pushes_logs_inheriting_last_stage() {
    assert_log_emission(10, "Stage Name", "Stage Name").await;
}

#[tokio::test]
async fn pushes_logs_with_unknown_stage_when_last_stage_empty() {
    assert_log_emission(10, "", "Unknown").await;
}

#[tokio::test]
async fn pushes_logs_with_unknown_stage_when_no_logs_exist() {
    assert_log_emission(0, "", "Unknown").await;
}

#[tokio::test]
async fn close_before_any_tick_shuts_down_cleanly() {
    let h = harness();
    h.shutdown().await;
}

#[tokio::test]
async fn start_is_idempotent() {
    let mut h = harness();
    h.detector.start();
    h.detector.start();

    let stats = h.tick(NOW).await;
    assert!(stats.terminated_job_ids.is_empty());

    h.shutdown().await;
}

#[tokio::test]
async fn closing_tick_source_stops_worker() {
    let store = InMemoryStore::new();
    let pubsub = InMemoryPubsub::new();
    let (tick_tx, tick_rx) = mpsc::channel::<u64>(1);
    let mut detector = Detector::new(store, pubsub, tick_rx);
    detector.start();

    drop(tick_tx);
    detector.wait().await;
}
