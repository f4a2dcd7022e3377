use serde_json::json;
use shared::{
    domain::{JobId, TranscriptionId},
    events::decode_envelope,
};

use super::*;
use crate::{
    config::ClientConfig,
    diagnostics::RecordingSink,
    stores::TranscriptionStatus,
    test_support::{job, FakeBackend},
    AudioUpload,
};

struct Harness {
    dispatcher: Dispatcher,
    stores: Stores,
    sink: Arc<RecordingSink>,
    subscriptions: Vec<Subscription>,
}

fn harness() -> Harness {
    let sink = Arc::new(RecordingSink::new());
    let dispatcher = Dispatcher::new(sink.clone());
    let stores = Stores::new(
        Arc::new(FakeBackend::new()),
        sink.clone(),
        &ClientConfig::default(),
    );
    let subscriptions = bind_stores(&dispatcher, &stores);
    Harness {
        dispatcher,
        stores,
        sink,
        subscriptions,
    }
}

impl Harness {
    fn push(&self, envelope: serde_json::Value) {
        let event = decode_envelope(&envelope.to_string()).expect("valid envelope");
        let outcome = self.dispatcher.dispatch(&event);
        assert_eq!(outcome.failed, 0);
    }
}

#[test]
fn every_event_except_heartbeat_is_bound() {
    let h = harness();
    assert_eq!(h.subscriptions.len(), EventKind::ALL.len() - 1);
    for kind in EventKind::ALL {
        let expected = usize::from(kind != EventKind::Heartbeat);
        assert_eq!(h.dispatcher.handler_count(kind), expected, "{kind}");
    }
}

#[test]
fn connection_events_drive_the_connected_flag() {
    let h = harness();
    h.dispatcher.dispatch(&PushEvent::connected());
    assert!(h.stores.system.snapshot().connected);
    h.dispatcher.dispatch(&PushEvent::disconnected());
    assert!(!h.stores.system.snapshot().connected);
}

#[test]
fn model_events_walk_the_readiness_machine() {
    let h = harness();
    h.push(json!({"event": "model:loading_progress", "data": {"progress": 0.3, "message": "Loading HeartMuLa"}}));
    let state = h.stores.system.snapshot();
    assert_eq!(state.model_state, ModelState::Loading);
    assert_eq!(state.model_load_progress, 0.3);
    assert_eq!(state.model_load_message, "Loading HeartMuLa");

    h.push(json!({"event": "model:ready", "data": {"state": "ready"}}));
    let state = h.stores.system.snapshot();
    assert_eq!(state.model_state, ModelState::Ready);
    assert_eq!(state.model_load_progress, 1.0);

    h.push(json!({"event": "model:error", "data": {"error": "CUDA device lost"}}));
    let state = h.stores.system.snapshot();
    assert_eq!(state.model_state, ModelState::Error);
    assert_eq!(state.model_error.as_deref(), Some("CUDA device lost"));
    assert!(h.sink.is_empty());
}

#[test]
fn job_lifecycle_events_update_the_queue() {
    let h = harness();
    h.push(json!({"event": "job:queued", "data": {
        "job_id": "j1", "status": "pending", "lyrics": "[verse]", "tags": "pop",
        "queue_position": 1, "created_at": "2026-02-14T12:00:00"
    }}));
    h.push(json!({"event": "job:started", "data": {"job_id": "j1"}}));
    let state = h.stores.queue.snapshot();
    assert_eq!(state.active_job_id, Some(JobId::from("j1")));
    assert_eq!(state.jobs[0].status, JobStatus::Processing);

    h.push(json!({"event": "job:progress", "data": {"job_id": "j1", "step": 21, "total_steps": 50, "progress": 0.42}}));
    assert_eq!(h.stores.queue.snapshot().active_progress, 0.42);

    h.push(json!({"event": "job:completed", "data": {
        "job_id": "j1", "track_id": "t1", "output_url": "/outputs/j1.mp3", "duration_ms": 9000
    }}));
    let state = h.stores.queue.snapshot();
    assert_eq!(state.active_job_id, None);
    assert_eq!(state.jobs[0].status, JobStatus::Completed);
    assert_eq!(state.jobs[0].output_url.as_deref(), Some("/outputs/j1.mp3"));
}

#[test]
fn failed_and_cancelled_jobs() {
    let h = harness();
    h.stores.queue.add_job(job("a", JobStatus::Processing));
    h.stores.queue.add_job(job("b", JobStatus::Pending));

    h.push(json!({"event": "job:failed", "data": {"job_id": "a", "error": "out of memory"}}));
    h.push(json!({"event": "job:cancelled", "data": {"job_id": "b"}}));

    let state = h.stores.queue.snapshot();
    assert_eq!(state.jobs.len(), 1);
    assert_eq!(state.jobs[0].status, JobStatus::Failed);
    assert_eq!(state.jobs[0].error.as_deref(), Some("out of memory"));
}

#[test]
fn gpu_status_replaces_the_snapshot() {
    let h = harness();
    h.push(json!({"event": "gpu:status", "data": {
        "name": "RTX 3090", "vram_total_gb": 24.0, "vram_used_gb": 12.5,
        "vram_free_gb": 11.5, "use_mmgp": false
    }}));
    let gpu = h.stores.system.snapshot().gpu.expect("gpu");
    assert_eq!(gpu.name, "RTX 3090");
    assert_eq!(gpu.vram_used_gb, 12.5);
}

#[tokio::test]
async fn transcription_results_reach_the_transcription_store() {
    let h = harness();
    let upload = AudioUpload::new("hum.mp3", vec![1]).expect("upload");
    h.stores.transcription.upload(upload).await.expect("upload");

    h.push(json!({"event": "transcription:completed", "data": {"job_id": "tx-1", "lyrics": "la la"}}));

    assert_eq!(
        h.stores.transcription.snapshot().status,
        TranscriptionStatus::Completed {
            job_id: TranscriptionId::from("tx-1"),
            lyrics: "la la".into(),
        }
    );
}

#[test]
fn dropping_the_subscriptions_detaches_the_stores() {
    let Harness {
        dispatcher,
        stores,
        subscriptions,
        ..
    } = harness();
    drop(subscriptions);

    for kind in EventKind::ALL {
        assert_eq!(dispatcher.handler_count(kind), 0);
    }
    dispatcher.dispatch(&PushEvent::connected());
    assert!(!stores.system.snapshot().connected);
}
