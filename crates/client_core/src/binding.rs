//! Wires push events into the stores.

use std::sync::Arc;

use shared::{
    domain::{JobStatus, ModelState},
    events::{EventKind, PushEvent},
};

use crate::{
    dispatcher::{Dispatcher, Subscription},
    stores::{JobUpdate, Stores},
};

/// Subscribes every store to the events it mirrors. Dropping the returned
/// subscriptions detaches the stores again.
pub fn bind_stores(dispatcher: &Dispatcher, stores: &Stores) -> Vec<Subscription> {
    let mut subscriptions = Vec::with_capacity(EventKind::ALL.len());
    let mut on = |kind: EventKind, handler: Box<dyn Fn(&PushEvent) + Send + Sync>| {
        subscriptions.push(dispatcher.subscribe(kind, move |event| {
            handler(event);
            Ok(())
        }));
    };

    let system = Arc::clone(&stores.system);
    on(
        EventKind::Connected,
        Box::new(move |_| system.set_connected(true)),
    );
    let system = Arc::clone(&stores.system);
    on(
        EventKind::Disconnected,
        Box::new(move |_| system.set_connected(false)),
    );

    let system = Arc::clone(&stores.system);
    on(
        EventKind::ModelLoadingProgress,
        Box::new(move |event| {
            if let PushEvent::ModelLoadingProgress(data) = event {
                system.set_model_state(ModelState::Loading);
                system.set_model_load_progress(data.progress, Some(&data.message));
            }
        }),
    );
    let system = Arc::clone(&stores.system);
    on(
        EventKind::ModelReady,
        Box::new(move |_| {
            system.set_model_state(ModelState::Ready);
            system.set_model_load_progress(1.0, None);
        }),
    );
    let system = Arc::clone(&stores.system);
    on(
        EventKind::ModelError,
        Box::new(move |event| {
            if let PushEvent::ModelError(data) = event {
                system.set_model_error(data.error.clone());
            }
        }),
    );
    let system = Arc::clone(&stores.system);
    on(
        EventKind::GpuStatus,
        Box::new(move |event| {
            if let PushEvent::GpuStatus(gpu) = event {
                system.set_gpu_status(gpu.clone());
            }
        }),
    );

    let queue = Arc::clone(&stores.queue);
    on(
        EventKind::JobQueued,
        Box::new(move |event| {
            if let PushEvent::JobQueued(data) = event {
                queue.add_job(data.clone().into_job());
            }
        }),
    );
    let queue = Arc::clone(&stores.queue);
    on(
        EventKind::JobStarted,
        Box::new(move |event| {
            if let PushEvent::JobStarted(data) = event {
                queue.update_job_status(&data.job_id, JobUpdate::status(JobStatus::Processing));
            }
        }),
    );
    let queue = Arc::clone(&stores.queue);
    on(
        EventKind::JobProgress,
        Box::new(move |event| {
            if let PushEvent::JobProgress(data) = event {
                queue.update_job_progress(&data.job_id, data.progress);
            }
        }),
    );
    let queue = Arc::clone(&stores.queue);
    on(
        EventKind::JobCompleted,
        Box::new(move |event| {
            if let PushEvent::JobCompleted(data) = event {
                queue.update_job_status(
                    &data.job_id,
                    JobUpdate::completed(data.output_url.clone(), data.duration_ms),
                );
            }
        }),
    );
    let queue = Arc::clone(&stores.queue);
    on(
        EventKind::JobFailed,
        Box::new(move |event| {
            if let PushEvent::JobFailed(data) = event {
                queue.update_job_status(&data.job_id, JobUpdate::failed(data.error.clone()));
            }
        }),
    );
    let queue = Arc::clone(&stores.queue);
    on(
        EventKind::JobCancelled,
        Box::new(move |event| {
            if let PushEvent::JobCancelled(data) = event {
                queue.remove_job(&data.job_id);
            }
        }),
    );

    let transcription = Arc::clone(&stores.transcription);
    on(
        EventKind::TranscriptionCompleted,
        Box::new(move |event| {
            if let PushEvent::TranscriptionCompleted(data) = event {
                transcription.complete(data);
            }
        }),
    );
    let transcription = Arc::clone(&stores.transcription);
    on(
        EventKind::TranscriptionFailed,
        Box::new(move |event| {
            if let PushEvent::TranscriptionFailed(data) = event {
                transcription.fail(data);
            }
        }),
    );

    subscriptions
}

#[cfg(test)]
#[path = "tests/binding_tests.rs"]
mod tests;
