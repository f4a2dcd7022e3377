use std::sync::Arc;

use parking_lot::Mutex;
use shared::{
    domain::TranscriptionId,
    events::{TranscriptionCompleted, TranscriptionFailed},
};
use tokio::sync::watch;
use tracing::{debug, info};

use super::Observable;
use crate::{
    api::{AudioUpload, BackendApi},
    error::ClientError,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub enum TranscriptionStatus {
    #[default]
    Idle,
    Uploading,
    /// Accepted by the backend; waiting for the result event.
    Pending(TranscriptionId),
    Completed {
        job_id: TranscriptionId,
        lyrics: String,
    },
    Failed {
        job_id: Option<TranscriptionId>,
        error: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptionState {
    pub filename: Option<String>,
    pub status: TranscriptionStatus,
}

impl TranscriptionState {
    pub fn pending_job(&self) -> Option<&TranscriptionId> {
        match &self.status {
            TranscriptionStatus::Pending(job_id) => Some(job_id),
            _ => None,
        }
    }
}

const MAX_EARLY_RESULTS: usize = 8;

/// Tracks the single lyrics transcription the user is waiting on.
pub struct TranscriptionStore {
    state: Observable<TranscriptionState>,
    api: Arc<dyn BackendApi>,
    // Results that arrived while the upload response was still in flight.
    early: Mutex<Vec<(TranscriptionId, TranscriptionStatus)>>,
}

impl TranscriptionStore {
    pub fn new(api: Arc<dyn BackendApi>) -> Self {
        Self {
            state: Observable::new(TranscriptionState::default()),
            api,
            early: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TranscriptionState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> TranscriptionState {
        self.state.snapshot()
    }

    pub async fn upload(&self, upload: AudioUpload) -> Result<TranscriptionId, ClientError> {
        let filename = upload.filename.clone();
        self.state.update(|state| {
            state.filename = Some(filename);
            state.status = TranscriptionStatus::Uploading;
        });

        match self.api.transcribe(upload).await {
            Ok(accepted) => {
                info!(job_id = %accepted.job_id, "transcription accepted");
                let mut early = self.early.lock();
                let status = take_early(&mut early, &accepted.job_id)
                    .unwrap_or_else(|| TranscriptionStatus::Pending(accepted.job_id.clone()));
                self.state.update(|state| state.status = status);
                Ok(accepted.job_id)
            }
            Err(err) => {
                let error = err.to_string();
                self.state.update(|state| {
                    state.status = TranscriptionStatus::Failed {
                        job_id: None,
                        error,
                    }
                });
                Err(err)
            }
        }
    }

    pub fn complete(&self, event: &TranscriptionCompleted) {
        self.settle(&event.job_id, || TranscriptionStatus::Completed {
            job_id: event.job_id.clone(),
            lyrics: event.lyrics.clone(),
        });
    }

    pub fn fail(&self, event: &TranscriptionFailed) {
        self.settle(&event.job_id, || TranscriptionStatus::Failed {
            job_id: Some(event.job_id.clone()),
            error: event.error.clone(),
        });
    }

    pub fn clear(&self) {
        self.early.lock().clear();
        self.state
            .update(|state| *state = TranscriptionState::default());
    }

    // Results for other uploads (another client, an abandoned attempt) are
    // ignored.
    fn settle(&self, job_id: &TranscriptionId, status: impl FnOnce() -> TranscriptionStatus) {
        let mut early = self.early.lock();
        let mut status = Some(status);
        let applied = self.state.update_if(|state| {
            if state.pending_job() != Some(job_id) {
                return false;
            }
            if let Some(status) = status.take() {
                state.status = status();
            }
            true
        });
        if applied {
            return;
        }
        let uploading = self
            .state
            .read(|state| state.status == TranscriptionStatus::Uploading);
        match status {
            Some(status) if uploading => {
                if early.len() == MAX_EARLY_RESULTS {
                    early.remove(0);
                }
                early.push((job_id.clone(), status()));
            }
            _ => debug!(job_id = %job_id, "ignoring result for another transcription"),
        }
    }
}

fn take_early(
    early: &mut Vec<(TranscriptionId, TranscriptionStatus)>,
    job_id: &TranscriptionId,
) -> Option<TranscriptionStatus> {
    let index = early.iter().position(|(id, _)| id == job_id)?;
    Some(early.remove(index).1)
}

#[cfg(test)]
#[path = "../tests/transcription_tests.rs"]
mod tests;
