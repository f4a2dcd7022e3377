use std::sync::Arc;

use shared::{
    domain::{join_tags, GenerationParams, JobId, UserSettings},
    error::ValidationError,
    protocol::GenerationRequest,
};
use tokio::sync::watch;
use tracing::info;

use super::Observable;
use crate::{
    api::BackendApi,
    diagnostics::{Diagnostic, DiagnosticSink},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    MaxLengthMs,
    Temperature,
    Topk,
    CfgScale,
}

/// The generation request being composed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudioDraft {
    pub lyrics: String,
    /// Insertion ordered, no duplicates.
    pub tags: Vec<String>,
    pub params: GenerationParams,
    pub submitting: bool,
}

impl StudioDraft {
    pub fn request(&self) -> GenerationRequest {
        GenerationRequest {
            lyrics: self.lyrics.clone(),
            tags: join_tags(&self.tags),
            params: self.params,
        }
    }

    fn is_submittable(&self) -> bool {
        !self.lyrics.trim().is_empty() && !self.tags.is_empty()
    }
}

pub struct StudioStore {
    state: Observable<StudioDraft>,
    api: Arc<dyn BackendApi>,
    sink: Arc<dyn DiagnosticSink>,
}

impl StudioStore {
    pub fn new(api: Arc<dyn BackendApi>, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            state: Observable::new(StudioDraft::default()),
            api,
            sink,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StudioDraft> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> StudioDraft {
        self.state.snapshot()
    }

    pub fn set_lyrics(&self, lyrics: impl Into<String>) {
        let lyrics = lyrics.into();
        self.state.update(|draft| draft.lyrics = lyrics);
    }

    pub fn add_tag(&self, tag: impl Into<String>) {
        let tag = tag.into();
        let tag = tag.trim();
        if tag.is_empty() {
            return;
        }
        self.state.update_if(|draft| {
            if draft.tags.iter().any(|existing| existing == tag) {
                return false;
            }
            draft.tags.push(tag.to_string());
            true
        });
    }

    pub fn remove_tag(&self, tag: &str) {
        self.state.update_if(|draft| {
            let before = draft.tags.len();
            draft.tags.retain(|existing| existing != tag);
            draft.tags.len() != before
        });
    }

    pub fn set_tags<I, S>(&self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut deduped: Vec<String> = Vec::new();
        for tag in tags {
            let tag: String = tag.into();
            let tag = tag.trim();
            if !tag.is_empty() && !deduped.iter().any(|existing| existing == tag) {
                deduped.push(tag.to_string());
            }
        }
        self.state.update(|draft| draft.tags = deduped);
    }

    /// Integer parameters are rounded to the nearest whole value.
    pub fn set_param(&self, param: Param, value: f64) {
        self.state.update(|draft| match param {
            Param::MaxLengthMs => draft.params.max_length_ms = value.round().max(0.0) as u32,
            Param::Temperature => draft.params.temperature = value,
            Param::Topk => draft.params.topk = value.round().max(0.0) as u32,
            Param::CfgScale => draft.params.cfg_scale = value,
        });
    }

    /// Seeds the four parameters from the user's saved defaults.
    pub fn apply_defaults(&self, settings: &UserSettings) {
        let params = settings.generation_defaults();
        self.state.update(|draft| draft.params = params);
    }

    pub fn reset(&self) {
        self.state.update(|draft| *draft = StudioDraft::default());
    }

    /// Full check of the draft against the backend's bounds.
    pub fn validation(&self) -> Result<(), ValidationError> {
        self.state.read(|draft| draft.request().validate())
    }

    /// Submits the draft. Returns `None` without touching the network when
    /// lyrics are blank or no tag is selected, and `None` when the request
    /// fails; the failure goes to the diagnostic sink.
    pub async fn submit(&self) -> Option<JobId> {
        let request = self
            .state
            .read(|draft| draft.is_submittable().then(|| draft.request()))?;

        self.state.update(|draft| draft.submitting = true);
        let result = self.api.submit_generation(&request).await;
        self.state.update(|draft| draft.submitting = false);

        match result {
            Ok(response) => {
                info!(
                    job_id = %response.job_id,
                    queue_position = response.queue_position,
                    "generation submitted"
                );
                Some(response.job_id)
            }
            Err(err) => {
                self.sink.report(Diagnostic::RequestFailed {
                    operation: "submit generation",
                    error: err.to_string(),
                });
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/studio_tests.rs"]
mod tests;
