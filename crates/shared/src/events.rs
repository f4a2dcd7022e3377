//! Push events delivered over the `/api/events` stream.
//!
//! Every message is an envelope `{"event": "<kind>", "data": {...}}`. The
//! kind is a closed set; each kind carries its own payload type.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    domain::{GenerationParams, GpuStatus, Job, JobId, JobStatus, TrackId, TranscriptionId},
    timestamp,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Connected,
    Disconnected,
    ModelLoadingProgress,
    ModelReady,
    ModelError,
    JobQueued,
    JobStarted,
    JobProgress,
    JobCompleted,
    JobFailed,
    JobCancelled,
    GpuStatus,
    TranscriptionCompleted,
    TranscriptionFailed,
    Heartbeat,
}

impl EventKind {
    pub const ALL: [EventKind; 15] = [
        Self::Connected,
        Self::Disconnected,
        Self::ModelLoadingProgress,
        Self::ModelReady,
        Self::ModelError,
        Self::JobQueued,
        Self::JobStarted,
        Self::JobProgress,
        Self::JobCompleted,
        Self::JobFailed,
        Self::JobCancelled,
        Self::GpuStatus,
        Self::TranscriptionCompleted,
        Self::TranscriptionFailed,
        Self::Heartbeat,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Connected => "system:connected",
            Self::Disconnected => "system:disconnected",
            Self::ModelLoadingProgress => "model:loading_progress",
            Self::ModelReady => "model:ready",
            Self::ModelError => "model:error",
            Self::JobQueued => "job:queued",
            Self::JobStarted => "job:started",
            Self::JobProgress => "job:progress",
            Self::JobCompleted => "job:completed",
            Self::JobFailed => "job:failed",
            Self::JobCancelled => "job:cancelled",
            Self::GpuStatus => "gpu:status",
            Self::TranscriptionCompleted => "transcription:completed",
            Self::TranscriptionFailed => "transcription:failed",
            Self::Heartbeat => "heartbeat",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.wire_name() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Payload for events that carry no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelLoadingProgress {
    pub progress: f64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelErrorData {
    pub error: String,
}

/// Announcement of a newly queued job. Parameters are optional on the
/// wire and fall back to the generation defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobQueued {
    pub job_id: JobId,
    pub status: JobStatus,
    pub lyrics: String,
    pub tags: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u32>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length_ms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topk: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfg_scale: Option<f64>,
}

impl JobQueued {
    pub fn into_job(self) -> Job {
        let defaults = GenerationParams::default();
        Job {
            id: self.job_id,
            status: self.status,
            lyrics: self.lyrics,
            tags: self.tags,
            params: GenerationParams {
                max_length_ms: self.max_length_ms.unwrap_or(defaults.max_length_ms),
                temperature: self.temperature.unwrap_or(defaults.temperature),
                topk: self.topk.unwrap_or(defaults.topk),
                cfg_scale: self.cfg_scale.unwrap_or(defaults.cfg_scale),
            },
            output_path: None,
            output_url: None,
            duration_ms: None,
            error: None,
            progress: None,
            queue_position: self.queue_position,
            created_at: self.created_at,
            started_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRef {
    pub job_id: JobId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: JobId,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCompleted {
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<TrackId>,
    pub output_url: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailed {
    pub job_id: JobId,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionCompleted {
    pub job_id: TranscriptionId,
    pub lyrics: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionFailed {
    pub job_id: TranscriptionId,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum PushEvent {
    #[serde(rename = "system:connected")]
    Connected(Empty),
    #[serde(rename = "system:disconnected")]
    Disconnected(Empty),
    #[serde(rename = "model:loading_progress")]
    ModelLoadingProgress(ModelLoadingProgress),
    #[serde(rename = "model:ready")]
    ModelReady(Empty),
    #[serde(rename = "model:error")]
    ModelError(ModelErrorData),
    #[serde(rename = "job:queued")]
    JobQueued(JobQueued),
    #[serde(rename = "job:started")]
    JobStarted(JobRef),
    #[serde(rename = "job:progress")]
    JobProgress(JobProgress),
    #[serde(rename = "job:completed")]
    JobCompleted(JobCompleted),
    #[serde(rename = "job:failed")]
    JobFailed(JobFailed),
    #[serde(rename = "job:cancelled")]
    JobCancelled(JobRef),
    #[serde(rename = "gpu:status")]
    GpuStatus(GpuStatus),
    #[serde(rename = "transcription:completed")]
    TranscriptionCompleted(TranscriptionCompleted),
    #[serde(rename = "transcription:failed")]
    TranscriptionFailed(TranscriptionFailed),
    #[serde(rename = "heartbeat")]
    Heartbeat(Empty),
}

impl PushEvent {
    pub fn connected() -> Self {
        Self::Connected(Empty {})
    }

    pub fn disconnected() -> Self {
        Self::Disconnected(Empty {})
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected(_) => EventKind::Connected,
            Self::Disconnected(_) => EventKind::Disconnected,
            Self::ModelLoadingProgress(_) => EventKind::ModelLoadingProgress,
            Self::ModelReady(_) => EventKind::ModelReady,
            Self::ModelError(_) => EventKind::ModelError,
            Self::JobQueued(_) => EventKind::JobQueued,
            Self::JobStarted(_) => EventKind::JobStarted,
            Self::JobProgress(_) => EventKind::JobProgress,
            Self::JobCompleted(_) => EventKind::JobCompleted,
            Self::JobFailed(_) => EventKind::JobFailed,
            Self::JobCancelled(_) => EventKind::JobCancelled,
            Self::GpuStatus(_) => EventKind::GpuStatus,
            Self::TranscriptionCompleted(_) => EventKind::TranscriptionCompleted,
            Self::TranscriptionFailed(_) => EventKind::TranscriptionFailed,
            Self::Heartbeat(_) => EventKind::Heartbeat,
        }
    }

    fn from_payload(
        kind: EventKind,
        data: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        use serde_json::from_value;

        Ok(match kind {
            EventKind::Connected => Self::Connected(from_value(data)?),
            EventKind::Disconnected => Self::Disconnected(from_value(data)?),
            EventKind::ModelLoadingProgress => Self::ModelLoadingProgress(from_value(data)?),
            EventKind::ModelReady => Self::ModelReady(from_value(data)?),
            EventKind::ModelError => Self::ModelError(from_value(data)?),
            EventKind::JobQueued => Self::JobQueued(from_value(data)?),
            EventKind::JobStarted => Self::JobStarted(from_value(data)?),
            EventKind::JobProgress => Self::JobProgress(from_value(data)?),
            EventKind::JobCompleted => Self::JobCompleted(from_value(data)?),
            EventKind::JobFailed => Self::JobFailed(from_value(data)?),
            EventKind::JobCancelled => Self::JobCancelled(from_value(data)?),
            EventKind::GpuStatus => Self::GpuStatus(from_value(data)?),
            EventKind::TranscriptionCompleted => Self::TranscriptionCompleted(from_value(data)?),
            EventKind::TranscriptionFailed => Self::TranscriptionFailed(from_value(data)?),
            EventKind::Heartbeat => Self::Heartbeat(from_value(data)?),
        })
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("envelope is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("unrecognised event {0:?}")]
    UnknownEvent(String),
    #[error("invalid payload for {kind}: {source}")]
    InvalidPayload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct RawEnvelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Parses one push envelope into a typed event.
pub fn decode_envelope(raw: &str) -> Result<PushEvent, EnvelopeError> {
    let envelope: RawEnvelope = serde_json::from_str(raw).map_err(EnvelopeError::InvalidJson)?;
    let kind = EventKind::from_wire_name(&envelope.event)
        .ok_or_else(|| EnvelopeError::UnknownEvent(envelope.event.clone()))?;
    let data = match envelope.data {
        serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
        data => data,
    };
    PushEvent::from_payload(kind, data)
        .map_err(|source| EnvelopeError::InvalidPayload { kind, source })
}

pub fn encode_envelope(event: &PushEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}
