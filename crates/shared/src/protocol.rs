use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{GenerationParams, Job, JobId, JobStatus, Theme, Track, TranscriptionId},
    error::ValidationError,
    timestamp,
};

pub const MAX_LENGTH_MS_RANGE: (u32, u32) = (30_000, 360_000);
pub const TEMPERATURE_RANGE: (f64, f64) = (0.1, 2.0);
pub const TOPK_RANGE: (u32, u32) = (1, 500);
pub const CFG_SCALE_RANGE: (f64, f64) = (1.0, 10.0);
pub const TRACK_TITLE_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub lyrics: String,
    /// Comma-separated style tags.
    pub tags: String,
    #[serde(flatten)]
    pub params: GenerationParams,
}

impl GenerationRequest {
    /// Checks the request against the bounds the backend enforces.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.lyrics.trim().is_empty() {
            return Err(ValidationError::EmptyLyrics);
        }
        if crate::domain::split_tags(&self.tags).is_empty() {
            return Err(ValidationError::NoTags);
        }
        validate_params(&self.params)
    }
}

pub fn validate_params(params: &GenerationParams) -> Result<(), ValidationError> {
    check_range(
        "max_length_ms",
        f64::from(params.max_length_ms),
        f64::from(MAX_LENGTH_MS_RANGE.0),
        f64::from(MAX_LENGTH_MS_RANGE.1),
    )?;
    check_range(
        "temperature",
        params.temperature,
        TEMPERATURE_RANGE.0,
        TEMPERATURE_RANGE.1,
    )?;
    check_range(
        "topk",
        f64::from(params.topk),
        f64::from(TOPK_RANGE.0),
        f64::from(TOPK_RANGE.1),
    )?;
    check_range(
        "cfg_scale",
        params.cfg_scale,
        CFG_SCALE_RANGE.0,
        CFG_SCALE_RANGE.1,
    )
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    if value.is_nan() || value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub queue_position: u32,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListJobsQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelJobResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSort {
    /// Newest first.
    #[default]
    CreatedAt,
    /// Alphabetical.
    Title,
    /// Longest first.
    DurationMs,
}

impl TrackSort {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::Title => "title",
            Self::DurationMs => "duration_ms",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListTracksQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<TrackSort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackListResponse {
    pub tracks: Vec<Track>,
    pub total: u64,
}

/// Partial track edit; absent fields are left untouched server-side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_topk: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_cfg_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_length_ms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_save_tracks: Option<bool>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionAccepted {
    pub job_id: TranscriptionId,
}
