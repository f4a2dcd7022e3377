use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timestamp;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(JobId);
id_newtype!(TrackId);
id_newtype!(TranscriptionId);

pub const DEFAULT_MAX_LENGTH_MS: u32 = 240_000;
pub const DEFAULT_TEMPERATURE: f64 = 1.0;
pub const DEFAULT_TOPK: u32 = 50;
pub const DEFAULT_CFG_SCALE: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling parameters for one generation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_length_ms: u32,
    pub temperature: f64,
    pub topk: u32,
    pub cfg_scale: f64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_length_ms: DEFAULT_MAX_LENGTH_MS,
            temperature: DEFAULT_TEMPERATURE,
            topk: DEFAULT_TOPK,
            cfg_scale: DEFAULT_CFG_SCALE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub lyrics: String,
    pub tags: String,
    #[serde(flatten)]
    pub params: GenerationParams,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub output_url: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    /// Fraction in `[0, 1]`; only meaningful while the job is processing.
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u32>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn tag_list(&self) -> Vec<&str> {
        split_tags(&self.tags)
    }

    pub fn is_processing(&self) -> bool {
        self.status == JobStatus::Processing
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub job_id: JobId,
    pub title: String,
    pub tags: String,
    pub lyrics: String,
    pub output_url: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub file_size_bytes: Option<u64>,
    pub favorite: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Track {
    pub fn tag_list(&self) -> Vec<&str> {
        split_tags(&self.tags)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub default_temperature: f64,
    pub default_topk: u32,
    pub default_cfg_scale: f64,
    pub default_max_length_ms: u32,
    #[serde(default)]
    pub theme: Theme,
    pub auto_save_tracks: bool,
}

impl UserSettings {
    pub fn generation_defaults(&self) -> GenerationParams {
        GenerationParams {
            max_length_ms: self.default_max_length_ms,
            temperature: self.default_temperature,
            topk: self.default_topk,
            cfg_scale: self.default_cfg_scale,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuStatus {
    pub name: String,
    pub vram_total_gb: f64,
    pub vram_used_gb: f64,
    pub vram_free_gb: f64,
    pub use_mmgp: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    #[default]
    Unloaded,
    Downloading,
    Loading,
    Ready,
    Generating,
    Error,
}

impl ModelState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Downloading => "downloading",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Generating => "generating",
            Self::Error => "error",
        }
    }

    /// Whether `next` is a move the readiness machine expects from `self`.
    ///
    /// The load chain `unloaded -> downloading -> loading -> ready` may skip
    /// forward (cached weights never download), `ready` and `generating`
    /// alternate, every other state may fail into `error`, and `error` may
    /// restart the load chain. Re-entering the same state is always allowed.
    pub fn can_transition_to(self, next: ModelState) -> bool {
        use ModelState::*;

        if self == next {
            return true;
        }
        match (self, next) {
            (_, Error) => true,
            (Ready, Generating) | (Generating, Ready) => true,
            (Error, Unloaded | Downloading | Loading) => true,
            (from, to) => match (from.load_rank(), to.load_rank()) {
                (Some(a), Some(b)) => b > a,
                _ => false,
            },
        }
    }

    fn load_rank(self) -> Option<u8> {
        match self {
            Self::Unloaded => Some(0),
            Self::Downloading => Some(1),
            Self::Loading => Some(2),
            Self::Ready => Some(3),
            Self::Generating | Self::Error => None,
        }
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub model_state: ModelState,
    pub gpu_available: bool,
}

/// Splits a comma-separated tag string, dropping blanks.
pub fn split_tags(tags: &str) -> Vec<&str> {
    tags.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .collect()
}

pub fn join_tags<S: AsRef<str>>(tags: &[S]) -> String {
    tags.iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
}
