use std::{
    collections::{HashSet, VecDeque},
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use shared::{
    domain::{
        GenerationParams, GpuStatus, HealthStatus, Job, JobId, JobStatus, ModelState, Theme,
        Track, TrackId, TranscriptionId, UserSettings,
    },
    protocol::{
        CancelJobResponse, GenerationRequest, GenerationResponse, JobListResponse, ListJobsQuery,
        ListTracksQuery, SettingsUpdate, TrackListResponse, TrackUpdate, TranscriptionAccepted,
    },
};
use tokio::net::TcpListener;

use crate::{
    api::{AudioUpload, BackendApi},
    error::ClientError,
};

pub async fn spawn_server(app: Router) -> Result<String> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 14, 12, minute, 0)
        .single()
        .expect("valid timestamp")
}

pub fn job(id: &str, status: JobStatus) -> Job {
    Job {
        id: JobId::from(id),
        status,
        lyrics: "[verse]\nneon rain on the harbour".into(),
        tags: "synthwave,female vocal".into(),
        params: GenerationParams::default(),
        output_path: None,
        output_url: None,
        duration_ms: None,
        error: None,
        progress: None,
        queue_position: None,
        created_at: at(0),
        started_at: None,
        completed_at: None,
    }
}

pub fn track(id: &str, title: &str) -> Track {
    Track {
        id: TrackId::from(id),
        job_id: JobId::new(format!("job-{id}")),
        title: title.into(),
        tags: "lofi,chill".into(),
        lyrics: "[chorus]\nslow tide".into(),
        output_url: format!("/outputs/2026-02-14/{id}.mp3"),
        duration_ms: 180_000,
        file_size_bytes: Some(4_200_000),
        favorite: false,
        created_at: at(1),
        updated_at: at(1),
    }
}

pub fn user_settings() -> UserSettings {
    UserSettings {
        default_temperature: 0.9,
        default_topk: 40,
        default_cfg_scale: 2.0,
        default_max_length_ms: 120_000,
        theme: Theme::Dark,
        auto_save_tracks: true,
    }
}

/// In-memory backend. Operations named in `failing` answer with HTTP 500.
#[derive(Default)]
pub struct FakeBackend {
    pub calls: Mutex<Vec<&'static str>>,
    pub failing: Mutex<HashSet<&'static str>>,
    pub jobs: Mutex<Vec<Job>>,
    pub tracks: Mutex<Vec<Track>>,
    pub settings: Mutex<Option<UserSettings>>,
    pub health: Mutex<Option<HealthStatus>>,
    pub gpu: Mutex<Option<GpuStatus>>,
    pub refuse_cancel: Mutex<bool>,
    pub submitted: Mutex<Vec<GenerationRequest>>,
    pub track_queries: Mutex<Vec<ListTracksQuery>>,
    pub uploads: Mutex<Vec<AudioUpload>>,
    /// Delays applied to successive `list_tracks` calls.
    pub track_delays: Mutex<VecDeque<Duration>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracks(tracks: Vec<Track>) -> Self {
        let backend = Self::default();
        *backend.tracks.lock() = tracks;
        backend
    }

    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.failing.lock().remove(operation);
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| **call == operation)
            .count()
    }

    fn call(&self, operation: &'static str) -> Result<(), ClientError> {
        self.calls.lock().push(operation);
        if self.failing.lock().contains(operation) {
            return Err(ClientError::api(500, "backend exploded"));
        }
        Ok(())
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn submit_generation(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ClientError> {
        self.call("submit_generation")?;
        self.submitted.lock().push(request.clone());
        Ok(GenerationResponse {
            job_id: JobId::from("job-new"),
            status: JobStatus::Pending,
            queue_position: 1,
            created_at: at(5),
        })
    }

    async fn list_jobs(&self, query: &ListJobsQuery) -> Result<JobListResponse, ClientError> {
        self.call("list_jobs")?;
        let jobs = self.jobs.lock().clone();
        let total = jobs.len() as u64;
        let limit = query.limit.unwrap_or(u32::MAX) as usize;
        Ok(JobListResponse {
            jobs: jobs.into_iter().take(limit).collect(),
            total,
        })
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Job, ClientError> {
        self.call("get_job")?;
        self.jobs
            .lock()
            .iter()
            .find(|job| &job.id == job_id)
            .cloned()
            .ok_or_else(|| ClientError::api(404, "Job not found"))
    }

    async fn cancel_job(&self, _job_id: &JobId) -> Result<CancelJobResponse, ClientError> {
        self.call("cancel_job")?;
        let refused = *self.refuse_cancel.lock();
        Ok(CancelJobResponse {
            success: !refused,
            message: if refused {
                "Job is already finished".into()
            } else {
                "Job cancelled".into()
            },
        })
    }

    async fn list_tracks(
        &self,
        query: &ListTracksQuery,
    ) -> Result<TrackListResponse, ClientError> {
        let delay = self.track_delays.lock().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.call("list_tracks")?;
        self.track_queries.lock().push(query.clone());

        let matching: Vec<Track> = self
            .tracks
            .lock()
            .iter()
            .filter(|track| query.favorite != Some(true) || track.favorite)
            .filter(|track| {
                query
                    .search
                    .as_deref()
                    .map_or(true, |search| track.title.contains(search))
            })
            .cloned()
            .collect();
        let total = matching.len() as u64;
        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.unwrap_or(20) as usize;
        Ok(TrackListResponse {
            tracks: matching.into_iter().skip(offset).take(limit).collect(),
            total,
        })
    }

    async fn get_track(&self, track_id: &TrackId) -> Result<Track, ClientError> {
        self.call("get_track")?;
        self.tracks
            .lock()
            .iter()
            .find(|track| &track.id == track_id)
            .cloned()
            .ok_or_else(|| ClientError::api(404, "Track not found"))
    }

    async fn update_track(
        &self,
        track_id: &TrackId,
        update: &TrackUpdate,
    ) -> Result<Track, ClientError> {
        self.call("update_track")?;
        let mut tracks = self.tracks.lock();
        let track = tracks
            .iter_mut()
            .find(|track| &track.id == track_id)
            .ok_or_else(|| ClientError::api(404, "Track not found"))?;
        if let Some(title) = &update.title {
            track.title = title.clone();
        }
        if let Some(tags) = &update.tags {
            track.tags = tags.clone();
        }
        if let Some(favorite) = update.favorite {
            track.favorite = favorite;
        }
        track.updated_at = at(30);
        Ok(track.clone())
    }

    async fn delete_track(&self, track_id: &TrackId) -> Result<(), ClientError> {
        self.call("delete_track")?;
        let mut tracks = self.tracks.lock();
        let before = tracks.len();
        tracks.retain(|track| &track.id != track_id);
        if tracks.len() == before {
            return Err(ClientError::api(404, "Track not found"));
        }
        Ok(())
    }

    async fn transcribe(&self, upload: AudioUpload) -> Result<TranscriptionAccepted, ClientError> {
        self.call("transcribe")?;
        self.uploads.lock().push(upload);
        Ok(TranscriptionAccepted {
            job_id: TranscriptionId::from("tx-1"),
        })
    }

    async fn health(&self) -> Result<HealthStatus, ClientError> {
        self.call("health")?;
        Ok(self.health.lock().clone().unwrap_or(HealthStatus {
            status: "ok".into(),
            model_state: ModelState::Ready,
            gpu_available: true,
        }))
    }

    async fn gpu_status(&self) -> Result<GpuStatus, ClientError> {
        self.call("gpu_status")?;
        Ok(self.gpu.lock().clone().unwrap_or_default())
    }

    async fn settings(&self) -> Result<UserSettings, ClientError> {
        self.call("settings")?;
        Ok(self.settings.lock().clone().unwrap_or_else(user_settings))
    }

    async fn update_settings(
        &self,
        update: &SettingsUpdate,
    ) -> Result<UserSettings, ClientError> {
        self.call("update_settings")?;
        let mut stored = self.settings.lock();
        let settings = stored.get_or_insert_with(user_settings);
        if let Some(value) = update.default_temperature {
            settings.default_temperature = value;
        }
        if let Some(value) = update.default_topk {
            settings.default_topk = value;
        }
        if let Some(value) = update.default_cfg_scale {
            settings.default_cfg_scale = value;
        }
        if let Some(value) = update.default_max_length_ms {
            settings.default_max_length_ms = value;
        }
        if let Some(theme) = update.theme {
            settings.theme = theme;
        }
        if let Some(value) = update.auto_save_tracks {
            settings.auto_save_tracks = value;
        }
        Ok(settings.clone())
    }
}
