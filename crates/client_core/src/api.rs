//! REST client for the generation backend.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{GpuStatus, HealthStatus, Job, JobId, Track, TrackId, UserSettings},
    error::{ErrorBody, ValidationError},
    protocol::{
        CancelJobResponse, GenerationRequest, GenerationResponse, JobListResponse, ListJobsQuery,
        ListTracksQuery, SettingsUpdate, TrackListResponse, TrackUpdate, TranscriptionAccepted,
    },
};
use tracing::debug;

use crate::{config::BaseAddress, error::ClientError};

pub const TRANSCRIBE_EXTENSIONS: [&str; 5] = ["mp3", "wav", "flac", "ogg", "m4a"];

/// Audio file queued for transcription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioUpload {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl AudioUpload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ValidationError> {
        let filename = filename.into();
        let extension = Path::new(&filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !TRANSCRIBE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ValidationError::UnsupportedFileType {
                extension,
                allowed: TRANSCRIBE_EXTENSIONS.join(", "),
            });
        }
        let mime_type = mime_guess::from_path(&filename)
            .first()
            .map(|mime| mime.essence_str().to_string());
        Ok(Self {
            filename,
            mime_type,
            bytes,
        })
    }

    pub async fn from_path(path: &Path) -> Result<Self, ClientError> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ClientError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(filename, bytes)?)
    }
}

#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn submit_generation(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ClientError>;
    async fn list_jobs(&self, query: &ListJobsQuery) -> Result<JobListResponse, ClientError>;
    async fn get_job(&self, job_id: &JobId) -> Result<Job, ClientError>;
    async fn cancel_job(&self, job_id: &JobId) -> Result<CancelJobResponse, ClientError>;
    async fn list_tracks(&self, query: &ListTracksQuery)
        -> Result<TrackListResponse, ClientError>;
    async fn get_track(&self, track_id: &TrackId) -> Result<Track, ClientError>;
    async fn update_track(
        &self,
        track_id: &TrackId,
        update: &TrackUpdate,
    ) -> Result<Track, ClientError>;
    async fn delete_track(&self, track_id: &TrackId) -> Result<(), ClientError>;
    async fn transcribe(&self, upload: AudioUpload) -> Result<TranscriptionAccepted, ClientError>;
    async fn health(&self) -> Result<HealthStatus, ClientError>;
    async fn gpu_status(&self) -> Result<GpuStatus, ClientError>;
    async fn settings(&self) -> Result<UserSettings, ClientError>;
    async fn update_settings(&self, update: &SettingsUpdate)
        -> Result<UserSettings, ClientError>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base: BaseAddress,
    request_timeout: Duration,
}

impl ApiClient {
    pub fn new(base: BaseAddress, request_timeout: Duration) -> Self {
        Self::with_http(Client::new(), base, request_timeout)
    }

    pub fn with_http(http: Client, base: BaseAddress, request_timeout: Duration) -> Self {
        Self {
            http,
            base,
            request_timeout,
        }
    }

    pub fn base(&self) -> &BaseAddress {
        &self.base
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Absolute URL for a track's server-relative output reference.
    pub fn audio_url(&self, output_url: &str) -> String {
        self.base.join(output_url)
    }

    fn url(&self, path: &str) -> String {
        self.base.join(path)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        let response = builder.timeout(self.request_timeout).send().await?;
        debug!(
            url = %response.url(),
            status = response.status().as_u16(),
            "backend response"
        );
        check_status(response).await
    }

    async fn request<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = self.send(builder).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Maps a non-success response to `ClientError::Api`, preferring the
/// backend's `detail` message over the reason phrase.
async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let reason = status.canonical_reason().unwrap_or("Request failed");
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.message().unwrap_or_else(|| "Request failed".to_string()),
        Err(_) => reason.to_string(),
    };
    Err(ClientError::api(status.as_u16(), message))
}

#[async_trait]
impl BackendApi for ApiClient {
    async fn submit_generation(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ClientError> {
        self.request(self.http.post(self.url("/api/generate")).json(request))
            .await
    }

    async fn list_jobs(&self, query: &ListJobsQuery) -> Result<JobListResponse, ClientError> {
        self.request(self.http.get(self.url("/api/jobs")).query(query))
            .await
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Job, ClientError> {
        self.request(self.http.get(self.url(&format!("/api/jobs/{job_id}"))))
            .await
    }

    async fn cancel_job(&self, job_id: &JobId) -> Result<CancelJobResponse, ClientError> {
        self.request(self.http.delete(self.url(&format!("/api/jobs/{job_id}"))))
            .await
    }

    async fn list_tracks(
        &self,
        query: &ListTracksQuery,
    ) -> Result<TrackListResponse, ClientError> {
        self.request(self.http.get(self.url("/api/tracks")).query(query))
            .await
    }

    async fn get_track(&self, track_id: &TrackId) -> Result<Track, ClientError> {
        self.request(self.http.get(self.url(&format!("/api/tracks/{track_id}"))))
            .await
    }

    async fn update_track(
        &self,
        track_id: &TrackId,
        update: &TrackUpdate,
    ) -> Result<Track, ClientError> {
        self.request(
            self.http
                .patch(self.url(&format!("/api/tracks/{track_id}")))
                .json(update),
        )
        .await
    }

    async fn delete_track(&self, track_id: &TrackId) -> Result<(), ClientError> {
        self.send(self.http.delete(self.url(&format!("/api/tracks/{track_id}"))))
            .await?;
        Ok(())
    }

    async fn transcribe(&self, upload: AudioUpload) -> Result<TranscriptionAccepted, ClientError> {
        let mut part = multipart::Part::bytes(upload.bytes).file_name(upload.filename);
        if let Some(mime_type) = upload.mime_type.as_deref() {
            part = part.mime_str(mime_type)?;
        }
        let form = multipart::Form::new().part("file", part);
        self.request(self.http.post(self.url("/api/transcribe")).multipart(form))
            .await
    }

    async fn health(&self) -> Result<HealthStatus, ClientError> {
        self.request(self.http.get(self.url("/api/health"))).await
    }

    async fn gpu_status(&self) -> Result<GpuStatus, ClientError> {
        self.request(self.http.get(self.url("/api/gpu"))).await
    }

    async fn settings(&self) -> Result<UserSettings, ClientError> {
        self.request(self.http.get(self.url("/api/settings"))).await
    }

    async fn update_settings(
        &self,
        update: &SettingsUpdate,
    ) -> Result<UserSettings, ClientError> {
        self.request(self.http.put(self.url("/api/settings")).json(update))
            .await
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
