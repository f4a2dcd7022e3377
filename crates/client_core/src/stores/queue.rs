use std::sync::Arc;

use shared::{
    domain::{Job, JobId, JobStatus},
    protocol::ListJobsQuery,
};
use tokio::sync::watch;
use tracing::debug;

use super::Observable;
use crate::{api::BackendApi, error::ClientError};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueState {
    /// Newest first.
    pub jobs: Vec<Job>,
    /// The job driving the primary progress indicator.
    pub active_job_id: Option<JobId>,
    pub active_progress: f64,
}

impl QueueState {
    pub fn job(&self, job_id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| &job.id == job_id)
    }

    pub fn active_job(&self) -> Option<&Job> {
        self.active_job_id.as_ref().and_then(|id| self.job(id))
    }
}

/// Partial job update; `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub output_url: Option<String>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn completed(output_url: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            output_url: Some(output_url.into()),
            duration_ms: Some(duration_ms),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    fn apply(self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
            if status != JobStatus::Processing {
                job.progress = None;
            }
        }
        if let Some(output_url) = self.output_url {
            job.output_url = Some(output_url);
        }
        if let Some(duration_ms) = self.duration_ms {
            job.duration_ms = Some(duration_ms);
        }
        if let Some(error) = self.error {
            job.error = Some(error);
        }
    }
}

pub struct QueueStore {
    state: Observable<QueueState>,
    api: Arc<dyn BackendApi>,
    job_list_limit: u32,
}

impl QueueStore {
    pub fn new(api: Arc<dyn BackendApi>, job_list_limit: u32) -> Self {
        Self {
            state: Observable::new(QueueState::default()),
            api,
            job_list_limit,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<QueueState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> QueueState {
        self.state.snapshot()
    }

    pub fn job(&self, job_id: &JobId) -> Option<Job> {
        self.state.read(|state| state.job(job_id).cloned())
    }

    /// Inserts the job at the front, replacing any earlier copy.
    pub fn add_job(&self, job: Job) {
        self.state.update(|state| {
            state.jobs.retain(|existing| existing.id != job.id);
            state.jobs.insert(0, job);
        });
    }

    pub fn update_job_status(&self, job_id: &JobId, update: JobUpdate) {
        let status = update.status;
        self.state.update(|state| {
            if let Some(job) = state.jobs.iter_mut().find(|job| &job.id == job_id) {
                update.apply(job);
            }
            match status {
                Some(JobStatus::Processing) => {
                    if state.active_job_id.as_ref() != Some(job_id) {
                        state.active_job_id = Some(job_id.clone());
                        state.active_progress = 0.0;
                    }
                }
                Some(_) if state.active_job_id.as_ref() == Some(job_id) => {
                    state.active_job_id = None;
                    state.active_progress = 0.0;
                }
                _ => {}
            }
        });
    }

    pub fn update_job_progress(&self, job_id: &JobId, progress: f64) {
        self.state.update(|state| {
            state.active_job_id = Some(job_id.clone());
            state.active_progress = progress;
            if let Some(job) = state.jobs.iter_mut().find(|job| &job.id == job_id) {
                job.progress = Some(progress);
            }
        });
    }

    pub fn remove_job(&self, job_id: &JobId) {
        self.state.update(|state| {
            state.jobs.retain(|job| &job.id != job_id);
            if state.active_job_id.as_ref() == Some(job_id) {
                state.active_job_id = None;
                state.active_progress = 0.0;
            }
        });
    }

    /// Asks the backend to cancel; the job only leaves the queue once the
    /// backend confirms. Returns whether it did.
    pub async fn cancel_job(&self, job_id: &JobId) -> Result<bool, ClientError> {
        let response = self.api.cancel_job(job_id).await?;
        debug!(job_id = %job_id, success = response.success, message = %response.message, "cancel job");
        if response.success {
            self.remove_job(job_id);
        }
        Ok(response.success)
    }

    /// Merges the most recent jobs on the backend into the queue by id.
    /// A local copy that is further along than the backend's (an event
    /// arrived while the request was in flight) is kept, as are jobs the
    /// snapshot does not mention.
    pub async fn fetch_jobs(&self) -> Result<(), ClientError> {
        let response = self
            .api
            .list_jobs(&ListJobsQuery {
                limit: Some(self.job_list_limit),
                ..ListJobsQuery::default()
            })
            .await?;
        self.state.update(|state| {
            let mut merged = response.jobs;
            for local in state.jobs.drain(..) {
                match merged.iter_mut().find(|job| job.id == local.id) {
                    Some(remote) if progress_rank(local.status) > progress_rank(remote.status) => {
                        *remote = local;
                    }
                    Some(_) => {}
                    None => merged.push(local),
                }
            }
            merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            state.jobs = merged;

            let still_active = state
                .active_job()
                .is_some_and(Job::is_processing);
            if !still_active {
                let active = state.jobs.iter().find(|job| job.is_processing());
                state.active_job_id = active.map(|job| job.id.clone());
                state.active_progress = active.and_then(|job| job.progress).unwrap_or(0.0);
            }
        });
        Ok(())
    }
}

fn progress_rank(status: JobStatus) -> u8 {
    match status {
        JobStatus::Pending => 0,
        JobStatus::Processing => 1,
        JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 2,
    }
}

#[cfg(test)]
#[path = "../tests/queue_tests.rs"]
mod tests;
