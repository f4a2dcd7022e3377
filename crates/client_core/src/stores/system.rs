use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use shared::domain::{GpuStatus, HealthStatus, ModelState};
use tokio::sync::watch;

use super::Observable;
use crate::{
    api::BackendApi,
    diagnostics::{Diagnostic, DiagnosticSink},
    error::ClientError,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemState {
    pub connected: bool,
    pub model_state: ModelState,
    pub model_load_progress: f64,
    pub model_load_message: String,
    pub model_error: Option<String>,
    pub gpu: Option<GpuStatus>,
    pub gpu_available: Option<bool>,
}

pub struct SystemStore {
    state: Observable<SystemState>,
    api: Arc<dyn BackendApi>,
    sink: Arc<dyn DiagnosticSink>,
    // Set once a push event has moved the model; health answers stop
    // touching the model state from then on.
    model_from_events: AtomicBool,
}

impl SystemStore {
    pub fn new(api: Arc<dyn BackendApi>, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            state: Observable::new(SystemState::default()),
            api,
            sink,
            model_from_events: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SystemState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SystemState {
        self.state.snapshot()
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.update_if(|state| {
            let changed = state.connected != connected;
            state.connected = connected;
            changed
        });
    }

    /// Moves the readiness machine. The backend is authoritative, so an
    /// unexpected move is applied anyway and only reported.
    pub fn set_model_state(&self, next: ModelState) {
        let from = self.state.read(|state| state.model_state);
        if !from.can_transition_to(next) {
            self.sink
                .report(Diagnostic::UnexpectedModelTransition { from, to: next });
        }
        self.state.update(|state| {
            self.model_from_events.store(true, Ordering::SeqCst);
            state.model_state = next;
            if next != ModelState::Error {
                state.model_error = None;
            }
        });
    }

    pub fn set_model_load_progress(&self, progress: f64, message: Option<&str>) {
        self.state.update(|state| {
            state.model_load_progress = progress;
            state.model_load_message = message.unwrap_or_default().to_string();
        });
    }

    pub fn set_model_error(&self, error: impl Into<String>) {
        self.set_model_state(ModelState::Error);
        let error = error.into();
        self.state.update(|state| state.model_error = Some(error));
    }

    pub fn set_gpu_status(&self, gpu: GpuStatus) {
        self.state.update(|state| state.gpu = Some(gpu));
    }

    /// Pulls health and GPU status. Both requests run concurrently; the
    /// first failure is returned after whatever succeeded has been applied.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let (health, gpu) = tokio::join!(self.api.health(), self.api.gpu_status());
        let health_result = health.map(|health| self.apply_health(health));
        let gpu_result = gpu.map(|gpu| self.set_gpu_status(gpu));
        health_result.and(gpu_result)
    }

    /// Health only seeds the model state; once an event has moved it, a
    /// health answer may be older than what the stream said.
    fn apply_health(&self, health: HealthStatus) {
        self.state.update(|state| {
            if !self.model_from_events.load(Ordering::SeqCst) {
                state.model_state = health.model_state;
            }
            state.gpu_available = Some(health.gpu_available);
        });
    }
}

#[cfg(test)]
#[path = "../tests/system_tests.rs"]
mod tests;
