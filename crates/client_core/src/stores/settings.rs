use std::sync::Arc;

use shared::{domain::UserSettings, protocol::SettingsUpdate};
use tokio::sync::watch;

use super::Observable;
use crate::{api::BackendApi, error::ClientError};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsState {
    pub settings: Option<UserSettings>,
    pub loading: bool,
}

pub struct SettingsStore {
    state: Observable<SettingsState>,
    api: Arc<dyn BackendApi>,
}

impl SettingsStore {
    pub fn new(api: Arc<dyn BackendApi>) -> Self {
        Self {
            state: Observable::new(SettingsState::default()),
            api,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SettingsState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SettingsState {
        self.state.snapshot()
    }

    pub fn settings(&self) -> Option<UserSettings> {
        self.state.read(|state| state.settings.clone())
    }

    pub async fn fetch_settings(&self) -> Result<UserSettings, ClientError> {
        self.state.update(|state| state.loading = true);
        let result = self.api.settings().await;
        self.state.update(|state| {
            state.loading = false;
            if let Ok(settings) = &result {
                state.settings = Some(settings.clone());
            }
        });
        result
    }

    /// Sends the changed fields; the stored object is replaced by whatever
    /// the backend answers with.
    pub async fn update_settings(&self, update: &SettingsUpdate) -> Result<UserSettings, ClientError> {
        let settings = self.api.update_settings(update).await?;
        self.state
            .update(|state| state.settings = Some(settings.clone()));
        Ok(settings)
    }
}

#[cfg(test)]
#[path = "../tests/settings_tests.rs"]
mod tests;
