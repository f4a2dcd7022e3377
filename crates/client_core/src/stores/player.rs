use shared::domain::Track;
use tokio::sync::watch;

use super::Observable;
use crate::config::BaseAddress;

pub const DEFAULT_VOLUME: f64 = 0.8;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub current_track: Option<Track>,
    pub playing: bool,
    pub current_time_ms: u64,
    pub duration_ms: u64,
    /// Always within `[0, 1]`.
    pub volume: f64,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            current_track: None,
            playing: false,
            current_time_ms: 0,
            duration_ms: 0,
            volume: DEFAULT_VOLUME,
        }
    }
}

impl PlayerState {
    /// Playable address of the loaded track.
    pub fn audio_url(&self, base: &BaseAddress) -> Option<String> {
        self.current_track
            .as_ref()
            .map(|track| base.join(&track.output_url))
    }
}

/// Now-playing slot. Decoding and output belong to whatever renders it.
pub struct PlayerStore {
    state: Observable<PlayerState>,
}

impl Default for PlayerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerStore {
    pub fn new() -> Self {
        Self {
            state: Observable::new(PlayerState::default()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> PlayerState {
        self.state.snapshot()
    }

    pub fn play(&self, track: Track) {
        self.state.update(|state| {
            state.current_track = Some(track);
            state.playing = true;
            state.current_time_ms = 0;
        });
    }

    /// Loads without starting playback.
    pub fn set_track(&self, track: Option<Track>) {
        self.state.update(|state| {
            state.current_track = track;
            state.playing = false;
            state.current_time_ms = 0;
        });
    }

    pub fn pause(&self) {
        self.set_playing(false);
    }

    pub fn resume(&self) {
        self.set_playing(true);
    }

    pub fn toggle_play(&self) {
        self.state.update(|state| state.playing = !state.playing);
    }

    /// End of playback.
    pub fn finish(&self) {
        self.pause();
    }

    pub fn seek(&self, time_ms: u64) {
        self.state.update(|state| {
            state.current_time_ms = if state.duration_ms > 0 {
                time_ms.min(state.duration_ms)
            } else {
                time_ms
            };
        });
    }

    pub fn set_current_time(&self, time_ms: u64) {
        self.state.update(|state| state.current_time_ms = time_ms);
    }

    pub fn set_duration(&self, duration_ms: u64) {
        self.state.update(|state| state.duration_ms = duration_ms);
    }

    pub fn set_volume(&self, volume: f64) {
        let volume = if volume.is_nan() {
            DEFAULT_VOLUME
        } else {
            volume.clamp(0.0, 1.0)
        };
        self.state.update(|state| state.volume = volume);
    }

    fn set_playing(&self, playing: bool) {
        self.state.update_if(|state| {
            let changed = state.playing != playing;
            state.playing = playing;
            changed
        });
    }
}

#[cfg(test)]
#[path = "../tests/player_tests.rs"]
mod tests;
