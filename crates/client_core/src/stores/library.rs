use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use shared::{
    domain::{Track, TrackId},
    error::ValidationError,
    protocol::{ListTracksQuery, TrackSort, TrackUpdate, TRACK_TITLE_MAX_CHARS},
};
use tokio::sync::watch;
use tracing::debug;

use super::Observable;
use crate::{api::BackendApi, error::ClientError};

#[derive(Debug, Clone, PartialEq)]
pub struct LibraryState {
    pub tracks: Vec<Track>,
    pub total: u64,
    pub search: String,
    pub tag_filter: Option<String>,
    pub sort: TrackSort,
    pub favorites_only: bool,
    pub loading: bool,
    /// Offset of the next page to request.
    pub offset: u32,
    pub limit: u32,
}

impl LibraryState {
    fn new(limit: u32) -> Self {
        Self {
            tracks: Vec::new(),
            total: 0,
            search: String::new(),
            tag_filter: None,
            sort: TrackSort::default(),
            favorites_only: false,
            loading: false,
            offset: 0,
            limit,
        }
    }

    pub fn has_more(&self) -> bool {
        (self.tracks.len() as u64) < self.total
    }

    fn query(&self, offset: u32) -> ListTracksQuery {
        let search = self.search.trim();
        ListTracksQuery {
            search: (!search.is_empty()).then(|| search.to_string()),
            tags: self.tag_filter.clone(),
            favorite: self.favorites_only.then_some(true),
            sort: Some(self.sort),
            limit: Some(self.limit),
            offset: Some(offset),
        }
    }

    fn reset_page(&mut self) {
        self.offset = 0;
        self.tracks.clear();
    }
}

/// Paged, filtered view over the track library.
pub struct LibraryStore {
    state: Observable<LibraryState>,
    api: Arc<dyn BackendApi>,
    // Bumped by every filter change; page responses from an older view
    // are discarded.
    epoch: AtomicU64,
}

impl LibraryStore {
    pub fn new(api: Arc<dyn BackendApi>, page_size: u32) -> Self {
        Self {
            state: Observable::new(LibraryState::new(page_size.max(1))),
            api,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LibraryState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> LibraryState {
        self.state.snapshot()
    }

    pub async fn set_search(&self, search: impl Into<String>) -> Result<(), ClientError> {
        let search = search.into();
        self.state.update(|state| {
            state.search = search;
            state.reset_page();
        });
        self.fetch_tracks().await
    }

    pub async fn set_sort(&self, sort: TrackSort) -> Result<(), ClientError> {
        self.state.update(|state| {
            state.sort = sort;
            state.reset_page();
        });
        self.fetch_tracks().await
    }

    pub async fn set_favorites_only(&self, favorites_only: bool) -> Result<(), ClientError> {
        self.state.update(|state| {
            state.favorites_only = favorites_only;
            state.reset_page();
        });
        self.fetch_tracks().await
    }

    pub async fn set_tag_filter(&self, tags: Option<String>) -> Result<(), ClientError> {
        let tags = tags.filter(|tags| !tags.trim().is_empty());
        self.state.update(|state| {
            state.tag_filter = tags;
            state.reset_page();
        });
        self.fetch_tracks().await
    }

    /// Loads the first page for the current filters.
    pub async fn fetch_tracks(&self) -> Result<(), ClientError> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let query = self.state.read(|state| state.query(0));
        self.state.update(|state| state.loading = true);

        let result = self.api.list_tracks(&query).await;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(epoch, "discarding superseded track page");
            return result.map(|_| ());
        }
        self.state.update(|state| {
            state.loading = false;
            if let Ok(page) = &result {
                state.tracks = page.tracks.clone();
                state.total = page.total;
                state.offset = state.limit;
            }
        });
        result.map(|_| ())
    }

    /// Appends the next page. Does nothing once every track is loaded.
    pub async fn load_more(&self) -> Result<(), ClientError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let (query, offset) = self.state.read(|state| {
            let exhausted = state.offset > 0 && !state.has_more();
            (
                (!exhausted && !state.loading).then(|| state.query(state.offset)),
                state.offset,
            )
        });
        let Some(query) = query else {
            return Ok(());
        };
        self.state.update(|state| state.loading = true);

        let result = self.api.list_tracks(&query).await;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(epoch, offset, "discarding superseded track page");
            return result.map(|_| ());
        }
        self.state.update(|state| {
            state.loading = false;
            if let Ok(page) = &result {
                state.tracks.extend(page.tracks.iter().cloned());
                state.total = page.total;
                state.offset = offset + state.limit;
            }
        });
        result.map(|_| ())
    }

    /// Flips the favorite flag in place, rolling back if the backend
    /// refuses. Unknown ids are ignored.
    pub async fn toggle_favorite(&self, track_id: &TrackId) -> Result<(), ClientError> {
        let Some(previous) = self.state.read(|state| {
            state
                .tracks
                .iter()
                .find(|track| &track.id == track_id)
                .map(|track| track.favorite)
        }) else {
            return Ok(());
        };
        self.set_favorite_flag(track_id, !previous);

        let update = TrackUpdate {
            favorite: Some(!previous),
            ..TrackUpdate::default()
        };
        match self.api.update_track(track_id, &update).await {
            Ok(updated) => {
                self.replace_track(updated);
                Ok(())
            }
            Err(err) => {
                self.set_favorite_flag(track_id, previous);
                Err(err)
            }
        }
    }

    /// Removes the track from the loaded set and the running total; both are
    /// restored if the backend refuses.
    pub async fn delete_track(&self, track_id: &TrackId) -> Result<(), ClientError> {
        let mut removed: Option<(usize, Track)> = None;
        self.state.update(|state| {
            if let Some(index) = state.tracks.iter().position(|track| &track.id == track_id) {
                removed = Some((index, state.tracks.remove(index)));
            }
            state.total = state.total.saturating_sub(1);
        });

        if let Err(err) = self.api.delete_track(track_id).await {
            self.state.update(|state| {
                if let Some((index, track)) = removed {
                    let index = index.min(state.tracks.len());
                    state.tracks.insert(index, track);
                }
                state.total += 1;
            });
            return Err(err);
        }
        Ok(())
    }

    /// Edits title and/or tags and replaces the loaded copy.
    pub async fn update_track(
        &self,
        track_id: &TrackId,
        update: TrackUpdate,
    ) -> Result<Track, ClientError> {
        if let Some(title) = &update.title {
            let chars = title.chars().count();
            if chars > TRACK_TITLE_MAX_CHARS {
                return Err(ValidationError::OutOfRange {
                    field: "title",
                    value: chars as f64,
                    min: 0.0,
                    max: TRACK_TITLE_MAX_CHARS as f64,
                }
                .into());
            }
        }
        let updated = self.api.update_track(track_id, &update).await?;
        self.replace_track(updated.clone());
        Ok(updated)
    }

    fn set_favorite_flag(&self, track_id: &TrackId, favorite: bool) {
        self.state.update(|state| {
            if let Some(track) = state.tracks.iter_mut().find(|track| &track.id == track_id) {
                track.favorite = favorite;
            }
        });
    }

    fn replace_track(&self, updated: Track) {
        self.state.update(|state| {
            if let Some(track) = state.tracks.iter_mut().find(|track| track.id == updated.id) {
                *track = updated;
            }
        });
    }
}

#[cfg(test)]
#[path = "../tests/library_tests.rs"]
mod tests;
