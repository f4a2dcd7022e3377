//! Observable state containers kept in step with the backend.
//!
//! Each store owns a `watch` channel holding its whole state. Views call
//! `subscribe()` to be woken on change and `snapshot()` to read; the only
//! writes go through the store's own operations.

use std::sync::Arc;

use tokio::sync::watch;

use crate::{api::BackendApi, config::ClientConfig, diagnostics::DiagnosticSink};

pub mod library;
pub mod player;
pub mod queue;
pub mod settings;
pub mod studio;
pub mod system;
pub mod transcription;

pub use library::{LibraryState, LibraryStore};
pub use player::{PlayerState, PlayerStore};
pub use queue::{JobUpdate, QueueState, QueueStore};
pub use settings::{SettingsState, SettingsStore};
pub use studio::{Param, StudioDraft, StudioStore};
pub use system::{SystemState, SystemStore};
pub use transcription::{TranscriptionState, TranscriptionStatus, TranscriptionStore};

pub(crate) struct Observable<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> Observable<T> {
    pub(crate) fn new(initial: T) -> Self {
        Self {
            tx: watch::Sender::new(initial),
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    pub(crate) fn snapshot(&self) -> T {
        self.tx.borrow().clone()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Applies `f` and wakes subscribers.
    pub(crate) fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    /// Applies `f`; subscribers are only woken when it returns `true`.
    pub(crate) fn update_if(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }
}

/// Every container the client keeps, constructed together.
#[derive(Clone)]
pub struct Stores {
    pub queue: Arc<QueueStore>,
    pub system: Arc<SystemStore>,
    pub library: Arc<LibraryStore>,
    pub player: Arc<PlayerStore>,
    pub studio: Arc<StudioStore>,
    pub settings: Arc<SettingsStore>,
    pub transcription: Arc<TranscriptionStore>,
}

impl Stores {
    pub fn new(
        api: Arc<dyn BackendApi>,
        sink: Arc<dyn DiagnosticSink>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            queue: Arc::new(QueueStore::new(Arc::clone(&api), config.job_list_limit)),
            system: Arc::new(SystemStore::new(Arc::clone(&api), Arc::clone(&sink))),
            library: Arc::new(LibraryStore::new(
                Arc::clone(&api),
                config.library_page_size,
            )),
            player: Arc::new(PlayerStore::new()),
            studio: Arc::new(StudioStore::new(Arc::clone(&api), Arc::clone(&sink))),
            settings: Arc::new(SettingsStore::new(Arc::clone(&api))),
            transcription: Arc::new(TranscriptionStore::new(api)),
        }
    }
}
