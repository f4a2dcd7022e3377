//! Named-event publish/subscribe between the transport and the stores.

use std::{
    any::Any,
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use shared::events::{EventKind, PushEvent};

use crate::diagnostics::{Diagnostic, DiagnosticSink};

type Handler = Arc<dyn Fn(&PushEvent) -> anyhow::Result<()> + Send + Sync>;

struct Registration {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<Registration>>,
}

struct DispatcherInner {
    registry: Mutex<Registry>,
    sink: Arc<dyn DiagnosticSink>,
}

impl DispatcherInner {
    fn remove(&self, kind: EventKind, id: u64) {
        let mut registry = self.registry.lock();
        if let Some(handlers) = registry.handlers.get_mut(&kind) {
            handlers.retain(|registration| registration.id != id);
            if handlers.is_empty() {
                registry.handlers.remove(&kind);
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                registry: Mutex::new(Registry::default()),
                sink,
            }),
        }
    }

    pub fn sink(&self) -> Arc<dyn DiagnosticSink> {
        Arc::clone(&self.inner.sink)
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&PushEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut registry = self.inner.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.entry(kind).or_default().push(Registration {
            id,
            handler: Arc::new(handler),
        });
        Subscription {
            kind,
            id,
            dispatcher: Arc::downgrade(&self.inner),
        }
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.inner
            .registry
            .lock()
            .handlers
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Runs every handler registered for the event's kind, in registration
    /// order. Handler errors and panics are reported, never propagated.
    pub fn dispatch(&self, event: &PushEvent) -> DispatchOutcome {
        let kind = event.kind();
        let handlers: Vec<Handler> = {
            let registry = self.inner.registry.lock();
            match registry.handlers.get(&kind) {
                Some(handlers) => handlers
                    .iter()
                    .map(|registration| Arc::clone(&registration.handler))
                    .collect(),
                None => return DispatchOutcome::default(),
            }
        };

        let mut outcome = DispatchOutcome::default();
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => outcome.delivered += 1,
                Ok(Err(err)) => {
                    outcome.failed += 1;
                    self.inner.sink.report(Diagnostic::HandlerFailed {
                        event: kind,
                        error: format!("{err:#}"),
                    });
                }
                Err(payload) => {
                    outcome.failed += 1;
                    self.inner.sink.report(Diagnostic::HandlerPanicked {
                        event: kind,
                        message: panic_message(payload.as_ref()),
                    });
                }
            }
        }
        outcome
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Registration handle; dropping it removes exactly this handler.
#[must_use = "dropping a Subscription unregisters its handler"]
pub struct Subscription {
    kind: EventKind,
    id: u64,
    dispatcher: Weak<DispatcherInner>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.remove(self.kind, self.id);
        }
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
