//! Single sink for failures that are handled without surfacing to callers.

use std::fmt;

use parking_lot::Mutex;
use shared::{domain::ModelState, events::EventKind};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    MalformedEnvelope {
        reason: String,
        raw: String,
    },
    UnrecognizedEvent {
        name: String,
    },
    HandlerFailed {
        event: EventKind,
        error: String,
    },
    HandlerPanicked {
        event: EventKind,
        message: String,
    },
    ConnectionFailed {
        url: String,
        error: String,
    },
    StreamInterrupted {
        error: String,
    },
    RequestFailed {
        operation: &'static str,
        error: String,
    },
    UnexpectedModelTransition {
        from: ModelState,
        to: ModelState,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedEnvelope { reason, .. } => write!(f, "dropped malformed push message: {reason}"),
            Self::UnrecognizedEvent { name } => write!(f, "dropped unrecognised push event {name:?}"),
            Self::HandlerFailed { event, error } => write!(f, "handler for {event} failed: {error}"),
            Self::HandlerPanicked { event, message } => {
                write!(f, "handler for {event} panicked: {message}")
            }
            Self::ConnectionFailed { url, error } => {
                write!(f, "event stream connection to {url} failed: {error}")
            }
            Self::StreamInterrupted { error } => write!(f, "event stream interrupted: {error}"),
            Self::RequestFailed { operation, error } => write!(f, "{operation} failed: {error}"),
            Self::UnexpectedModelTransition { from, to } => {
                write!(f, "unexpected model state transition {from} -> {to}")
            }
        }
    }
}

pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Default sink: everything goes to `tracing`.
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::MalformedEnvelope { raw, .. } => {
                debug!(raw = %raw, "{diagnostic}");
            }
            Diagnostic::UnrecognizedEvent { .. } => debug!("{diagnostic}"),
            _ => warn!("{diagnostic}"),
        }
    }
}

/// Keeps every diagnostic in memory.
#[derive(Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.lock())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, diagnostic: Diagnostic) {
        debug!("{diagnostic}");
        self.entries.lock().push(diagnostic);
    }
}
