//! Client runtime for the HeartMuLa generation backend: REST access, the
//! reconnecting push stream, event dispatch and the observable stores the
//! views render from.

pub mod api;
pub mod backoff;
pub mod binding;
pub mod config;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
pub mod session;
pub mod sse;
pub mod stores;
pub mod transport;

pub use api::{ApiClient, AudioUpload, BackendApi};
pub use binding::bind_stores;
pub use config::{load_config, BaseAddress, ClientConfig};
pub use diagnostics::{Diagnostic, DiagnosticSink, RecordingSink, TracingSink};
pub use dispatcher::{DispatchOutcome, Dispatcher, Subscription};
pub use error::{ClientError, ConfigError};
pub use session::Session;
pub use transport::EventTransport;

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
