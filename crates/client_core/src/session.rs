use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;
use reqwest::Client;
use shared::events::EventKind;
use tracing::info;

use crate::{
    api::ApiClient,
    binding::bind_stores,
    config::{BaseAddress, ClientConfig},
    diagnostics::{Diagnostic, DiagnosticSink, TracingSink},
    dispatcher::{Dispatcher, Subscription},
    error::ConfigError,
    stores::Stores,
    transport::EventTransport,
};

/// Owns everything a running client needs. Dropping a session releases
/// the push connection and every store subscription.
pub struct Session {
    config: ClientConfig,
    base: BaseAddress,
    api: Arc<ApiClient>,
    sink: Arc<dyn DiagnosticSink>,
    dispatcher: Dispatcher,
    transport: EventTransport,
    stores: Stores,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Session {
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    pub fn with_sink(
        config: ClientConfig,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self, ConfigError> {
        let base = config.base_address()?;
        let http = Client::new();
        let api = Arc::new(ApiClient::with_http(
            http.clone(),
            base.clone(),
            config.request_timeout(),
        ));
        let dispatcher = Dispatcher::new(Arc::clone(&sink));
        let transport = EventTransport::new(
            http,
            base.events_url(),
            dispatcher.clone(),
            config.backoff(),
            config.heartbeat_timeout(),
        );
        let stores = Stores::new(api.clone(), Arc::clone(&sink), &config);

        Ok(Self {
            config,
            base,
            api,
            sink,
            dispatcher,
            transport,
            stores,
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base(&self) -> &BaseAddress {
        &self.base
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn transport(&self) -> &EventTransport {
        &self.transport
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn is_started(&self) -> bool {
        !self.subscriptions.lock().is_empty()
    }

    /// Binds the stores and opens the push connection. Safe to call twice.
    pub fn start(&self) {
        {
            let mut subscriptions = self.subscriptions.lock();
            if subscriptions.is_empty() {
                *subscriptions = bind_stores(&self.dispatcher, &self.stores);
                subscriptions.extend(self.resync_on_reconnect());
            }
        }
        self.transport.connect();
        info!(base = %self.base.as_str(), "session started");
    }

    /// Loads settings, the job queue and system status concurrently.
    /// Failures are reported to the diagnostic sink; whatever succeeded is
    /// kept.
    pub async fn hydrate(&self) {
        let (settings, jobs, system) = tokio::join!(
            self.stores.settings.fetch_settings(),
            self.stores.queue.fetch_jobs(),
            self.stores.system.refresh(),
        );
        match settings {
            Ok(settings) => self.stores.studio.apply_defaults(&settings),
            Err(err) => self.report("fetch settings", &err),
        }
        if let Err(err) = jobs {
            self.report("fetch jobs", &err);
        }
        if let Err(err) = system {
            self.report("refresh system status", &err);
        }
    }

    pub async fn shutdown(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        drop(subscriptions);
        self.transport.disconnect().await;
        info!("session shut down");
    }

    /// After the stream comes back from a drop, reloads the queue and
    /// system status in the background so events missed while offline
    /// are reflected. The first connect is left to `hydrate`.
    fn resync_on_reconnect(&self) -> [Subscription; 2] {
        let dropped = Arc::new(AtomicBool::new(false));
        let lost = Arc::clone(&dropped);
        let on_disconnect = self.dispatcher.subscribe(EventKind::Disconnected, move |_| {
            lost.store(true, Ordering::SeqCst);
            Ok(())
        });

        let stores = self.stores.clone();
        let sink = Arc::clone(&self.sink);
        let on_connect = self.dispatcher.subscribe(EventKind::Connected, move |_| {
            if !dropped.swap(false, Ordering::SeqCst) {
                return Ok(());
            }
            info!("event stream restored; resyncing queue and system status");
            let stores = stores.clone();
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                let (jobs, system) =
                    tokio::join!(stores.queue.fetch_jobs(), stores.system.refresh());
                if let Err(err) = jobs {
                    report(sink.as_ref(), "resync jobs", &err);
                }
                if let Err(err) = system {
                    report(sink.as_ref(), "resync system status", &err);
                }
            });
            Ok(())
        });
        [on_disconnect, on_connect]
    }

    fn report(&self, operation: &'static str, error: &dyn std::error::Error) {
        report(self.sink.as_ref(), operation, error);
    }
}

fn report(sink: &dyn DiagnosticSink, operation: &'static str, error: &dyn std::error::Error) {
    sink.report(Diagnostic::RequestFailed {
        operation,
        error: error.to_string(),
    });
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
