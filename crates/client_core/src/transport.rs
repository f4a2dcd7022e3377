//! Reconnecting server-push connection to `/api/events`.

use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::{header::ACCEPT, Client};
use shared::events::{decode_envelope, EnvelopeError, PushEvent};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info};

use crate::{
    backoff::{Backoff, BackoffPolicy},
    diagnostics::Diagnostic,
    dispatcher::Dispatcher,
    sse::SseDecoder,
};

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns at most one connection task. Every inbound event goes through the
/// dispatcher in the order the stream delivered it.
pub struct EventTransport {
    stream: EventStream,
    worker: Mutex<Option<Worker>>,
}

impl EventTransport {
    pub fn new(
        http: Client,
        url: impl Into<String>,
        dispatcher: Dispatcher,
        policy: BackoffPolicy,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            stream: EventStream {
                http,
                url: url.into(),
                dispatcher,
                policy,
                idle_timeout,
            },
            worker: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.stream.url
    }

    /// Starts the connection task. Calling it while the task is alive does
    /// nothing. Must be called from inside a Tokio runtime.
    pub fn connect(&self) {
        let mut worker = self.worker.lock();
        if worker
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
        {
            return;
        }
        let (shutdown, shutdown_rx) = watch::channel(false);
        let stream = self.stream.clone();
        let handle = tokio::spawn(async move { stream.run(shutdown_rx).await });
        *worker = Some(Worker { shutdown, handle });
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Closes the connection. No reconnect is scheduled afterwards.
    pub async fn disconnect(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let _ = worker.shutdown.send(true);
        if let Err(err) = worker.handle.await {
            debug!(error = %err, "event stream task ended abnormally");
        }
        info!(url = %self.stream.url, "event stream disconnected");
    }
}

impl Drop for EventTransport {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.shutdown.send(true);
            worker.handle.abort();
        }
    }
}

#[derive(Clone)]
struct EventStream {
    http: Client,
    url: String,
    dispatcher: Dispatcher,
    policy: BackoffPolicy,
    idle_timeout: Duration,
}

impl EventStream {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = Backoff::new(self.policy);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                () = self.stream_once(&mut backoff) => {}
            }

            self.dispatcher.dispatch(&PushEvent::disconnected());
            let delay = backoff.next_delay();
            debug!(
                url = %self.url,
                delay_ms = delay.as_millis() as u64,
                failures = backoff.failures(),
                "scheduling event stream reconnect"
            );
            tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One connection attempt, returning once the stream is gone.
    async fn stream_once(&self, backoff: &mut Backoff) {
        let sink = self.dispatcher.sink();
        let response = match self
            .http
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                sink.report(Diagnostic::ConnectionFailed {
                    url: self.url.clone(),
                    error: format!("HTTP {}", response.status()),
                });
                return;
            }
            Err(err) => {
                sink.report(Diagnostic::ConnectionFailed {
                    url: self.url.clone(),
                    error: err.to_string(),
                });
                return;
            }
        };

        backoff.reset();
        info!(url = %self.url, "event stream connected");
        self.dispatcher.dispatch(&PushEvent::connected());

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        loop {
            let chunk = match tokio::time::timeout(self.idle_timeout, body.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(err))) => {
                    sink.report(Diagnostic::StreamInterrupted {
                        error: err.to_string(),
                    });
                    return;
                }
                Ok(None) => {
                    sink.report(Diagnostic::StreamInterrupted {
                        error: "stream closed by server".into(),
                    });
                    return;
                }
                Err(_) => {
                    sink.report(Diagnostic::StreamInterrupted {
                        error: format!(
                            "no data received for {}s",
                            self.idle_timeout.as_secs_f64()
                        ),
                    });
                    return;
                }
            };
            match decoder.push(&chunk) {
                Ok(frames) => {
                    for frame in frames {
                        self.deliver(&frame);
                    }
                }
                Err(err) => {
                    sink.report(Diagnostic::StreamInterrupted {
                        error: err.to_string(),
                    });
                    return;
                }
            }
        }
    }

    fn deliver(&self, frame: &str) {
        match decode_envelope(frame) {
            Ok(event) => {
                self.dispatcher.dispatch(&event);
            }
            Err(EnvelopeError::UnknownEvent(name)) => {
                self.dispatcher
                    .sink()
                    .report(Diagnostic::UnrecognizedEvent { name });
            }
            Err(err) => {
                self.dispatcher.sink().report(Diagnostic::MalformedEnvelope {
                    reason: err.to_string(),
                    raw: frame.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
