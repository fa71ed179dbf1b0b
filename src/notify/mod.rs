// Notification Sink
//
// Delivers each job's result payload: an HTTP POST to the job's callback
// and a `job_result` event on the in-process bus. Delivery is a single
// attempt; the orchestrator logs failures and moves on.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::pipeline::ResultPayload;

pub mod error;
pub mod events;

pub use error::{NotifyError, NotifyResult};
pub use events::{BroadcastNotifier, EventBus, HardenEvent, JOB_ACCEPTED, JOB_COMPLETED, JOB_RESULT};

/// Somewhere a result payload can be sent
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, callback_url: &Url, payload: &ResultPayload) -> NotifyResult<()>;
}

/// POSTs the payload as JSON to the job's callback URL
#[derive(Clone)]
pub struct CallbackNotifier {
    http: reqwest::Client,
}

impl CallbackNotifier {
    pub fn new(timeout: Duration) -> NotifyResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl NotificationSink for CallbackNotifier {
    fn name(&self) -> &'static str {
        "callback"
    }

    async fn deliver(&self, callback_url: &Url, payload: &ResultPayload) -> NotifyResult<()> {
        let response = self.http.post(callback_url.clone()).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                url: callback_url.to_string(),
                status: status.as_u16(),
            });
        }
        log::debug!("callback {} answered {}", callback_url, status);
        Ok(())
    }
}

/// Delivers to every inner sink, even after one fails
#[derive(Clone, Default)]
pub struct CompositeNotifier {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl CompositeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl NotificationSink for CompositeNotifier {
    fn name(&self) -> &'static str {
        "composite"
    }

    async fn deliver(&self, callback_url: &Url, payload: &ResultPayload) -> NotifyResult<()> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(callback_url, payload).await {
                failures.push(format!("{}: {}", sink.name(), e));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotifyError::Multiple(failures))
        }
    }
}
