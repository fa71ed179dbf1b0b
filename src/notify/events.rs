// In-process realtime event channel

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use url::Url;

use super::error::NotifyResult;
use super::NotificationSink;
use crate::pipeline::ResultPayload;

pub const JOB_ACCEPTED: &str = "job_accepted";
pub const JOB_RESULT: &str = "job_result";
pub const JOB_COMPLETED: &str = "job_completed";

/// One event on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardenEvent {
    pub event: String,
    pub data: Value,
    pub emitted_at: DateTime<Utc>,
}

impl HardenEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            emitted_at: Utc::now(),
        }
    }
}

/// Fan-out channel for [`HardenEvent`]s.
///
/// Publishing never blocks and never fails; with no subscribers the event
/// is dropped. Slow subscribers see `RecvError::Lagged`.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<HardenEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: HardenEvent) {
        let _ = self.tx.send(event);
    }

    pub fn emit(&self, event: &str, data: Value) {
        self.publish(HardenEvent::new(event, data));
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<HardenEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Publishes every result payload as a `job_result` event
#[derive(Clone, Debug)]
pub struct BroadcastNotifier {
    bus: EventBus,
}

impl BroadcastNotifier {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl NotificationSink for BroadcastNotifier {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn deliver(&self, _callback_url: &Url, payload: &ResultPayload) -> NotifyResult<()> {
        self.bus.emit(JOB_RESULT, serde_json::to_value(payload)?);
        Ok(())
    }
}
