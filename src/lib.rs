pub mod config;
pub mod tools;
pub mod keystore;
pub mod manifest;
pub mod smali;
pub mod pipeline;
pub mod notify;

#[cfg(feature = "server")]
pub mod server;

pub use config::{ConfigError, HardenConfig};
pub use pipeline::{ErrorKind, Job, JobRequest, NamingStrategy, Orchestrator, ResultPayload};
pub use notify::{EventBus, NotificationSink};
