//! Intake Server
//!
//! Thin HTTP surface over the orchestrator: accepts job requests, relays
//! completion notices and streams bus events to browsers.

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::HardenConfig;
use crate::notify::EventBus;
use crate::pipeline::Orchestrator;

pub mod error;
pub mod handlers;

pub use error::{IntakeError, ServerError, ServerResult};

/// State shared across handlers
#[derive(Clone)]
pub struct ServerState {
    pub orchestrator: Orchestrator,
    pub events: EventBus,
    /// Required intake credential; open when unset
    pub api_key: Option<String>,
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the router with every intake endpoint
pub fn create_router(state: ServerState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/harden", post(handlers::submit_job))
        .route("/job-completed", post(handlers::job_completed))
        .route("/events", get(handlers::events))
        .route("/", get(handlers::not_found))
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(cors_origins)),
        )
        .with_state(state)
}

/// The intake server bound to the configured address
pub struct HardenServer {
    bind: String,
    cors_origins: Vec<String>,
    state: ServerState,
    shutdown_signal: Option<tokio::sync::oneshot::Sender<()>>,
}

impl HardenServer {
    pub fn new(config: &HardenConfig, orchestrator: Orchestrator, events: EventBus) -> Self {
        Self {
            bind: config.server.bind.clone(),
            cors_origins: config.server.cors_origins.clone(),
            state: ServerState {
                orchestrator,
                events,
                api_key: config.server.api_key.clone().filter(|key| !key.is_empty()),
            },
            shutdown_signal: None,
        }
    }

    async fn listener(&self) -> ServerResult<tokio::net::TcpListener> {
        let addr: SocketAddr = self
            .bind
            .parse()
            .map_err(|_| ServerError::InvalidAddress(self.bind.clone()))?;
        tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.bind.clone(),
                source,
            })
    }

    /// Serve in the background; returns the bound address
    pub async fn start(&mut self) -> ServerResult<SocketAddr> {
        let listener = self.listener().await?;
        let addr = listener.local_addr()?;
        let app = create_router(self.state.clone(), &self.cors_origins);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        self.shutdown_signal = Some(shutdown_tx);

        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await;
            if let Err(e) = served {
                log::error!("intake server stopped: {}", e);
            }
        });

        log::info!("intake server listening on {}", addr);
        Ok(addr)
    }

    /// Serve until ctrl-c
    pub async fn run(self) -> ServerResult<()> {
        let listener = self.listener().await?;
        log::info!("intake server listening on {}", listener.local_addr()?);
        let app = create_router(self.state, &self.cors_origins);
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                log::info!("shutting down intake server");
            })
            .await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        if let Some(signal) = self.shutdown_signal.take() {
            let _ = signal.send(());
        }
    }
}
