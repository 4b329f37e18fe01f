//! HTTP health endpoint
//!
//! `GET /`, `/health` and `/status` return the bot's liveness report as JSON.
//! `GET /vnc` redirects to the configured remote desktop viewer.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::core::activation::TradingState;
use crate::core::cascade::CascadeBook;
use crate::error::{BotError, BotResult};
use crate::validation::ServiceFlags;

/// Shared state behind every route
#[derive(Clone)]
pub struct HealthState {
    pub trading: TradingState,
    pub book: CascadeBook,
    pub services: ServiceFlags,
    pub vnc_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServicesReport {
    #[serde(flatten)]
    pub flags: ServiceFlags,
    pub trading_active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub bot: &'static str,
    pub timestamp: f64,
    pub active: bool,
    pub active_trade_count: usize,
    pub services: ServicesReport,
}

impl HealthState {
    pub fn new(trading: TradingState, book: CascadeBook, services: ServiceFlags) -> Self {
        Self {
            trading,
            book,
            services,
            vnc_url: None,
        }
    }

    pub fn with_vnc_url(mut self, vnc_url: Option<String>) -> Self {
        self.vnc_url = vnc_url.filter(|url| !url.is_empty());
        self
    }

    pub fn report(&self) -> HealthReport {
        let status = self.trading.status(&self.book);
        HealthReport {
            status: "healthy",
            bot: "running",
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            active: status.active,
            active_trade_count: status.active_trade_count,
            services: ServicesReport {
                flags: self.services,
                trading_active: status.active,
            },
        }
    }
}

async fn health(State(state): State<Arc<HealthState>>) -> Json<HealthReport> {
    Json(state.report())
}

async fn vnc(State(state): State<Arc<HealthState>>) -> Response {
    match &state.vnc_url {
        Some(url) => (StatusCode::FOUND, [(header::LOCATION, url.clone())]).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/status", get(health))
        .route("/vnc", get(vnc))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .with_state(Arc::new(state))
}

/// Bind and serve until the task is dropped
pub async fn serve(addr: SocketAddr, state: HealthState) -> BotResult<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| BotError::Server(format!("bind {}: {}", addr, e)))?;
    serve_on(listener, state).await
}

pub async fn serve_on(listener: TcpListener, state: HealthState) -> BotResult<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("🩺 Health endpoint listening on http://{}", addr);
    }
    axum::serve(listener, router(state))
        .await
        .map_err(|e| BotError::Server(e.to_string()))
}
