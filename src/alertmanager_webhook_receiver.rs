//! HTTP side of the alertmanager webhook.
//!
//! A termination signal stops the server from accepting new connections while
//! requests already in flight finish their batch. Only when the graceful
//! shutdown runs out of time is the `abort` token cancelled, which keeps the
//! remaining alerts of those batches from issuing further deletes.
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    extract::Extension,
    handler::Handler,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{event_handler::EventHandler, settings::Settings};

const INTERNAL_SERVER_ERROR: &str = "Internal server error";
const EMPTY_REQUEST_BODY: &str = "Bad request: empty request body";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlertReceiverSettings {
    pub bind_address: IpAddr,
    pub port: u16,
}

impl Default for AlertReceiverSettings {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
        }
    }
}

impl AlertReceiverSettings {
    pub fn global() -> &'static Self {
        &Settings::global().alert_webhook_receiver
    }

    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

struct State {
    handler: EventHandler,
    abort: CancellationToken,
}

async fn alert_receiver(
    Extension(state): Extension<Arc<State>>,
    body: Bytes,
) -> (StatusCode, String) {
    tracing::debug!("alertmanager event received");

    if body.is_empty() {
        tracing::error!("{}", EMPTY_REQUEST_BODY);
        return (StatusCode::BAD_REQUEST, EMPTY_REQUEST_BODY.to_owned());
    }

    let cancel = state.abort.child_token();

    match state.handler.handle(&body, &cancel).await {
        Ok(report) => {
            tracing::debug!(
                remediated = report.remediated(),
                failed = report.failed(),
                skipped = report.skipped(),
                cancelled = report.cancelled(),
                "alertmanager event handled"
            );
            (StatusCode::OK, String::new())
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{}: {}", INTERNAL_SERVER_ERROR, err),
        ),
    }
}

/// accepts anything and throws it away
async fn sink(_body: Bytes) -> StatusCode {
    StatusCode::OK
}

/// every path other than `/alert` is a sink
pub fn router(handler: EventHandler, abort: CancellationToken) -> Router {
    let state = Arc::new(State { handler, abort });

    Router::new()
        .route("/alert", post(alert_receiver))
        .route("/", get(sink).post(sink))
        .fallback(sink.into_service())
        .layer(Extension(state))
}

/// serves the webhook until `shutdown` is cancelled, in-flight batches stop early once `abort` is
pub async fn run_alert_receiver(
    handler: EventHandler,
    shutdown: CancellationToken,
    abort: CancellationToken,
) -> Result<()> {
    let addr = AlertReceiverSettings::global().to_socket_addr();
    let app = router(handler, abort);

    tracing::info!(%addr, "listening for alertmanager webhooks");

    axum::Server::try_bind(&addr)
        .context(format!("failed to bind {}", addr))?
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("alertmanager webhook receiver crashed")?;

    Ok(())
}
