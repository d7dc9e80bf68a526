//! Here we expose prometheus metrics about pod-bouncer
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::{Context, Result};
use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, HeaderName, StatusCode},
    routing::get,
    Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::settings::Settings;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryEndpointSettings {
    pub bind_address: IpAddr,
    pub port: u16,
}

impl Default for TelemetryEndpointSettings {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9090,
        }
    }
}

impl TelemetryEndpointSettings {
    pub fn global() -> &'static Self {
        &Settings::global().telemetry_endpoint
    }

    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

async fn metrics_handler(
    Extension(registry): Extension<Registry>,
) -> Result<([(HeaderName, String); 1], Vec<u8>), StatusCode> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    encoder.encode(&metric_families, &mut buffer).map_err(|err| {
        tracing::error!(error = %err, "failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(([(CONTENT_TYPE, encoder.format_type().to_owned())], buffer))
}

fn router(registry: Registry) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .layer(Extension(registry))
}

pub async fn run_telemetry_endpoint(registry: Registry, shutdown: CancellationToken) -> Result<()> {
    let addr = TelemetryEndpointSettings::global().to_socket_addr();

    axum::Server::try_bind(&addr)
        .context(format!("failed to bind {}", addr))?
        .serve(router(registry).into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("telemetry endpoint crashed")?;

    Ok(())
}
