//! alertmanager receiver that bounces misbehaving pods
//!
//! Every alert of a webhook notification that is firing with severity
//! critical (configurable) gets the pod named by its `namespace` and `pod`
//! labels deleted, so that the owning controller reschedules it.

use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::Registry;
use settings::Settings;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use crate::{
	cluster::KubePodDeleter,
	dispatcher::{Dispatcher, RemediationSettings},
	event_handler::EventHandler,
	observer::TracingObserver,
};

mod alert;
mod alertmanager_webhook_receiver;
mod cluster;
mod dispatcher;
mod event_handler;
mod log;
mod observer;
mod policy;
mod settings;
mod telemetry_endpoint;

/// exit the complete program if one thread panics
fn setup_panic_handler() {
	let default_panic = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		default_panic(info);
		std::process::exit(1);
	}));
}

/// resolves on SIGTERM or SIGINT
async fn termination_signal() -> Result<()> {
	let mut terminate = signal(SignalKind::terminate()).context("failed to listen for SIGTERM")?;

	tokio::select! {
		_ = terminate.recv() => {},
		res = tokio::signal::ctrl_c() => res.context("failed to listen for SIGINT")?,
	}

	Ok(())
}

/// the entry point of the program
#[tokio::main]
pub async fn main() -> Result<()> {
	setup_panic_handler();

	log::setup_logging().context("could not setup logging")?;

	tracing::info!("pod-bouncer starting up");

	let registry = Registry::new();
	let observer =
		Arc::new(TracingObserver::new(&registry).context("failed to register metrics")?);

	let client = kube::Client::try_default().await.context("failed to create kubernetes client")?;
	let remediation = RemediationSettings::global();
	let deleter = Arc::new(KubePodDeleter::new(client, remediation.grace_period_seconds));

	let dispatcher = Dispatcher::new(deleter, remediation.timeout, observer.clone());
	let handler = EventHandler::new(Settings::global().policy.clone(), dispatcher, observer);

	let shutdown = CancellationToken::new();
	let abort = CancellationToken::new();

	let mut receiver = tokio::spawn(alertmanager_webhook_receiver::run_alert_receiver(
		handler,
		shutdown.clone(),
		abort.clone(),
	));

	tokio::spawn({
		let shutdown = shutdown.clone();
		async move {
			if let Err(err) = telemetry_endpoint::run_telemetry_endpoint(registry, shutdown).await {
				tracing::error!(error = ?err, "telemetry endpoint failed");
			}
		}
	});

	tokio::select! {
		res = termination_signal() => {
			res?;
			tracing::info!("received termination signal, shutting down");
		}
		res = &mut receiver => {
			// the receiver only returns on its own if it failed
			shutdown.cancel();
			abort.cancel();
			return match res {
				Ok(res) => res,
				Err(err) => Err(err).context("alertmanager webhook receiver panicked"),
			};
		}
	}

	shutdown.cancel();

	// in-flight batches get until the shutdown timeout to finish
	match tokio::time::timeout(Settings::global().shutdown_timeout, &mut receiver).await {
		Ok(res) => res.context("alertmanager webhook receiver panicked")??,
		Err(_) => {
			tracing::warn!("graceful shutdown timed out, cancelling in-flight remediations");
			abort.cancel();
		}
	}

	tracing::info!("pod-bouncer stopped");

	Ok(())
}
