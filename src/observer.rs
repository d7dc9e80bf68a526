//! Where the webhook reports what it did. [TracingObserver] logs every step and
//! counts it in prometheus, tests plug in their own [Observer].
use std::time::Duration;

use prometheus::{
	exponential_buckets, histogram_opts, opts, Histogram, IntCounterVec, Registry,
};

use crate::{
	alert::{Alert, Event, ParseError},
	dispatcher::RemediationTarget,
	event_handler::AlertOutcome,
};

pub trait Observer: Send + Sync {
	/// an event was received and decoded
	fn event_parsed(&self, event: &Event);
	/// an event was dropped because its body could not be decoded
	fn event_rejected(&self, error: &ParseError);
	/// a delete call is about to be issued
	fn dispatching(&self, target: &RemediationTarget);
	/// a delete call returned, failed or was abandoned after `elapsed`
	fn dispatched(&self, target: &RemediationTarget, elapsed: Duration);
	/// final result for one alert of an event
	fn outcome(&self, alert: &Alert, outcome: &AlertOutcome);
}

#[derive(Debug, Clone)]
/// prometheus meters for the alertmanager webhook
struct WebhookMetrics {
	/// received events by parse result
	events: IntCounterVec,
	/// alerts by outcome
	alerts: IntCounterVec,
	/// duration of delete calls
	remediation_seconds: Histogram,
}

impl WebhookMetrics {
	fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
		let events = IntCounterVec::new(
			opts!("events_total", "total number of received alertmanager events")
				.namespace("pod_bouncer")
				.subsystem("alertmanager_webhook"),
			&["result"],
		)?;

		let alerts = IntCounterVec::new(
			opts!("alerts_total", "alerts by what pod-bouncer did about them")
				.namespace("pod_bouncer")
				.subsystem("alertmanager_webhook"),
			&["outcome"],
		)?;

		let remediation_seconds = Histogram::with_opts(
			histogram_opts!(
				"remediation_seconds",
				"time spent deleting pods",
				exponential_buckets(0.005, 2., 12)?
			)
			.namespace("pod_bouncer")
			.subsystem("alertmanager_webhook"),
		)?;

		registry.register(Box::new(events.clone()))?;
		registry.register(Box::new(alerts.clone()))?;
		registry.register(Box::new(remediation_seconds.clone()))?;

		Ok(Self { events, alerts, remediation_seconds })
	}
}

/// [Observer] writing to `tracing` and prometheus
#[derive(Debug, Clone)]
pub struct TracingObserver {
	metrics: WebhookMetrics,
}

impl TracingObserver {
	pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
		Ok(Self { metrics: WebhookMetrics::new(registry)? })
	}
}

impl Observer for TracingObserver {
	fn event_parsed(&self, event: &Event) {
		self.metrics.events.with_label_values(&["parsed"]).inc();

		tracing::info!(
			receiver = %event.receiver,
			status = %event.status,
			group_key = %event.group_key,
			alerts = event.alerts.len(),
			"parsed event"
		);
	}

	fn event_rejected(&self, error: &ParseError) {
		self.metrics.events.with_label_values(&["rejected"]).inc();

		tracing::warn!(%error, "rejected event");
	}

	fn dispatching(&self, target: &RemediationTarget) {
		tracing::debug!(namespace = %target.namespace, pod = %target.pod, "deleting pod");
	}

	fn dispatched(&self, _target: &RemediationTarget, elapsed: Duration) {
		self.metrics.remediation_seconds.observe(elapsed.as_secs_f64());
	}

	fn outcome(&self, alert: &Alert, outcome: &AlertOutcome) {
		self.metrics.alerts.with_label_values(&[outcome.label()]).inc();

		let fingerprint = alert.fingerprint.as_str();

		match outcome {
			AlertOutcome::Skipped => tracing::trace!(
				fingerprint,
				status = %alert.status,
				severity = %alert.labels.severity,
				"skipping alert"
			),
			AlertOutcome::Remediated(target) => tracing::info!(
				fingerprint,
				namespace = %target.namespace,
				pod = %target.pod,
				"pod deleted"
			),
			AlertOutcome::Failed { target, error } => tracing::error!(
				fingerprint,
				namespace = %target.namespace,
				pod = %target.pod,
				%error,
				"error deleting pod"
			),
			AlertOutcome::Cancelled(target) => tracing::warn!(
				fingerprint,
				namespace = %target.namespace,
				pod = %target.pod,
				"request cancelled before pod could be deleted"
			),
		}
	}
}
