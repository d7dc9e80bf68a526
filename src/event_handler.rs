//! Turns a webhook body into pod deletions.
//!
//! Every alert of an event is handled on its own: a failed deletion is logged
//! and the next alert is processed anyway. Only an undecodable body fails the
//! whole request.
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
	alert::{Alert, Event, ParseError},
	dispatcher::{Dispatcher, RemediationError, RemediationTarget},
	observer::Observer,
	policy::AlertPolicy,
};

#[derive(Debug, Error)]
pub enum HandlerError {
	#[error("could not parse alertmanager event: {0}")]
	Parse(#[from] ParseError),
}

/// what happened to a single alert
#[derive(Debug)]
pub enum AlertOutcome {
	/// not actionable under the configured [AlertPolicy]
	Skipped,
	Remediated(RemediationTarget),
	Failed { target: RemediationTarget, error: RemediationError },
	/// actionable, but the request was cancelled before the delete call went out
	Cancelled(RemediationTarget),
}

impl AlertOutcome {
	/// metric label
	pub fn label(&self) -> &'static str {
		match self {
			Self::Skipped => "skipped",
			Self::Remediated(_) => "remediated",
			Self::Failed { .. } => "failed",
			Self::Cancelled(_) => "cancelled",
		}
	}
}

/// outcomes of all alerts of an event, in payload order
#[derive(Debug, Default)]
pub struct HandleReport {
	pub outcomes: Vec<AlertOutcome>,
}

impl HandleReport {
	fn count(&self, label: &str) -> usize {
		self.outcomes.iter().filter(|outcome| outcome.label() == label).count()
	}

	pub fn remediated(&self) -> usize {
		self.count("remediated")
	}

	pub fn failed(&self) -> usize {
		self.count("failed")
	}

	pub fn skipped(&self) -> usize {
		self.count("skipped")
	}

	pub fn cancelled(&self) -> usize {
		self.count("cancelled")
	}
}

pub struct EventHandler {
	policy: AlertPolicy,
	dispatcher: Dispatcher,
	observer: Arc<dyn Observer>,
}

impl EventHandler {
	pub fn new(policy: AlertPolicy, dispatcher: Dispatcher, observer: Arc<dyn Observer>) -> Self {
		Self { policy, dispatcher, observer }
	}

	/// Parses `data` and bounces the pod of every actionable alert in it, one after another.
	///
	/// Once `cancel` fires no further delete calls are issued, the remaining
	/// actionable alerts are reported as [AlertOutcome::Cancelled].
	pub async fn handle(
		&self,
		data: &[u8],
		cancel: &CancellationToken,
	) -> Result<HandleReport, HandlerError> {
		let event = Event::parse(data).map_err(|err| {
			self.observer.event_rejected(&err);
			err
		})?;

		self.observer.event_parsed(&event);

		let mut report = HandleReport { outcomes: Vec::with_capacity(event.alerts.len()) };

		for alert in event.alerts.iter() {
			let outcome = self.process(alert, cancel).await;
			self.observer.outcome(alert, &outcome);
			report.outcomes.push(outcome);
		}

		Ok(report)
	}

	async fn process(&self, alert: &Alert, cancel: &CancellationToken) -> AlertOutcome {
		if !self.policy.is_actionable(alert) {
			return AlertOutcome::Skipped;
		}

		let target = RemediationTarget::from_labels(&alert.labels);

		if cancel.is_cancelled() {
			return AlertOutcome::Cancelled(target);
		}

		match self.dispatcher.remediate(&target, cancel).await {
			Ok(()) => AlertOutcome::Remediated(target),
			Err(error) => AlertOutcome::Failed { target, error },
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use async_trait::async_trait;

	use super::*;
	use crate::{
		alert::tests::{alert, payload, EVENT_JSON},
		cluster::{fake::FakeDeleter, ClusterError, PodDeleter},
		dispatcher::TargetError,
		observer::recording::RecordingObserver,
	};

	fn handler(deleter: Arc<dyn PodDeleter>, observer: &Arc<RecordingObserver>) -> EventHandler {
		let dispatcher = Dispatcher::new(deleter, Duration::from_secs(1), observer.clone());

		EventHandler::new(AlertPolicy::default(), dispatcher, observer.clone())
	}

	fn pair(namespace: &str, pod: &str) -> (String, String) {
		(namespace.to_owned(), pod.to_owned())
	}

	#[tokio::test]
	async fn deletes_pod_of_firing_critical_alert() {
		let deleter = Arc::new(FakeDeleter::default());
		let observer = Arc::new(RecordingObserver::default());
		let data = payload(vec![alert("firing", "critical", "prod", "api-7f9")]);

		let report = handler(deleter.clone(), &observer)
			.handle(&data, &CancellationToken::new())
			.await
			.unwrap();

		assert_eq!(deleter.calls(), vec![pair("prod", "api-7f9")]);
		assert_eq!(observer.dispatched.lock().unwrap()[0].to_string(), "prod/api-7f9");
		assert_eq!(report.remediated(), 1);
	}

	#[tokio::test]
	async fn ignores_resolved_alert() {
		let deleter = Arc::new(FakeDeleter::default());
		let observer = Arc::new(RecordingObserver::default());
		let data = payload(vec![alert("resolved", "critical", "prod", "api-7f9")]);

		let report = handler(deleter.clone(), &observer)
			.handle(&data, &CancellationToken::new())
			.await
			.unwrap();

		assert!(deleter.calls().is_empty());
		assert_eq!(report.skipped(), 1);
	}

	#[tokio::test]
	async fn handles_fixture() {
		let deleter = Arc::new(FakeDeleter::default());
		let observer = Arc::new(RecordingObserver::default());

		handler(deleter.clone(), &observer).handle(EVENT_JSON, &CancellationToken::new()).await.unwrap();

		assert_eq!(deleter.calls(), vec![pair("prod", "api-7f9")]);
	}

	#[tokio::test]
	async fn event_without_alerts() {
		let deleter = Arc::new(FakeDeleter::default());
		let observer = Arc::new(RecordingObserver::default());

		for data in [payload(Vec::new()), b"{}".to_vec(), br#"{"alerts":[]}"#.to_vec()] {
			let report = handler(deleter.clone(), &observer)
				.handle(&data, &CancellationToken::new())
				.await
				.unwrap();

			assert!(report.outcomes.is_empty());
		}

		assert!(deleter.calls().is_empty());
	}

	#[tokio::test]
	async fn only_actionable_alerts_are_dispatched() {
		let statuses = ["firing", "resolved", "pending", ""];
		let severities = ["critical", "warning", "info", ""];

		let mut alerts = Vec::new();
		for status in statuses {
			for severity in severities {
				let pod = format!("{status}-{severity}");
				alerts.push(alert(status, severity, "prod", &pod));
			}
		}

		let deleter = Arc::new(FakeDeleter::default());
		let observer = Arc::new(RecordingObserver::default());

		let report = handler(deleter.clone(), &observer)
			.handle(&payload(alerts), &CancellationToken::new())
			.await
			.unwrap();

		assert_eq!(deleter.calls(), vec![pair("prod", "firing-critical")]);
		assert_eq!(report.skipped(), statuses.len() * severities.len() - 1);
	}

	#[tokio::test]
	async fn failed_deletion_does_not_stop_the_batch() {
		let deleter = Arc::new(FakeDeleter::default().failing("prod", "api-1"));
		let observer = Arc::new(RecordingObserver::default());
		let data = payload(vec![
			alert("firing", "critical", "prod", "api-0"),
			alert("firing", "critical", "prod", "api-1"),
			alert("firing", "critical", "prod", "api-2"),
			alert("firing", "critical", "prod", "api-3"),
		]);

		let report = handler(deleter.clone(), &observer)
			.handle(&data, &CancellationToken::new())
			.await
			.unwrap();

		assert_eq!(
			deleter.calls(),
			vec![pair("prod", "api-0"), pair("prod", "api-1"), pair("prod", "api-2"), pair("prod", "api-3")]
		);
		assert_eq!(report.remediated(), 3);
		assert_eq!(report.failed(), 1);
		assert!(matches!(
			&report.outcomes[1],
			AlertOutcome::Failed { error: RemediationError::Cluster { source: ClusterError::NotFound(_), .. }, .. }
		));
	}

	#[tokio::test]
	async fn first_alert_not_found_second_deleted() {
		let deleter = Arc::new(FakeDeleter::default().failing("prod", "gone"));
		let observer = Arc::new(RecordingObserver::default());
		let data = payload(vec![
			alert("firing", "critical", "prod", "gone"),
			alert("firing", "critical", "prod", "api-7f9"),
		]);

		handler(deleter.clone(), &observer).handle(&data, &CancellationToken::new()).await.unwrap();

		assert_eq!(deleter.calls().len(), 2);
		assert_eq!(
			*observer.outcomes.lock().unwrap(),
			vec![("prod/gone".to_owned(), "failed"), ("prod/api-7f9".to_owned(), "remediated")]
		);
	}

	#[tokio::test]
	async fn alert_without_target_labels_fails_alone() {
		let deleter = Arc::new(FakeDeleter::default());
		let observer = Arc::new(RecordingObserver::default());
		let data = payload(vec![
			alert("firing", "critical", "", "api-7f9"),
			alert("firing", "critical", "prod", ""),
			alert("firing", "critical", "prod", "api-7f9"),
		]);

		let report = handler(deleter.clone(), &observer)
			.handle(&data, &CancellationToken::new())
			.await
			.unwrap();

		assert_eq!(deleter.calls(), vec![pair("prod", "api-7f9")]);
		assert_eq!(observer.dispatched.lock().unwrap().len(), 1);
		assert!(matches!(
			&report.outcomes[0],
			AlertOutcome::Failed { error: RemediationError::Target(TargetError::MissingNamespace), .. }
		));
		assert!(matches!(
			&report.outcomes[1],
			AlertOutcome::Failed { error: RemediationError::Target(TargetError::MissingPod), .. }
		));
	}

	#[tokio::test]
	async fn unparsable_body_fails_without_deleting() {
		let deleter = Arc::new(FakeDeleter::default());
		let observer = Arc::new(RecordingObserver::default());
		let handler = handler(deleter.clone(), &observer);

		let bodies: [&[u8]; 3] = [b"", b"not json", b"{\"alerts\": 3}"];

		for data in bodies {
			let err = handler.handle(data, &CancellationToken::new()).await.unwrap_err();
			assert!(matches!(err, HandlerError::Parse(_)));
		}

		assert!(deleter.calls().is_empty());
		assert_eq!(*observer.rejected.lock().unwrap(), 3);
	}

	#[tokio::test]
	async fn positional_array_body_issues_no_calls() {
		let deleter = Arc::new(FakeDeleter::default());
		let observer = Arc::new(RecordingObserver::default());
		let data = br#"["r","firing",[["firing",["","","","","prod","api-7f9","","","critical"]]]]"#;

		let err = handler(deleter.clone(), &observer)
			.handle(data, &CancellationToken::new())
			.await
			.unwrap_err();

		assert!(matches!(err, HandlerError::Parse(ParseError::Json(_))));
		assert!(deleter.calls().is_empty());
	}

	#[tokio::test]
	async fn cancelled_request_issues_no_calls() {
		let deleter = Arc::new(FakeDeleter::default());
		let observer = Arc::new(RecordingObserver::default());
		let data = payload(vec![
			alert("firing", "critical", "prod", "api-0"),
			alert("resolved", "critical", "prod", "api-1"),
		]);
		let cancel = CancellationToken::new();
		cancel.cancel();

		let report = handler(deleter.clone(), &observer).handle(&data, &cancel).await.unwrap();

		assert!(deleter.calls().is_empty());
		assert_eq!(report.cancelled(), 1);
		assert_eq!(report.skipped(), 1);
	}

	/// deletes successfully, then cancels the request
	struct CancellingDeleter {
		inner: FakeDeleter,
		cancel: CancellationToken,
	}

	#[async_trait]
	impl PodDeleter for CancellingDeleter {
		async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
			let result = self.inner.delete_pod(namespace, name).await;
			self.cancel.cancel();
			result
		}
	}

	#[tokio::test]
	async fn cancellation_keeps_completed_deletions() {
		let cancel = CancellationToken::new();
		let deleter = Arc::new(CancellingDeleter { inner: FakeDeleter::default(), cancel: cancel.clone() });
		let observer = Arc::new(RecordingObserver::default());
		let data = payload(vec![
			alert("firing", "critical", "prod", "api-0"),
			alert("firing", "critical", "prod", "api-1"),
			alert("firing", "critical", "prod", "api-2"),
		]);

		let report = handler(deleter.clone(), &observer).handle(&data, &cancel).await.unwrap();

		assert_eq!(deleter.inner.calls(), vec![pair("prod", "api-0")]);
		assert!(matches!(&report.outcomes[0], AlertOutcome::Remediated(target) if target.pod == "api-0"));
		assert_eq!(report.cancelled(), 2);
	}
}
