//! issues the delete call for a single actionable alert
use std::{fmt, sync::Arc, time::Duration};

use serde::Deserialize;
use serde_with::{serde_as, DurationSecondsWithFrac};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
	alert::Labels,
	cluster::{ClusterError, PodDeleter},
	observer::Observer,
	settings::Settings,
};

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemediationSettings {
	/// upper bound for a single delete call
	#[serde_as(as = "DurationSecondsWithFrac<f64>")]
	pub timeout: Duration,
	/// passed on to the api server, `None` keeps the pod's own grace period
	pub grace_period_seconds: Option<u32>,
}

impl Default for RemediationSettings {
	fn default() -> Self {
		Self { timeout: Duration::from_secs(10), grace_period_seconds: None }
	}
}

impl RemediationSettings {
	pub fn global() -> &'static Self {
		&Settings::global().remediation
	}
}

/// the pod named by an alert's `namespace` and `pod` labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationTarget {
	pub namespace: String,
	pub pod: String,
}

impl RemediationTarget {
	pub fn from_labels(labels: &Labels) -> Self {
		Self { namespace: labels.namespace.clone(), pod: labels.pod.clone() }
	}

	fn validate(&self) -> Result<(), TargetError> {
		if self.namespace.is_empty() {
			return Err(TargetError::MissingNamespace);
		}

		if self.pod.is_empty() {
			return Err(TargetError::MissingPod);
		}

		Ok(())
	}
}

impl fmt::Display for RemediationTarget {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.namespace, self.pod)
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
	#[error("alert has no namespace label")]
	MissingNamespace,
	#[error("alert has no pod label")]
	MissingPod,
}

#[derive(Debug, Error)]
pub enum RemediationError {
	#[error("invalid remediation target: {0}")]
	Target(#[from] TargetError),
	#[error("deleting pod {target} failed: {source}")]
	Cluster {
		target: RemediationTarget,
		#[source]
		source: ClusterError,
	},
	#[error("deleting pod {target} timed out after {timeout:?}")]
	Timeout { target: RemediationTarget, timeout: Duration },
	#[error("deleting pod {target} was cancelled")]
	Cancelled { target: RemediationTarget },
}

/// Deletes the pod of an actionable alert, once. There are no retries, the
/// owning controller is expected to reschedule the pod.
pub struct Dispatcher {
	deleter: Arc<dyn PodDeleter>,
	timeout: Duration,
	observer: Arc<dyn Observer>,
}

impl Dispatcher {
	pub fn new(deleter: Arc<dyn PodDeleter>, timeout: Duration, observer: Arc<dyn Observer>) -> Self {
		Self { deleter, timeout, observer }
	}

	pub async fn remediate(
		&self,
		target: &RemediationTarget,
		cancel: &CancellationToken,
	) -> Result<(), RemediationError> {
		target.validate()?;

		self.observer.dispatching(target);
		let started = Instant::now();

		let delete = tokio::time::timeout(
			self.timeout,
			self.deleter.delete_pod(&target.namespace, &target.pod),
		);

		let result = tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(RemediationError::Cancelled { target: target.clone() }),
			result = delete => match result {
				Ok(Ok(())) => Ok(()),
				Ok(Err(source)) => Err(RemediationError::Cluster { target: target.clone(), source }),
				Err(_) => Err(RemediationError::Timeout { target: target.clone(), timeout: self.timeout }),
			},
		};

		self.observer.dispatched(target, started.elapsed());

		result
	}
}
