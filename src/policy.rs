//! decides which alerts are worth bouncing a pod for
use serde::Deserialize;

use crate::alert::Alert;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// an alert is actionable iff both its status and its severity label match exactly
pub struct AlertPolicy {
	pub status: String,
	pub severity: String,
}

impl Default for AlertPolicy {
	fn default() -> Self {
		Self { status: "firing".to_owned(), severity: "critical".to_owned() }
	}
}

impl AlertPolicy {
	pub fn is_actionable(&self, alert: &Alert) -> bool {
		alert.status == self.status && alert.labels.severity == self.severity
	}
}
