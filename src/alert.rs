//! data structures for deserializing incoming alertmanager webhook notifications
use chrono::{DateTime, Utc};
use serde::{
	de::{Error as _, Unexpected},
	Deserialize, Serialize,
};
use serde_json::Value;
use serde_with::{serde_as, DefaultOnNull};
use thiserror::Error;

#[derive(Debug, Error)]
/// the request body could not be turned into an [Event]
pub enum ParseError {
	#[error("empty request body")]
	Empty,
	#[error("malformed alertmanager payload")]
	Json(#[from] serde_json::Error),
}

#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
/// payload of an alertmanager webhook notification
#[allow(clippy::missing_docs_in_private_items)]
pub struct Event {
	#[serde_as(as = "DefaultOnNull")]
	#[serde(skip_serializing_if = "String::is_empty")]
	pub receiver: String,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(skip_serializing_if = "String::is_empty")]
	pub status: String,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub alerts: Vec<Alert>,
	#[serde_as(as = "DefaultOnNull")]
	pub group_labels: Labels,
	#[serde_as(as = "DefaultOnNull")]
	pub common_labels: Labels,
	#[serde_as(as = "DefaultOnNull")]
	pub common_annotations: Annotations,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(rename = "externalURL", skip_serializing_if = "String::is_empty")]
	pub external_url: String,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(skip_serializing_if = "String::is_empty")]
	pub version: String,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(skip_serializing_if = "String::is_empty")]
	pub group_key: String,
}

#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
/// a single alert within an [Event]
#[allow(clippy::missing_docs_in_private_items)]
pub struct Alert {
	#[serde_as(as = "DefaultOnNull")]
	#[serde(skip_serializing_if = "String::is_empty")]
	pub status: String,
	#[serde_as(as = "DefaultOnNull")]
	pub labels: Labels,
	#[serde_as(as = "DefaultOnNull")]
	pub annotations: Annotations,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub starts_at: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub ends_at: Option<DateTime<Utc>>,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(rename = "generatorURL", skip_serializing_if = "String::is_empty")]
	pub generator_url: String,
	/// stable identifier of the alert, carried along for logging only
	#[serde_as(as = "DefaultOnNull")]
	#[serde(skip_serializing_if = "String::is_empty")]
	pub fingerprint: String,
}

#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
/// labels of an alert. `namespace` and `pod` name the pod to bounce.
#[allow(clippy::missing_docs_in_private_items)]
pub struct Labels {
	#[serde_as(as = "DefaultOnNull")]
	#[serde(rename = "alertname", skip_serializing_if = "String::is_empty")]
	pub alert_name: String,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(skip_serializing_if = "String::is_empty")]
	pub endpoint: String,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(skip_serializing_if = "String::is_empty")]
	pub instance: String,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(skip_serializing_if = "String::is_empty")]
	pub job: String,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(skip_serializing_if = "String::is_empty")]
	pub namespace: String,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(skip_serializing_if = "String::is_empty")]
	pub pod: String,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(skip_serializing_if = "String::is_empty")]
	pub prometheus: String,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(skip_serializing_if = "String::is_empty")]
	pub service: String,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(skip_serializing_if = "String::is_empty")]
	pub severity: String,
}

#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
/// free text attached to an alert, never used for decisions
pub struct Annotations {
	#[serde_as(as = "DefaultOnNull")]
	#[serde(skip_serializing_if = "String::is_empty")]
	pub description: String,
}

impl Event {
	/// Decodes a raw webhook body. Unknown fields are ignored, absent ones are left empty.
	pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
		if data.is_empty() {
			return Err(ParseError::Empty);
		}

		let value: Value = serde_json::from_slice(data)?;
		ensure_objects(&value)?;

		Ok(serde_json::from_value(value)?)
	}
}

/// The derived impls would also take a positional array for a struct, which
/// alertmanager never sends. Only objects (or `null` below the top level) pass.
fn ensure_objects(event: &Value) -> Result<(), serde_json::Error> {
	expect_object(event, "an alertmanager event object")?;

	for key in ["groupLabels", "commonLabels", "commonAnnotations"] {
		expect_nested_object(event.get(key))?;
	}

	if let Some(Value::Array(alerts)) = event.get("alerts") {
		for alert in alerts {
			expect_object(alert, "an alert object")?;

			for key in ["labels", "annotations"] {
				expect_nested_object(alert.get(key))?;
			}
		}
	}

	Ok(())
}

fn expect_object(value: &Value, expected: &'static str) -> Result<(), serde_json::Error> {
	let unexpected = match value {
		Value::Object(_) => return Ok(()),
		Value::Null => Unexpected::Unit,
		Value::Bool(b) => Unexpected::Bool(*b),
		Value::Number(_) => Unexpected::Other("number"),
		Value::String(s) => Unexpected::Str(s),
		Value::Array(_) => Unexpected::Seq,
	};

	Err(serde_json::Error::invalid_type(unexpected, &expected))
}

fn expect_nested_object(value: Option<&Value>) -> Result<(), serde_json::Error> {
	match value {
		None | Some(Value::Null) => Ok(()),
		Some(value) => expect_object(value, "an object"),
	}
}
