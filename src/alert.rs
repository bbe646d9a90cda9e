//! data structures for deserializing incoming alerts
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};

/// label or annotation set, keeps the order alertmanager sent it in
pub type KeyValue = IndexMap<String, String>;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
/// whether an alert is still active
pub enum Status {
	Firing,
	Resolved,
	/// missing, `null` or a status alertmanager doesn't send
	#[serde(other)]
	Unknown,
}

impl Default for Status {
	fn default() -> Self {
		Status::Unknown
	}
}

impl Status {
	pub fn as_str(&self) -> &'static str {
		match self {
			Status::Firing => "firing",
			Status::Resolved => "resolved",
			Status::Unknown => "unknown",
		}
	}
}

/// Data from prometheus received by the alertmanager webhook receiver.
///
/// Decoding is lenient: every field may be missing or `null` and falls back
/// to its empty value, only malformed json or wrongly typed values fail.
#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::missing_docs_in_private_items)]
pub struct Data {
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	pub version: String,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	pub group_key: String,

	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	pub receiver: String,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	pub status: String,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	pub alerts: Vec<Alert>,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	pub group_labels: KeyValue,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	pub common_labels: KeyValue,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	pub common_annotations: KeyValue,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(rename = "externalURL", default)]
	pub external_url: String,
}

impl Data {
	/// number of alerts with the given status
	pub fn count(&self, status: Status) -> usize {
		self.alerts.iter().filter(|alert| alert.status == status).count()
	}
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::missing_docs_in_private_items)]
pub struct Alert {
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	pub status: Status,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	pub labels: KeyValue,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	pub annotations: KeyValue,
	#[serde(default)]
	pub starts_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub ends_at: Option<DateTime<Utc>>,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(rename = "generatorURL", default)]
	pub generator_url: String,
	#[serde(default)]
	pub fingerprint: Option<String>,
}

impl Alert {
	/// value of the `alertname` label, empty if missing
	pub fn name(&self) -> &str {
		self.labels.get("alertname").map(String::as_str).unwrap_or_default()
	}

	/// first of the `description`, `summary` or `message` annotations
	pub fn description(&self) -> Option<&str> {
		["description", "summary", "message"]
			.iter()
			.find_map(|key| self.annotations.get(*key))
			.map(String::as_str)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const ALERTMANAGER_PAYLOAD: &str = r#"{
		"version": "4",
		"groupKey": "{}:{alertname=\"DiskFull\"}",
		"receiver": "rocketchat",
		"status": "firing",
		"alerts": [
			{
				"status": "firing",
				"labels": {"alertname": "DiskFull", "severity": "critical", "instance": "db-1"},
				"annotations": {"summary": "disk almost full", "description": "95% used"},
				"startsAt": "2022-05-20T10:00:00Z",
				"endsAt": "0001-01-01T00:00:00Z",
				"generatorURL": "http://prometheus/graph",
				"fingerprint": "c0ffee"
			},
			{
				"status": "resolved",
				"labels": {"alertname": "DiskFull", "instance": "db-2"},
				"annotations": {},
				"startsAt": "2022-05-20T09:00:00Z",
				"endsAt": "2022-05-20T09:30:00Z",
				"generatorURL": ""
			}
		],
		"groupLabels": {"alertname": "DiskFull"},
		"commonLabels": {"alertname": "DiskFull"},
		"commonAnnotations": {},
		"externalURL": "http://alertmanager:9093"
	}"#;

	#[test]
	fn decodes_full_alertmanager_payload() {
		let data: Data = serde_json::from_str(ALERTMANAGER_PAYLOAD).unwrap();

		assert_eq!(data.receiver, "rocketchat");
		assert_eq!(data.alerts.len(), 2);
		assert_eq!(data.count(Status::Firing), 1);
		assert_eq!(data.count(Status::Resolved), 1);
		assert_eq!(data.external_url, "http://alertmanager:9093");

		let first = &data.alerts[0];
		assert_eq!(first.name(), "DiskFull");
		assert_eq!(first.description(), Some("95% used"));
		assert_eq!(
			first.labels.keys().collect::<Vec<_>>(),
			vec!["alertname", "severity", "instance"]
		);
		assert_eq!(first.fingerprint.as_deref(), Some("c0ffee"));
	}

	#[test]
	fn decodes_minimal_payload() {
		let data: Data =
			serde_json::from_str(r#"{"alerts":[{"status":"firing","labels":{"alertname":"X"}}]}"#)
				.unwrap();

		assert_eq!(data.alerts.len(), 1);
		assert_eq!(data.alerts[0].name(), "X");
		assert!(data.alerts[0].annotations.is_empty());
		assert!(data.alerts[0].starts_at.is_none());
		assert!(data.common_labels.is_empty());
	}

	#[test]
	fn missing_and_null_fields_decode_as_empty() {
		for body in [r#"{}"#, r#"{"status":"firing"}"#, r#"{"alerts":null,"groupLabels":null}"#] {
			let data: Data = serde_json::from_str(body).unwrap();
			assert!(data.alerts.is_empty(), "{body}");
			assert!(data.group_labels.is_empty(), "{body}");
		}

		let data: Data = serde_json::from_str(
			r#"{"receiver":null,"alerts":[{"labels":{"alertname":"X"}},{"status":"firing","labels":null,"annotations":null}]}"#,
		)
		.unwrap();

		assert_eq!(data.receiver, "");
		assert_eq!(data.alerts[0].status, Status::Unknown);
		assert_eq!(data.alerts[0].name(), "X");
		assert_eq!(data.alerts[1].status, Status::Firing);
		assert!(data.alerts[1].labels.is_empty());
		assert!(data.alerts[1].annotations.is_empty());
	}

	#[test]
	fn unexpected_alert_status_is_unknown() {
		let data: Data =
			serde_json::from_str(r#"{"alerts":[{"status":"pending"},{"status":null}]}"#).unwrap();

		assert_eq!(data.count(Status::Unknown), 2);
		assert_eq!(data.count(Status::Firing), 0);
	}

	#[test]
	fn rejects_malformed_payload() {
		assert!(serde_json::from_str::<Data>("not-json").is_err());
		assert!(serde_json::from_str::<Data>(r#"{"alerts":{}}"#).is_err());
		assert!(serde_json::from_str::<Data>(r#"{"alerts":[{"labels":{"alertname":1}}]}"#).is_err());
	}
}
