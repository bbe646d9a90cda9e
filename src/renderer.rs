//! Renders alert groups into rocket.chat messages.
//!
//! The message text comes from a tera template, every alert gets its own
//! attachment with the alert labels as fields.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Deserialize;
use tera::Tera;

use crate::{
	alert::{self, Status},
	rocketchat::{Attachment, AttachmentField, Message},
	settings::Settings,
};

/// size limit of the message text in bytes (rocket.chat `Message_MaxAllowedSize`)
pub const MAX_MESSAGE_LEN: usize = 5000;

/// size limit of the text of a single attachment in bytes
pub const MAX_ATTACHMENT_TEXT_LEN: usize = 2000;

/// channel used if neither the alert nor the config name one
pub const FALLBACK_CHANNEL: &str = "prometheus-alerts";

/// common label overriding the target channel
pub const CHANNEL_LABEL: &str = "channel_name";

const TEMPLATE_NAME: &str = "message";

const DEFAULT_TEMPLATE: &str = "**[{{ state | upper }}{% if firing > 0 %}:{{ firing }}{% endif %}]** {{ title }}";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelSettings {
	/// channel for alerts without `channel_name` label
	pub default_channel_name: Option<String>,
}

/// Alert renderer
#[derive(Debug)]
pub struct MessageRenderer {
	tera: Tera,
	default_channel: String,
	severity_colors: HashMap<String, String>,
	resolved_color: Option<String>,
}

impl MessageRenderer {
	/// Return new renderer, loads the configured template file if there is one
	pub fn new(settings: &Settings) -> Result<Self> {
		let mut tera = Tera::default();

		match &settings.template {
			Some(path) => tera
				.add_template_file(path, Some(TEMPLATE_NAME))
				.with_context(|| format!("could not load message template {path:?}"))?,
			None => tera
				.add_raw_template(TEMPLATE_NAME, DEFAULT_TEMPLATE)
				.context("could not load default message template")?,
		}

		let default_channel = settings
			.channel
			.default_channel_name
			.clone()
			.unwrap_or_else(|| FALLBACK_CHANNEL.to_owned());

		Ok(Self {
			tera,
			default_channel,
			severity_colors: settings.severity_colors.clone(),
			resolved_color: settings.resolved_color.clone(),
		})
	}

	/// Render alert group into a message. A render error doesn't fail, the
	/// error becomes the message text instead.
	pub fn render(&self, alert: &alert::Data) -> Message {
		let text = match self.render_text(alert) {
			Ok(text) => text,
			Err(err) => format!("failed to render alert:\n{err:#?}"),
		};

		Message {
			channel: self.channel(alert),
			text: truncated(text, MAX_MESSAGE_LEN),
			attachments: alert.alerts.iter().map(|alert| self.attachment(alert)).collect(),
		}
	}

	fn render_text(&self, alert: &alert::Data) -> Result<String, tera::Error> {
		let firing = alert.count(Status::Firing);

		let state = if !alert.status.is_empty() {
			alert.status.as_str()
		} else if firing > 0 {
			Status::Firing.as_str()
		} else {
			Status::Resolved.as_str()
		};

		let title = if alert.group_labels.is_empty() {
			alert.alerts.first().map(|alert| alert.name()).unwrap_or_default().to_owned()
		} else {
			alert.group_labels.values().cloned().collect::<Vec<_>>().join(" ")
		};

		let mut context = tera::Context::from_serialize(alert)?;
		context.insert("state", state);
		context.insert("firing", &firing);
		context.insert("resolved", &alert.count(Status::Resolved));
		context.insert("title", &title);

		self.tera.render(TEMPLATE_NAME, &context)
	}

	/// `channel_name` common label, otherwise the configured default
	fn channel(&self, alert: &alert::Data) -> String {
		let name = alert
			.common_labels
			.get(CHANNEL_LABEL)
			.filter(|name| !name.is_empty())
			.unwrap_or(&self.default_channel);

		if name.starts_with('#') || name.starts_with('@') {
			name.clone()
		} else {
			format!("#{name}")
		}
	}

	fn attachment(&self, alert: &alert::Alert) -> Attachment {
		let color = match alert.status {
			Status::Firing => {
				alert.labels.get("severity").and_then(|severity| self.severity_colors.get(severity))
			}
			Status::Resolved => self.resolved_color.as_ref(),
			Status::Unknown => None,
		};

		let mut fields: Vec<_> = alert
			.labels
			.iter()
			.map(|(key, value)| AttachmentField {
				short: true,
				title: key.clone(),
				value: value.clone(),
			})
			.collect();
		fields.sort_by(|a, b| a.title.cmp(&b.title));

		Attachment {
			title: format!("[{}] {}", alert.status.as_str().to_uppercase(), alert.name()),
			title_link: Some(alert.generator_url.clone()).filter(|url| !url.is_empty()),
			color: color.cloned(),
			text: truncated(
				alert.description().unwrap_or_default().to_owned(),
				MAX_ATTACHMENT_TEXT_LEN,
			),
			fields,
		}
	}
}

/// cut `text` to at most `max` bytes without splitting a char
pub fn truncated(mut text: String, max: usize) -> String {
	if text.len() <= max {
		return text;
	}

	let mut end = max;
	while !text.is_char_boundary(end) {
		end -= 1;
	}
	text.truncate(end);

	text
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use tempfile::NamedTempFile;

	use super::*;

	fn settings() -> Settings {
		let mut settings = Settings::default();
		settings.severity_colors.insert("critical".into(), "#ff0000".into());
		settings.resolved_color = Some("#36a64f".into());
		settings
	}

	fn data(json: &str) -> alert::Data {
		serde_json::from_str(json).unwrap()
	}

	#[test]
	fn renders_minimal_payload() {
		let renderer = MessageRenderer::new(&settings()).unwrap();

		let message =
			renderer.render(&data(r#"{"alerts":[{"status":"firing","labels":{"alertname":"X"}}]}"#));

		assert_eq!(message.channel, "#prometheus-alerts");
		assert_eq!(message.text, "**[FIRING:1]** X");
		assert_eq!(message.attachments.len(), 1);
		assert_eq!(message.attachments[0].title, "[FIRING] X");
		assert_eq!(message.attachments[0].color, None);
	}

	#[test]
	fn attachments_follow_alert_status() {
		let renderer = MessageRenderer::new(&settings()).unwrap();

		let message = renderer.render(&data(
			r#"{
				"status": "firing",
				"groupLabels": {"alertname": "DiskFull"},
				"alerts": [
					{
						"status": "firing",
						"labels": {"severity": "critical", "alertname": "DiskFull"},
						"annotations": {"summary": "disk almost full"},
						"generatorURL": "http://prometheus/graph"
					},
					{"status": "resolved", "labels": {"alertname": "DiskFull"}}
				]
			}"#,
		));

		assert_eq!(message.text, "**[FIRING:1]** DiskFull");

		let firing = &message.attachments[0];
		assert_eq!(firing.color.as_deref(), Some("#ff0000"));
		assert_eq!(firing.text, "disk almost full");
		assert_eq!(firing.title_link.as_deref(), Some("http://prometheus/graph"));
		assert_eq!(
			firing.fields.iter().map(|field| field.title.as_str()).collect::<Vec<_>>(),
			vec!["alertname", "severity"]
		);

		let resolved = &message.attachments[1];
		assert_eq!(resolved.title, "[RESOLVED] DiskFull");
		assert_eq!(resolved.color.as_deref(), Some("#36a64f"));
		assert_eq!(resolved.title_link, None);
	}

	#[test]
	fn channel_label_overrides_default() {
		let mut settings = settings();
		settings.channel.default_channel_name = Some("ops".into());
		let renderer = MessageRenderer::new(&settings).unwrap();

		let labelled = renderer.render(&data(
			r#"{"commonLabels": {"channel_name": "@oncall"}, "alerts": []}"#,
		));
		let unlabelled = renderer.render(&data(r#"{"alerts": []}"#));

		assert_eq!(labelled.channel, "@oncall");
		assert_eq!(unlabelled.channel, "#ops");
	}

	#[test]
	fn custom_template_file_is_used() {
		let file = template("{{ receiver }}: {{ resolved }} resolved");

		let mut settings = settings();
		settings.template = Some(file.path().to_path_buf());
		let renderer = MessageRenderer::new(&settings).unwrap();

		let message = renderer.render(&data(
			r#"{"receiver": "team-a", "alerts": [{"status": "resolved"}]}"#,
		));

		assert_eq!(message.text, "team-a: 1 resolved");
	}

	#[test]
	fn render_error_becomes_message_text() {
		let file = template("{{ missing_variable }}");

		let mut settings = settings();
		settings.template = Some(file.path().to_path_buf());
		let renderer = MessageRenderer::new(&settings).unwrap();

		let message = renderer.render(&data(r#"{"alerts": []}"#));

		assert!(message.text.starts_with("failed to render alert:"));
	}

	#[test]
	fn truncation_respects_char_boundaries() {
		let text = "ä".repeat(MAX_MESSAGE_LEN);

		let cut = truncated(text, MAX_MESSAGE_LEN);

		assert!(cut.len() <= MAX_MESSAGE_LEN);
		assert!(cut.chars().all(|c| c == 'ä'));
		assert_eq!(truncated("short".into(), MAX_MESSAGE_LEN), "short");
	}

	#[test]
	fn long_descriptions_are_truncated() {
		let renderer = MessageRenderer::new(&settings()).unwrap();
		let description = "ä".repeat(MAX_MESSAGE_LEN);

		let message = renderer.render(&data(&format!(
			r#"{{"alerts":[{{"status":"firing","annotations":{{"description":"{description}"}}}},{{"status":"resolved","annotations":{{"summary":"short"}}}}]}}"#
		)));

		let long = &message.attachments[0].text;
		assert!(long.len() <= MAX_ATTACHMENT_TEXT_LEN);
		assert!(long.len() > MAX_ATTACHMENT_TEXT_LEN - 'ä'.len_utf8());
		assert!(long.chars().all(|c| c == 'ä'));
		assert_eq!(message.attachments[1].text, "short");
	}

	#[test]
	fn alerts_without_status_get_neutral_attachment() {
		let renderer = MessageRenderer::new(&settings()).unwrap();

		let message = renderer.render(&data(
			r#"{"alerts":[{"labels":{"alertname":"X","severity":"critical"}}]}"#,
		));

		assert_eq!(message.text, "**[RESOLVED]** X");
		assert_eq!(message.attachments[0].title, "[UNKNOWN] X");
		assert_eq!(message.attachments[0].color, None);
	}

	/// the file is removed when the returned handle is dropped
	fn template(content: &str) -> NamedTempFile {
		let mut file = tempfile::Builder::new().suffix(".tera").tempfile().unwrap();
		file.write_all(content.as_bytes()).unwrap();
		file
	}
}
