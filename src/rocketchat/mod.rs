//! everything talking to the rocket.chat server

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub mod client;
pub mod session;
pub mod settings;

mod metrics;

pub use client::RocketChatClient;

/// Error while logging in to the rocket.chat server
#[derive(Error, Debug)]
pub enum AuthError {
	#[error("login request failed: {0}")]
	Request(#[source] reqwest::Error),
	#[error("login rejected by server ({status}): {body}")]
	Rejected { status: reqwest::StatusCode, body: String },
	#[error("malformed login response: {0}")]
	MalformedResponse(String),
}

/// Error while posting a message
#[derive(Error, Debug)]
pub enum SendError {
	#[error("client is not authenticated")]
	NotAuthenticated,
	#[error("message request failed: {0}")]
	Request(#[source] reqwest::Error),
	#[error("message rejected by server ({status}): {body}")]
	Rejected { status: reqwest::StatusCode, body: String },
}

/// the operations the webhook receiver needs from a chat backend
#[async_trait]
pub trait ChatClient: Send + Sync {
	/// Logs in and replaces the stored session. May be called concurrently,
	/// the last successful login wins.
	async fn authenticate(&self) -> Result<(), AuthError>;

	/// posts `message` with the currently stored session
	async fn send_message(&self, message: &Message) -> Result<(), SendError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
/// body of a `chat.postMessage` request
pub struct Message {
	/// channel name including the leading `#`, or a room id
	pub channel: String,
	pub text: String,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Attachment {
	pub title: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub title_link: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub color: Option<String>,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub text: String,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub fields: Vec<AttachmentField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentField {
	pub short: bool,
	pub title: String,
	pub value: String,
}
