//! rocket.chat REST client used by the webhook receiver

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use prometheus::Registry;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{
	metrics::ClientMetrics,
	session::{Session, SessionStore},
	settings::{Credentials, Endpoint},
	AuthError, ChatClient, Message, SendError,
};

/// path of the login endpoint
const LOGIN: &str = "api/v1/login";
/// path of the message endpoint
const POST_MESSAGE: &str = "api/v1/chat.postMessage";

#[derive(Serialize)]
struct LoginRequest<'a> {
	user: &'a str,
	password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
	status: String,
	data: Option<LoginData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
	user_id: String,
	auth_token: String,
}

#[derive(Deserialize)]
struct PostMessageResponse {
	success: bool,
	#[serde(default)]
	error: Option<String>,
}

/// [ChatClient] for the rocket.chat REST api
#[derive(Debug)]
pub struct RocketChatClient {
	/// http client
	client: reqwest::Client,
	/// base url of the server, ends with `/`
	base_url: Url,
	credentials: Credentials,
	session: SessionStore,
	/// prometheus meters for http requests
	metrics: ClientMetrics,
}

impl RocketChatClient {
	/// construct client, does not log in
	pub fn new(
		endpoint: &Endpoint,
		credentials: Credentials,
		timeout: Duration,
		registry: &Registry,
	) -> Result<Self> {
		let base_url = endpoint
			.base_url()
			.with_context(|| {
				format!("invalid rocket.chat endpoint {}://{}", endpoint.scheme, endpoint.host)
			})?;

		Ok(Self {
			client: reqwest::Client::builder()
				.timeout(timeout)
				.build()
				.context("failed to build reqwest client")?,
			metrics: ClientMetrics::new(registry, &credentials.id)
				.context("failed to register prometheus meters")?,
			base_url,
			credentials,
			session: SessionStore::new(),
		})
	}

	/// POST `body` to `path`, returns status code and response body
	async fn post<T: Serialize + ?Sized>(
		&self,
		path: &'static str,
		session: Option<&Session>,
		body: &T,
	) -> Result<(StatusCode, String), reqwest::Error> {
		let _timer = self.metrics.http_request_duration.with_label_values(&[path]).start_timer();
		self.metrics.record_request(path);

		#[allow(clippy::expect_used)]
		let url = self.base_url.join(path).expect("static api path is a valid relative url");

		let mut request = self.client.post(url).json(body);
		if let Some(session) = session {
			request = request
				.header("X-User-Id", session.user_id.as_str())
				.header("X-Auth-Token", session.auth_token.as_str());
		}

		let response = match request.send().await {
			Ok(response) => response,
			Err(err) => {
				self.metrics.record_request_error(path, "");
				return Err(err);
			}
		};

		let status = response.status();
		if !status.is_success() {
			self.metrics.record_request_error(path, status.as_str());
		}

		Ok((status, response.text().await?))
	}
}

#[async_trait]
impl ChatClient for RocketChatClient {
	async fn authenticate(&self) -> Result<(), AuthError> {
		let login = LoginRequest {
			user: self.credentials.email.as_str(),
			password: self.credentials.password.as_str(),
		};

		let (status, body) = self.post(LOGIN, None, &login).await.map_err(AuthError::Request)?;

		if !status.is_success() {
			return Err(AuthError::Rejected { status, body });
		}

		let response: LoginResponse = serde_json::from_str(&body)
			.map_err(|err| AuthError::MalformedResponse(err.to_string()))?;

		match response {
			LoginResponse { status, data: Some(LoginData { user_id, auth_token }) }
				if status == "success" =>
			{
				tracing::debug!("user {} logged in as {user_id}", self.credentials.id);
				self.session.replace(Session { user_id, auth_token }).await;
				Ok(())
			}
			LoginResponse { status, .. } => {
				Err(AuthError::MalformedResponse(format!("login returned status {status:?}")))
			}
		}
	}

	async fn send_message(&self, message: &Message) -> Result<(), SendError> {
		let session = self.session.current().await.ok_or(SendError::NotAuthenticated)?;

		let (status, body) =
			self.post(POST_MESSAGE, Some(&session), message).await.map_err(SendError::Request)?;

		if !status.is_success() {
			return Err(SendError::Rejected { status, body });
		}

		// some proxies answer 200 with an html page
		match serde_json::from_str::<PostMessageResponse>(&body) {
			Ok(PostMessageResponse { success: true, .. }) => Ok(()),
			Ok(PostMessageResponse { error, .. }) => Err(SendError::Rejected {
				status,
				body: error.unwrap_or(body),
			}),
			Err(_) => Err(SendError::Rejected { status, body }),
		}
	}
}
