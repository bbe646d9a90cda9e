//! alertmanager webhook receiver, forwards every alert group to rocket.chat

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Extension, Json},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use prometheus::{opts, IntCounter, IntCounterVec, Registry};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    alert,
    renderer::MessageRenderer,
    retry::{retry, RetryError, RetrySettings},
    rocketchat::{AuthError, ChatClient, SendError},
    telemetry_endpoint,
};

/// message of every successful response
pub const SUCCESS: &str = "Success";

/// body of every webhook response, `status` mirrors the http status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JsonResponse {
    pub status: u16,
    pub message: String,
}

/// the request body isn't an alert group
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to read request body: {0}")]
    Body(String),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

/// one failed send attempt together with the reauthentication it triggered
#[derive(Error, Debug)]
#[error("{send}")]
pub struct AttemptError {
    pub send: SendError,
    pub reauth: Result<(), AuthError>,
}

/// [send_with_reauth] gave up
#[derive(Error, Debug)]
pub enum ReauthError {
    /// the last reauthentication failed, we treat that as root cause
    #[error("{auth}")]
    Authentication {
        auth: AuthError,
        attempts: RetryError<SendError>,
    },
    /// every send failed although we could log in
    #[error("{0}")]
    Exhausted(RetryError<SendError>),
}

impl ReauthError {
    /// the retry error of the sends, regardless of the reauthentication outcome
    pub fn attempts(&self) -> &RetryError<SendError> {
        match self {
            ReauthError::Authentication { attempts, .. } | ReauthError::Exhausted(attempts) => {
                attempts
            }
        }
    }
}

impl From<RetryError<AttemptError>> for ReauthError {
    fn from(err: RetryError<AttemptError>) -> Self {
        let RetryError {
            retries,
            last: AttemptError { send, reauth },
        } = err;

        let attempts = RetryError {
            retries,
            last: send,
        };

        match reauth {
            Err(auth) => ReauthError::Authentication { auth, attempts },
            Ok(()) => ReauthError::Exhausted(attempts),
        }
    }
}

struct WebhookMetrics {
    requests: IntCounterVec,
    received_alerts: IntCounter,
    send_attempts: IntCounter,
    reauthentications: IntCounterVec,
}

impl WebhookMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let requests = IntCounterVec::new(
            opts!("requests_total", "webhook requests by outcome")
                .namespace("rocket_howler")
                .subsystem("webhook"),
            &["outcome"],
        )?;

        let received_alerts = IntCounter::with_opts(
            opts!("received_alerts_total", "total number of deserialized alerts")
                .namespace("rocket_howler")
                .subsystem("webhook"),
        )?;

        let send_attempts = IntCounter::with_opts(
            opts!("send_attempts_total", "attempts to post a message")
                .namespace("rocket_howler")
                .subsystem("webhook"),
        )?;

        let reauthentications = IntCounterVec::new(
            opts!("reauthentications_total", "logins after a failed send")
                .namespace("rocket_howler")
                .subsystem("webhook"),
            &["result"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(received_alerts.clone()))?;
        registry.register(Box::new(send_attempts.clone()))?;
        registry.register(Box::new(reauthentications.clone()))?;

        Ok(Self {
            requests,
            received_alerts,
            send_attempts,
            reauthentications,
        })
    }
}

/// everything a webhook request needs, shared by all requests
pub struct State {
    client: Arc<dyn ChatClient>,
    renderer: MessageRenderer,
    retry: RetrySettings,
    metrics: WebhookMetrics,
}

impl State {
    pub fn new(
        client: Arc<dyn ChatClient>,
        renderer: MessageRenderer,
        retry: RetrySettings,
        registry: &Registry,
    ) -> Result<Self> {
        let metrics = WebhookMetrics::new(registry).context("failed to register webhook meters")?;

        Ok(Self {
            client,
            renderer,
            retry,
            metrics,
        })
    }
}

/// Renders `alert` and posts it. Every failed send is followed by a login,
/// also after the last attempt, whatever the cause of the failure was.
pub async fn send_with_reauth(state: &State, alert: &alert::Data) -> Result<(), ReauthError> {
    let State {
        client,
        renderer,
        retry: settings,
        metrics,
    } = state;

    let client: &dyn ChatClient = &**client;

    retry(settings.retries, settings.delay, move || async move {
        let message = renderer.render(alert);

        metrics.send_attempts.inc();
        let send = match client.send_message(&message).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        let reauth = client.authenticate().await;
        match &reauth {
            Ok(()) => metrics.reauthentications.with_label_values(&["success"]).inc(),
            Err(err) => {
                metrics.reauthentications.with_label_values(&["error"]).inc();
                tracing::warn!("error authenticating rocket.chat client: {err}");
                tracing::warn!("no notification was sent");
            }
        }

        Err(AttemptError { send, reauth })
    })
    .await
    .map_err(ReauthError::from)
}

fn decode(body: Result<Bytes, BytesRejection>) -> Result<alert::Data, DecodeError> {
    let body = body.map_err(|err| DecodeError::Body(err.to_string()))?;

    Ok(serde_json::from_slice(&body)?)
}

fn respond(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<JsonResponse>) {
    (
        status,
        Json(JsonResponse {
            status: status.as_u16(),
            message: message.into(),
        }),
    )
}

async fn webhook(
    Extension(state): Extension<Arc<State>>,
    body: Result<Bytes, BytesRejection>,
) -> (StatusCode, Json<JsonResponse>) {
    let alert = match decode(body) {
        Ok(alert) => alert,
        Err(err) => {
            tracing::debug!("failed to deserialize alert: {err}");
            state
                .metrics
                .requests
                .with_label_values(&["bad_request"])
                .inc();
            return respond(StatusCode::BAD_REQUEST, err.to_string());
        }
    };

    state
        .metrics
        .received_alerts
        .inc_by(alert.alerts.len() as u64);

    match send_with_reauth(&state, &alert).await {
        Ok(()) => {
            state.metrics.requests.with_label_values(&["success"]).inc();
            respond(StatusCode::OK, SUCCESS)
        }
        Err(err) => {
            tracing::error!(
                "error sending notifications to rocket.chat: {}",
                err.attempts()
            );
            state
                .metrics
                .requests
                .with_label_values(&["unauthorized"])
                .inc();
            respond(StatusCode::UNAUTHORIZED, err.to_string())
        }
    }
}

/// `POST /webhook` and `GET /metrics`
pub fn router(state: Arc<State>, registry: Registry) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/metrics", get(telemetry_endpoint::metrics_handler))
        .layer(Extension(state))
        .layer(Extension(registry))
}

pub async fn run_webhook_receiver(addr: SocketAddr, app: Router) -> Result<()> {
    let server = axum::Server::try_bind(&addr)
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on: {addr}");

    server
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for ctrl-c: {err}");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
        })
        .await
        .context("webhook receiver crashed")?;

    Ok(())
}
