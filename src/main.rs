//! prometheus alertmanager receiver that forwards alerts into rocket.chat channels
//!
//! Features:
//! - one message per alert group, one attachment per alert
//! - per alert group channel via the `channel_name` label
//! - configurable tera template for the message text
//! - logs in again and retries if a message can't be posted

use std::sync::Arc;

use anyhow::{Context, Result};
use settings::{Opts, Settings};

use crate::{
	renderer::MessageRenderer,
	rocketchat::{ChatClient, RocketChatClient},
};

mod alert;
mod log;
mod renderer;
mod retry;
mod rocketchat;
mod settings;
mod telemetry_endpoint;
mod webhook;

/// exit the complete program if one thread panics
fn setup_panic_handler() {
	let default_panic = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		default_panic(info);
		std::process::exit(1);
	}));
}

/// the entry point of the program
#[tokio::main]
pub async fn main() -> Result<()> {
	setup_panic_handler();

	let opts = Opts::parse()?;

	let mut settings = Settings::load(&opts.config_file)
		.with_context(|| format!("missing rocket.chat config parameters in {}", opts.config_file))?;

	if let Some(level) = opts.log_level {
		settings.log.level = level;
	}

	log::setup_logging(&settings.log).context("could not setup logging")?;

	let registry = telemetry_endpoint::registry().context("failed to set up metrics registry")?;

	let client = RocketChatClient::new(
		&settings.endpoint,
		settings.credentials.clone(),
		settings.request_timeout,
		&registry,
	)
	.context("error getting rocket.chat client")?;

	// the first webhook logs in again if this fails
	match client.authenticate().await {
		Ok(()) => tracing::info!("logged in to {}", settings.endpoint.host),
		Err(err) => tracing::error!("error authenticating rocket.chat client: {err}"),
	}

	let renderer = MessageRenderer::new(&settings).context("failed to construct message renderer")?;

	let state = webhook::State::new(Arc::new(client), renderer, settings.retry, &registry)?;

	webhook::run_webhook_receiver(opts.listen_address, webhook::router(Arc::new(state), registry))
		.await
}
