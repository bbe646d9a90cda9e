//! bounded retry with a fixed delay between attempts

use std::{fmt::Display, future::Future, time::Duration};

use backoff::backoff::Backoff;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use thiserror::Error;

/// retry policy of the webhook receiver
#[serde_as]
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct RetrySettings {
	/// attempts permitted after the first one
	#[serde(default = "RetrySettings::default_retries")]
	pub retries: u32,
	/// pause between two attempts
	#[serde_as(as = "DurationSeconds<f64>")]
	#[serde(default = "RetrySettings::default_delay")]
	pub delay: Duration,
}

impl RetrySettings {
	fn default_retries() -> u32 {
		1
	}

	fn default_delay() -> Duration {
		Duration::from_secs(2)
	}
}

impl Default for RetrySettings {
	fn default() -> Self {
		Self { retries: Self::default_retries(), delay: Self::default_delay() }
	}
}

/// Yields the same delay `retries` times, then signals that no attempts are
/// left.
#[derive(Debug, Clone)]
pub struct BoundedConstantBackoff {
	/// total number of delays this backoff hands out
	retries: u32,
	/// delays handed out since the last reset
	used: u32,
	/// the delay
	delay: Duration,
}

impl BoundedConstantBackoff {
	pub fn new(retries: u32, delay: Duration) -> Self {
		Self { retries, used: 0, delay }
	}
}

impl Backoff for BoundedConstantBackoff {
	fn reset(&mut self) {
		self.used = 0;
	}

	fn next_backoff(&mut self) -> Option<Duration> {
		if self.used >= self.retries {
			return None;
		}

		self.used += 1;
		Some(self.delay)
	}
}

/// returned by [retry] once the last permitted attempt failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("after {retries} retries, last error: {last}")]
pub struct RetryError<E> {
	/// the retry budget that was exhausted
	pub retries: u32,
	/// error of the final attempt
	pub last: E,
}

/// Runs `operation` until it succeeds or `retries + 1` attempts failed,
/// sleeping `delay` between attempts.
///
/// The sleep only suspends the calling task.
pub async fn retry<T, E, F, Fut>(
	retries: u32,
	delay: Duration,
	operation: F,
) -> Result<T, RetryError<E>>
where
	E: Display,
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
{
	retry_with_backoff(BoundedConstantBackoff::new(retries, delay), retries, operation).await
}

/// like [retry] but with an arbitrary [Backoff] deciding the delays. `retries`
/// is only reported in the [RetryError].
pub async fn retry_with_backoff<T, E, B, F, Fut>(
	mut backoff: B,
	retries: u32,
	mut operation: F,
) -> Result<T, RetryError<E>>
where
	E: Display,
	B: Backoff,
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
{
	backoff.reset();

	loop {
		let err = match operation().await {
			Ok(value) => return Ok(value),
			Err(err) => err,
		};

		match backoff.next_backoff() {
			Some(duration) => {
				tokio::time::sleep(duration).await;
				tracing::info!("retrying after error: {err}");
			}
			None => return Err(RetryError { retries, last: err }),
		}
	}
}
