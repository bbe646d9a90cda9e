//! prometheus meters for the rocket.chat http client

use prometheus::{
	exponential_buckets, histogram_opts, labels, opts, HistogramVec, IntCounterVec, Registry,
};

#[derive(Debug, Clone)]
/// prometheus meters for the rocket.chat http client
pub(crate) struct ClientMetrics {
	/// total number of http requests
	http_requests: IntCounterVec,
	/// total number of failed http requests
	http_requests_failed: IntCounterVec,
	/// time spent by http requests
	pub(crate) http_request_duration: HistogramVec,
}

impl ClientMetrics {
	/// construct prometheus meters and register them in `registry`
	pub(crate) fn new(registry: &Registry, user: &str) -> Result<Self, prometheus::Error> {
		let http_requests = IntCounterVec::new(
			opts!("requests_total", "total number of http requests", labels! {"user" => user})
				.namespace("rocket_howler")
				.subsystem("rocketchat"),
			&["endpoint"],
		)?;

		let http_requests_failed = IntCounterVec::new(
			opts!("requests_failed", "number of failed http requests", labels! {"user" => user})
				.namespace("rocket_howler")
				.subsystem("rocketchat"),
			&["endpoint", "status_code"],
		)?;

		let http_request_duration = HistogramVec::new(
			histogram_opts!(
				"request_duration_seconds",
				"total time of a http request in seconds",
				exponential_buckets(0.01, 2., 12)?,
				labels! {"user".to_owned() => user.to_owned()}
			)
			.namespace("rocket_howler")
			.subsystem("rocketchat"),
			&["endpoint"],
		)?;

		registry.register(Box::new(http_requests.clone()))?;
		registry.register(Box::new(http_requests_failed.clone()))?;
		registry.register(Box::new(http_request_duration.clone()))?;

		Ok(Self { http_requests, http_requests_failed, http_request_duration })
	}

	/// counts a request to `endpoint`
	pub(crate) fn record_request(&self, endpoint: &str) {
		self.http_requests.with_label_values(&[endpoint]).inc();
	}

	/// counts a failed request, `status_code` is empty for transport errors
	pub(crate) fn record_request_error(&self, endpoint: &str, status_code: &str) {
		self.http_requests_failed.with_label_values(&[endpoint, status_code]).inc();
	}
}
