//! Here we expose prometheus metrics about the relay
use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
};
use prometheus::{Encoder, Registry, TextEncoder};

pub async fn metrics_handler(Extension(registry): Extension<Registry>) -> Response {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("failed to encode metrics: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    ([(CONTENT_TYPE, prometheus::TEXT_FORMAT)], buffer).into_response()
}

/// registry with the process collector already registered
pub fn registry() -> Result<Registry, prometheus::Error> {
    let registry = Registry::new();

    #[cfg(target_os = "linux")]
    registry.register(Box::new(prometheus::process_collector::ProcessCollector::for_self()))?;

    Ok(registry)
}
