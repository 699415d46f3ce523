use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::info;

/// Logging middleware for HTTP requests
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();
    let start_time = Instant::now();
    let response = next.run(request).await;
    let duration = start_time.elapsed();
    let status = response.status();

    // Try to get response body size
    let content_length = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    info!(
        "{} {} -- {:?} {} (served in {:.3}ms; {} bytes)",
        method,
        uri,
        version,
        status,
        duration.as_secs_f64() * 1000.0,
        content_length
    );

    response
}
