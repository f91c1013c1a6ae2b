//! Span builder helpers for reverser instrumentation.

/// Create a tracing span for one request entering the `/proxy/` path space.
///
/// Usage: `let span = proxy_request_span!(request_id, method, path);`
///
/// Fields recorded later by the dispatcher:
/// - `identifier`: the resolved registry key, once the path is parsed
/// - `status`: the status code returned to the caller
#[macro_export]
macro_rules! proxy_request_span {
    ($request_id:expr, $method:expr, $path:expr) => {
        tracing::info_span!(
            "proxy_request",
            request_id = %$request_id,
            method = %$method,
            path = %$path,
            identifier = tracing::field::Empty,
            status = tracing::field::Empty,
        )
    };
}

/// Create a tracing span for the forward to a registered upstream.
#[macro_export]
macro_rules! upstream_forward_span {
    ($request_id:expr, $url:expr) => {
        tracing::info_span!(
            "upstream_forward",
            request_id = %$request_id,
            url = %$url,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}
