//! Raw forwarding to a registered upstream.
//!
//! Requests go out with the caller's method, headers and body. Responses
//! stream back verbatim: no parsing, no transformation, no buffering.

use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Method};
use axum::response::Response;
use bytes::Bytes;
use http::header::CONNECTION;
use tracing::Instrument;
use url::Url;

use crate::error::ProxyError;

/// Headers that should NOT be forwarded (hop-by-hop headers).
///
/// `host` is included so that the client derives it from the upstream URL.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "trailers",
];

/// Forward a request to `url` and stream the upstream response back.
///
/// Network failures surface as [`ProxyError::UpstreamUnreachable`]. Any
/// response the upstream produces, including 4xx/5xx and redirects, is
/// relayed unchanged.
pub async fn forward(
    client: &reqwest::Client,
    method: Method,
    url: Url,
    headers: &HeaderMap,
    body: Bytes,
    request_id: &str,
) -> Result<Response, ProxyError> {
    let span = reverser_tracing::upstream_forward_span!(request_id, url);
    let start = Instant::now();

    async {
        let mut req_builder = client.request(method, url).body(body);

        let connection_tokens = connection_tokens(headers);
        for (name, value) in headers.iter() {
            if is_hop_by_hop(name, &connection_tokens) {
                continue;
            }
            req_builder = req_builder.header(name, value);
        }

        let upstream_result = req_builder.send().await;
        let latency = start.elapsed().as_millis() as u64;
        tracing::Span::current().record("latency_ms", latency);

        match upstream_result {
            Ok(resp) => {
                let status = resp.status();
                tracing::Span::current().record("status", status.as_u16());
                tracing::info!(
                    status = status.as_u16(),
                    latency_ms = latency,
                    "Forward complete"
                );
                Ok(build_response(resp))
            }
            Err(e) => {
                if e.is_timeout() {
                    tracing::error!(error = %e, latency_ms = latency, "Upstream timeout");
                } else {
                    tracing::error!(error = %e, latency_ms = latency, "Upstream connection error");
                }
                Err(ProxyError::UpstreamUnreachable(e))
            }
        }
    }
    .instrument(span)
    .await
}

/// Build an axum Response from the upstream response, streaming the body back.
fn build_response(upstream_resp: reqwest::Response) -> Response {
    let status = upstream_resp.status();
    let connection_tokens = connection_tokens(upstream_resp.headers());

    let mut headers = HeaderMap::with_capacity(upstream_resp.headers().len());
    for (name, value) in upstream_resp.headers().iter() {
        if is_hop_by_hop(name, &connection_tokens) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let mut response = Response::new(Body::from_stream(upstream_resp.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Header names listed in `Connection`, which are hop-by-hop for this message.
fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

fn is_hop_by_hop(name: &HeaderName, connection_tokens: &[String]) -> bool {
    // HeaderName is always lowercase.
    let name = name.as_str();
    HOP_BY_HOP_HEADERS.contains(&name) || connection_tokens.iter().any(|t| t == name)
}
