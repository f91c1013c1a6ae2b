//! Resolve `/proxy/<identifier>[/<remainder>][?query]` to a registered
//! target and forward the request there.

use axum::extract::Request;
use axum::http::header::CONTENT_LENGTH;
use axum::http::HeaderMap;
use axum::response::Response;
use bytes::Bytes;
use http_body_util::LengthLimitError;
use percent_encoding::percent_decode_str;
use url::Url;

use super::forward;
use crate::error::ProxyError;
use crate::registry::{Registry, Target};

/// Path prefix owned by the dispatcher.
pub const PROXY_PREFIX: &str = "/proxy/";

/// Split a request path into `(identifier, remainder)`.
///
/// Both halves are returned as they appear on the wire, still
/// percent-encoded. The remainder keeps its leading `/` and is `/` when
/// nothing follows the identifier. Returns `None` when the path is outside
/// the prefix or the identifier segment is empty.
pub fn split_proxy_path(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix(PROXY_PREFIX)?;
    let (identifier, remainder) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, "/"),
    };
    if identifier.is_empty() {
        return None;
    }
    Some((identifier, remainder))
}

/// Build the outgoing URL: scheme, host and port come from the target,
/// path and query from the incoming request.
///
/// Only scheme and authority are substituted. Any path, credentials or
/// fragment on the registered upstream are not carried over.
pub fn upstream_url(
    target: &Target,
    remainder: &str,
    query: Option<&str>,
) -> Result<Url, ProxyError> {
    let upstream = &target.upstream;
    let host = upstream.host_str().ok_or_else(|| ProxyError::Parse {
        url: upstream.to_string(),
        source: url::ParseError::EmptyHost,
    })?;

    let mut raw = format!("{}://{}", upstream.scheme(), host);
    if let Some(port) = upstream.port() {
        raw.push(':');
        raw.push_str(&port.to_string());
    }
    raw.push_str(remainder);
    if let Some(query) = query {
        raw.push('?');
        raw.push_str(query);
    }

    Url::parse(&raw).map_err(|source| ProxyError::Parse { url: raw, source })
}

/// Forwards `/proxy/` traffic to registered targets.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Registry,
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl Dispatcher {
    pub fn new(registry: Registry, client: reqwest::Client, max_body_bytes: usize) -> Self {
        Self {
            registry,
            client,
            max_body_bytes,
        }
    }

    /// Resolve a request path to its target and remainder.
    ///
    /// The identifier segment is percent-decoded before lookup; the
    /// remainder is left raw. A path the prefix pattern does not match, or an
    /// identifier that does not decode to UTF-8, is treated like an
    /// unregistered identifier.
    pub fn resolve<'a>(&self, path: &'a str) -> Result<(Target, &'a str), ProxyError> {
        let (segment, remainder) =
            split_proxy_path(path).ok_or_else(|| ProxyError::NotFound(path.to_string()))?;
        let identifier = percent_decode_str(segment)
            .decode_utf8()
            .map_err(|_| ProxyError::NotFound(segment.to_string()))?;
        let target = self.registry.find(&identifier)?;
        Ok((target, remainder))
    }

    /// Forward `request` to the target its path names.
    ///
    /// The registry lock is released by the time any network I/O starts.
    pub async fn dispatch(&self, request: Request, request_id: &str) -> Result<Response, ProxyError> {
        let (parts, body) = request.into_parts();

        let (target, remainder) = self.resolve(parts.uri.path())?;
        tracing::Span::current().record("identifier", target.identifier.as_str());

        let url = upstream_url(&target, remainder, parts.uri.query())?;
        tracing::debug!(identifier = %target.identifier, url = %url, "Resolved proxy target");

        let body = self.read_body(&parts.headers, body).await?;

        forward::forward(&self.client, parts.method, url, &parts.headers, body, request_id).await
    }

    async fn read_body(&self, headers: &HeaderMap, body: axum::body::Body) -> Result<Bytes, ProxyError> {
        let declared = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.max_body_bytes) {
            return Err(ProxyError::BodyTooLarge {
                limit: self.max_body_bytes,
            });
        }

        axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| {
                if exceeds_length_limit(&e) {
                    return ProxyError::BodyTooLarge {
                        limit: self.max_body_bytes,
                    };
                }
                tracing::warn!(error = %e, "Failed to read request body");
                ProxyError::BadRequest(format!("failed to read request body: {e}"))
            })
    }
}

/// Whether a body read failed because it ran past the buffering limit.
fn exceeds_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}
