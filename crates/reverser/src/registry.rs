//! Concurrency-safe identifier -> upstream mapping.
//!
//! One coarse `RwLock` guards the whole map. It is only ever held for an
//! in-memory map operation, never across I/O, so forwarding traffic never
//! blocks registration beyond the critical section.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use url::Url;

use crate::error::ProxyError;

/// One registered upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub identifier: String,
    pub upstream: Url,
}

/// Point-in-time owned copy of the registry, sorted by identifier.
pub type Snapshot = BTreeMap<String, Target>;

/// Thread-safe proxy target registry. Cheap to clone (Arc).
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<HashMap<String, Target>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `target_url` under `identifier`, replacing any previous
    /// target with the same identifier.
    ///
    /// The URL must be absolute and carry a host. A rejected registration
    /// leaves the registry untouched.
    pub fn register(&self, target_url: &str, identifier: &str) -> Result<Target, ProxyError> {
        validate_identifier(identifier)?;
        let upstream = parse_upstream(target_url)?;

        let target = Target {
            identifier: identifier.to_string(),
            upstream,
        };
        let previous = self
            .inner
            .write()
            .insert(identifier.to_string(), target.clone());

        tracing::info!(
            identifier = %identifier,
            upstream = %target.upstream,
            replaced = previous.is_some(),
            "Registered proxy target"
        );
        Ok(target)
    }

    /// Remove the target registered under `identifier`.
    pub fn unregister(&self, identifier: &str) -> Result<Target, ProxyError> {
        let removed = self.inner.write().remove(identifier);
        match removed {
            Some(target) => {
                tracing::info!(identifier = %identifier, "Unregistered proxy target");
                Ok(target)
            }
            None => Err(ProxyError::NotFound(identifier.to_string())),
        }
    }

    pub fn find(&self, identifier: &str) -> Result<Target, ProxyError> {
        self.inner
            .read()
            .get(identifier)
            .cloned()
            .ok_or_else(|| ProxyError::NotFound(identifier.to_string()))
    }

    /// Owned snapshot of every registered target. Later mutations of the
    /// registry are not visible through it.
    pub fn list(&self) -> Snapshot {
        self.inner
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

// Identifiers are opaque, but they have to fit in a single path segment.
fn validate_identifier(identifier: &str) -> Result<(), ProxyError> {
    if identifier.is_empty() || identifier.contains('/') {
        return Err(ProxyError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(())
}

fn parse_upstream(target_url: &str) -> Result<Url, ProxyError> {
    let upstream = Url::parse(target_url).map_err(|source| ProxyError::Parse {
        url: target_url.to_string(),
        source,
    })?;
    if upstream.host_str().is_none() {
        return Err(ProxyError::Parse {
            url: target_url.to_string(),
            source: url::ParseError::EmptyHost,
        });
    }
    Ok(upstream)
}
