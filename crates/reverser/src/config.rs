//! Configuration types and loading logic.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use reverser_tracing::TracingConfig;
use serde::Deserialize;

use crate::registry::Registry;

/// Top-level proxy configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub tracing: TracingConfig,

    /// Targets registered at startup. The registry is not persisted, so
    /// anything registered at runtime is gone after a restart.
    #[serde(default)]
    pub targets: Vec<TargetSeed>,
}

/// Server listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

/// Settings for the client that talks to registered upstreams.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Largest request body buffered for forwarding.
    #[serde(default = "default_max_request_body_bytes")]
    pub max_request_body_bytes: usize,
}

/// A `[[targets]]` entry.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TargetSeed {
    pub path: String,
    pub target: String,
}

fn default_listen_address() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_request_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_request_body_bytes: default_max_request_body_bytes(),
        }
    }
}

impl ProxyConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (REVERSER_ prefix, __ for nesting)
    /// 2. TOML config file
    /// 3. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(config_path))
                .merge(Env::prefixed("REVERSER_").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        Ok(figment.extract()?)
    }

    /// Register every `[[targets]]` entry. Fails on the first bad seed.
    pub fn seed(&self, registry: &Registry) -> anyhow::Result<()> {
        for seed in &self.targets {
            registry
                .register(&seed.target, &seed.path)
                .map_err(|e| anyhow::anyhow!("target seed {:?}: {e}", seed.path))?;
        }
        Ok(())
    }
}
