use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::connection_pool::{PoolConfig, SelectionCounter, TransportKind, TransportStats};
use crate::metrics::TRANSPORT_SELECTIONS_TOTAL;
use crate::utils::parse_headers_with_escapes;

/// Errors raised while building the transport pool.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid header format in CUSTOM_HEADERS: '{0}'. Expected 'Name:Value'.")]
    HeaderFormat(String),

    #[error("Invalid header name '{name}': {reason}")]
    HeaderName { name: String, reason: String },

    #[error("Invalid header value for '{name}': {reason}")]
    HeaderValue { name: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Configuration for building the HTTP clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub request_timeout: Duration,
    pub skip_tls_verify: bool,
    pub custom_headers: Option<String>,
    pub keep_alive_ratio: f64,
    pub keep_alive_pool: PoolConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            skip_tls_verify: false,
            custom_headers: None,
            keep_alive_ratio: 0.7,
            keep_alive_pool: PoolConfig::keep_alive(),
        }
    }
}

/// The two pre-built clients plus the per-request selection policy.
///
/// Clients are immutable after construction and shared by every worker.
pub struct TransportPool {
    keep_alive: reqwest::Client,
    fresh: reqwest::Client,
    keep_alive_ratio: f64,
    selections: SelectionCounter,
    parsed_headers: HeaderMap,
}

impl TransportPool {
    /// Builds both clients from the given configuration.
    pub fn build(config: &ClientConfig) -> Result<Self, ClientError> {
        let parsed_headers = configure_custom_headers(config.custom_headers.as_deref())?;

        let keep_alive = build_client(config, &config.keep_alive_pool, &parsed_headers)?;
        let fresh = build_client(config, &PoolConfig::no_reuse(), &parsed_headers)?;

        let keep_alive_ratio = if config.keep_alive_ratio.is_nan() {
            0.0
        } else {
            config.keep_alive_ratio.clamp(0.0, 1.0)
        };
        info!(
            keep_alive_ratio,
            max_idle_per_host = config.keep_alive_pool.max_idle_per_host,
            idle_timeout = ?config.keep_alive_pool.idle_timeout,
            request_timeout = ?config.request_timeout,
            "Transport pool ready"
        );

        Ok(Self {
            keep_alive,
            fresh,
            keep_alive_ratio,
            selections: SelectionCounter::new(),
            parsed_headers,
        })
    }

    /// Draws the client for one request.
    ///
    /// Each call is an independent Bernoulli trial with p = keep-alive ratio,
    /// so the realized share converges on the configured ratio.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> (&reqwest::Client, TransportKind) {
        let kind = if rng.gen_bool(self.keep_alive_ratio) {
            TransportKind::KeepAlive
        } else {
            TransportKind::Fresh
        };

        self.selections.record(kind);
        TRANSPORT_SELECTIONS_TOTAL
            .with_label_values(&[kind.label()])
            .inc();

        (self.client(kind), kind)
    }

    pub fn client(&self, kind: TransportKind) -> &reqwest::Client {
        match kind {
            TransportKind::KeepAlive => &self.keep_alive,
            TransportKind::Fresh => &self.fresh,
        }
    }

    /// Selections made so far.
    pub fn stats(&self) -> TransportStats {
        self.selections.stats()
    }

    pub fn keep_alive_ratio(&self) -> f64 {
        self.keep_alive_ratio
    }

    /// Custom headers applied to both clients, for the startup summary.
    pub fn parsed_headers(&self) -> &HeaderMap {
        &self.parsed_headers
    }
}

fn build_client(
    config: &ClientConfig,
    pool: &PoolConfig,
    custom_headers: &HeaderMap,
) -> Result<reqwest::Client, ClientError> {
    let mut default_headers = custom_headers.clone();
    if !pool.reuses_connections() {
        default_headers.insert(CONNECTION, HeaderValue::from_static("close"));
    }

    let mut client_builder = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .default_headers(default_headers);

    client_builder = pool.apply_to_builder(client_builder);

    let client = if config.skip_tls_verify {
        warn!("Skipping TLS certificate verification");
        client_builder.danger_accept_invalid_certs(true).build()?
    } else {
        client_builder.build()?
    };

    Ok(client)
}

fn configure_custom_headers(custom_headers_str: Option<&str>) -> Result<HeaderMap, ClientError> {
    let mut parsed_headers = HeaderMap::new();

    let headers_str = match custom_headers_str {
        Some(s) if !s.trim().is_empty() => s,
        _ => return Ok(parsed_headers),
    };

    for header_pair_str in parse_headers_with_escapes(headers_str) {
        let header_pair = header_pair_str.trim();

        let (name_str, value_str) = header_pair
            .split_once(':')
            .map(|(name, value)| (name.trim(), value.trim()))
            .ok_or_else(|| ClientError::HeaderFormat(header_pair.to_string()))?;

        if name_str.is_empty() {
            return Err(ClientError::HeaderFormat(header_pair.to_string()));
        }

        let header_name = HeaderName::from_str(name_str).map_err(|e| ClientError::HeaderName {
            name: name_str.to_string(),
            reason: e.to_string(),
        })?;
        let header_value = HeaderValue::from_str(value_str).map_err(|e| ClientError::HeaderValue {
            name: name_str.to_string(),
            reason: e.to_string(),
        })?;

        parsed_headers.insert(header_name, header_value);
    }

    Ok(parsed_headers)
}
