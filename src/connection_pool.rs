//! Connection pool configuration and transport selection statistics.
//!
//! Two pool shapes are used: a bounded keep-alive pool and a no-reuse pool
//! where every request opens a fresh connection. reqwest does not expose
//! whether a given request reused a connection, so we count which transport
//! each request was routed through instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Connection pool configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Maximum idle connections to keep per host. Zero disables reuse.
    pub max_idle_per_host: usize,

    /// How long idle connections stay in the pool before cleanup
    pub idle_timeout: Duration,

    /// TCP keepalive duration
    pub tcp_keepalive: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 100,
            idle_timeout: Duration::from_secs(30),
            tcp_keepalive: None,
        }
    }
}

impl PoolConfig {
    /// Keep-alive pool with the default bounds.
    pub fn keep_alive() -> Self {
        Self::default()
    }

    /// Pool that never keeps a connection around after its response.
    pub fn no_reuse() -> Self {
        Self {
            max_idle_per_host: 0,
            idle_timeout: Duration::ZERO,
            tcp_keepalive: None,
        }
    }

    /// Set maximum idle connections per host.
    pub fn with_max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = max;
        self
    }

    /// Set idle connection timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set TCP keepalive duration.
    pub fn with_tcp_keepalive(mut self, keepalive: Option<Duration>) -> Self {
        self.tcp_keepalive = keepalive;
        self
    }

    /// Whether connections survive past their response.
    pub fn reuses_connections(&self) -> bool {
        self.max_idle_per_host > 0
    }

    /// Apply this configuration to a reqwest ClientBuilder.
    pub fn apply_to_builder(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        let mut builder = builder.pool_max_idle_per_host(self.max_idle_per_host);

        if self.reuses_connections() {
            builder = builder.pool_idle_timeout(self.idle_timeout);
        }

        if let Some(keepalive) = self.tcp_keepalive {
            builder = builder.tcp_keepalive(keepalive);
        }

        builder
    }
}

/// Which of the two pre-built clients served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    KeepAlive,
    Fresh,
}

impl TransportKind {
    /// Get the Prometheus label for this transport.
    pub fn label(&self) -> &'static str {
        match self {
            TransportKind::KeepAlive => "keep_alive",
            TransportKind::Fresh => "fresh",
        }
    }
}

/// Snapshot of transport selections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub keep_alive: u64,
    pub fresh: u64,
}

impl TransportStats {
    pub fn total(&self) -> u64 {
        self.keep_alive + self.fresh
    }

    /// Realized keep-alive ratio (0.0 - 1.0).
    pub fn keep_alive_share(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        self.keep_alive as f64 / self.total() as f64
    }

    /// Format statistics as a human-readable string.
    pub fn format(&self) -> String {
        format!(
            "Total: {}, Keep-Alive: {} ({:.1}%), Fresh: {} ({:.1}%)",
            self.total(),
            self.keep_alive,
            self.keep_alive_share() * 100.0,
            self.fresh,
            if self.total() == 0 {
                0.0
            } else {
                (1.0 - self.keep_alive_share()) * 100.0
            }
        )
    }
}

/// Lock-free counter of transport selections.
#[derive(Debug, Default)]
pub struct SelectionCounter {
    keep_alive: AtomicU64,
    fresh: AtomicU64,
}

impl SelectionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: TransportKind) {
        let counter = match kind {
            TransportKind::KeepAlive => &self.keep_alive,
            TransportKind::Fresh => &self.fresh,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> TransportStats {
        TransportStats {
            keep_alive: self.keep_alive.load(Ordering::Relaxed),
            fresh: self.fresh.load(Ordering::Relaxed),
        }
    }
}
