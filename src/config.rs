use reqwest::Method;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::client::ClientConfig;
use crate::connection_pool::PoolConfig;
use crate::executor::LatencyStart;
use crate::utils::{parse_bool_flag, parse_duration_string, parse_ratio};

/// Upper bound for every duration setting.
pub const MAX_DURATION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Errors raised while reading configuration.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{var} must start with http:// or https://, got '{value}'")]
    InvalidUrl { var: &'static str, value: String },

    #[error("{var} must be a valid number, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} must be greater than 0")]
    MustBePositive { var: &'static str },

    #[error("{var} must be at most {max:?}, got {value:?}")]
    TooLarge {
        var: &'static str,
        value: Duration,
        max: Duration,
    },

    #[error("Invalid {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

/// Main configuration for a load generation run.
#[derive(Debug, Clone)]
pub struct Config {
    pub target_url: String,
    pub num_concurrent_tasks: usize,
    pub total_requests: u64,
    pub keep_alive_ratio: f64,
    pub method: Method,
    pub body_file: Option<PathBuf>,
    pub report_interval: Duration,
    pub request_timeout: Duration,
    pub latency_start: LatencyStart,
    pub skip_tls_verify: bool,
    pub custom_headers: Option<String>,
    pub metrics_port: Option<u16>,

    /// Idle connections kept per host by the keep-alive transport.
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub tcp_keepalive: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        let pool = PoolConfig::keep_alive();
        Self {
            target_url: "http://localhost:8080".to_string(),
            num_concurrent_tasks: 10,
            total_requests: 100,
            keep_alive_ratio: 0.7,
            method: Method::POST,
            body_file: None,
            report_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
            latency_start: LatencyStart::FirstByte,
            skip_tls_verify: false,
            custom_headers: None,
            metrics_port: None,
            pool_max_idle_per_host: pool.max_idle_per_host,
            pool_idle_timeout: pool.idle_timeout,
            tcp_keepalive: pool.tcp_keepalive,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// Unset variables fall back to `Config::default()`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let target_url = get("TARGET_URL")
            .map(|url| url.trim().to_string())
            .unwrap_or(defaults.target_url);
        if !target_url.starts_with("http://") && !target_url.starts_with("https://") {
            return Err(ConfigError::InvalidUrl {
                var: "TARGET_URL",
                value: target_url,
            });
        }

        let num_concurrent_tasks = match get("NUM_CONCURRENT_TASKS") {
            Some(value) => parse_number::<usize>("NUM_CONCURRENT_TASKS", &value)?,
            None => defaults.num_concurrent_tasks,
        };
        if num_concurrent_tasks == 0 {
            return Err(ConfigError::MustBePositive {
                var: "NUM_CONCURRENT_TASKS",
            });
        }

        let total_requests = match get("TOTAL_REQUESTS") {
            Some(value) => parse_number::<u64>("TOTAL_REQUESTS", &value)?,
            None => defaults.total_requests,
        };

        let keep_alive_ratio = match get("KEEP_ALIVE_RATIO") {
            Some(value) => parse_ratio(&value).map_err(|reason| ConfigError::InvalidValue {
                var: "KEEP_ALIVE_RATIO",
                reason,
            })?,
            None => defaults.keep_alive_ratio,
        };

        let method = match get("REQUEST_TYPE") {
            Some(value) => Method::from_bytes(value.trim().to_uppercase().as_bytes()).map_err(
                |e| ConfigError::InvalidValue {
                    var: "REQUEST_TYPE",
                    reason: e.to_string(),
                },
            )?,
            None => defaults.method,
        };

        let body_file = get("BODY_FILE").map(PathBuf::from);

        let report_interval = match get("REPORT_INTERVAL") {
            Some(value) => parse_positive_duration("REPORT_INTERVAL", &value)?,
            None => defaults.report_interval,
        };

        let request_timeout = match get("REQUEST_TIMEOUT") {
            Some(value) => parse_positive_duration("REQUEST_TIMEOUT", &value)?,
            None => defaults.request_timeout,
        };

        let latency_start = match get("LATENCY_START") {
            Some(value) => {
                LatencyStart::from_str(&value).map_err(|reason| ConfigError::InvalidValue {
                    var: "LATENCY_START",
                    reason,
                })?
            }
            None => defaults.latency_start,
        };

        let skip_tls_verify = match get("SKIP_TLS_VERIFY") {
            Some(value) => parse_bool_flag(&value).map_err(|reason| ConfigError::InvalidValue {
                var: "SKIP_TLS_VERIFY",
                reason,
            })?,
            None => defaults.skip_tls_verify,
        };

        let custom_headers = get("CUSTOM_HEADERS");

        let metrics_port = get("METRICS_PORT")
            .map(|value| parse_number::<u16>("METRICS_PORT", &value))
            .transpose()?;

        let pool_max_idle_per_host = match get("POOL_MAX_IDLE_PER_HOST") {
            Some(value) => parse_number::<usize>("POOL_MAX_IDLE_PER_HOST", &value)?,
            None => defaults.pool_max_idle_per_host,
        };
        if pool_max_idle_per_host == 0 {
            return Err(ConfigError::MustBePositive {
                var: "POOL_MAX_IDLE_PER_HOST",
            });
        }

        let pool_idle_timeout = match get("POOL_IDLE_TIMEOUT") {
            Some(value) => parse_positive_duration("POOL_IDLE_TIMEOUT", &value)?,
            None => defaults.pool_idle_timeout,
        };

        let tcp_keepalive = get("TCP_KEEPALIVE")
            .map(|value| parse_positive_duration("TCP_KEEPALIVE", &value))
            .transpose()?
            .or(defaults.tcp_keepalive);

        Ok(Config {
            target_url,
            num_concurrent_tasks,
            total_requests,
            keep_alive_ratio,
            method,
            body_file,
            report_interval,
            request_timeout,
            latency_start,
            skip_tls_verify,
            custom_headers,
            metrics_port,
            pool_max_idle_per_host,
            pool_idle_timeout,
            tcp_keepalive,
        })
    }

    /// Creates a ClientConfig from this Config.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            request_timeout: self.request_timeout,
            skip_tls_verify: self.skip_tls_verify,
            custom_headers: self.custom_headers.clone(),
            keep_alive_ratio: self.keep_alive_ratio,
            keep_alive_pool: PoolConfig::keep_alive()
                .with_max_idle_per_host(self.pool_max_idle_per_host)
                .with_idle_timeout(self.pool_idle_timeout)
                .with_tcp_keepalive(self.tcp_keepalive),
        }
    }

    /// Prints the configuration summary.
    pub fn print_summary(&self) {
        println!("\n🌍  Target URL: {}", self.target_url);
        println!(
            "🔄  Concurrency: {}, Total Requests: {}",
            self.num_concurrent_tasks, self.total_requests
        );
        println!(
            "⚡  Keep-Alive Ratio: {:.2} (max idle per host: {}, idle timeout: {:?})",
            self.keep_alive_ratio, self.pool_max_idle_per_host, self.pool_idle_timeout
        );
        println!("📡  HTTP Method: {}", self.method);
        println!(
            "⏱️  Report Interval: {:?}, Request Timeout: {:?}, Latency From: {}",
            self.report_interval, self.request_timeout, self.latency_start
        );
        if let Some(ref path) = self.body_file {
            println!("📂  Request Corpus: {}", path.display());
        }
        if self.skip_tls_verify {
            println!("⚠️  TLS certificate verification disabled");
        }
        println!("======================================");
    }
}

fn parse_number<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber {
            var,
            value: value.to_string(),
        })
}

/// Parses a duration in `(0, MAX_DURATION]`.
fn parse_positive_duration(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let duration =
        parse_duration_string(value).map_err(|reason| ConfigError::InvalidValue { var, reason })?;

    if duration.is_zero() {
        return Err(ConfigError::MustBePositive { var });
    }
    if duration > MAX_DURATION {
        return Err(ConfigError::TooLarge {
            var,
            value: duration,
            max: MAX_DURATION,
        });
    }

    Ok(duration)
}
