//! Single-request execution.
//!
//! One call performs one HTTP exchange, drains the response body and
//! classifies the result. Nothing in here returns an error: construction and
//! transport failures become failed outcomes with status 0 so the calling
//! worker can simply move on to its next request.

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::corpus::RequestSpec;
use crate::errors::ErrorCategory;

/// Status code recorded when no response was received.
pub const NO_RESPONSE_STATUS: u16 = 0;

/// User agent sent with every request.
pub const LOADGEN_USER_AGENT: &str = concat!("rust-loadgen/", env!("CARGO_PKG_VERSION"));

/// Where latency measurement starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LatencyStart {
    /// From the moment the response head is available to the end of the body.
    ///
    /// Leaves connection setup and request upload out of the number.
    #[default]
    FirstByte,

    /// From just before the request is sent to the end of the body.
    RequestStart,
}

impl FromStr for LatencyStart {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first-byte" | "first_byte" | "firstbyte" => Ok(LatencyStart::FirstByte),
            "request-start" | "request_start" | "requeststart" => Ok(LatencyStart::RequestStart),
            other => Err(format!(
                "Unknown latency start '{}'. Use 'first-byte' or 'request-start'.",
                other
            )),
        }
    }
}

impl fmt::Display for LatencyStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatencyStart::FirstByte => write!(f, "first-byte"),
            LatencyStart::RequestStart => write!(f, "request-start"),
        }
    }
}

/// Result of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    /// Status was in `[200, 300)`.
    pub success: bool,

    /// Measured latency per the configured `LatencyStart`. Zero without a response.
    pub latency: Duration,

    /// HTTP status, or `NO_RESPONSE_STATUS`.
    pub status_code: u16,

    /// Wall time spent on the request from start to finish, including failures.
    pub elapsed: Duration,

    /// Failure classification. `None` on success.
    pub error: Option<ErrorCategory>,
}

impl RequestOutcome {
    /// Failure without any response from the target.
    pub fn no_response(category: ErrorCategory, elapsed: Duration) -> Self {
        Self {
            success: false,
            latency: Duration::ZERO,
            status_code: NO_RESPONSE_STATUS,
            elapsed,
            error: Some(category),
        }
    }

    /// Outcome for a received response.
    pub fn from_response(status_code: u16, latency: Duration, elapsed: Duration) -> Self {
        let error = ErrorCategory::from_status_code(status_code);
        Self {
            success: error.is_none(),
            latency,
            status_code,
            elapsed,
            error,
        }
    }

    /// Whether the target answered at all.
    pub fn received_response(&self) -> bool {
        self.status_code != NO_RESPONSE_STATUS
    }
}

/// Performs one HTTP exchange and measures it.
pub async fn execute(
    client: &reqwest::Client,
    spec: &RequestSpec,
    method: &Method,
    latency_start: LatencyStart,
) -> RequestOutcome {
    let request_start = Instant::now();

    let request = match client
        .request(method.clone(), &spec.url)
        .header(USER_AGENT, LOADGEN_USER_AGENT)
        .header(CONTENT_TYPE, "application/json")
        .body(spec.body.clone())
        .build()
    {
        Ok(request) => request,
        Err(e) => {
            debug!(url = %spec.url, method = %method, error = %e, "Failed to build request");
            return RequestOutcome::no_response(
                ErrorCategory::from_reqwest_error(&e),
                request_start.elapsed(),
            );
        }
    };

    let mut response = match client.execute(request).await {
        Ok(response) => response,
        Err(e) => {
            let category = ErrorCategory::from_reqwest_error(&e);
            debug!(
                url = %spec.url,
                error = %e,
                error_category = %category.label(),
                "Request failed"
            );
            return RequestOutcome::no_response(category, request_start.elapsed());
        }
    };

    let first_byte = Instant::now();
    let status = response.status().as_u16();

    // Drain and drop the body chunk by chunk so the connection can go back to
    // the pool and the latency covers the full response.
    loop {
        match response.chunk().await {
            Ok(Some(_chunk)) => {}
            Ok(None) => break,
            Err(e) => {
                debug!(url = %spec.url, status_code = status, error = %e, "Response body aborted");
                break;
            }
        }
    }

    let latency = match latency_start {
        LatencyStart::FirstByte => first_byte.elapsed(),
        LatencyStart::RequestStart => request_start.elapsed(),
    };

    debug!(
        url = %spec.url,
        status_code = status,
        latency_us = latency.as_micros() as u64,
        "Request completed"
    );

    RequestOutcome::from_response(status, latency, request_start.elapsed())
}
