//! Failure categorization for load generation.
//!
//! Every failed request is classified into one category so that reports and
//! Prometheus labels can tell a refused connection apart from a 503.

use std::fmt;

/// Categories of failures a single request can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCategory {
    /// HTTP 4xx responses
    ClientError,

    /// HTTP 5xx responses
    ServerError,

    /// Responses outside 2xx/4xx/5xx (1xx, 3xx or non-standard codes)
    UnexpectedStatus,

    /// The request could not be built (bad URL, method or header)
    RequestBuildError,

    /// Network connectivity errors (DNS, connection refused, reset)
    NetworkError,

    /// Request exceeded the per-request timeout
    TimeoutError,

    /// TLS/SSL certificate errors
    TlsError,

    /// Other/unknown errors
    OtherError,
}

impl ErrorCategory {
    /// Categorize an HTTP status code.
    ///
    /// Returns `None` for 2xx, which is the only range counted as success.
    pub fn from_status_code(status_code: u16) -> Option<Self> {
        match status_code {
            200..=299 => None,
            400..=499 => Some(ErrorCategory::ClientError),
            500..=599 => Some(ErrorCategory::ServerError),
            _ => Some(ErrorCategory::UnexpectedStatus),
        }
    }

    /// Categorize a reqwest error raised while building or sending a request.
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_builder() {
            ErrorCategory::RequestBuildError
        } else if error.is_timeout() {
            ErrorCategory::TimeoutError
        } else if error.is_connect() {
            match Self::from_message(&error_chain_message(error)) {
                ErrorCategory::OtherError => ErrorCategory::NetworkError,
                category => category,
            }
        } else {
            Self::from_message(&error_chain_message(error))
        }
    }

    /// Fallback classification from an error message.
    fn from_message(message: &str) -> Self {
        let msg = message.to_lowercase();

        if msg.contains("certificate") || msg.contains("tls") || msg.contains("ssl") {
            ErrorCategory::TlsError
        } else if msg.contains("timed out") || msg.contains("timeout") {
            ErrorCategory::TimeoutError
        } else if msg.contains("dns")
            || msg.contains("resolve")
            || msg.contains("connect")
            || msg.contains("connection")
        {
            ErrorCategory::NetworkError
        } else {
            ErrorCategory::OtherError
        }
    }

    /// Get the Prometheus label for this error category.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::ClientError => "client_error",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::UnexpectedStatus => "unexpected_status",
            ErrorCategory::RequestBuildError => "request_build_error",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::TimeoutError => "timeout_error",
            ErrorCategory::TlsError => "tls_error",
            ErrorCategory::OtherError => "other_error",
        }
    }

    /// Get a human-readable description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCategory::ClientError => "HTTP 4xx Client Errors",
            ErrorCategory::ServerError => "HTTP 5xx Server Errors",
            ErrorCategory::UnexpectedStatus => "Non-2xx Unexpected Status",
            ErrorCategory::RequestBuildError => "Request Construction Errors",
            ErrorCategory::NetworkError => "Network/Connection Errors",
            ErrorCategory::TimeoutError => "Request Timeout Errors",
            ErrorCategory::TlsError => "TLS/SSL Certificate Errors",
            ErrorCategory::OtherError => "Other/Unknown Errors",
        }
    }

    /// Whether this category was produced without any response from the target.
    pub fn is_transport_level(&self) -> bool {
        !matches!(
            self,
            ErrorCategory::ClientError
                | ErrorCategory::ServerError
                | ErrorCategory::UnexpectedStatus
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Flattens an error and its sources into one message.
///
/// reqwest keeps the interesting part (e.g. "Connection refused") in the
/// source chain rather than in its own Display output.
fn error_chain_message(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
