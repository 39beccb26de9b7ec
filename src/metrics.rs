use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use prometheus::{
    Encoder, Gauge, Histogram, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::env;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

lazy_static::lazy_static! {
    pub static ref METRIC_NAMESPACE: String =
        env::var("METRIC_NAMESPACE").unwrap_or_else(|_| "rust_loadgen".to_string());

    pub static ref REQUEST_TOTAL: IntCounter =
        IntCounter::with_opts(
            Opts::new("requests_total", "Total number of HTTP requests attempted")
                .namespace(METRIC_NAMESPACE.as_str())
        ).unwrap();

    pub static ref REQUEST_STATUS_CODES: IntCounterVec =
        IntCounterVec::new(
            Opts::new("requests_status_codes_total", "Number of HTTP requests by status code")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["status_code"]
        ).unwrap();

    pub static ref REQUEST_ERRORS_BY_CATEGORY: IntCounterVec =
        IntCounterVec::new(
            Opts::new("requests_errors_total", "Number of failed HTTP requests by error category")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["category"]
        ).unwrap();

    pub static ref TRANSPORT_SELECTIONS_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("transport_selections_total", "Requests routed through each transport")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["transport"]  // keep_alive, fresh
        ).unwrap();

    pub static ref CONCURRENT_REQUESTS: Gauge =
        Gauge::with_opts(
            Opts::new("concurrent_requests", "Number of HTTP requests currently in flight")
                .namespace(METRIC_NAMESPACE.as_str())
        ).unwrap();

    pub static ref REQUEST_DURATION_SECONDS: Histogram =
        Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "request_duration_seconds",
                "Measured HTTP request latencies in seconds."
            ).namespace(METRIC_NAMESPACE.as_str())
        ).unwrap();
}

/// Registers all metrics with the default Prometheus registry.
pub fn register_metrics() -> Result<(), prometheus::Error> {
    let registry = prometheus::default_registry();
    registry.register(Box::new(REQUEST_TOTAL.clone()))?;
    registry.register(Box::new(REQUEST_STATUS_CODES.clone()))?;
    registry.register(Box::new(REQUEST_ERRORS_BY_CATEGORY.clone()))?;
    registry.register(Box::new(TRANSPORT_SELECTIONS_TOTAL.clone()))?;
    registry.register(Box::new(CONCURRENT_REQUESTS.clone()))?;
    registry.register(Box::new(REQUEST_DURATION_SECONDS.clone()))?;
    Ok(())
}

/// Returns a static string label for common HTTP status codes.
///
/// Keeps label cardinality bounded and avoids allocating on the hot path.
pub fn status_code_label(code: u16) -> &'static str {
    match code {
        0 => "error",
        200 => "200",
        201 => "201",
        202 => "202",
        204 => "204",
        301 => "301",
        302 => "302",
        304 => "304",
        400 => "400",
        401 => "401",
        403 => "403",
        404 => "404",
        405 => "405",
        408 => "408",
        409 => "409",
        422 => "422",
        429 => "429",
        500 => "500",
        502 => "502",
        503 => "503",
        504 => "504",
        _ => "other",
    }
}

fn encode_registry(registry: &Arc<Mutex<Registry>>) -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = match registry.lock() {
        Ok(guard) => guard.gather(),
        Err(poisoned) => poisoned.into_inner().gather(),
    };
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}

/// HTTP handler for the Prometheus metrics endpoint.
pub async fn metrics_handler(
    _req: Request<Body>,
    registry: Arc<Mutex<Registry>>,
) -> Result<Response<Body>, hyper::Error> {
    let response = match encode_registry(&registry) {
        Ok(buffer) => {
            let mut response = Response::new(Body::from(buffer));
            if let Ok(content_type) = TextEncoder::new().format_type().parse() {
                response
                    .headers_mut()
                    .insert(hyper::header::CONTENT_TYPE, content_type);
            }
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            let mut response = Response::new(Body::from("failed to encode metrics"));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    };

    Ok(response)
}

/// Starts the Prometheus metrics HTTP server.
pub async fn start_metrics_server(port: u16, registry: Arc<Mutex<Registry>>) {
    let addr = ([0, 0, 0, 0], port).into();

    let make_svc = make_service_fn(move |_conn| {
        let registry_clone = registry.clone();
        async move {
            Ok::<_, hyper::Error>(service_fn(move |req| {
                let registry_clone_inner = registry_clone.clone();
                async move { metrics_handler(req, registry_clone_inner).await }
            }))
        }
    });

    let server = match Server::try_bind(&addr) {
        Ok(builder) => builder.serve(make_svc),
        Err(e) => {
            error!(port = port, error = %e, "Failed to bind metrics server");
            return;
        }
    };
    info!(
        port = port,
        addr = %addr,
        "Metrics server listening"
    );

    if let Err(e) = server.await {
        error!(error = %e, "Metrics server error");
    }
}

/// Gathers and encodes metrics as a string for final output.
pub fn gather_metrics_string(registry: &Arc<Mutex<Registry>>) -> String {
    match encode_registry(registry) {
        Ok(buffer) => String::from_utf8(buffer).unwrap_or_else(|e| {
            error!(error = %e, "Error encoding metrics to UTF-8");
            String::from("# ERROR ENCODING METRICS TO UTF-8")
        }),
        Err(e) => {
            error!(error = %e, "Error encoding metrics");
            String::from("# ERROR ENCODING METRICS")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_label() {
        assert_eq!(status_code_label(0), "error");
        assert_eq!(status_code_label(200), "200");
        assert_eq!(status_code_label(503), "503");
        assert_eq!(status_code_label(418), "other");
    }

    #[test]
    fn test_gather_from_private_registry() {
        let registry = Registry::new();
        let counter = IntCounter::new("probe_total", "probe counter").unwrap();
        registry.register(Box::new(counter.clone())).unwrap();
        counter.inc_by(3);

        let output = gather_metrics_string(&Arc::new(Mutex::new(registry)));
        assert!(output.contains("probe_total 3"), "output was: {}", output);
    }
}
