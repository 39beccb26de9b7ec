use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use rust_loadgen::config::Config;
use rust_loadgen::metrics::{gather_metrics_string, register_metrics, start_metrics_server};
use rust_loadgen::report::ConsoleReporter;
use rust_loadgen::runner::run_load_test;

/// Prints helpful configuration documentation.
fn print_config_help() {
    eprintln!("Environment variables (all optional):");
    eprintln!(
        "  TARGET_URL              - Default request URL (must start with http:// or https://, default: http://localhost:8080)"
    );
    eprintln!(
        "  NUM_CONCURRENT_TASKS    - Number of concurrent workers (default: 10, must be > 0)"
    );
    eprintln!("  TOTAL_REQUESTS          - Total number of requests to send (default: 100)");
    eprintln!(
        "  KEEP_ALIVE_RATIO        - Share of requests sent over pooled connections, 0.0-1.0 (default: 0.7)"
    );
    eprintln!("  REQUEST_TYPE            - HTTP method (default: POST)");
    eprintln!(
        "  BODY_FILE               - JSON corpus: [\"body\", ...] or [[\"url\", \"body\"], ...]"
    );
    eprintln!();
    eprintln!("Timing configuration:");
    eprintln!("  REPORT_INTERVAL         - Statistics interval: 500ms, 1s, 1m (default: 1s)");
    eprintln!("  REQUEST_TIMEOUT         - Per-request timeout (default: 10s)");
    eprintln!(
        "  LATENCY_START           - first-byte or request-start (default: first-byte)"
    );
    eprintln!("  Durations must be greater than 0 and at most 30d");
    eprintln!();
    eprintln!("Connection pool configuration:");
    eprintln!("  POOL_MAX_IDLE_PER_HOST  - Idle keep-alive connections per host (default: 100)");
    eprintln!("  POOL_IDLE_TIMEOUT       - Idle connection lifetime (default: 30s)");
    eprintln!("  TCP_KEEPALIVE           - TCP keepalive interval for pooled connections");
    eprintln!();
    eprintln!("Advanced configuration:");
    eprintln!("  SKIP_TLS_VERIFY         - Skip TLS certificate verification (default: false)");
    eprintln!("  CUSTOM_HEADERS          - Comma-separated headers (use \\, for literal commas)");
    eprintln!("  METRICS_PORT            - Serve Prometheus metrics on this port");
    eprintln!("  METRIC_NAMESPACE        - Prometheus metric namespace (default: rust_loadgen)");
    eprintln!("  RUST_LOG                - Log filter (default: info)");
    eprintln!("  LOG_FORMAT              - Set to json for JSON log lines");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    // Load configuration from environment variables
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}\n", e);
            print_config_help();
            std::process::exit(1);
        }
    };

    register_metrics()?;
    let registry_arc = Arc::new(Mutex::new(prometheus::default_registry().clone()));

    if let Some(port) = config.metrics_port {
        let registry = registry_arc.clone();
        tokio::spawn(async move {
            start_metrics_server(port, registry).await;
        });
    }

    config.print_summary();

    let reporter = Arc::new(ConsoleReporter::new(config.total_requests));
    let summary = run_load_test(&config, reporter.clone()).await?;

    info!(
        completed = reporter.completed(),
        total_requests = summary.final_report.total_requests,
        failed_requests = summary.final_report.failed_requests,
        transports = %summary.transport_stats.format(),
        "Load run complete"
    );
    debug!(metrics = %gather_metrics_string(&registry_arc), "Final metrics");

    Ok(())
}
