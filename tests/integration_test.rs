use std::io::Write;
use std::net::TcpListener;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rust_loadgen::config::Config;
use rust_loadgen::errors::ErrorCategory;
use rust_loadgen::executor::{LatencyStart, LOADGEN_USER_AGENT};
use rust_loadgen::report::{Report, ReportPhase, Reporter, SilentReporter};
use rust_loadgen::runner::run_load_test;
use rust_loadgen::trend::TrendHistory;

/// Counts every reporter callback.
#[derive(Default)]
struct CountingReporter {
    advanced: AtomicU64,
    phases: Mutex<Vec<ReportPhase>>,
    trend_calls: AtomicU64,
}

impl Reporter for CountingReporter {
    fn advance(&self) {
        self.advanced.fetch_add(1, Ordering::Relaxed);
    }

    fn report(&self, report: &Report) {
        self.phases.lock().unwrap().push(report.phase);
    }

    fn trends(&self, _history: &TrendHistory) {
        self.trend_calls.fetch_add(1, Ordering::Relaxed);
    }
}

fn test_config(target_url: String, workers: usize, total: u64) -> Config {
    Config {
        target_url,
        num_concurrent_tasks: workers,
        total_requests: total,
        report_interval: Duration::from_millis(50),
        request_timeout: Duration::from_secs(5),
        ..Config::default()
    }
}

fn unused_local_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/", port)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn run_against_healthy_target_succeeds_every_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(100)
        .mount(&server)
        .await;

    let reporter = Arc::new(CountingReporter::default());
    let config = test_config(server.uri(), 4, 100);
    let summary = run_load_test(&config, reporter.clone()).await.unwrap();

    let report = &summary.final_report;
    assert_eq!(report.phase, ReportPhase::Final);
    assert_eq!(report.total_requests, 100);
    assert_eq!(report.success_requests, 100);
    assert_eq!(report.failed_requests, 0);
    assert_eq!(report.status_codes.get(&200), Some(&100));
    assert!(report.errors.is_empty());

    let latency = report.latency.expect("latency data for successful run");
    assert!(latency.p50 <= latency.p95);
    assert!(latency.p95 <= latency.p99);
    assert!(latency.p99 < Duration::from_secs(1));

    assert_eq!(summary.worker_stats.len(), 4);
    let per_worker_total: u64 = summary.worker_stats.iter().map(|s| s.total_requests).sum();
    assert_eq!(per_worker_total, 100);
    for stat in &summary.worker_stats {
        assert_eq!(stat.total_requests, stat.success_requests + stat.failed_requests);
        assert_eq!(stat.response_times.len() as u64, stat.total_requests);
    }

    assert!(!summary.history.is_empty());
    assert!(!summary.history.tps.is_empty());
    assert!(!summary.history.qps.is_empty());
    assert!(!summary.history.p50.is_empty());
    assert!(!summary.history.p95.is_empty());
    assert!(!summary.history.p99.is_empty());

    assert_eq!(reporter.advanced.load(Ordering::Relaxed), 100);
    assert_eq!(reporter.trend_calls.load(Ordering::Relaxed), 1);
    let phases = reporter.phases.lock().unwrap();
    assert_eq!(phases.last(), Some(&ReportPhase::Final));
    assert_eq!(
        phases.iter().filter(|p| **p == ReportPhase::Final).count(),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn run_against_unreachable_target_fails_every_request() {
    let config = test_config(unused_local_url(), 4, 20);
    let summary = run_load_test(&config, Arc::new(SilentReporter))
        .await
        .unwrap();

    let report = &summary.final_report;
    assert_eq!(report.total_requests, 20);
    assert_eq!(report.success_requests, 0);
    assert_eq!(report.failed_requests, 20);
    assert!(report.latency.is_none());
    assert!(report.status_codes.is_empty());
    assert_eq!(report.errors.values().sum::<u64>(), 20);
    assert!(report.errors.keys().all(|c| c.is_transport_level()));

    assert_eq!(summary.history.tps, vec![0.0]);
    assert_eq!(summary.history.qps, vec![0.0]);
    assert_eq!(summary.history.p50, vec![0.0]);
    assert_eq!(summary.history.p95, vec![0.0]);
    assert_eq!(summary.history.p99, vec![0.0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn server_errors_count_as_failures_with_real_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = test_config(server.uri(), 2, 30);
    let summary = run_load_test(&config, Arc::new(SilentReporter))
        .await
        .unwrap();

    let report = &summary.final_report;
    assert_eq!(report.success_requests, 0);
    assert_eq!(report.failed_requests, 30);
    assert_eq!(report.status_codes.get(&500), Some(&30));
    assert_eq!(report.errors.get(&ErrorCategory::ServerError), Some(&30));
    assert!(report.latency.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn keep_alive_ratio_zero_routes_everything_fresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = test_config(server.uri(), 3, 40);
    config.keep_alive_ratio = 0.0;
    let summary = run_load_test(&config, Arc::new(SilentReporter))
        .await
        .unwrap();

    assert_eq!(summary.transport_stats.keep_alive, 0);
    assert_eq!(summary.transport_stats.fresh, 40);
    assert_eq!(summary.final_report.success_requests, 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn keep_alive_ratio_one_routes_everything_pooled() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = test_config(server.uri(), 3, 40);
    config.keep_alive_ratio = 1.0;
    let summary = run_load_test(&config, Arc::new(SilentReporter))
        .await
        .unwrap();

    assert_eq!(summary.transport_stats.keep_alive, 40);
    assert_eq!(summary.transport_stats.fresh, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn requests_carry_fixed_headers() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(header("User-Agent", LOADGEN_USER_AGENT))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(204))
        .expect(10)
        .mount(&server)
        .await;

    let mut config = test_config(server.uri(), 2, 10);
    config.method = reqwest::Method::PUT;
    let summary = run_load_test(&config, Arc::new(SilentReporter))
        .await
        .unwrap();

    assert_eq!(summary.final_report.success_requests, 10);
    assert_eq!(summary.final_report.status_codes.get(&204), Some(&10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn corpus_entries_choose_url_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(body_string(r#"{"order":1}"#))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string(r#"{"ping":true}"#))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let corpus = serde_json::json!([
        [format!("{}/orders", server.uri()), r#"{"order":1}"#],
        ["", r#"{"ping":true}"#],
    ]);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", corpus).unwrap();

    let mut config = test_config(server.uri(), 4, 60);
    config.body_file = Some(file.path().to_path_buf());
    let summary = run_load_test(&config, Arc::new(SilentReporter))
        .await
        .unwrap();

    // Anything unrouted would hit wiremock's 404 fallback.
    let report = &summary.final_report;
    assert_eq!(report.success_requests, 60);
    let created = report.status_codes.get(&201).copied().unwrap_or(0);
    let ok = report.status_codes.get(&200).copied().unwrap_or(0);
    assert_eq!(created + ok, 60);
    assert!(created > 0);
    assert!(ok > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn malformed_corpus_falls_back_to_default_url() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string(""))
        .respond_with(ResponseTemplate::new(200))
        .expect(5)
        .mount(&server)
        .await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{\"not\": \"a corpus\"}}").unwrap();

    let mut config = test_config(server.uri(), 1, 5);
    config.body_file = Some(file.path().to_path_buf());
    let summary = run_load_test(&config, Arc::new(SilentReporter))
        .await
        .unwrap();

    assert_eq!(summary.final_report.success_requests, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn latency_start_policy_changes_what_is_measured() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(150)))
        .mount(&server)
        .await;

    let mut config = test_config(server.uri(), 2, 4);

    config.latency_start = LatencyStart::RequestStart;
    let from_request = run_load_test(&config, Arc::new(SilentReporter))
        .await
        .unwrap();
    let from_request = from_request.final_report.latency.unwrap();
    assert!(from_request.p50 >= Duration::from_millis(150));

    config.latency_start = LatencyStart::FirstByte;
    let from_first_byte = run_load_test(&config, Arc::new(SilentReporter))
        .await
        .unwrap();
    let from_first_byte = from_first_byte.final_report.latency.unwrap();
    assert!(from_first_byte.p99 < Duration::from_millis(150));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unrepresentable_report_interval_still_completes() {
    let reporter = Arc::new(CountingReporter::default());
    let mut config = test_config(unused_local_url(), 2, 0);
    config.report_interval = Duration::MAX;
    let summary = run_load_test(&config, reporter.clone()).await.unwrap();

    assert_eq!(summary.final_report.phase, ReportPhase::Final);
    assert_eq!(summary.history.len(), 1);
    assert_eq!(*reporter.phases.lock().unwrap(), vec![ReportPhase::Final]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn zero_request_budget_still_reports_once() {
    let reporter = Arc::new(CountingReporter::default());
    let mut config = test_config(unused_local_url(), 4, 0);
    config.report_interval = Duration::from_secs(60);
    let summary = run_load_test(&config, reporter.clone()).await.unwrap();

    assert_eq!(summary.final_report.total_requests, 0);
    assert!(summary.final_report.latency.is_none());
    assert_eq!(summary.history.len(), 1);
    assert_eq!(reporter.advanced.load(Ordering::Relaxed), 0);
    assert_eq!(*reporter.phases.lock().unwrap(), vec![ReportPhase::Final]);
}
