use rand::rngs::StdRng;
use rand::SeedableRng;
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, info};

use crate::budget::WorkBudget;
use crate::client::TransportPool;
use crate::corpus::RequestCorpus;
use crate::executor::{execute, LatencyStart, RequestOutcome};
use crate::metrics::{
    status_code_label, CONCURRENT_REQUESTS, REQUEST_DURATION_SECONDS, REQUEST_ERRORS_BY_CATEGORY,
    REQUEST_STATUS_CODES, REQUEST_TOTAL,
};
use crate::report::Reporter;
use crate::stats::StatRecorder;

/// Shared inputs for a worker task.
#[derive(Clone)]
pub struct WorkerConfig {
    pub default_url: String,
    pub method: Method,
    pub latency_start: LatencyStart,
    pub corpus: Arc<RequestCorpus>,
    pub transports: Arc<TransportPool>,
    pub budget: Arc<WorkBudget>,
    pub reporter: Arc<dyn Reporter>,
}

/// Runs one worker until the shared budget is exhausted.
///
/// Returns the number of requests this worker completed. The worker writes
/// only through its own `recorder`.
pub async fn run_worker(config: WorkerConfig, mut recorder: StatRecorder) -> u64 {
    let task_id = recorder.worker_id();
    let mut rng = StdRng::from_entropy();
    let mut completed = 0u64;

    debug!(task_id, url = %config.default_url, method = %config.method, "Worker starting");

    while let Some(index) = config.budget.claim_next() {
        let spec = config.corpus.sample(&config.default_url, &mut rng);
        let (client, transport) = config.transports.select(&mut rng);

        CONCURRENT_REQUESTS.inc();
        REQUEST_TOTAL.inc();

        let outcome = execute(client, &spec, &config.method, config.latency_start).await;

        CONCURRENT_REQUESTS.dec();
        record_metrics(&outcome);

        debug!(
            task_id,
            index,
            transport = transport.label(),
            status_code = outcome.status_code,
            success = outcome.success,
            "Request finished"
        );

        recorder.record(&outcome);
        config.reporter.advance();
        completed += 1;
    }

    info!(task_id, completed, "Worker stopping, request budget exhausted");
    completed
}

fn record_metrics(outcome: &RequestOutcome) {
    REQUEST_STATUS_CODES
        .with_label_values(&[status_code_label(outcome.status_code)])
        .inc();

    if let Some(category) = outcome.error {
        REQUEST_ERRORS_BY_CATEGORY
            .with_label_values(&[category.label()])
            .inc();
    }

    if outcome.received_response() {
        REQUEST_DURATION_SECONDS.observe(outcome.latency.as_secs_f64());
    }
}
