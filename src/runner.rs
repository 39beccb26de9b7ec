use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info};

use crate::budget::WorkBudget;
use crate::client::{ClientError, TransportPool};
use crate::config::Config;
use crate::connection_pool::TransportStats;
use crate::corpus::RequestCorpus;
use crate::report::{Report, Reporter};
use crate::stats::{StatsBoard, WorkerStat};
use crate::trend::{TrendHistory, TrendRecorder};
use crate::worker::{run_worker, WorkerConfig};

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Failed to build HTTP clients: {0}")]
    Client(#[from] ClientError),

    #[error("Trend recorder task failed: {0}")]
    Recorder(#[from] tokio::task::JoinError),
}

/// Everything a finished run leaves behind.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub final_report: Report,
    /// Every series holds at least one sample.
    pub history: TrendHistory,
    pub transport_stats: TransportStats,
    pub worker_stats: Vec<WorkerStat>,
}

/// Drives one complete load run.
///
/// Spawns `num_concurrent_tasks` workers and the trend recorder, waits for
/// every worker to drain the request budget, then stops the recorder so the
/// final report sees quiesced statistics. Request failures never fail the
/// run; only client construction or a crashed recorder does.
pub async fn run_load_test(
    config: &Config,
    reporter: Arc<dyn Reporter>,
) -> Result<RunSummary, RunError> {
    let corpus = match &config.body_file {
        Some(path) => RequestCorpus::load_or_empty(path),
        None => RequestCorpus::default(),
    };
    info!(entries = corpus.len(), "Request corpus ready");

    let transports = Arc::new(TransportPool::build(&config.to_client_config())?);
    if !transports.parsed_headers().is_empty() {
        info!(
            count = transports.parsed_headers().len(),
            "Custom headers applied to both transports"
        );
    }

    let workers = config.num_concurrent_tasks.max(1);
    let per_worker = usize::try_from(config.total_requests / workers as u64).unwrap_or(0);
    let (board, recorders) = StatsBoard::new(workers, per_worker);

    let budget = Arc::new(WorkBudget::new(config.total_requests));
    let run_start = Instant::now();
    let recorder =
        TrendRecorder::new(board.clone(), reporter.clone(), config.report_interval, run_start)
            .spawn();

    info!(
        workers,
        total_requests = config.total_requests,
        keep_alive_ratio = transports.keep_alive_ratio(),
        target = %config.target_url,
        method = %config.method,
        "Starting load run"
    );

    let worker_config = WorkerConfig {
        default_url: config.target_url.clone(),
        method: config.method.clone(),
        latency_start: config.latency_start,
        corpus: Arc::new(corpus),
        transports: transports.clone(),
        budget: budget.clone(),
        reporter: reporter.clone(),
    };

    let handles: Vec<_> = recorders
        .into_iter()
        .map(|stat_recorder| tokio::spawn(run_worker(worker_config.clone(), stat_recorder)))
        .collect();

    for (task_id, handle) in handles.into_iter().enumerate() {
        if let Err(e) = handle.await {
            error!(task_id, error = %e, "Worker task failed");
        }
    }

    info!(
        claimed = budget.claimed(),
        elapsed_ms = run_start.elapsed().as_millis() as u64,
        "All workers finished"
    );

    let output = recorder.stop().await?;
    let mut history = output.history;
    history.ensure_non_empty();
    reporter.trends(&history);

    Ok(RunSummary {
        final_report: output.final_report,
        history,
        transport_stats: transports.stats(),
        worker_stats: board.worker_stats(),
    })
}
