//! Periodic trend sampling.
//!
//! The recorder is a two-state machine. While `Running` it fires on a fixed
//! interval: aggregate every worker, derive TPS/QPS and latency percentiles,
//! append one sample to the history and emit a report. When told to stop it
//! runs exactly one final cycle, moves to `Stopped` and hands its history
//! back. The history is owned by the recorder until then, so nothing else can
//! observe it half-written.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::report::{Report, ReportPhase, Reporter};
use crate::stats::StatsBoard;

/// One point on the trend charts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrendSample {
    pub tps: f64,
    pub qps: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl TrendSample {
    /// Sample for a report, `None` if the report has no latency data.
    pub fn from_report(report: &Report) -> Option<Self> {
        let latency = report.latency.as_ref()?;
        Some(Self {
            tps: report.tps,
            qps: report.qps,
            p50_ms: latency.p50_ms(),
            p95_ms: latency.p95_ms(),
            p99_ms: latency.p99_ms(),
        })
    }
}

/// Five parallel time series, oldest sample first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendHistory {
    pub tps: Vec<f64>,
    pub qps: Vec<f64>,
    pub p50: Vec<f64>,
    pub p95: Vec<f64>,
    pub p99: Vec<f64>,
}

impl TrendHistory {
    pub fn push(&mut self, sample: TrendSample) {
        self.tps.push(sample.tps);
        self.qps.push(sample.qps);
        self.p50.push(sample.p50_ms);
        self.p95.push(sample.p95_ms);
        self.p99.push(sample.p99_ms);
    }

    /// Gives every empty series a single zero so charting always has data.
    pub fn ensure_non_empty(&mut self) {
        for series in [
            &mut self.tps,
            &mut self.qps,
            &mut self.p50,
            &mut self.p95,
            &mut self.p99,
        ] {
            if series.is_empty() {
                series.push(0.0);
            }
        }
    }

    /// Number of samples in the shortest series.
    pub fn len(&self) -> usize {
        [&self.tps, &self.qps, &self.p50, &self.p95, &self.p99]
            .iter()
            .map(|series| series.len())
            .min()
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecorderState {
    Running,
    Stopped,
}

/// What the recorder leaves behind once stopped.
#[derive(Debug, Clone)]
pub struct RecorderOutput {
    pub history: TrendHistory,
    pub final_report: Report,
    pub cycles: u64,
}

pub struct TrendRecorder {
    board: StatsBoard,
    reporter: Arc<dyn Reporter>,
    interval: Duration,
    run_start: Instant,
    history: TrendHistory,
    state: RecorderState,
    cycles: u64,
}

impl TrendRecorder {
    pub fn new(
        board: StatsBoard,
        reporter: Arc<dyn Reporter>,
        interval: Duration,
        run_start: Instant,
    ) -> Self {
        Self {
            board,
            reporter,
            interval,
            run_start,
            history: TrendHistory::default(),
            state: RecorderState::Running,
            cycles: 0,
        }
    }

    /// Runs one aggregate-and-report cycle.
    pub fn record_cycle(&mut self, phase: ReportPhase) -> Report {
        let snapshot = self.board.aggregate();
        let report = Report::from_snapshot(&snapshot, self.run_start.elapsed(), phase);
        debug!(
            cycle = self.cycles + 1,
            total_requests = snapshot.total_requests,
            mean_request_time = ?snapshot.mean_request_time(),
            "Report cycle"
        );

        match TrendSample::from_report(&report) {
            Some(sample) => self.history.push(sample),
            None => debug!(
                total_requests = report.total_requests,
                "No latency data yet, skipping trend sample"
            ),
        }

        self.cycles += 1;
        self.reporter.report(&report);
        report
    }

    /// Final cycle and transition to `Stopped`.
    pub fn finish(mut self) -> RecorderOutput {
        let final_report = self.record_cycle(ReportPhase::Final);
        self.state = RecorderState::Stopped;

        info!(
            cycles = self.cycles,
            samples = self.history.len(),
            total_requests = final_report.total_requests,
            latency = %final_report
                .latency
                .map(|latency| latency.format())
                .unwrap_or_else(|| "n/a".to_string()),
            "Trend recorder stopped"
        );

        RecorderOutput {
            history: self.history,
            final_report,
            cycles: self.cycles,
        }
    }

    /// Fires every interval until `stop` resolves, then finishes.
    ///
    /// A dropped stop sender counts as a stop signal.
    pub async fn run(mut self, mut stop: oneshot::Receiver<()>) -> RecorderOutput {
        let period = if self.interval.is_zero() {
            warn!("Report interval is zero, using 1s");
            Duration::from_secs(1)
        } else {
            self.interval
        };

        // An interval past the end of the clock never fires; only the final
        // cycle runs.
        let mut ticker = match Instant::now().checked_add(period) {
            Some(first) => {
                let mut ticker = time::interval_at(first, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                Some(ticker)
            }
            None => {
                warn!(
                    interval = ?period,
                    "Report interval out of range, only the final report will run"
                );
                None
            }
        };

        while self.state == RecorderState::Running {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                _ = next_tick(&mut ticker) => {
                    self.record_cycle(ReportPhase::Periodic);
                }
            }
        }

        self.finish()
    }

    /// Spawns the recorder onto the runtime.
    pub fn spawn(self) -> RecorderHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(self.run(stop_rx));
        RecorderHandle { stop_tx, join }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Handle to a spawned recorder.
pub struct RecorderHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<RecorderOutput>,
}

impl RecorderHandle {
    /// Signals the recorder to stop and waits for its final cycle.
    pub async fn stop(self) -> Result<RecorderOutput, tokio::task::JoinError> {
        // The receiver is only gone if the task already ended, and then the
        // join below reports how.
        let _ = self.stop_tx.send(());
        self.join.await
    }
}
