//! Report values and the display collaborators that consume them.
//!
//! The engine hands every display concern to a [`Reporter`]: one `advance`
//! per finished request, one `report` per trend cycle and one `trends` call
//! with the finished history. [`ConsoleReporter`] drives a progress bar and
//! prints plain-text tables and charts; [`SilentReporter`] discards everything.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

use crate::errors::ErrorCategory;
use crate::percentiles::LatencyPercentiles;
use crate::stats::GlobalSnapshot;
use crate::trend::TrendHistory;

/// Whether a report came from a timer firing or the final cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPhase {
    Periodic,
    Final,
}

/// Everything shown for one report cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub phase: ReportPhase,
    pub elapsed: Duration,
    pub total_requests: u64,
    pub success_requests: u64,
    pub failed_requests: u64,
    pub tps: f64,
    pub qps: f64,

    /// `None` when no latency has been recorded yet.
    pub latency: Option<LatencyPercentiles>,

    pub status_codes: BTreeMap<u16, u64>,
    pub errors: BTreeMap<ErrorCategory, u64>,
}

impl Report {
    pub fn from_snapshot(snapshot: &GlobalSnapshot, elapsed: Duration, phase: ReportPhase) -> Self {
        let (tps, qps) = snapshot.rates(elapsed);
        Self {
            phase,
            elapsed,
            total_requests: snapshot.total_requests,
            success_requests: snapshot.success_requests,
            failed_requests: snapshot.failed_requests,
            tps,
            qps,
            latency: snapshot.percentiles(),
            status_codes: snapshot.status_codes.clone(),
            errors: snapshot.errors.clone(),
        }
    }

    /// Named metric rows in display order. Latency rows are left out when
    /// there is no latency data.
    pub fn metric_rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("Total Requests", self.total_requests.to_string()),
            ("Success Requests", self.success_requests.to_string()),
            ("Failed Requests", self.failed_requests.to_string()),
            ("TPS", format!("{:.2}", self.tps)),
            ("QPS", format!("{:.2}", self.qps)),
        ];

        if let Some(latency) = &self.latency {
            rows.push(("P50", format!("{:.2} ms", latency.p50_ms())));
            rows.push(("P95", format!("{:.2} ms", latency.p95_ms())));
            rows.push(("P99", format!("{:.2} ms", latency.p99_ms())));
        }

        rows
    }

    /// Format the report as a plain-text table.
    pub fn format_table(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("{:<20} {:>16}\n", "Metric", "Value"));
        output.push_str(&"-".repeat(37));
        output.push('\n');

        for (name, value) in self.metric_rows() {
            output.push_str(&format!("{:<20} {:>16}\n", name, value));
        }

        if self.latency.is_none() {
            output.push_str("\n⚠️  Not enough data for latency statistics\n");
        }

        if !self.status_codes.is_empty() {
            output.push_str("\n📡  HTTP Status Code Statistics:\n");
            for (code, count) in &self.status_codes {
                output.push_str(&format!("  - {}: {} times\n", code, count));
            }
        }

        if !self.errors.is_empty() {
            output.push_str("\n❌  Failures by Category:\n");
            for (category, count) in &self.errors {
                output.push_str(&format!("  - {}: {}\n", category.description(), count));
            }
        }

        output
    }
}

/// Consumer of progress events, reports and trend charts.
pub trait Reporter: Send + Sync {
    /// Called once per finished request, success or failure.
    fn advance(&self);

    /// Called once per trend cycle.
    fn report(&self, report: &Report);

    /// Called once with the completed trend history.
    fn trends(&self, history: &TrendHistory);
}

/// Reporter that drops everything.
#[derive(Debug, Default)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn advance(&self) {}

    fn report(&self, _report: &Report) {}

    fn trends(&self, _history: &TrendHistory) {}
}

const PROGRESS_TEMPLATE: &str =
    "[{elapsed_precise}] [{bar:40}] {pos}/{len} requests ({per_sec}, eta {eta}) {msg}";

/// Console output with a request progress bar.
///
/// The bar draws on stderr; reports and charts go to stdout and are printed
/// with the bar suspended.
pub struct ConsoleReporter {
    bar: ProgressBar,
}

impl ConsoleReporter {
    pub fn new(total: u64) -> Self {
        Self::with_draw_target(total, ProgressDrawTarget::stderr())
    }

    pub fn with_draw_target(total: u64, target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total), target);
        match ProgressStyle::with_template(PROGRESS_TEMPLATE) {
            Ok(style) => bar.set_style(style.progress_chars("=>-")),
            Err(e) => warn!(error = %e, "Invalid progress template, using default bar"),
        }
        Self { bar }
    }

    /// Requests completed so far.
    pub fn completed(&self) -> u64 {
        self.bar.position()
    }
}

impl Reporter for ConsoleReporter {
    fn advance(&self) {
        self.bar.inc(1);
    }

    fn report(&self, report: &Report) {
        if report.phase == ReportPhase::Final {
            self.bar.finish_with_message("done");
            println!("\n======================================");
            println!("✅  Test completed! Final statistics:");
            print!("{}", report.format_table());
        } else {
            self.bar.suspend(|| {
                println!("\n⏱️  {:.1}s elapsed", report.elapsed.as_secs_f64());
                print!("{}", report.format_table());
            });
        }
    }

    fn trends(&self, history: &TrendHistory) {
        println!("\n📈  TPS Trend:");
        println!("{}", render_line_chart(&history.tps, 10));
        println!("\n📊  QPS Trend:");
        println!("{}", render_line_chart(&history.qps, 10));
        println!("\n📉  Response Time Trend (ms):");
        println!("P50:");
        println!("{}", render_line_chart(&history.p50, 5));
        println!("P95:");
        println!("{}", render_line_chart(&history.p95, 5));
        println!("P99:");
        println!("{}", render_line_chart(&history.p99, 5));
    }
}

/// Renders a series as a small ASCII chart with a labelled y-axis.
///
/// Each column is one sample; `height` is the number of rows.
pub fn render_line_chart(values: &[f64], height: usize) -> String {
    if values.is_empty() {
        return String::from("(no data)");
    }

    let height = height.max(1);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    let row_of = |value: f64| -> usize {
        if span <= 0.0 || !span.is_finite() {
            0
        } else {
            (((value - min) / span) * (height - 1) as f64).round() as usize
        }
    };

    let mut lines = Vec::with_capacity(height);
    for row in (0..height).rev() {
        let label = if height == 1 {
            max
        } else {
            min + span * row as f64 / (height - 1) as f64
        };
        let mut line = format!("{:>10.2} ┤", label);
        for &value in values {
            line.push(if row_of(value) == row { '●' } else { ' ' });
        }
        lines.push(line.trim_end().to_string());
    }

    lines.join("\n")
}
