//! Per-worker statistics and cross-worker aggregation.
//!
//! Each worker owns exactly one [`StatRecorder`]; it is the only handle that
//! can mutate that worker's [`WorkerStat`]. The [`StatsBoard`] keeps read
//! access to every record so the trend recorder can aggregate while workers
//! are still running. Every record has its own lock, taken only by its owner
//! per update and by the board per snapshot, so a reader never sees a counter
//! increment without the matching latency append.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::errors::ErrorCategory;
use crate::executor::RequestOutcome;
use crate::percentiles::LatencyPercentiles;

/// Statistics accumulated by one worker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerStat {
    pub total_requests: u64,
    pub success_requests: u64,
    pub failed_requests: u64,

    /// Sum of wall time spent on requests, failures included.
    pub total_time: Duration,

    /// One latency per request that received a response, in completion order.
    pub response_times: Vec<Duration>,

    pub status_codes: BTreeMap<u16, u64>,
    pub errors: BTreeMap<ErrorCategory, u64>,
}

impl WorkerStat {
    pub fn with_capacity(expected_requests: usize) -> Self {
        Self {
            response_times: Vec::with_capacity(expected_requests),
            ..Self::default()
        }
    }

    /// Folds one request outcome into the record.
    pub fn record(&mut self, outcome: &RequestOutcome) {
        self.total_requests += 1;
        self.total_time += outcome.elapsed;

        if outcome.success {
            self.success_requests += 1;
        } else {
            self.failed_requests += 1;
        }

        if let Some(category) = outcome.error {
            *self.errors.entry(category).or_insert(0) += 1;
        }

        if outcome.received_response() {
            *self.status_codes.entry(outcome.status_code).or_insert(0) += 1;
            self.response_times.push(outcome.latency);
        }
    }
}

/// Merged view over every worker at one point in time.
///
/// `response_times` is sorted ascending on construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalSnapshot {
    pub total_requests: u64,
    pub success_requests: u64,
    pub failed_requests: u64,
    pub total_time: Duration,
    pub response_times: Vec<Duration>,
    pub status_codes: BTreeMap<u16, u64>,
    pub errors: BTreeMap<ErrorCategory, u64>,
}

impl GlobalSnapshot {
    fn absorb(&mut self, stat: &WorkerStat) {
        self.total_requests += stat.total_requests;
        self.success_requests += stat.success_requests;
        self.failed_requests += stat.failed_requests;
        self.total_time += stat.total_time;

        for (&code, &count) in &stat.status_codes {
            *self.status_codes.entry(code).or_insert(0) += count;
        }
        for (&category, &count) in &stat.errors {
            *self.errors.entry(category).or_insert(0) += count;
        }

        self.response_times.extend_from_slice(&stat.response_times);
    }

    fn finish(mut self) -> Self {
        self.response_times.sort_unstable();
        self
    }

    /// p50/p95/p99 over every recorded latency, `None` without data.
    pub fn percentiles(&self) -> Option<LatencyPercentiles> {
        LatencyPercentiles::from_sorted(&self.response_times)
    }

    /// `(tps, qps)` over `elapsed`. Both are zero when no time has passed.
    pub fn rates(&self, elapsed: Duration) -> (f64, f64) {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return (0.0, 0.0);
        }
        (
            self.success_requests as f64 / secs,
            self.total_requests as f64 / secs,
        )
    }

    /// Mean wall time per request.
    pub fn mean_request_time(&self) -> Option<Duration> {
        if self.total_requests == 0 {
            return None;
        }
        Some(self.total_time.div_f64(self.total_requests as f64))
    }
}

/// Merges worker records into one snapshot.
///
/// Pure fold: the result does not depend on the order of `stats`.
pub fn aggregate<'a, I>(stats: I) -> GlobalSnapshot
where
    I: IntoIterator<Item = &'a WorkerStat>,
{
    let mut snapshot = GlobalSnapshot::default();
    for stat in stats {
        snapshot.absorb(stat);
    }
    snapshot.finish()
}

type Slot = Arc<Mutex<WorkerStat>>;

fn lock_slot(slot: &Slot) -> MutexGuard<'_, WorkerStat> {
    // A worker that panicked mid-update leaves a record that is still
    // consistent field by field; keep reporting it.
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive write handle to one worker's record. Not cloneable.
#[derive(Debug)]
pub struct StatRecorder {
    worker_id: usize,
    slot: Slot,
}

impl StatRecorder {
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn record(&mut self, outcome: &RequestOutcome) {
        lock_slot(&self.slot).record(outcome);
    }
}

/// Read access to every worker's record.
#[derive(Debug, Clone)]
pub struct StatsBoard {
    slots: Vec<Slot>,
}

impl StatsBoard {
    /// Creates one record per worker and hands back the write handles.
    ///
    /// `expected_per_worker` pre-sizes the latency buffers.
    pub fn new(workers: usize, expected_per_worker: usize) -> (Self, Vec<StatRecorder>) {
        let slots: Vec<Slot> = (0..workers)
            .map(|_| Arc::new(Mutex::new(WorkerStat::with_capacity(expected_per_worker))))
            .collect();

        let recorders = slots
            .iter()
            .enumerate()
            .map(|(worker_id, slot)| StatRecorder {
                worker_id,
                slot: Arc::clone(slot),
            })
            .collect();

        (Self { slots }, recorders)
    }

    /// Aggregates the current state of every worker.
    ///
    /// Each record is locked only while it is copied into the snapshot, so
    /// workers are held up for at most one merge.
    pub fn aggregate(&self) -> GlobalSnapshot {
        let mut snapshot = GlobalSnapshot::default();
        for slot in &self.slots {
            snapshot.absorb(&lock_slot(slot));
        }
        snapshot.finish()
    }

    /// Copies of every worker record, in worker order.
    pub fn worker_stats(&self) -> Vec<WorkerStat> {
        self.slots.iter().map(|slot| lock_slot(slot).clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::NO_RESPONSE_STATUS;

    fn ok(ms: u64) -> RequestOutcome {
        RequestOutcome::from_response(200, Duration::from_millis(ms), Duration::from_millis(ms + 1))
    }

    fn refused() -> RequestOutcome {
        RequestOutcome::no_response(ErrorCategory::NetworkError, Duration::from_millis(2))
    }

    #[test]
    fn test_worker_stat_record_counts() {
        let mut stat = WorkerStat::default();
        stat.record(&ok(5));
        stat.record(&RequestOutcome::from_response(
            503,
            Duration::from_millis(9),
            Duration::from_millis(10),
        ));
        stat.record(&refused());

        assert_eq!(stat.total_requests, 3);
        assert_eq!(stat.success_requests, 1);
        assert_eq!(stat.failed_requests, 2);
        assert_eq!(stat.total_requests, stat.success_requests + stat.failed_requests);
        assert_eq!(stat.response_times.len(), 2);
        assert_eq!(stat.status_codes.get(&200), Some(&1));
        assert_eq!(stat.status_codes.get(&503), Some(&1));
        assert!(!stat.status_codes.contains_key(&NO_RESPONSE_STATUS));
        assert_eq!(stat.errors.get(&ErrorCategory::ServerError), Some(&1));
        assert_eq!(stat.errors.get(&ErrorCategory::NetworkError), Some(&1));
        assert_eq!(stat.total_time, Duration::from_millis(6 + 10 + 2));
    }

    #[test]
    fn test_aggregate_sums_and_sorts() {
        let mut a = WorkerStat::default();
        a.record(&ok(30));
        a.record(&ok(10));
        let mut b = WorkerStat::default();
        b.record(&ok(20));
        b.record(&refused());

        let snapshot = aggregate([&a, &b]);
        assert_eq!(snapshot.total_requests, 4);
        assert_eq!(snapshot.success_requests, 3);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.status_codes.get(&200), Some(&3));
        assert_eq!(
            snapshot.response_times,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(30)
            ]
        );
    }

    #[test]
    fn test_aggregate_empty() {
        let snapshot = aggregate(std::iter::empty());
        assert_eq!(snapshot, GlobalSnapshot::default());
        assert!(snapshot.percentiles().is_none());
        assert!(snapshot.mean_request_time().is_none());
    }

    #[test]
    fn test_rates() {
        let mut stat = WorkerStat::default();
        for _ in 0..8 {
            stat.record(&ok(1));
        }
        stat.record(&refused());
        stat.record(&refused());
        let snapshot = aggregate([&stat]);

        let (tps, qps) = snapshot.rates(Duration::from_secs(2));
        assert!((tps - 4.0).abs() < 1e-9);
        assert!((qps - 5.0).abs() < 1e-9);
        assert_eq!(snapshot.rates(Duration::ZERO), (0.0, 0.0));
    }

    #[test]
    fn test_board_recorders_write_own_slots() {
        let (board, mut recorders) = StatsBoard::new(3, 4);
        assert_eq!(recorders.len(), 3);

        recorders[0].record(&ok(1));
        recorders[2].record(&ok(2));
        recorders[2].record(&refused());

        let per_worker = board.worker_stats();
        assert_eq!(per_worker.len(), 3);
        assert_eq!(per_worker[0].total_requests, 1);
        assert_eq!(per_worker[1].total_requests, 0);
        assert_eq!(per_worker[2].total_requests, 2);
        assert_eq!(recorders[1].worker_id(), 1);

        let snapshot = board.aggregate();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.response_times.len(), 2);
    }
}
