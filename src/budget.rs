//! Shared request budget.
//!
//! Workers claim request indices from one atomic counter. A single
//! `fetch_add` both hands out a unique index and tells the caller whether the
//! budget is exhausted, so no further coordination is needed and any
//! remainder of `total / workers` goes to whichever worker is free first.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct WorkBudget {
    total: u64,
    next: AtomicU64,
}

impl WorkBudget {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            next: AtomicU64::new(0),
        }
    }

    /// Claims the next request index in `[1, total]`.
    ///
    /// Returns `None` once every index has been handed out.
    pub fn claim_next(&self) -> Option<u64> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        (index <= self.total).then_some(index)
    }

    /// Number of indices handed out so far.
    pub fn claimed(&self) -> u64 {
        self.next.load(Ordering::Relaxed).min(self.total)
    }
}
