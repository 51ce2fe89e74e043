//! Rolling outcome window.
//!
//! The window is a ring of fixed-width time buckets. A bucket remembers the
//! slot (bucket-width tick since the window origin) it was last written in;
//! buckets whose slot has fallen out of the ring are treated as empty and
//! recycled on the next write. Eviction therefore costs nothing extra and
//! memory stays at `buckets` entries regardless of traffic.
//!
//! Outcomes expire a whole bucket at a time, so the live span is not exactly
//! `window`: it covers the current, partially elapsed bucket plus the
//! `buckets - 1` before it, i.e. between `window - width` and `window` where
//! `width = window / buckets`.

use super::types::Outcome;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    slot: u64,
    successes: u64,
    failures: u64,
}

/// Success/failure tallies currently inside the window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStats {
    pub successes: u64,
    pub failures: u64,
}

impl WindowStats {
    /// Sample size
    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }

    /// failures / (successes + failures), 0.0 for an empty window
    pub fn failure_ratio(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.failures as f64 / total as f64
        }
    }
}

/// Time-bounded rolling record of outcomes
#[derive(Debug)]
pub struct OutcomeWindow {
    buckets: Vec<Bucket>,
    bucket_width: Duration,
    origin: Instant,
}

impl OutcomeWindow {
    pub fn new(window: Duration, buckets: usize, origin: Instant) -> Self {
        let buckets = buckets.max(1);
        let divisor = u32::try_from(buckets).unwrap_or(u32::MAX);
        let bucket_width = (window / divisor).max(Duration::from_millis(1));

        Self {
            buckets: vec![Bucket::default(); buckets],
            bucket_width,
            origin,
        }
    }

    fn slot_at(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.origin).as_nanos();
        (elapsed / self.bucket_width.as_nanos()) as u64
    }

    /// Count an outcome in the bucket covering `now`
    pub fn record(&mut self, outcome: Outcome, now: Instant) {
        let slot = self.slot_at(now);
        let len = self.buckets.len() as u64;
        let bucket = &mut self.buckets[(slot % len) as usize];

        if bucket.slot != slot {
            *bucket = Bucket {
                slot,
                ..Bucket::default()
            };
        }

        match outcome {
            Outcome::Success => bucket.successes += 1,
            Outcome::Failure => bucket.failures += 1,
        }
    }

    /// Tallies of every bucket still inside the window at `now`
    pub fn stats(&self, now: Instant) -> WindowStats {
        let current = self.slot_at(now);
        let len = self.buckets.len() as u64;

        self.buckets
            .iter()
            .filter(|b| b.slot <= current && current - b.slot < len)
            .fold(WindowStats::default(), |acc, b| WindowStats {
                successes: acc.successes + b.successes,
                failures: acc.failures + b.failures,
            })
    }

    /// Forget everything and restart the window at `now`
    pub fn reset(&mut self, now: Instant) {
        self.buckets.fill(Bucket::default());
        self.origin = now;
    }
}
