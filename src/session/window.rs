//! Sliding-window sample buffer
//!
//! One trailing time window shared by every series. Trimming is lazy: it
//! happens on the append that follows, never on its own timer, so a window
//! change only takes effect the next time a series is touched or aggregated.

use super::types::{Sample, Series, WindowSpec};

/// Rolling buffer operations over a series's sample history.
///
/// Timestamps are assumed caller-monotonic per series; the buffer never
/// re-sorts. Missing samples stay in the sequence (they mark gaps) and are
/// only dropped once they age out of the window like any other sample.
pub trait RollingWindow {
    /// Append a sample at the tail, then trim the head to the window cutoff.
    fn append(&mut self, sample: Sample, window: &WindowSpec, now_ms: i64);

    /// Drop samples with timestamp < cutoff from the head.
    fn trim_before(&mut self, cutoff_ms: i64);

    fn is_empty(&self) -> bool;

    fn len(&self) -> usize;
}

impl RollingWindow for Series {
    fn append(&mut self, sample: Sample, window: &WindowSpec, now_ms: i64) {
        self.samples.push_back(sample);
        self.trim_before(now_ms - window.duration_ms);
    }

    fn trim_before(&mut self, cutoff_ms: i64) {
        while self
            .samples
            .front()
            .map(|s| s.timestamp_ms < cutoff_ms)
            .unwrap_or(false)
        {
            self.samples.pop_front();
        }
    }

    fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
