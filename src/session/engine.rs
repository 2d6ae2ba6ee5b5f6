//! Session engine: single owner of registry, window, and threshold state
//!
//! Every decoded frame and every operator intent lands here, inside one
//! event-loop task, so no locking is needed anywhere in the session core.
//! The engine stamps samples with its own clock (injectable for tests),
//! routes node reports into the registry, and produces the per-series
//! display reports the presentation adapter consumes on each redraw tick.

use tokio::sync::mpsc;

use super::aggregate::{classify, full_window_stats, short_window_stats, SpecVerdict, WindowStats};
use super::registry::SeriesRegistry;
use super::types::{RegistryEvent, Sample, SampleValue, SpecThreshold, StatusEvent, WindowSpec};
use crate::wire::{InboundMessage, StationMode};

/// Per-series display report produced on the redraw tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesReport {
    pub id: String,
    pub display_name: String,
    pub color: String,
    /// Trailing 5 s stats for the live averages table
    pub short: Option<WindowStats>,
    /// Full-window stats for scaling the plot axis
    pub full: Option<WindowStats>,
    /// Grade of the 5 s average against the spec threshold
    pub verdict: Option<SpecVerdict>,
    pub sample_count: usize,
}

pub struct SessionEngine {
    registry: SeriesRegistry,
    window: WindowSpec,
    spec: SpecThreshold,
    station_mode: Option<StationMode>,
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl SessionEngine {
    pub fn new(
        capacity: usize,
        stale_timeout_ms: i64,
        events: mpsc::UnboundedSender<RegistryEvent>,
    ) -> Self {
        Self::new_with_timestamp_fn(
            capacity,
            stale_timeout_ms,
            events,
            Box::new(|| chrono::Utc::now().timestamp_millis()),
        )
    }

    /// Deterministic-clock constructor for tests.
    pub fn new_with_timestamp_fn(
        capacity: usize,
        stale_timeout_ms: i64,
        events: mpsc::UnboundedSender<RegistryEvent>,
        now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
    ) -> Self {
        Self {
            registry: SeriesRegistry::new(capacity, stale_timeout_ms, events),
            window: WindowSpec::default(),
            spec: SpecThreshold::default(),
            station_mode: None,
            now_fn,
        }
    }

    pub fn now_ms(&self) -> i64 {
        (self.now_fn)()
    }

    /// Apply one decoded inbound frame. Node reports feed the registry;
    /// everything else surfaces as status events for the display.
    pub fn apply_message(&mut self, msg: InboundMessage) -> Vec<StatusEvent> {
        let now = self.now_ms();
        match msg {
            InboundMessage::NodeReport { mode, readings } => {
                if mode.is_some() {
                    self.station_mode = mode;
                }
                for reading in readings {
                    self.ingest(&reading.id, reading.name.as_deref(), reading.value, now);
                }
                Vec::new()
            }
            InboundMessage::SingleReading { value } => {
                self.ingest("1", None, value, now);
                Vec::new()
            }
            InboundMessage::DualReading { value1, value2 } => {
                self.ingest("1", None, value1, now);
                self.ingest("2", None, value2, now);
                Vec::new()
            }
            InboundMessage::CalibrationResult { id, value } => {
                vec![StatusEvent::CalibrationResult { id, value }]
            }
            InboundMessage::TimerUpdate { seconds } => {
                vec![StatusEvent::TimerUpdate { seconds }]
            }
            InboundMessage::AnnouncementConfig { before, after } => {
                vec![StatusEvent::AnnouncementConfig { before, after }]
            }
            InboundMessage::RosterNames { names } => {
                vec![StatusEvent::RosterNames { names }]
            }
        }
    }

    fn ingest(&mut self, id: &str, name: Option<&str>, value: SampleValue, now: i64) {
        let sample = Sample {
            timestamp_ms: now,
            value,
        };
        self.registry.touch(id, name, sample, &self.window, now);
    }

    /// Display reports in presentation order (most recently updated first).
    pub fn snapshot(&self) -> Vec<SeriesReport> {
        let now = self.now_ms();
        self.registry
            .iter_display_order()
            .into_iter()
            .map(|series| {
                let short = short_window_stats(series, now);
                let full = full_window_stats(series, now, &self.window);
                let verdict = short.map(|s| classify(s.avg, self.spec.min_value));
                SeriesReport {
                    id: series.id.clone(),
                    display_name: series.display_name.clone(),
                    color: series.color.clone(),
                    short,
                    full,
                    verdict,
                    sample_count: series.samples.len(),
                }
            })
            .collect()
    }

    pub fn set_window(&mut self, duration_ms: i64) {
        self.window.set_duration(duration_ms);
    }

    pub fn set_spec(&mut self, min_value: f64) {
        self.spec.min_value = min_value;
    }

    pub fn rename(&mut self, id: &str, name: &str) -> bool {
        self.registry.rename(id, name)
    }

    pub fn recolor(&mut self, id: &str, color: &str) -> bool {
        self.registry.recolor(id, color)
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.registry.remove(id)
    }

    /// Retire series that have gone quiet. Called on the sweep tick.
    pub fn sweep(&mut self) -> usize {
        self.registry.sweep(self.now_ms())
    }

    pub fn window(&self) -> WindowSpec {
        self.window
    }

    pub fn spec(&self) -> SpecThreshold {
        self.spec
    }

    pub fn station_mode(&self) -> Option<StationMode> {
        self.station_mode
    }

    pub fn series_count(&self) -> usize {
        self.registry.len()
    }
}
