//! Dynamic per-node series registry
//!
//! Owns every live Series. Capacity is fixed: a new node arriving at a full
//! registry evicts the least-recently-updated series (lowest id on a tie)
//! rather than failing. A periodic sweep retires nodes that have stopped
//! reporting. All mutation is synchronous; change notifications go out on an
//! unbounded channel so the presentation adapter can mirror the lifecycle
//! without ever holding a Series.

use std::collections::HashMap;

use tokio::sync::mpsc;

use super::types::{id_order_key, RegistryEvent, RemovalReason, Sample, Series, WindowSpec};
use super::window::RollingWindow;

pub struct SeriesRegistry {
    capacity: usize,
    stale_timeout_ms: i64,
    series: HashMap<String, Series>,
    events: mpsc::UnboundedSender<RegistryEvent>,
}

impl SeriesRegistry {
    pub fn new(
        capacity: usize,
        stale_timeout_ms: i64,
        events: mpsc::UnboundedSender<RegistryEvent>,
    ) -> Self {
        Self {
            capacity,
            stale_timeout_ms,
            series: HashMap::new(),
            events,
        }
    }

    /// Resolve an id to its Series, creating it on first sight.
    ///
    /// At capacity, the series with the least-recent `last_update_ms` is
    /// evicted first; exact ties break toward the lowest id so eviction is
    /// deterministic. Registration itself never fails.
    pub fn register(&mut self, id: &str, name: Option<&str>, now_ms: i64) -> &mut Series {
        if !self.series.contains_key(id) {
            if self.series.len() >= self.capacity {
                if let Some(evict_id) = self.least_recently_updated() {
                    self.remove_with_reason(&evict_id, RemovalReason::CapacityEvicted);
                }
            }
            self.series
                .insert(id.to_string(), Series::new(id, name, now_ms));
            self.notify(RegistryEvent::Created { id: id.to_string() });
        }
        // Key is present in both branches
        self.series.get_mut(id).unwrap()
    }

    /// Route a sample into a series's window buffer.
    ///
    /// Recency only advances on Present values: a node reporting nothing but
    /// nulls keeps its gap markers yet still ages toward the sweep.
    pub fn touch(
        &mut self,
        id: &str,
        name: Option<&str>,
        sample: Sample,
        window: &WindowSpec,
        now_ms: i64,
    ) {
        // A wire-provided name only applies at creation; it must not clobber
        // an operator's rename on every report
        let series = self.register(id, name, now_ms);
        series.append(sample, window, now_ms);
        if sample.value.is_present() {
            series.last_update_ms = now_ms;
        }
        self.notify(RegistryEvent::Updated { id: id.to_string() });
    }

    /// Explicit user removal. Returns false when the id is unknown.
    pub fn remove(&mut self, id: &str) -> bool {
        self.remove_with_reason(id, RemovalReason::UserRequest)
    }

    /// Retire every series whose last Present sample is older than the stale
    /// timeout. One removal notification per retired series.
    pub fn sweep(&mut self, now_ms: i64) -> usize {
        let cutoff = now_ms - self.stale_timeout_ms;
        let stale: Vec<String> = self
            .series
            .values()
            .filter(|s| s.last_update_ms < cutoff)
            .map(|s| s.id.clone())
            .collect();
        for id in &stale {
            self.remove_with_reason(id, RemovalReason::Stale);
        }
        stale.len()
    }

    /// Set the operator-chosen display name. No-op on an unknown id.
    pub fn rename(&mut self, id: &str, name: &str) -> bool {
        match self.series.get_mut(id) {
            Some(series) => {
                series.display_name = name.to_string();
                self.notify(RegistryEvent::Updated { id: id.to_string() });
                true
            }
            None => false,
        }
    }

    /// Set the operator-chosen trace color. No-op on an unknown id.
    pub fn recolor(&mut self, id: &str, color: &str) -> bool {
        match self.series.get_mut(id) {
            Some(series) => {
                series.color = color.to_string();
                self.notify(RegistryEvent::Updated { id: id.to_string() });
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Series> {
        self.series.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Series> {
        self.series.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Series in display order: most recently updated first (the order the
    /// original UI laid out its table columns), id as tie-break.
    pub fn iter_display_order(&self) -> Vec<&Series> {
        let mut all: Vec<&Series> = self.series.values().collect();
        all.sort_by(|a, b| {
            b.last_update_ms
                .cmp(&a.last_update_ms)
                .then_with(|| id_order_key(&a.id).cmp(&id_order_key(&b.id)))
        });
        all
    }

    fn least_recently_updated(&self) -> Option<String> {
        self.series
            .values()
            .min_by(|a, b| {
                a.last_update_ms
                    .cmp(&b.last_update_ms)
                    .then_with(|| id_order_key(&a.id).cmp(&id_order_key(&b.id)))
            })
            .map(|s| s.id.clone())
    }

    fn remove_with_reason(&mut self, id: &str, reason: RemovalReason) -> bool {
        if self.series.remove(id).is_some() {
            self.notify(RegistryEvent::Removed {
                id: id.to_string(),
                reason,
            });
            true
        } else {
            false
        }
    }

    fn notify(&self, event: RegistryEvent) {
        // The adapter side may be gone during shutdown; that is not an error
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_registry(capacity: usize) -> (SeriesRegistry, mpsc::UnboundedReceiver<RegistryEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SeriesRegistry::new(capacity, 300_000, tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<RegistryEvent>) -> Vec<RegistryEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn test_register_is_idempotent_per_id() {
        // Registering the same id twice resolves to the same series
        let (mut reg, mut rx) = make_registry(4);
        let window = WindowSpec::default();

        reg.touch("1", None, Sample::present(1_000, 5.0), &window, 1_000);
        reg.register("1", None, 2_000);

        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("1").unwrap().samples.len(), 1); // history survived

        let events = drain(&mut rx);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, RegistryEvent::Created { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_remove_and_reregister_is_a_fresh_series() {
        let (mut reg, _rx) = make_registry(4);
        let window = WindowSpec::default();

        reg.touch("1", None, Sample::present(1_000, 5.0), &window, 1_000);
        assert!(reg.remove("1"));
        assert!(!reg.remove("1")); // already gone

        reg.register("1", None, 2_000);
        assert!(reg.get("1").unwrap().samples.is_empty());
    }

    #[test]
    fn test_capacity_evicts_exactly_one_least_recent() {
        let (mut reg, mut rx) = make_registry(2);
        let window = WindowSpec::default();

        reg.touch("1", None, Sample::present(1_000, 1.0), &window, 1_000);
        reg.touch("2", None, Sample::present(2_000, 2.0), &window, 2_000);
        drain(&mut rx);

        // "3" arrives at capacity: "1" (least recent) goes, nothing else
        reg.touch("3", None, Sample::present(3_000, 3.0), &window, 3_000);

        assert_eq!(reg.len(), 2);
        assert!(reg.get("1").is_none());
        assert!(reg.get("2").is_some());
        assert!(reg.get("3").is_some());

        let removals: Vec<RegistryEvent> = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, RegistryEvent::Removed { .. }))
            .collect();
        assert_eq!(
            removals,
            vec![RegistryEvent::Removed {
                id: "1".to_string(),
                reason: RemovalReason::CapacityEvicted,
            }]
        );
    }

    #[test]
    fn test_eviction_tie_breaks_to_lowest_id() {
        let (mut reg, _rx) = make_registry(2);
        let window = WindowSpec::default();

        // Same last_update_ms for "10" and "2"; numeric order picks "2"
        reg.touch("10", None, Sample::present(1_000, 1.0), &window, 1_000);
        reg.touch("2", None, Sample::present(1_000, 2.0), &window, 1_000);
        reg.touch("7", None, Sample::present(2_000, 3.0), &window, 2_000);

        assert!(reg.get("2").is_none());
        assert!(reg.get("10").is_some());
        assert!(reg.get("7").is_some());
    }

    #[test]
    fn test_sweep_removes_exactly_the_stale_set() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut reg = SeriesRegistry::new(4, 10_000, tx);
        let window = WindowSpec::default();

        reg.touch("1", None, Sample::present(1_000, 1.0), &window, 1_000);
        reg.touch("2", None, Sample::present(5_000, 2.0), &window, 5_000);
        reg.touch("3", None, Sample::present(11_500, 3.0), &window, 11_500);
        drain(&mut rx);

        // now=12_000, timeout=10_000: only "1" (last update 1_000) is stale
        let removed = reg.sweep(12_000);
        assert_eq!(removed, 1);
        assert!(reg.get("1").is_none());
        assert_eq!(reg.len(), 2);

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![RegistryEvent::Removed {
                id: "1".to_string(),
                reason: RemovalReason::Stale,
            }]
        );
    }

    #[test]
    fn test_missing_samples_do_not_refresh_recency() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut reg = SeriesRegistry::new(4, 10_000, tx);
        let window = WindowSpec::default();

        reg.touch("1", None, Sample::present(1_000, 1.0), &window, 1_000);
        reg.touch("1", None, Sample::missing(9_000), &window, 9_000);

        // Gap marker is kept in the history...
        assert_eq!(reg.get("1").unwrap().samples.len(), 2);
        // ...but the node still goes stale from its last Present reading
        assert_eq!(reg.sweep(12_000), 1);
    }

    #[test]
    fn test_display_order_most_recent_first() {
        let (mut reg, _rx) = make_registry(4);
        let window = WindowSpec::default();

        reg.touch("1", None, Sample::present(1_000, 1.0), &window, 1_000);
        reg.touch("2", None, Sample::present(3_000, 2.0), &window, 3_000);
        reg.touch("3", None, Sample::present(2_000, 3.0), &window, 2_000);

        let order: Vec<&str> = reg
            .iter_display_order()
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(order, vec!["2", "3", "1"]);
    }
}
