//! Windowed statistics and spec grading
//!
//! Two views over the same sample history: a short 5-second window for the
//! live averages table, and the full display window for scaling a plot's
//! vertical axis. Missing samples are excluded from both.

use super::types::{Series, WindowSpec};

/// Short window for the live averages table (ms).
pub const SHORT_WINDOW_MS: i64 = 5_000;

/// Width of the near-miss band below the spec minimum. Units are whatever
/// the nodes report (grams in the original deployment).
pub const NEAR_MISS_BAND: f64 = 10.0;

/// Min/max/avg over the Present samples inside a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// Grade of a windowed average against the spec threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecVerdict {
    Pass,
    NearMiss,
    Fail,
}

impl std::fmt::Display for SpecVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecVerdict::Pass => write!(f, "pass"),
            SpecVerdict::NearMiss => write!(f, "near-miss"),
            SpecVerdict::Fail => write!(f, "fail"),
        }
    }
}

fn stats_since(series: &Series, cutoff_ms: i64) -> Option<WindowStats> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut count = 0usize;

    for sample in &series.samples {
        if sample.timestamp_ms < cutoff_ms {
            continue;
        }
        if let Some(v) = sample.value.as_f64() {
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
            sum += v;
            count += 1;
        }
    }

    if count == 0 {
        return None;
    }
    Some(WindowStats {
        min,
        max,
        avg: sum / count as f64,
    })
}

/// Stats over the trailing 5 seconds. None when no Present sample qualifies.
pub fn short_window_stats(series: &Series, now_ms: i64) -> Option<WindowStats> {
    stats_since(series, now_ms - SHORT_WINDOW_MS)
}

/// Stats over the full display window, for scaling a plot's vertical axis.
/// A flat window (min == max) is expanded by 0.5 unit each way so the scale
/// never collapses to zero height.
pub fn full_window_stats(series: &Series, now_ms: i64, window: &WindowSpec) -> Option<WindowStats> {
    let mut stats = stats_since(series, now_ms - window.duration_ms)?;
    if stats.min == stats.max {
        stats.min -= 0.5;
        stats.max += 0.5;
    }
    Some(stats)
}

/// Grade a windowed average against the spec minimum.
pub fn classify(avg: f64, min_spec: f64) -> SpecVerdict {
    if avg >= min_spec {
        SpecVerdict::Pass
    } else if min_spec - avg <= NEAR_MISS_BAND {
        SpecVerdict::NearMiss
    } else {
        SpecVerdict::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::Sample;

    fn make_series(samples: &[(i64, Option<f64>)]) -> Series {
        let mut series = Series::new("1", None, 0);
        for (t, v) in samples {
            let sample = match v {
                Some(v) => Sample::present(*t, *v),
                None => Sample::missing(*t),
            };
            series.samples.push_back(sample);
        }
        series
    }

    #[test]
    fn test_short_window_drops_old_and_missing() {
        // Relative to now=0 with a 5 s window, only the -4000 and -1000
        // readings qualify: avg 25
        let series = make_series(&[(-6_000, Some(10.0)), (-4_000, Some(20.0)), (-1_000, Some(30.0))]);
        let stats = short_window_stats(&series, 0).unwrap();
        assert_eq!(stats.avg, 25.0);
        assert_eq!(stats.min, 20.0);
        assert_eq!(stats.max, 30.0);
    }

    #[test]
    fn test_short_window_empty_when_only_missing() {
        let series = make_series(&[(-2_000, None), (-1_000, None)]);
        assert!(short_window_stats(&series, 0).is_none());

        let empty = make_series(&[]);
        assert!(short_window_stats(&empty, 0).is_none());
    }

    #[test]
    fn test_full_window_expands_degenerate_range() {
        let series = make_series(&[(-3_000, Some(42.0)), (-1_000, Some(42.0))]);
        let window = WindowSpec::new(10_000);
        let stats = full_window_stats(&series, 0, &window).unwrap();
        assert_eq!(stats.min, 41.5);
        assert_eq!(stats.max, 42.5);
        assert_eq!(stats.avg, 42.0);
    }

    #[test]
    fn test_full_window_uses_current_window_spec() {
        let series = make_series(&[(-8_000, Some(10.0)), (-1_000, Some(30.0))]);
        let narrow = WindowSpec::new(5_000);
        let wide = WindowSpec::new(10_000);

        assert_eq!(full_window_stats(&series, 0, &narrow).unwrap().avg, 30.0);
        assert_eq!(full_window_stats(&series, 0, &wide).unwrap().avg, 20.0);
    }

    #[test]
    fn test_classify_bands() {
        assert_eq!(classify(560.0, 550.0), SpecVerdict::Pass);
        assert_eq!(classify(550.0, 550.0), SpecVerdict::Pass);
        assert_eq!(classify(545.0, 550.0), SpecVerdict::NearMiss);
        assert_eq!(classify(540.0, 550.0), SpecVerdict::NearMiss);
        assert_eq!(classify(530.0, 550.0), SpecVerdict::Fail);
    }
}
