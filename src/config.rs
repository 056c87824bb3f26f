use chrono::Duration;

/// Thresholds for the flag engine. `Default` carries the documented values.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Gap to the operator's previous event, in minutes, below which the event is `rapid`.
    pub rapid_minutes: f64,
    /// Maximum gap, in minutes, for a location change to count as a conflict.
    pub conflict_window_minutes: f64,
    /// Tests per operator per hour bucket that must be exceeded for `load_dev`.
    pub hourly_load_threshold: usize,
    pub device_hop_window: Duration,
    pub device_hop_min_devices: usize,
    pub shift_lookback: Duration,
    pub shift_overrun: Duration,
    pub coloc_min_operators: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rapid_minutes: 1.0,
            conflict_window_minutes: 5.0,
            hourly_load_threshold: 20,
            device_hop_window: Duration::minutes(10),
            device_hop_min_devices: 3,
            shift_lookback: Duration::hours(24),
            shift_overrun: Duration::hours(14),
            coloc_min_operators: 3,
        }
    }
}

impl EngineConfig {
    pub fn rapid_span(&self) -> Duration {
        minutes_span(self.rapid_minutes)
    }

    pub fn conflict_window(&self) -> Duration {
        minutes_span(self.conflict_window_minutes)
    }
}

// Fractional minutes to an exact nanosecond span; `as` saturates out-of-range values.
fn minutes_span(minutes: f64) -> Duration {
    Duration::nanoseconds((minutes * 60e9) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = EngineConfig::default();
        assert_eq!(config.rapid_minutes, 1.0);
        assert_eq!(config.conflict_window_minutes, 5.0);
        assert_eq!(config.hourly_load_threshold, 20);
        assert_eq!(config.device_hop_window.num_minutes(), 10);
        assert_eq!(config.device_hop_min_devices, 3);
        assert_eq!(config.shift_lookback.num_hours(), 24);
        assert_eq!(config.shift_overrun.num_hours(), 14);
        assert_eq!(config.coloc_min_operators, 3);
    }

    #[test]
    fn minute_thresholds_convert_to_exact_spans() {
        let config = EngineConfig {
            rapid_minutes: 0.5,
            ..EngineConfig::default()
        };
        assert_eq!(config.rapid_span(), Duration::seconds(30));
        assert_eq!(config.conflict_window(), Duration::minutes(5));
        assert_eq!(
            EngineConfig { rapid_minutes: 0.1, ..EngineConfig::default() }.rapid_span(),
            Duration::seconds(6)
        );
    }
}
