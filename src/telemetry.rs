use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::types::PredictionOutcome;

// Encoding for the last-outcome slot: 0 until the first prediction lands,
// then 1 + gauge value.
const LAST_OUTCOME_NONE: u64 = 0;

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub survived: u64,
    pub did_not_survive: u64,
    pub validation_failures: u64,
    pub decode_failures: u64,
    pub last_outcome: Option<&'static str>,
    pub uptime: String,
}

/// Process-lifetime prediction counters. Lock-free on the request path;
/// nothing is persisted, so every counter restarts at zero with the
/// process.
pub struct TelemetryStore {
    start_time: SystemTime,
    requests: AtomicU64,
    survived: AtomicU64,
    did_not_survive: AtomicU64,
    validation_failures: AtomicU64,
    decode_failures: AtomicU64,
    last_outcome: AtomicU64,
}

impl TelemetryStore {
    pub fn new() -> Self {
        TelemetryStore {
            start_time: SystemTime::now(),
            requests: AtomicU64::new(0),
            survived: AtomicU64::new(0),
            did_not_survive: AtomicU64::new(0),
            validation_failures: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            last_outcome: AtomicU64::new(LAST_OUTCOME_NONE),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: PredictionOutcome) {
        match outcome {
            PredictionOutcome::Survived => self.survived.fetch_add(1, Ordering::Relaxed),
            PredictionOutcome::DidNotSurvive => {
                self.did_not_survive.fetch_add(1, Ordering::Relaxed)
            }
        };
        self.last_outcome
            .store(1 + outcome.gauge_value(), Ordering::Relaxed);
    }

    pub fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            survived: self.survived.load(Ordering::Relaxed),
            did_not_survive: self.did_not_survive.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            last_outcome: self.last_outcome_label(),
            uptime: format_uptime(
                SystemTime::now()
                    .duration_since(self.start_time)
                    .unwrap_or(Duration::from_secs(0)),
            ),
        }
    }

    /// Prometheus text exposition served on the metrics listener.
    pub fn render_exposition(&self) -> String {
        let mut out = String::with_capacity(1024);

        let _ = writeln!(
            out,
            "# HELP survival_requests_total Prediction requests received."
        );
        let _ = writeln!(out, "# TYPE survival_requests_total counter");
        let _ = writeln!(
            out,
            "survival_requests_total {}",
            self.requests.load(Ordering::Relaxed)
        );

        let _ = writeln!(
            out,
            "# HELP survival_predictions_total Completed predictions by outcome."
        );
        let _ = writeln!(out, "# TYPE survival_predictions_total counter");
        let _ = writeln!(
            out,
            "survival_predictions_total{{outcome=\"survived\"}} {}",
            self.survived.load(Ordering::Relaxed)
        );
        let _ = writeln!(
            out,
            "survival_predictions_total{{outcome=\"did_not_survive\"}} {}",
            self.did_not_survive.load(Ordering::Relaxed)
        );

        let _ = writeln!(
            out,
            "# HELP survival_input_failures_total Requests rejected before inference."
        );
        let _ = writeln!(out, "# TYPE survival_input_failures_total counter");
        let _ = writeln!(
            out,
            "survival_input_failures_total{{reason=\"validation\"}} {}",
            self.validation_failures.load(Ordering::Relaxed)
        );
        let _ = writeln!(
            out,
            "survival_input_failures_total{{reason=\"decode\"}} {}",
            self.decode_failures.load(Ordering::Relaxed)
        );

        let last = self.last_outcome.load(Ordering::Relaxed);
        if last != LAST_OUTCOME_NONE {
            let _ = writeln!(
                out,
                "# HELP survival_last_outcome Most recent outcome (0 = survived, 1 = did not survive)."
            );
            let _ = writeln!(out, "# TYPE survival_last_outcome gauge");
            let _ = writeln!(out, "survival_last_outcome {}", last - 1);
        }

        out
    }

    fn last_outcome_label(&self) -> Option<&'static str> {
        match self.last_outcome.load(Ordering::Relaxed) {
            LAST_OUTCOME_NONE => None,
            value if value == 1 + PredictionOutcome::Survived.gauge_value() => {
                Some(PredictionOutcome::Survived.label())
            }
            _ => Some(PredictionOutcome::DidNotSurvive.label()),
        }
    }
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn format_uptime(duration: Duration) -> String {
    let total_minutes = duration.as_secs() / 60;
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes / 60) % 24;
    let minutes = total_minutes % 60;
    format!("{}d {}h {}m", days, hours, minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_with_no_outcome() {
        let telemetry = TelemetryStore::new();
        let stats = telemetry.snapshot();
        assert_eq!(stats.requests, 0);
        assert_eq!(stats.survived, 0);
        assert_eq!(stats.did_not_survive, 0);
        assert_eq!(stats.last_outcome, None);
    }

    #[test]
    fn requests_increment_by_exactly_one_each() {
        let telemetry = TelemetryStore::new();
        for _ in 0..5 {
            telemetry.record_request();
        }
        assert_eq!(telemetry.snapshot().requests, 5);
    }

    #[test]
    fn outcomes_update_counters_and_gauge() {
        let telemetry = TelemetryStore::new();
        telemetry.record_outcome(PredictionOutcome::Survived);
        telemetry.record_outcome(PredictionOutcome::DidNotSurvive);
        telemetry.record_outcome(PredictionOutcome::Survived);

        let stats = telemetry.snapshot();
        assert_eq!(stats.survived, 2);
        assert_eq!(stats.did_not_survive, 1);
        assert_eq!(stats.last_outcome, Some("Survived"));
    }

    #[test]
    fn exposition_carries_counter_and_gauge_samples() {
        let telemetry = TelemetryStore::new();
        telemetry.record_request();
        telemetry.record_outcome(PredictionOutcome::DidNotSurvive);

        let text = telemetry.render_exposition();
        assert!(text.contains("# TYPE survival_requests_total counter"));
        assert!(text.contains("survival_requests_total 1"));
        assert!(text.contains("survival_predictions_total{outcome=\"did_not_survive\"} 1"));
        assert!(text.contains("survival_last_outcome 1"));
    }

    #[test]
    fn gauge_is_omitted_before_the_first_prediction() {
        let telemetry = TelemetryStore::new();
        telemetry.record_request();
        telemetry.record_validation_failure();

        let text = telemetry.render_exposition();
        assert!(text.contains("survival_input_failures_total{reason=\"validation\"} 1"));
        assert!(!text.contains("survival_last_outcome"));
    }

    #[test]
    fn uptime_formats_days_hours_minutes() {
        let formatted = format_uptime(Duration::from_secs(26 * 3600 + 5 * 60));
        assert_eq!(formatted, "1d 2h 5m");
    }
}
