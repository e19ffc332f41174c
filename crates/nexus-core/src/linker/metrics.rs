use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Metrics for scan observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMetrics {
    /// Total scan cycles completed.
    pub cycles: u64,

    /// Enabled rules evaluated this cycle.
    pub rules_evaluated: u64,

    /// Candidate pairs enumerated this cycle.
    pub pairs_considered: u64,

    /// Pairs actually scored (not skipped by existing links).
    pub pairs_scored: u64,

    /// New suggestions created this cycle.
    pub suggestions_created: u64,

    /// Pending suggestions refreshed in place this cycle.
    pub suggestions_updated: u64,

    /// Pending suggestions superseded by new evidence this cycle.
    pub suggestions_superseded: u64,

    /// Matches suppressed by the rejection cool-down this cycle.
    pub suggestions_skipped_cooldown: u64,

    /// Matches dropped by per-rule max_suggestions caps this cycle.
    pub suggestions_capped: u64,

    /// Whether this cycle was cancelled mid-flight.
    pub cancelled: bool,

    /// Processing time for last cycle.
    #[serde(with = "duration_serializer")]
    pub last_cycle_duration: Duration,
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self {
            cycles: 0,
            rules_evaluated: 0,
            pairs_considered: 0,
            pairs_scored: 0,
            suggestions_created: 0,
            suggestions_updated: 0,
            suggestions_superseded: 0,
            suggestions_skipped_cooldown: 0,
            suggestions_capped: 0,
            cancelled: false,
            last_cycle_duration: Duration::from_secs(0),
        }
    }
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-cycle metrics (called at start of each cycle)
    pub fn reset_cycle_metrics(&mut self) {
        self.rules_evaluated = 0;
        self.pairs_considered = 0;
        self.pairs_scored = 0;
        self.suggestions_created = 0;
        self.suggestions_updated = 0;
        self.suggestions_superseded = 0;
        self.suggestions_skipped_cooldown = 0;
        self.suggestions_capped = 0;
        self.cancelled = false;
    }

    pub fn increment_cycle(&mut self) {
        self.cycles += 1;
    }

    pub fn set_cycle_duration(&mut self, duration: Duration) {
        self.last_cycle_duration = duration;
    }

    /// Get a summary string for logging
    pub fn summary(&self) -> String {
        format!(
            "Scan #{}: {} rules, {}/{} pairs scored, {} created, {} updated, \
             {} superseded, {} cooldown-skipped, {} capped in {:?}{}",
            self.cycles,
            self.rules_evaluated,
            self.pairs_scored,
            self.pairs_considered,
            self.suggestions_created,
            self.suggestions_updated,
            self.suggestions_superseded,
            self.suggestions_skipped_cooldown,
            self.suggestions_capped,
            self.last_cycle_duration,
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}

// Custom serializer for Duration
mod duration_serializer {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
