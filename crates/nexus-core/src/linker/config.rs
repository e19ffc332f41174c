use crate::error::Result;
use std::time::Duration;

/// Configuration for the scan and suggestion lifecycle.
#[derive(Debug, Clone)]
pub struct LinkerConfig {
    /// Pending suggestions older than this are expired by the sweep.
    /// Default: 14 days.
    pub suggestion_ttl: Duration,

    /// A rejected suggestion suppresses regeneration of an
    /// identical-evidence suggestion for this long. Default: 7 days.
    pub rejection_cooldown: Duration,

    /// Evidence strengths within this epsilon count as unchanged; a
    /// larger difference supersedes the pending suggestion.
    /// Default: 0.05.
    pub evidence_epsilon: f32,

    /// Candidate pairs evaluated per rule execution. Safety valve
    /// against a module-pair blowup. Default: 100_000.
    pub max_pairs_per_rule: usize,

    /// Shard count for the per-key upsert locks. Default: 16.
    pub upsert_shards: usize,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            suggestion_ttl: Duration::from_secs(14 * 24 * 3600),
            rejection_cooldown: Duration::from_secs(7 * 24 * 3600),
            evidence_epsilon: 0.05,
            max_pairs_per_rule: 100_000,
            upsert_shards: 16,
        }
    }
}

impl LinkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_suggestion_ttl(mut self, ttl: Duration) -> Self {
        self.suggestion_ttl = ttl;
        self
    }

    pub fn with_rejection_cooldown(mut self, cooldown: Duration) -> Self {
        self.rejection_cooldown = cooldown;
        self
    }

    pub fn with_evidence_epsilon(mut self, epsilon: f32) -> Self {
        self.evidence_epsilon = epsilon;
        self
    }

    pub fn with_max_pairs_per_rule(mut self, max: usize) -> Self {
        self.max_pairs_per_rule = max;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.evidence_epsilon) {
            return Err(crate::error::NexusError::Validation(
                "evidence_epsilon must be between 0.0 and 1.0".into(),
            ));
        }
        if self.max_pairs_per_rule == 0 {
            return Err(crate::error::NexusError::Validation(
                "max_pairs_per_rule must be > 0".into(),
            ));
        }
        if self.upsert_shards == 0 {
            return Err(crate::error::NexusError::Validation(
                "upsert_shards must be > 0".into(),
            ));
        }
        Ok(())
    }
}
