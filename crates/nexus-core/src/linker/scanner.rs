use crate::error::Result;
use crate::index::RecordIndex;
use crate::linker::{LinkerConfig, ScanMetrics, SuggestionManager, UpsertOutcome};
use crate::matcher::MatcherRegistry;
use crate::rules::RecordLinkRule;
use crate::scorer::{self, ScoreOutcome};
use crate::storage::Storage;
use crate::types::LinkableRecord;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

const CYCLE_COUNT_KEY: &str = "link_scanner_cycle_count";

/// One evaluated candidate pair, before threshold filtering.
struct PairResult {
    source: String,
    target: String,
    outcome: ScoreOutcome,
}

/// Scan orchestrator: enumerates candidate pairs per enabled rule,
/// fans evaluation out across a worker pool, and hands matches to the
/// suggestion manager. Evaluation is pure; the only side effects are
/// the serialized suggestion upserts.
pub struct LinkScanner<S: Storage> {
    index: Arc<RecordIndex>,
    manager: Arc<SuggestionManager<S>>,
    registry: Arc<MatcherRegistry>,
    config: LinkerConfig,
    metrics: ScanMetrics,
}

impl<S: Storage> LinkScanner<S> {
    pub fn new(
        index: Arc<RecordIndex>,
        manager: Arc<SuggestionManager<S>>,
        registry: Arc<MatcherRegistry>,
        config: LinkerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mut metrics = ScanMetrics::new();
        metrics.cycles = Self::load_cycle_count(manager.storage())?;

        Ok(Self {
            index,
            manager,
            registry,
            config,
            metrics,
        })
    }

    /// Load the lifetime cycle count from persistent storage.
    fn load_cycle_count(storage: &Arc<S>) -> Result<u64> {
        match storage.get_metadata(CYCLE_COUNT_KEY)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(0),
        }
    }

    /// Save the lifetime cycle count to persistent storage.
    fn save_cycle_count(&self) -> Result<()> {
        let bytes = serde_json::to_vec(&self.metrics.cycles)?;
        self.manager.storage().put_metadata(CYCLE_COUNT_KEY, &bytes)
    }

    /// Run one full scan over every enabled rule.
    pub fn run_cycle(&mut self, cancel: &AtomicBool) -> Result<()> {
        let start = Instant::now();
        self.metrics.reset_cycle_metrics();

        let rules: Vec<RecordLinkRule> = self
            .manager
            .storage()
            .list_rules()?
            .into_iter()
            .filter(|r| r.enabled)
            .collect();

        for rule in &rules {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            self.metrics.rules_evaluated += 1;
            self.run_rule(rule, cancel)?;
        }

        self.metrics.cancelled = cancel.load(Ordering::Relaxed);
        self.metrics.increment_cycle();
        self.metrics.set_cycle_duration(start.elapsed());
        self.save_cycle_count()?;
        log::info!("{}", self.metrics.summary());
        Ok(())
    }

    /// Evaluate one rule over its module pair.
    fn run_rule(&mut self, rule: &RecordLinkRule, cancel: &AtomicBool) -> Result<()> {
        let rule_start = Instant::now();

        let sources = self.index.by_module(&rule.source_module)?;
        let targets = self.index.by_module(&rule.target_module)?;

        let mut pairs: Vec<(Arc<LinkableRecord>, Arc<LinkableRecord>)> = Vec::new();
        'outer: for source in &sources {
            for target in &targets {
                if source.module == target.module && source.record_id == target.record_id {
                    continue;
                }
                if pairs.len() >= self.config.max_pairs_per_rule {
                    log::warn!(
                        "Rule '{}' exceeded {} candidate pairs; remainder dropped this cycle",
                        rule.name,
                        self.config.max_pairs_per_rule
                    );
                    break 'outer;
                }
                pairs.push((source.clone(), target.clone()));
            }
        }
        self.metrics.pairs_considered += pairs.len() as u64;

        let storage = self.manager.storage().clone();
        let registry = self.registry.clone();

        // Pure evaluation fans out; pairs already covered by an active
        // link of this type are skipped. Cancellation is checked
        // between pairs and simply stops producing results.
        let results: Vec<Option<PairResult>> = pairs
            .par_iter()
            .map(|(source, target)| {
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
                let source_id = format!("{}/{}", source.module, source.record_id);
                let target_id = format!("{}/{}", target.module, target.record_id);

                match storage.active_link_for_key(
                    &source_id,
                    &target_id,
                    rule.link_type.as_str(),
                    rule.bidirectional,
                ) {
                    Ok(Some(_)) => return None,
                    Ok(None) => {}
                    Err(e) => {
                        log::warn!("Link lookup failed for {} -> {}: {}", source_id, target_id, e);
                        return None;
                    }
                }

                let outcome = scorer::score(rule, source, target, &registry);
                Some(PairResult {
                    source: source_id,
                    target: target_id,
                    outcome,
                })
            })
            .collect();

        let scored: Vec<PairResult> = results.into_iter().flatten().collect();
        self.metrics.pairs_scored += scored.len() as u64;

        let scored_count = scored.len() as u64;
        let confidence_sum: f32 = scored.iter().map(|r| r.outcome.confidence).sum();

        let mut matches: Vec<PairResult> = scored
            .into_iter()
            .filter(|r| r.outcome.matches(rule))
            .collect();
        matches.sort_by(|a, b| {
            b.outcome
                .confidence
                .partial_cmp(&a.outcome.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if matches.len() > rule.max_suggestions {
            self.metrics.suggestions_capped += (matches.len() - rule.max_suggestions) as u64;
            matches.truncate(rule.max_suggestions);
        }

        for m in matches {
            match self
                .manager
                .upsert_scored(rule, &m.source, &m.target, &m.outcome)?
            {
                UpsertOutcome::Created => self.metrics.suggestions_created += 1,
                UpsertOutcome::Updated => self.metrics.suggestions_updated += 1,
                UpsertOutcome::Superseded => self.metrics.suggestions_superseded += 1,
                UpsertOutcome::SkippedCooldown => {
                    self.metrics.suggestions_skipped_cooldown += 1
                }
            }
        }

        self.manager.record_rule_execution(
            rule.id,
            scored_count,
            confidence_sum,
            rule_start.elapsed().as_secs_f64() * 1000.0,
        )?;
        Ok(())
    }

    /// Get current metrics
    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RedbStorage;
    use tempfile::TempDir;

    fn scanner_on(storage: Arc<RedbStorage>) -> LinkScanner<RedbStorage> {
        let index = Arc::new(RecordIndex::new());
        let manager = Arc::new(SuggestionManager::new(storage, LinkerConfig::default()));
        LinkScanner::new(
            index,
            manager,
            Arc::new(MatcherRegistry::new()),
            LinkerConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_cycle_count_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("scanner_test.redb");
        let storage = Arc::new(RedbStorage::open(&db_path).unwrap());

        let mut scanner = scanner_on(storage.clone());
        assert_eq!(scanner.metrics().cycles, 0);

        let cancel = AtomicBool::new(false);
        scanner.run_cycle(&cancel).unwrap();
        scanner.run_cycle(&cancel).unwrap();
        assert_eq!(scanner.metrics().cycles, 2);

        // A rebuilt scanner on the same storage resumes the count.
        let rebuilt = scanner_on(storage);
        assert_eq!(rebuilt.metrics().cycles, 2);
    }
}
