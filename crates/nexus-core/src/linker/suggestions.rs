use crate::error::{NexusError, Result};
use crate::linker::LinkerConfig;
use crate::rules::{RecordLinkRule, RuleUsageStatistics};
use crate::scorer::ScoreOutcome;
use crate::storage::{Storage, SuggestionFilter};
use crate::types::{
    EvidenceItem, LinkSuggestion, RecordLink, RuleId, SuggestionFeedback, SuggestionId,
    SuggestionStatus,
};
use chrono::Utc;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};

/// Sharded locks serializing read-modify-write sequences per
/// suggestion key, so concurrent upserts of the same pair cannot
/// interleave.
struct KeyLocks {
    shards: Vec<Mutex<()>>,
}

impl KeyLocks {
    fn new(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    fn lock(&self, key: &(String, String, String)) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let shard = (hasher.finish() as usize) % self.shards.len();
        // A poisoned shard only means another upsert panicked; the
        // guard itself carries no data.
        match self.shards[shard].lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Outcome of upserting one scored candidate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No suggestion existed for the key; a new pending one was created.
    Created,

    /// A pending suggestion existed with equivalent evidence; its
    /// score/evidence were refreshed in place.
    Updated,

    /// A pending suggestion existed with materially different
    /// evidence; it was superseded and a new one created.
    Superseded,

    /// A recent rejection with equivalent evidence suppressed this
    /// match.
    SkippedCooldown,
}

/// How a reviewer resolved a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Accept,
    Reject,
}

/// Drives the suggestion state machine: dedup on upsert, supersede on
/// evidence drift, transactional accept, reject with cool-down, TTL
/// expiry.
pub struct SuggestionManager<S: Storage> {
    storage: Arc<S>,
    config: LinkerConfig,
    locks: KeyLocks,
    /// Serializes rule usage read-modify-write across scan and
    /// resolution paths.
    rule_lock: Mutex<()>,
}

impl<S: Storage> SuggestionManager<S> {
    pub fn new(storage: Arc<S>, config: LinkerConfig) -> Self {
        let locks = KeyLocks::new(config.upsert_shards);
        Self {
            storage,
            config,
            locks,
            rule_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Upsert a suggestion for a scored pair that met its rule's
    /// threshold. Serialized per key.
    pub fn upsert_scored(
        &self,
        rule: &RecordLinkRule,
        source_record_id: &str,
        target_record_id: &str,
        outcome: &ScoreOutcome,
    ) -> Result<UpsertOutcome> {
        let key = (
            source_record_id.to_string(),
            target_record_id.to_string(),
            rule.link_type.as_str().to_string(),
        );
        let _guard = self.locks.lock(&key);

        let history =
            self.storage
                .suggestions_for_key(source_record_id, target_record_id, rule.link_type.as_str())?;

        // At most one pending suggestion per key at any time.
        if let Some(pending) = history
            .iter()
            .find(|s| s.status == SuggestionStatus::Pending)
        {
            if evidence_differs(&pending.evidence, &outcome.evidence, self.config.evidence_epsilon)
            {
                let mut superseded = pending.clone();
                superseded.transition(SuggestionStatus::Superseded)?;
                self.storage.put_suggestion(&superseded)?;

                let fresh = self.build_suggestion(rule, source_record_id, target_record_id, outcome);
                self.storage.put_suggestion(&fresh)?;
                return Ok(UpsertOutcome::Superseded);
            }

            let mut refreshed = pending.clone();
            refreshed.confidence = outcome.confidence.clamp(0.0, 1.0);
            refreshed.evidence = outcome.evidence.clone();
            self.storage.put_suggestion(&refreshed)?;
            return Ok(UpsertOutcome::Updated);
        }

        // A recent rejection with the same evidence holds the key cold.
        let cooldown =
            chrono::Duration::from_std(self.config.rejection_cooldown).unwrap_or_else(|_| {
                chrono::Duration::days(7)
            });
        let now = Utc::now();
        let recently_rejected = history.iter().any(|s| {
            s.status == SuggestionStatus::Rejected
                && s.reviewed_at
                    .map(|at| now - at < cooldown)
                    .unwrap_or(false)
                && !evidence_differs(&s.evidence, &outcome.evidence, self.config.evidence_epsilon)
        });
        if recently_rejected {
            return Ok(UpsertOutcome::SkippedCooldown);
        }

        let fresh = self.build_suggestion(rule, source_record_id, target_record_id, outcome);
        self.storage.put_suggestion(&fresh)?;
        Ok(UpsertOutcome::Created)
    }

    fn build_suggestion(
        &self,
        rule: &RecordLinkRule,
        source_record_id: &str,
        target_record_id: &str,
        outcome: &ScoreOutcome,
    ) -> LinkSuggestion {
        let reason = format!(
            "Rule '{}' matched {} of {} conditions with confidence {:.2}",
            rule.name,
            outcome.evidence.len(),
            rule.conditions.len(),
            outcome.confidence
        );
        LinkSuggestion::new(
            Some(rule.id),
            source_record_id,
            target_record_id,
            rule.link_type.clone(),
            reason,
            outcome.confidence,
            outcome.evidence.clone(),
        )
    }

    /// Accept a pending suggestion, creating its link. The link insert
    /// and the status transition commit atomically; losing a race for
    /// the link key marks the suggestion superseded and surfaces a
    /// conflict to the resolver.
    pub fn accept(&self, suggestion_id: SuggestionId, reviewer: &str) -> Result<RecordLink> {
        let key = self
            .storage
            .get_suggestion(suggestion_id)?
            .ok_or(NexusError::SuggestionNotFound(suggestion_id))?
            .dedup_key();
        let _guard = self.locks.lock(&key);

        // Re-read under the key lock; a racing resolution may have
        // settled this suggestion between the lookup and the lock.
        let suggestion = self
            .storage
            .get_suggestion(suggestion_id)?
            .ok_or(NexusError::SuggestionNotFound(suggestion_id))?;

        if suggestion.status != SuggestionStatus::Pending {
            return Err(NexusError::InvalidTransition {
                from: suggestion.status.to_string(),
                to: SuggestionStatus::Accepted.to_string(),
            });
        }

        let rule = match suggestion.rule_id {
            Some(rule_id) => self.storage.get_rule(rule_id)?,
            None => None,
        };
        let (category, bidirectional) = rule
            .as_ref()
            .map(|r| (r.relationship_category.clone(), r.bidirectional))
            .unwrap_or_else(|| ("general".to_string(), false));

        let (source_module, _) = split_endpoint(&suggestion.source_record_id);
        let (target_module, _) = split_endpoint(&suggestion.target_record_id);

        let now = Utc::now();
        let mut accepted = suggestion.clone();
        accepted.transition(SuggestionStatus::Accepted)?;
        accepted.reviewed_by = Some(reviewer.to_string());
        accepted.reviewed_at = Some(now);

        let mut link = RecordLink::new(
            source_module,
            suggestion.source_record_id.clone(),
            target_module,
            suggestion.target_record_id.clone(),
            suggestion.link_type.clone(),
            category,
            suggestion.confidence,
            bidirectional,
            reviewer,
            true,
            Some(suggestion.confidence),
        );
        link.context_metadata.insert(
            "suggestion_id".to_string(),
            serde_json::json!(suggestion.id.to_string()),
        );

        match self.storage.commit_acceptance(&accepted, &link) {
            Ok(()) => {
                if let Some(rule_id) = suggestion.rule_id {
                    self.update_rule_usage(rule_id, RuleUsageStatistics::record_accept)?;
                }
                Ok(link)
            }
            Err(NexusError::DuplicateLink { .. }) => {
                // An identical-key link landed first. The losing
                // suggestion is superseded, never silently dropped.
                let mut superseded = suggestion.clone();
                superseded.transition(SuggestionStatus::Superseded)?;
                superseded.reviewed_by = Some(reviewer.to_string());
                superseded.reviewed_at = Some(now);
                self.storage.put_suggestion(&superseded)?;

                Err(NexusError::Conflict {
                    suggestion: suggestion_id,
                    reason: "an active link with the same key already exists".into(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Reject a pending suggestion, recording reviewer feedback.
    pub fn reject(
        &self,
        suggestion_id: SuggestionId,
        reviewer: &str,
        comment: Option<String>,
    ) -> Result<()> {
        let key = self
            .storage
            .get_suggestion(suggestion_id)?
            .ok_or(NexusError::SuggestionNotFound(suggestion_id))?
            .dedup_key();
        let _guard = self.locks.lock(&key);

        let suggestion = self
            .storage
            .get_suggestion(suggestion_id)?
            .ok_or(NexusError::SuggestionNotFound(suggestion_id))?;

        if suggestion.status != SuggestionStatus::Pending {
            return Err(NexusError::InvalidTransition {
                from: suggestion.status.to_string(),
                to: SuggestionStatus::Rejected.to_string(),
            });
        }

        let now = Utc::now();
        let mut rejected = suggestion.clone();
        rejected.transition(SuggestionStatus::Rejected)?;
        rejected.reviewed_by = Some(reviewer.to_string());
        rejected.reviewed_at = Some(now);
        rejected.feedback = Some(SuggestionFeedback {
            helpful: false,
            comment,
            submitted_by: reviewer.to_string(),
            submitted_at: now,
        });
        self.storage.put_suggestion(&rejected)?;

        if let Some(rule_id) = suggestion.rule_id {
            self.update_rule_usage(rule_id, RuleUsageStatistics::record_reject)?;
        }
        Ok(())
    }

    /// Expire pending suggestions older than the TTL. Returns how many
    /// were expired.
    pub fn expire(&self) -> Result<u64> {
        let ttl = chrono::Duration::from_std(self.config.suggestion_ttl)
            .unwrap_or_else(|_| chrono::Duration::days(14));
        let cutoff = Utc::now() - ttl;

        let stale = self.storage.list_suggestions(
            SuggestionFilter::new()
                .with_status(SuggestionStatus::Pending)
                .generated_before(cutoff),
        )?;

        let mut expired = 0;
        for suggestion in stale {
            expired += self.expire_one(suggestion)?;
        }
        if expired > 0 {
            log::info!("Expired {} stale pending suggestions", expired);
        }
        Ok(expired)
    }

    /// Expire every pending suggestion touching a removed record.
    /// Part of the record-deletion cascade.
    pub fn expire_for_record(&self, record_id: &str) -> Result<u64> {
        let pending = self.storage.list_suggestions(
            SuggestionFilter::new()
                .for_record(record_id)
                .with_status(SuggestionStatus::Pending),
        )?;

        let mut expired = 0;
        for suggestion in pending {
            expired += self.expire_one(suggestion)?;
        }
        Ok(expired)
    }

    /// Expire a single suggestion if it is still pending when the key
    /// lock is held. Returns 1 on expiry, 0 if a racing resolution
    /// settled it first.
    fn expire_one(&self, suggestion: LinkSuggestion) -> Result<u64> {
        let key = suggestion.dedup_key();
        let _guard = self.locks.lock(&key);

        let current = match self.storage.get_suggestion(suggestion.id)? {
            Some(s) => s,
            None => return Ok(0),
        };
        if current.status != SuggestionStatus::Pending {
            return Ok(0);
        }
        let mut s = current;
        s.transition(SuggestionStatus::Expired)?;
        self.storage.put_suggestion(&s)?;
        Ok(1)
    }

    /// Apply a closure to a rule's usage statistics under the rule
    /// lock, so concurrent scan/resolution updates do not lose counts.
    pub fn update_rule_usage(
        &self,
        rule_id: RuleId,
        update: impl FnOnce(&mut RuleUsageStatistics),
    ) -> Result<()> {
        let _guard = match self.rule_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut rule = self
            .storage
            .get_rule(rule_id)?
            .ok_or(NexusError::RuleNotFound(rule_id))?;
        update(&mut rule.usage);
        self.storage.put_rule(&rule)
    }

    /// Record one scan execution of a rule into its usage statistics.
    pub fn record_rule_execution(
        &self,
        rule_id: RuleId,
        scored: u64,
        confidence_sum: f32,
        elapsed_ms: f64,
    ) -> Result<()> {
        self.update_rule_usage(rule_id, |usage| {
            usage.record_execution(scored, confidence_sum, elapsed_ms)
        })
    }
}

/// Whether two evidence sets differ materially: any item (keyed by
/// evidence type + field) whose strength moved more than epsilon,
/// counting appearance and disappearance as a move from zero.
pub fn evidence_differs(a: &[EvidenceItem], b: &[EvidenceItem], epsilon: f32) -> bool {
    fn strengths(items: &[EvidenceItem]) -> HashMap<(String, String), f32> {
        items
            .iter()
            .map(|item| {
                let field = item
                    .metadata
                    .get("field")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                ((item.evidence_type.clone(), field), item.strength)
            })
            .collect()
    }

    let a = strengths(a);
    let b = strengths(b);

    a.keys()
        .chain(b.keys())
        .any(|key| {
            let x = a.get(key).copied().unwrap_or(0.0);
            let y = b.get(key).copied().unwrap_or(0.0);
            (x - y).abs() > epsilon
        })
}

fn split_endpoint(composite: &str) -> (String, String) {
    match composite.split_once('/') {
        Some((module, record_id)) => (module.to_string(), record_id.to_string()),
        None => (String::new(), composite.to_string()),
    }
}
