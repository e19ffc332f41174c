use crate::error::{NexusError, Result};
use crate::index::{RecordDraft, RecordIndex};
use crate::linker::{LinkScanner, LinkerConfig, ReviewDecision, ScanMetrics, SuggestionManager};
use crate::matcher::MatcherRegistry;
use crate::rules::RecordLinkRule;
use crate::storage::{LinkFilter, RedbStorage, Storage, StoreStats, SuggestionFilter};
use crate::types::{
    LinkId, LinkSuggestion, LinkType, LinkableRecord, RecordLink, RuleId, SuggestionId,
    SuggestionStatus,
};
use crate::validate::{LinkValidator, SweepReport};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

/// Config for embedded library mode.
#[derive(Debug, Clone, Default)]
pub struct NexusConfig {
    /// Scan and suggestion lifecycle tuning.
    pub linker: LinkerConfig,
}

/// High-level, embedded record-linking API. No server required.
///
/// Collaborator modules push record surrogates in, run scans, and read
/// suggestions and links back out.
///
/// # Example
/// ```rust,no_run
/// use nexus_core::{Nexus, NexusConfig, RecordDraft};
///
/// let nexus = Nexus::open("./links.redb", NexusConfig::default()).unwrap();
/// nexus.index_record(RecordDraft::new("vendors", "V-1001")).unwrap();
/// let metrics = nexus.scan().unwrap();
/// ```
pub struct Nexus {
    storage: Arc<RedbStorage>,
    index: Arc<RecordIndex>,
    manager: Arc<SuggestionManager<RedbStorage>>,
    validator: LinkValidator<RedbStorage>,
    scanner: Mutex<LinkScanner<RedbStorage>>,
}

impl Nexus {
    /// Open (or create) a link database at the given path, with the
    /// built-in matchers.
    pub fn open(path: impl AsRef<Path>, config: NexusConfig) -> Result<Self> {
        Self::open_with_registry(path, config, MatcherRegistry::new())
    }

    /// Open with a caller-assembled matcher registry, for collaborators
    /// that plug in semantic/neural/custom matchers.
    pub fn open_with_registry(
        path: impl AsRef<Path>,
        config: NexusConfig,
        registry: MatcherRegistry,
    ) -> Result<Self> {
        config.linker.validate()?;

        let storage = Arc::new(RedbStorage::open(path.as_ref())?);
        let index = Arc::new(RecordIndex::new());
        let registry = Arc::new(registry);
        let manager = Arc::new(SuggestionManager::new(
            storage.clone(),
            config.linker.clone(),
        ));
        let validator = LinkValidator::new(storage.clone(), index.clone());
        let scanner = Mutex::new(LinkScanner::new(
            index.clone(),
            manager.clone(),
            registry,
            config.linker,
        )?);

        Ok(Self {
            storage,
            index,
            manager,
            validator,
            scanner,
        })
    }

    // === Record surface ===

    /// Index or refresh a record surrogate. Called by each module on
    /// its own create/update.
    pub fn index_record(&self, draft: RecordDraft) -> Result<LinkableRecord> {
        self.index.upsert(draft)
    }

    /// Remove a record surrogate on source deletion. Pending
    /// suggestions touching it are expired immediately; its links are
    /// marked broken by the next validation sweep. Returns how many
    /// suggestions were expired.
    pub fn remove_record(&self, module: &str, record_id: &str) -> Result<u64> {
        let removed = self.index.remove(module, record_id)?;
        match removed {
            Some(record) => {
                let composite = format!("{}/{}", record.module, record.record_id);

                let orphaned = self
                    .storage
                    .links_for_record(&composite)?
                    .iter()
                    .filter(|l| l.active)
                    .count();
                if orphaned > 0 {
                    log::info!(
                        "Record {} removed with {} active links; the next validation sweep will mark them broken",
                        composite,
                        orphaned
                    );
                }

                self.manager.expire_for_record(&composite)
            }
            None => Ok(0),
        }
    }

    /// Get a record surrogate.
    pub fn record(&self, module: &str, record_id: &str) -> Result<Option<Arc<LinkableRecord>>> {
        self.index.get(module, record_id)
    }

    /// Query the record index.
    pub fn query_records(
        &self,
        module: Option<&str>,
        keywords: Option<&[&str]>,
    ) -> Result<Vec<Arc<LinkableRecord>>> {
        self.index.query(module, keywords)
    }

    // === Scan surface ===

    /// Run one full scan over every enabled rule.
    pub fn scan(&self) -> Result<ScanMetrics> {
        self.scan_cancellable(&AtomicBool::new(false))
    }

    /// Run a scan that stops between candidate pairs once `cancel` is
    /// set. Suggestions upserted before cancellation stay.
    pub fn scan_cancellable(&self, cancel: &AtomicBool) -> Result<ScanMetrics> {
        let mut scanner = self
            .scanner
            .lock()
            .map_err(|_| NexusError::Validation("Scanner lock poisoned".into()))?;
        scanner.run_cycle(cancel)?;
        Ok(scanner.metrics().clone())
    }

    /// Expire pending suggestions older than the configured TTL.
    pub fn expire_suggestions(&self) -> Result<u64> {
        self.manager.expire()
    }

    // === Suggestion surface ===

    /// Pending suggestions touching a record, for a review UI.
    pub fn list_suggestions(&self, record_id: &str) -> Result<Vec<LinkSuggestion>> {
        self.storage.list_suggestions(
            SuggestionFilter::new()
                .for_record(record_id)
                .with_status(SuggestionStatus::Pending),
        )
    }

    /// Suggestions matching an arbitrary filter.
    pub fn list_suggestions_filtered(
        &self,
        filter: SuggestionFilter,
    ) -> Result<Vec<LinkSuggestion>> {
        self.storage.list_suggestions(filter)
    }

    pub fn suggestion(&self, id: SuggestionId) -> Result<Option<LinkSuggestion>> {
        self.storage.get_suggestion(id)
    }

    /// Accept or reject a suggestion. Accepting returns the created
    /// link; rejecting records feedback and returns None.
    pub fn resolve_suggestion(
        &self,
        id: SuggestionId,
        decision: ReviewDecision,
        reviewer: &str,
        feedback: Option<String>,
    ) -> Result<Option<RecordLink>> {
        match decision {
            ReviewDecision::Accept => self.manager.accept(id, reviewer).map(Some),
            ReviewDecision::Reject => {
                self.manager.reject(id, reviewer, feedback)?;
                Ok(None)
            }
        }
    }

    // === Link surface ===

    /// Links for a record: outgoing, plus incoming bidirectional ones.
    pub fn list_links(
        &self,
        record_id: &str,
        link_type: Option<&str>,
    ) -> Result<Vec<RecordLink>> {
        let mut filter = LinkFilter::new().for_record(record_id);
        if let Some(link_type) = link_type {
            filter = filter.with_link_type(link_type);
        }
        self.storage.list_links(filter)
    }

    /// Links matching an arbitrary filter.
    pub fn list_links_filtered(&self, filter: LinkFilter) -> Result<Vec<RecordLink>> {
        self.storage.list_links(filter)
    }

    pub fn link_by_id(&self, id: LinkId) -> Result<Option<RecordLink>> {
        self.storage.get_link(id)
    }

    /// Create a manual link between two indexed records.
    #[allow(clippy::too_many_arguments)]
    pub fn link(
        &self,
        source_module: &str,
        source_record_id: &str,
        target_module: &str,
        target_record_id: &str,
        link_type: LinkType,
        relationship_category: &str,
        bidirectional: bool,
        created_by: &str,
    ) -> Result<RecordLink> {
        let source = self
            .index
            .get(source_module, source_record_id)?
            .ok_or_else(|| NexusError::RecordNotFound {
                module: source_module.to_string(),
                record_id: source_record_id.to_string(),
            })?;
        let target = self
            .index
            .get(target_module, target_record_id)?
            .ok_or_else(|| NexusError::RecordNotFound {
                module: target_module.to_string(),
                record_id: target_record_id.to_string(),
            })?;

        let link = RecordLink::new(
            source.module.clone(),
            format!("{}/{}", source.module, source.record_id),
            target.module.clone(),
            format!("{}/{}", target.module, target.record_id),
            link_type,
            relationship_category,
            1.0,
            bidirectional,
            created_by,
            false,
            None,
        );
        self.storage.put_link(&link)?;
        Ok(link)
    }

    /// Deactivate a link. The edge stays in the store for audit; its
    /// key becomes free again.
    pub fn unlink(&self, id: LinkId) -> Result<()> {
        let mut link = self
            .storage
            .get_link(id)?
            .ok_or(NexusError::LinkNotFound(id))?;
        link.active = false;
        self.storage.update_link(&link)
    }

    /// Hard-delete a link. The explicit operator action for broken
    /// edges; nothing in the engine calls this.
    pub fn delete_link(&self, id: LinkId) -> Result<()> {
        self.storage.delete_link(id)
    }

    /// Revalidate every active link against the record index.
    pub fn validate_links(&self) -> Result<SweepReport> {
        self.validator.run_sweep()
    }

    // === Rule administration ===

    /// Register a new rule. Validates threshold and weights.
    pub fn create_rule(&self, rule: RecordLinkRule) -> Result<RuleId> {
        rule.validate()?;
        self.storage.put_rule(&rule)?;
        Ok(rule.id)
    }

    /// Update a rule in place. Usage statistics are preserved from the
    /// stored version; reset is a separate, explicit call.
    pub fn update_rule(&self, mut rule: RecordLinkRule) -> Result<()> {
        rule.validate()?;
        let existing = self
            .storage
            .get_rule(rule.id)?
            .ok_or(NexusError::RuleNotFound(rule.id))?;
        rule.usage = existing.usage;
        rule.created_at = existing.created_at;
        rule.updated_at = chrono::Utc::now();
        self.storage.put_rule(&rule)
    }

    pub fn disable_rule(&self, id: RuleId) -> Result<()> {
        let mut rule = self
            .storage
            .get_rule(id)?
            .ok_or(NexusError::RuleNotFound(id))?;
        rule.enabled = false;
        rule.updated_at = chrono::Utc::now();
        self.storage.put_rule(&rule)
    }

    pub fn enable_rule(&self, id: RuleId) -> Result<()> {
        let mut rule = self
            .storage
            .get_rule(id)?
            .ok_or(NexusError::RuleNotFound(id))?;
        rule.enabled = true;
        rule.updated_at = chrono::Utc::now();
        self.storage.put_rule(&rule)
    }

    pub fn rule(&self, id: RuleId) -> Result<Option<RecordLinkRule>> {
        self.storage.get_rule(id)
    }

    pub fn list_rules(&self) -> Result<Vec<RecordLinkRule>> {
        self.storage.list_rules()
    }

    /// A rule's accumulated usage counters, for operator tuning.
    pub fn rule_usage(&self, id: RuleId) -> Result<crate::rules::RuleUsageStatistics> {
        let rule = self
            .storage
            .get_rule(id)?
            .ok_or(NexusError::RuleNotFound(id))?;
        Ok(rule.usage)
    }

    /// Explicitly zero a rule's usage counters.
    pub fn reset_rule_usage(&self, id: RuleId) -> Result<()> {
        self.manager.update_rule_usage(id, |usage| usage.reset())
    }

    // === Maintenance ===

    pub fn stats(&self) -> Result<StoreStats> {
        self.storage.stats()
    }
}
