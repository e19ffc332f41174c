use crate::error::Result;
use crate::rules::RecordLinkRule;
use crate::storage::filters::{LinkFilter, StoreStats, SuggestionFilter};
use crate::types::{LinkId, LinkSuggestion, RecordLink, RuleId, SuggestionId};

/// Storage trait for the durable side of the engine: links,
/// suggestions, and rules.
pub trait Storage: Send + Sync {
    // === Link Operations ===

    /// Insert a new link. Enforces the uniqueness invariant: an active
    /// link with the same (source, target, link_type) key, or the
    /// reversed key when either side is bidirectional, makes this
    /// fail with `DuplicateLink` without mutating the store.
    fn put_link(&self, link: &RecordLink) -> Result<()>;

    /// Retrieve a link by ID
    fn get_link(&self, id: LinkId) -> Result<Option<RecordLink>>;

    /// Update an existing link in place (validation status, active
    /// flag). No-key-change updates only; fails if the link is unknown.
    fn update_link(&self, link: &RecordLink) -> Result<()>;

    /// Hard delete. Explicit operator action, the sweep never calls it.
    fn delete_link(&self, id: LinkId) -> Result<()>;

    /// List links matching the filter
    fn list_links(&self, filter: LinkFilter) -> Result<Vec<RecordLink>>;

    /// All links touching a record, either direction, any state.
    fn links_for_record(&self, record_id: &str) -> Result<Vec<RecordLink>>;

    /// The active link occupying a key, if any. Checks the reversed
    /// key too when `bidirectional` is set on the probe or the stored
    /// link.
    fn active_link_for_key(
        &self,
        source: &str,
        target: &str,
        link_type: &str,
        bidirectional: bool,
    ) -> Result<Option<RecordLink>>;

    // === Suggestion Operations ===

    /// Insert or update a suggestion by id.
    fn put_suggestion(&self, suggestion: &LinkSuggestion) -> Result<()>;

    /// Retrieve a suggestion by ID
    fn get_suggestion(&self, id: SuggestionId) -> Result<Option<LinkSuggestion>>;

    /// List suggestions matching the filter
    fn list_suggestions(&self, filter: SuggestionFilter) -> Result<Vec<LinkSuggestion>>;

    /// Every suggestion ever generated for a dedup key, any status.
    fn suggestions_for_key(
        &self,
        source: &str,
        target: &str,
        link_type: &str,
    ) -> Result<Vec<LinkSuggestion>>;

    /// Atomically persist an acceptance: the new link and the accepted
    /// suggestion commit together or not at all. Fails with
    /// `DuplicateLink` (nothing written) when the key is already taken.
    fn commit_acceptance(&self, suggestion: &LinkSuggestion, link: &RecordLink) -> Result<()>;

    // === Rule Operations ===

    /// Insert or update a rule by id.
    fn put_rule(&self, rule: &RecordLinkRule) -> Result<()>;

    /// Retrieve a rule by ID
    fn get_rule(&self, id: RuleId) -> Result<Option<RecordLinkRule>>;

    /// All rules, enabled or not.
    fn list_rules(&self) -> Result<Vec<RecordLinkRule>>;

    /// Hard delete a rule.
    fn delete_rule(&self, id: RuleId) -> Result<()>;

    // === Metadata ===

    /// Store metadata key-value pair
    fn put_metadata(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Retrieve metadata by key
    fn get_metadata(&self, key: &str) -> Result<Option<Vec<u8>>>;

    // === Maintenance ===

    /// Get store statistics
    fn stats(&self) -> Result<StoreStats>;
}
