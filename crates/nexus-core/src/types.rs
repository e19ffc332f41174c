use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Type alias for rule identifiers
pub type RuleId = Uuid;

/// Type alias for suggestion identifiers
pub type SuggestionId = Uuid;

/// Type alias for link identifiers
pub type LinkId = Uuid;

/// Content address of a business record: which module owns it
/// and its id inside that module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub module: String,
    pub record_id: String,
}

impl RecordKey {
    pub fn new(module: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            record_id: record_id.into(),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.module, self.record_id)
    }
}

/// Normalized, matchable surrogate of a business record.
///
/// One per live record; the owning module pushes a fresh copy on every
/// create/update. All other components read it, none mutate it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkableRecord {
    /// Surrogate identifier. Stable across re-indexing of the same
    /// module/record_id pair. UUIDv7 for time-sortability.
    pub id: Uuid,

    /// Id of the record inside its owning module.
    pub record_id: String,

    /// Owning module. "tasks", "vendors", "reports", ...
    pub module: String,

    /// Module-local type. "invoice", "purchase_order", ...
    pub record_type: String,

    /// Human-readable title. Used for display and word-level matching.
    pub title: String,

    /// Longer free text, if the module has one.
    pub description: Option<String>,

    /// Structured key facts used for matching.
    pub metadata: RecordMetadata,

    /// Flat field map the condition evaluator resolves names against
    /// first. Values are JSON so modules can push strings, numbers,
    /// bools, or dates (RFC 3339 strings).
    pub searchable_fields: HashMap<String, Value>,

    /// When this surrogate was last (re)built.
    pub last_indexed: DateTime<Utc>,

    /// Bumped on every upsert of the same key.
    pub index_version: u64,

    /// Opaque restriction labels the review surface enforces when it
    /// shows this record. The engine does not interpret them.
    pub access_restrictions: Vec<String>,
}

impl LinkableRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.module.clone(), self.record_id.clone())
    }
}

/// Structured key facts embedded in every surrogate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecordMetadata {
    /// References to records in other modules, keyed by field name.
    pub foreign_keys: HashMap<String, String>,

    /// Business-level identifiers (vendor numbers, invoice numbers,
    /// cost centers). The highest-signal matching fields.
    pub business_identifiers: HashMap<String, String>,

    /// Fields the review UI shows alongside a suggestion.
    pub display_fields: HashMap<String, String>,

    /// Free keywords for the index query surface.
    pub search_keywords: Vec<String>,

    /// Categorisation labels.
    pub categories: Vec<String>,

    /// Module-local priority, if the record carries one.
    pub priority: Option<i64>,
}

/// Validated relationship type. Lowercase ascii, digits, `_` and `-`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct LinkType(String);

impl LinkType {
    pub fn new(s: &str) -> crate::error::Result<Self> {
        if s.is_empty() || s.chars().count() > 64 {
            return Err(crate::error::NexusError::Validation(format!(
                "Link type '{}' must be 1-64 characters",
                s
            )));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(crate::error::NexusError::Validation(format!(
                "Link type '{}' may only contain lowercase, digits, '_' and '-'",
                s
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a suggestion. `Pending` is the only state with
/// outgoing transitions; the other four are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
    Superseded,
}

impl SuggestionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SuggestionStatus::Pending)
    }
}

impl std::fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SuggestionStatus::Pending => "pending",
            SuggestionStatus::Accepted => "accepted",
            SuggestionStatus::Rejected => "rejected",
            SuggestionStatus::Expired => "expired",
            SuggestionStatus::Superseded => "superseded",
        };
        write!(f, "{}", s)
    }
}

/// One per condition that contributed non-zero score. The decomposed
/// justification behind a suggestion's confidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceItem {
    /// Which kind of check produced this. "equals", "similar_to", ...
    pub evidence_type: String,

    /// Human-readable description for the review surface.
    pub description: String,

    /// Contribution strength (0.0 - 1.0). Sum over items does not need
    /// to equal the confidence score.
    pub strength: f32,

    /// Field name, operator, weight of the contributing condition.
    pub metadata: HashMap<String, Value>,
}

/// Reviewer feedback attached to a rejected suggestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestionFeedback {
    pub helpful: bool,
    pub comment: Option<String>,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
}

/// A proposed, not-yet-durable link awaiting review.
///
/// Uniquely keyed by (source_record_id, target_record_id, link_type)
/// while pending. Mutated only through its state machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkSuggestion {
    /// Unique identifier. UUIDv7.
    pub id: SuggestionId,

    /// Rule that produced this suggestion. None for suggestions
    /// injected by a collaborator outside the scan path.
    pub rule_id: Option<RuleId>,

    /// Source endpoint, `module/record_id` form.
    pub source_record_id: String,

    /// Target endpoint, `module/record_id` form.
    pub target_record_id: String,

    /// Why the engine proposed this pair.
    pub reason: String,

    /// Aggregated confidence (0.0 - 1.0).
    pub confidence: f32,

    /// Relationship type an acceptance will create.
    pub link_type: LinkType,

    /// Per-condition contributions.
    pub evidence: Vec<EvidenceItem>,

    /// When the scan generated this.
    pub generated_at: DateTime<Utc>,

    pub status: SuggestionStatus,

    pub reviewed_by: Option<String>,

    pub reviewed_at: Option<DateTime<Utc>>,

    pub feedback: Option<SuggestionFeedback>,
}

impl LinkSuggestion {
    pub fn new(
        rule_id: Option<RuleId>,
        source_record_id: impl Into<String>,
        target_record_id: impl Into<String>,
        link_type: LinkType,
        reason: impl Into<String>,
        confidence: f32,
        evidence: Vec<EvidenceItem>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            rule_id,
            source_record_id: source_record_id.into(),
            target_record_id: target_record_id.into(),
            reason: reason.into(),
            confidence: confidence.clamp(0.0, 1.0),
            link_type,
            evidence,
            generated_at: Utc::now(),
            status: SuggestionStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            feedback: None,
        }
    }

    /// Dedup key while pending.
    pub fn dedup_key(&self) -> (String, String, String) {
        (
            self.source_record_id.clone(),
            self.target_record_id.clone(),
            self.link_type.as_str().to_string(),
        )
    }

    /// Transition to a terminal state. Errors if already terminal.
    pub fn transition(&mut self, to: SuggestionStatus) -> crate::error::Result<()> {
        if self.status.is_terminal() {
            return Err(crate::error::NexusError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        if to == SuggestionStatus::Pending {
            return Err(crate::error::NexusError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Endpoint-freshness verdict for a durable link.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ValidationStatus {
    /// Both endpoints resolve and are unchanged since last validation.
    Valid,

    /// An endpoint changed since last validation.
    Stale,

    /// An endpoint no longer resolves. Kept as diagnostic signal,
    /// deletion is an explicit operator action.
    Broken,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValidationStatus::Valid => "valid",
            ValidationStatus::Stale => "stale",
            ValidationStatus::Broken => "broken",
        };
        write!(f, "{}", s)
    }
}

/// An accepted, durable edge in the cross-module relationship graph.
///
/// Invariant: no two active links share (source_record_id,
/// target_record_id, link_type) in the same direction; if either link
/// is bidirectional the reversed key is also a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordLink {
    /// Unique identifier. UUIDv7.
    pub id: LinkId,

    pub source_module: String,
    pub source_record_id: String,
    pub target_module: String,
    pub target_record_id: String,

    pub link_type: LinkType,

    /// Coarse grouping for the graph surface. "financial",
    /// "organisational", "workflow", ...
    pub relationship_category: String,

    /// Strength of the relationship (0.0 - 1.0). Accepted suggestions
    /// start at their confidence, manual links at 1.0.
    pub link_strength: f32,

    /// Whether the reverse direction is implied.
    pub bidirectional: bool,

    /// Arbitrary context carried with the edge.
    pub context_metadata: HashMap<String, Value>,

    /// Reviewer or agent that created the link.
    pub created_by: String,

    pub created_at: DateTime<Utc>,

    /// Last time the validation sweep looked at this link.
    pub last_validated: DateTime<Utc>,

    pub validation_status: ValidationStatus,

    /// False for manual links, true for accepted suggestions.
    pub automatically_created: bool,

    /// Confidence copied from the accepted suggestion. None for
    /// manual links.
    pub confidence: Option<f32>,

    /// Active links participate in uniqueness and queries. Unlinking
    /// deactivates rather than deletes.
    pub active: bool,
}

impl RecordLink {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_module: impl Into<String>,
        source_record_id: impl Into<String>,
        target_module: impl Into<String>,
        target_record_id: impl Into<String>,
        link_type: LinkType,
        relationship_category: impl Into<String>,
        link_strength: f32,
        bidirectional: bool,
        created_by: impl Into<String>,
        automatically_created: bool,
        confidence: Option<f32>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            source_module: source_module.into(),
            source_record_id: source_record_id.into(),
            target_module: target_module.into(),
            target_record_id: target_record_id.into(),
            link_type,
            relationship_category: relationship_category.into(),
            link_strength: link_strength.clamp(0.0, 1.0),
            bidirectional,
            context_metadata: HashMap::new(),
            created_by: created_by.into(),
            created_at: now,
            last_validated: now,
            validation_status: ValidationStatus::Valid,
            automatically_created,
            confidence: confidence.map(|c| c.clamp(0.0, 1.0)),
            active: true,
        }
    }

    /// Uniqueness key in the stored direction.
    pub fn key(&self) -> (String, String, String) {
        (
            self.source_record_id.clone(),
            self.target_record_id.clone(),
            self.link_type.as_str().to_string(),
        )
    }

    /// Validate the link before it enters the store.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.source_record_id.is_empty() || self.target_record_id.is_empty() {
            return Err(crate::error::NexusError::Validation(
                "Link endpoints must not be empty".into(),
            ));
        }
        if self.source_record_id == self.target_record_id {
            return Err(crate::error::NexusError::Validation(
                "Self-links are not allowed".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.link_strength) {
            return Err(crate::error::NexusError::Validation(format!(
                "Link strength {} out of range [0.0, 1.0]",
                self.link_strength
            )));
        }
        if let Some(c) = self.confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(crate::error::NexusError::Validation(format!(
                    "Confidence {} out of range [0.0, 1.0]",
                    c
                )));
            }
        }
        Ok(())
    }
}
