use crate::types::{RuleId, SuggestionStatus, ValidationStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Filter criteria for querying links
#[derive(Debug, Clone)]
pub struct LinkFilter {
    /// Composite `module/record_id` endpoint. Matches the source side,
    /// plus the target side of bidirectional links.
    pub record_id: Option<String>,
    pub link_type: Option<String>,
    pub validation_status: Option<ValidationStatus>,
    /// Inactive links are excluded unless this is set.
    pub include_inactive: bool,
    pub automatically_created: Option<bool>,
    pub limit: Option<usize>,
}

impl Default for LinkFilter {
    fn default() -> Self {
        Self {
            record_id: None,
            link_type: None,
            validation_status: None,
            include_inactive: false,
            automatically_created: None,
            limit: None,
        }
    }
}

impl LinkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_record(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }

    pub fn with_link_type(mut self, link_type: impl Into<String>) -> Self {
        self.link_type = Some(link_type.into());
        self
    }

    pub fn with_validation_status(mut self, status: ValidationStatus) -> Self {
        self.validation_status = Some(status);
        self
    }

    pub fn include_inactive(mut self) -> Self {
        self.include_inactive = true;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Filter criteria for querying suggestions
#[derive(Debug, Clone, Default)]
pub struct SuggestionFilter {
    /// Composite endpoint, either side.
    pub record_id: Option<String>,
    pub status: Option<SuggestionStatus>,
    pub rule_id: Option<RuleId>,
    /// Only suggestions generated before this instant. The expiry
    /// sweep's cutoff.
    pub generated_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl SuggestionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_record(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }

    pub fn with_status(mut self, status: SuggestionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_rule(mut self, rule_id: RuleId) -> Self {
        self.rule_id = Some(rule_id);
        self
    }

    pub fn generated_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.generated_before = Some(cutoff);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Store statistics
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub active_links: u64,
    pub total_links: u64,
    pub suggestions: u64,
    pub pending_suggestions: u64,
    pub rules: u64,
    pub links_by_status: HashMap<ValidationStatus, u64>,
    pub suggestions_by_status: HashMap<SuggestionStatus, u64>,
}
