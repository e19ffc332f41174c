use crate::error::{NexusError, Result};
use crate::types::{LinkType, RuleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Comparison applied by one auto-link condition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ConditionOperator {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
    SimilarTo,
    GreaterThan,
    LessThan,
    Between,
}

impl ConditionOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionOperator::Equals => "equals",
            ConditionOperator::Contains => "contains",
            ConditionOperator::StartsWith => "starts_with",
            ConditionOperator::EndsWith => "ends_with",
            ConditionOperator::Regex => "regex",
            ConditionOperator::SimilarTo => "similar_to",
            ConditionOperator::GreaterThan => "greater_than",
            ConditionOperator::LessThan => "less_than",
            ConditionOperator::Between => "between",
        }
    }

    /// Operators that only make sense with a literal in
    /// `AutoLinkCondition::value`.
    pub fn requires_value(self) -> bool {
        matches!(self, ConditionOperator::Regex | ConditionOperator::Between)
    }
}

impl std::fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One matching condition inside a rule.
///
/// With `value: None` the operator relates the source record's field to
/// the target record's field. With `value: Some(..)` it tests the
/// target record's field against the literal. `Regex` and `Between`
/// always need a literal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoLinkCondition {
    /// Field resolved against searchable_fields, then metadata maps,
    /// then the record built-ins (title, record_type, priority).
    pub field_name: String,

    pub operator: ConditionOperator,

    pub value: Option<Value>,

    /// Relative contribution. Weights within a rule need not sum to 1;
    /// the scorer normalizes by total weight.
    pub weight: f32,
}

impl AutoLinkCondition {
    pub fn new(field_name: impl Into<String>, operator: ConditionOperator, weight: f32) -> Self {
        Self {
            field_name: field_name.into(),
            operator,
            value: None,
            weight,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.field_name.is_empty() {
            return Err(NexusError::Validation(
                "Condition field_name must not be empty".into(),
            ));
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(NexusError::Validation(format!(
                "Condition weight {} must be >= 0",
                self.weight
            )));
        }
        Ok(())
    }
}

/// Which matcher family resolves graded (similar_to) conditions.
/// Exact/Similarity/Fuzzy are built in; the rest are extension slots a
/// collaborator fills through the matcher registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LinkingAlgorithm {
    Exact,
    Similarity,
    Fuzzy,
    Semantic,
    Neural,
    Custom(String),
}

impl LinkingAlgorithm {
    pub fn as_str(&self) -> &str {
        match self {
            LinkingAlgorithm::Exact => "exact",
            LinkingAlgorithm::Similarity => "similarity",
            LinkingAlgorithm::Fuzzy => "fuzzy",
            LinkingAlgorithm::Semantic => "semantic",
            LinkingAlgorithm::Neural => "neural",
            LinkingAlgorithm::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for LinkingAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Monotonically accumulated per-rule outcome counters. Only `reset`
/// decrements.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleUsageStatistics {
    /// Scan executions of this rule.
    pub execution_count: u64,

    /// Suggestions from this rule that became links.
    pub successful_links: u64,

    /// Suggestions from this rule a reviewer rejected.
    pub rejected_suggestions: u64,

    /// Running mean confidence over all scored candidate pairs.
    pub average_confidence: f32,

    pub last_executed: Option<DateTime<Utc>>,

    /// Running mean scan duration for this rule, milliseconds.
    pub average_execution_ms: f64,

    /// Pairs that contributed to average_confidence.
    pub scored_pairs: u64,
}

impl RuleUsageStatistics {
    /// Fold one scan execution into the running aggregates.
    pub fn record_execution(&mut self, scored: u64, confidence_sum: f32, elapsed_ms: f64) {
        let prev = self.execution_count as f64;
        self.execution_count += 1;
        self.average_execution_ms =
            (self.average_execution_ms * prev + elapsed_ms) / self.execution_count as f64;

        if scored > 0 {
            let prev_pairs = self.scored_pairs as f32;
            self.scored_pairs += scored;
            self.average_confidence = (self.average_confidence * prev_pairs + confidence_sum)
                / self.scored_pairs as f32;
        }

        self.last_executed = Some(Utc::now());
    }

    pub fn record_accept(&mut self) {
        self.successful_links += 1;
    }

    pub fn record_reject(&mut self) {
        self.rejected_suggestions += 1;
    }

    /// Explicit operator reset. The only way counters go down.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One matching policy between two modules.
///
/// Multiple rules may target the same module pair; all enabled rules
/// are evaluated independently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordLinkRule {
    /// Unique identifier. UUIDv7.
    pub id: RuleId,

    /// Operator-facing label.
    pub name: String,

    pub source_module: String,

    pub target_module: String,

    /// Relationship type a matching pair is suggested with.
    pub link_type: LinkType,

    /// Coarse grouping stamped onto accepted links.
    pub relationship_category: String,

    /// Whether accepted links imply the reverse direction.
    pub bidirectional: bool,

    /// Ordered list of conditions. Evaluation order is fixed so
    /// evidence lines up with rule authorship.
    pub conditions: Vec<AutoLinkCondition>,

    pub linking_algorithm: LinkingAlgorithm,

    /// A candidate pair matches iff confidence >= this.
    pub confidence_threshold: f32,

    /// Suggestions surfaced per rule execution. Highest confidence wins.
    pub max_suggestions: usize,

    pub enabled: bool,

    pub usage: RuleUsageStatistics,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl RecordLinkRule {
    pub fn new(
        name: impl Into<String>,
        source_module: impl Into<String>,
        target_module: impl Into<String>,
        link_type: LinkType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            source_module: source_module.into(),
            target_module: target_module.into(),
            link_type,
            relationship_category: "general".into(),
            bidirectional: false,
            conditions: Vec::new(),
            linking_algorithm: LinkingAlgorithm::Similarity,
            confidence_threshold: 0.8,
            max_suggestions: 50,
            enabled: true,
            usage: RuleUsageStatistics::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_condition(mut self, condition: AutoLinkCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_algorithm(mut self, algorithm: LinkingAlgorithm) -> Self {
        self.linking_algorithm = algorithm;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_max_suggestions(mut self, max: usize) -> Self {
        self.max_suggestions = max;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.relationship_category = category.into();
        self
    }

    pub fn with_bidirectional(mut self, bidirectional: bool) -> Self {
        self.bidirectional = bidirectional;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(NexusError::Validation("Rule name must not be empty".into()));
        }
        if self.source_module.is_empty() || self.target_module.is_empty() {
            return Err(NexusError::Validation(
                "Rule source_module and target_module must not be empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(NexusError::Validation(format!(
                "Confidence threshold {} out of range [0.0, 1.0]",
                self.confidence_threshold
            )));
        }
        if self.max_suggestions == 0 {
            return Err(NexusError::Validation(
                "max_suggestions must be > 0".into(),
            ));
        }
        for condition in &self.conditions {
            condition.validate()?;
        }
        Ok(())
    }

    /// Total condition weight. Zero means the rule is misconfigured
    /// and every pair scores 0.
    pub fn total_weight(&self) -> f32 {
        self.conditions.iter().map(|c| c.weight).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rule() -> RecordLinkRule {
        RecordLinkRule::new(
            "vendor-to-task",
            "vendors",
            "tasks",
            LinkType::new("related_to").unwrap(),
        )
    }

    #[test]
    fn test_rule_validation() {
        let rule = test_rule()
            .with_condition(AutoLinkCondition::new(
                "vendorNumber",
                ConditionOperator::Equals,
                1.0,
            ))
            .with_threshold(0.8);
        assert!(rule.validate().is_ok());

        let bad_threshold = test_rule().with_threshold(1.5);
        assert!(bad_threshold.validate().is_err());

        let negative_weight = test_rule().with_condition(AutoLinkCondition::new(
            "vendorNumber",
            ConditionOperator::Equals,
            -0.5,
        ));
        assert!(negative_weight.validate().is_err());
    }

    #[test]
    fn test_total_weight() {
        let rule = test_rule()
            .with_condition(AutoLinkCondition::new(
                "vendorNumber",
                ConditionOperator::Equals,
                0.7,
            ))
            .with_condition(AutoLinkCondition::new(
                "title",
                ConditionOperator::SimilarTo,
                0.3,
            ));
        assert!((rule.total_weight() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_usage_statistics_accumulate() {
        let mut usage = RuleUsageStatistics::default();

        usage.record_execution(2, 1.6, 10.0);
        usage.record_execution(2, 1.0, 30.0);

        assert_eq!(usage.execution_count, 2);
        assert_eq!(usage.scored_pairs, 4);
        assert!((usage.average_confidence - 0.65).abs() < 1e-6);
        assert!((usage.average_execution_ms - 20.0).abs() < 1e-9);
        assert!(usage.last_executed.is_some());

        usage.record_accept();
        usage.record_reject();
        assert_eq!(usage.successful_links, 1);
        assert_eq!(usage.rejected_suggestions, 1);

        usage.reset();
        assert_eq!(usage.execution_count, 0);
        assert_eq!(usage.average_confidence, 0.0);
    }
}
