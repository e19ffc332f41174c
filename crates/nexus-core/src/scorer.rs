use crate::evaluate;
use crate::matcher::MatcherRegistry;
use crate::rules::RecordLinkRule;
use crate::types::{EvidenceItem, LinkableRecord};
use serde_json::json;
use std::collections::HashMap;

/// Result of scoring one candidate pair under one rule.
#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    /// Weighted mean over conditions, in [0, 1].
    pub confidence: f32,

    /// One item per condition that contributed non-zero score, in
    /// rule-authored order.
    pub evidence: Vec<EvidenceItem>,

    /// Set when the rule's total weight is zero. Confidence is forced
    /// to 0 and evaluation continues.
    pub misconfigured: bool,
}

impl ScoreOutcome {
    /// Whether this pair meets the rule's threshold.
    pub fn matches(&self, rule: &RecordLinkRule) -> bool {
        self.confidence >= rule.confidence_threshold
    }
}

/// Score a candidate pair: evaluate every condition, aggregate by
/// weight, normalize by total weight.
pub fn score(
    rule: &RecordLinkRule,
    source: &LinkableRecord,
    target: &LinkableRecord,
    registry: &MatcherRegistry,
) -> ScoreOutcome {
    let total_weight = rule.total_weight();
    if total_weight <= 0.0 {
        log::warn!(
            "Rule '{}' ({}) has zero total condition weight, confidence forced to 0",
            rule.name,
            rule.id
        );
        return ScoreOutcome {
            confidence: 0.0,
            evidence: Vec::new(),
            misconfigured: true,
        };
    }

    let matcher = registry.resolve(&rule.linking_algorithm);

    let mut weighted_sum = 0.0_f32;
    let mut evidence = Vec::new();

    for condition in &rule.conditions {
        let raw = evaluate::evaluate(condition, source, target, matcher.as_ref());
        let strength = raw.clamp(0.0, 1.0);
        weighted_sum += condition.weight * strength;

        if strength > 0.0 {
            let mut metadata = HashMap::new();
            metadata.insert("field".to_string(), json!(condition.field_name));
            metadata.insert("operator".to_string(), json!(condition.operator.as_str()));
            metadata.insert("weight".to_string(), json!(condition.weight));
            evidence.push(EvidenceItem {
                evidence_type: condition.operator.as_str().to_string(),
                description: format!(
                    "{} {} matched with strength {:.2}",
                    condition.field_name, condition.operator, strength
                ),
                strength,
                metadata,
            });
        }
    }

    ScoreOutcome {
        confidence: (weighted_sum / total_weight).clamp(0.0, 1.0),
        evidence,
        misconfigured: false,
    }
}
