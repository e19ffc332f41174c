use crate::matcher::Matcher;
use crate::rules::{AutoLinkCondition, ConditionOperator};
use crate::types::LinkableRecord;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Evaluate one condition against a candidate pair. Returns a score in
/// [0, 1]. Missing fields and evaluation failures score 0.0 and never
/// abort the rule; configuration problems are logged at warn.
pub fn evaluate(
    condition: &AutoLinkCondition,
    source: &LinkableRecord,
    target: &LinkableRecord,
    matcher: &dyn Matcher,
) -> f32 {
    let source_value = field_value(source, &condition.field_name);
    let target_value = field_value(target, &condition.field_name);

    // The target side participates in every operator.
    let target_value = match target_value {
        Some(v) => v,
        None => return 0.0,
    };

    // Cross-record comparison needs the source side too, unless the
    // condition carries a literal.
    let compare_to = match &condition.value {
        Some(literal) => literal.clone(),
        None => {
            if condition.operator.requires_value() {
                log::warn!(
                    "Condition '{}' ({}) requires a literal value, scoring 0",
                    condition.field_name,
                    condition.operator
                );
                return 0.0;
            }
            match source_value {
                Some(v) => v,
                None => return 0.0,
            }
        }
    };

    match condition.operator {
        ConditionOperator::Equals => score_equals(&compare_to, &target_value),
        ConditionOperator::Contains => {
            score_substring(&compare_to, &target_value, |hay, needle| {
                hay.contains(needle)
            })
        }
        ConditionOperator::StartsWith => {
            score_substring(&compare_to, &target_value, |hay, needle| {
                hay.starts_with(needle)
            })
        }
        ConditionOperator::EndsWith => {
            score_substring(&compare_to, &target_value, |hay, needle| {
                hay.ends_with(needle)
            })
        }
        ConditionOperator::Regex => score_regex(condition, &compare_to, &target_value),
        ConditionOperator::SimilarTo => match (as_text(&compare_to), as_text(&target_value)) {
            (Some(a), Some(b)) => matcher.score(&a, &b).clamp(0.0, 1.0),
            _ => 0.0,
        },
        ConditionOperator::GreaterThan => score_ordering(&compare_to, &target_value, condition, true),
        ConditionOperator::LessThan => score_ordering(&compare_to, &target_value, condition, false),
        ConditionOperator::Between => score_between(condition, &compare_to, &target_value),
    }
}

/// Resolve a condition field against a record. Searchable fields win,
/// then the metadata maps, then record built-ins.
pub fn field_value(record: &LinkableRecord, name: &str) -> Option<Value> {
    if let Some(v) = record.searchable_fields.get(name) {
        return Some(v.clone());
    }
    if let Some(v) = record.metadata.business_identifiers.get(name) {
        return Some(Value::String(v.clone()));
    }
    if let Some(v) = record.metadata.foreign_keys.get(name) {
        return Some(Value::String(v.clone()));
    }
    if let Some(v) = record.metadata.display_fields.get(name) {
        return Some(Value::String(v.clone()));
    }
    match name {
        "title" => Some(Value::String(record.title.clone())),
        "description" => record.description.clone().map(Value::String),
        "record_type" => Some(Value::String(record.record_type.clone())),
        "module" => Some(Value::String(record.module.clone())),
        "priority" => record.metadata.priority.map(|p| Value::Number(p.into())),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn as_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

fn score_equals(a: &Value, b: &Value) -> f32 {
    // Numeric equality first so "7" matches 7.0.
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return if x == y { 1.0 } else { 0.0 };
    }
    match (as_text(a), as_text(b)) {
        (Some(x), Some(y)) => {
            if x.to_lowercase() == y.to_lowercase() {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

fn score_substring<F>(needle: &Value, haystack: &Value, test: F) -> f32
where
    F: Fn(&str, &str) -> bool,
{
    match (as_text(needle), as_text(haystack)) {
        (Some(n), Some(h)) => {
            if n.is_empty() {
                return 0.0;
            }
            if test(&h.to_lowercase(), &n.to_lowercase()) {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

fn score_regex(condition: &AutoLinkCondition, pattern: &Value, target: &Value) -> f32 {
    let pattern = match pattern {
        Value::String(p) => p,
        _ => {
            log::warn!(
                "Condition '{}' regex literal must be a string, scoring 0",
                condition.field_name
            );
            return 0.0;
        }
    };
    let target = match as_text(target) {
        Some(t) => t,
        None => return 0.0,
    };
    match regex::Regex::new(pattern) {
        Ok(re) => {
            if re.is_match(&target) {
                1.0
            } else {
                0.0
            }
        }
        Err(e) => {
            // Bad pattern is a rule-configuration problem, not a pair
            // mismatch. It only costs this condition.
            log::warn!(
                "Condition '{}' has invalid regex '{}': {}",
                condition.field_name,
                pattern,
                e
            );
            0.0
        }
    }
}

/// Ordering comparison. With no literal, `greater` means the source
/// field exceeds the target field. Dates compare chronologically,
/// anything non-comparable scores 0.
fn score_ordering(a: &Value, b: &Value, condition: &AutoLinkCondition, greater: bool) -> f32 {
    // `a` is the source field or literal, `b` the target field. The
    // comparison reads "target <op> a" in the literal case and
    // "source <op> target" in the cross-record case; both reduce to
    // comparing the two resolved values.
    let ordering = if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        x.partial_cmp(&y)
    } else if let (Some(x), Some(y)) = (as_instant(a), as_instant(b)) {
        Some(x.cmp(&y))
    } else {
        None
    };

    let matched = match (ordering, condition.value.is_some()) {
        // Cross-record: source vs target.
        (Some(std::cmp::Ordering::Greater), false) => greater,
        (Some(std::cmp::Ordering::Less), false) => !greater,
        // Literal: target vs literal, so the ordering flips.
        (Some(std::cmp::Ordering::Less), true) => greater,
        (Some(std::cmp::Ordering::Greater), true) => !greater,
        _ => false,
    };

    if matched {
        1.0
    } else {
        0.0
    }
}

fn score_between(condition: &AutoLinkCondition, bounds: &Value, target: &Value) -> f32 {
    let pair = match bounds {
        Value::Array(items) if items.len() == 2 => (&items[0], &items[1]),
        _ => {
            log::warn!(
                "Condition '{}' between literal must be a two-element array, scoring 0",
                condition.field_name
            );
            return 0.0;
        }
    };

    if let (Some(lo), Some(hi), Some(t)) = (as_number(pair.0), as_number(pair.1), as_number(target))
    {
        return if t >= lo && t <= hi { 1.0 } else { 0.0 };
    }
    if let (Some(lo), Some(hi), Some(t)) =
        (as_instant(pair.0), as_instant(pair.1), as_instant(target))
    {
        return if t >= lo && t <= hi { 1.0 } else { 0.0 };
    }
    0.0
}
