use crate::rules::LinkingAlgorithm;
use std::collections::HashMap;
use std::sync::Arc;

/// Graded string comparison behind `similar_to` conditions.
///
/// Implementations must be deterministic and symmetric: `score(a, b)`
/// equals `score(b, a)` for all inputs, and the result is in [0, 1].
pub trait Matcher: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f32;
}

/// Degenerate matcher for rules that want similar_to to behave like a
/// case-insensitive equality check.
pub struct ExactMatcher;

impl Matcher for ExactMatcher {
    fn score(&self, a: &str, b: &str) -> f32 {
        if a.eq_ignore_ascii_case(b) {
            1.0
        } else {
            0.0
        }
    }
}

/// Normalized edit distance. 1 − levenshtein/max_len, which strsim
/// computes directly.
pub struct SimilarityMatcher;

impl Matcher for SimilarityMatcher {
    fn score(&self, a: &str, b: &str) -> f32 {
        let a = a.to_lowercase();
        let b = b.to_lowercase();
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        strsim::normalized_levenshtein(&a, &b) as f32
    }
}

/// Jaro-Winkler, more forgiving of transpositions and shared prefixes
/// than plain edit distance. Good for human-keyed identifiers.
pub struct FuzzyMatcher;

impl Matcher for FuzzyMatcher {
    fn score(&self, a: &str, b: &str) -> f32 {
        let a = a.to_lowercase();
        let b = b.to_lowercase();
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        strsim::jaro_winkler(&a, &b) as f32
    }
}

/// Registry mapping a rule's linking algorithm to a matcher.
///
/// Exact/Similarity/Fuzzy are pre-registered. Semantic, Neural, and
/// Custom slots stay empty until a collaborator registers an
/// implementation; an unresolved slot falls back to Similarity with a
/// warning so a scan never aborts on algorithm choice.
pub struct MatcherRegistry {
    matchers: HashMap<LinkingAlgorithm, Arc<dyn Matcher>>,
}

impl Default for MatcherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MatcherRegistry {
    pub fn new() -> Self {
        let mut matchers: HashMap<LinkingAlgorithm, Arc<dyn Matcher>> = HashMap::new();
        matchers.insert(LinkingAlgorithm::Exact, Arc::new(ExactMatcher));
        matchers.insert(LinkingAlgorithm::Similarity, Arc::new(SimilarityMatcher));
        matchers.insert(LinkingAlgorithm::Fuzzy, Arc::new(FuzzyMatcher));
        Self { matchers }
    }

    /// Register or replace the matcher for an algorithm slot.
    pub fn register(&mut self, algorithm: LinkingAlgorithm, matcher: Arc<dyn Matcher>) {
        self.matchers.insert(algorithm, matcher);
    }

    pub fn get(&self, algorithm: &LinkingAlgorithm) -> Option<Arc<dyn Matcher>> {
        self.matchers.get(algorithm).cloned()
    }

    /// Resolve with fallback. Logs once per unresolved lookup.
    pub fn resolve(&self, algorithm: &LinkingAlgorithm) -> Arc<dyn Matcher> {
        if let Some(matcher) = self.matchers.get(algorithm) {
            return matcher.clone();
        }
        log::warn!(
            "No matcher registered for algorithm '{}', falling back to similarity",
            algorithm
        );
        self.matchers
            .get(&LinkingAlgorithm::Similarity)
            .cloned()
            .unwrap_or_else(|| Arc::new(SimilarityMatcher))
    }
}
