pub mod types;
pub mod rules;
pub mod error;
pub mod index;
pub mod matcher;
pub mod evaluate;
pub mod scorer;
pub mod storage;
pub mod linker;
pub mod validate;
pub mod api;

pub use error::{NexusError, Result};
pub use types::*;
pub use rules::{
    AutoLinkCondition, ConditionOperator, LinkingAlgorithm, RecordLinkRule, RuleUsageStatistics,
};
pub use index::{RecordDraft, RecordIndex};
pub use matcher::{ExactMatcher, FuzzyMatcher, Matcher, MatcherRegistry, SimilarityMatcher};
pub use scorer::{score, ScoreOutcome};
pub use storage::{LinkFilter, RedbStorage, Storage, StoreStats, SuggestionFilter, CURRENT_SCHEMA_VERSION};
pub use linker::{
    evidence_differs, LinkScanner, LinkerConfig, ReviewDecision, ScanMetrics, SuggestionManager,
    UpsertOutcome,
};
pub use validate::{LinkValidator, SweepReport};
pub use api::{Nexus, NexusConfig};

#[cfg(test)]
mod tests;
