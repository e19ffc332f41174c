use crate::error::Result;
use crate::index::RecordIndex;
use crate::storage::{LinkFilter, Storage};
use crate::types::{RecordLink, ValidationStatus};
use chrono::Utc;
use std::sync::Arc;

/// Counters from one validation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: u64,
    pub valid: u64,
    pub stale: u64,
    pub broken: u64,
}

/// Periodic endpoint-freshness checker for the link graph.
///
/// Marks links whose endpoints changed as stale and links whose
/// endpoints vanished as broken. Never deletes: a broken link is
/// diagnostic signal, removal is an explicit operator action.
pub struct LinkValidator<S: Storage> {
    storage: Arc<S>,
    index: Arc<RecordIndex>,
}

impl<S: Storage> LinkValidator<S> {
    pub fn new(storage: Arc<S>, index: Arc<RecordIndex>) -> Self {
        Self { storage, index }
    }

    /// Judge one link against the current record index.
    pub fn validate(&self, link: &RecordLink) -> Result<ValidationStatus> {
        let source = self.index.resolve(&link.source_record_id)?;
        let target = self.index.resolve(&link.target_record_id)?;

        let (source, target) = match (source, target) {
            (Some(s), Some(t)) => (s, t),
            _ => return Ok(ValidationStatus::Broken),
        };

        if source.last_indexed > link.last_validated || target.last_indexed > link.last_validated {
            return Ok(ValidationStatus::Stale);
        }
        Ok(ValidationStatus::Valid)
    }

    /// Revalidate every active link, updating validation_status and
    /// last_validated. Per-link failures are logged and skipped; the
    /// sweep itself never fails on link state.
    pub fn run_sweep(&self) -> Result<SweepReport> {
        let links = self.storage.list_links(LinkFilter::new())?;
        let now = Utc::now();

        let mut report = SweepReport::default();
        for link in links {
            let status = self.validate(&link)?;
            report.checked += 1;
            match status {
                ValidationStatus::Valid => report.valid += 1,
                ValidationStatus::Stale => report.stale += 1,
                ValidationStatus::Broken => report.broken += 1,
            }

            let mut updated = link;
            updated.validation_status = status;
            updated.last_validated = now;
            if let Err(e) = self.storage.update_link(&updated) {
                log::warn!("Failed to persist validation of link {}: {}", updated.id, e);
            }
        }

        log::info!(
            "Link validation sweep: {} checked, {} valid, {} stale, {} broken",
            report.checked,
            report.valid,
            report.stale,
            report.broken
        );
        Ok(report)
    }
}
