use crate::error::{NexusError, Result};
use crate::rules::RecordLinkRule;
use crate::storage::filters::{LinkFilter, StoreStats, SuggestionFilter};
use crate::storage::traits::Storage;
use crate::types::{LinkId, LinkSuggestion, RecordLink, RuleId, SuggestionId, SuggestionStatus};
use redb::{
    Database, MultimapTableDefinition, ReadableMultimapTable, ReadableTable, TableDefinition,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// Table definitions
const LINKS: TableDefinition<&[u8; 16], &[u8]> = TableDefinition::new("links");
const SUGGESTIONS: TableDefinition<&[u8; 16], &[u8]> = TableDefinition::new("suggestions");
const RULES: TableDefinition<&[u8; 16], &[u8]> = TableDefinition::new("rules");

// Secondary indexes. links_by_key holds ACTIVE links only; it is the
// uniqueness invariant made physical.
const LINKS_BY_KEY: TableDefinition<&str, &[u8; 16]> = TableDefinition::new("links_by_key");
const LINKS_BY_RECORD: MultimapTableDefinition<&str, &[u8; 16]> =
    MultimapTableDefinition::new("links_by_record");
const SUGGESTIONS_BY_KEY: MultimapTableDefinition<&str, &[u8; 16]> =
    MultimapTableDefinition::new("suggestions_by_key");
const SUGGESTIONS_BY_RECORD: MultimapTableDefinition<&str, &[u8; 16]> =
    MultimapTableDefinition::new("suggestions_by_record");

// Metadata table
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;
const SCHEMA_VERSION_KEY: &str = "schema_version";

// Field separator for composite keys. Module/record ids never contain it.
const KEY_SEP: char = '\u{1f}';

fn composite_key(source: &str, target: &str, link_type: &str) -> String {
    format!("{}{}{}{}{}", source, KEY_SEP, target, KEY_SEP, link_type)
}

/// Redb-based storage implementation
pub struct RedbStorage {
    db: Arc<Database>,
    #[allow(dead_code)]
    path: PathBuf,
}

impl RedbStorage {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                NexusError::Validation(format!("Failed to create directory: {}", e))
            })?;
        }

        let is_new = !path.exists();
        let db = Database::create(&path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(LINKS)?;
            let _ = write_txn.open_table(SUGGESTIONS)?;
            let _ = write_txn.open_table(RULES)?;
            let _ = write_txn.open_table(LINKS_BY_KEY)?;
            let _ = write_txn.open_multimap_table(LINKS_BY_RECORD)?;
            let _ = write_txn.open_multimap_table(SUGGESTIONS_BY_KEY)?;
            let _ = write_txn.open_multimap_table(SUGGESTIONS_BY_RECORD)?;
            let mut meta = write_txn.open_table(META)?;
            if is_new {
                meta.insert(
                    SCHEMA_VERSION_KEY,
                    CURRENT_SCHEMA_VERSION.to_string().as_bytes(),
                )?;
            }
        }
        write_txn.commit()?;

        if !is_new {
            Self::check_schema_version(&db)?;
        }

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Check schema version. Returns error if migration is needed.
    fn check_schema_version(db: &Database) -> Result<()> {
        let read_txn = db.begin_read()?;
        let version = {
            let table = read_txn.open_table(META).ok();
            table
                .and_then(|t| {
                    t.get(SCHEMA_VERSION_KEY).ok().flatten().and_then(|v| {
                        std::str::from_utf8(v.value())
                            .ok()
                            .and_then(|s| s.parse::<u32>().ok())
                    })
                })
                .unwrap_or(CURRENT_SCHEMA_VERSION)
        };

        if version != CURRENT_SCHEMA_VERSION {
            return Err(NexusError::Validation(format!(
                "Database schema v{} does not match this binary's v{}",
                version, CURRENT_SCHEMA_VERSION
            )));
        }
        Ok(())
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn uuid_to_bytes(id: &uuid::Uuid) -> [u8; 16] {
        *id.as_bytes()
    }

    // Entities carry open-ended JSON values (condition literals,
    // evidence metadata), so stored bytes are JSON rather than a
    // non-self-describing encoding.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(NexusError::from)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(NexusError::from)
    }

    /// Find the active link blocking `link`'s key, inside an open
    /// transaction. Checks the forward key, then the reversed key when
    /// bidirectionality makes the reverse a duplicate too.
    fn find_key_conflict<K, L>(
        key_table: &K,
        links_table: &L,
        link: &RecordLink,
    ) -> Result<Option<RecordLink>>
    where
        K: ReadableTable<&'static str, &'static [u8; 16]>,
        L: ReadableTable<&'static [u8; 16], &'static [u8]>,
    {
        let forward = composite_key(
            &link.source_record_id,
            &link.target_record_id,
            link.link_type.as_str(),
        );
        if let Some(guard) = key_table.get(forward.as_str())? {
            let id_bytes = *guard.value();
            if let Some(bytes) = links_table.get(&id_bytes)? {
                return Ok(Some(Self::deserialize(bytes.value())?));
            }
        }

        let reverse = composite_key(
            &link.target_record_id,
            &link.source_record_id,
            link.link_type.as_str(),
        );
        if let Some(guard) = key_table.get(reverse.as_str())? {
            let id_bytes = *guard.value();
            if let Some(bytes) = links_table.get(&id_bytes)? {
                let existing: RecordLink = Self::deserialize(bytes.value())?;
                if existing.bidirectional || link.bidirectional {
                    return Ok(Some(existing));
                }
            }
        }

        Ok(None)
    }

    fn duplicate_error(link: &RecordLink) -> NexusError {
        NexusError::DuplicateLink {
            source_record: link.source_record_id.clone(),
            target: link.target_record_id.clone(),
            link_type: link.link_type.as_str().to_string(),
        }
    }
}

impl Storage for RedbStorage {
    fn put_link(&self, link: &RecordLink) -> Result<()> {
        link.validate()?;

        let write_txn = self.db.begin_write()?;
        {
            let mut links = write_txn.open_table(LINKS)?;
            let mut by_key = write_txn.open_table(LINKS_BY_KEY)?;
            let mut by_record = write_txn.open_multimap_table(LINKS_BY_RECORD)?;

            if link.active {
                if Self::find_key_conflict(&by_key, &links, link)?.is_some() {
                    return Err(Self::duplicate_error(link));
                }
                let key = composite_key(
                    &link.source_record_id,
                    &link.target_record_id,
                    link.link_type.as_str(),
                );
                let id_bytes = Self::uuid_to_bytes(&link.id);
                by_key.insert(key.as_str(), &id_bytes)?;
            }

            let id_bytes = Self::uuid_to_bytes(&link.id);
            links.insert(&id_bytes, Self::serialize(link)?.as_slice())?;
            by_record.insert(link.source_record_id.as_str(), &id_bytes)?;
            by_record.insert(link.target_record_id.as_str(), &id_bytes)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_link(&self, id: LinkId) -> Result<Option<RecordLink>> {
        let read_txn = self.db.begin_read()?;
        let links = read_txn.open_table(LINKS)?;
        let id_bytes = Self::uuid_to_bytes(&id);
        match links.get(&id_bytes)? {
            Some(bytes) => Ok(Some(Self::deserialize(bytes.value())?)),
            None => Ok(None),
        }
    }

    fn update_link(&self, link: &RecordLink) -> Result<()> {
        link.validate()?;

        let write_txn = self.db.begin_write()?;
        {
            let mut links = write_txn.open_table(LINKS)?;
            let mut by_key = write_txn.open_table(LINKS_BY_KEY)?;

            let id_bytes = Self::uuid_to_bytes(&link.id);
            let old: RecordLink = match links.get(&id_bytes)? {
                Some(bytes) => Self::deserialize(bytes.value())?,
                None => return Err(NexusError::LinkNotFound(link.id)),
            };

            let key = composite_key(
                &link.source_record_id,
                &link.target_record_id,
                link.link_type.as_str(),
            );

            if old.active && !link.active {
                by_key.remove(key.as_str())?;
            } else if !old.active && link.active {
                // Reactivation re-enters the uniqueness invariant.
                if let Some(conflict) = Self::find_key_conflict(&by_key, &links, link)? {
                    if conflict.id != link.id {
                        return Err(Self::duplicate_error(link));
                    }
                }
                let id_bytes = Self::uuid_to_bytes(&link.id);
                by_key.insert(key.as_str(), &id_bytes)?;
            }

            links.insert(&id_bytes, Self::serialize(link)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete_link(&self, id: LinkId) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut links = write_txn.open_table(LINKS)?;
            let mut by_key = write_txn.open_table(LINKS_BY_KEY)?;
            let mut by_record = write_txn.open_multimap_table(LINKS_BY_RECORD)?;

            let id_bytes = Self::uuid_to_bytes(&id);
            let link: RecordLink = match links.remove(&id_bytes)? {
                Some(bytes) => Self::deserialize(bytes.value())?,
                None => return Err(NexusError::LinkNotFound(id)),
            };

            if link.active {
                let key = composite_key(
                    &link.source_record_id,
                    &link.target_record_id,
                    link.link_type.as_str(),
                );
                by_key.remove(key.as_str())?;
            }
            by_record.remove(link.source_record_id.as_str(), &id_bytes)?;
            by_record.remove(link.target_record_id.as_str(), &id_bytes)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn list_links(&self, filter: LinkFilter) -> Result<Vec<RecordLink>> {
        let read_txn = self.db.begin_read()?;
        let links = read_txn.open_table(LINKS)?;

        let mut out = Vec::new();
        for entry in links.iter()? {
            let (_, bytes) = entry?;
            let link: RecordLink = Self::deserialize(bytes.value())?;

            if !filter.include_inactive && !link.active {
                continue;
            }
            if let Some(record) = &filter.record_id {
                let outgoing = &link.source_record_id == record;
                let incoming = link.bidirectional && &link.target_record_id == record;
                if !outgoing && !incoming {
                    continue;
                }
            }
            if let Some(link_type) = &filter.link_type {
                if link.link_type.as_str() != link_type.as_str() {
                    continue;
                }
            }
            if let Some(status) = filter.validation_status {
                if link.validation_status != status {
                    continue;
                }
            }
            if let Some(auto) = filter.automatically_created {
                if link.automatically_created != auto {
                    continue;
                }
            }

            out.push(link);
            if let Some(limit) = filter.limit {
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    fn links_for_record(&self, record_id: &str) -> Result<Vec<RecordLink>> {
        let read_txn = self.db.begin_read()?;
        let links = read_txn.open_table(LINKS)?;
        let by_record = read_txn.open_multimap_table(LINKS_BY_RECORD)?;

        let mut out = Vec::new();
        for entry in by_record.get(record_id)? {
            let id_bytes = *entry?.value();
            if let Some(bytes) = links.get(&id_bytes)? {
                out.push(Self::deserialize(bytes.value())?);
            }
        }
        Ok(out)
    }

    fn active_link_for_key(
        &self,
        source: &str,
        target: &str,
        link_type: &str,
        bidirectional: bool,
    ) -> Result<Option<RecordLink>> {
        let read_txn = self.db.begin_read()?;
        let links = read_txn.open_table(LINKS)?;
        let by_key = read_txn.open_table(LINKS_BY_KEY)?;

        let forward = composite_key(source, target, link_type);
        if let Some(guard) = by_key.get(forward.as_str())? {
            let id_bytes = *guard.value();
            if let Some(bytes) = links.get(&id_bytes)? {
                return Ok(Some(Self::deserialize(bytes.value())?));
            }
        }
        let reverse = composite_key(target, source, link_type);
        if let Some(guard) = by_key.get(reverse.as_str())? {
            let id_bytes = *guard.value();
            if let Some(bytes) = links.get(&id_bytes)? {
                let existing: RecordLink = Self::deserialize(bytes.value())?;
                if existing.bidirectional || bidirectional {
                    return Ok(Some(existing));
                }
            }
        }
        Ok(None)
    }

    fn put_suggestion(&self, suggestion: &LinkSuggestion) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut suggestions = write_txn.open_table(SUGGESTIONS)?;
            let mut by_key = write_txn.open_multimap_table(SUGGESTIONS_BY_KEY)?;
            let mut by_record = write_txn.open_multimap_table(SUGGESTIONS_BY_RECORD)?;

            let id_bytes = Self::uuid_to_bytes(&suggestion.id);
            let key = composite_key(
                &suggestion.source_record_id,
                &suggestion.target_record_id,
                suggestion.link_type.as_str(),
            );

            suggestions.insert(&id_bytes, Self::serialize(suggestion)?.as_slice())?;
            by_key.insert(key.as_str(), &id_bytes)?;
            by_record.insert(suggestion.source_record_id.as_str(), &id_bytes)?;
            by_record.insert(suggestion.target_record_id.as_str(), &id_bytes)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_suggestion(&self, id: SuggestionId) -> Result<Option<LinkSuggestion>> {
        let read_txn = self.db.begin_read()?;
        let suggestions = read_txn.open_table(SUGGESTIONS)?;
        let id_bytes = Self::uuid_to_bytes(&id);
        match suggestions.get(&id_bytes)? {
            Some(bytes) => Ok(Some(Self::deserialize(bytes.value())?)),
            None => Ok(None),
        }
    }

    fn list_suggestions(&self, filter: SuggestionFilter) -> Result<Vec<LinkSuggestion>> {
        let read_txn = self.db.begin_read()?;
        let suggestions = read_txn.open_table(SUGGESTIONS)?;

        // Endpoint filter goes through the secondary index.
        if let Some(record) = &filter.record_id {
            let by_record = read_txn.open_multimap_table(SUGGESTIONS_BY_RECORD)?;
            let mut out = Vec::new();
            for entry in by_record.get(record.as_str())? {
                let id_bytes = *entry?.value();
                if let Some(bytes) = suggestions.get(&id_bytes)? {
                    let suggestion: LinkSuggestion = Self::deserialize(bytes.value())?;
                    if Self::suggestion_passes(&suggestion, &filter) {
                        out.push(suggestion);
                    }
                }
            }
            if let Some(limit) = filter.limit {
                out.truncate(limit);
            }
            return Ok(out);
        }

        let mut out = Vec::new();
        for entry in suggestions.iter()? {
            let (_, bytes) = entry?;
            let suggestion: LinkSuggestion = Self::deserialize(bytes.value())?;
            if Self::suggestion_passes(&suggestion, &filter) {
                out.push(suggestion);
                if let Some(limit) = filter.limit {
                    if out.len() >= limit {
                        break;
                    }
                }
            }
        }
        Ok(out)
    }

    fn suggestions_for_key(
        &self,
        source: &str,
        target: &str,
        link_type: &str,
    ) -> Result<Vec<LinkSuggestion>> {
        let read_txn = self.db.begin_read()?;
        let suggestions = read_txn.open_table(SUGGESTIONS)?;
        let by_key = read_txn.open_multimap_table(SUGGESTIONS_BY_KEY)?;

        let key = composite_key(source, target, link_type);
        let mut out = Vec::new();
        for entry in by_key.get(key.as_str())? {
            let id_bytes = *entry?.value();
            if let Some(bytes) = suggestions.get(&id_bytes)? {
                out.push(Self::deserialize(bytes.value())?);
            }
        }
        Ok(out)
    }

    fn commit_acceptance(&self, suggestion: &LinkSuggestion, link: &RecordLink) -> Result<()> {
        link.validate()?;

        let write_txn = self.db.begin_write()?;
        {
            let mut links = write_txn.open_table(LINKS)?;
            let mut by_key = write_txn.open_table(LINKS_BY_KEY)?;
            let mut links_by_record = write_txn.open_multimap_table(LINKS_BY_RECORD)?;
            let mut suggestions = write_txn.open_table(SUGGESTIONS)?;

            // The losing side of a race sees the winner's key here and
            // nothing gets written.
            if Self::find_key_conflict(&by_key, &links, link)?.is_some() {
                return Err(Self::duplicate_error(link));
            }

            let link_id_bytes = Self::uuid_to_bytes(&link.id);
            let key = composite_key(
                &link.source_record_id,
                &link.target_record_id,
                link.link_type.as_str(),
            );
            links.insert(&link_id_bytes, Self::serialize(link)?.as_slice())?;
            by_key.insert(key.as_str(), &link_id_bytes)?;
            links_by_record.insert(link.source_record_id.as_str(), &link_id_bytes)?;
            links_by_record.insert(link.target_record_id.as_str(), &link_id_bytes)?;

            let suggestion_id_bytes = Self::uuid_to_bytes(&suggestion.id);
            suggestions.insert(&suggestion_id_bytes, Self::serialize(suggestion)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn put_rule(&self, rule: &RecordLinkRule) -> Result<()> {
        rule.validate()?;

        let write_txn = self.db.begin_write()?;
        {
            let mut rules = write_txn.open_table(RULES)?;
            let id_bytes = Self::uuid_to_bytes(&rule.id);
            rules.insert(&id_bytes, Self::serialize(rule)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_rule(&self, id: RuleId) -> Result<Option<RecordLinkRule>> {
        let read_txn = self.db.begin_read()?;
        let rules = read_txn.open_table(RULES)?;
        let id_bytes = Self::uuid_to_bytes(&id);
        match rules.get(&id_bytes)? {
            Some(bytes) => Ok(Some(Self::deserialize(bytes.value())?)),
            None => Ok(None),
        }
    }

    fn list_rules(&self) -> Result<Vec<RecordLinkRule>> {
        let read_txn = self.db.begin_read()?;
        let rules = read_txn.open_table(RULES)?;

        let mut out = Vec::new();
        for entry in rules.iter()? {
            let (_, bytes) = entry?;
            out.push(Self::deserialize(bytes.value())?);
        }
        Ok(out)
    }

    fn delete_rule(&self, id: RuleId) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut rules = write_txn.open_table(RULES)?;
            let id_bytes = Self::uuid_to_bytes(&id);
            if rules.remove(&id_bytes)?.is_none() {
                return Err(NexusError::RuleNotFound(id));
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn put_metadata(&self, key: &str, value: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut meta = write_txn.open_table(META)?;
            meta.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_metadata(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let meta = read_txn.open_table(META)?;
        match meta.get(key)? {
            Some(bytes) => Ok(Some(bytes.value().to_vec())),
            None => Ok(None),
        }
    }

    fn stats(&self) -> Result<StoreStats> {
        let read_txn = self.db.begin_read()?;
        let links = read_txn.open_table(LINKS)?;
        let suggestions = read_txn.open_table(SUGGESTIONS)?;
        let rules = read_txn.open_table(RULES)?;

        let mut stats = StoreStats::default();

        for entry in links.iter()? {
            let (_, bytes) = entry?;
            let link: RecordLink = Self::deserialize(bytes.value())?;
            stats.total_links += 1;
            if link.active {
                stats.active_links += 1;
            }
            *stats.links_by_status.entry(link.validation_status).or_insert(0) += 1;
        }

        for entry in suggestions.iter()? {
            let (_, bytes) = entry?;
            let suggestion: LinkSuggestion = Self::deserialize(bytes.value())?;
            stats.suggestions += 1;
            if suggestion.status == SuggestionStatus::Pending {
                stats.pending_suggestions += 1;
            }
            *stats
                .suggestions_by_status
                .entry(suggestion.status)
                .or_insert(0) += 1;
        }

        stats.rules = rules.iter()?.count() as u64;

        Ok(stats)
    }
}

impl RedbStorage {
    fn suggestion_passes(suggestion: &LinkSuggestion, filter: &SuggestionFilter) -> bool {
        if let Some(status) = filter.status {
            if suggestion.status != status {
                return false;
            }
        }
        if let Some(rule_id) = filter.rule_id {
            if suggestion.rule_id != Some(rule_id) {
                return false;
            }
        }
        if let Some(cutoff) = filter.generated_before {
            if suggestion.generated_at >= cutoff {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LinkType;
    use tempfile::TempDir;

    fn open_store() -> (RedbStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("links_test.redb");
        (RedbStorage::open(&db_path).unwrap(), temp_dir)
    }

    fn link(source: &str, target: &str, link_type: &str, bidirectional: bool) -> RecordLink {
        RecordLink::new(
            "vendors",
            source,
            "tasks",
            target,
            LinkType::new(link_type).unwrap(),
            "general",
            1.0,
            bidirectional,
            "test",
            false,
            None,
        )
    }

    #[test]
    fn test_put_link_rejects_duplicate_key() {
        let (store, _temp) = open_store();

        let first = link("vendors/V-1", "tasks/T-1", "related_to", false);
        store.put_link(&first).unwrap();

        let duplicate = link("vendors/V-1", "tasks/T-1", "related_to", false);
        let err = store.put_link(&duplicate);
        assert!(matches!(err, Err(NexusError::DuplicateLink { .. })));

        // The store is unchanged.
        let all = store.list_links(LinkFilter::new()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, first.id);
    }

    #[test]
    fn test_same_pair_different_link_type_allowed() {
        let (store, _temp) = open_store();
        store
            .put_link(&link("vendors/V-1", "tasks/T-1", "related_to", false))
            .unwrap();
        store
            .put_link(&link("vendors/V-1", "tasks/T-1", "supplies", false))
            .unwrap();
        assert_eq!(store.list_links(LinkFilter::new()).unwrap().len(), 2);
    }

    #[test]
    fn test_bidirectional_reverse_is_duplicate() {
        let (store, _temp) = open_store();
        store
            .put_link(&link("vendors/V-1", "tasks/T-1", "related_to", true))
            .unwrap();

        let reverse = link("tasks/T-1", "vendors/V-1", "related_to", false);
        assert!(matches!(
            store.put_link(&reverse),
            Err(NexusError::DuplicateLink { .. })
        ));
    }

    #[test]
    fn test_unidirectional_reverse_allowed() {
        let (store, _temp) = open_store();
        store
            .put_link(&link("vendors/V-1", "tasks/T-1", "related_to", false))
            .unwrap();
        store
            .put_link(&link("tasks/T-1", "vendors/V-1", "related_to", false))
            .unwrap();
        assert_eq!(store.list_links(LinkFilter::new()).unwrap().len(), 2);
    }

    #[test]
    fn test_deactivate_frees_key() {
        let (store, _temp) = open_store();
        let mut l = link("vendors/V-1", "tasks/T-1", "related_to", false);
        store.put_link(&l).unwrap();

        l.active = false;
        store.update_link(&l).unwrap();

        // Key is free again.
        store
            .put_link(&link("vendors/V-1", "tasks/T-1", "related_to", false))
            .unwrap();

        let active = store.list_links(LinkFilter::new()).unwrap();
        assert_eq!(active.len(), 1);
        let all = store.list_links(LinkFilter::new().include_inactive()).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_list_links_bidirectional_symmetry() {
        let (store, _temp) = open_store();
        store
            .put_link(&link("vendors/V-1", "tasks/T-1", "related_to", true))
            .unwrap();
        store
            .put_link(&link("vendors/V-2", "tasks/T-2", "related_to", false))
            .unwrap();

        // Bidirectional: visible from both endpoints.
        let from_source = store
            .list_links(LinkFilter::new().for_record("vendors/V-1"))
            .unwrap();
        let from_target = store
            .list_links(LinkFilter::new().for_record("tasks/T-1"))
            .unwrap();
        assert_eq!(from_source.len(), 1);
        assert_eq!(from_target.len(), 1);
        assert_eq!(from_source[0].id, from_target[0].id);

        // Unidirectional: target side does not see it.
        let t2 = store
            .list_links(LinkFilter::new().for_record("tasks/T-2"))
            .unwrap();
        assert!(t2.is_empty());
    }

    #[test]
    fn test_commit_acceptance_conflict_writes_nothing() {
        let (store, _temp) = open_store();

        // Winner takes the key first.
        store
            .put_link(&link("vendors/V-1", "tasks/T-1", "related_to", false))
            .unwrap();

        let mut suggestion = LinkSuggestion::new(
            None,
            "vendors/V-1",
            "tasks/T-1",
            LinkType::new("related_to").unwrap(),
            "test",
            0.9,
            vec![],
        );
        suggestion.status = SuggestionStatus::Accepted;
        let losing_link = link("vendors/V-1", "tasks/T-1", "related_to", false);

        let err = store.commit_acceptance(&suggestion, &losing_link);
        assert!(matches!(err, Err(NexusError::DuplicateLink { .. })));

        // Neither the link nor the accepted suggestion was written.
        assert!(store.get_link(losing_link.id).unwrap().is_none());
        assert!(store.get_suggestion(suggestion.id).unwrap().is_none());
    }

    #[test]
    fn test_rule_round_trip() {
        let (store, _temp) = open_store();
        let rule = RecordLinkRule::new(
            "vendor-task",
            "vendors",
            "tasks",
            LinkType::new("related_to").unwrap(),
        );
        store.put_rule(&rule).unwrap();

        let loaded = store.get_rule(rule.id).unwrap().unwrap();
        assert_eq!(loaded, rule);
        assert_eq!(store.list_rules().unwrap().len(), 1);

        store.delete_rule(rule.id).unwrap();
        assert!(store.get_rule(rule.id).unwrap().is_none());
    }
}
