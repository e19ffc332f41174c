use crate::error::{NexusError, Result};
use crate::types::{LinkableRecord, RecordKey, RecordMetadata};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Input shape a collaborator module pushes on create/update.
#[derive(Debug, Clone, Default)]
pub struct RecordDraft {
    pub record_id: String,
    pub module: String,
    pub record_type: String,
    pub title: String,
    pub description: Option<String>,
    pub metadata: RecordMetadata,
    pub searchable_fields: HashMap<String, Value>,
    pub access_restrictions: Vec<String>,
}

impl RecordDraft {
    pub fn new(module: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            module: module.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = record_type.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.searchable_fields.insert(name.into(), value);
        self
    }

    pub fn with_metadata(mut self, metadata: RecordMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// In-memory surrogate set, one entry per live business record.
///
/// Values are wrapped in `Arc` and replaced wholesale on upsert, so
/// concurrent readers see either the pre- or post-update surrogate but
/// never a partially-written one.
pub struct RecordIndex {
    records: RwLock<HashMap<RecordKey, Arc<LinkableRecord>>>,
}

impl Default for RecordIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordIndex {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or refresh the surrogate for a record. The surrogate id
    /// stays stable across re-indexing of the same key; index_version
    /// bumps on every call.
    pub fn upsert(&self, draft: RecordDraft) -> Result<LinkableRecord> {
        if draft.record_id.trim().is_empty() {
            return Err(NexusError::Validation(
                "record_id must not be empty".into(),
            ));
        }
        if draft.module.trim().is_empty() {
            return Err(NexusError::Validation("module must not be empty".into()));
        }

        let key = RecordKey::new(draft.module.clone(), draft.record_id.clone());

        let mut records = self
            .records
            .write()
            .map_err(|_| NexusError::Validation("Record index lock poisoned".into()))?;

        let (id, version) = match records.get(&key) {
            Some(existing) => (existing.id, existing.index_version + 1),
            None => (Uuid::now_v7(), 1),
        };

        let record = LinkableRecord {
            id,
            record_id: draft.record_id,
            module: draft.module,
            record_type: draft.record_type,
            title: draft.title,
            description: draft.description,
            metadata: draft.metadata,
            searchable_fields: draft.searchable_fields,
            last_indexed: Utc::now(),
            index_version: version,
            access_restrictions: draft.access_restrictions,
        };

        records.insert(key, Arc::new(record.clone()));
        Ok(record)
    }

    /// Drop the surrogate for a deleted record. Returns it if present.
    pub fn remove(&self, module: &str, record_id: &str) -> Result<Option<Arc<LinkableRecord>>> {
        let key = RecordKey::new(module, record_id);
        let mut records = self
            .records
            .write()
            .map_err(|_| NexusError::Validation("Record index lock poisoned".into()))?;
        Ok(records.remove(&key))
    }

    pub fn get(&self, module: &str, record_id: &str) -> Result<Option<Arc<LinkableRecord>>> {
        let key = RecordKey::new(module, record_id);
        let records = self
            .records
            .read()
            .map_err(|_| NexusError::Validation("Record index lock poisoned".into()))?;
        Ok(records.get(&key).cloned())
    }

    /// Resolve a `module/record_id` composite, the form link and
    /// suggestion endpoints are stored in.
    pub fn resolve(&self, composite: &str) -> Result<Option<Arc<LinkableRecord>>> {
        match composite.split_once('/') {
            Some((module, record_id)) => self.get(module, record_id),
            None => Ok(None),
        }
    }

    /// Query the surrogate set. Both filters optional; keyword terms
    /// match case-insensitively against title, search keywords, and
    /// string searchable fields. The result is a point-in-time
    /// snapshot, so iteration is finite and restartable.
    pub fn query(&self, module: Option<&str>, keywords: Option<&[&str]>) -> Result<Vec<Arc<LinkableRecord>>> {
        let records = self
            .records
            .read()
            .map_err(|_| NexusError::Validation("Record index lock poisoned".into()))?;

        let mut out: Vec<Arc<LinkableRecord>> = records
            .values()
            .filter(|r| module.map_or(true, |m| r.module == m))
            .filter(|r| keywords.map_or(true, |terms| terms.iter().all(|t| Self::matches_keyword(r, t))))
            .cloned()
            .collect();

        // Deterministic order for callers and tests.
        out.sort_by(|a, b| (&a.module, &a.record_id).cmp(&(&b.module, &b.record_id)));
        Ok(out)
    }

    /// All surrogates for one module. The scan path's candidate source.
    pub fn by_module(&self, module: &str) -> Result<Vec<Arc<LinkableRecord>>> {
        self.query(Some(module), None)
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matches_keyword(record: &LinkableRecord, term: &str) -> bool {
        let term = term.to_lowercase();
        if record.title.to_lowercase().contains(&term) {
            return true;
        }
        if record
            .metadata
            .search_keywords
            .iter()
            .any(|k| k.to_lowercase().contains(&term))
        {
            return true;
        }
        record.searchable_fields.values().any(|v| match v {
            Value::String(s) => s.to_lowercase().contains(&term),
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upsert_rejects_malformed_input() {
        let index = RecordIndex::new();

        let no_id = RecordDraft::new("vendors", "");
        assert!(matches!(
            index.upsert(no_id),
            Err(NexusError::Validation(_))
        ));

        let no_module = RecordDraft::new("", "V-1001");
        assert!(matches!(
            index.upsert(no_module),
            Err(NexusError::Validation(_))
        ));

        // Empty optional fields are fine.
        let minimal = RecordDraft::new("vendors", "V-1001");
        assert!(index.upsert(minimal).is_ok());
    }

    #[test]
    fn test_upsert_keeps_surrogate_id_and_bumps_version() {
        let index = RecordIndex::new();

        let first = index
            .upsert(RecordDraft::new("vendors", "V-1001").with_title("Acme"))
            .unwrap();
        assert_eq!(first.index_version, 1);

        let second = index
            .upsert(RecordDraft::new("vendors", "V-1001").with_title("Acme Corp"))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.index_version, 2);
        assert!(second.last_indexed >= first.last_indexed);
    }

    #[test]
    fn test_remove_and_resolve() {
        let index = RecordIndex::new();
        index
            .upsert(RecordDraft::new("tasks", "T-7").with_title("Follow up"))
            .unwrap();

        assert!(index.resolve("tasks/T-7").unwrap().is_some());
        assert!(index.resolve("tasks/T-8").unwrap().is_none());
        assert!(index.resolve("garbage").unwrap().is_none());

        let removed = index.remove("tasks", "T-7").unwrap();
        assert!(removed.is_some());
        assert!(index.get("tasks", "T-7").unwrap().is_none());
    }

    #[test]
    fn test_query_filters() {
        let index = RecordIndex::new();
        index
            .upsert(
                RecordDraft::new("vendors", "V-1")
                    .with_title("Acme Industrial")
                    .with_field("city", json!("Manchester")),
            )
            .unwrap();
        index
            .upsert(RecordDraft::new("vendors", "V-2").with_title("Widget Supply"))
            .unwrap();
        index
            .upsert(RecordDraft::new("tasks", "T-1").with_title("Order widgets"))
            .unwrap();

        assert_eq!(index.query(Some("vendors"), None).unwrap().len(), 2);
        assert_eq!(index.query(None, None).unwrap().len(), 3);

        let by_keyword = index.query(None, Some(&["widget"])).unwrap();
        assert_eq!(by_keyword.len(), 2);

        let by_field = index.query(Some("vendors"), Some(&["manchester"])).unwrap();
        assert_eq!(by_field.len(), 1);
        assert_eq!(by_field[0].record_id, "V-1");
    }
}
