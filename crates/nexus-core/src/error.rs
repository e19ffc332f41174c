use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, NexusError>;

#[derive(Debug, Error)]
pub enum NexusError {
    #[error("Storage error: {0}")]
    Storage(#[from] redb::Error),

    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Storage operation error: {0}")]
    StorageOperation(#[from] redb::StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record not found: {module}/{record_id}")]
    RecordNotFound { module: String, record_id: String },

    #[error("Rule not found: {0}")]
    RuleNotFound(Uuid),

    #[error("Suggestion not found: {0}")]
    SuggestionNotFound(Uuid),

    #[error("Link not found: {0}")]
    LinkNotFound(Uuid),

    #[error("Duplicate link: source={source_record}, target={target}, link_type={link_type}")]
    DuplicateLink {
        source_record: String,
        target: String,
        link_type: String,
    },

    #[error("Conflict resolving suggestion {suggestion}: {reason}")]
    Conflict { suggestion: Uuid, reason: String },

    #[error("Invalid suggestion transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Validation error: {0}")]
    Validation(String),
}
