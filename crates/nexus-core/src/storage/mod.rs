mod filters;
mod redb_storage;
mod traits;

pub use filters::{LinkFilter, StoreStats, SuggestionFilter};
pub use redb_storage::{RedbStorage, CURRENT_SCHEMA_VERSION};
pub use traits::Storage;
