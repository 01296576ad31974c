pub mod cached;
pub mod memory;
pub mod share_directory;
pub mod sqlite;
pub mod trait_def;

pub use cached::CachedShareDirectory;
pub use memory::{CompositeIndex, MemoryStore};
pub use share_directory::{ShareDirectory, ShareLinkRef, StoreShareDirectory};
pub use sqlite::SqliteStore;
pub use trait_def::{
    validate_field, Direction, Document, DocumentStore, FieldOp, Filter, FilterOp, OrderBy, Query,
    StoreError, StoreResult, StoredDocument,
};
