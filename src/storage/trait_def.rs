use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// A schemaless document body.
pub type Document = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The query needs a composite index the store does not have.
    #[error("missing composite index on {collection}({})", .fields.join(", "))]
    IndexMissing {
        collection: String,
        fields: Vec<String>,
    },
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },
    #[error("invalid field name: {0}")]
    InvalidField(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_index_missing(&self) -> bool {
        matches!(self, StoreError::IndexMissing { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Filtered, optionally ordered and limited read over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: &str) -> Self {
        Self {
            collection: name.to_string(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        });
        self
    }

    pub fn where_gte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op: FilterOp::Gte,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Same query with the `order_by` clause dropped.
    pub fn without_order(mut self) -> Self {
        self.order_by = None;
        self
    }

    /// Fields of the composite index this query needs, or `None` if it can be
    /// served from single-field indexes.
    ///
    /// Equality fields come first, followed by the range or ordering field.
    pub fn required_index(&self) -> Option<Vec<String>> {
        let mut eq_fields: Vec<String> = Vec::new();
        let mut range_field: Option<&str> = None;

        for filter in &self.filters {
            match filter.op {
                FilterOp::Eq => {
                    if !eq_fields.contains(&filter.field) {
                        eq_fields.push(filter.field.clone());
                    }
                }
                FilterOp::Gte => range_field = Some(filter.field.as_str()),
            }
        }

        let order_field = self.order_by.as_ref().map(|o| o.field.as_str());
        let needs_index = match order_field {
            Some(field) => eq_fields.iter().any(|f| f != field),
            None => eq_fields.len() >= 2 && range_field.is_some(),
        };

        if !needs_index {
            return None;
        }

        let tail = order_field.or(range_field)?;
        let mut fields: Vec<String> = eq_fields.into_iter().filter(|f| f != tail).collect();
        fields.push(tail.to_string());
        Some(fields)
    }
}

/// One atomic modification applied by [`DocumentStore::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Add to a numeric field, treating a missing field as zero.
    Increment(String, i64),
    /// Overwrite a field.
    Set(String, Value),
    /// Raise a numeric field to at least the given value.
    Max(String, i64),
}

impl FieldOp {
    pub fn field(&self) -> &str {
        match self {
            FieldOp::Increment(field, _) | FieldOp::Set(field, _) | FieldOp::Max(field, _) => {
                field
            }
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Initialize the storage (create tables, indexes, etc.)
    async fn init(&self) -> Result<()>;

    /// Append a new document and return its generated id. Never overwrites.
    async fn create(&self, collection: &str, data: Document) -> StoreResult<String>;

    /// Write a whole document under a caller-chosen id
    async fn put(&self, collection: &str, id: &str, data: Document) -> StoreResult<()>;

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Apply all `ops` to one existing document atomically
    async fn update(&self, collection: &str, id: &str, ops: &[FieldOp]) -> StoreResult<()>;

    async fn query(&self, query: &Query) -> StoreResult<Vec<StoredDocument>>;
}

/// Field names are interpolated into backend query text, so only plain
/// identifiers are accepted.
pub fn validate_field(field: &str) -> StoreResult<()> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidField(field.to_string()))
    }
}
