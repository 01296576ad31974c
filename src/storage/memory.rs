//! In-process document store
//!
//! Mirrors the behaviour of a hosted document database closely enough to
//! exercise every degraded path: queries that need a composite index fail
//! with [`StoreError::IndexMissing`] unless that index has been declared.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::cmp::Ordering;
use uuid::Uuid;

use crate::storage::{
    validate_field, Direction, Document, DocumentStore, FieldOp, Filter, FilterOp, Query,
    StoreError, StoreResult, StoredDocument,
};

/// A composite index declared on a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeIndex {
    pub collection: String,
    pub fields: Vec<String>,
}

impl CompositeIndex {
    pub fn new(collection: &str, fields: &[&str]) -> Self {
        Self {
            collection: collection.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Equality fields may be listed in any order; the last field must match.
    fn covers(&self, collection: &str, required: &[String]) -> bool {
        if self.collection != collection || self.fields.len() != required.len() {
            return false;
        }
        match (self.fields.split_last(), required.split_last()) {
            (Some((own_tail, own_prefix)), Some((req_tail, req_prefix))) => {
                own_tail == req_tail && req_prefix.iter().all(|f| own_prefix.contains(f))
            }
            _ => false,
        }
    }
}

pub struct MemoryStore {
    collections: DashMap<String, DashMap<String, Document>>,
    indexes: Vec<CompositeIndex>,
}

impl MemoryStore {
    /// A store with no composite indexes.
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            indexes: Vec::new(),
        }
    }

    /// A store with every composite index the analytics queries rely on.
    pub fn with_required_indexes() -> Self {
        Self::new().with_indexes(crate::analytics::required_indexes())
    }

    pub fn with_index(mut self, index: CompositeIndex) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_indexes(mut self, indexes: impl IntoIterator<Item = CompositeIndex>) -> Self {
        self.indexes.extend(indexes);
        self
    }

    /// Number of documents in a collection
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn check_index(&self, query: &Query) -> StoreResult<()> {
        let Some(required) = query.required_index() else {
            return Ok(());
        };
        if self
            .indexes
            .iter()
            .any(|index| index.covers(&query.collection, &required))
        {
            Ok(())
        } else {
            Err(StoreError::IndexMissing {
                collection: query.collection.clone(),
                fields: required,
            })
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn matches(doc: &Document, filter: &Filter) -> bool {
    let Some(value) = doc.get(&filter.field) else {
        return false;
    };
    match (filter.op, compare_values(value, &filter.value)) {
        (FilterOp::Eq, Some(Ordering::Equal)) => true,
        (FilterOp::Gte, Some(Ordering::Equal | Ordering::Greater)) => true,
        _ => false,
    }
}

fn apply_op(doc: &mut Document, op: &FieldOp) -> StoreResult<()> {
    let current = |doc: &Document, field: &str| -> StoreResult<i64> {
        match doc.get(field) {
            None | Some(Value::Null) => Ok(0),
            Some(value) => value
                .as_i64()
                .ok_or_else(|| StoreError::Other(anyhow!("field {field} is not an integer"))),
        }
    };

    match op {
        FieldOp::Increment(field, by) => {
            let next = current(doc, field)? + by;
            doc.insert(field.clone(), Value::from(next));
        }
        FieldOp::Max(field, floor) => {
            let next = current(doc, field)?.max(*floor);
            doc.insert(field.clone(), Value::from(next));
        }
        FieldOp::Set(field, value) => {
            doc.insert(field.clone(), value.clone());
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn create(&self, collection: &str, data: Document) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), data);
        Ok(id)
    }

    async fn put(&self, collection: &str, id: &str, data: Document) -> StoreResult<()> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id).map(|doc| doc.value().clone())))
    }

    async fn update(&self, collection: &str, id: &str, ops: &[FieldOp]) -> StoreResult<()> {
        for op in ops {
            validate_field(op.field())?;
        }

        let not_found = || StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        };

        let docs = self.collections.get(collection).ok_or_else(not_found)?;
        let mut entry = docs.get_mut(id).ok_or_else(not_found)?;

        // Apply to a copy so a failing op leaves the document untouched
        let mut updated = entry.value().clone();
        for op in ops {
            apply_op(&mut updated, op)?;
        }
        *entry.value_mut() = updated;

        Ok(())
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<StoredDocument>> {
        for filter in &query.filters {
            validate_field(&filter.field)?;
        }
        self.check_index(query)?;

        let Some(docs) = self.collections.get(&query.collection) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<StoredDocument> = docs
            .iter()
            .filter(|entry| query.filters.iter().all(|f| matches(entry.value(), f)))
            .map(|entry| StoredDocument {
                id: entry.key().clone(),
                data: entry.value().clone(),
            })
            .collect();
        drop(docs);

        if let Some(order) = &query.order_by {
            results.retain(|doc| doc.data.contains_key(&order.field));
            results.sort_by(|a, b| {
                let ordering = compare_values(&a.data[&order.field], &b.data[&order.field])
                    .unwrap_or(Ordering::Equal);
                match order.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        Ok(results)
    }
}
