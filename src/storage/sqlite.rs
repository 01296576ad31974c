use crate::storage::{
    validate_field, Direction, Document, DocumentStore, FieldOp, FilterOp, Query, StoreError,
    StoreResult, StoredDocument,
};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Arguments, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Document store on a single SQLite table of JSON bodies.
///
/// Every field used in a query is addressed through `json_extract`, and the
/// composite indexes the analytics queries need are created as expression
/// indexes in [`DocumentStore::init`]. SQLite can always fall back to a scan,
/// so this backend never reports [`StoreError::IndexMissing`].
pub struct SqliteStore {
    pool: Arc<SqlitePool>,
}

impl SqliteStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

fn json_path(field: &str) -> String {
    format!("json_extract(data, '$.{field}')")
}

fn bind_value(args: &mut SqliteArguments<'_>, value: &Value) -> StoreResult<()> {
    let result = match value {
        Value::Bool(b) => args.add(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => args.add(i),
            None => args.add(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => args.add(s.clone()),
        other => args.add(other.to_string()),
    };
    result.map_err(|e| StoreError::Other(anyhow::anyhow!(e)))
}

fn parse_body(raw: &str) -> StoreResult<Document> {
    serde_json::from_str(raw).map_err(|e| StoreError::Other(e.into()))
}

fn encode_body(data: &Document) -> StoreResult<String> {
    serde_json::to_string(data).map_err(|e| StoreError::Other(e.into()))
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        let mut indexes: Vec<(String, Vec<String>)> = crate::analytics::required_indexes()
            .into_iter()
            .map(|index| (index.collection, index.fields))
            .collect();
        indexes.push((
            crate::storage::share_directory::SHARE_LINKS.to_string(),
            vec![crate::storage::share_directory::OWNER_FIELD.to_string()],
        ));

        for (collection, fields) in indexes {
            for field in &fields {
                validate_field(field)?;
            }
            let name = format!("idx_{}_{}", collection, fields.join("_"));
            let columns: Vec<String> = fields.iter().map(|f| json_path(f)).collect();
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS {name} ON documents(collection, {})",
                columns.join(", ")
            ))
            .execute(self.pool.as_ref())
            .await?;
        }

        Ok(())
    }

    async fn create(&self, collection: &str, data: Document) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();

        let result = sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data)
            VALUES (?, ?, ?)
            ON CONFLICT(collection, id) DO NOTHING
            "#,
        )
        .bind(collection)
        .bind(&id)
        .bind(encode_body(&data)?)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StoreError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Other(anyhow::anyhow!(
                "document id collision in {collection}"
            )));
        }

        Ok(id)
    }

    async fn put(&self, collection: &str, id: &str, data: Document) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data)
            VALUES (?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(encode_body(&data)?)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StoreError::Other(e.into()))?;

        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let row = sqlx::query_scalar::<_, String>(
            r#"
            SELECT data FROM documents
            WHERE collection = ? AND id = ?
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| StoreError::Other(e.into()))?;

        row.as_deref().map(parse_body).transpose()
    }

    async fn update(&self, collection: &str, id: &str, ops: &[FieldOp]) -> StoreResult<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut args = SqliteArguments::default();
        let mut assignments = Vec::with_capacity(ops.len());

        for op in ops {
            let field = op.field();
            validate_field(field)?;
            let current = format!("COALESCE({}, 0)", json_path(field));
            let expr = match op {
                FieldOp::Increment(_, by) => {
                    bind_value(&mut args, &Value::from(*by))?;
                    format!("{current} + ?")
                }
                FieldOp::Max(_, floor) => {
                    bind_value(&mut args, &Value::from(*floor))?;
                    format!("MAX({current}, ?)")
                }
                FieldOp::Set(_, value) => {
                    bind_value(&mut args, &Value::String(value.to_string()))?;
                    "json(?)".to_string()
                }
            };
            assignments.push(format!("'$.{field}', {expr}"));
        }

        bind_value(&mut args, &Value::from(collection))?;
        bind_value(&mut args, &Value::from(id))?;

        // A single statement, so concurrent updates cannot interleave
        let sql = format!(
            "UPDATE documents SET data = json_set(data, {}) WHERE collection = ? AND id = ?",
            assignments.join(", ")
        );

        let result = sqlx::query_with(&sql, args)
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| StoreError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }

        Ok(())
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<StoredDocument>> {
        let mut args = SqliteArguments::default();
        let mut sql = String::from("SELECT id, data FROM documents WHERE collection = ?");
        bind_value(&mut args, &Value::from(query.collection.as_str()))?;

        for filter in &query.filters {
            validate_field(&filter.field)?;
            let path = json_path(&filter.field);
            match (filter.op, &filter.value) {
                (FilterOp::Eq, Value::Null) => {
                    sql.push_str(&format!(" AND {path} IS NULL"));
                }
                (FilterOp::Eq, value) => {
                    sql.push_str(&format!(" AND {path} = ?"));
                    bind_value(&mut args, value)?;
                }
                (FilterOp::Gte, value) => {
                    sql.push_str(&format!(" AND {path} >= ?"));
                    bind_value(&mut args, value)?;
                }
            }
        }

        if let Some(order) = &query.order_by {
            validate_field(&order.field)?;
            let path = json_path(&order.field);
            let direction = match order.direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            sql.push_str(&format!(" AND {path} IS NOT NULL ORDER BY {path} {direction}"));
        }

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_value(&mut args, &Value::from(limit as i64))?;
        }

        let rows = sqlx::query_as_with::<_, (String, String), _>(&sql, args)
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(|e| StoreError::Other(e.into()))?;

        rows.into_iter()
            .map(|(id, raw)| {
                Ok(StoredDocument {
                    id,
                    data: parse_body(&raw)?,
                })
            })
            .collect()
    }
}
