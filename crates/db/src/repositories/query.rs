use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row};

use fakturo_core::catalog::{ColumnKind, SchemaCatalog};
use fakturo_core::query::{CompiledQuery, ScalarValue};

use super::{QueryExecutor, RepositoryError};
use crate::DbPool;

/// One result row as a JSON object, column name to typed value.
pub type QueryRow = serde_json::Map<String, serde_json::Value>;

/// Runs compiled queries and shapes rows for the response envelope.
///
/// Column names come from the result set itself, and each value is decoded
/// by the catalog kind of its column. Only whitelisted identifiers can
/// appear in compiled SQL, so an unknown result column is a decode error,
/// not a silent passthrough.
pub struct SqlQueryExecutor {
    pool: DbPool,
    catalog: SchemaCatalog,
}

impl SqlQueryExecutor {
    pub fn new(pool: DbPool, catalog: SchemaCatalog) -> Self {
        Self { pool, catalog }
    }

    fn row_to_json(&self, row: &SqliteRow) -> Result<QueryRow, RepositoryError> {
        let mut object = QueryRow::new();
        for column in row.columns() {
            let name = column.name();
            let kind = self.catalog.column_kind(name).ok_or_else(|| {
                RepositoryError::Decode(format!(
                    "result column `{name}` is not in the schema catalog"
                ))
            })?;
            let value = match kind {
                ColumnKind::Integer => {
                    serde_json::Value::from(row.try_get::<i64, _>(column.ordinal())?)
                }
                ColumnKind::Text => {
                    serde_json::Value::from(row.try_get::<String, _>(column.ordinal())?)
                }
                // NUMERIC affinity stores whole amounts as integers; f64
                // covers both storage classes.
                ColumnKind::Decimal => {
                    serde_json::Value::from(row.try_get::<f64, _>(column.ordinal())?)
                }
                ColumnKind::Boolean => {
                    serde_json::Value::from(row.try_get::<bool, _>(column.ordinal())?)
                }
            };
            object.insert(name.to_string(), value);
        }
        Ok(object)
    }
}

#[async_trait]
impl QueryExecutor for SqlQueryExecutor {
    async fn fetch_rows(&self, compiled: &CompiledQuery) -> Result<Vec<QueryRow>, RepositoryError> {
        let mut query = sqlx::query(&compiled.sql);
        for param in &compiled.params {
            query = match param {
                ScalarValue::Text(text) => query.bind(text),
                ScalarValue::Integer(integer) => query.bind(integer),
                ScalarValue::Float(float) => query.bind(float),
                ScalarValue::Bool(flag) => query.bind(flag),
            };
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(|row| self.row_to_json(row)).collect()
    }
}
