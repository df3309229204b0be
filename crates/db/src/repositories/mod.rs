use async_trait::async_trait;
use thiserror::Error;

use fakturo_core::domain::invoice::{InvoiceId, InvoicePayload};
use fakturo_core::query::CompiledQuery;

pub mod invoice;
pub mod query;

pub use invoice::SqlInvoiceStore;
pub use query::{QueryRow, SqlQueryExecutor};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Write path: persists one extracted invoice payload atomically.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn save_invoice(&self, payload: &InvoicePayload) -> Result<InvoiceId, RepositoryError>;
}

/// Read path: runs a compiled query and projects rows to JSON objects.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn fetch_rows(&self, compiled: &CompiledQuery) -> Result<Vec<QueryRow>, RepositoryError>;
}
