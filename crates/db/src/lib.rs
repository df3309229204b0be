pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{sample_invoice_payload, seed_sample_invoice, SeedResult};
pub use repositories::{
    InvoiceStore, QueryExecutor, QueryRow, RepositoryError, SqlInvoiceStore, SqlQueryExecutor,
};
