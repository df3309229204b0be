use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use fakturo_core::errors::DispatchError;
use fakturo_core::query::QueryBuilder;
use fakturo_db::{InvoiceStore, QueryExecutor};

use crate::llm::LlmError;
use crate::outcome::LlmOutcome;

/// Uniform response shape for every dispatch: success carries a message and
/// the data, failure carries an error label and a detail string. There is
/// no partial-success shape.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    Success { message: &'static str, data: Value },
    Failure { error: &'static str, details: String },
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn error_label(&self) -> Option<&'static str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error, .. } => Some(error),
        }
    }

    pub fn from_dispatch_error(error: &DispatchError) -> Self {
        Self::Failure { error: error.error_label(), details: error.to_string() }
    }

    pub fn from_llm_error(error: &LlmError) -> Self {
        Self::Failure { error: error.error_label(), details: error.to_string() }
    }
}

/// Routes one tool outcome to exactly one handler: extraction payloads go
/// to the invoice store, query descriptors through the builder to the
/// executor. Nothing throws past this point; every outcome becomes an
/// envelope.
#[derive(Clone)]
pub struct ToolDispatcher {
    store: Arc<dyn InvoiceStore>,
    executor: Arc<dyn QueryExecutor>,
    builder: QueryBuilder,
}

impl ToolDispatcher {
    pub fn new(store: Arc<dyn InvoiceStore>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { store, executor, builder: QueryBuilder::default() }
    }

    pub async fn dispatch(&self, outcome: LlmOutcome) -> Envelope {
        match outcome {
            LlmOutcome::Extract(payload) => match self.store.save_invoice(&payload).await {
                Ok(invoice_id) => {
                    info!(
                        event_name = "system.dispatch.invoice_saved",
                        invoice_id = invoice_id.0,
                        rechnungsnummer = %payload.rechnung.rechnungsnummer,
                        line_count = payload.produkte.len(),
                        "invoice payload persisted"
                    );
                    // The wire contract echoes the payload back on success.
                    let data = serde_json::to_value(&payload).unwrap_or(Value::Null);
                    Envelope::Success { message: "Rechnung erfolgreich verarbeitet", data }
                }
                Err(error) => {
                    warn!(
                        event_name = "system.dispatch.persistence_failed",
                        error = %error,
                        "invoice transaction rolled back"
                    );
                    Envelope::from_dispatch_error(&DispatchError::Persistence(error.to_string()))
                }
            },
            LlmOutcome::Query(descriptor) => {
                let compiled = match self.builder.compile(&descriptor) {
                    Ok(compiled) => compiled,
                    Err(error) => {
                        warn!(
                            event_name = "system.dispatch.descriptor_rejected",
                            table_name = %descriptor.table_name,
                            error = %error,
                            "query descriptor failed whitelist validation"
                        );
                        return Envelope::from_dispatch_error(&error.into());
                    }
                };

                match self.executor.fetch_rows(&compiled).await {
                    Ok(rows) => {
                        info!(
                            event_name = "system.dispatch.query_executed",
                            table_name = %descriptor.table_name,
                            row_count = rows.len(),
                            "read query executed"
                        );
                        let data = Value::Array(rows.into_iter().map(Value::Object).collect());
                        Envelope::Success { message: "Abfrage erfolgreich", data }
                    }
                    Err(error) => {
                        warn!(
                            event_name = "system.dispatch.query_failed",
                            table_name = %descriptor.table_name,
                            error = %error,
                            "read query execution failed"
                        );
                        Envelope::from_dispatch_error(&DispatchError::QueryExecution(
                            error.to_string(),
                        ))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use fakturo_core::catalog::SchemaCatalog;
    use fakturo_core::domain::invoice::{InvoiceId, InvoicePayload};
    use fakturo_core::query::{CompiledQuery, QueryDescriptor};
    use fakturo_db::{
        connect_with_settings, migrations, sample_invoice_payload, DbPool, InvoiceStore,
        QueryExecutor, QueryRow, RepositoryError, SqlInvoiceStore, SqlQueryExecutor,
    };

    use super::{Envelope, ToolDispatcher};
    use crate::outcome::LlmOutcome;

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to in-memory sqlite");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn dispatcher_for(pool: &DbPool) -> ToolDispatcher {
        ToolDispatcher::new(
            Arc::new(SqlInvoiceStore::new(pool.clone())),
            Arc::new(SqlQueryExecutor::new(pool.clone(), SchemaCatalog::default())),
        )
    }

    fn query_outcome(raw: serde_json::Value) -> LlmOutcome {
        let descriptor: QueryDescriptor =
            serde_json::from_value(raw).expect("descriptor should deserialize");
        LlmOutcome::Query(descriptor)
    }

    #[tokio::test]
    async fn extract_outcome_persists_and_echoes_the_payload() {
        let pool = setup_pool().await;
        let dispatcher = dispatcher_for(&pool);

        let envelope = dispatcher.dispatch(LlmOutcome::Extract(sample_invoice_payload())).await;

        match envelope {
            Envelope::Success { message, data } => {
                assert_eq!(message, "Rechnung erfolgreich verarbeitet");
                assert_eq!(data["kunde"]["name"], json!("Musterfirma GmbH"));
                assert_eq!(data["rechnung"]["rechnungsdatum"], json!("2024-11-19"));
            }
            Envelope::Failure { details, .. } => panic!("dispatch should succeed: {details}"),
        }

        let invoice_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rechnungen")
            .fetch_one(&pool)
            .await
            .expect("count invoices");
        assert_eq!(invoice_count, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn query_outcome_compiles_executes_and_returns_rows() {
        let pool = setup_pool().await;
        let dispatcher = dispatcher_for(&pool);

        dispatcher.dispatch(LlmOutcome::Extract(sample_invoice_payload())).await;

        let envelope = dispatcher
            .dispatch(query_outcome(json!({
                "table_name": "rechnungen",
                "columns": ["gesamtbetrag"],
                "conditions": [
                    {"column": "bezahlt", "operator": "=", "value": false}
                ],
                "order_by": "asc"
            })))
            .await;

        match envelope {
            Envelope::Success { message, data } => {
                assert_eq!(message, "Abfrage erfolgreich");
                assert_eq!(data, json!([{"gesamtbetrag": 297.5}]));
            }
            Envelope::Failure { details, .. } => panic!("dispatch should succeed: {details}"),
        }

        pool.close().await;
    }

    #[tokio::test]
    async fn persistence_failure_maps_to_datenbankfehler() {
        let pool = setup_pool().await;
        let dispatcher = dispatcher_for(&pool);

        sqlx::query("DROP TABLE rechnungsposten").execute(&pool).await.expect("drop table");

        let envelope = dispatcher.dispatch(LlmOutcome::Extract(sample_invoice_payload())).await;

        assert_eq!(envelope.error_label(), Some("Datenbankfehler"));

        pool.close().await;
    }

    struct PanickingStore;

    #[async_trait]
    impl InvoiceStore for PanickingStore {
        async fn save_invoice(&self, _: &InvoicePayload) -> Result<InvoiceId, RepositoryError> {
            panic!("write path must not run for a rejected descriptor");
        }
    }

    #[derive(Default)]
    struct CountingExecutor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QueryExecutor for CountingExecutor {
        async fn fetch_rows(&self, _: &CompiledQuery) -> Result<Vec<QueryRow>, RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn rejected_descriptor_never_reaches_the_executor() {
        let executor = Arc::new(CountingExecutor::default());
        let dispatcher = ToolDispatcher::new(Arc::new(PanickingStore), executor.clone());

        let envelope = dispatcher
            .dispatch(query_outcome(json!({
                "table_name": "kunden",
                "columns": ["name; DROP TABLE kunden"]
            })))
            .await;

        assert_eq!(envelope.error_label(), Some("Abfragefehler"));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0, "no SQL may run after rejection");
    }

    #[tokio::test]
    async fn executor_failure_maps_to_abfragefehler() {
        let pool = setup_pool().await;
        let dispatcher = dispatcher_for(&pool);

        sqlx::query("DROP TABLE kunden").execute(&pool).await.expect("drop table");

        let envelope = dispatcher
            .dispatch(query_outcome(json!({
                "table_name": "kunden",
                "columns": ["name"]
            })))
            .await;

        assert_eq!(envelope.error_label(), Some("Abfragefehler"));

        pool.close().await;
    }

    #[test]
    fn envelopes_serialize_to_the_wire_contract() {
        let success = Envelope::Success { message: "Abfrage erfolgreich", data: json!([]) };
        assert_eq!(
            serde_json::to_value(&success).expect("serialize success"),
            json!({"message": "Abfrage erfolgreich", "data": []})
        );

        let failure = Envelope::Failure {
            error: "Abfragefehler",
            details: "unknown table `benutzer`".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&failure).expect("serialize failure"),
            json!({"error": "Abfragefehler", "details": "unknown table `benutzer`"})
        );
    }
}
