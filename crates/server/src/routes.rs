use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use fakturo_agent::{Envelope, LlmClient, LlmOutcome, ToolDispatcher};
use fakturo_core::errors::DispatchError;
use fakturo_db::DbPool;

use crate::health;
use crate::pdf;

/// System message for the upload flow. `/process` callers supply their own;
/// uploads always extract with this fixed instruction.
pub const EXTRACTION_SYSTEM_MESSAGE: &str = "\
Du bist ein Assistent, der Rechnungsdaten extrahiert.
Wichtig: Formatiere alle Datumsangaben immer im Format YYYY-MM-DD (Beispiel: 2024-11-19).
Verwende ausschließlich dieses Format für alle Datumsangaben.";

#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<dyn LlmClient>,
    pub dispatcher: ToolDispatcher,
    pub upload_dir: PathBuf,
}

pub fn router(state: AppState, db_pool: DbPool, max_upload_bytes: u64) -> Router {
    Router::new()
        .route("/process", post(process))
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(max_upload_bytes as usize))
        .with_state(state)
        .merge(health::router(db_pool))
}

#[derive(Debug, Deserialize)]
struct ProcessRequest {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    system_message: Option<String>,
}

/// Direct dispatch: caller-supplied text and system message go through the
/// gateway, and whichever tool the model picks decides the action path.
async fn process(State(state): State<AppState>, Json(request): Json<ProcessRequest>) -> Response {
    let (Some(text), Some(system_message)) = (request.text, request.system_message) else {
        return bad_request("Fehlende Eingabedaten");
    };

    info!(event_name = "system.process.received", text_len = text.len(), "processing raw text");

    match state.llm.process(&text, &system_message).await {
        Ok(outcome) => envelope_response(state.dispatcher.dispatch(outcome).await),
        Err(error) => {
            warn!(event_name = "system.process.gateway_failed", error = %error, "llm gateway failed");
            (StatusCode::BAD_GATEWAY, Json(Envelope::from_llm_error(&error))).into_response()
        }
    }
}

/// Upload flow: accept one PDF, write it to a temp file, extract its text,
/// run the extraction instruction through the gateway, persist. The temp
/// file is removed on every path, success or failure.
async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut file_part: Option<(String, Vec<u8>)> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => file_part = Some((filename, bytes.to_vec())),
                    Err(error) => {
                        warn!(
                            event_name = "system.ingest.read_failed",
                            error = %error,
                            "could not read file part"
                        );
                        return bad_request("Kein Dateiteil");
                    }
                }
                break;
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(_) => return bad_request("Kein Dateiteil"),
        }
    }

    let Some((filename, bytes)) = file_part else {
        return bad_request("Kein Dateiteil");
    };
    if filename.is_empty() {
        return bad_request("Keine ausgewählte Datei");
    }
    if !filename.to_lowercase().ends_with(".pdf") {
        return bad_request("Dateityp nicht erlaubt");
    }

    // Strip any path components a hostile client put in the filename.
    let safe_name = Path::new(&filename)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.pdf")
        .to_string();
    let file_path = state.upload_dir.join(safe_name);

    if let Err(error) = tokio::fs::write(&file_path, &bytes).await {
        warn!(event_name = "system.ingest.write_failed", error = %error, "temp file write failed");
        return processing_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string());
    }

    info!(
        event_name = "system.ingest.received",
        filename = %filename,
        size_bytes = bytes.len(),
        "processing uploaded pdf"
    );

    let response = process_saved_pdf(&state, &file_path).await;

    if let Err(error) = tokio::fs::remove_file(&file_path).await {
        warn!(
            event_name = "system.ingest.cleanup_failed",
            path = %file_path.display(),
            error = %error,
            "temp file removal failed"
        );
    }

    response
}

async fn process_saved_pdf(state: &AppState, file_path: &Path) -> Response {
    let text = match pdf::extract_text(file_path).await {
        Ok(text) => text,
        Err(error) => {
            warn!(event_name = "system.ingest.extract_failed", error = %error, "pdf extraction failed");
            return processing_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string());
        }
    };

    match state.llm.process(&text, EXTRACTION_SYSTEM_MESSAGE).await {
        Ok(outcome @ LlmOutcome::Extract(_)) => {
            envelope_response(state.dispatcher.dispatch(outcome).await)
        }
        // An upload must extract; a query answer violates the contract.
        Ok(LlmOutcome::Query(_)) => {
            let error = DispatchError::UnexpectedToolResult(
                "upload produced `query_database` instead of `extract_invoice_data`".to_string(),
            );
            (StatusCode::BAD_GATEWAY, Json(Envelope::from_dispatch_error(&error))).into_response()
        }
        Err(error) => {
            warn!(event_name = "system.ingest.gateway_failed", error = %error, "llm gateway failed");
            (StatusCode::BAD_GATEWAY, Json(Envelope::from_llm_error(&error))).into_response()
        }
    }
}

fn envelope_response(envelope: Envelope) -> Response {
    let status = match envelope.error_label() {
        None => StatusCode::OK,
        Some("Verarbeitungsfehler") => StatusCode::BAD_GATEWAY,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(envelope)).into_response()
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn processing_error(status: StatusCode, details: String) -> Response {
    (status, Json(json!({ "error": "Verarbeitungsfehler", "details": details }))).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    use fakturo_agent::{LlmClient, LlmError, LlmOutcome, ToolDispatcher};
    use fakturo_core::catalog::SchemaCatalog;
    use fakturo_core::query::QueryDescriptor;
    use fakturo_db::{
        connect_with_settings, migrations, sample_invoice_payload, DbPool, SqlInvoiceStore,
        SqlQueryExecutor,
    };

    use super::{router, AppState};

    struct ScriptedLlm {
        result: Result<LlmOutcome, LlmError>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn process(&self, _: &str, _: &str) -> Result<LlmOutcome, LlmError> {
            self.result.clone()
        }
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to in-memory sqlite");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn app(pool: &DbPool, upload_dir: &std::path::Path, result: Result<LlmOutcome, LlmError>) -> Router {
        let dispatcher = ToolDispatcher::new(
            Arc::new(SqlInvoiceStore::new(pool.clone())),
            Arc::new(SqlQueryExecutor::new(pool.clone(), SchemaCatalog::default())),
        );
        let state = AppState {
            llm: Arc::new(ScriptedLlm { result }),
            dispatcher,
            upload_dir: upload_dir.to_path_buf(),
        };
        router(state, pool.clone(), 16 * 1024 * 1024)
    }

    fn process_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/process")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("build request")
    }

    fn upload_request(filename_header: &str, content: &[u8]) -> Request<Body> {
        let boundary = "fakturo-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; {filename_header}\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .expect("build request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
        serde_json::from_slice(&bytes).expect("body should be json")
    }

    fn query_outcome(raw: Value) -> LlmOutcome {
        let descriptor: QueryDescriptor =
            serde_json::from_value(raw).expect("descriptor should deserialize");
        LlmOutcome::Query(descriptor)
    }

    #[tokio::test]
    async fn process_rejects_missing_input_fields() {
        let pool = setup_pool().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let app = app(&pool, dir.path(), Err(LlmError::NoToolCall));

        let response = app
            .oneshot(process_request(json!({"text": "nur Text, keine Anweisung"})))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, json!({"error": "Fehlende Eingabedaten"}));

        pool.close().await;
    }

    #[tokio::test]
    async fn process_extract_outcome_persists_and_returns_envelope() {
        let pool = setup_pool().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let app =
            app(&pool, dir.path(), Ok(LlmOutcome::Extract(sample_invoice_payload())));

        let response = app
            .oneshot(process_request(
                json!({"text": "Rechnung R-2024-0001 ...", "system_message": "Extrahiere."}),
            ))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Rechnung erfolgreich verarbeitet");
        assert_eq!(body["data"]["kunde"]["name"], "Musterfirma GmbH");

        let invoices: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rechnungen")
            .fetch_one(&pool)
            .await
            .expect("count invoices");
        assert_eq!(invoices, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn process_query_outcome_returns_rows() {
        let pool = setup_pool().await;
        let dir = tempfile::tempdir().expect("tempdir");
        fakturo_db::seed_sample_invoice(&pool).await.expect("seed");

        let app = app(
            &pool,
            dir.path(),
            Ok(query_outcome(json!({
                "table_name": "rechnungen",
                "columns": ["gesamtbetrag"],
                "conditions": [
                    {"column": "bezahlt", "operator": "=", "value": false}
                ],
                "order_by": "asc"
            }))),
        );

        let response = app
            .oneshot(process_request(
                json!({"text": "Welche Rechnungen sind offen?", "system_message": "Frage die Datenbank ab."}),
            ))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Abfrage erfolgreich");
        assert_eq!(body["data"], json!([{"gesamtbetrag": 297.5}]));

        pool.close().await;
    }

    #[tokio::test]
    async fn process_gateway_contract_violation_is_bad_gateway() {
        let pool = setup_pool().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let app = app(
            &pool,
            dir.path(),
            Err(LlmError::UnknownTool("delete_everything".to_string())),
        );

        let response = app
            .oneshot(process_request(json!({"text": "x", "system_message": "y"})))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Verarbeitungsfehler");

        let invoices: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rechnungen")
            .fetch_one(&pool)
            .await
            .expect("count invoices");
        assert_eq!(invoices, 0, "a rejected tool result performs no store operations");

        pool.close().await;
    }

    #[tokio::test]
    async fn process_invalid_descriptor_is_internal_error() {
        let pool = setup_pool().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let app = app(
            &pool,
            dir.path(),
            Ok(query_outcome(json!({
                "table_name": "rechnungen",
                "columns": ["passwort"]
            }))),
        );

        let response = app
            .oneshot(process_request(json!({"text": "x", "system_message": "y"})))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Abfragefehler");

        pool.close().await;
    }

    #[tokio::test]
    async fn upload_without_file_part_is_rejected() {
        let pool = setup_pool().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let app = app(&pool, dir.path(), Err(LlmError::NoToolCall));

        let response = app
            .oneshot(upload_request("name=\"anhang\"; filename=\"invoice.pdf\"", b"%PDF-"))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, json!({"error": "Kein Dateiteil"}));

        pool.close().await;
    }

    #[tokio::test]
    async fn upload_with_empty_filename_is_rejected() {
        let pool = setup_pool().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let app = app(&pool, dir.path(), Err(LlmError::NoToolCall));

        let response = app
            .oneshot(upload_request("name=\"file\"; filename=\"\"", b"%PDF-"))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, json!({"error": "Keine ausgewählte Datei"}));

        pool.close().await;
    }

    #[tokio::test]
    async fn upload_with_wrong_extension_is_rejected() {
        let pool = setup_pool().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let app = app(&pool, dir.path(), Err(LlmError::NoToolCall));

        let response = app
            .oneshot(upload_request("name=\"file\"; filename=\"invoice.docx\"", b"PK"))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, json!({"error": "Dateityp nicht erlaubt"}));

        pool.close().await;
    }

    #[tokio::test]
    async fn failed_extraction_reports_error_and_removes_temp_file() {
        let pool = setup_pool().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let app = app(&pool, dir.path(), Err(LlmError::NoToolCall));

        // Accepted extension but not a decodable PDF.
        let response = app
            .oneshot(upload_request("name=\"file\"; filename=\"kaputt.pdf\"", b"not a pdf"))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Verarbeitungsfehler");

        let leftover = std::fs::read_dir(dir.path()).expect("read upload dir").count();
        assert_eq!(leftover, 0, "temp file must be removed on the failure path");

        pool.close().await;
    }

    #[tokio::test]
    async fn upload_answered_with_a_query_is_an_unexpected_tool_result() {
        let pool = setup_pool().await;
        let dir = tempfile::tempdir().expect("tempdir");

        // Valid single-page PDF skeleton; pdf-extract yields empty text.
        let minimal_pdf = minimal_pdf_bytes();
        let app = app(
            &pool,
            dir.path(),
            Ok(query_outcome(json!({"table_name": "kunden", "columns": ["name"]}))),
        );

        let response = app
            .oneshot(upload_request("name=\"file\"; filename=\"invoice.pdf\"", &minimal_pdf))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Verarbeitungsfehler");

        let leftover = std::fs::read_dir(dir.path()).expect("read upload dir").count();
        assert_eq!(leftover, 0);

        pool.close().await;
    }

    /// Smallest well-formed PDF: one empty page, cross-reference table,
    /// trailer. Enough for text extraction to succeed with empty output.
    fn minimal_pdf_bytes() -> Vec<u8> {
        let mut pdf = Vec::new();
        let header = b"%PDF-1.4\n";
        pdf.extend_from_slice(header);

        let objects: [&[u8]; 3] = [
            b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n",
            b"2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n",
            b"3 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>\nendobj\n",
        ];

        let mut offsets = Vec::new();
        for object in objects {
            offsets.push(pdf.len());
            pdf.extend_from_slice(object);
        }

        let xref_offset = pdf.len();
        pdf.extend_from_slice(b"xref\n0 4\n0000000000 65535 f \n");
        for offset in &offsets {
            pdf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size 4 /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n"
            )
            .as_bytes(),
        );
        pdf
    }
}
