use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use fakturo_core::catalog::SchemaCatalog;
use fakturo_core::config::LlmConfig;

use crate::outcome::LlmOutcome;

/// Seam between the service and the language model. The production
/// implementation speaks OpenAI-compatible chat completions; tests inject
/// scripted doubles.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends one system/user message pair and returns the parsed tool
    /// outcome of the first tool call in the response.
    async fn process(&self, text: &str, system_message: &str) -> Result<LlmOutcome, LlmError>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Transport(String),
    #[error("llm returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("llm response carried no tool call")]
    NoToolCall,
    #[error("llm called unknown tool `{0}`")]
    UnknownTool(String),
    #[error("arguments for tool `{tool}` did not parse: {detail}")]
    MalformedArguments { tool: String, detail: String },
}

impl LlmError {
    /// Client-facing label; every gateway failure surfaces as a processing
    /// error on the wire.
    pub fn error_label(&self) -> &'static str {
        "Verarbeitungsfehler"
    }

    /// True for contract violations by the model itself (as opposed to
    /// transport or upstream-status failures).
    pub fn is_unexpected_tool_result(&self) -> bool {
        matches!(self, Self::NoToolCall | Self::UnknownTool(_) | Self::MalformedArguments { .. })
    }
}

/// OpenAI-compatible chat-completions client. The two function tools are
/// declared with strict schemas whose identifier enums come straight from
/// the schema catalog, so the model cannot even name an unknown column.
pub struct OpenAiChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    catalog: SchemaCatalog,
}

impl OpenAiChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.as_ref().map(|key| key.expose_secret().to_string()),
            model: config.model.clone(),
            catalog: SchemaCatalog::default(),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn process(&self, text: &str, system_message: &str) -> Result<LlmOutcome, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_message},
                {"role": "user", "content": text}
            ],
            "tools": tool_definitions(&self.catalog),
        });

        let mut request =
            self.http.post(format!("{}/chat/completions", self.base_url)).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        debug!(event_name = "system.llm.request", model = %self.model, "sending chat completion");
        let response =
            request.send().await.map_err(|error| LlmError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                event_name = "system.llm.api_error",
                status = status.as_u16(),
                "chat completion rejected"
            );
            return Err(LlmError::Api { status: status.as_u16(), body });
        }

        let completion: ChatCompletion =
            response.json().await.map_err(|error| LlmError::Transport(error.to_string()))?;
        outcome_from_completion(&completion)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    /// OpenAI returns tool arguments as a JSON-encoded string.
    arguments: String,
}

/// Takes the first tool call, matching the wire contract: the model is
/// expected to answer with exactly one tool call, so everything past the
/// first is ignored.
fn outcome_from_completion(completion: &ChatCompletion) -> Result<LlmOutcome, LlmError> {
    let tool_call = completion
        .choices
        .first()
        .and_then(|choice| choice.message.tool_calls.first())
        .ok_or(LlmError::NoToolCall)?;

    LlmOutcome::from_tool_call(&tool_call.function.name, &tool_call.function.arguments)
}

/// The two function-tool declarations sent with every request. Identifier
/// enums are rendered from the catalog so the request schema and the
/// whitelist cannot drift apart.
pub fn tool_definitions(catalog: &SchemaCatalog) -> Value {
    json!([
        {
            "type": "function",
            "function": {
                "name": "extract_invoice_data",
                "description": "Extrahiert strukturierte Daten aus einer Rechnung. \
                    Alle Datumsangaben müssen im Format YYYY-MM-DD sein (Beispiel: 2024-11-19).",
                "strict": true,
                "parameters": {
                    "type": "object",
                    "properties": {
                        "kunde": {
                            "type": "object",
                            "properties": {
                                "name": {"type": "string"},
                                "strasse": {"type": "string"},
                                "plz": {"type": "string"},
                                "ort": {"type": "string"},
                                "land": {"type": "string"}
                            },
                            "required": ["name", "strasse", "plz", "ort", "land"],
                            "additionalProperties": false
                        },
                        "rechnung": {
                            "type": "object",
                            "properties": {
                                "bestellnummer": {"type": "string"},
                                "rechnungsnummer": {"type": "string"},
                                "rechnungsdatum": {
                                    "type": "string",
                                    "description": "Datum im Format YYYY-MM-DD"
                                },
                                "leistungszeitraum_start": {
                                    "type": "string",
                                    "description": "Datum im Format YYYY-MM-DD"
                                },
                                "leistungszeitraum_ende": {
                                    "type": "string",
                                    "description": "Datum im Format YYYY-MM-DD"
                                },
                                "gesamtbetrag": {"type": "number"},
                                "mwst_prozent": {"type": "number"},
                                "mwst_betrag": {"type": "number"},
                                "bezahlt": {"type": "boolean"}
                            },
                            "required": [
                                "bestellnummer",
                                "rechnungsnummer",
                                "rechnungsdatum",
                                "leistungszeitraum_start",
                                "leistungszeitraum_ende",
                                "gesamtbetrag",
                                "mwst_prozent",
                                "mwst_betrag",
                                "bezahlt"
                            ],
                            "additionalProperties": false
                        },
                        "produkte": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "bezeichnung": {"type": "string"},
                                    "monatlicher_preis": {"type": "number"},
                                    "anzahl": {"type": "integer"},
                                    "preis": {"type": "number"}
                                },
                                "required": ["bezeichnung", "monatlicher_preis", "anzahl", "preis"],
                                "additionalProperties": false
                            }
                        },
                        "nachlaesse": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "typ": {"type": "string"},
                                    "betrag": {"type": "number"}
                                },
                                "required": ["typ", "betrag"],
                                "additionalProperties": false
                            }
                        }
                    },
                    "required": ["kunde", "rechnung", "produkte", "nachlaesse"],
                    "additionalProperties": false
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "query_database",
                "description": "Führt eine Datenbankabfrage aus.",
                "strict": true,
                "parameters": {
                    "type": "object",
                    "properties": {
                        "table_name": {
                            "type": "string",
                            "enum": catalog.table_names()
                        },
                        "columns": {
                            "type": "array",
                            "items": {
                                "type": "string",
                                "enum": catalog.column_names()
                            }
                        },
                        "conditions": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "column": {"type": "string"},
                                    "operator": {
                                        "type": "string",
                                        "enum": catalog.operators()
                                    },
                                    "value": {
                                        "anyOf": [
                                            {"type": "string"},
                                            {"type": "number"},
                                            {"type": "boolean"},
                                            {
                                                "type": "object",
                                                "properties": {
                                                    "column_name": {"type": "string"}
                                                },
                                                "required": ["column_name"],
                                                "additionalProperties": false
                                            }
                                        ]
                                    }
                                },
                                "required": ["column", "operator", "value"],
                                "additionalProperties": false
                            }
                        },
                        "order_by": {
                            "type": "string",
                            "enum": ["asc", "desc"]
                        }
                    },
                    "required": ["table_name", "columns", "conditions", "order_by"],
                    "additionalProperties": false
                }
            }
        }
    ])
}
