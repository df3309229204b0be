use fakturo_core::domain::invoice::InvoicePayload;
use fakturo_core::query::QueryDescriptor;

use crate::llm::LlmError;

/// The two tool payloads the LLM may produce. Anything else is stopped at
/// the gateway boundary as an `UnexpectedToolResult`; dispatch only ever
/// sees this closed sum.
#[derive(Clone, Debug, PartialEq)]
pub enum LlmOutcome {
    /// `extract_invoice_data`: one normalized invoice to persist.
    Extract(InvoicePayload),
    /// `query_database`: one declarative read query to compile and run.
    Query(QueryDescriptor),
}

impl LlmOutcome {
    /// Parses a raw tool call (function name plus JSON argument string)
    /// into an outcome. Unknown names and arguments that do not match the
    /// tagged schema are gateway errors, not panics.
    pub fn from_tool_call(name: &str, arguments: &str) -> Result<Self, LlmError> {
        match name {
            "extract_invoice_data" => serde_json::from_str::<InvoicePayload>(arguments)
                .map(Self::Extract)
                .map_err(|error| LlmError::MalformedArguments {
                    tool: name.to_string(),
                    detail: error.to_string(),
                }),
            "query_database" => serde_json::from_str::<QueryDescriptor>(arguments)
                .map(Self::Query)
                .map_err(|error| LlmError::MalformedArguments {
                    tool: name.to_string(),
                    detail: error.to_string(),
                }),
            other => Err(LlmError::UnknownTool(other.to_string())),
        }
    }
}
