//! LLM gateway and tool dispatch.
//!
//! The LLM is strictly a translator: it turns free text into one of two
//! tool payloads and never touches the database itself. This crate owns the
//! two pieces around that contract:
//!
//! - `llm` is the gateway. It declares the two function tools (with
//!   identifier enums rendered from the schema catalog), sends one
//!   chat-completion request, and parses the first tool call into a closed
//!   `LlmOutcome`. Unknown tags and malformed arguments die here.
//! - `dispatcher` routes an outcome to exactly one handler (invoice
//!   persistence or query compile-and-execute) and shapes every result,
//!   success or failure, into the uniform response envelope.

pub mod dispatcher;
pub mod llm;
pub mod outcome;

pub use dispatcher::{Envelope, ToolDispatcher};
pub use llm::{LlmClient, LlmError, OpenAiChatClient};
pub use outcome::LlmOutcome;
