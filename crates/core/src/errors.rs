use thiserror::Error;

/// A query descriptor referenced an identifier outside the schema catalog.
///
/// Raised during compilation, before any SQL text is assembled. A rejected
/// descriptor never reaches the database.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InvalidSchemaReference {
    #[error("unknown table `{0}`")]
    UnknownTable(String),
    #[error("unknown column `{0}`")]
    UnknownColumn(String),
    #[error("unsupported operator `{0}`")]
    UnknownOperator(String),
}

/// Closed failure taxonomy for tool dispatch. Every failure the service can
/// produce maps onto exactly one of these; nothing else crosses the dispatch
/// boundary.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    InvalidSchemaReference(#[from] InvalidSchemaReference),
    #[error("query execution failed: {0}")]
    QueryExecution(String),
    #[error("persistence failed: {0}")]
    Persistence(String),
    #[error("unexpected tool result: {0}")]
    UnexpectedToolResult(String),
}

impl DispatchError {
    /// Client-facing error label. The wire contract keeps the German labels
    /// of the service it replaces.
    pub fn error_label(&self) -> &'static str {
        match self {
            Self::Persistence(_) => "Datenbankfehler",
            Self::InvalidSchemaReference(_) | Self::QueryExecution(_) => "Abfragefehler",
            Self::UnexpectedToolResult(_) => "Verarbeitungsfehler",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{DispatchError, InvalidSchemaReference};

    #[test]
    fn schema_rejection_carries_query_error_label() {
        let error =
            DispatchError::from(InvalidSchemaReference::UnknownTable("benutzer".to_owned()));

        assert_eq!(error.error_label(), "Abfragefehler");
        assert_eq!(error.to_string(), "unknown table `benutzer`");
    }

    #[test]
    fn execution_failure_carries_query_error_label() {
        let error = DispatchError::QueryExecution("database is locked".to_owned());

        assert_eq!(error.error_label(), "Abfragefehler");
    }

    #[test]
    fn persistence_failure_carries_database_error_label() {
        let error = DispatchError::Persistence("FOREIGN KEY constraint failed".to_owned());

        assert_eq!(error.error_label(), "Datenbankfehler");
    }

    #[test]
    fn unexpected_tool_result_carries_processing_error_label() {
        let error = DispatchError::UnexpectedToolResult("no tool call in response".to_owned());

        assert_eq!(error.error_label(), "Verarbeitungsfehler");
    }
}
