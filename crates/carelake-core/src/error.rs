use thiserror::Error;

/// Errors raised while building or executing a query.
///
/// Everything except [`QueryError::Execution`] is raised eagerly at
/// construction time, so a malformed query never reaches the executor.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Missing required argument: {name}")]
    MissingArgument { name: String },

    #[error("Missing column '{column}' in {context}")]
    MissingColumn { column: String, context: String },

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unrecognized table: {0}")]
    UnrecognizedTable(String),

    #[error("Query execution failed: {0}")]
    Execution(String),
}

impl QueryError {
    /// Create a new MissingArgument error.
    pub fn missing_argument(name: impl Into<String>) -> Self {
        Self::MissingArgument { name: name.into() }
    }

    /// Create a new MissingColumn error naming the table or operator it
    /// was detected in.
    pub fn missing_column(column: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
            context: context.into(),
        }
    }

    /// Create a new UnknownColumn error.
    pub fn unknown_column(column: impl Into<String>) -> Self {
        Self::UnknownColumn(column.into())
    }

    /// Create a new InvalidArgument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a new UnrecognizedTable error.
    pub fn unrecognized_table(name: impl Into<String>) -> Self {
        Self::UnrecognizedTable(name.into())
    }

    /// Create a new Execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Whether this error was raised while building the query, as opposed
    /// to running it.
    pub fn is_construction_error(&self) -> bool {
        !matches!(self, Self::Execution(_))
    }
}

/// Convenience result type for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_argument_message() {
        let err = QueryError::missing_argument("limit");
        assert_eq!(err.to_string(), "Missing required argument: limit");
        assert!(err.is_construction_error());
    }

    #[test]
    fn test_missing_column_names_context() {
        let err = QueryError::missing_column("subject_id", "Join");
        assert_eq!(err.to_string(), "Missing column 'subject_id' in Join");
    }

    #[test]
    fn test_execution_is_not_construction() {
        let err = QueryError::execution("connection reset");
        assert!(!err.is_construction_error());
    }

    #[test]
    fn test_unrecognized_table_message() {
        let err = QueryError::unrecognized_table("nope");
        assert_eq!(err.to_string(), "Unrecognized table: nope");
    }
}
