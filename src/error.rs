use thiserror::Error;

/// Structured view of an error raised by the native PostgreSQL client.
///
/// Server-side errors carry their SQLSTATE in `code`; client-side failures
/// (I/O, closed connections, pool exhaustion) leave it empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct NativeError {
    pub code: Option<String>,
    pub message: String,
    pub detail: Option<String>,
    pub constraint: Option<String>,
    pub table: Option<String>,
}

impl NativeError {
    /// An error without a SQLSTATE.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            detail: None,
            constraint: None,
            table: None,
        }
    }

    /// A server error with the given SQLSTATE code.
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::message(message)
        }
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }
}

impl From<tokio_postgres::Error> for NativeError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db) => Self {
                code: Some(db.code().code().to_string()),
                message: db.message().to_string(),
                detail: db.detail().map(str::to_string),
                constraint: db.constraint().map(str::to_string),
                table: db.table().map(str::to_string),
            },
            None => Self::message(err.to_string()),
        }
    }
}

/// Error type for adapter operations
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Malformed connection descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("Failed to connect: {0}")]
    FailedToConnect(#[source] NativeError),

    #[error("Bad connection: {0}")]
    BadConnection(String),

    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    /// A native query failure, passed through untouched.
    #[error(transparent)]
    Native(#[from] NativeError),

    #[error("Unexpected error: {0}")]
    Unexpected(#[source] NativeError),

    #[error("Expected {expected} row(s), got {actual}")]
    UnexpectedRowCount { expected: usize, actual: usize },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),
}

impl AdapterError {
    /// The native error attached to this failure, if any.
    pub fn native(&self) -> Option<&NativeError> {
        match self {
            AdapterError::FailedToConnect(e)
            | AdapterError::Native(e)
            | AdapterError::Unexpected(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;
