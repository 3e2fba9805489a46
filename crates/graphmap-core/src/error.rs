use thiserror::Error;

/// Boxed cause carried by errors that wrap foreign failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A failure reported by a graph backend, before classification.
///
/// `code` is the server's structured status code (for Neo4j, e.g.
/// `Neo.ClientError.Schema.ConstraintValidationFailed`) when the driver
/// exposes one.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct DriverError {
    pub code: Option<String>,
    pub message: String,
    #[source]
    pub source: Option<BoxError>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Row → entity conversion failures.
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Missing property: {0}")]
    MissingProperty(String),

    #[error("Type mismatch for '{field}': expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Unknown relationship field: {0}")]
    UnknownField(String),

    #[error("Relationship field '{field}' received an entity of the wrong type")]
    RelatedType { field: String },

    #[error("No mapper registered for label {0}")]
    UnknownLabel(String),

    #[error("{0}")]
    Invalid(String),
}

impl MappingError {
    /// Attach the field name to a type mismatch raised below field level.
    pub fn for_field(self, name: &str) -> Self {
        match self {
            MappingError::TypeMismatch {
                field,
                expected,
                found,
            } if field.is_empty() => MappingError::TypeMismatch {
                field: name.to_string(),
                expected,
                found,
            },
            other => other,
        }
    }
}

/// Top-level error taxonomy for repository operations.
///
/// Every variant names the operation it came from; driver-derived variants
/// keep the original [`DriverError`] as their source.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("{context}: entity not found")]
    NotFound { context: String },

    #[error("{context}: constraint violation: {source}")]
    ConstraintViolation {
        context: String,
        #[source]
        source: DriverError,
    },

    #[error("{context}: transient failure: {source}")]
    Transient {
        context: String,
        #[source]
        source: DriverError,
    },

    #[error("{context}: unauthorized: {source}")]
    Unauthorized {
        context: String,
        #[source]
        source: DriverError,
    },

    #[error("{context}: {message}")]
    Repository {
        context: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl RepositoryError {
    pub fn not_found(context: impl Into<String>) -> Self {
        RepositoryError::NotFound {
            context: context.into(),
        }
    }

    pub fn repository(context: impl Into<String>, message: impl Into<String>) -> Self {
        RepositoryError::Repository {
            context: context.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn mapping(context: impl Into<String>, error: MappingError) -> Self {
        RepositoryError::Repository {
            context: context.into(),
            message: format!("Mapping failed: {error}"),
            source: Some(Box::new(error)),
        }
    }

    /// The operation context string.
    pub fn context(&self) -> &str {
        match self {
            RepositoryError::NotFound { context }
            | RepositoryError::ConstraintViolation { context, .. }
            | RepositoryError::Transient { context, .. }
            | RepositoryError::Unauthorized { context, .. }
            | RepositoryError::Repository { context, .. } => context,
        }
    }

    /// Whether retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepositoryError::Transient { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, RepositoryError>;
