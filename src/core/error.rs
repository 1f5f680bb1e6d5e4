//! Typed error handling for the data layer
//!
//! Every failure surfaced by the field system, the entity manager or the HTTP
//! surface is a [`DataError`]. Each category carries its own HTTP status code
//! and a machine-readable code so that clients can branch on the kind of
//! failure instead of parsing messages.
//!
//! # Error Categories
//!
//! - [`EntityError`]: unknown entities, missing rows, unknown references
//! - [`ConfigError`]: invalid declarations, fatal at build time
//! - [`ValidationError`]: invalid input data or query options
//! - [`StorageError`]: storage backend failures and sync conflicts
//! - [`RequestError`]: malformed requests and permission denials
//!
//! # Example
//!
//! ```rust,ignore
//! match em.repository("todos")?.find_id(1, &RepoQuery::default()).await {
//!     Ok(res) if res.data.is_some() => println!("found"),
//!     Ok(_) => println!("no such row"),
//!     Err(DataError::Entity(EntityError::UnknownEntity { name })) => {
//!         println!("{} is not declared", name);
//!     }
//!     Err(e) => eprintln!("{}", e),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// The main error type of the data layer
#[derive(Debug)]
pub enum DataError {
    /// Entity lookup errors
    Entity(EntityError),

    /// Declaration errors (fatal at build time)
    Config(ConfigError),

    /// Input validation errors
    Validation(ValidationError),

    /// Storage backend errors
    Storage(StorageError),

    /// HTTP/Request errors
    Request(RequestError),
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::Entity(e) => write!(f, "{}", e),
            DataError::Config(e) => write!(f, "{}", e),
            DataError::Validation(e) => write!(f, "{}", e),
            DataError::Storage(e) => write!(f, "{}", e),
            DataError::Request(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::Entity(e) => Some(e),
            DataError::Config(e) => Some(e),
            DataError::Validation(e) => Some(e),
            DataError::Storage(e) => Some(e),
            DataError::Request(e) => Some(e),
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl DataError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            DataError::Entity(e) => e.status_code(),
            DataError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DataError::Validation(_) => StatusCode::BAD_REQUEST,
            DataError::Storage(e) => e.status_code(),
            DataError::Request(e) => e.status_code(),
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            DataError::Entity(e) => e.error_code(),
            DataError::Config(e) => e.error_code(),
            DataError::Validation(e) => e.error_code(),
            DataError::Storage(e) => e.error_code(),
            DataError::Request(e) => e.error_code(),
        }
    }

    /// True for the "not found" family, which the HTTP layer maps to 404
    pub fn is_not_found(&self) -> bool {
        self.status_code() == StatusCode::NOT_FOUND
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            DataError::Entity(EntityError::NotFound { entity, id }) => {
                Some(serde_json::json!({ "entity": entity, "id": id }))
            }
            DataError::Config(ConfigError::InvalidFieldConfig { field, config, .. }) => {
                Some(serde_json::json!({ "field": field, "config": config }))
            }
            DataError::Validation(ValidationError::FieldError { field, .. }) => {
                Some(serde_json::json!({ "field": field }))
            }
            DataError::Validation(ValidationError::FieldErrors(errors)) => {
                Some(serde_json::json!({ "fields": errors }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for DataError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Entity Errors
// =============================================================================

/// Errors related to entity lookups
#[derive(Debug)]
pub enum EntityError {
    /// Entity name is not declared in the manager
    UnknownEntity { name: String },

    /// Row with the given primary id does not exist
    NotFound { entity: String, id: i64 },

    /// Reference name does not resolve to a relation of the entity
    ReferenceNotFound { entity: String, reference: String },
}

impl fmt::Display for EntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityError::UnknownEntity { name } => {
                write!(f, "Entity \"{}\" not found", name)
            }
            EntityError::NotFound { entity, id } => {
                write!(f, "{} with id '{}' not found", entity, id)
            }
            EntityError::ReferenceNotFound { entity, reference } => {
                write!(
                    f,
                    "Reference \"{}\" not found on entity \"{}\"",
                    reference, entity
                )
            }
        }
    }
}

impl std::error::Error for EntityError {}

impl EntityError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::NOT_FOUND
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            EntityError::UnknownEntity { .. } => "ENTITY_NOT_FOUND",
            EntityError::NotFound { .. } => "ROW_NOT_FOUND",
            EntityError::ReferenceNotFound { .. } => "REFERENCE_NOT_FOUND",
        }
    }
}

impl From<EntityError> for DataError {
    fn from(err: EntityError) -> Self {
        DataError::Entity(err)
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors raised while building the data model from its declarations
#[derive(Debug)]
pub enum ConfigError {
    /// Field type tag is not part of the field registry
    FieldTypeNotFound { field: String, field_type: String },

    /// Field config does not match the field's own schema
    InvalidFieldConfig {
        field: String,
        config: Value,
        message: String,
    },

    /// Entity name or entity config is invalid
    InvalidEntityConfig { entity: String, message: String },

    /// A different field with the same name already exists
    DuplicateField { entity: String, field: String },

    /// More than one primary field was supplied
    MultiplePrimaryFields { entity: String },

    /// Entity name registered twice
    DuplicateEntity { entity: String },

    /// Index refers to missing fields or is otherwise malformed
    InvalidIndex { index: String, message: String },

    /// Relation cannot be resolved or initialized
    InvalidRelation { relation: String, message: String },

    /// Failed to parse a configuration document
    ParseError {
        file: Option<String>,
        message: String,
    },

    /// Configuration file not found
    FileNotFound { path: String },

    /// IO error while reading configuration
    IoError { message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FieldTypeNotFound { field, field_type } => {
                write!(
                    f,
                    "Field type \"{}\" not found (field \"{}\")",
                    field_type, field
                )
            }
            ConfigError::InvalidFieldConfig { field, message, .. } => {
                write!(f, "Invalid config for field \"{}\": {}", field, message)
            }
            ConfigError::InvalidEntityConfig { entity, message } => {
                write!(f, "Invalid config for entity \"{}\": {}", entity, message)
            }
            ConfigError::DuplicateField { entity, field } => {
                write!(
                    f,
                    "Field \"{}\" already exists on entity \"{}\"",
                    field, entity
                )
            }
            ConfigError::MultiplePrimaryFields { entity } => {
                write!(f, "Entity \"{}\" has more than one primary field", entity)
            }
            ConfigError::DuplicateEntity { entity } => {
                write!(f, "Entity \"{}\" is already registered", entity)
            }
            ConfigError::InvalidIndex { index, message } => {
                write!(f, "Invalid index \"{}\": {}", index, message)
            }
            ConfigError::InvalidRelation { relation, message } => {
                write!(f, "Invalid relation \"{}\": {}", relation, message)
            }
            ConfigError::ParseError { file, message } => {
                if let Some(file) = file {
                    write!(f, "Failed to parse config file '{}': {}", file, message)
                } else {
                    write!(f, "Failed to parse config: {}", message)
                }
            }
            ConfigError::FileNotFound { path } => {
                write!(f, "Configuration file not found: {}", path)
            }
            ConfigError::IoError { message } => {
                write!(f, "IO error: {}", message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ConfigError::FieldTypeNotFound { .. } => "FIELD_TYPE_NOT_FOUND",
            ConfigError::InvalidFieldConfig { .. } => "INVALID_FIELD_CONFIG",
            ConfigError::InvalidEntityConfig { .. } => "INVALID_ENTITY_CONFIG",
            ConfigError::DuplicateField { .. } => "DUPLICATE_FIELD",
            ConfigError::MultiplePrimaryFields { .. } => "MULTIPLE_PRIMARY_FIELDS",
            ConfigError::DuplicateEntity { .. } => "DUPLICATE_ENTITY",
            ConfigError::InvalidIndex { .. } => "INVALID_INDEX",
            ConfigError::InvalidRelation { .. } => "INVALID_RELATION",
            ConfigError::ParseError { .. } => "CONFIG_PARSE_ERROR",
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND",
            ConfigError::IoError { .. } => "CONFIG_IO_ERROR",
        }
    }
}

impl From<ConfigError> for DataError {
    fn from(err: ConfigError) -> Self {
        DataError::Config(err)
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors related to input validation
#[derive(Debug)]
pub enum ValidationError {
    /// Single field validation error
    FieldError { field: String, message: String },

    /// Multiple field validation errors
    FieldErrors(Vec<FieldValidationError>),

    /// Query options failed validation
    InvalidQuery { message: String },

    /// Invalid JSON format
    InvalidJson { message: String },

    /// Bulk delete without a predicate
    UnboundedDelete { entity: String },
}

/// A single field validation error
#[derive(Debug, Clone, Serialize)]
pub struct FieldValidationError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::FieldError { field, message } => {
                write!(f, "Validation error for field '{}': {}", field, message)
            }
            ValidationError::FieldErrors(errors) => {
                let msgs: Vec<String> = errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect();
                write!(f, "Validation errors: {}", msgs.join(", "))
            }
            ValidationError::InvalidQuery { message } => {
                write!(f, "Invalid query: {}", message)
            }
            ValidationError::InvalidJson { message } => {
                write!(f, "Invalid JSON: {}", message)
            }
            ValidationError::UnboundedDelete { entity } => {
                write!(
                    f,
                    "Refusing to delete from \"{}\" without a where clause",
                    entity
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::FieldError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        ValidationError::InvalidQuery {
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::FieldError { .. } => "VALIDATION_ERROR",
            ValidationError::FieldErrors(_) => "VALIDATION_ERROR",
            ValidationError::InvalidQuery { .. } => "INVALID_QUERY",
            ValidationError::InvalidJson { .. } => "INVALID_JSON",
            ValidationError::UnboundedDelete { .. } => "UNBOUNDED_DELETE",
        }
    }
}

impl From<ValidationError> for DataError {
    fn from(err: ValidationError) -> Self {
        DataError::Validation(err)
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors related to storage backends
#[derive(Debug)]
pub enum StorageError {
    /// The backend rejected or failed an operation
    Backend { backend: String, message: String },

    /// Another schema sync is running
    SyncInProgress,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Backend { backend, message } => {
                write!(f, "{} storage error: {}", backend, message)
            }
            StorageError::SyncInProgress => {
                write!(f, "A schema sync is already in progress")
            }
        }
    }
}

impl std::error::Error for StorageError {}

impl StorageError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            StorageError::Backend { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            StorageError::SyncInProgress => StatusCode::CONFLICT,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            StorageError::Backend { .. } => "STORAGE_ERROR",
            StorageError::SyncInProgress => "SYNC_IN_PROGRESS",
        }
    }
}

impl From<StorageError> for DataError {
    fn from(err: StorageError) -> Self {
        DataError::Storage(err)
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Errors related to HTTP requests
#[derive(Debug)]
pub enum RequestError {
    /// Path id is not a positive integer
    InvalidEntityId { id: String },

    /// Invalid request body
    InvalidBody { message: String },

    /// Unauthorized request
    Unauthorized { message: String },

    /// Forbidden operation
    Forbidden { permission: String },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::InvalidEntityId { id } => {
                write!(f, "Invalid entity ID format: '{}'", id)
            }
            RequestError::InvalidBody { message } => {
                write!(f, "Invalid request body: {}", message)
            }
            RequestError::Unauthorized { message } => {
                write!(f, "Unauthorized: {}", message)
            }
            RequestError::Forbidden { permission } => {
                write!(f, "Forbidden: permission \"{}\" not granted", permission)
            }
        }
    }
}

impl std::error::Error for RequestError {}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::InvalidEntityId { .. } => StatusCode::BAD_REQUEST,
            RequestError::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            RequestError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            RequestError::Forbidden { .. } => StatusCode::FORBIDDEN,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::InvalidEntityId { .. } => "INVALID_ENTITY_ID",
            RequestError::InvalidBody { .. } => "INVALID_BODY",
            RequestError::Unauthorized { .. } => "UNAUTHORIZED",
            RequestError::Forbidden { .. } => "FORBIDDEN",
        }
    }
}

impl From<RequestError> for DataError {
    fn from(err: RequestError) -> Self {
        DataError::Request(err)
    }
}

// =============================================================================
// Result type alias
// =============================================================================

/// A specialized Result type for data layer operations
pub type DataResult<T> = Result<T, DataError>;
