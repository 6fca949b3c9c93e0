//! Directory client error types
//!
//! A closed error taxonomy for directory operations. Transport failures are
//! translated into these variants at the component boundary; nothing from the
//! wire layer escapes untyped.

use std::fmt;

use thiserror::Error;

/// Coarse classification of a [`DirectoryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Host unreachable, unknown host, authentication rejected, service unavailable.
    Connection,
    /// Unsupported URL or attribute encoding.
    Encoding,
    /// Invalid distinguished name or context path.
    NameSyntax,
    ObjectNotFound,
    ObjectAlreadyExists,
    /// A search matched more than one entry where uniqueness was required.
    ObjectAmbiguous,
    AttributeInvalidData,
    AttributeInvalidType,
    AttributeInUse,
    AttributeSchemaViolation,
    OperationUnsupported,
    /// Missing, invalid or unsupported-critical-extension certificate.
    Certificate,
    /// Missing required argument, bad schema document or unconfigured instance state.
    Configuration,
    /// Any other failure reported by the directory.
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Encoding => "encoding",
            ErrorKind::NameSyntax => "name syntax",
            ErrorKind::ObjectNotFound => "object not found",
            ErrorKind::ObjectAlreadyExists => "object already exists",
            ErrorKind::ObjectAmbiguous => "object ambiguous",
            ErrorKind::AttributeInvalidData => "attribute invalid data",
            ErrorKind::AttributeInvalidType => "attribute invalid type",
            ErrorKind::AttributeInUse => "attribute in use",
            ErrorKind::AttributeSchemaViolation => "attribute schema violation",
            ErrorKind::OperationUnsupported => "operation unsupported",
            ErrorKind::Certificate => "certificate",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Error that can occur during directory operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    // Connection errors (usually transient)
    /// Failed to reach any configured directory endpoint.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The endpoint host name could not be resolved.
    #[error("unknown host: {host}")]
    UnknownHost { host: String },

    /// The directory rejected the bind credentials.
    #[error("authentication failed for principal '{principal}'")]
    AuthenticationFailed { principal: String },

    /// The directory is busy or unavailable.
    #[error("directory service unavailable: {message}")]
    ServiceUnavailable { message: String },

    // Encoding and naming errors
    /// The configured URL encoding is not supported.
    #[error("unsupported encoding: {encoding}")]
    EncodingNotSupported { encoding: String },

    /// A distinguished name or context path is syntactically invalid.
    #[error("invalid name '{name}': {message}")]
    NameSyntax { name: String, message: String },

    // Object errors
    /// Object not found in the directory.
    #[error("object not found: {identifier}")]
    ObjectNotFound { identifier: String },

    /// Object already exists in the directory.
    #[error("object already exists: {identifier}")]
    ObjectAlreadyExists { identifier: String },

    /// A uniqueness lookup matched more than one entry.
    #[error("object ambiguous: {identifier} matched {count} entries")]
    ObjectAmbiguous { identifier: String, count: usize },

    // Attribute errors
    /// An attribute value is not valid for its syntax.
    #[error("invalid attribute data: {message}")]
    AttributeInvalidData { message: String },

    /// An attribute type is not defined by the directory schema.
    #[error("invalid attribute type: {message}")]
    AttributeInvalidType { message: String },

    /// An attribute or value already exists.
    #[error("attribute in use: {message}")]
    AttributeInUse { message: String },

    /// The change violates the object class or a schema constraint.
    #[error("schema violation: {message}")]
    AttributeSchemaViolation { message: String },

    /// The directory does not support the requested operation or control.
    #[error("operation not supported: {message}")]
    OperationUnsupported { message: String },

    // Security errors
    /// A certificate is missing, unreadable or carries an unsupported critical extension.
    #[error("certificate error: {message}")]
    Certificate {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Configuration errors (permanent)
    /// Client configuration or instance state is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The schema mapping document is not well formed.
    #[error("malformed document at byte {position}: {message}")]
    MalformedDocument { message: String, position: u64 },

    /// The schema mapping document contains an element outside the grammar.
    #[error("unknown element '{element}' at byte {position}")]
    UnknownElement { element: String, position: u64 },

    /// An element appears under a parent that is not one of its legal parents.
    #[error("element '{element}' is not allowed inside '{parent}' (byte {position})")]
    InvalidTransition {
        parent: String,
        element: String,
        position: u64,
    },

    /// An element carries an attribute the grammar does not declare.
    #[error("unknown attribute '{attribute}' on element '{element}' at byte {position}")]
    UnknownAttribute {
        element: String,
        attribute: String,
        position: u64,
    },

    /// Operation failed for a reason outside the taxonomy above.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl DirectoryError {
    /// Map this error onto the closed error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DirectoryError::ConnectionFailed { .. }
            | DirectoryError::UnknownHost { .. }
            | DirectoryError::AuthenticationFailed { .. }
            | DirectoryError::ServiceUnavailable { .. } => ErrorKind::Connection,
            DirectoryError::EncodingNotSupported { .. } => ErrorKind::Encoding,
            DirectoryError::NameSyntax { .. } => ErrorKind::NameSyntax,
            DirectoryError::ObjectNotFound { .. } => ErrorKind::ObjectNotFound,
            DirectoryError::ObjectAlreadyExists { .. } => ErrorKind::ObjectAlreadyExists,
            DirectoryError::ObjectAmbiguous { .. } => ErrorKind::ObjectAmbiguous,
            DirectoryError::AttributeInvalidData { .. } => ErrorKind::AttributeInvalidData,
            DirectoryError::AttributeInvalidType { .. } => ErrorKind::AttributeInvalidType,
            DirectoryError::AttributeInUse { .. } => ErrorKind::AttributeInUse,
            DirectoryError::AttributeSchemaViolation { .. } => ErrorKind::AttributeSchemaViolation,
            DirectoryError::OperationUnsupported { .. } => ErrorKind::OperationUnsupported,
            DirectoryError::Certificate { .. } => ErrorKind::Certificate,
            DirectoryError::InvalidConfiguration { .. }
            | DirectoryError::MalformedDocument { .. }
            | DirectoryError::UnknownElement { .. }
            | DirectoryError::InvalidTransition { .. }
            | DirectoryError::UnknownAttribute { .. } => ErrorKind::Configuration,
            DirectoryError::OperationFailed { .. } => ErrorKind::Other,
        }
    }

    /// Check if this error is transient and the caller may retry.
    ///
    /// The library itself never retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DirectoryError::ConnectionFailed { .. } | DirectoryError::ServiceUnavailable { .. }
        )
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            DirectoryError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            DirectoryError::UnknownHost { .. } => "UNKNOWN_HOST",
            DirectoryError::AuthenticationFailed { .. } => "AUTH_FAILED",
            DirectoryError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            DirectoryError::EncodingNotSupported { .. } => "ENCODING_NOT_SUPPORTED",
            DirectoryError::NameSyntax { .. } => "NAME_SYNTAX",
            DirectoryError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            DirectoryError::ObjectAlreadyExists { .. } => "OBJECT_EXISTS",
            DirectoryError::ObjectAmbiguous { .. } => "OBJECT_AMBIGUOUS",
            DirectoryError::AttributeInvalidData { .. } => "ATTRIBUTE_INVALID_DATA",
            DirectoryError::AttributeInvalidType { .. } => "ATTRIBUTE_INVALID_TYPE",
            DirectoryError::AttributeInUse { .. } => "ATTRIBUTE_IN_USE",
            DirectoryError::AttributeSchemaViolation { .. } => "SCHEMA_VIOLATED",
            DirectoryError::OperationUnsupported { .. } => "NOT_SUPPORTED",
            DirectoryError::Certificate { .. } => "CERTIFICATE_ERROR",
            DirectoryError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            DirectoryError::MalformedDocument { .. } => "MALFORMED_DOCUMENT",
            DirectoryError::UnknownElement { .. } => "UNKNOWN_ELEMENT",
            DirectoryError::InvalidTransition { .. } => "INVALID_TRANSITION",
            DirectoryError::UnknownAttribute { .. } => "UNKNOWN_ATTRIBUTE",
            DirectoryError::OperationFailed { .. } => "OPERATION_FAILED",
        }
    }

    /// Translate an LDAP result code into the taxonomy.
    ///
    /// `identifier` names the entry (or filter) the operation targeted.
    pub fn from_result_code(rc: u32, text: &str, identifier: &str) -> Self {
        let message = if text.is_empty() {
            format!("{identifier} (result code {rc})")
        } else {
            format!("{identifier}: {text} (result code {rc})")
        };
        match rc {
            32 => DirectoryError::ObjectNotFound {
                identifier: identifier.to_string(),
            },
            68 => DirectoryError::ObjectAlreadyExists {
                identifier: identifier.to_string(),
            },
            20 => DirectoryError::AttributeInUse { message },
            21 => DirectoryError::AttributeInvalidData { message },
            17 => DirectoryError::AttributeInvalidType { message },
            19 | 64 | 65 | 67 | 69 => DirectoryError::AttributeSchemaViolation { message },
            12 | 53 | 66 => DirectoryError::OperationUnsupported { message },
            34 => DirectoryError::NameSyntax {
                name: identifier.to_string(),
                message: text.to_string(),
            },
            49 => DirectoryError::AuthenticationFailed {
                principal: identifier.to_string(),
            },
            51 | 52 => DirectoryError::ServiceUnavailable { message },
            _ => DirectoryError::OperationFailed {
                message,
                source: None,
            },
        }
    }

    /// Keep this error if its kind is one the operation reports, otherwise
    /// fold it into an [`DirectoryError::OperationFailed`] naming the operation.
    ///
    /// Connection-class errors always pass through unchanged.
    pub(crate) fn narrow(self, reported: &[ErrorKind], operation: &str, dn: &str) -> Self {
        let kind = self.kind();
        if kind == ErrorKind::Connection || reported.contains(&kind) {
            self
        } else {
            DirectoryError::OperationFailed {
                message: format!("{operation} failed for {dn}"),
                source: Some(Box::new(self)),
            }
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        DirectoryError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        DirectoryError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an operation failed error with source.
    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a certificate error.
    pub fn certificate(message: impl Into<String>) -> Self {
        DirectoryError::Certificate {
            message: message.into(),
            source: None,
        }
    }

    /// Create a certificate error with source.
    pub fn certificate_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::Certificate {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a name syntax error.
    pub fn malformed_name(name: impl Into<String>, message: impl Into<String>) -> Self {
        DirectoryError::NameSyntax {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        DirectoryError::InvalidConfiguration {
            message: message.into(),
        }
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
