//! Error types with credential sanitization.
//!
//! Every variant here is caught at the probe-cycle boundary and turned into a
//! failed probe result, so the messages are written for operators reading a
//! webhook payload or a log line. None of them ever carry a password.

use thiserror::Error;

/// Main error type for dbwatch operations.
///
/// # Security
/// All error messages are sanitized to prevent credential leakage.
/// Connection strings and passwords are never included in error output.
#[derive(Debug, Error)]
pub enum DbWatchError {
    /// Backend token is not one of the supported engines
    #[error("Unsupported database type: {backend}")]
    UnsupportedBackend { backend: String },

    /// Protected credential could not be decrypted on this host
    #[error("Credential decryption failed: {context}")]
    Decryption { context: String },

    /// Every Firebird authentication plugin was rejected
    #[error("All authentication methods failed for Firebird connection (tried: {})", .attempted.join(", "))]
    AllAuthMethodsExhausted { attempted: Vec<String> },

    /// Oracle logon trigger refuses this application until an administrator trusts it
    #[error(
        "Oracle trigger {trigger} blocks the application; manual fix by a database administrator is required ({remediation}). Details: {details}"
    )]
    ApplicationTrustBlocked {
        trigger: String,
        remediation: String,
        details: String,
    },

    /// Connection succeeded but the probe query failed
    #[error("Query execution failed: {context}")]
    QueryExecution { context: String },

    /// Database connection failed (credentials sanitized)
    #[error("Database connection failed: {context}")]
    Connection { context: String },

    /// Encryption operation failed
    #[error("Encryption operation failed: {context}")]
    Encryption { context: String },

    /// Configuration or validation error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Vendor installation files could not be read or understood
    #[error("Bootstrap failed: {message}")]
    Bootstrap { message: String },

    /// Unsupported feature in this build
    #[error("Unsupported operation: {feature} not supported for {database_type}")]
    UnsupportedFeature {
        feature: String,
        database_type: String,
    },

    /// The surrounding service asked the probe to stop
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O operation failed
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed
    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results with DbWatchError
pub type Result<T> = std::result::Result<T, DbWatchError>;

/// Safely redacts database URLs for logging and error messages.
///
/// Used for the legacy `fb://` / `oracle://` configuration form.
///
/// # Example
///
/// ```rust
/// use dbwatch_core::error::redact_database_url;
///
/// let sanitized = redact_database_url("fb://user:secret@localhost:3050/db");
/// assert_eq!(sanitized, "fb://user:****@localhost:3050/db");
/// assert!(!sanitized.contains("secret"));
/// ```
pub fn redact_database_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed_url) => {
            if parsed_url.password().is_some() {
                let _ = parsed_url.set_password(Some("****"));
            }
            parsed_url.to_string()
        }
        Err(_) => "<redacted>".to_string(),
    }
}

impl DbWatchError {
    /// Creates a connection error with sanitized context
    pub fn connection_failed(context: impl Into<String>) -> Self {
        Self::Connection {
            context: context.into(),
        }
    }

    /// Creates a decryption error
    pub fn decryption(context: impl Into<String>) -> Self {
        Self::Decryption {
            context: context.into(),
        }
    }

    /// Creates an encryption error
    pub fn encryption(context: impl Into<String>) -> Self {
        Self::Encryption {
            context: context.into(),
        }
    }

    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a bootstrap error
    pub fn bootstrap(message: impl Into<String>) -> Self {
        Self::Bootstrap {
            message: message.into(),
        }
    }

    /// Creates a query execution error
    pub fn query_failed(context: impl Into<String>) -> Self {
        Self::QueryExecution {
            context: context.into(),
        }
    }

    /// Creates an unsupported backend error
    pub fn unsupported_backend(backend: impl Into<String>) -> Self {
        Self::UnsupportedBackend {
            backend: backend.into(),
        }
    }

    /// Creates an unsupported feature error
    pub fn unsupported_feature(
        feature: impl Into<String>,
        database_type: impl Into<String>,
    ) -> Self {
        Self::UnsupportedFeature {
            feature: feature.into(),
            database_type: database_type.into(),
        }
    }

    /// Wraps an I/O error with the operation that failed
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// True when retrying inside the same cycle cannot help.
    pub const fn requires_operator(&self) -> bool {
        matches!(
            self,
            Self::ApplicationTrustBlocked { .. } | Self::Decryption { .. }
        )
    }
}
