//! Database connectivity core for the dbwatch probe service.
//!
//! This crate holds every component with real decision logic: rendering a
//! vendor-neutral descriptor into Oracle or Firebird connection syntax,
//! negotiating authentication across an ordered strategy list, protecting
//! the stored password with a machine-bound key, and running the read-only
//! probe query. Scheduling, reporting and the CLI live in the `dbwatch`
//! binary crate.
//!
//! # Security Guarantees
//! - The password is persisted only as AES-GCM ciphertext bound to this host
//! - Plaintext credentials live in zeroizing memory and are never logged
//! - Connection strings are logged only in redacted form
//! - The probe runs a single read-only query
//!
//! # Architecture
//! - Driver seam (`DatabaseConnector` / `DatabaseSession`) for testable I/O
//! - Factory for the feature-gated Oracle and Firebird drivers
//! - Pluggable `AuthStrategy` list driven by one negotiation loop
//! - Every failure classified into `DbWatchError` and turned into a failed
//!   `ProbeResult` at the cycle boundary

pub mod adapters;
pub mod bootstrap;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod models;
pub mod negotiator;
pub mod probe;
pub mod security;

// Re-export commonly used types
pub use adapters::{DatabaseConnector, DatabaseSession, create_connector};
pub use config::{ConfigStore, LoadedConfig, ServiceConfig, WebhookMethod};
pub use connection::{ConnectionDescriptor, ConnectionString, build_connection_string};
pub use error::{DbWatchError, Result};
pub use logging::init_logging;
pub use models::{BackendKind, ProbeOutcome, ProbeResult, RowId};
pub use negotiator::{
    AuthNegotiator, AuthStrategy, FirebirdAuthPlugin, NegotiatedSession, TrustBlockDetector,
};
pub use probe::ProbeRunner;
pub use security::{Credential, MachineKey, SecretVault};
