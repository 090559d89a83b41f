//! Database driver traits and factory.
//!
//! The negotiator and probe runner only see these traits, so tests can drive
//! them with scripted in-memory sessions and the real drivers stay behind
//! cargo features.
//!
//! # Module Structure
//! - `oracle`: Oracle driver over the `oracle` crate (feature `oracle`)
//! - `firebird`: Firebird wire-protocol driver over `rsfbclient` (feature `firebird`)

use crate::connection::ConnectionString;
use crate::models::{BackendKind, RowId};
use crate::Result;
use async_trait::async_trait;

#[cfg(feature = "firebird")]
pub mod firebird;
#[cfg(feature = "oracle")]
pub mod oracle;

/// Opens sessions from a rendered vendor connection string.
///
/// # Security
/// - The connection string holds the plaintext password; implementations
///   must never log it or copy it into an error message
/// - Driver errors are passed through as text so the negotiator can
///   classify them, which means they must not echo the connection string
///
/// # Object Safety
/// This trait is object-safe, allowing for dynamic dispatch through
/// `Box<dyn DatabaseConnector>`.
#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    /// Opens one physical connection.
    ///
    /// # Errors
    /// Returns `DbWatchError::Connection` carrying the driver's message
    async fn open(&self, connection_string: &ConnectionString) -> Result<Box<dyn DatabaseSession>>;

    /// Backend this connector talks to.
    fn backend(&self) -> BackendKind;
}

/// One open connection.
///
/// Dropping a session releases the connection as well; `close` exists so the
/// release can be observed and its error logged.
#[async_trait]
pub trait DatabaseSession: Send {
    /// Runs a trivial statement to confirm the connection is usable.
    ///
    /// # Errors
    /// Returns error if the statement fails
    async fn ping(&mut self, sql: &str) -> Result<()>;

    /// Runs a read-only query and returns one column of every row in
    /// result-set order.
    ///
    /// # Errors
    /// Returns `DbWatchError::QueryExecution` if the query fails
    async fn query_identifiers(&mut self, sql: &str, column: &str) -> Result<Vec<RowId>>;

    /// Releases the connection.
    ///
    /// # Errors
    /// Returns error if the driver reports a failure while closing
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Creates the driver for a backend.
///
/// # Errors
/// Returns `UnsupportedFeature` if the driver was not compiled in
pub fn create_connector(backend: BackendKind) -> Result<Box<dyn DatabaseConnector>> {
    match backend {
        #[cfg(feature = "oracle")]
        BackendKind::Oracle => Ok(Box::new(oracle::OracleConnector::new())),
        #[cfg(not(feature = "oracle"))]
        BackendKind::Oracle => Err(crate::error::DbWatchError::unsupported_feature(
            "Oracle driver",
            "Compile with --features oracle to enable Oracle support",
        )),
        #[cfg(feature = "firebird")]
        BackendKind::Firebird => Ok(Box::new(firebird::FirebirdConnector::new())),
        #[cfg(not(feature = "firebird"))]
        BackendKind::Firebird => Err(crate::error::DbWatchError::unsupported_feature(
            "Firebird driver",
            "Compile with --features firebird to enable Firebird support",
        )),
    }
}

/// Reads a mandatory key from a rendered connection string.
#[cfg(any(feature = "oracle", feature = "firebird"))]
fn required<'a>(connection_string: &'a ConnectionString, key: &str) -> Result<&'a str> {
    connection_string.get(key).ok_or_else(|| {
        crate::error::DbWatchError::configuration(format!(
            "connection string is missing '{}'",
            key
        ))
    })
}

/// Runs a blocking driver call on the blocking pool.
///
/// The connection is moved into the task and put back afterwards, so a
/// session stays usable across calls. A session whose slot is empty was
/// lost to a panicked task and reports itself closed.
#[cfg(any(feature = "oracle", feature = "firebird"))]
async fn with_blocking<C, R, F>(slot: &mut Option<C>, call: F) -> Result<R>
where
    C: Send + 'static,
    R: Send + 'static,
    F: FnOnce(&mut C) -> Result<R> + Send + 'static,
{
    let mut conn = slot
        .take()
        .ok_or_else(|| crate::error::DbWatchError::connection_failed("session is closed"))?;

    let (conn, result) = tokio::task::spawn_blocking(move || {
        let result = call(&mut conn);
        (conn, result)
    })
    .await
    .map_err(|e| {
        crate::error::DbWatchError::connection_failed(format!("driver task failed: {}", e))
    })?;

    *slot = Some(conn);
    result
}
