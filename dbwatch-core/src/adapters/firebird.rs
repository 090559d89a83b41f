//! Firebird driver over the pure-Rust `rsfbclient` wire client.
//!
//! The wire client negotiates the Srp family on its own and exposes no way to
//! pin a plugin. Attempts pinned to `Srp256` or `Srp` and the unpinned default
//! therefore open the same connection; only the plugin check differs. A
//! request pinned to a plugin outside that family (`Legacy_Auth`) fails the
//! same way a server without that plugin would.

use super::{DatabaseConnector, DatabaseSession, required, with_blocking};
use crate::connection::{AUTH_PLUGIN_PARAM, ConnectionString};
use crate::error::DbWatchError;
use crate::models::{BackendKind, FIREBIRD_DEFAULT_PORT, RowId};
use crate::Result;
use async_trait::async_trait;
use rsfbclient::prelude::*;
use rsfbclient::{Connection, Dialect, RustFbClient, charset};
use zeroize::Zeroizing;

/// Plugins the wire client can offer. It picks between them itself.
const SUPPORTED_PLUGINS: &[&str] = &["Srp256", "Srp"];

/// Rejects a pinned plugin the wire client cannot offer.
fn ensure_supported_plugin(connection_string: &ConnectionString) -> Result<()> {
    match connection_string.get(AUTH_PLUGIN_PARAM) {
        Some(plugin) if !SUPPORTED_PLUGINS.iter().any(|p| p.eq_ignore_ascii_case(plugin)) => {
            Err(DbWatchError::connection_failed(format!(
                "Not supported plugin: {}",
                plugin
            )))
        }
        _ => Ok(()),
    }
}

/// Connector for `User=..;Password=..;Database=host:path;Port=..;` strings.
#[derive(Debug, Default)]
pub struct FirebirdConnector;

impl FirebirdConnector {
    pub const fn new() -> Self {
        Self
    }
}

/// Connection parameters extracted from a rendered string.
struct FirebirdTarget {
    host: String,
    port: u16,
    path: String,
    user: String,
    password: Zeroizing<String>,
}

impl FirebirdTarget {
    fn from_connection_string(connection_string: &ConnectionString) -> Result<Self> {
        let database = required(connection_string, "Database")?;
        let (host, path) = database.split_once(':').ok_or_else(|| {
            DbWatchError::configuration("Firebird database must have the form server:path")
        })?;

        let port = match connection_string.get("Port") {
            Some(port) => port.parse::<u16>().map_err(|_| {
                DbWatchError::configuration(format!("Invalid Firebird port '{}'", port))
            })?,
            None => FIREBIRD_DEFAULT_PORT,
        };

        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
            user: required(connection_string, "User")?.to_string(),
            password: Zeroizing::new(required(connection_string, "Password")?.to_string()),
        })
    }
}

#[async_trait]
impl DatabaseConnector for FirebirdConnector {
    async fn open(&self, connection_string: &ConnectionString) -> Result<Box<dyn DatabaseSession>> {
        ensure_supported_plugin(connection_string)?;

        let target = FirebirdTarget::from_connection_string(connection_string)?;
        tracing::debug!(
            host = %target.host,
            port = target.port,
            path = %target.path,
            "Opening Firebird connection"
        );

        let conn = tokio::task::spawn_blocking(move || {
            rsfbclient::builder_pure_rust()
                .host(target.host.as_str())
                .port(target.port)
                .db_name(target.path.as_str())
                .user(target.user.as_str())
                .pass(target.password.as_str())
                .dialect(Dialect::D3)
                .charset(charset::UTF_8)
                .connect()
        })
        .await
        .map_err(|e| DbWatchError::connection_failed(format!("driver task failed: {}", e)))?
        .map_err(|e| DbWatchError::connection_failed(e.to_string()))?;

        Ok(Box::new(FirebirdSession { conn: Some(conn) }))
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Firebird
    }
}

struct FirebirdSession {
    conn: Option<Connection<RustFbClient>>,
}

#[async_trait]
impl DatabaseSession for FirebirdSession {
    async fn ping(&mut self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        with_blocking(&mut self.conn, move |conn| {
            conn.query_first::<(), (i32,)>(&sql, ())
                .map(|_| ())
                .map_err(|e| DbWatchError::connection_failed(e.to_string()))
        })
        .await
    }

    /// Positional: the probe query selects exactly the identifier column.
    async fn query_identifiers(&mut self, sql: &str, column: &str) -> Result<Vec<RowId>> {
        let sql = sql.to_string();
        let column = column.to_string();
        with_blocking(&mut self.conn, move |conn| {
            let rows: Vec<(Option<String>,)> = conn
                .query(&sql, ())
                .map_err(|e| DbWatchError::query_failed(e.to_string()))?;

            Ok(rows
                .into_iter()
                .filter_map(|(value,)| {
                    if value.is_none() {
                        tracing::debug!(column = %column, "Skipping NULL identifier");
                    }
                    value.map(RowId::from_text)
                })
                .collect())
        })
        .await
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || conn.close())
            .await
            .map_err(|e| DbWatchError::connection_failed(format!("driver task failed: {}", e)))?
            .map_err(|e| DbWatchError::connection_failed(e.to_string()))
    }
}
