//! Oracle driver over the `oracle` crate (ODPI-C).
//!
//! Requires Oracle Instant Client at runtime. Every driver call blocks, so
//! it runs on tokio's blocking pool.

use super::{DatabaseConnector, DatabaseSession, required, with_blocking};
use crate::connection::ConnectionString;
use crate::error::DbWatchError;
use crate::models::{BackendKind, RowId};
use crate::Result;
use async_trait::async_trait;
use zeroize::Zeroizing;

/// Connector for `Data Source=host[:port]/service;User Id=..;Password=..;`.
#[derive(Debug, Default)]
pub struct OracleConnector;

impl OracleConnector {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatabaseConnector for OracleConnector {
    async fn open(&self, connection_string: &ConnectionString) -> Result<Box<dyn DatabaseSession>> {
        let data_source = required(connection_string, "Data Source")?.to_string();
        let user = required(connection_string, "User Id")?.to_string();
        let password = Zeroizing::new(required(connection_string, "Password")?.to_string());

        tracing::debug!(data_source = %data_source, "Opening Oracle connection");

        let conn = tokio::task::spawn_blocking(move || {
            ::oracle::Connection::connect(&user, password.as_str(), &data_source)
        })
        .await
        .map_err(|e| DbWatchError::connection_failed(format!("driver task failed: {}", e)))?
        .map_err(|e| DbWatchError::connection_failed(e.to_string()))?;

        Ok(Box::new(OracleSession { conn: Some(conn) }))
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Oracle
    }
}

struct OracleSession {
    conn: Option<::oracle::Connection>,
}

#[async_trait]
impl DatabaseSession for OracleSession {
    async fn ping(&mut self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        with_blocking(&mut self.conn, move |conn| {
            conn.query_row_as::<i64>(&sql, &[])
                .map(|_| ())
                .map_err(|e| DbWatchError::connection_failed(e.to_string()))
        })
        .await
    }

    async fn query_identifiers(&mut self, sql: &str, column: &str) -> Result<Vec<RowId>> {
        let sql = sql.to_string();
        let column = column.to_string();
        with_blocking(&mut self.conn, move |conn| {
            let rows = conn
                .query(&sql, &[])
                .map_err(|e| DbWatchError::query_failed(e.to_string()))?;

            let mut identifiers = Vec::new();
            for row in rows {
                let row = row.map_err(|e| DbWatchError::query_failed(e.to_string()))?;
                let value: Option<String> = row
                    .get(column.as_str())
                    .map_err(|e| DbWatchError::query_failed(e.to_string()))?;
                match value {
                    Some(value) => identifiers.push(RowId::from_text(value)),
                    None => tracing::debug!(column = %column, "Skipping NULL identifier"),
                }
            }
            Ok(identifiers)
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
