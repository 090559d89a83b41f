//! Scripted in-memory driver for negotiator and probe tests.

#![allow(dead_code, clippy::unwrap_used)]

use async_trait::async_trait;
use dbwatch_core::connection::AUTH_PLUGIN_PARAM;
use dbwatch_core::{
    BackendKind, ConnectionString, DatabaseConnector, DatabaseSession, DbWatchError, Result, RowId,
};
use std::sync::{Arc, Mutex};

type AcceptFn = dyn Fn(&ConnectionString) -> std::result::Result<(), String> + Send + Sync;

/// What happened to the scripted connections.
#[derive(Debug, Default)]
pub struct DriverLog {
    /// `auth_plugin_name` of every open attempt, in order
    pub attempted_plugins: Vec<Option<String>>,
    pub opened: usize,
    pub pings: usize,
    pub queries: usize,
    pub closed: usize,
    pub dropped: usize,
}

pub struct ScriptedConnector {
    backend: BackendKind,
    accept: Box<AcceptFn>,
    ping_error: Option<String>,
    query: std::result::Result<Vec<RowId>, String>,
    log: Arc<Mutex<DriverLog>>,
}

impl ScriptedConnector {
    /// Accepts every attempt.
    pub fn accepting(backend: BackendKind) -> Self {
        Self::with_accept(backend, |_| Ok(()))
    }

    /// Rejects every attempt with the same driver message.
    pub fn rejecting(backend: BackendKind, message: &str) -> Self {
        let message = message.to_string();
        Self::with_accept(backend, move |_| Err(message.clone()))
    }

    /// Firebird server that only accepts one plugin (`None` = no parameter).
    pub fn firebird_accepting_plugin(plugin: Option<&str>) -> Self {
        let plugin = plugin.map(str::to_string);
        Self::with_accept(BackendKind::Firebird, move |cs| {
            let offered = cs.get(AUTH_PLUGIN_PARAM).map(str::to_string);
            if offered == plugin {
                Ok(())
            } else {
                Err(format!(
                    "Not supported plugin: {}",
                    offered.as_deref().unwrap_or("<default>")
                ))
            }
        })
    }

    pub fn with_accept<F>(backend: BackendKind, accept: F) -> Self
    where
        F: Fn(&ConnectionString) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        Self {
            backend,
            accept: Box::new(accept),
            ping_error: None,
            query: Ok(Vec::new()),
            log: Arc::new(Mutex::new(DriverLog::default())),
        }
    }

    pub fn with_rows(mut self, rows: Vec<RowId>) -> Self {
        self.query = Ok(rows);
        self
    }

    pub fn with_query_error(mut self, message: &str) -> Self {
        self.query = Err(message.to_string());
        self
    }

    pub fn with_ping_error(mut self, message: &str) -> Self {
        self.ping_error = Some(message.to_string());
        self
    }

    pub fn log(&self) -> Arc<Mutex<DriverLog>> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl DatabaseConnector for ScriptedConnector {
    async fn open(&self, connection_string: &ConnectionString) -> Result<Box<dyn DatabaseSession>> {
        {
            let mut log = self.log.lock().unwrap();
            log.attempted_plugins.push(
                connection_string
                    .get(AUTH_PLUGIN_PARAM)
                    .map(str::to_string),
            );
        }

        (self.accept)(connection_string).map_err(DbWatchError::connection_failed)?;

        self.log.lock().unwrap().opened += 1;
        Ok(Box::new(ScriptedSession {
            ping_error: self.ping_error.clone(),
            query: self.query.clone(),
            log: Arc::clone(&self.log),
        }))
    }

    fn backend(&self) -> BackendKind {
        self.backend
    }
}

struct ScriptedSession {
    ping_error: Option<String>,
    query: std::result::Result<Vec<RowId>, String>,
    log: Arc<Mutex<DriverLog>>,
}

#[async_trait]
impl DatabaseSession for ScriptedSession {
    async fn ping(&mut self, _sql: &str) -> Result<()> {
        self.log.lock().unwrap().pings += 1;
        match &self.ping_error {
            Some(message) => Err(DbWatchError::connection_failed(message.clone())),
            None => Ok(()),
        }
    }

    async fn query_identifiers(&mut self, _sql: &str, _column: &str) -> Result<Vec<RowId>> {
        self.log.lock().unwrap().queries += 1;
        self.query.clone().map_err(DbWatchError::query_failed)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.log.lock().unwrap().closed += 1;
        Ok(())
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        if let Ok(mut log) = self.log.lock() {
            log.dropped += 1;
        }
    }
}

/// Oracle error text produced by the trust trigger.
pub const TRUST_TRIGGER_ERROR: &str = "ORA-04088: error during execution of trigger 'APW_USER.TSPY_CONN_APW_USER'\nORA-06512: at line 12";

pub fn base_firebird_string() -> ConnectionString {
    ConnectionString::new()
        .with("User", "apw_user")
        .with("Password", "secret123")
        .with("Database", "fbhost:D:\\KSBAZA\\WAPTEKA.FDB")
        .with("Port", "3050")
        .with("Dialect", "3")
        .with("Charset", "UTF8")
}

pub fn base_oracle_string() -> ConnectionString {
    ConnectionString::new()
        .with("Data Source", "dbhost:1521/ORCL")
        .with("User Id", "apw_user")
        .with("Password", "pw")
}
