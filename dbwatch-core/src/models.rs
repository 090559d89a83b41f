//! Value types shared by every stage of a probe cycle.

use crate::error::DbWatchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default Firebird listener port.
pub const FIREBIRD_DEFAULT_PORT: u16 = 3050;

/// Supported database engine families.
///
/// The configuration boundary recognizes exactly two case-insensitive
/// tokens: `ORACLE` and `FB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BackendKind {
    Oracle,
    Firebird,
}

impl BackendKind {
    /// Token used in configuration files and report payloads.
    pub const fn token(self) -> &'static str {
        match self {
            Self::Oracle => "ORACLE",
            Self::Firebird => "FB",
        }
    }

    /// Trivial query proving a fresh connection is usable.
    pub const fn liveness_query(self) -> &'static str {
        match self {
            Self::Oracle => "SELECT 1 FROM DUAL",
            Self::Firebird => "SELECT 1 FROM RDB$DATABASE",
        }
    }

    /// Port used when neither the descriptor nor the server carries one.
    pub const fn default_port(self) -> Option<u16> {
        match self {
            Self::Oracle => None,
            Self::Firebird => Some(FIREBIRD_DEFAULT_PORT),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for BackendKind {
    type Err = DbWatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ORACLE" => Ok(Self::Oracle),
            "FB" => Ok(Self::Firebird),
            _ => Err(DbWatchError::unsupported_backend(s.trim())),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = DbWatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BackendKind> for String {
    fn from(kind: BackendKind) -> Self {
        kind.token().to_string()
    }
}

/// One identifier value read from the probe table.
///
/// The probe does not interpret identifiers; numeric values stay numeric so
/// the report carries them the way the database returned them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Integer(i64),
    Text(String),
}

impl RowId {
    /// Builds an identifier from a driver's textual rendering of the value.
    pub fn from_text(value: impl Into<String>) -> Self {
        let value = value.into();
        match value.trim().parse::<i64>() {
            Ok(number) => Self::Integer(number),
            Err(_) => Self::Text(value),
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{}", value),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// Outcome of a single probe cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    Success,
    Failure,
}

/// Result of one monitoring cycle, consumed immediately by the reporter.
///
/// A failed result never carries rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub timestamp: DateTime<Utc>,
    pub outcome: ProbeOutcome,
    pub rows: Vec<RowId>,
    pub error_message: Option<String>,
    /// Authentication strategy that opened the connection, when one did
    pub auth_strategy: Option<String>,
}

impl ProbeResult {
    /// Successful probe with the rows in result-set order.
    pub const fn success(
        timestamp: DateTime<Utc>,
        rows: Vec<RowId>,
        auth_strategy: Option<String>,
    ) -> Self {
        Self {
            timestamp,
            outcome: ProbeOutcome::Success,
            rows,
            error_message: None,
            auth_strategy,
        }
    }

    /// Failed probe carrying the error text.
    pub fn failure(timestamp: DateTime<Utc>, error: &DbWatchError) -> Self {
        Self {
            timestamp,
            outcome: ProbeOutcome::Failure,
            rows: Vec::new(),
            error_message: Some(error.to_string()),
            auth_strategy: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ProbeOutcome::Success
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_tokens_are_case_insensitive() {
        assert_eq!("oracle".parse::<BackendKind>().unwrap(), BackendKind::Oracle);
        assert_eq!("Fb".parse::<BackendKind>().unwrap(), BackendKind::Firebird);
        assert_eq!(" FB ".parse::<BackendKind>().unwrap(), BackendKind::Firebird);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let error = "POSTGRES".parse::<BackendKind>().unwrap_err();
        assert!(matches!(error, DbWatchError::UnsupportedBackend { ref backend } if backend == "POSTGRES"));
        assert!("FIREBIRD".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_backend_serde_uses_tokens() {
        let json = serde_json::to_string(&BackendKind::Firebird).unwrap();
        assert_eq!(json, "\"FB\"");
        let kind: BackendKind = serde_json::from_str("\"oracle\"").unwrap();
        assert_eq!(kind, BackendKind::Oracle);
        assert!(serde_json::from_str::<BackendKind>("\"mysql\"").is_err());
    }

    #[test]
    fn test_row_id_from_text() {
        assert_eq!(RowId::from_text("42"), RowId::Integer(42));
        assert_eq!(RowId::from_text(" 7 "), RowId::Integer(7));
        assert_eq!(RowId::from_text("A-1"), RowId::Text("A-1".to_string()));
    }

    #[test]
    fn test_row_ids_serialize_untagged() {
        let rows = vec![RowId::Integer(1), RowId::Text("X".to_string())];
        assert_eq!(serde_json::to_string(&rows).unwrap(), "[1,\"X\"]");
    }

    #[test]
    fn test_failure_result_has_no_rows() {
        let result = ProbeResult::failure(Utc::now(), &DbWatchError::query_failed("boom"));
        assert!(!result.is_success());
        assert!(result.rows.is_empty());
        assert_eq!(
            result.error_message.as_deref(),
            Some("Query execution failed: boom")
        );
    }
}
