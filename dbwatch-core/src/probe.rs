//! One read-only probe: negotiate, query the firm table, release.

use crate::adapters::{DatabaseConnector, create_connector};
use crate::connection::ConnectionString;
use crate::error::DbWatchError;
use crate::models::{BackendKind, ProbeResult, RowId};
use crate::negotiator::{AuthNegotiator, TrustBlockDetector};
use crate::Result;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// Fixed existence query.
pub const PROBE_QUERY: &str = "SELECT ID FROM FIRM";

/// Identifier column read from every row.
pub const PROBE_COLUMN: &str = "ID";

/// Runs probe cycles against one backend.
///
/// Each call opens exactly one connection and closes it before returning,
/// whatever the outcome. The query itself is never retried; only connection
/// establishment goes through the negotiator's strategy loop.
pub struct ProbeRunner {
    connector: Box<dyn DatabaseConnector>,
    trust: TrustBlockDetector,
}

impl ProbeRunner {
    pub fn new(connector: Box<dyn DatabaseConnector>, trust: TrustBlockDetector) -> Self {
        Self { connector, trust }
    }

    /// Runner using the compiled-in driver for `backend`.
    ///
    /// # Errors
    /// Returns `UnsupportedFeature` if the driver is not compiled in
    pub fn for_backend(backend: BackendKind, trust: TrustBlockDetector) -> Result<Self> {
        Ok(Self::new(create_connector(backend)?, trust))
    }

    pub fn backend(&self) -> BackendKind {
        self.connector.backend()
    }

    /// Runs one probe and converts every failure into a failed result.
    ///
    /// A failed result never carries rows.
    pub async fn run(
        &self,
        connection_string: &ConnectionString,
        backend: BackendKind,
        cancel: &CancellationToken,
    ) -> ProbeResult {
        let timestamp = Utc::now();

        match self.execute(connection_string, backend, cancel).await {
            Ok((rows, strategy)) => {
                tracing::info!(
                    backend = %backend,
                    strategy = %strategy,
                    rows = rows.len(),
                    "Probe succeeded"
                );
                ProbeResult::success(timestamp, rows, Some(strategy))
            }
            Err(error) => {
                if error.requires_operator() {
                    tracing::error!(backend = %backend, error = %error, "Probe failed");
                } else {
                    tracing::warn!(backend = %backend, error = %error, "Probe failed");
                }
                ProbeResult::failure(timestamp, &error)
            }
        }
    }

    async fn execute(
        &self,
        connection_string: &ConnectionString,
        backend: BackendKind,
        cancel: &CancellationToken,
    ) -> Result<(Vec<RowId>, String)> {
        if backend != self.connector.backend() {
            return Err(DbWatchError::configuration(format!(
                "probe for {} handed to the {} driver",
                backend,
                self.connector.backend()
            )));
        }

        let negotiated = AuthNegotiator::new(self.connector.as_ref(), self.trust.clone())
            .negotiate(connection_string, cancel)
            .await?;
        let strategy = negotiated.strategy().to_string();
        let mut session = negotiated.into_session();

        let outcome = session.query_identifiers(PROBE_QUERY, PROBE_COLUMN).await;

        if let Err(error) = session.close().await {
            tracing::warn!(error = %error, "Failed to close probe connection");
        }

        let rows = outcome.map_err(|error| match backend {
            BackendKind::Oracle => self.trust.classify(error),
            BackendKind::Firebird => error,
        })?;

        Ok((rows, strategy))
    }
}
