//! Authentication negotiation: ordered strategies tried until one connects.
//!
//! A Firebird server accepts whichever plugins its `AuthServer` setting
//! lists, and the probe cannot know that list in advance. The negotiator
//! therefore tries Srp256, Srp, Legacy and finally the driver default, in
//! that fixed order, and keeps the first connection that also answers a
//! liveness query. Oracle negotiates natively, so it gets one attempt.
//!
//! Every failure moves on to the next strategy, including failures that
//! look like network problems. An exhausted list is reported as
//! [`DbWatchError::AllAuthMethodsExhausted`] naming every strategy tried.

use crate::adapters::{DatabaseConnector, DatabaseSession};
use crate::connection::{AUTH_PLUGIN_PARAM, ConnectionString};
use crate::error::DbWatchError;
use crate::models::BackendKind;
use crate::Result;
use tokio_util::sync::CancellationToken;

/// Oracle error raised when a logon trigger fails.
pub const TRUST_ERROR_CODE: &str = "ORA-04088";

/// Logon trigger that rejects applications not marked as trusted.
pub const TRUST_TRIGGER: &str = "TSPY_CONN_APW_USER";

/// Application name used in remediation text when the executable name is
/// unavailable.
pub const DEFAULT_APPLICATION_NAME: &str = "KSAOWMONITOR.EXE";

/// One way of presenting credentials to a backend.
///
/// Implementations only rewrite the connection string; the negotiator owns
/// the attempt loop, so new strategies plug in without touching it.
pub trait AuthStrategy: Send + Sync {
    /// Name recorded in logs and in the negotiated session.
    fn name(&self) -> &str;

    /// Produces the connection string for this attempt from the base string.
    fn apply(&self, base: &ConnectionString) -> ConnectionString;
}

/// Firebird authentication plugins in negotiation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirebirdAuthPlugin {
    Srp256,
    Srp,
    Legacy,
    /// No plugin parameter; the driver and server pick
    Default,
}

impl FirebirdAuthPlugin {
    /// Fixed attempt order.
    pub const ORDERED: [Self; 4] = [Self::Srp256, Self::Srp, Self::Legacy, Self::Default];

    /// Value for the `auth_plugin_name` parameter, if any.
    pub const fn parameter(self) -> Option<&'static str> {
        match self {
            Self::Srp256 => Some("Srp256"),
            Self::Srp => Some("Srp"),
            Self::Legacy => Some("Legacy_Auth"),
            Self::Default => None,
        }
    }
}

impl AuthStrategy for FirebirdAuthPlugin {
    fn name(&self) -> &str {
        match self {
            Self::Srp256 => "Srp256",
            Self::Srp => "Srp",
            Self::Legacy => "Legacy",
            Self::Default => "Default",
        }
    }

    /// Replaces any plugin already present. `Default` leaves the base string
    /// as rendered, so a plugin pinned in the configuration still applies.
    fn apply(&self, base: &ConnectionString) -> ConnectionString {
        match self.parameter() {
            Some(plugin) => base.clone().with(AUTH_PLUGIN_PARAM, plugin),
            None => base.clone(),
        }
    }
}

/// Single attempt with the driver's own negotiation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeAuth;

impl AuthStrategy for NativeAuth {
    fn name(&self) -> &str {
        "Native"
    }

    fn apply(&self, base: &ConnectionString) -> ConnectionString {
        base.clone()
    }
}

/// The strategy list for a backend.
pub fn strategies_for(backend: BackendKind) -> Vec<Box<dyn AuthStrategy>> {
    match backend {
        BackendKind::Firebird => FirebirdAuthPlugin::ORDERED
            .into_iter()
            .map(|plugin| Box::new(plugin) as Box<dyn AuthStrategy>)
            .collect(),
        BackendKind::Oracle => vec![Box::new(NativeAuth)],
    }
}

/// True for driver messages about plugin or credential negotiation.
pub fn is_auth_negotiation_error(message: &str) -> bool {
    message.contains("Not supported plugin") || message.to_ascii_lowercase().contains("authentication")
}

/// Recognises the Oracle trust trigger and builds its remediation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustBlockDetector {
    application: String,
}

impl Default for TrustBlockDetector {
    fn default() -> Self {
        Self::for_current_exe()
    }
}

impl TrustBlockDetector {
    /// Detector for a named application, compared upper-case by the trigger.
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            application: application.into().to_uppercase(),
        }
    }

    /// Detector for the running executable's file name.
    pub fn for_current_exe() -> Self {
        let name = std::env::current_exe()
            .ok()
            .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_APPLICATION_NAME.to_string());
        Self::new(name)
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    /// True when a driver message is the trust trigger rejecting a logon.
    pub fn matches(message: &str) -> bool {
        message.contains(TRUST_ERROR_CODE) && message.contains(TRUST_TRIGGER)
    }

    /// Administrative SQL that marks the application as trusted.
    pub fn remediation(&self) -> String {
        format!(
            "UPDATE apw_user.aapp SET trust=1 WHERE UPPER(nazwa) LIKE '%{}%'; COMMIT;",
            self.application
        )
    }

    /// Reclassifies a trust-trigger failure; any other error is returned as is.
    ///
    /// A match is logged at ERROR with the fix, since only an administrator
    /// can resolve it.
    pub fn classify(&self, error: DbWatchError) -> DbWatchError {
        let details = match &error {
            DbWatchError::Connection { context } | DbWatchError::QueryExecution { context }
                if Self::matches(context) =>
            {
                context.clone()
            }
            _ => return error,
        };

        let remediation = self.remediation();
        tracing::error!(
            trigger = TRUST_TRIGGER,
            application = %self.application,
            "Oracle trigger {} blocks application {}",
            TRUST_TRIGGER,
            self.application
        );
        tracing::error!("Remediation: connect with SQL*Plus as a database administrator");
        tracing::error!("Remediation: run {}", remediation);
        tracing::error!("Remediation: restart dbwatch");
        tracing::error!(details = %details, "Oracle error details");

        DbWatchError::ApplicationTrustBlocked {
            trigger: TRUST_TRIGGER.to_string(),
            remediation,
            details,
        }
    }
}

/// A live, validated session and how it was obtained.
pub struct NegotiatedSession {
    session: Box<dyn DatabaseSession>,
    strategy: String,
    failed: Vec<String>,
}

impl std::fmt::Debug for NegotiatedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NegotiatedSession")
            .field("strategy", &self.strategy)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl NegotiatedSession {
    /// Name of the strategy that connected.
    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    /// Strategies that failed before the successful one, in order.
    pub fn failed_strategies(&self) -> &[String] {
        &self.failed
    }

    pub fn into_session(self) -> Box<dyn DatabaseSession> {
        self.session
    }
}

/// Drives connection attempts through an ordered strategy list.
pub struct AuthNegotiator<'a> {
    connector: &'a dyn DatabaseConnector,
    strategies: Vec<Box<dyn AuthStrategy>>,
    trust: TrustBlockDetector,
}

impl<'a> AuthNegotiator<'a> {
    /// Negotiator with the standard strategies for the connector's backend.
    pub fn new(connector: &'a dyn DatabaseConnector, trust: TrustBlockDetector) -> Self {
        Self {
            connector,
            strategies: strategies_for(connector.backend()),
            trust,
        }
    }

    /// Negotiator with a caller-supplied strategy list.
    pub fn with_strategies(
        connector: &'a dyn DatabaseConnector,
        strategies: Vec<Box<dyn AuthStrategy>>,
        trust: TrustBlockDetector,
    ) -> Self {
        Self {
            connector,
            strategies,
            trust,
        }
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Opens and validates a session.
    ///
    /// # Errors
    /// - `Cancelled` if the token fires before an attempt starts
    /// - `AllAuthMethodsExhausted` when every Firebird strategy failed
    /// - `ApplicationTrustBlocked` when the Oracle trust trigger refused the logon
    /// - the driver's error for any other failed Oracle attempt
    pub async fn negotiate(
        &self,
        base: &ConnectionString,
        cancel: &CancellationToken,
    ) -> Result<NegotiatedSession> {
        let backend = self.connector.backend();
        let mut failed: Vec<String> = Vec::with_capacity(self.strategies.len());
        let mut last_error = None;

        for strategy in &self.strategies {
            if cancel.is_cancelled() {
                tracing::info!(backend = %backend, "Negotiation cancelled");
                return Err(DbWatchError::Cancelled);
            }

            let candidate = strategy.apply(base);
            tracing::info!(
                backend = %backend,
                strategy = strategy.name(),
                "Trying to connect with auth method {}",
                strategy.name()
            );
            tracing::trace!(connection = %candidate.redacted(), "Connection parameters");

            match self.attempt(backend, &candidate).await {
                Ok(session) => {
                    tracing::info!(
                        backend = %backend,
                        strategy = strategy.name(),
                        failed_attempts = failed.len(),
                        "Connected using auth method {}",
                        strategy.name()
                    );
                    return Ok(NegotiatedSession {
                        session,
                        strategy: strategy.name().to_string(),
                        failed,
                    });
                }
                Err(error) => {
                    if backend == BackendKind::Oracle {
                        let error = self.trust.classify(error);
                        if matches!(error, DbWatchError::ApplicationTrustBlocked { .. }) {
                            return Err(error);
                        }
                        last_error = Some(error);
                    } else {
                        let message = error.to_string();
                        if is_auth_negotiation_error(&message) {
                            tracing::debug!(
                                strategy = strategy.name(),
                                error = %message,
                                "Auth method rejected, trying next"
                            );
                        } else {
                            tracing::warn!(
                                strategy = strategy.name(),
                                error = %message,
                                "Connection attempt failed, trying next"
                            );
                        }
                        last_error = Some(error);
                    }
                    failed.push(strategy.name().to_string());
                }
            }
        }

        match backend {
            BackendKind::Firebird => Err(DbWatchError::AllAuthMethodsExhausted { attempted: failed }),
            BackendKind::Oracle => Err(last_error.unwrap_or_else(|| {
                DbWatchError::connection_failed("no authentication strategy configured")
            })),
        }
    }

    /// Opens a session and runs the liveness query on it.
    async fn attempt(
        &self,
        backend: BackendKind,
        candidate: &ConnectionString,
    ) -> Result<Box<dyn DatabaseSession>> {
        let mut session = self.connector.open(candidate).await?;
        if let Err(error) = session.ping(backend.liveness_query()).await {
            if let Err(close_error) = session.close().await {
                tracing::debug!(error = %close_error, "Failed to close rejected session");
            }
            return Err(error);
        }
        Ok(session)
    }
}
