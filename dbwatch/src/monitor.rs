//! The monitoring loop.
//!
//! One sequential actor: load the configuration once, then probe, report and
//! wait until cancelled. Every probe failure becomes a failed report; a
//! report that fails or hangs is logged and the schedule carries on.

use crate::reporter::{ExecutionMode, ReportError, ReportPayload, ReportSink, WebhookReporter};
use anyhow::Context;
use chrono::Utc;
use dbwatch_core::{
    ConfigStore, ConnectionDescriptor, ConnectionString, DbWatchError, ProbeResult, ProbeRunner,
    SecretVault, ServiceConfig, TrustBlockDetector, build_connection_string,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Wait between the end of one cycle and the start of the next.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Upper bound on one report delivery, after which it is abandoned.
pub const REPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// The database being watched and where its reports go.
pub struct MonitorTarget {
    descriptor: ConnectionDescriptor,
    encrypted_password: String,
    vault: SecretVault,
    runner: ProbeRunner,
    sink: Box<dyn ReportSink>,
}

impl MonitorTarget {
    pub fn new(
        descriptor: ConnectionDescriptor,
        encrypted_password: impl Into<String>,
        vault: SecretVault,
        runner: ProbeRunner,
        sink: Box<dyn ReportSink>,
    ) -> Self {
        Self {
            descriptor,
            encrypted_password: encrypted_password.into(),
            vault,
            runner,
            sink,
        }
    }

    /// Builds the target from the configuration file, migrating a plaintext
    /// password on the way.
    ///
    /// # Errors
    /// Returns error if the file is missing or invalid, the backend driver is
    /// not compiled in, or the webhook URL is unusable
    pub async fn from_store(store: &ConfigStore, vault: SecretVault) -> anyhow::Result<Self> {
        let loaded = store
            .load_and_migrate(&vault)
            .await
            .with_context(|| format!("Failed to load {}", store.path().display()))?;

        let runner = ProbeRunner::for_backend(
            loaded.descriptor.backend(),
            TrustBlockDetector::for_current_exe(),
        )?;
        let reporter = WebhookReporter::new(&loaded.config.webhook_url, loaded.config.webhook_method)?;

        Ok(Self::new(
            loaded.descriptor,
            loaded.config.encrypted_password,
            vault,
            runner,
            Box::new(reporter),
        ))
    }

    pub const fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    fn connection_string(&self) -> dbwatch_core::Result<ConnectionString> {
        let credential = self.vault.reveal(&self.encrypted_password)?;
        build_connection_string(&self.descriptor, &credential)
    }
}

/// Where failures go when the configuration could not be turned into a target.
///
/// Built from whatever part of the file is still readable, so an operator
/// sees the start-up failure at the webhook on every cycle.
pub struct FallbackReporter {
    sink: Box<dyn ReportSink>,
    database_type: String,
    reason: String,
}

impl FallbackReporter {
    pub fn new(
        sink: Box<dyn ReportSink>,
        database_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            database_type: database_type.into(),
            reason: reason.into(),
        }
    }

    /// Reporter for the webhook named in a configuration that failed to load.
    ///
    /// Returns `None` if the file cannot be read or its webhook is unusable.
    pub async fn from_store(store: &ConfigStore, reason: impl Into<String>) -> Option<Self> {
        let config = store.load().await.ok()?;
        let reporter = WebhookReporter::new(&config.webhook_url, config.webhook_method).ok()?;
        Some(Self::new(Box::new(reporter), database_type_of(&config), reason))
    }
}

fn database_type_of(config: &ServiceConfig) -> String {
    config
        .descriptor()
        .map(|descriptor| descriptor.backend().token().to_string())
        .ok()
        .or_else(|| {
            config
                .database
                .as_ref()
                .map(|section| section.backend.trim().to_uppercase())
        })
        .filter(|token| !token.is_empty())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

/// What one cycle produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub result: ProbeResult,
    pub payload: ReportPayload,
    /// False if the report failed, timed out or was skipped on shutdown
    pub delivered: bool,
}

/// Runs probe cycles on a fixed schedule.
pub struct Monitor {
    target: Option<MonitorTarget>,
    fallback: Option<FallbackReporter>,
    mode: ExecutionMode,
    interval: Duration,
}

impl Monitor {
    /// A monitor without a target reports a failure every cycle instead of
    /// probing, or only logs one when no fallback reporter is set.
    pub const fn new(target: Option<MonitorTarget>, mode: ExecutionMode) -> Self {
        Self {
            target,
            fallback: None,
            mode,
            interval: PROBE_INTERVAL,
        }
    }

    /// Loads the configuration once.
    ///
    /// `vault` is the opened vault or the error that prevented opening it.
    /// Either failure is logged and leaves the monitor without a target; the
    /// process keeps running so the failure stays visible in the log and, when
    /// the webhook is still readable, at the webhook.
    pub async fn initialize(
        store: &ConfigStore,
        vault: dbwatch_core::Result<SecretVault>,
        mode: ExecutionMode,
    ) -> Self {
        info!(path = %store.path().display(), "Loading configuration");

        let target = match vault {
            Ok(vault) => MonitorTarget::from_store(store, vault).await,
            Err(e) => Err(anyhow::Error::new(e).context("Failed to open credential vault")),
        };

        match target {
            Ok(target) => {
                info!(target_db = %target.descriptor, "Configuration initialized");
                Self::new(Some(target), mode)
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                error!(
                    error = %reason,
                    "Failed to initialize configuration - monitor will continue with limited functionality"
                );
                let monitor = Self::new(None, mode);
                match FallbackReporter::from_store(store, reason).await {
                    Some(fallback) => monitor.with_fallback(fallback),
                    None => monitor,
                }
            }
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: FallbackReporter) -> Self {
        self.fallback = Some(fallback);
        self
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub const fn target(&self) -> Option<&MonitorTarget> {
        self.target.as_ref()
    }

    /// Runs cycles until `cancel` fires.
    ///
    /// Cancellation is observed while waiting and between negotiation
    /// attempts; a query already running is allowed to finish.
    pub async fn run(&self, cancel: &CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Monitor loop started");

        while !cancel.is_cancelled() {
            self.run_cycle(cancel).await;

            info!(next_in_secs = self.interval.as_secs(), "Next check scheduled");
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Monitor loop ended");
    }

    /// Probes once and reports the result.
    ///
    /// Returns `None` when there is neither a target nor a fallback reporter.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Option<CycleReport> {
        let (result, payload, sink) = match (&self.target, &self.fallback) {
            (Some(target), _) => {
                let result = Self::probe(target, cancel).await;
                let payload =
                    ReportPayload::from_probe(&result, target.descriptor.backend(), self.mode);
                (result, payload, target.sink.as_ref())
            }
            (None, Some(fallback)) => {
                error!("Configuration unavailable, reporting failure");
                let result = ProbeResult::failure(
                    Utc::now(),
                    &DbWatchError::configuration(fallback.reason.clone()),
                );
                let payload = ReportPayload::from_result(&result, &fallback.database_type, self.mode);
                (result, payload, fallback.sink.as_ref())
            }
            (None, None) => {
                error!("Configuration unavailable, skipping probe cycle");
                return None;
            }
        };

        let delivered = if cancel.is_cancelled() {
            info!("Shutdown requested, report for interrupted cycle not sent");
            false
        } else {
            self.deliver(sink, &payload).await
        };

        if result.is_success() {
            info!(
                rows = result.rows.len(),
                delivered, "Monitoring check completed successfully"
            );
        } else {
            warn!(
                error = result.error_message.as_deref().unwrap_or_default(),
                delivered, "Monitoring check failed"
            );
        }

        Some(CycleReport {
            result,
            payload,
            delivered,
        })
    }

    async fn probe(target: &MonitorTarget, cancel: &CancellationToken) -> ProbeResult {
        let timestamp = Utc::now();

        let connection_string = match target.connection_string() {
            Ok(connection_string) => connection_string,
            Err(e) => {
                error!(error = %e, "Failed to prepare connection");
                return ProbeResult::failure(timestamp, &e);
            }
        };
        debug!(connection = %connection_string.redacted(), "Prepared connection string");

        target
            .runner
            .run(&connection_string, target.descriptor.backend(), cancel)
            .await
    }

    async fn deliver(&self, sink: &dyn ReportSink, payload: &ReportPayload) -> bool {
        match tokio::time::timeout(REPORT_TIMEOUT, sink.send(payload)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(error = %e, "Failed to send report");
                false
            }
            Err(_) => {
                error!(error = %ReportError::TimedOut(REPORT_TIMEOUT), "Failed to send report");
                false
            }
        }
    }
}
