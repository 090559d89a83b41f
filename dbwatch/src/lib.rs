//! Library module for dbwatch
//!
//! Exposes the monitoring loop and the webhook reporter so both can be
//! exercised without the CLI. The binary entry point is in main.rs.

pub mod monitor;
pub mod reporter;

pub use monitor::{
    CycleReport, FallbackReporter, Monitor, MonitorTarget, PROBE_INTERVAL, REPORT_TIMEOUT,
};
pub use reporter::{
    ExecutionMode, ReportError, ReportPayload, ReportSink, ReportStatus, WebhookReporter,
};
