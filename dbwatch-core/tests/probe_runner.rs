//! Probe cycles against scripted backends.

#![allow(clippy::unwrap_used)]

mod common;

use common::{ScriptedConnector, TRUST_TRIGGER_ERROR, base_firebird_string, base_oracle_string};
use dbwatch_core::{BackendKind, ProbeOutcome, ProbeRunner, RowId, TrustBlockDetector};
use tokio_util::sync::CancellationToken;

fn runner(connector: ScriptedConnector) -> ProbeRunner {
    ProbeRunner::new(Box::new(connector), TrustBlockDetector::new("dbwatch"))
}

#[tokio::test]
async fn test_rows_keep_result_set_order() {
    let rows = vec![RowId::Integer(3), RowId::Integer(1), RowId::from_text("A7")];
    let connector = ScriptedConnector::firebird_accepting_plugin(Some("Srp")).with_rows(rows.clone());
    let log = connector.log();

    let result = runner(connector)
        .run(&base_firebird_string(), BackendKind::Firebird, &CancellationToken::new())
        .await;

    assert_eq!(result.outcome, ProbeOutcome::Success);
    assert_eq!(result.rows, rows);
    assert_eq!(result.error_message, None);
    assert_eq!(result.auth_strategy.as_deref(), Some("Srp"));

    let log = log.lock().unwrap();
    assert_eq!(log.queries, 1);
    assert_eq!(log.closed, 1);
    assert_eq!(log.dropped, log.opened);
}

#[tokio::test]
async fn test_query_failure_closes_connection_and_reports_no_rows() {
    let connector = ScriptedConnector::accepting(BackendKind::Firebird)
        .with_query_error("Dynamic SQL Error: Table unknown FIRM");
    let log = connector.log();

    let result = runner(connector)
        .run(&base_firebird_string(), BackendKind::Firebird, &CancellationToken::new())
        .await;

    assert_eq!(result.outcome, ProbeOutcome::Failure);
    assert!(result.rows.is_empty());
    assert!(result
        .error_message
        .as_deref()
        .unwrap()
        .contains("Table unknown FIRM"));

    let log = log.lock().unwrap();
    assert_eq!(log.queries, 1, "query is never retried");
    assert_eq!(log.closed, 1);
}

#[tokio::test]
async fn test_unreachable_database_yields_empty_failure() {
    let connector = ScriptedConnector::rejecting(BackendKind::Firebird, "connection refused")
        .with_rows(vec![RowId::Integer(1)]);

    let result = runner(connector)
        .run(&base_firebird_string(), BackendKind::Firebird, &CancellationToken::new())
        .await;

    assert!(!result.is_success());
    assert!(result.rows.is_empty());
    assert!(result
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("All authentication methods failed for Firebird connection"));
    assert_eq!(result.auth_strategy, None);
}

#[tokio::test]
async fn test_oracle_trust_trigger_during_query() {
    let connector = ScriptedConnector::accepting(BackendKind::Oracle)
        .with_query_error(TRUST_TRIGGER_ERROR);
    let log = connector.log();

    let result = runner(connector)
        .run(&base_oracle_string(), BackendKind::Oracle, &CancellationToken::new())
        .await;

    assert_eq!(result.outcome, ProbeOutcome::Failure);
    let message = result.error_message.unwrap();
    assert!(message.contains("TSPY_CONN_APW_USER"));
    assert!(message.contains("SET trust=1"));
    assert_eq!(log.lock().unwrap().closed, 1);
}

#[tokio::test]
async fn test_backend_mismatch_is_a_failure() {
    let connector = ScriptedConnector::accepting(BackendKind::Oracle);
    let log = connector.log();

    let result = runner(connector)
        .run(&base_firebird_string(), BackendKind::Firebird, &CancellationToken::new())
        .await;

    assert_eq!(result.outcome, ProbeOutcome::Failure);
    assert_eq!(log.lock().unwrap().opened, 0);
}

#[tokio::test]
async fn test_cancelled_probe_opens_nothing() {
    let connector = ScriptedConnector::accepting(BackendKind::Firebird);
    let log = connector.log();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = runner(connector)
        .run(&base_firebird_string(), BackendKind::Firebird, &cancel)
        .await;

    assert_eq!(result.outcome, ProbeOutcome::Failure);
    assert_eq!(result.error_message.as_deref(), Some("Operation cancelled"));
    assert_eq!(log.lock().unwrap().opened, 0);
}

#[tokio::test]
async fn test_each_run_opens_exactly_one_connection() {
    let connector = ScriptedConnector::accepting(BackendKind::Firebird).with_rows(vec![RowId::Integer(9)]);
    let log = connector.log();
    let runner = runner(connector);

    for _ in 0..3 {
        let result = runner
            .run(&base_firebird_string(), BackendKind::Firebird, &CancellationToken::new())
            .await;
        assert!(result.is_success());
    }

    let log = log.lock().unwrap();
    assert_eq!(log.opened, 3);
    assert_eq!(log.closed, 3);
}
