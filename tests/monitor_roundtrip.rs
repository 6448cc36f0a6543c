//! Integration tests: status and log monitors against a stub engine.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use alphastrat::monitor::{LogFetcher, LogMonitor, LogSource, StatusAggregator, StatusMonitor};
use alphastrat::orchestrator::{ControlAction, ProcessController};
use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use common::{api, fast_polling, serve, WAIT};

fn status_body(gateway: bool, pipeline: bool) -> Value {
    json!({
        "gateway": { "running": gateway, "pid": 3100 },
        "authenticated": gateway,
        "pipeline": { "running": pipeline, "phase": "warmup", "run_dir": "runs/20250102_0930" },
        "decisions": { "total_decisions": 12, "action_signals": 3, "last_timestamp": "2025-01-02T09:45:00" },
        "timestamp": "2025-01-02T09:45:01"
    })
}

#[tokio::test]
async fn failed_status_poll_keeps_previous_snapshot() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = Router::new().route(
        "/api/status",
        get(move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    (StatusCode::OK, Json(status_body(true, true)))
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "detail": "db locked" })))
                }
            }
        }),
    );
    let base = serve(app);

    let aggregator = StatusAggregator::new(api(&base));
    let status = aggregator.poll().await.expect("first poll succeeds");
    assert_eq!(status.decisions.total_count, 12);
    assert_eq!(status.decisions.action_signal_count, 3);
    let before = aggregator.snapshot();

    assert!(aggregator.poll().await.is_none());
    let after = aggregator.snapshot();
    assert_eq!(after, before);
    assert_eq!(after.pipeline_phase().label(), "SNAPSHOT WARMUP");
    assert!(after.controls().stop_pipeline);
    assert!(!after.controls().login);
}

#[tokio::test]
async fn control_action_refreshes_monitors() {
    let status_calls = Arc::new(AtomicUsize::new(0));
    let counter = status_calls.clone();
    async fn logs(Query(q): Query<std::collections::HashMap<String, String>>) -> Json<Value> {
        let source = q.get("source").cloned().unwrap_or_default();
        Json(json!({ "source": source, "lines": [{ "text": format!("{source} tail"), "level": "info" }] }))
    }
    let app = Router::new()
        .route(
            "/api/status",
            get(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    Json(status_body(true, n > 0))
                }
            }),
        )
        .route("/api/logs", get(logs))
        .route("/api/pipeline/start", post(|| async { Json(json!({ "status": "started" })) }));
    let base = serve(app);
    let polling = fast_polling();

    // long period: only the initial poll and explicit triggers fetch
    let period = std::time::Duration::from_secs(3600);
    let status = StatusMonitor::spawn(Arc::new(StatusAggregator::new(api(&base))), period);
    let logs = LogMonitor::spawn(Arc::new(LogFetcher::new(api(&base), polling.log_lines)), period);

    let mut status_rx = status.subscribe();
    tokio::time::timeout(WAIT, status_rx.wait_for(|s| s.status.is_some())).await.unwrap().unwrap();
    assert!(status.snapshot().controls().start_pipeline);

    let mut controller = ProcessController::new(api(&base), &polling)
        .with_refresh(status.trigger())
        .with_refresh(logs.trigger());
    let outcome = controller
        .execute(ControlAction::PipelineStart { config: "momentum".into(), dry_run: true })
        .await
        .unwrap();
    assert!(outcome.ok);
    assert_eq!(outcome.message, "started");

    tokio::time::timeout(WAIT, status_rx.wait_for(|s| s.controls().stop_pipeline)).await.unwrap().unwrap();
    assert!(status_calls.load(Ordering::SeqCst) >= 2);

    let mut logs_rx = logs.subscribe();
    logs.switch_source(LogSource::Decisions);
    tokio::time::timeout(WAIT, logs_rx.wait_for(|t| t.source == LogSource::Decisions)).await.unwrap().unwrap();
    assert_eq!(logs_rx.borrow().lines[0].text, "decisions tail");

    status.stop();
    logs.stop();
}

#[tokio::test]
async fn historical_runs_are_listed() {
    let app = Router::new().route(
        "/api/logs/runs",
        get(|| async {
            Json(json!([
                { "name": "20250102_0930", "has_log": true, "has_decisions": true, "modified": "2025-01-02T10:00:00" },
                { "name": "20250101_0930", "has_log": true, "has_decisions": false }
            ]))
        }),
    );
    let base = serve(app);
    let runs = LogFetcher::new(api(&base), 200).list_runs().await.unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs[0].has_decisions);
    assert_eq!(runs[1].modified, None);
}
