//! Service status aggregation.
//!
//! One GET returns gateway liveness, auth state, pipeline state and
//! decision-log stats together. A failed poll leaves the previous snapshot
//! in place.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

use super::{refresh_loop, RefreshTrigger};
use crate::api::{EngineApi, ServiceStatus};
use crate::orchestrator::job::PollTask;

/// Pipeline phase as reported in `pipeline.phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelinePhase {
    Idle,
    Starting,
    Resolving,
    Warmup,
    Fetching,
    Processing,
    Fitting,
    Risk,
    Executing,
    Running,
    Unknown,
}

impl PipelinePhase {
    /// Missing phase reads as idle; unrecognised phases as unknown.
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw.unwrap_or("idle") {
            | "" | "idle" => PipelinePhase::Idle,
            | "starting" => PipelinePhase::Starting,
            | "resolving" => PipelinePhase::Resolving,
            | "warmup" => PipelinePhase::Warmup,
            | "fetching" => PipelinePhase::Fetching,
            | "processing" => PipelinePhase::Processing,
            | "fitting" => PipelinePhase::Fitting,
            | "risk" => PipelinePhase::Risk,
            | "executing" => PipelinePhase::Executing,
            | "running" => PipelinePhase::Running,
            | _ => PipelinePhase::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            | PipelinePhase::Idle => "IDLE",
            | PipelinePhase::Starting => "STARTING",
            | PipelinePhase::Resolving => "RESOLVING CONIDS",
            | PipelinePhase::Warmup => "SNAPSHOT WARMUP",
            | PipelinePhase::Fetching => "FETCHING DATA",
            | PipelinePhase::Processing => "PROCESSING",
            | PipelinePhase::Fitting => "MODEL FITTING",
            | PipelinePhase::Risk => "RISK EVALUATION",
            | PipelinePhase::Executing => "EXECUTING ORDERS",
            | PipelinePhase::Running => "RUNNING",
            | PipelinePhase::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which control actions make sense for the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Controls {
    pub start_gateway: bool,
    pub stop_gateway: bool,
    pub login: bool,
    pub start_pipeline: bool,
    pub stop_pipeline: bool,
}

impl Controls {
    pub fn from_status(status: Option<&ServiceStatus>) -> Self {
        let gateway_up = status.map_or(false, |s| s.gateway.running);
        let authenticated = status.map_or(false, |s| s.authenticated);
        let pipeline_up = status.map_or(false, |s| s.pipeline.running);
        Self {
            start_gateway: !gateway_up,
            stop_gateway: gateway_up,
            login: gateway_up && !authenticated,
            start_pipeline: !pipeline_up,
            stop_pipeline: pipeline_up,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusSnapshot {
    pub status: Option<ServiceStatus>,
    /// Local time of the last successful poll
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    pub fn controls(&self) -> Controls {
        Controls::from_status(self.status.as_ref())
    }

    pub fn pipeline_phase(&self) -> PipelinePhase {
        PipelinePhase::from_raw(self.status.as_ref().and_then(|s| s.pipeline.phase.as_deref()))
    }
}

/// Polls `/api/status` into a watch slot.
pub struct StatusAggregator {
    api: Arc<dyn EngineApi>,
    slot: watch::Sender<StatusSnapshot>,
}

impl StatusAggregator {
    pub fn new(api: Arc<dyn EngineApi>) -> Self {
        let (slot, _rx) = watch::channel(StatusSnapshot::default());
        Self { api, slot }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.slot.subscribe()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.slot.borrow().clone()
    }

    /// Fetch once. `None` on failure, with the previous snapshot kept.
    pub async fn poll(&self) -> Option<ServiceStatus> {
        match self.api.status().await {
            | Ok(status) => {
                self.slot.send_replace(StatusSnapshot { status: Some(status.clone()), updated_at: Some(Utc::now()) });
                Some(status)
            }
            | Err(e) => {
                debug!(error = %e, "Status poll failed; keeping previous snapshot");
                None
            }
        }
    }
}

/// Status poll loop bound to an aggregator.
pub struct StatusMonitor {
    aggregator: Arc<StatusAggregator>,
    trigger: RefreshTrigger,
    task: PollTask,
}

impl StatusMonitor {
    pub fn spawn(aggregator: Arc<StatusAggregator>, period: Duration) -> Self {
        let trigger = RefreshTrigger::new();
        let loop_trigger = trigger.clone();
        let polled = aggregator.clone();
        let task = PollTask::spawn(move |token| {
            refresh_loop(period, loop_trigger, token, move || {
                let polled = polled.clone();
                async move {
                    polled.poll().await;
                }
            })
        });
        Self { aggregator, trigger, task }
    }

    pub fn trigger(&self) -> RefreshTrigger {
        self.trigger.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.aggregator.subscribe()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.aggregator.snapshot()
    }

    pub fn stop(&self) {
        self.task.cancel();
    }
}
