//! Gateway and pipeline process control.
//!
//! Starting the gateway may hand back a launch job that is polled until the
//! gateway is up, the launch script exits, or the engine reports an error.
//! Every other action is a single request. After any action the status and
//! log monitors are refreshed once the engine has had a moment to settle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::job::{poll_ticker, unless_cancelled, PollTask};
use crate::api::{ControlResponse, EngineApi, GatewayJobStatus, PipelineStartRequest};
use crate::config::PollingConfig;
use crate::monitor::RefreshTrigger;
use crate::utils::error::{Error, Result};

/// Statuses that count as a successful control action.
pub const SUCCESS_STATUSES: [&str; 6] =
    ["started", "stopped", "authenticated", "already_running", "not_running", "launched"];

pub const GATEWAY_START_FAILED: &str = "Gateway start failed";
pub const NO_CONFIG_SELECTED: &str = "Select a config first";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    GatewayStart,
    GatewayStop,
    GatewayLogin,
    PipelineStart { config: String, dry_run: bool },
    PipelineStop,
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            | ControlAction::GatewayStart => "gateway-start",
            | ControlAction::GatewayStop => "gateway-stop",
            | ControlAction::GatewayLogin => "login",
            | ControlAction::PipelineStart { .. } => "pipeline-start",
            | ControlAction::PipelineStop => "pipeline-stop",
        };
        f.write_str(name)
    }
}

/// What the user is told after an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlOutcome {
    pub ok: bool,
    pub message: String,
}

impl ControlOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self { ok: true, message: message.into() }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { ok: false, message: message.into() }
    }
}

/// Judge a control response: success set membership, message or status token.
pub fn control_outcome(resp: &ControlResponse) -> ControlOutcome {
    let ok = SUCCESS_STATUSES.contains(&resp.status.as_str());
    let message = resp.message.clone().filter(|m| !m.is_empty()).unwrap_or_else(|| resp.status.clone());
    ControlOutcome { ok, message }
}

/// How the engine answered a gateway start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayLaunch {
    AlreadyRunning { pid: Option<u32>, message: String },
    Launched { job_id: String },
    Other(ControlOutcome),
}

pub fn classify_launch(resp: &ControlResponse) -> GatewayLaunch {
    match (resp.status.as_str(), resp.job_id.as_deref()) {
        | ("launched", Some(job_id)) if !job_id.is_empty() => GatewayLaunch::Launched { job_id: job_id.to_string() },
        | ("already_running", _) => GatewayLaunch::AlreadyRunning {
            pid: resp.pid,
            message: resp.message.clone().unwrap_or_else(|| "Gateway already running".to_string()),
        },
        | _ => GatewayLaunch::Other(control_outcome(resp)),
    }
}

/// Gateway launch job as last seen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GatewayJobState {
    #[default]
    Idle,
    Starting { job_id: String, message: String },
    Running { pid: Option<u32> },
    /// Launch script finished without the gateway being seen up
    ScriptExited { message: String },
    Failed { message: String },
}

impl GatewayJobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GatewayJobState::Running { .. } | GatewayJobState::ScriptExited { .. } | GatewayJobState::Failed { .. }
        )
    }
}

/// Next state for a launch job given one poll response.
pub fn gateway_transition(job_id: &str, status: &GatewayJobStatus) -> GatewayJobState {
    if status.gateway_running {
        return GatewayJobState::Running { pid: status.gateway_pid };
    }
    match status.status.as_str() {
        | "completed" => GatewayJobState::ScriptExited {
            message: status.message.clone().unwrap_or_else(|| "Script finished".to_string()),
        },
        | "error" => GatewayJobState::Failed {
            message: status.message.clone().unwrap_or_else(|| GATEWAY_START_FAILED.to_string()),
        },
        | _ => GatewayJobState::Starting {
            job_id: job_id.to_string(),
            message: status.message.clone().unwrap_or_else(|| "Starting gateway...".to_string()),
        },
    }
}

#[derive(Debug, Clone)]
struct Cadence {
    poll: Duration,
    refresh_delay: Duration,
    grace: Duration,
}

/// Dispatches control actions and owns the gateway launch poll.
pub struct ProcessController {
    api: Arc<dyn EngineApi>,
    cadence: Cadence,
    gateway: Arc<watch::Sender<GatewayJobState>>,
    task: Option<PollTask>,
    refresh: Vec<RefreshTrigger>,
}

impl ProcessController {
    pub fn new(api: Arc<dyn EngineApi>, polling: &PollingConfig) -> Self {
        let (tx, _rx) = watch::channel(GatewayJobState::Idle);
        Self {
            api,
            cadence: Cadence {
                poll: polling.gateway_job_interval(),
                refresh_delay: polling.refresh_delay(),
                grace: polling.gateway_grace(),
            },
            gateway: Arc::new(tx),
            task: None,
            refresh: Vec::new(),
        }
    }

    /// Monitors to refresh after each action.
    pub fn with_refresh(mut self, trigger: RefreshTrigger) -> Self {
        self.refresh.push(trigger);
        self
    }

    pub fn subscribe_gateway(&self) -> watch::Receiver<GatewayJobState> {
        self.gateway.subscribe()
    }

    pub fn gateway_state(&self) -> GatewayJobState {
        self.gateway.borrow().clone()
    }

    /// Wait for the current launch job to reach a terminal state.
    pub async fn wait_gateway(&self) -> GatewayJobState {
        let mut rx = self.subscribe_gateway();
        let state = match rx.wait_for(|s| s.is_terminal() || *s == GatewayJobState::Idle).await {
            | Ok(state) => state.clone(),
            | Err(_) => self.gateway_state(),
        };
        state
    }

    fn cancel_launch_poll(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
        }
    }

    fn schedule_refresh(&self) {
        for trigger in &self.refresh {
            trigger.fire_after(self.cadence.refresh_delay);
        }
    }

    /// Run `action`. Transport and remote failures come back as `Err`.
    #[instrument(skip(self), fields(action = %action))]
    pub async fn execute(&mut self, action: ControlAction) -> Result<ControlOutcome> {
        let outcome = match action {
            | ControlAction::GatewayStart => return self.start_gateway().await,
            | ControlAction::GatewayStop => {
                self.cancel_launch_poll();
                self.gateway.send_replace(GatewayJobState::Idle);
                control_outcome(&self.api.gateway_stop().await?)
            }
            | ControlAction::GatewayLogin => control_outcome(&self.api.gateway_login().await?),
            | ControlAction::PipelineStart { config, dry_run } => {
                if config.trim().is_empty() {
                    return Err(Error::Validation(NO_CONFIG_SELECTED.to_string()));
                }
                let request = PipelineStartRequest { config, dry_run };
                control_outcome(&self.api.pipeline_start(&request).await?)
            }
            | ControlAction::PipelineStop => control_outcome(&self.api.pipeline_stop().await?),
        };
        info!(ok = outcome.ok, message = %outcome.message, "Control action finished");
        self.schedule_refresh();
        Ok(outcome)
    }

    async fn start_gateway(&mut self) -> Result<ControlOutcome> {
        let resp = self.api.gateway_start().await?;
        match classify_launch(&resp) {
            | GatewayLaunch::AlreadyRunning { pid, message } => {
                info!(?pid, "Gateway already running");
                self.gateway.send_replace(GatewayJobState::Running { pid });
                Ok(ControlOutcome::success(message))
            }
            | GatewayLaunch::Launched { job_id } => {
                info!(%job_id, "Gateway launch initiated");
                self.cancel_launch_poll();
                self.gateway.send_replace(GatewayJobState::Starting {
                    job_id: job_id.clone(),
                    message: "Starting gateway...".to_string(),
                });
                let api = self.api.clone();
                let slot = self.gateway.clone();
                let cadence = self.cadence.clone();
                let refresh = self.refresh.clone();
                self.task = Some(PollTask::spawn(move |token| {
                    poll_gateway_job(api, job_id, cadence, slot, refresh, token)
                }));
                Ok(ControlOutcome::success("Gateway launch initiated"))
            }
            | GatewayLaunch::Other(outcome) => {
                self.schedule_refresh();
                Ok(outcome)
            }
        }
    }
}

impl Drop for ProcessController {
    fn drop(&mut self) {
        self.cancel_launch_poll();
    }
}

async fn poll_gateway_job(
    api: Arc<dyn EngineApi>,
    job_id: String,
    cadence: Cadence,
    slot: Arc<watch::Sender<GatewayJobState>>,
    refresh: Vec<RefreshTrigger>,
    token: CancellationToken,
) {
    let mut ticker = poll_ticker(cadence.poll);
    // setInterval semantics: the first read happens one period after launch
    ticker.tick().await;
    loop {
        if unless_cancelled(&token, ticker.tick()).await.is_none() {
            return;
        }
        let Some(response) = unless_cancelled(&token, api.gateway_job(&job_id)).await else {
            return;
        };
        let status = match response {
            | Ok(s) => s,
            | Err(e) if e.is_transient() => {
                debug!(%job_id, error = %e, "Transient gateway job poll failure");
                continue;
            }
            | Err(e) => {
                warn!(%job_id, error = %e, "Gateway job poll failed; retrying next tick");
                continue;
            }
        };

        let next = gateway_transition(&job_id, &status);
        // a stop may have reset the slot while this response was in flight
        let published = slot.send_if_modified(|s| {
            if token.is_cancelled() {
                return false;
            }
            *s = next.clone();
            true
        });
        if !published {
            return;
        }
        match &next {
            | GatewayJobState::Running { pid } => {
                info!(?pid, "Gateway is running");
                refresh.iter().for_each(RefreshTrigger::fire);
            }
            | GatewayJobState::ScriptExited { message } => {
                info!(%message, "Gateway launch script exited; re-checking liveness");
                refresh.iter().for_each(|t| t.fire_after(cadence.grace));
            }
            | GatewayJobState::Failed { message } => warn!(%message, "Gateway start failed"),
            | _ => {}
        }
        if next.is_terminal() {
            return;
        }
    }
}
