//! Backtest submission and progress polling.
//!
//! ```text
//! Idle -> Submitting -> Polling -> Completed | Failed
//!            |
//!            +-> Idle (submission error)
//! ```
//!
//! The poll loop reads progress once immediately and then on every tick.
//! Transport and remote errors while polling are logged and retried on the
//! next tick; only `completed` with a result or `error` end the job.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::job::{poll_ticker, unless_cancelled, Job, JobStatus, PollTask};
use crate::api::{BacktestProgress, BacktestRequest, BacktestResult, EngineApi};
use crate::config::BacktestDefaults;
use crate::graph::{normalize, StrategyGraph};
use crate::utils::error::{Error, Result};

pub const DEFAULT_FAILURE_MESSAGE: &str = "Backtest failed";
pub const FEE_BPS: f64 = 0.0;
pub const BAR_INTERVAL: &str = "1d";

/// Phases the engine walks through, in order.
pub const PHASES: [BacktestPhase; 7] = [
    BacktestPhase::Converting,
    BacktestPhase::Downloading,
    BacktestPhase::Processing,
    BacktestPhase::Indicators,
    BacktestPhase::Risk,
    BacktestPhase::Backtesting,
    BacktestPhase::Results,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BacktestPhase {
    Converting,
    Downloading,
    Processing,
    Indicators,
    Risk,
    Backtesting,
    Results,
}

impl BacktestPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            | BacktestPhase::Converting => "converting",
            | BacktestPhase::Downloading => "downloading",
            | BacktestPhase::Processing => "processing",
            | BacktestPhase::Indicators => "indicators",
            | BacktestPhase::Risk => "risk",
            | BacktestPhase::Backtesting => "backtesting",
            | BacktestPhase::Results => "results",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        PHASES.iter().copied().find(|p| p.as_str() == raw)
    }

    fn index(&self) -> usize {
        PHASES.iter().position(|p| p == self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    Done,
    Current,
    Pending,
}

/// Where `phase` stands relative to the phase the engine reported.
pub fn phase_state(phase: BacktestPhase, reported: Option<&str>) -> PhaseState {
    let Some(reported) = reported else {
        return PhaseState::Pending;
    };
    if reported == "completed" {
        return PhaseState::Done;
    }
    match BacktestPhase::parse(reported) {
        | Some(current) if phase.index() < current.index() => PhaseState::Done,
        | Some(current) if phase == current => PhaseState::Current,
        | _ => PhaseState::Pending,
    }
}

/// Split a comma-separated symbol list: trimmed, uppercased, empties dropped.
pub fn parse_symbols(text: &str) -> Vec<String> {
    text.split(',').map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty()).collect()
}

/// Backtest form as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktestForm {
    pub symbols: String,
    pub years: String,
    pub starting_cash: String,
    pub slippage_bps: String,
}

impl BacktestForm {
    pub fn from_defaults(defaults: &BacktestDefaults) -> Self {
        Self {
            symbols: defaults.symbols.clone(),
            years: defaults.years.to_string(),
            starting_cash: defaults.starting_cash.to_string(),
            slippage_bps: defaults.slippage_bps.to_string(),
        }
    }

    /// Coerce the form fields; nothing is sent when this fails.
    pub fn parse(&self) -> Result<BacktestParams> {
        let symbols = parse_symbols(&self.symbols);
        if symbols.is_empty() {
            return Err(Error::Validation("Enter at least one symbol".to_string()));
        }
        let years = self
            .years
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|y| *y > 0)
            .ok_or_else(|| Error::Validation(format!("Years must be a positive whole number, got '{}'", self.years)))?;
        let starting_cash = parse_number("Starting cash", &self.starting_cash)?;
        let slippage_bps = parse_number("Slippage (bps)", &self.slippage_bps)?;
        Ok(BacktestParams { symbols, years, starting_cash, slippage_bps })
    }
}

fn parse_number(label: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::Validation(format!("{label} must be a number, got '{raw}'")))
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestParams {
    pub symbols: Vec<String>,
    pub years: u32,
    pub starting_cash: f64,
    pub slippage_bps: f64,
}

/// Submission body for the current graph.
pub fn build_request(graph: &StrategyGraph, params: BacktestParams) -> BacktestRequest {
    BacktestRequest {
        strategy: normalize(&graph.nodes, &graph.edges, graph.display_name(), None),
        symbols: params.symbols,
        years: params.years,
        starting_cash: params.starting_cash,
        slippage_bps: params.slippage_bps,
        fee_bps: FEE_BPS,
        interval: BAR_INTERVAL.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum BacktestState {
    #[default]
    Idle,
    Submitting,
    Polling(Job<BacktestResult>),
    Completed(Job<BacktestResult>),
    Failed { job_id: String, message: String },
}

impl BacktestState {
    pub fn is_active(&self) -> bool {
        matches!(self, BacktestState::Submitting | BacktestState::Polling(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BacktestState::Completed(_) | BacktestState::Failed { .. })
    }

    pub fn job(&self) -> Option<&Job<BacktestResult>> {
        match self {
            | BacktestState::Polling(job) | BacktestState::Completed(job) => Some(job),
            | _ => None,
        }
    }
}

/// Fold one progress response into the job and say whether polling goes on.
pub fn apply_progress(job: &mut Job<BacktestResult>, progress: BacktestProgress) -> JobStatus {
    job.record(progress.phase, progress.progress, progress.message, progress.elapsed);

    match progress.status.as_str() {
        | "completed" => match progress.result {
            | Some(result) => {
                job.result = Some(result);
                job.progress = 100;
                job.status = JobStatus::Completed;
            }
            | None => {
                debug!(job_id = %job.id, "Completed without result; still polling");
                job.status = JobStatus::Polling;
            }
        },
        | "error" => job.status = JobStatus::Failed,
        | _ => job.status = JobStatus::Polling,
    }
    job.status
}

/// Owns the backtest slot of a session.
pub struct BacktestRunner {
    api: Arc<dyn EngineApi>,
    interval: Duration,
    state: Arc<watch::Sender<BacktestState>>,
    task: Option<PollTask>,
}

impl BacktestRunner {
    pub fn new(api: Arc<dyn EngineApi>, interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(BacktestState::Idle);
        Self { api, interval, state: Arc::new(tx), task: None }
    }

    pub fn subscribe(&self) -> watch::Receiver<BacktestState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> BacktestState {
        self.state.borrow().clone()
    }

    /// Submit and start polling. Returns the job id.
    #[instrument(skip(self, request), fields(symbols = ?request.symbols))]
    pub async fn run(&mut self, request: BacktestRequest) -> Result<String> {
        if self.is_polling() && self.state.borrow().is_active() {
            return Err(Error::Validation("A backtest is already running".to_string()));
        }
        self.cancel();
        self.state.send_replace(BacktestState::Submitting);

        let job_id = match self.api.submit_backtest(&request).await {
            | Ok(id) => id,
            | Err(e) => {
                warn!(error = %e, "Backtest submission failed");
                self.state.send_replace(BacktestState::Idle);
                return Err(e);
            }
        };
        info!(%job_id, "Backtest submitted");

        let mut job = Job::submitted(job_id.clone());
        job.status = JobStatus::Polling;
        self.state.send_replace(BacktestState::Polling(job.clone()));

        let api = self.api.clone();
        let state = self.state.clone();
        let interval = self.interval;
        self.task = Some(PollTask::spawn(move |token| poll_loop(api, job, interval, state, token)));
        Ok(job_id)
    }

    fn is_polling(&self) -> bool {
        self.task.as_ref().map_or(false, |t| !t.is_cancelled() && !t.is_finished())
    }

    /// Stop polling. An active job goes back to `Idle`; a finished one is kept.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
            self.state.send_if_modified(|slot| {
                if !slot.is_active() {
                    return false;
                }
                *slot = BacktestState::Idle;
                true
            });
        }
    }

    /// Wait until the job completes, fails or is cancelled.
    pub async fn wait(&self) -> BacktestState {
        let mut rx = self.subscribe();
        let state = match rx.wait_for(|s| s.is_terminal() || *s == BacktestState::Idle).await {
            | Ok(state) => state.clone(),
            | Err(_) => self.state(),
        };
        state
    }
}

impl Drop for BacktestRunner {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn poll_loop(
    api: Arc<dyn EngineApi>,
    mut job: Job<BacktestResult>,
    interval: Duration,
    state: Arc<watch::Sender<BacktestState>>,
    token: CancellationToken,
) {
    let mut ticker = poll_ticker(interval);
    loop {
        if unless_cancelled(&token, ticker.tick()).await.is_none() {
            return;
        }
        let Some(response) = unless_cancelled(&token, api.backtest_progress(&job.id)).await else {
            debug!(job_id = %job.id, "Poll cancelled; dropping in-flight response");
            return;
        };

        let progress = match response {
            | Ok(p) => p,
            | Err(e) if e.is_transient() => {
                debug!(job_id = %job.id, error = %e, "Transient poll failure");
                continue;
            }
            | Err(e) => {
                warn!(job_id = %job.id, error = %e, "Progress poll failed; retrying next tick");
                continue;
            }
        };

        match apply_progress(&mut job, progress) {
            | JobStatus::Completed => {
                info!(job_id = %job.id, "Backtest completed");
                publish(&state, &token, BacktestState::Completed(job));
                return;
            }
            | JobStatus::Failed => {
                let message = job.message.clone().unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
                warn!(job_id = %job.id, %message, "Backtest failed");
                publish(&state, &token, BacktestState::Failed { job_id: job.id.clone(), message });
                return;
            }
            | _ => publish(&state, &token, BacktestState::Polling(job.clone())),
        }
    }
}

/// Write the slot unless the loop was cancelled. The check runs under the slot lock.
fn publish(state: &watch::Sender<BacktestState>, token: &CancellationToken, next: BacktestState) {
    state.send_if_modified(|slot| {
        if token.is_cancelled() {
            return false;
        }
        *slot = next;
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockEngineApi;
    use crate::graph::{IndicatorInfo, Side};
    use assert_matches::assert_matches;
    use rstest::rstest;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn progress(status: &str) -> BacktestProgress {
        BacktestProgress { status: status.to_string(), ..Default::default() }
    }

    fn scripted(responses: Vec<Result<BacktestProgress>>) -> MockEngineApi {
        let queue = Mutex::new(VecDeque::from(responses));
        let mut api = MockEngineApi::new();
        api.expect_submit_backtest().returning(|_| Ok("job-1".to_string()));
        api.expect_backtest_progress().returning(move |_| {
            queue.lock().unwrap().pop_front().unwrap_or_else(|| Ok(progress("running")))
        });
        api
    }

    fn request() -> BacktestRequest {
        let mut graph = StrategyGraph::new();
        graph.add_indicator(&IndicatorInfo::new("rsi", "RSI", "momentum"));
        graph.add_action(Side::Buy);
        build_request(&graph, BacktestForm::from_defaults(&BacktestDefaults::default()).parse().unwrap())
    }

    #[rstest]
    #[case(" aapl, msft ,,googl ", vec!["AAPL", "MSFT", "GOOGL"])]
    #[case("spy", vec!["SPY"])]
    #[case(" , ", vec![])]
    fn symbols_are_split_and_uppercased(#[case] text: &str, #[case] expected: Vec<&str>) {
        assert_eq!(parse_symbols(text), expected);
    }

    #[test]
    fn form_rejects_bad_numbers() {
        let mut form = BacktestForm::from_defaults(&BacktestDefaults::default());
        form.years = "two".into();
        assert_matches!(form.parse(), Err(Error::Validation(_)));

        let mut form = BacktestForm::from_defaults(&BacktestDefaults::default());
        form.starting_cash = "lots".into();
        assert_matches!(form.parse(), Err(Error::Validation(msg)) if msg.contains("Starting cash"));

        let mut form = BacktestForm::from_defaults(&BacktestDefaults::default());
        form.symbols = ",".into();
        assert_matches!(form.parse(), Err(Error::Validation(_)));
    }

    #[test]
    fn request_carries_fixed_fee_and_interval() {
        let req = request();
        assert_eq!(req.fee_bps, 0.0);
        assert_eq!(req.interval, "1d");
        assert_eq!(req.years, 2);
        assert_eq!(req.symbols, vec!["AAPL"]);
        assert_eq!(req.strategy.name, "My Strategy");
        assert_eq!(req.strategy.target_platform, None);
    }

    #[test]
    fn completed_without_result_keeps_polling() {
        let mut job = Job::submitted("j");
        assert_eq!(apply_progress(&mut job, progress("completed")), JobStatus::Polling);

        let mut done = progress("completed");
        done.result = Some(BacktestResult::default());
        assert_eq!(apply_progress(&mut job, done), JobStatus::Completed);
        assert!(job.result.is_some());
    }

    #[test]
    fn error_status_fails_the_job() {
        let mut job = Job::submitted("j");
        let mut p = progress("error");
        p.message = Some("No data for ZZZZ".into());
        assert_eq!(apply_progress(&mut job, p), JobStatus::Failed);
        assert_eq!(job.message.as_deref(), Some("No data for ZZZZ"));
    }

    #[rstest]
    #[case(BacktestPhase::Converting, Some("indicators"), PhaseState::Done)]
    #[case(BacktestPhase::Indicators, Some("indicators"), PhaseState::Current)]
    #[case(BacktestPhase::Results, Some("indicators"), PhaseState::Pending)]
    #[case(BacktestPhase::Results, Some("completed"), PhaseState::Done)]
    #[case(BacktestPhase::Converting, Some("init"), PhaseState::Pending)]
    #[case(BacktestPhase::Converting, None, PhaseState::Pending)]
    fn phase_states(#[case] phase: BacktestPhase, #[case] reported: Option<&str>, #[case] expected: PhaseState) {
        assert_eq!(phase_state(phase, reported), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_do_not_end_the_job() {
        let transient = || Err(Error::Remote { status: 503, detail: None });
        let mut running = progress("running");
        running.phase = Some("downloading".into());
        let api = scripted(vec![transient(), transient(), transient(), Ok(running)]);

        let mut runner = BacktestRunner::new(Arc::new(api), Duration::from_secs(1));
        let mut rx = runner.subscribe();
        runner.run(request()).await.unwrap();

        let state = rx
            .wait_for(|s| s.job().and_then(|j| j.phase.as_deref()) == Some("downloading"))
            .await
            .unwrap()
            .clone();
        assert_matches!(state, BacktestState::Polling(job) if job.id == "job-1");
    }

    #[tokio::test(start_paused = true)]
    async fn runs_to_completion() {
        let mut done = progress("completed");
        done.result = Some(BacktestResult { total_trades: Some(4), ..Default::default() });
        let api = scripted(vec![Ok(progress("running")), Ok(progress("completed")), Ok(done)]);

        let mut runner = BacktestRunner::new(Arc::new(api), Duration::from_secs(1));
        runner.run(request()).await.unwrap();
        let state = runner.wait().await;
        assert_matches!(state, BacktestState::Completed(job) if job.result.as_ref().and_then(|r| r.total_trades) == Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_uses_default_message() {
        let api = scripted(vec![Ok(progress("error"))]);
        let mut runner = BacktestRunner::new(Arc::new(api), Duration::from_secs(1));
        runner.run(request()).await.unwrap();
        assert_matches!(
            runner.wait().await,
            BacktestState::Failed { message, .. } if message == DEFAULT_FAILURE_MESSAGE
        );
    }

    #[tokio::test]
    async fn submission_error_returns_to_idle() {
        let mut api = MockEngineApi::new();
        api.expect_submit_backtest().returning(|_| Err(Error::MissingJobId(r#"{"status":"queued"}"#.into())));
        let mut runner = BacktestRunner::new(Arc::new(api), Duration::from_secs(1));

        assert_matches!(runner.run(request()).await, Err(Error::MissingJobId(body)) if body.contains("queued"));
        assert_eq!(runner.state(), BacktestState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn second_submission_is_refused_while_polling() {
        let api = scripted(vec![]);
        let mut runner = BacktestRunner::new(Arc::new(api), Duration::from_secs(1));
        runner.run(request()).await.unwrap();
        assert_matches!(runner.run(request()).await, Err(Error::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_further_polls() {
        let mut api = MockEngineApi::new();
        api.expect_submit_backtest().returning(|_| Ok("job-9".to_string()));
        api.expect_backtest_progress().times(1).returning(|_| Ok(progress("running")));

        let mut runner = BacktestRunner::new(Arc::new(api), Duration::from_secs(1));
        runner.run(request()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        runner.cancel();
        assert_eq!(runner.state(), BacktestState::Idle);
        assert_eq!(runner.wait().await, BacktestState::Idle);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runner.state(), BacktestState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn resubmits_after_cancel() {
        let mut api = MockEngineApi::new();
        let mut ids = vec!["job-2".to_string(), "job-1".to_string()];
        api.expect_submit_backtest().times(2).returning(move |_| Ok(ids.pop().unwrap_or_default()));
        api.expect_backtest_progress().returning(|_| Ok(progress("running")));

        let mut runner = BacktestRunner::new(Arc::new(api), Duration::from_secs(1));
        assert_eq!(runner.run(request()).await.unwrap(), "job-1");
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        runner.cancel();

        assert_eq!(runner.run(request()).await.unwrap(), "job-2");
        assert_matches!(runner.state(), BacktestState::Polling(job) if job.id == "job-2");
    }

    #[tokio::test(start_paused = true)]
    async fn finished_job_allows_next_submission() {
        let mut done = progress("completed");
        done.result = Some(BacktestResult::default());
        let api = scripted(vec![Ok(done)]);
        let mut runner = BacktestRunner::new(Arc::new(api), Duration::from_secs(1));
        runner.run(request()).await.unwrap();
        assert_matches!(runner.wait().await, BacktestState::Completed(_));
        runner.cancel();
        assert_matches!(runner.state(), BacktestState::Completed(_));
        assert!(runner.run(request()).await.is_ok());
    }
}
