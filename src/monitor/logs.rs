//! Log tail fetching.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

use super::{refresh_loop, RefreshTrigger};
use crate::api::{EngineApi, LogLine, RunInfo};
use crate::orchestrator::job::PollTask;
use crate::utils::error::Result;

pub const DEFAULT_LOG_LINES: usize = 200;

/// Which log the tail is read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum LogSource {
    #[default]
    Pipeline,
    Server,
    Decisions,
    /// A historical run directory by name
    Run(String),
}

impl LogSource {
    pub fn as_query(&self) -> &str {
        match self {
            | LogSource::Pipeline => "pipeline",
            | LogSource::Server => "server",
            | LogSource::Decisions => "decisions",
            | LogSource::Run(name) => name,
        }
    }
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

impl FromStr for LogSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim() {
            | "" | "pipeline" => LogSource::Pipeline,
            | "server" => LogSource::Server,
            | "decisions" => LogSource::Decisions,
            | run => LogSource::Run(run.to_string()),
        })
    }
}

/// Latest successfully fetched lines and where they came from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogTail {
    pub source: LogSource,
    pub lines: Vec<LogLine>,
    pub fetched_at: Option<DateTime<Utc>>,
}

pub struct LogFetcher {
    api: Arc<dyn EngineApi>,
    max_lines: usize,
    source: RwLock<LogSource>,
    slot: watch::Sender<LogTail>,
}

impl LogFetcher {
    pub fn new(api: Arc<dyn EngineApi>, max_lines: usize) -> Self {
        let (slot, _rx) = watch::channel(LogTail::default());
        Self { api, max_lines, source: RwLock::new(LogSource::default()), slot }
    }

    pub fn subscribe(&self) -> watch::Receiver<LogTail> {
        self.slot.subscribe()
    }

    pub fn tail(&self) -> LogTail {
        self.slot.borrow().clone()
    }

    pub fn source(&self) -> LogSource {
        self.source.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn set_source(&self, source: LogSource) {
        if let Ok(mut current) = self.source.write() {
            *current = source;
        }
    }

    /// Fetch the tail of `source` without touching the slot.
    pub async fn fetch_tail(&self, source: &LogSource, max_lines: usize) -> Result<Vec<LogLine>> {
        self.api.logs(source.as_query(), max_lines).await
    }

    /// Refresh the slot from the current source. Failures keep the previous lines.
    pub async fn refresh(&self) -> bool {
        let source = self.source();
        match self.fetch_tail(&source, self.max_lines).await {
            | Ok(lines) => {
                self.slot.send_replace(LogTail { source, lines, fetched_at: Some(Utc::now()) });
                true
            }
            | Err(e) => {
                debug!(%source, error = %e, "Log fetch failed; keeping previous lines");
                false
            }
        }
    }

    pub async fn list_runs(&self) -> Result<Vec<RunInfo>> {
        self.api.log_runs().await
    }
}

/// Log poll loop bound to a fetcher.
pub struct LogMonitor {
    fetcher: Arc<LogFetcher>,
    trigger: RefreshTrigger,
    task: PollTask,
}

impl LogMonitor {
    pub fn spawn(fetcher: Arc<LogFetcher>, period: Duration) -> Self {
        let trigger = RefreshTrigger::new();
        let loop_trigger = trigger.clone();
        let polled = fetcher.clone();
        let task = PollTask::spawn(move |token| {
            refresh_loop(period, loop_trigger, token, move || {
                let polled = polled.clone();
                async move {
                    polled.refresh().await;
                }
            })
        });
        Self { fetcher, trigger, task }
    }

    /// Switch source and fetch right away.
    pub fn switch_source(&self, source: LogSource) {
        self.fetcher.set_source(source);
        self.trigger.fire();
    }

    pub fn trigger(&self) -> RefreshTrigger {
        self.trigger.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LogTail> {
        self.fetcher.subscribe()
    }

    pub fn stop(&self) {
        self.task.cancel();
    }
}
