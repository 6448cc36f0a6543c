//! Job records and the cancellable poll task that drives them.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Submitted,
    Polling,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A remote job as last reported by its poll loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job<T> {
    pub id: String,
    pub status: JobStatus,
    pub phase: Option<String>,
    /// Percent, 0..=100
    pub progress: u8,
    pub message: Option<String>,
    pub elapsed_seconds: f64,
    pub result: Option<T>,
}

impl<T> Job<T> {
    pub fn submitted(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Submitted,
            phase: None,
            progress: 0,
            message: None,
            elapsed_seconds: 0.0,
            result: None,
        }
    }

    /// Record progress fields from a poll response.
    ///
    /// Absent fields keep their last value, so a sparse response does not blank
    /// the phase or message already shown.
    pub fn record(&mut self, phase: Option<String>, progress: Option<f64>, message: Option<String>, elapsed: Option<f64>) {
        if phase.is_some() {
            self.phase = phase;
        }
        if let Some(p) = progress {
            self.progress = p.clamp(0.0, 100.0).round() as u8;
        }
        if message.is_some() {
            self.message = message;
        }
        if let Some(e) = elapsed {
            self.elapsed_seconds = e.max(0.0);
        }
    }
}

/// Ticker for a poll loop: first tick fires immediately, missed ticks are delayed.
pub fn poll_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// A spawned poll loop plus the token that stops it.
///
/// Dropping the handle cancels the loop.
#[derive(Debug)]
pub struct PollTask {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PollTask {
    /// Spawn `body` with a fresh cancellation token.
    pub fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(body(token.clone()));
        Self { token, handle: Some(handle) }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the loop to exit on its own.
    pub async fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!("poll task panicked: {e}");
            }
        }
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Run `fut` unless `token` fires first.
pub async fn unless_cancelled<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        out = fut => Some(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn record_keeps_absent_fields() {
        let mut job: Job<()> = Job::submitted("j1");
        job.record(Some("downloading".into()), Some(20.0), Some("Fetching AAPL".into()), Some(3.0));
        job.record(None, Some(62.6), None, None);
        assert_eq!(job.progress, 63);
        job.record(None, Some(140.0), None, None);
        assert_eq!(job.phase.as_deref(), Some("downloading"));
        assert_eq!(job.progress, 100);
        assert_eq!(job.message.as_deref(), Some("Fetching AAPL"));
        assert_eq!(job.elapsed_seconds, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_task_stops_ticks() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let task = PollTask::spawn(|token| async move {
            let mut ticker = poll_ticker(Duration::from_secs(1));
            loop {
                if unless_cancelled(&token, ticker.tick()).await.is_none() {
                    return;
                }
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let seen = ticks.load(Ordering::SeqCst);
        assert_eq!(seen, 3);

        drop(task);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_future_yields_none() {
        let token = CancellationToken::new();
        token.cancel();
        let out = unless_cancelled(&token, async { 7 }).await;
        assert_eq!(out, None);
    }

    #[tokio::test]
    async fn join_waits_for_natural_exit() {
        let task = PollTask::spawn(|_token| async {});
        task.join().await;
    }
}
