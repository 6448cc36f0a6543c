//! Background monitors for the engine: service status and log tail.
//!
//! Both run on the same cadence and can be poked for an immediate refresh
//! through a [`RefreshTrigger`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::job::{poll_ticker, unless_cancelled};

pub mod logs;
pub mod status;

pub use logs::{LogFetcher, LogMonitor, LogSource, LogTail};
pub use status::{Controls, PipelinePhase, StatusAggregator, StatusMonitor, StatusSnapshot};

/// Requests an out-of-schedule refresh from a monitor loop.
#[derive(Debug, Clone, Default)]
pub struct RefreshTrigger(Arc<Notify>);

impl RefreshTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh as soon as the loop is free. Repeated calls coalesce.
    pub fn fire(&self) {
        self.0.notify_one();
    }

    /// Fire once `delay` has passed.
    pub fn fire_after(&self, delay: Duration) {
        let trigger = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trigger.fire();
        });
    }

    pub(crate) async fn fired(&self) {
        self.0.notified().await;
    }
}

/// Run `refresh` on every tick of `period` and whenever `trigger` fires.
pub(crate) async fn refresh_loop<F, Fut>(
    period: Duration,
    trigger: RefreshTrigger,
    token: CancellationToken,
    mut refresh: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = poll_ticker(period);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
            _ = trigger.fired() => {}
        }
        if unless_cancelled(&token, refresh()).await.is_none() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::job::PollTask;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn trigger_forces_an_extra_refresh() {
        let count = Arc::new(AtomicUsize::new(0));
        let trigger = RefreshTrigger::new();

        let seen = count.clone();
        let loop_trigger = trigger.clone();
        let _task = PollTask::spawn(move |token| {
            refresh_loop(Duration::from_secs(5), loop_trigger, token, move || {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            })
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        trigger.fire();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        trigger.fire_after(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }
}
