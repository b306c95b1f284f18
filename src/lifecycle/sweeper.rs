//! Periodic cleanup tasks for in-memory tables.

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Run `sweep` every `interval` until stopped.
///
/// The task stops when the returned handle is stopped or dropped, or when
/// the shutdown signal fires. The first sweep happens one interval after
/// start.
pub fn spawn_sweeper<F>(
    name: &'static str,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
    mut sweep: F,
) -> SweeperHandle
where
    F: FnMut() + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        tracing::info!(sweeper = name, interval_secs = interval.as_secs(), "Sweeper starting");

        loop {
            tokio::select! {
                _ = ticker.tick() => sweep(),
                _ = shutdown.recv() => {
                    tracing::info!(sweeper = name, "Sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    });

    SweeperHandle { name, task: Some(task) }
}

/// Owner of a background sweep task.
#[derive(Debug)]
pub struct SweeperHandle {
    name: &'static str,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Cancel the sweep task and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            tracing::debug!(sweeper = self.name, "Sweeper stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
