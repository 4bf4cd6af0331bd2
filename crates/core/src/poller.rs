//! Periodic maintenance cycle running alongside the filesystem watcher.
//!
//! Stopping is cooperative: a cycle already in progress runs to completion,
//! so shutdown can take up to one full cycle.

use anyhow::bail;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[async_trait::async_trait]
pub trait Cycle: Send + Sync {
    async fn run_cycle(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Running,
    Stopped,
}

pub struct PollingCoordinator {
    interval: Duration,
    state: CoordinatorState,
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl PollingCoordinator {
    pub fn new(interval: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            interval,
            state: CoordinatorState::Idle,
            stop_tx,
            handle: None,
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Spawns the loop. The first cycle runs one full interval after start.
    pub fn start(&mut self, cycle: Arc<dyn Cycle>) -> anyhow::Result<()> {
        if self.state != CoordinatorState::Idle {
            bail!("poller already started ({:?})", self.state);
        }
        let interval = self.interval;
        let mut stop_rx = self.stop_tx.subscribe();
        info!(
            "background poller started, running every {} seconds",
            interval.as_secs()
        );
        self.handle = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop_rx.wait_for(|stopped| *stopped) => break,
                }
                let started = chrono::Local::now();
                info!(
                    "running scheduled cycle at {}",
                    started.format("%Y-%m-%d %H:%M:%S")
                );
                match cycle.run_cycle().await {
                    Ok(()) => info!(
                        "scheduled cycle completed at {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
                    ),
                    Err(e) => error!("error during scheduled cycle: {:#}", e),
                }
                if *stop_rx.borrow() {
                    break;
                }
            }
            info!("background poller stopped");
        }));
        self.state = CoordinatorState::Running;
        Ok(())
    }

    /// Signals the loop to exit. Does not interrupt a running cycle.
    pub fn stop(&mut self) {
        self.stop_tx.send_replace(true);
        self.state = CoordinatorState::Stopped;
    }

    /// Waits for the loop task to finish.
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("poller task ended abnormally: {}", e);
            }
        }
    }
}
