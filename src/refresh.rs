//! Periodic re-read of every registered config.

use std::sync::Arc;

use tokio::{
    runtime::Handle,
    sync::broadcast,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{error::Result, registry::RegistryInner};

/// The background task owned by a [`ConfigRegistry`](crate::ConfigRegistry).
///
/// Stops when [`trigger`](RefreshTask::trigger) is called or when the task
/// itself is dropped (the shutdown sender closes).
pub(crate) struct RefreshTask {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl RefreshTask {
    /// Spawns the task on the current tokio runtime.
    pub(crate) fn spawn(registry: Arc<RegistryInner>) -> Result<Self> {
        let runtime = Handle::try_current()?;
        let (shutdown, mut shutdown_rx) = broadcast::channel(1);

        let task = runtime.spawn(async move {
            let period = registry.refresh_interval();

            tracing::info!(
                dir = %registry.base_dir().display(),
                interval_ms = period.as_millis() as u64,
                "Config refresh task starting"
            );

            // First tick one full period after start
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let registry = Arc::clone(&registry);
                        let failed = tokio::task::spawn_blocking(move || registry.refresh_all()).await;

                        match failed {
                            Ok(failed) if !failed.is_empty() => {
                                tracing::debug!(failed = failed.len(), "Refresh tick finished with failures");
                            }
                            Ok(_) => {}
                            Err(err) => tracing::error!(error = %err, "Refresh tick panicked"),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Config refresh task received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        });

        Ok(Self { shutdown, task })
    }

    pub(crate) fn trigger(&self) {
        let _ = self.shutdown.send(());
    }

    /// Triggers shutdown and waits for the task to finish.
    pub(crate) async fn join(self) {
        self.trigger();

        if let Err(err) = self.task.await {
            tracing::error!(error = %err, "Config refresh task failed");
        }
    }
}
