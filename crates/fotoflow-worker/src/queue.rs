//! Queue worker pool: claim, dispatch, lease reaping, shutdown.
//!
//! Shutdown: [`QueueWorkerPool::shutdown`] signals the pool to stop claiming;
//! it does not wait for in-flight events. For graceful shutdown, give running
//! handlers time to finish before process exit.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;

use fotoflow_core::models::ProcessingEvent;
use fotoflow_db::{QueueRepository, EVENT_NOTIFY_CHANNEL};

/// Handles one processing event. Implemented by [`crate::MediaWorker`];
/// test doubles implement it to observe dispatch behavior.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: ProcessingEvent) -> Result<()>;
}

#[derive(Clone)]
pub struct QueueWorkerConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    /// Visibility timeout for claimed events; running rows older than this
    /// are returned to pending by the reaper.
    pub lease_secs: u64,
    /// Interval between reaper runs. 0 disables the reaper.
    pub reap_interval_secs: u64,
}

impl Default for QueueWorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
            lease_secs: 3600,
            reap_interval_secs: 60,
        }
    }
}

/// Bounded worker pool over the durable processing queue.
///
/// Wakes on `pg_notify` when a pool handle is provided, and polls at
/// `poll_interval_ms` regardless, so a missed notification only delays
/// dispatch rather than losing it.
pub struct QueueWorkerPool {
    shutdown_tx: mpsc::Sender<()>,
}

impl QueueWorkerPool {
    pub fn new(
        repository: QueueRepository,
        listen_pool: Option<sqlx::PgPool>,
        config: QueueWorkerConfig,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            Self::run(repository, listen_pool, config, handler, shutdown_rx).await;
        });

        Self { shutdown_tx }
    }

    async fn run(
        repository: QueueRepository,
        listen_pool: Option<sqlx::PgPool>,
        config: QueueWorkerConfig,
        handler: Arc<dyn EventHandler>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let use_listen = listen_pool.is_some();
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            listen_notify = use_listen,
            "Queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        // Wake channel fed by LISTEN so the main loop never blocks on recv
        // when no listen pool was provided.
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        if let Some(pool) = listen_pool {
            tokio::spawn(async move {
                loop {
                    match sqlx::postgres::PgListener::connect_with(&pool).await {
                        Ok(mut listener) => {
                            if let Err(e) = listener.listen(EVENT_NOTIFY_CHANNEL).await {
                                tracing::warn!(error = %e, "LISTEN failed, will retry");
                                sleep(Duration::from_secs(5)).await;
                                continue;
                            }
                            while listener.recv().await.is_ok() {
                                let _ = notify_tx.send(()).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "PgListener connect failed, will retry");
                            sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            });
        }

        // Lease reaper: stale running rows become redeliverable.
        let (reaper_shutdown_tx, mut reaper_shutdown_rx) = mpsc::channel::<()>(1);
        if config.reap_interval_secs > 0 {
            let repo = repository.clone();
            let reap_interval = Duration::from_secs(config.reap_interval_secs);
            let lease_secs = config.lease_secs as f64;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(reap_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = repo.reap_stale(lease_secs).await {
                                tracing::error!(error = %e, "Queue lease reaper failed");
                            }
                        }
                        _ = reaper_shutdown_rx.recv() => break,
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Queue worker pool shutting down");
                    let _ = reaper_shutdown_tx.send(()).await;
                    break;
                }
                _ = notify_rx.recv() => {
                    Self::claim_and_dispatch(&repository, &semaphore, &handler).await;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch(&repository, &semaphore, &handler).await;
                }
            }
        }

        tracing::info!("Queue worker pool stopped");
    }

    async fn claim_and_dispatch(
        repository: &QueueRepository,
        semaphore: &Arc<Semaphore>,
        handler: &Arc<dyn EventHandler>,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No worker slots available, skipping claim");
                return;
            }
        };

        match repository.claim_next().await {
            Ok(Some(row)) => {
                let repo = repository.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let queue_id = row.id;

                    let event = match row.event() {
                        Ok(event) => event,
                        Err(e) => {
                            tracing::error!(error = %e, queue_id, "Dropping undecodable event");
                            let _ = repo.mark_failed(queue_id).await;
                            return;
                        }
                    };

                    match handler.handle(event).await {
                        Ok(()) => {
                            if let Err(e) = repo.mark_done(queue_id).await {
                                tracing::error!(error = %e, queue_id, "Failed to mark event done");
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, queue_id, "Event handling failed");
                            if let Err(e) = repo.mark_failed(queue_id).await {
                                tracing::error!(error = %e, queue_id, "Failed to mark event failed");
                            }
                        }
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No events available in queue");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to claim event from queue");
            }
        }
    }

    /// Signal the pool to stop claiming and exit its loop. Returns
    /// immediately; in-flight handlers keep running until they finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}
