//! Fixed-interval scheduling for the reconciliation jobs.
//!
//! Single active scheduler instance assumed; there is no cross-instance
//! coordination. Missed ticks are skipped, not replayed.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::reconcile::ReconciliationService;

pub struct JobScheduler;

impl JobScheduler {
    /// Spawn the stalled sweep (frequent) and the expiry purge (daily) on
    /// their configured intervals. Returns the handles for shutdown.
    pub fn start(service: Arc<ReconciliationService>, config: &fotoflow_core::SweepConfig) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(2);

        let sweep_service = service.clone();
        let sweep_every = config.stalled_sweep_interval;
        handles.push(tokio::spawn(async move {
            let mut ticker = interval(sweep_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = sweep_service.run_stalled_sweep().await {
                    tracing::error!(error = %e, "Stalled sweep failed");
                }
            }
        }));

        let purge_service = service;
        let purge_every = config.purge_interval;
        handles.push(tokio::spawn(async move {
            let mut ticker = interval(purge_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = purge_service.run_expiry_purge().await {
                    tracing::error!(error = %e, "Expiry purge failed");
                }
            }
        }));

        handles
    }
}
