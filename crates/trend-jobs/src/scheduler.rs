//! Recurring schedule producer.
//!
//! Schedules are durable rows; the scheduler is a thin clock that turns
//! due rows into queue entries. Installation is idempotent, so restarts
//! never double a trigger, and a tick that enqueues but crashes before
//! `mark_fired` only risks one duplicate job, which every handler
//! tolerates.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use trend_core::{
    defaults, EnqueueOptions, Error, JobKind, JobPayload, JobQueue, Result, ScheduleRepository,
};

/// Next fire time of a cron expression strictly after `after`.
pub fn next_occurrence(cron_expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let schedule = Schedule::from_str(cron_expr)
        .map_err(|e| Error::Config(format!("Invalid cron expression '{cron_expr}': {e}")))?;
    schedule
        .after(&after)
        .next()
        .ok_or_else(|| Error::Config(format!("Cron expression '{cron_expr}' never fires")))
}

/// Install the built-in recurring producers: daily trend discovery and the
/// hourly reconciliation sweep. Safe to call on every startup.
pub async fn install_default_schedules(schedules: &Arc<dyn ScheduleRepository>) -> Result<()> {
    let now = Utc::now();

    schedules
        .upsert(
            defaults::DISCOVERY_SCHEDULE_ID,
            defaults::DISCOVERY_CRON,
            JobKind::TrendDiscovery,
            Some(serde_json::to_value(JobPayload::DiscoveryTrigger)?),
            next_occurrence(defaults::DISCOVERY_CRON, now)?,
        )
        .await?;

    schedules
        .upsert(
            defaults::RECONCILE_SCHEDULE_ID,
            defaults::RECONCILE_CRON,
            JobKind::Reconcile,
            Some(serde_json::to_value(JobPayload::ReconcileTrigger)?),
            next_occurrence(defaults::RECONCILE_CRON, now)?,
        )
        .await?;

    info!("Installed default recurring schedules");
    Ok(())
}

/// Manually request a discovery run, jumping ahead of scheduled work.
pub async fn trigger_discovery(queue: &Arc<dyn JobQueue>) -> Result<Uuid> {
    queue
        .enqueue(
            JobKind::TrendDiscovery,
            Some(serde_json::to_value(JobPayload::DiscoveryTrigger)?),
            EnqueueOptions {
                priority: Some(defaults::MANUAL_TRIGGER_PRIORITY),
                delay_secs: None,
            },
        )
        .await
}

/// Handle for stopping a running scheduler.
pub struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SchedulerHandle {
    /// Signal the scheduler to shut down.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }
}

/// Polls durable schedules and enqueues jobs when they come due.
pub struct Scheduler {
    schedules: Arc<dyn ScheduleRepository>,
    queue: Arc<dyn JobQueue>,
    tick_secs: u64,
}

impl Scheduler {
    pub fn new(schedules: Arc<dyn ScheduleRepository>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            schedules,
            queue,
            tick_secs: defaults::SCHEDULER_TICK_SECS,
        }
    }

    /// Set the tick interval (mainly for tests).
    pub fn with_tick_secs(mut self, secs: u64) -> Self {
        self.tick_secs = secs.max(1);
        self
    }

    /// Start the scheduler loop in a background task.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        SchedulerHandle { shutdown_tx }
    }

    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        info!(tick_secs = self.tick_secs, "Scheduler started");
        let tick = Duration::from_secs(self.tick_secs);

        loop {
            if let Err(e) = self.fire_due(Utc::now()).await {
                error!(error = %e, "Scheduler tick failed");
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
                _ = sleep(tick) => {}
            }
        }

        info!("Scheduler stopped");
    }

    /// Enqueue every due schedule and advance its next occurrence.
    pub async fn fire_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.schedules.due(now).await?;
        let mut fired = 0usize;

        for schedule in due {
            let job_id = self
                .queue
                .enqueue(
                    schedule.kind,
                    schedule.payload.clone(),
                    EnqueueOptions::default(),
                )
                .await?;

            let next = match next_occurrence(&schedule.cron_expr, now) {
                Ok(next) => next,
                Err(e) => {
                    // A schedule row with a bad expression stays due and
                    // would fire every tick; park it a day out instead.
                    warn!(schedule = %schedule.id, error = %e, "Unschedulable cron expression");
                    now + chrono::Duration::days(1)
                }
            };
            self.schedules.mark_fired(&schedule.id, next).await?;

            info!(
                schedule = %schedule.id,
                kind = ?schedule.kind,
                ?job_id,
                next_run_at = %next,
                "Fired recurring schedule"
            );
            fired += 1;
        }

        Ok(fired)
    }
}
