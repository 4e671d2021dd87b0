//! Schedule evaluator: one elected replica ticks over the enabled
//! schedules and starts Runs for due triggers. Missed ticks are skipped,
//! never replayed.

use crate::{EngineError, JobDispatcher, SharedContext};
use chrono::{DateTime, Utc};
use cockpit_broker::SchedulerLock;
use cockpit_model::JobSchedule;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct Scheduler {
    ctx: SharedContext,
    lock: SchedulerLock,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(ctx: SharedContext, lock: SchedulerLock) -> Self {
        Self {
            ctx,
            lock,
            tick_interval: Duration::from_secs(30),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub async fn run(&self) -> Result<(), EngineError> {
        let dispatcher = JobDispatcher::new(self.ctx.clone());
        let mut last_tick = Utc::now();
        info!("scheduler started");

        loop {
            let leading = match self.lock.refresh().await {
                Ok(true) => true,
                Ok(false) => self.lock.acquire().await.unwrap_or(false),
                Err(err) => {
                    warn!("scheduler lock refresh failed: {err}");
                    false
                }
            };

            let now = Utc::now();
            if leading {
                if let Err(err) = self.tick(&dispatcher, last_tick, now).await {
                    error!("scheduler tick failed: {err}");
                }
            }
            // The window always advances; a replica that just took over
            // does not replay ticks it never owned.
            last_tick = now;
            tokio::time::sleep(self.tick_interval).await;
        }
    }

    async fn tick(
        &self,
        dispatcher: &JobDispatcher,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let schedules = self.ctx.store.schedules().list_enabled().await?;
        for schedule in schedules {
            if !is_due(&schedule, since, now) {
                continue;
            }
            match dispatcher
                .start_run(schedule.template_id, "scheduler", None)
                .await
            {
                Ok(run) => info!(
                    schedule_id = schedule.id,
                    run_id = %run.id,
                    "schedule fired"
                ),
                Err(EngineError::OverlapRefused(template_id)) => debug!(
                    schedule_id = schedule.id,
                    template_id, "skipped, a run is still active"
                ),
                Err(err) => error!(schedule_id = schedule.id, "schedule dispatch failed: {err}"),
            }
        }
        Ok(())
    }
}

/// Fire-and-skip: due when at least one cron occurrence falls inside the
/// (since, now] window; multiple missed occurrences still fire once.
fn is_due(schedule: &JobSchedule, since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    match cron::Schedule::from_str(&schedule.cron) {
        Ok(parsed) => parsed
            .after(&since)
            .next()
            .map(|occurrence| occurrence <= now)
            .unwrap_or(false),
        Err(err) => {
            warn!(
                schedule_id = schedule.id,
                cron = schedule.cron.as_str(),
                "invalid cron expression: {err}"
            );
            false
        }
    }
}
