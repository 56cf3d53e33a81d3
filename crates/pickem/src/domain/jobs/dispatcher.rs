use async_channel::Receiver;
use log::{debug, error, info, warn};
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::{Job, JobStore};
use crate::{
    domain::{AchievementEvaluator, Error, SquadAggregator},
    infra::notifier::Notifier,
};

const JOB_BATCH_SIZE: i64 = 64;

/// Runs the jobs written to the `jobs` table. A job is deleted once it has
/// run; a failing job is retried on later passes until it has used up its
/// attempts, then logged and dropped so it can never reach back into
/// settlement.
pub struct JobDispatcher {
    store: JobStore,
    wake: Receiver<()>,
    notifier: Arc<dyn Notifier>,
    achievements: Arc<dyn AchievementEvaluator>,
    squads: Arc<dyn SquadAggregator>,
    poll_interval: Duration,
    max_attempts: i64,
    cancel_token: CancellationToken,
}

impl JobDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: JobStore,
        wake: Receiver<()>,
        notifier: Arc<dyn Notifier>,
        achievements: Arc<dyn AchievementEvaluator>,
        squads: Arc<dyn SquadAggregator>,
        poll_interval: Duration,
        max_attempts: i64,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            store,
            wake,
            notifier,
            achievements,
            squads,
            poll_interval,
            max_attempts: max_attempts.max(1),
            cancel_token,
        }
    }

    pub async fn run(&self) -> Result<(), anyhow::Error> {
        info!("Starting job dispatcher");

        loop {
            if self.cancel_token.is_cancelled() {
                info!("Job dispatcher received cancellation");
                break;
            }

            match self.drain().await {
                Ok(0) => {}
                Ok(count) => debug!("Job pass finished, {} jobs run", count),
                Err(e) => error!("Job pass error: {}", e),
            }

            tokio::select! {
                _ = self.wake.recv(), if !self.wake.is_closed() => continue,
                _ = sleep(self.poll_interval) => continue,
                _ = self.cancel_token.cancelled() => {
                    info!("Job dispatcher cancelled while idle");
                    break;
                }
            }
        }

        // Whatever is left stays in the table for the next start
        match self.drain().await {
            Ok(count) if count > 0 => info!("Ran {} jobs before shutdown", count),
            Ok(_) => {}
            Err(e) => error!("Final job pass error: {}", e),
        }
        match self.store.count().await {
            Ok(0) => {}
            Ok(left) => warn!("Job dispatcher stopped with {} jobs still queued", left),
            Err(e) => error!("Failed to count queued jobs: {}", e),
        }
        Ok(())
    }

    /// One pass over every queued job. Returns how many ran successfully.
    pub async fn drain(&self) -> Result<usize, Error> {
        let mut after_id = 0;
        let mut completed = 0;

        loop {
            let batch = self.store.pending(after_id, JOB_BATCH_SIZE).await?;
            let Some(last) = batch.last() else {
                break;
            };
            after_id = last.id;
            let full = batch.len() as i64 == JOB_BATCH_SIZE;

            for queued in batch {
                let name = queued.job.name();
                match self.dispatch(queued.job).await {
                    Ok(()) => {
                        self.store.complete(queued.id).await?;
                        completed += 1;
                    }
                    Err(e) if queued.attempts + 1 >= self.max_attempts => {
                        error!(
                            "{} job {} failed {} times, dropping it: {}",
                            name,
                            queued.id,
                            queued.attempts + 1,
                            e
                        );
                        self.store.complete(queued.id).await?;
                    }
                    Err(e) => {
                        warn!("{} job {} failed, will retry: {}", name, queued.id, e);
                        self.store.record_failure(queued.id, e.to_string()).await?;
                    }
                }
            }

            if !full {
                break;
            }
        }

        Ok(completed)
    }

    pub async fn dispatch(&self, job: Job) -> Result<(), anyhow::Error> {
        debug!("running {} job", job.name());

        match job {
            Job::NotifyPickSettled(notification) => {
                self.notifier.pick_settled(notification).await?
            }
            Job::EvaluateAchievements { user_id, pick_id } => {
                let granted = self.achievements.evaluate_pick(user_id, pick_id).await?;
                if !granted.is_empty() {
                    info!("user {} earned {:?}", user_id, granted);
                }
            }
            Job::SquadResult { squad_id, outcome } => {
                self.squads.record_result(squad_id, outcome).await?
            }
            Job::GrantAchievement {
                user_id,
                kind,
                campaign_id,
            } => {
                self.achievements
                    .grant(user_id, kind, Some(campaign_id))
                    .await?;
            }
        }

        Ok(())
    }
}
