use log::{debug, error, info, warn};
use std::{sync::Arc, time::Duration};
use time::OffsetDateTime;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::Sportsbook;
use crate::domain::{Error, FinalizeMatchup};

/// Settles matchups the score feed marked FINAL but never finalized, using
/// the scores already stored on the matchup
pub struct SettlementWatcher {
    sportsbook: Arc<Sportsbook>,
    sync_interval: Duration,
    cancel_token: CancellationToken,
}

impl SettlementWatcher {
    pub fn new(
        sportsbook: Arc<Sportsbook>,
        cancel_token: CancellationToken,
        sync_interval: Duration,
    ) -> Self {
        Self {
            sportsbook,
            sync_interval,
            cancel_token,
        }
    }

    pub async fn watch(&self) -> Result<(), anyhow::Error> {
        info!("Starting settlement watcher");

        loop {
            if self.cancel_token.is_cancelled() {
                info!("Settlement watcher received cancellation");
                break;
            }

            match self.settle_final_matchups().await {
                Ok(count) => debug!("Settlement sweep finished, {} matchups settled", count),
                Err(e) => error!("Settlement sweep error: {}", e),
            }

            tokio::select! {
                _ = sleep(self.sync_interval) => continue,
                _ = self.cancel_token.cancelled() => {
                    info!("Settlement watcher cancelled during sleep");
                    break;
                }
            }
        }

        Ok(())
    }

    pub async fn settle_final_matchups(&self) -> Result<usize, Error> {
        let matchups = self.sportsbook.matchups.get_final_unsettled().await?;
        let mut completed = 0;

        for matchup in matchups {
            let result = FinalizeMatchup {
                home_team: matchup.home_team.clone(),
                away_team: matchup.away_team.clone(),
                status: Some(matchup.status),
            };
            match self.sportsbook.finalize_matchup(matchup.id, result).await {
                Ok(report) if report.completed => completed += 1,
                Ok(report) => warn!(
                    "matchup {} still has {} unsettled picks",
                    matchup.id,
                    report.failures.len()
                ),
                Err(e) => error!("failed to finalize matchup {}: {}", matchup.id, e),
            }
        }

        Ok(completed)
    }
}

/// Rolls the active campaign over once its month has ended
pub struct CampaignWatcher {
    sportsbook: Arc<Sportsbook>,
    sync_interval: Duration,
    cancel_token: CancellationToken,
}

impl CampaignWatcher {
    pub fn new(
        sportsbook: Arc<Sportsbook>,
        cancel_token: CancellationToken,
        sync_interval: Duration,
    ) -> Self {
        Self {
            sportsbook,
            sync_interval,
            cancel_token,
        }
    }

    pub async fn watch(&self) -> Result<(), anyhow::Error> {
        info!("Starting campaign watcher");

        loop {
            if self.cancel_token.is_cancelled() {
                info!("Campaign watcher received cancellation");
                break;
            }

            if let Err(e) = self.check_rollover(OffsetDateTime::now_utc()).await {
                error!("Campaign rollover error: {}", e);
            }

            tokio::select! {
                _ = sleep(self.sync_interval) => continue,
                _ = self.cancel_token.cancelled() => {
                    info!("Campaign watcher cancelled during sleep");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Returns true when a rollover happened
    pub async fn check_rollover(&self, now: OffsetDateTime) -> Result<bool, Error> {
        let campaign = match self.sportsbook.campaigns.get_active_campaign().await {
            Ok(campaign) => campaign,
            Err(Error::CampaignNotFound) => {
                warn!("No active campaign, opening one");
                self.sportsbook.ensure_campaign(now).await?;
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        if !campaign.has_ended(now) {
            return Ok(false);
        }

        info!("Campaign {} ended at {}", campaign.name, campaign.end_time);
        self.sportsbook.rollover_campaign(now).await?;
        Ok(true)
    }
}
