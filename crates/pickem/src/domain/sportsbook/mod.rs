mod settlement;
mod watcher;

pub use settlement::*;
pub use watcher::*;

use itertools::Itertools;
use log::{error, info, warn};
use pickem_core::{
    select_leader, validate_teams, AchievementKind, MatchupStatus, PickOutcome, TeamSnapshot,
};
use sqlx::SqliteConnection;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    domain::{
        campaign_chains, close_campaign, deactivate_campaign_chains, delete_pick,
        fetch_active_campaign, fetch_active_pick, fetch_matchup, fetch_pick, fetch_user,
        insert_campaign, insert_job, insert_pick, mark_settled, month_bounds,
        record_final_result, AchievementStore, Campaign, CampaignStore, Chain, ChainStore, Error,
        FinalizeMatchup, Job, JobSignal, JobStore, LedgerStore, MakePick, MatchupStore, Pick,
        PickStore, SquadStore, UserStore,
    },
    infra::{db::DBConnection, notifier::PickNotification},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloverSummary {
    pub closed_campaign_id: Uuid,
    pub chain_winner_id: Option<Uuid>,
    pub win_winner_id: Option<Uuid>,
    pub chains_closed: u64,
    pub next_campaign: Campaign,
}

/// Owns every pick's journey from creation through settlement, and the
/// monthly campaign rollover
pub struct Sportsbook {
    db_connection: DBConnection,
    pub users: UserStore,
    pub matchups: MatchupStore,
    pub picks: PickStore,
    pub chains: ChainStore,
    pub campaigns: CampaignStore,
    pub ledger: LedgerStore,
    pub achievements: AchievementStore,
    pub squads: SquadStore,
    pub jobs: JobStore,
    job_signal: JobSignal,
}

impl Sportsbook {
    pub fn new(db_connection: DBConnection, job_signal: JobSignal) -> Self {
        Self {
            users: UserStore::new(db_connection.clone()),
            matchups: MatchupStore::new(db_connection.clone()),
            picks: PickStore::new(db_connection.clone()),
            chains: ChainStore::new(db_connection.clone()),
            campaigns: CampaignStore::new(db_connection.clone()),
            ledger: LedgerStore::new(db_connection.clone()),
            achievements: AchievementStore::new(db_connection.clone()),
            squads: SquadStore::new(db_connection.clone()),
            jobs: JobStore::new(db_connection.clone()),
            db_connection,
            job_signal,
        }
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        self.db_connection.ping().await
    }

    pub async fn ensure_campaign(&self, now: OffsetDateTime) -> Result<Campaign, Error> {
        self.campaigns.ensure_active_campaign(now).await
    }

    /// The user's chain in the current campaign, created on first access
    pub async fn active_chain(&self, user_id: Uuid) -> Result<Chain, Error> {
        let campaign = self.campaigns.get_active_campaign().await?;
        self.chains
            .get_or_create_active_chain(user_id, campaign.id)
            .await
    }

    /// Place a wager. The balance is checked here but only moves at settlement.
    pub async fn make_pick(
        &self,
        user_id: Uuid,
        pick: MakePick,
        now: OffsetDateTime,
    ) -> Result<Pick, Error> {
        let created = self
            .db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;

                let user = fetch_user(&mut *tx, user_id).await?;
                if let Some(existing) = fetch_active_pick(&mut *tx, user.id).await? {
                    return Err(Error::ExistingPickFound(existing.id));
                }

                let matchup = fetch_matchup(&mut *tx, pick.matchup_id).await?;
                matchup.ensure_pre_lock(now)?;

                if user.coins < matchup.cost {
                    return Err(Error::InsufficientFunds {
                        balance: user.coins,
                        cost: matchup.cost,
                    });
                }

                let team = matchup.team(&pick.team_id).cloned().ok_or_else(|| {
                    Error::BadRequest(format!(
                        "team {} is not playing in matchup {}",
                        pick.team_id, matchup.id
                    ))
                })?;

                let campaign = fetch_active_campaign(&mut *tx).await?;
                let pick_id = insert_pick(
                    &mut *tx,
                    user.id,
                    matchup.id,
                    campaign.id,
                    &team,
                    matchup.cost,
                )
                .await?;
                let created = fetch_pick(&mut *tx, pick_id).await?;
                tx.commit().await?;
                Ok::<_, Error>(created)
            })
            .await?;

        info!(
            "user {} picked {} in matchup {} for {} coins",
            user_id, created.pick_team.id, created.matchup_id, created.coins
        );
        Ok(created)
    }

    /// Withdraw a pick before its matchup locks. The pick is deleted outright.
    pub async fn cancel_pick(
        &self,
        user_id: Uuid,
        pick_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<(), Error> {
        self.db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;

                let pick = fetch_pick(&mut *tx, pick_id).await?;
                if pick.user_id != user_id {
                    return Err(Error::PickNotFound(pick_id));
                }
                if !pick.active {
                    return Err(Error::PickAlreadySettled(pick_id));
                }

                let matchup = fetch_matchup(&mut *tx, pick.matchup_id).await?;
                matchup.ensure_pre_lock(now)?;

                delete_pick(&mut *tx, pick_id).await?;
                tx.commit().await?;
                Ok::<_, Error>(())
            })
            .await?;

        info!("user {} cancelled pick {}", user_id, pick_id);
        Ok(())
    }

    /// Settle a matchup with its final scores.
    ///
    /// The first attempt decides the winner and records it with the scores;
    /// an undetermined result leaves the matchup untouched. Later attempts
    /// reuse the recorded winner and reject scores that differ from it. Each
    /// active pick settles in its own transaction; a failing pick is reported
    /// without stopping the rest, and the matchup only becomes terminal once
    /// none are left.
    pub async fn finalize_matchup(
        &self,
        matchup_id: Uuid,
        result: FinalizeMatchup,
    ) -> Result<SettlementReport, Error> {
        let winner = self
            .db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;

                let matchup = fetch_matchup(&mut *tx, matchup_id).await?;
                if !matchup.active {
                    return Err(Error::MatchupAlreadySettled(matchup_id));
                }
                if let Some(status) = result.status {
                    if status != MatchupStatus::Final {
                        return Err(Error::BadRequest(format!(
                            "matchup {} can only be finalized as FINAL, got {}",
                            matchup_id,
                            status.as_str()
                        )));
                    }
                }
                check_same_teams(&matchup.home_team, &result.home_team)?;
                check_same_teams(&matchup.away_team, &result.away_team)?;
                validate_teams(&result.home_team, &result.away_team)?;

                if let Some(winner) = matchup.recorded_winner() {
                    if !matchup.has_scores(&result.home_team, &result.away_team) {
                        return Err(Error::ResultConflict(matchup_id));
                    }
                    info!(
                        "retrying settlement of matchup {} with recorded winner {}",
                        matchup_id,
                        winner.as_id()
                    );
                    return Ok(winner);
                }

                let winner = matchup.determine_winner(&result.home_team, &result.away_team)?;
                record_final_result(
                    &mut *tx,
                    matchup_id,
                    &result.home_team,
                    &result.away_team,
                    &winner,
                )
                .await?;
                tx.commit().await?;
                Ok::<_, Error>(winner)
            })
            .await?;

        info!(
            "finalizing matchup {} with winner {}",
            matchup_id,
            winner.as_id()
        );

        let picks = self.picks.get_active_picks_for_matchup(matchup_id).await?;
        let mut settled = Vec::with_capacity(picks.len());
        let mut failures = vec![];

        for pick in picks {
            let outcome = winner.outcome_for(&pick.pick_team.id);
            match self.settle(pick.id, outcome).await {
                Ok(result) => settled.push(result),
                Err(e) => {
                    error!(
                        "failed to settle pick {} on matchup {}: {}",
                        pick.id, matchup_id, e
                    );
                    failures.push(PickFailure {
                        pick_id: pick.id,
                        code: e.code().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let completed = failures.is_empty();
        if completed {
            let final_winner = winner.clone();
            self.db_connection
                .execute_write(move |pool| async move {
                    let mut conn = pool.acquire().await?;
                    mark_settled(&mut *conn, matchup_id, &final_winner).await
                })
                .await?;
            info!(
                "matchup {} settled, {} picks closed",
                matchup_id,
                settled.len()
            );
        } else {
            warn!(
                "matchup {} left open, {} of {} picks failed to settle: {}",
                matchup_id,
                failures.len(),
                failures.len() + settled.len(),
                failures.iter().map(|failure| failure.pick_id).join(", ")
            );
        }

        Ok(SettlementReport {
            matchup_id,
            winner_id: winner.as_id().to_string(),
            settled,
            failures,
            completed,
        })
    }

    pub async fn handle_pick_win(&self, pick_id: Uuid) -> Result<SettledPick, Error> {
        self.settle(pick_id, PickOutcome::Win).await
    }

    pub async fn handle_pick_loss(&self, pick_id: Uuid) -> Result<SettledPick, Error> {
        self.settle(pick_id, PickOutcome::Loss).await
    }

    pub async fn handle_pick_push(&self, pick_id: Uuid) -> Result<SettledPick, Error> {
        self.settle(pick_id, PickOutcome::Push).await
    }

    async fn settle(&self, pick_id: Uuid, outcome: PickOutcome) -> Result<SettledPick, Error> {
        let settled = self
            .db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;
                let settled = apply_outcome(&mut *tx, pick_id, outcome).await?;
                queue_side_effects(&mut *tx, &settled).await?;
                tx.commit().await?;
                Ok::<_, Error>(settled)
            })
            .await?;

        self.job_signal.notify();
        Ok(settled)
    }

    /// Close the active campaign, crown its two title holders and open the
    /// next month's campaign, all in one transaction.
    pub async fn rollover_campaign(&self, now: OffsetDateTime) -> Result<RolloverSummary, Error> {
        let summary = self
            .db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;

                let campaign = fetch_active_campaign(&mut *tx).await?;
                let chains = campaign_chains(&mut *tx, campaign.id).await?;
                if chains.is_empty() {
                    return Err(Error::NoChains(campaign.id));
                }

                let chain_winner_id =
                    select_leader(&chains, |chain| chain.tally().chain_rank()).map(|c| c.user_id);
                let win_winner_id =
                    select_leader(&chains, |chain| chain.tally().win_rank()).map(|c| c.user_id);

                close_campaign(&mut *tx, campaign.id, chain_winner_id, win_winner_id).await?;
                let chains_closed = deactivate_campaign_chains(&mut *tx, campaign.id).await?;

                // A late rollover opens the month we are in rather than one already over
                let anchor = if now >= campaign.end_time {
                    now
                } else {
                    campaign.end_time
                };
                let (start, end) = month_bounds(anchor);
                let next_campaign = insert_campaign(&mut *tx, start, end).await?;

                let titles = [
                    (chain_winner_id, AchievementKind::ChainChampion),
                    (win_winner_id, AchievementKind::WinChampion),
                ];
                for (user_id, kind) in titles {
                    if let Some(user_id) = user_id {
                        let job = Job::GrantAchievement {
                            user_id,
                            kind,
                            campaign_id: campaign.id,
                        };
                        insert_job(&mut *tx, &job).await?;
                    }
                }

                tx.commit().await?;
                Ok::<_, Error>(RolloverSummary {
                    closed_campaign_id: campaign.id,
                    chain_winner_id,
                    win_winner_id,
                    chains_closed,
                    next_campaign,
                })
            })
            .await?;

        self.job_signal.notify();

        info!(
            "rolled campaign {} over into {} ({} chains closed)",
            summary.closed_campaign_id, summary.next_campaign.name, summary.chains_closed
        );
        Ok(summary)
    }
}

/// Queue the jobs that follow a settled pick, inside its transaction
async fn queue_side_effects(
    conn: &mut SqliteConnection,
    settled: &SettledPick,
) -> Result<(), Error> {
    let notification = Job::NotifyPickSettled(PickNotification {
        pick_id: settled.pick_id,
        matchup_id: settled.matchup_id,
        user_external_id: settled.user_external_id.clone(),
        status: settled.outcome.status(),
        coins: settled.coins,
    });
    insert_job(&mut *conn, &notification).await?;
    insert_job(
        &mut *conn,
        &Job::EvaluateAchievements {
            user_id: settled.user_id,
            pick_id: settled.pick_id,
        },
    )
    .await?;
    if let Some(squad_id) = settled.squad_id {
        insert_job(
            &mut *conn,
            &Job::SquadResult {
                squad_id,
                outcome: settled.outcome,
            },
        )
        .await?;
    }
    Ok(())
}

fn check_same_teams(existing: &TeamSnapshot, reported: &TeamSnapshot) -> Result<(), Error> {
    if existing.id != reported.id {
        return Err(Error::BadRequest(format!(
            "reported team {} does not match matchup team {}",
            reported.id, existing.id
        )));
    }
    Ok(())
}
