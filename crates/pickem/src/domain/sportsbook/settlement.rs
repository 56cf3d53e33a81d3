use log::debug;
use pickem_core::{matchup_reward, PickOutcome, TransactionType};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::domain::{
    add_coins, fetch_active_campaign, fetch_matchup, fetch_pick, fetch_user,
    get_or_create_active_chain, record_result, save_tally, settle_pick, subtract_coins, Error,
};

/// What one pick transition wrote, handed to the side-effect jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledPick {
    pub pick_id: Uuid,
    pub matchup_id: Uuid,
    pub user_id: Uuid,
    pub user_external_id: String,
    pub squad_id: Option<Uuid>,
    pub outcome: PickOutcome,
    /// Signed coins moved for the user
    pub coins: i64,
    pub chain: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickFailure {
    pub pick_id: Uuid,
    pub code: String,
    pub message: String,
}

/// Result of one finalize call. The matchup only becomes terminal when
/// `failures` is empty; otherwise a later call retries the remaining picks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReport {
    pub matchup_id: Uuid,
    pub winner_id: String,
    pub settled: Vec<SettledPick>,
    pub failures: Vec<PickFailure>,
    pub completed: bool,
}

/// Move one pick to its terminal state along with the owner's chain, record,
/// league record and balance. Runs inside the caller's transaction.
pub async fn apply_outcome(
    conn: &mut SqliteConnection,
    pick_id: Uuid,
    outcome: PickOutcome,
) -> Result<SettledPick, Error> {
    let pick = fetch_pick(conn, pick_id).await?;
    if !pick.active {
        return Err(Error::PickAlreadySettled(pick_id));
    }
    let user = fetch_user(conn, pick.user_id).await?;
    let matchup = fetch_matchup(conn, pick.matchup_id).await?;
    let campaign = fetch_active_campaign(conn).await?;
    let chain = get_or_create_active_chain(conn, user.id, campaign.id).await?;

    let mut tally = chain.tally();
    let coins = match outcome {
        PickOutcome::Win => {
            let reward = matchup_reward(matchup.cost, matchup.featured);
            tally.apply_win(reward);
            add_coins(conn, user.id, reward, TransactionType::Pick, Some(pick.id)).await?;
            reward
        }
        PickOutcome::Loss => {
            let wager = pick.coins;
            tally.apply_loss(wager);
            if wager > 0 {
                subtract_coins(conn, user.id, wager, TransactionType::Pick, Some(pick.id)).await?;
            }
            -wager
        }
        PickOutcome::Push => {
            tally.apply_push();
            0
        }
    };

    save_tally(conn, chain.id, &tally).await?;
    record_result(conn, user.id, &matchup.league, outcome).await?;
    settle_pick(conn, pick.id, outcome, coins).await?;

    debug!(
        "pick {} settled as {} for user {}: {} coins, chain {} -> {}",
        pick.id, outcome, user.id, coins, chain.chain, tally.chain
    );

    Ok(SettledPick {
        pick_id: pick.id,
        matchup_id: matchup.id,
        user_id: user.id,
        user_external_id: user.external_id,
        squad_id: user.squad_id,
        outcome,
        coins,
        chain: tally.chain,
    })
}
