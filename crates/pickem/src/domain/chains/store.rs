use log::debug;
use pickem_core::ChainTally;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    domain::Error,
    infra::db::{format_datetime, parse_required_datetime, parse_uuid, DBConnection},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    pub id: Uuid,
    pub user_id: Uuid,
    pub campaign_id: Uuid,
    pub active: bool,
    /// Signed streak, positive for wins and negative for losses
    pub chain: i64,
    pub best: i64,
    pub wins: i64,
    pub losses: i64,
    pub pushes: i64,
    pub coins: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Chain {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Chain {
            id: parse_uuid(row, "id")?,
            user_id: parse_uuid(row, "user_id")?,
            campaign_id: parse_uuid(row, "campaign_id")?,
            active: row.try_get("active")?,
            chain: row.try_get("chain")?,
            best: row.try_get("best")?,
            wins: row.try_get("wins")?,
            losses: row.try_get("losses")?,
            pushes: row.try_get("pushes")?,
            coins: row.try_get("coins")?,
            created_at: parse_required_datetime(row, "created_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        })
    }
}

impl Chain {
    pub fn tally(&self) -> ChainTally {
        ChainTally {
            chain: self.chain,
            best: self.best,
            wins: self.wins,
            losses: self.losses,
            pushes: self.pushes,
            coins: self.coins,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: Uuid,
    pub username: Option<String>,
    pub chain: i64,
    pub best: i64,
    pub wins: i64,
    pub losses: i64,
    pub pushes: i64,
    pub coins: i64,
}

impl FromRow<'_, SqliteRow> for LeaderboardEntry {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(LeaderboardEntry {
            user_id: parse_uuid(row, "user_id")?,
            username: row.try_get("username")?,
            chain: row.try_get("chain")?,
            best: row.try_get("best")?,
            wins: row.try_get("wins")?,
            losses: row.try_get("losses")?,
            pushes: row.try_get("pushes")?,
            coins: row.try_get("coins")?,
        })
    }
}

const CHAIN_COLUMNS: &str =
    "id, user_id, campaign_id, active, chain, best, wins, losses, pushes, coins, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct ChainStore {
    db_connection: DBConnection,
}

impl ChainStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn get_active_chain(&self, user_id: Uuid) -> Result<Option<Chain>, Error> {
        let chain = sqlx::query_as::<_, Chain>(&format!(
            "SELECT {} FROM chains WHERE user_id = ? AND active = 1",
            CHAIN_COLUMNS
        ))
        .bind(user_id.to_string())
        .fetch_optional(self.db_connection.read())
        .await?;

        Ok(chain)
    }

    /// Chains of a campaign ordered the way the chain title is decided
    pub async fn leaderboard(
        &self,
        campaign_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LeaderboardEntry>, Error> {
        let entries = sqlx::query_as::<_, LeaderboardEntry>(
            "SELECT c.user_id, u.username, c.chain, c.best, c.wins, c.losses, c.pushes, c.coins
            FROM chains c
            JOIN users u ON u.id = c.user_id
            WHERE c.campaign_id = ?
            ORDER BY c.chain DESC, c.wins DESC, c.pushes DESC, c.created_at ASC, c.id ASC
            LIMIT ?",
        )
        .bind(campaign_id.to_string())
        .bind(limit)
        .fetch_all(self.db_connection.read())
        .await?;

        Ok(entries)
    }

    /// Run the fetch-or-create inside its own write
    pub async fn get_or_create_active_chain(
        &self,
        user_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Chain, Error> {
        self.db_connection
            .execute_write(move |pool| async move {
                let mut conn = pool.acquire().await?;
                get_or_create_active_chain(&mut *conn, user_id, campaign_id).await
            })
            .await
    }
}

/// Fetch the user's active chain for `campaign_id`, creating it when missing.
///
/// The insert is ignored when another writer created the chain first, and
/// the re-read then returns theirs.
pub async fn get_or_create_active_chain(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    campaign_id: Uuid,
) -> Result<Chain, Error> {
    if let Some(chain) = fetch_active_chain(conn, user_id).await? {
        return active_in(chain, user_id, campaign_id);
    }

    let now = format_datetime(OffsetDateTime::now_utc())?;
    let inserted = sqlx::query(
        "INSERT INTO chains (id, user_id, campaign_id, active, created_at, updated_at)
        VALUES (?, ?, ?, 1, ?, ?)
        ON CONFLICT DO NOTHING",
    )
    .bind(Uuid::now_v7().to_string())
    .bind(user_id.to_string())
    .bind(campaign_id.to_string())
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    if inserted.rows_affected() > 0 {
        debug!(
            "created chain for user {} in campaign {}",
            user_id, campaign_id
        );
    }

    let chain = fetch_active_chain(conn, user_id)
        .await?
        .ok_or(Error::ChainNotFound(user_id))?;
    active_in(chain, user_id, campaign_id)
}

// An active chain left over from another campaign means rollover did not finish
fn active_in(chain: Chain, user_id: Uuid, campaign_id: Uuid) -> Result<Chain, Error> {
    if chain.campaign_id == campaign_id {
        Ok(chain)
    } else {
        Err(Error::ChainNotFound(user_id))
    }
}

async fn fetch_active_chain(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> Result<Option<Chain>, Error> {
    let chain = sqlx::query_as::<_, Chain>(&format!(
        "SELECT {} FROM chains WHERE user_id = ? AND active = 1",
        CHAIN_COLUMNS
    ))
    .bind(user_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(chain)
}

pub async fn save_tally(
    conn: &mut SqliteConnection,
    chain_id: Uuid,
    tally: &ChainTally,
) -> Result<(), Error> {
    let updated = sqlx::query(
        "UPDATE chains
        SET chain = ?, best = ?, wins = ?, losses = ?, pushes = ?, coins = ?, updated_at = ?
        WHERE id = ? AND active = 1",
    )
    .bind(tally.chain)
    .bind(tally.best)
    .bind(tally.wins)
    .bind(tally.losses)
    .bind(tally.pushes)
    .bind(tally.coins)
    .bind(format_datetime(OffsetDateTime::now_utc())?)
    .bind(chain_id.to_string())
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(Error::ChainNotFound(chain_id));
    }
    Ok(())
}

/// Active chains of a campaign, oldest first
pub async fn campaign_chains(
    conn: &mut SqliteConnection,
    campaign_id: Uuid,
) -> Result<Vec<Chain>, Error> {
    let chains = sqlx::query_as::<_, Chain>(&format!(
        "SELECT {} FROM chains WHERE campaign_id = ? AND active = 1 ORDER BY created_at ASC, id ASC",
        CHAIN_COLUMNS
    ))
    .bind(campaign_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    Ok(chains)
}

pub async fn deactivate_campaign_chains(
    conn: &mut SqliteConnection,
    campaign_id: Uuid,
) -> Result<u64, Error> {
    let updated = sqlx::query(
        "UPDATE chains SET active = 0, updated_at = ? WHERE campaign_id = ? AND active = 1",
    )
    .bind(format_datetime(OffsetDateTime::now_utc())?)
    .bind(campaign_id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(updated.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CampaignStore, UserStore};
    use sqlx::SqlitePool;

    fn connection(pool: SqlitePool) -> DBConnection {
        DBConnection::new_with_pools("test".into(), ":memory:".into(), pool.clone(), pool)
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_get_or_create_is_idempotent(pool: SqlitePool) {
        let db = connection(pool);
        let user = UserStore::new(db.clone())
            .register_user("auth|dana".into(), None, 100)
            .await
            .unwrap();
        let campaign = CampaignStore::new(db.clone())
            .ensure_active_campaign(OffsetDateTime::now_utc())
            .await
            .unwrap();
        let store = ChainStore::new(db);

        assert!(store.get_active_chain(user.id).await.unwrap().is_none());

        let first = store
            .get_or_create_active_chain(user.id, campaign.id)
            .await
            .unwrap();
        let second = store
            .get_or_create_active_chain(user.id, campaign.id)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.tally(), ChainTally::default());
        assert!(store.get_active_chain(user.id).await.unwrap().is_some());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_concurrent_creates_share_one_chain(pool: SqlitePool) {
        let db = connection(pool);
        let user = UserStore::new(db.clone())
            .register_user("auth|erin".into(), None, 100)
            .await
            .unwrap();
        let campaign = CampaignStore::new(db.clone())
            .ensure_active_campaign(OffsetDateTime::now_utc())
            .await
            .unwrap();
        let store = ChainStore::new(db);

        let (a, b) = tokio::join!(
            store.get_or_create_active_chain(user.id, campaign.id),
            store.get_or_create_active_chain(user.id, campaign.id)
        );
        assert_eq!(a.unwrap().id, b.unwrap().id);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_save_tally_and_leaderboard_order(pool: SqlitePool) {
        let db = connection(pool);
        let users = UserStore::new(db.clone());
        let campaign = CampaignStore::new(db.clone())
            .ensure_active_campaign(OffsetDateTime::now_utc())
            .await
            .unwrap();
        let store = ChainStore::new(db.clone());

        for (name, streak) in [("a", 2), ("b", 5), ("c", -1)] {
            let user = users
                .register_user(format!("auth|{}", name), Some(name.into()), 100)
                .await
                .unwrap();
            let chain = store
                .get_or_create_active_chain(user.id, campaign.id)
                .await
                .unwrap();
            let tally = ChainTally {
                chain: streak,
                best: streak.max(0),
                ..Default::default()
            };
            let mut conn = db.write().acquire().await.unwrap();
            save_tally(&mut *conn, chain.id, &tally).await.unwrap();
        }

        let board = store.leaderboard(campaign.id, 10).await.unwrap();
        let order: Vec<_> = board.iter().map(|e| e.username.clone().unwrap()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }
}
