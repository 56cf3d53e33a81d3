//! Coin balance and the append-only transaction log behind it

use log::debug;
use pickem_core::{PickOutcome, TransactionType};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    domain::Error,
    infra::db::{
        format_datetime, parse_optional_uuid, parse_required_datetime, parse_text_enum, parse_uuid,
        DBConnection,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Signed, negative for debits
    pub amount: i64,
    pub transaction_type: TransactionType,
    pub reference_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for CoinTransaction {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(CoinTransaction {
            id: parse_uuid(row, "id")?,
            user_id: parse_uuid(row, "user_id")?,
            amount: row.try_get("amount")?,
            transaction_type: parse_text_enum(row, "transaction_type")?,
            reference_id: parse_optional_uuid(row, "reference_id")?,
            created_at: parse_required_datetime(row, "created_at")?,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeagueStats {
    pub league: String,
    pub wins: i64,
    pub losses: i64,
    pub pushes: i64,
}

impl FromRow<'_, SqliteRow> for LeagueStats {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(LeagueStats {
            league: row.try_get("league")?,
            wins: row.try_get("wins")?,
            losses: row.try_get("losses")?,
            pushes: row.try_get("pushes")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LedgerStore {
    db_connection: DBConnection,
}

impl LedgerStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn get_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CoinTransaction>, Error> {
        let transactions = sqlx::query_as::<_, CoinTransaction>(
            "SELECT id, user_id, amount, transaction_type, reference_id, created_at
            FROM coin_transactions
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?",
        )
        .bind(user_id.to_string())
        .bind(limit)
        .fetch_all(self.db_connection.read())
        .await?;

        Ok(transactions)
    }

    pub async fn get_league_stats(&self, user_id: Uuid) -> Result<Vec<LeagueStats>, Error> {
        let stats = sqlx::query_as::<_, LeagueStats>(
            "SELECT league, wins, losses, pushes
            FROM league_stats
            WHERE user_id = ?
            ORDER BY league",
        )
        .bind(user_id.to_string())
        .fetch_all(self.db_connection.read())
        .await?;

        Ok(stats)
    }
}

/// Credit `amount` coins and log the entry. Returns the new balance.
pub async fn add_coins(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    amount: i64,
    transaction_type: TransactionType,
    reference_id: Option<Uuid>,
) -> Result<i64, Error> {
    move_coins(conn, user_id, amount, transaction_type, reference_id).await
}

/// Debit `amount` coins and log the entry. Returns the new balance.
pub async fn subtract_coins(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    amount: i64,
    transaction_type: TransactionType,
    reference_id: Option<Uuid>,
) -> Result<i64, Error> {
    move_coins(conn, user_id, -amount, transaction_type, reference_id).await
}

async fn move_coins(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    amount: i64,
    transaction_type: TransactionType,
    reference_id: Option<Uuid>,
) -> Result<i64, Error> {
    let now = format_datetime(OffsetDateTime::now_utc())?;

    let balance: Option<i64> = sqlx::query_scalar(
        "UPDATE users SET coins = coins + ?, updated_at = ? WHERE id = ? RETURNING coins",
    )
    .bind(amount)
    .bind(&now)
    .bind(user_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    let balance = balance.ok_or_else(|| Error::UserNotFound(user_id.to_string()))?;

    sqlx::query(
        "INSERT INTO coin_transactions (id, user_id, amount, transaction_type, reference_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::now_v7().to_string())
    .bind(user_id.to_string())
    .bind(amount)
    .bind(transaction_type.as_str())
    .bind(reference_id.map(|id| id.to_string()))
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    debug!(
        "moved {} coins for user {} ({}), balance now {}",
        amount,
        user_id,
        transaction_type.as_str(),
        balance
    );
    Ok(balance)
}

/// Bump the user's lifetime tally and the per-league tally for one settled pick
pub async fn record_result(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    league: &str,
    outcome: PickOutcome,
) -> Result<(), Error> {
    let (wins, losses, pushes) = match outcome {
        PickOutcome::Win => (1, 0, 0),
        PickOutcome::Loss => (0, 1, 0),
        PickOutcome::Push => (0, 0, 1),
    };

    let updated = sqlx::query(
        "UPDATE users
        SET wins = wins + ?, losses = losses + ?, pushes = pushes + ?, updated_at = ?
        WHERE id = ?",
    )
    .bind(wins)
    .bind(losses)
    .bind(pushes)
    .bind(format_datetime(OffsetDateTime::now_utc())?)
    .bind(user_id.to_string())
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(Error::UserNotFound(user_id.to_string()));
    }

    sqlx::query(
        "INSERT INTO league_stats (user_id, league, wins, losses, pushes)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (user_id, league) DO UPDATE SET
            wins = wins + excluded.wins,
            losses = losses + excluded.losses,
            pushes = pushes + excluded.pushes",
    )
    .bind(user_id.to_string())
    .bind(league)
    .bind(wins)
    .bind(losses)
    .bind(pushes)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserStore;
    use sqlx::SqlitePool;

    fn connection(pool: SqlitePool) -> DBConnection {
        DBConnection::new_with_pools("test".into(), ":memory:".into(), pool.clone(), pool)
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_moves_are_logged_with_signed_amounts(pool: SqlitePool) {
        let users = UserStore::new(connection(pool.clone()));
        let ledger = LedgerStore::new(connection(pool.clone()));
        let user = users
            .register_user("auth|ivy".into(), None, 20)
            .await
            .unwrap();
        let pick_id = Uuid::now_v7();

        let mut conn = pool.acquire().await.unwrap();
        let balance = add_coins(&mut conn, user.id, 30, TransactionType::Achievement, None)
            .await
            .unwrap();
        assert_eq!(balance, 50);
        let balance = subtract_coins(&mut conn, user.id, 15, TransactionType::Pick, Some(pick_id))
            .await
            .unwrap();
        assert_eq!(balance, 35);

        let transactions = ledger.get_transactions(user.id, 10).await.unwrap();
        assert_eq!(transactions.len(), 3);
        assert_eq!(transactions[0].amount, -15);
        assert_eq!(transactions[0].transaction_type, TransactionType::Pick);
        assert_eq!(transactions[0].reference_id, Some(pick_id));
        assert_eq!(transactions[1].amount, 30);
        assert_eq!(transactions[1].transaction_type, TransactionType::Achievement);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_unknown_user_writes_nothing(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let missing = Uuid::now_v7();

        let err = add_coins(&mut conn, missing, 10, TransactionType::Admin, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UserNotFound(_)));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM coin_transactions")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_record_result_tallies_per_league(pool: SqlitePool) {
        let users = UserStore::new(connection(pool.clone()));
        let ledger = LedgerStore::new(connection(pool.clone()));
        let user = users
            .register_user("auth|jay".into(), None, 0)
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        record_result(&mut conn, user.id, "NBA", PickOutcome::Win).await.unwrap();
        record_result(&mut conn, user.id, "NBA", PickOutcome::Loss).await.unwrap();
        record_result(&mut conn, user.id, "NFL", PickOutcome::Push).await.unwrap();

        let stats = ledger.get_league_stats(user.id).await.unwrap();
        assert_eq!(
            stats,
            vec![
                LeagueStats {
                    league: "NBA".into(),
                    wins: 1,
                    losses: 1,
                    pushes: 0,
                },
                LeagueStats {
                    league: "NFL".into(),
                    wins: 0,
                    losses: 0,
                    pushes: 1,
                },
            ]
        );

        let user = users.get_user(user.id).await.unwrap();
        assert_eq!((user.wins, user.losses, user.pushes), (1, 1, 1));
    }
}
