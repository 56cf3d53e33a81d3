use async_trait::async_trait;
use log::info;
use pickem_core::{AchievementKind, TransactionType};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    domain::{add_coins, Error},
    infra::db::{format_datetime, parse_required_datetime, parse_text_enum, parse_uuid, DBConnection},
};

/// Decides and grants achievements after picks settle and campaigns close
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AchievementEvaluator: Send + Sync {
    /// Grant whatever the user's record now qualifies for. Returns the new grants.
    async fn evaluate_pick(
        &self,
        user_id: Uuid,
        pick_id: Uuid,
    ) -> Result<Vec<AchievementKind>, Error>;

    /// Grant `kind` once per `(user, kind, reference)`. Returns false when already held.
    async fn grant(
        &self,
        user_id: Uuid,
        kind: AchievementKind,
        reference_id: Option<Uuid>,
    ) -> Result<bool, Error>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Achievement {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: AchievementKind,
    /// Campaign for the champion titles
    pub reference_id: Option<Uuid>,
    pub coins: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Achievement {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let reference: String = row.try_get("reference_id")?;
        let reference_id = if reference.is_empty() {
            None
        } else {
            Some(
                Uuid::parse_str(&reference).map_err(|e| sqlx::Error::ColumnDecode {
                    index: "reference_id".to_string(),
                    source: Box::new(e),
                })?,
            )
        };

        Ok(Achievement {
            id: parse_uuid(row, "id")?,
            user_id: parse_uuid(row, "user_id")?,
            kind: parse_text_enum(row, "kind")?,
            reference_id,
            coins: row.try_get("coins")?,
            created_at: parse_required_datetime(row, "created_at")?,
        })
    }
}

/// Record-based achievements a user qualifies for
pub fn earned_kinds(wins: i64, best_streak: i64) -> Vec<AchievementKind> {
    let mut kinds = vec![];
    if wins >= 1 {
        kinds.push(AchievementKind::FirstWin);
    }
    if best_streak >= 5 {
        kinds.push(AchievementKind::Streak5);
    }
    if best_streak >= 10 {
        kinds.push(AchievementKind::Streak10);
    }
    if wins >= 25 {
        kinds.push(AchievementKind::Wins25);
    }
    kinds
}

#[derive(Debug, Clone)]
pub struct AchievementStore {
    db_connection: DBConnection,
}

impl AchievementStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn list_achievements(&self, user_id: Uuid) -> Result<Vec<Achievement>, Error> {
        let achievements = sqlx::query_as::<_, Achievement>(
            "SELECT id, user_id, kind, reference_id, coins, created_at
            FROM achievements
            WHERE user_id = ?
            ORDER BY created_at ASC, id ASC",
        )
        .bind(user_id.to_string())
        .fetch_all(self.db_connection.read())
        .await?;

        Ok(achievements)
    }
}

#[async_trait]
impl AchievementEvaluator for AchievementStore {
    async fn evaluate_pick(
        &self,
        user_id: Uuid,
        pick_id: Uuid,
    ) -> Result<Vec<AchievementKind>, Error> {
        let record: Option<(i64, i64)> = sqlx::query_as(
            "SELECT u.wins, COALESCE((SELECT MAX(best) FROM chains WHERE user_id = u.id), 0)
            FROM users u
            WHERE u.id = ?",
        )
        .bind(user_id.to_string())
        .fetch_optional(self.db_connection.read())
        .await?;
        let (wins, best) = record.ok_or_else(|| Error::UserNotFound(user_id.to_string()))?;

        let mut granted = vec![];
        for kind in earned_kinds(wins, best) {
            if self.grant(user_id, kind, None).await? {
                granted.push(kind);
            }
        }
        if !granted.is_empty() {
            info!(
                "pick {} earned user {} achievements {:?}",
                pick_id, user_id, granted
            );
        }
        Ok(granted)
    }

    async fn grant(
        &self,
        user_id: Uuid,
        kind: AchievementKind,
        reference_id: Option<Uuid>,
    ) -> Result<bool, Error> {
        self.db_connection
            .execute_write(move |pool| async move {
                let achievement_id = Uuid::now_v7();
                let reward = kind.reward();
                let mut tx = pool.begin().await?;

                let inserted = sqlx::query(
                    "INSERT INTO achievements (id, user_id, kind, reference_id, coins, created_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    ON CONFLICT (user_id, kind, reference_id) DO NOTHING",
                )
                .bind(achievement_id.to_string())
                .bind(user_id.to_string())
                .bind(kind.as_str())
                .bind(reference_id.map(|id| id.to_string()).unwrap_or_default())
                .bind(reward)
                .bind(format_datetime(OffsetDateTime::now_utc())?)
                .execute(&mut *tx)
                .await?;

                if inserted.rows_affected() == 0 {
                    return Ok::<_, Error>(false);
                }

                add_coins(
                    &mut *tx,
                    user_id,
                    reward,
                    TransactionType::Achievement,
                    Some(achievement_id),
                )
                .await?;
                tx.commit().await?;
                info!("granted {} to user {} for {} coins", kind, user_id, reward);
                Ok(true)
            })
            .await
    }
}
