use async_trait::async_trait;
use log::debug;
use pickem_core::PickOutcome;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    domain::Error,
    infra::db::{format_datetime, is_unique_violation, parse_required_datetime, parse_uuid, DBConnection},
};

/// Receives the result of every settled pick made by a squad member
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SquadAggregator: Send + Sync {
    async fn record_result(&self, squad_id: Uuid, outcome: PickOutcome) -> Result<(), Error>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Squad {
    pub id: Uuid,
    pub name: String,
    pub wins: i64,
    pub losses: i64,
    pub pushes: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Squad {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Squad {
            id: parse_uuid(row, "id")?,
            name: row.try_get("name")?,
            wins: row.try_get("wins")?,
            losses: row.try_get("losses")?,
            pushes: row.try_get("pushes")?,
            created_at: parse_required_datetime(row, "created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SquadStore {
    db_connection: DBConnection,
}

impl SquadStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn create_squad(&self, name: String) -> Result<Squad, Error> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(Error::BadRequest("squad name must not be empty".into()));
        }

        let squad_id = Uuid::now_v7();
        let squad_name = name.clone();
        self.db_connection
            .execute_write(move |pool| async move {
                let inserted = sqlx::query(
                    "INSERT INTO squads (id, name, created_at) VALUES (?, ?, ?)",
                )
                .bind(squad_id.to_string())
                .bind(&squad_name)
                .bind(format_datetime(OffsetDateTime::now_utc())?)
                .execute(&pool)
                .await;

                match inserted {
                    Ok(_) => Ok(()),
                    Err(e) if is_unique_violation(&e) => Err(Error::BadRequest(format!(
                        "squad name already taken: {}",
                        squad_name
                    ))),
                    Err(e) => Err(Error::DbError(e)),
                }
            })
            .await?;

        self.get_squad(squad_id).await
    }

    pub async fn get_squad(&self, squad_id: Uuid) -> Result<Squad, Error> {
        let squad = sqlx::query_as::<_, Squad>(
            "SELECT id, name, wins, losses, pushes, created_at FROM squads WHERE id = ?",
        )
        .bind(squad_id.to_string())
        .fetch_optional(self.db_connection.read())
        .await?;

        squad.ok_or_else(|| Error::BadRequest(format!("squad not found: {}", squad_id)))
    }
}

#[async_trait]
impl SquadAggregator for SquadStore {
    async fn record_result(&self, squad_id: Uuid, outcome: PickOutcome) -> Result<(), Error> {
        let (wins, losses, pushes) = match outcome {
            PickOutcome::Win => (1, 0, 0),
            PickOutcome::Loss => (0, 1, 0),
            PickOutcome::Push => (0, 0, 1),
        };

        let rows_affected = self
            .db_connection
            .execute_write(move |pool| async move {
                let result = sqlx::query(
                    "UPDATE squads
                    SET wins = wins + ?, losses = losses + ?, pushes = pushes + ?
                    WHERE id = ?",
                )
                .bind(wins)
                .bind(losses)
                .bind(pushes)
                .bind(squad_id.to_string())
                .execute(&pool)
                .await?;
                Ok::<_, Error>(result.rows_affected())
            })
            .await?;

        if rows_affected == 0 {
            return Err(Error::BadRequest(format!("squad not found: {}", squad_id)));
        }
        debug!("recorded {} for squad {}", outcome, squad_id);
        Ok(())
    }
}
