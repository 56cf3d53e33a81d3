use pickem_core::{PickOutcome, PickStatus, TeamSnapshot};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    domain::Error,
    infra::db::{
        format_datetime, is_unique_violation, parse_required_datetime, parse_required_json,
        parse_text_enum, parse_uuid, to_json_text, DBConnection,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakePick {
    pub matchup_id: Uuid,
    /// Id of the home or away team
    pub team_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pick {
    pub id: Uuid,
    pub user_id: Uuid,
    pub matchup_id: Uuid,
    pub campaign_id: Uuid,
    pub pick_team: TeamSnapshot,
    pub status: PickStatus,
    /// Wager while active, signed result once settled
    pub coins: i64,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Pick {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Pick {
            id: parse_uuid(row, "id")?,
            user_id: parse_uuid(row, "user_id")?,
            matchup_id: parse_uuid(row, "matchup_id")?,
            campaign_id: parse_uuid(row, "campaign_id")?,
            pick_team: parse_required_json(row, "pick_team")?,
            status: parse_text_enum(row, "status")?,
            coins: row.try_get("coins")?,
            active: row.try_get("active")?,
            created_at: parse_required_datetime(row, "created_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        })
    }
}

const PICK_COLUMNS: &str =
    "id, user_id, matchup_id, campaign_id, pick_team, status, coins, active, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PickStore {
    db_connection: DBConnection,
}

impl PickStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn get_pick(&self, pick_id: Uuid) -> Result<Pick, Error> {
        let pick = sqlx::query_as::<_, Pick>(&format!(
            "SELECT {} FROM picks WHERE id = ?",
            PICK_COLUMNS
        ))
        .bind(pick_id.to_string())
        .fetch_optional(self.db_connection.read())
        .await?;

        pick.ok_or(Error::PickNotFound(pick_id))
    }

    pub async fn get_active_pick(&self, user_id: Uuid) -> Result<Option<Pick>, Error> {
        let pick = sqlx::query_as::<_, Pick>(&format!(
            "SELECT {} FROM picks WHERE user_id = ? AND active = 1",
            PICK_COLUMNS
        ))
        .bind(user_id.to_string())
        .fetch_optional(self.db_connection.read())
        .await?;

        Ok(pick)
    }

    pub async fn get_user_picks(&self, user_id: Uuid, limit: i64) -> Result<Vec<Pick>, Error> {
        let picks = sqlx::query_as::<_, Pick>(&format!(
            "SELECT {} FROM picks WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            PICK_COLUMNS
        ))
        .bind(user_id.to_string())
        .bind(limit)
        .fetch_all(self.db_connection.read())
        .await?;

        Ok(picks)
    }

    pub async fn get_active_picks_for_matchup(&self, matchup_id: Uuid) -> Result<Vec<Pick>, Error> {
        let picks = sqlx::query_as::<_, Pick>(&format!(
            "SELECT {} FROM picks WHERE matchup_id = ? AND active = 1 ORDER BY created_at ASC",
            PICK_COLUMNS
        ))
        .bind(matchup_id.to_string())
        .fetch_all(self.db_connection.read())
        .await?;

        Ok(picks)
    }
}

pub async fn fetch_pick(conn: &mut SqliteConnection, pick_id: Uuid) -> Result<Pick, Error> {
    let pick = sqlx::query_as::<_, Pick>(&format!(
        "SELECT {} FROM picks WHERE id = ?",
        PICK_COLUMNS
    ))
    .bind(pick_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    pick.ok_or(Error::PickNotFound(pick_id))
}

pub async fn fetch_active_pick(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> Result<Option<Pick>, Error> {
    let pick = sqlx::query_as::<_, Pick>(&format!(
        "SELECT {} FROM picks WHERE user_id = ? AND active = 1",
        PICK_COLUMNS
    ))
    .bind(user_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(pick)
}

/// Insert a new PENDING pick holding `coins` as its wager. The partial unique
/// index on active picks turns a racing second pick into `ExistingPickFound`.
pub async fn insert_pick(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    matchup_id: Uuid,
    campaign_id: Uuid,
    pick_team: &TeamSnapshot,
    coins: i64,
) -> Result<Uuid, Error> {
    let pick_id = Uuid::now_v7();
    let now = format_datetime(OffsetDateTime::now_utc())?;

    let inserted = sqlx::query(
        "INSERT INTO picks (
            id, user_id, matchup_id, campaign_id, pick_team, status, coins, active,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(pick_id.to_string())
    .bind(user_id.to_string())
    .bind(matchup_id.to_string())
    .bind(campaign_id.to_string())
    .bind(to_json_text(pick_team)?)
    .bind(PickStatus::Pending.as_str())
    .bind(coins)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await;

    match inserted {
        Ok(_) => Ok(pick_id),
        Err(e) if is_unique_violation(&e) => {
            let existing = fetch_active_pick(conn, user_id).await?;
            Err(Error::ExistingPickFound(
                existing.map(|pick| pick.id).unwrap_or(pick_id),
            ))
        }
        Err(e) => Err(Error::DbError(e)),
    }
}

pub async fn delete_pick(conn: &mut SqliteConnection, pick_id: Uuid) -> Result<(), Error> {
    let deleted = sqlx::query("DELETE FROM picks WHERE id = ? AND active = 1")
        .bind(pick_id.to_string())
        .execute(&mut *conn)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(Error::PickAlreadySettled(pick_id));
    }
    Ok(())
}

/// Write the terminal state of a pick. Only an active pick can be settled,
/// so a second settlement of the same pick fails instead of double counting.
pub async fn settle_pick(
    conn: &mut SqliteConnection,
    pick_id: Uuid,
    outcome: PickOutcome,
    coins: i64,
) -> Result<(), Error> {
    let updated = sqlx::query(
        "UPDATE picks SET status = ?, coins = ?, active = 0, updated_at = ?
        WHERE id = ? AND active = 1",
    )
    .bind(outcome.status().as_str())
    .bind(coins)
    .bind(format_datetime(OffsetDateTime::now_utc())?)
    .bind(pick_id.to_string())
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(Error::PickAlreadySettled(pick_id));
    }
    Ok(())
}
