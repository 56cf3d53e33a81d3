use log::{debug, info};
use pickem_core::{
    validate_matchup, validate_teams, MatchupStatus, PickStatus, SettlementRule, TeamSnapshot,
    WinCondition, Winner,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{CreateMatchup, MatchupFilter, UpdateMatchup};
use crate::{
    domain::Error,
    infra::db::{
        format_datetime, is_unique_violation, parse_optional_json, parse_required_datetime,
        parse_required_json, parse_text_enum, parse_uuid, to_json_text, DBConnection,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Matchup {
    pub id: Uuid,
    pub external_game_id: String,
    pub league: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    pub status: MatchupStatus,
    pub home_team: TeamSnapshot,
    pub away_team: TeamSnapshot,
    pub settlement_type: String,
    pub settlement_metadata: Option<Value>,
    pub cost: i64,
    pub featured: bool,
    /// Winning team id or `PUSH`. Recorded by the first settlement attempt,
    /// final once `active` is false.
    pub winner_id: Option<String>,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Matchup {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Matchup {
            id: parse_uuid(row, "id")?,
            external_game_id: row.try_get("external_game_id")?,
            league: row.try_get("league")?,
            start_time: parse_required_datetime(row, "start_time")?,
            status: parse_text_enum(row, "status")?,
            home_team: parse_required_json(row, "home_team")?,
            away_team: parse_required_json(row, "away_team")?,
            settlement_type: row.try_get("settlement_type")?,
            settlement_metadata: parse_optional_json(row, "settlement_metadata")?,
            cost: row.try_get("cost")?,
            featured: row.try_get("featured")?,
            winner_id: row.try_get("winner_id")?,
            active: row.try_get("active")?,
            created_at: parse_required_datetime(row, "created_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        })
    }
}

impl Matchup {
    pub fn rule(&self) -> Result<SettlementRule, Error> {
        SettlementRule::parse(&self.settlement_type, self.settlement_metadata.as_ref())
            .map_err(|e| Error::UndeterminedWinner(self.id, e.to_string()))
    }

    /// Run the matchup's win condition against the given final scores
    pub fn determine_winner(
        &self,
        home: &TeamSnapshot,
        away: &TeamSnapshot,
    ) -> Result<Winner, Error> {
        self.rule()?.winner(home, away).ok_or_else(|| {
            Error::UndeterminedWinner(
                self.id,
                format!(
                    "{} rule has no result for {} {} - {} {}",
                    self.settlement_type, home.id, home.score, away.score, away.id
                ),
            )
        })
    }

    /// Result decided by an earlier settlement attempt that has not finished
    pub fn recorded_winner(&self) -> Option<Winner> {
        self.winner_id.as_deref().map(Winner::from_id)
    }

    pub fn has_scores(&self, home: &TeamSnapshot, away: &TeamSnapshot) -> bool {
        self.home_team.score == home.score && self.away_team.score == away.score
    }

    /// Picks may only be made or cancelled before the matchup locks
    pub fn is_pre_lock(&self, now: OffsetDateTime) -> bool {
        self.active && self.status == MatchupStatus::Scheduled && now < self.start_time
    }

    pub fn ensure_pre_lock(&self, now: OffsetDateTime) -> Result<(), Error> {
        if !self.active {
            return Err(Error::MatchupLocked(self.id));
        }
        if self.status != MatchupStatus::Scheduled || now >= self.start_time {
            return Err(Error::MatchupAlreadyStarted(self.id));
        }
        Ok(())
    }

    pub fn team(&self, team_id: &str) -> Option<&TeamSnapshot> {
        if self.home_team.id == team_id {
            Some(&self.home_team)
        } else if self.away_team.id == team_id {
            Some(&self.away_team)
        } else {
            None
        }
    }
}

const MATCHUP_COLUMNS: &str = "id, external_game_id, league, start_time, status, home_team, away_team,
    settlement_type, settlement_metadata, cost, featured, winner_id, active, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct MatchupStore {
    db_connection: DBConnection,
}

impl MatchupStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn create_matchup(&self, matchup: CreateMatchup) -> Result<Matchup, Error> {
        validate_matchup(
            &matchup.league,
            &matchup.home_team,
            &matchup.away_team,
            matchup.cost,
            &matchup.settlement_type,
            matchup.settlement_metadata.as_ref(),
        )?;

        let matchup_id = Uuid::now_v7();
        let status = matchup.status.unwrap_or(MatchupStatus::Scheduled);
        let external_game_id = matchup.external_game_id.clone();

        self.db_connection
            .execute_write(move |pool| async move {
                let now = format_datetime(OffsetDateTime::now_utc())?;
                let inserted = sqlx::query(
                    "INSERT INTO matchups (
                        id, external_game_id, league, start_time, status, home_team, away_team,
                        settlement_type, settlement_metadata, cost, featured, active,
                        created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
                )
                .bind(matchup_id.to_string())
                .bind(&matchup.external_game_id)
                .bind(&matchup.league)
                .bind(format_datetime(matchup.start_time)?)
                .bind(status.as_str())
                .bind(to_json_text(&matchup.home_team)?)
                .bind(to_json_text(&matchup.away_team)?)
                .bind(&matchup.settlement_type)
                .bind(
                    matchup
                        .settlement_metadata
                        .as_ref()
                        .map(to_json_text)
                        .transpose()?,
                )
                .bind(matchup.cost)
                .bind(matchup.featured)
                .bind(&now)
                .bind(&now)
                .execute(&pool)
                .await;

                match inserted {
                    Ok(_) => Ok(()),
                    Err(e) if is_unique_violation(&e) => Err(Error::BadRequest(format!(
                        "matchup already exists for game {}",
                        matchup.external_game_id
                    ))),
                    Err(e) => Err(Error::DbError(e)),
                }
            })
            .await?;

        info!(
            "created matchup {} for game {}",
            matchup_id, external_game_id
        );
        self.get_matchup(matchup_id).await
    }

    /// Apply a score feed update. Moving to IN_PROGRESS also moves the
    /// matchup's pending picks along.
    pub async fn update_matchup(
        &self,
        matchup_id: Uuid,
        update: UpdateMatchup,
    ) -> Result<Matchup, Error> {
        self.db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;
                let existing = fetch_matchup(&mut *tx, matchup_id).await?;
                if !existing.active {
                    return Err(Error::MatchupAlreadySettled(matchup_id));
                }

                let home_team = update.home_team.unwrap_or(existing.home_team.clone());
                let away_team = update.away_team.unwrap_or(existing.away_team.clone());
                if home_team.id != existing.home_team.id || away_team.id != existing.away_team.id
                {
                    return Err(Error::BadRequest(format!(
                        "matchup {} teams cannot change once created",
                        matchup_id
                    )));
                }
                validate_teams(&home_team, &away_team)?;

                let status = update.status.unwrap_or(existing.status);
                let result_locked =
                    existing.status == MatchupStatus::Final || existing.winner_id.is_some();
                if result_locked
                    && (status != existing.status || !existing.has_scores(&home_team, &away_team))
                {
                    return Err(Error::ResultConflict(matchup_id));
                }
                let start_time = update.start_time.unwrap_or(existing.start_time);
                let featured = update.featured.unwrap_or(existing.featured);
                let now = format_datetime(OffsetDateTime::now_utc())?;

                sqlx::query(
                    "UPDATE matchups
                    SET status = ?, home_team = ?, away_team = ?, start_time = ?, featured = ?,
                        updated_at = ?
                    WHERE id = ?",
                )
                .bind(status.as_str())
                .bind(to_json_text(&home_team)?)
                .bind(to_json_text(&away_team)?)
                .bind(format_datetime(start_time)?)
                .bind(featured)
                .bind(&now)
                .bind(matchup_id.to_string())
                .execute(&mut *tx)
                .await?;

                if status == MatchupStatus::InProgress && existing.status != status {
                    let started = sqlx::query(
                        "UPDATE picks SET status = ?, updated_at = ?
                        WHERE matchup_id = ? AND active = 1 AND status = ?",
                    )
                    .bind(PickStatus::InProgress.as_str())
                    .bind(&now)
                    .bind(matchup_id.to_string())
                    .bind(PickStatus::Pending.as_str())
                    .execute(&mut *tx)
                    .await?;
                    debug!(
                        "matchup {} started, {} picks now in progress",
                        matchup_id,
                        started.rows_affected()
                    );
                }

                tx.commit().await?;
                Ok::<_, Error>(())
            })
            .await?;

        self.get_matchup(matchup_id).await
    }

    pub async fn get_matchup(&self, matchup_id: Uuid) -> Result<Matchup, Error> {
        let matchup = sqlx::query_as::<_, Matchup>(&format!(
            "SELECT {} FROM matchups WHERE id = ?",
            MATCHUP_COLUMNS
        ))
        .bind(matchup_id.to_string())
        .fetch_optional(self.db_connection.read())
        .await?;

        matchup.ok_or(Error::MatchupNotFound(matchup_id))
    }

    pub async fn list_matchups(&self, filter: MatchupFilter) -> Result<Vec<Matchup>, Error> {
        let matchups = sqlx::query_as::<_, Matchup>(&format!(
            "SELECT {} FROM matchups
            WHERE (? IS NULL OR league = ?) AND (? IS NULL OR active = ?)
            ORDER BY start_time ASC",
            MATCHUP_COLUMNS
        ))
        .bind(&filter.league)
        .bind(&filter.league)
        .bind(filter.active)
        .bind(filter.active)
        .fetch_all(self.db_connection.read())
        .await?;

        Ok(matchups)
    }

    /// Matchups the score feed has marked FINAL that have not been settled yet
    pub async fn get_final_unsettled(&self) -> Result<Vec<Matchup>, Error> {
        let matchups = sqlx::query_as::<_, Matchup>(&format!(
            "SELECT {} FROM matchups WHERE active = 1 AND status = ? ORDER BY start_time ASC",
            MATCHUP_COLUMNS
        ))
        .bind(MatchupStatus::Final.as_str())
        .fetch_all(self.db_connection.read())
        .await?;

        Ok(matchups)
    }
}

pub async fn fetch_matchup(
    conn: &mut SqliteConnection,
    matchup_id: Uuid,
) -> Result<Matchup, Error> {
    let matchup = sqlx::query_as::<_, Matchup>(&format!(
        "SELECT {} FROM matchups WHERE id = ?",
        MATCHUP_COLUMNS
    ))
    .bind(matchup_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    matchup.ok_or(Error::MatchupNotFound(matchup_id))
}

/// Persist the final scores and the winner they decide ahead of settling
/// picks. Later attempts reuse the recorded winner instead of deciding again.
pub async fn record_final_result(
    conn: &mut SqliteConnection,
    matchup_id: Uuid,
    home_team: &TeamSnapshot,
    away_team: &TeamSnapshot,
    winner: &Winner,
) -> Result<(), Error> {
    let updated = sqlx::query(
        "UPDATE matchups SET home_team = ?, away_team = ?, status = ?, winner_id = ?, updated_at = ?
        WHERE id = ? AND active = 1 AND winner_id IS NULL",
    )
    .bind(to_json_text(home_team)?)
    .bind(to_json_text(away_team)?)
    .bind(MatchupStatus::Final.as_str())
    .bind(winner.as_id())
    .bind(format_datetime(OffsetDateTime::now_utc())?)
    .bind(matchup_id.to_string())
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(Error::ResultConflict(matchup_id));
    }
    Ok(())
}

/// Terminal patch, applied once every pick on the matchup has settled
pub async fn mark_settled(
    conn: &mut SqliteConnection,
    matchup_id: Uuid,
    winner: &Winner,
) -> Result<(), Error> {
    let updated = sqlx::query(
        "UPDATE matchups SET status = ?, active = 0, featured = 0, winner_id = ?, updated_at = ?
        WHERE id = ? AND active = 1 AND (winner_id IS NULL OR winner_id = ?)",
    )
    .bind(MatchupStatus::Final.as_str())
    .bind(winner.as_id())
    .bind(format_datetime(OffsetDateTime::now_utc())?)
    .bind(matchup_id.to_string())
    .bind(winner.as_id())
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(Error::MatchupAlreadySettled(matchup_id));
    }
    Ok(())
}
