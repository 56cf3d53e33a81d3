use log::info;
use pickem_core::TransactionType;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    domain::{add_coins, Error},
    infra::db::{
        format_datetime, is_unique_violation, parse_optional_uuid, parse_required_datetime,
        parse_uuid, DBConnection,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Id handed to us by the identity provider
    pub external_id: String,
    pub username: Option<String>,
    pub coins: i64,
    pub squad_id: Option<Uuid>,
    pub wins: i64,
    pub losses: i64,
    pub pushes: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for User {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(User {
            id: parse_uuid(row, "id")?,
            external_id: row.try_get("external_id")?,
            username: row.try_get("username")?,
            coins: row.try_get("coins")?,
            squad_id: parse_optional_uuid(row, "squad_id")?,
            wins: row.try_get("wins")?,
            losses: row.try_get("losses")?,
            pushes: row.try_get("pushes")?,
            created_at: parse_required_datetime(row, "created_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        })
    }
}

const USER_COLUMNS: &str =
    "id, external_id, username, coins, squad_id, wins, losses, pushes, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct UserStore {
    db_connection: DBConnection,
}

impl UserStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        self.db_connection.ping().await
    }

    /// Create the user for `external_id`, seeding the balance through the ledger.
    /// Registering an id that already exists returns the existing user.
    pub async fn register_user(
        &self,
        external_id: String,
        username: Option<String>,
        starting_coins: i64,
    ) -> Result<User, Error> {
        if external_id.trim().is_empty() {
            return Err(Error::BadRequest("external id must not be empty".into()));
        }

        let lookup_id = external_id.clone();
        let created = self
            .db_connection
            .execute_write(move |pool| async move {
                let now = format_datetime(OffsetDateTime::now_utc())?;
                let user_id = Uuid::now_v7();
                let mut tx = pool.begin().await?;

                let inserted = sqlx::query(
                    "INSERT INTO users (id, external_id, username, coins, created_at, updated_at)
                    VALUES (?, ?, ?, 0, ?, ?)",
                )
                .bind(user_id.to_string())
                .bind(&external_id)
                .bind(&username)
                .bind(&now)
                .bind(&now)
                .execute(&mut *tx)
                .await;

                match inserted {
                    Ok(_) => {}
                    Err(e) if is_unique_violation(&e) => return Ok::<_, Error>(false),
                    Err(e) => return Err(e.into()),
                }

                if starting_coins > 0 {
                    add_coins(
                        &mut *tx,
                        user_id,
                        starting_coins,
                        TransactionType::Admin,
                        None,
                    )
                    .await?;
                }

                tx.commit().await?;
                Ok(true)
            })
            .await?;

        let user = self.get_user_by_external_id(&lookup_id).await?;
        if created {
            info!(
                "registered user {} for external id {}",
                user.id, user.external_id
            );
        }
        Ok(user)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(user_id.to_string())
        .fetch_optional(self.db_connection.read())
        .await?;

        user.ok_or_else(|| Error::UserNotFound(user_id.to_string()))
    }

    pub async fn get_user_by_external_id(&self, external_id: &str) -> Result<User, Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE external_id = ?",
            USER_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(self.db_connection.read())
        .await?;

        user.ok_or_else(|| Error::UserNotFound(external_id.to_string()))
    }

    pub async fn join_squad(&self, user_id: Uuid, squad_id: Option<Uuid>) -> Result<User, Error> {
        let rows_affected = self
            .db_connection
            .execute_write(move |pool| async move {
                let result =
                    sqlx::query("UPDATE users SET squad_id = ?, updated_at = ? WHERE id = ?")
                        .bind(squad_id.map(|id| id.to_string()))
                        .bind(format_datetime(OffsetDateTime::now_utc())?)
                        .bind(user_id.to_string())
                        .execute(&pool)
                        .await?;
                Ok::<_, Error>(result.rows_affected())
            })
            .await?;

        if rows_affected == 0 {
            return Err(Error::UserNotFound(user_id.to_string()));
        }

        self.get_user(user_id).await
    }
}

/// Read a user inside an open transaction
pub async fn fetch_user(conn: &mut SqliteConnection, user_id: Uuid) -> Result<User, Error> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE id = ?",
        USER_COLUMNS
    ))
    .bind(user_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    user.ok_or_else(|| Error::UserNotFound(user_id.to_string()))
}
