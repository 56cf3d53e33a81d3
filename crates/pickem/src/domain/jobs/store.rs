use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};
use time::OffsetDateTime;

use super::Job;
use crate::{
    domain::Error,
    infra::db::{format_datetime, parse_required_json, to_json_text, DBConnection},
};

/// A job waiting in the `jobs` table
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: i64,
    pub job: Job,
    pub attempts: i64,
}

impl FromRow<'_, SqliteRow> for QueuedJob {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(QueuedJob {
            id: row.try_get("id")?,
            job: parse_required_json(row, "payload")?,
            attempts: row.try_get("attempts")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct JobStore {
    db_connection: DBConnection,
}

impl JobStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    /// Oldest jobs after `after_id`, in the order they were written
    pub async fn pending(&self, after_id: i64, limit: i64) -> Result<Vec<QueuedJob>, Error> {
        let jobs = sqlx::query_as::<_, QueuedJob>(
            "SELECT id, payload, attempts FROM jobs WHERE id > ? ORDER BY id LIMIT ?",
        )
        .bind(after_id)
        .bind(limit)
        .fetch_all(self.db_connection.read())
        .await?;

        Ok(jobs)
    }

    pub async fn count(&self) -> Result<i64, Error> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(self.db_connection.read())
            .await?;
        Ok(count)
    }

    pub async fn complete(&self, job_id: i64) -> Result<(), Error> {
        self.db_connection
            .execute_write(move |pool| async move {
                sqlx::query("DELETE FROM jobs WHERE id = ?")
                    .bind(job_id)
                    .execute(&pool)
                    .await?;
                Ok::<_, Error>(())
            })
            .await?;
        Ok(())
    }

    pub async fn record_failure(&self, job_id: i64, error: String) -> Result<(), Error> {
        self.db_connection
            .execute_write(move |pool| async move {
                sqlx::query("UPDATE jobs SET attempts = attempts + 1, last_error = ? WHERE id = ?")
                    .bind(error)
                    .bind(job_id)
                    .execute(&pool)
                    .await?;
                Ok::<_, Error>(())
            })
            .await?;
        Ok(())
    }
}

/// Queue a job inside the caller's transaction
pub async fn insert_job(conn: &mut SqliteConnection, job: &Job) -> Result<i64, Error> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO jobs (kind, payload, created_at) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(job.name())
    .bind(to_json_text(job)?)
    .bind(format_datetime(OffsetDateTime::now_utc())?)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}
