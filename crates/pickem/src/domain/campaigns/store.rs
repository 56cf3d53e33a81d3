use log::info;
use pickem_core::CampaignType;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};
use time::{util::days_in_year_month, Duration, OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::{
    domain::Error,
    infra::db::{
        format_datetime, parse_optional_uuid, parse_required_datetime, parse_text_enum, parse_uuid,
        DBConnection,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub campaign_type: CampaignType,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    /// Exclusive
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    pub chain_winner_id: Option<Uuid>,
    pub win_winner_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Campaign {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Campaign {
            id: parse_uuid(row, "id")?,
            name: row.try_get("name")?,
            campaign_type: parse_text_enum(row, "campaign_type")?,
            active: row.try_get("active")?,
            start_time: parse_required_datetime(row, "start_time")?,
            end_time: parse_required_datetime(row, "end_time")?,
            chain_winner_id: parse_optional_uuid(row, "chain_winner_id")?,
            win_winner_id: parse_optional_uuid(row, "win_winner_id")?,
            created_at: parse_required_datetime(row, "created_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        })
    }
}

impl Campaign {
    pub fn has_ended(&self, now: OffsetDateTime) -> bool {
        now >= self.end_time
    }
}

/// `[first of the month 00:00 UTC, first of the next month 00:00 UTC)` around `at`
pub fn month_bounds(at: OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
    let date = at.to_offset(UtcOffset::UTC).date();
    let first = date - Duration::days(i64::from(date.day()) - 1);
    let next = first + Duration::days(i64::from(days_in_year_month(first.year(), first.month())));
    (first.midnight().assume_utc(), next.midnight().assume_utc())
}

pub fn campaign_name(start: OffsetDateTime) -> String {
    format!("{} {}", start.month(), start.year())
}

const CAMPAIGN_COLUMNS: &str = "id, name, campaign_type, active, start_time, end_time,
    chain_winner_id, win_winner_id, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct CampaignStore {
    db_connection: DBConnection,
}

impl CampaignStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn get_active_campaign(&self) -> Result<Campaign, Error> {
        let campaign = sqlx::query_as::<_, Campaign>(&format!(
            "SELECT {} FROM campaigns WHERE campaign_type = ? AND active = 1",
            CAMPAIGN_COLUMNS
        ))
        .bind(CampaignType::Global.as_str())
        .fetch_optional(self.db_connection.read())
        .await?;

        campaign.ok_or(Error::CampaignNotFound)
    }

    pub async fn get_campaign(&self, campaign_id: Uuid) -> Result<Campaign, Error> {
        let campaign = sqlx::query_as::<_, Campaign>(&format!(
            "SELECT {} FROM campaigns WHERE id = ?",
            CAMPAIGN_COLUMNS
        ))
        .bind(campaign_id.to_string())
        .fetch_optional(self.db_connection.read())
        .await?;

        campaign.ok_or(Error::CampaignNotFound)
    }

    /// Return the active campaign, opening one for the month of `now` if none exists
    pub async fn ensure_active_campaign(&self, now: OffsetDateTime) -> Result<Campaign, Error> {
        self.db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;
                if let Some(campaign) = find_active_campaign(&mut *tx).await? {
                    return Ok::<_, Error>(campaign);
                }

                let (start, end) = month_bounds(now);
                let campaign = insert_campaign(&mut *tx, start, end).await?;
                tx.commit().await?;
                info!(
                    "opened campaign {} ({}) running until {}",
                    campaign.name, campaign.id, campaign.end_time
                );
                Ok(campaign)
            })
            .await
    }
}

pub async fn find_active_campaign(
    conn: &mut SqliteConnection,
) -> Result<Option<Campaign>, Error> {
    let campaign = sqlx::query_as::<_, Campaign>(&format!(
        "SELECT {} FROM campaigns WHERE campaign_type = ? AND active = 1",
        CAMPAIGN_COLUMNS
    ))
    .bind(CampaignType::Global.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(campaign)
}

pub async fn fetch_active_campaign(conn: &mut SqliteConnection) -> Result<Campaign, Error> {
    find_active_campaign(conn)
        .await?
        .ok_or(Error::CampaignNotFound)
}

pub async fn insert_campaign(
    conn: &mut SqliteConnection,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Campaign, Error> {
    let campaign_id = Uuid::now_v7();
    let now = format_datetime(OffsetDateTime::now_utc())?;

    let campaign = sqlx::query_as::<_, Campaign>(&format!(
        "INSERT INTO campaigns (id, name, campaign_type, active, start_time, end_time, created_at, updated_at)
        VALUES (?, ?, ?, 1, ?, ?, ?, ?)
        RETURNING {}",
        CAMPAIGN_COLUMNS
    ))
    .bind(campaign_id.to_string())
    .bind(campaign_name(start))
    .bind(CampaignType::Global.as_str())
    .bind(format_datetime(start)?)
    .bind(format_datetime(end)?)
    .bind(&now)
    .bind(&now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(campaign)
}

/// Deactivate the campaign and record its two title holders
pub async fn close_campaign(
    conn: &mut SqliteConnection,
    campaign_id: Uuid,
    chain_winner_id: Option<Uuid>,
    win_winner_id: Option<Uuid>,
) -> Result<(), Error> {
    let updated = sqlx::query(
        "UPDATE campaigns SET active = 0, chain_winner_id = ?, win_winner_id = ?, updated_at = ?
        WHERE id = ? AND active = 1",
    )
    .bind(chain_winner_id.map(|id| id.to_string()))
    .bind(win_winner_id.map(|id| id.to_string()))
    .bind(format_datetime(OffsetDateTime::now_utc())?)
    .bind(campaign_id.to_string())
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(Error::CampaignNotFound);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;
    use time::macros::datetime;

    fn create_store(pool: SqlitePool) -> CampaignStore {
        CampaignStore::new(DBConnection::new_with_pools(
            "test".into(),
            ":memory:".into(),
            pool.clone(),
            pool,
        ))
    }

    #[test]
    fn test_month_bounds() {
        let (start, end) = month_bounds(datetime!(2026-10-16 13:45 UTC));
        assert_eq!(start, datetime!(2026-10-01 0:00 UTC));
        assert_eq!(end, datetime!(2026-11-01 0:00 UTC));

        let (start, end) = month_bounds(datetime!(2026-12-31 23:59:59 UTC));
        assert_eq!(start, datetime!(2026-12-01 0:00 UTC));
        assert_eq!(end, datetime!(2027-01-01 0:00 UTC));

        let (start, end) = month_bounds(datetime!(2028-02-29 12:00 UTC));
        assert_eq!(start, datetime!(2028-02-01 0:00 UTC));
        assert_eq!(end, datetime!(2028-03-01 0:00 UTC));

        // Offsets are normalised to UTC before picking the month
        let (start, _) = month_bounds(datetime!(2026-11-01 01:00 +03:00));
        assert_eq!(start, datetime!(2026-10-01 0:00 UTC));
    }

    #[test]
    fn test_campaign_name() {
        assert_eq!(
            campaign_name(datetime!(2026-10-01 0:00 UTC)),
            "October 2026"
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_ensure_active_campaign_opens_once(pool: SqlitePool) {
        let store = create_store(pool);
        assert!(matches!(
            store.get_active_campaign().await,
            Err(Error::CampaignNotFound)
        ));

        let now = datetime!(2026-10-16 12:00 UTC);
        let first = store.ensure_active_campaign(now).await.unwrap();
        let second = store.ensure_active_campaign(now).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.start_time, datetime!(2026-10-01 0:00 UTC));
        assert_eq!(first.end_time, datetime!(2026-11-01 0:00 UTC));
        assert!(first.has_ended(datetime!(2026-11-01 0:00 UTC)));
        assert!(!first.has_ended(datetime!(2026-10-31 23:59 UTC)));
        assert_eq!(store.get_active_campaign().await.unwrap().id, first.id);
    }
}
