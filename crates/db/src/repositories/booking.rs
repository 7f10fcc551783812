use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use tablebook_core::domain::booking::{BookingRecord, SessionId, SessionOutcome};

use super::{BookingRepository, RepositoryError};
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT session_id, user_name_hash, booking_time, booking_location,
        party_size, dietary_preferences, culinary_preferences, outcome, accuracy_ratio,
        turn_count, recommended_restaurant, created_at
     FROM booking_sessions";

pub struct SqlBookingRepository {
    pool: DbPool,
}

impl SqlBookingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BookingRepository for SqlBookingRepository {
    async fn save(&self, record: BookingRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO booking_sessions (
                session_id, user_name_hash, booking_time, booking_location, party_size,
                dietary_preferences, culinary_preferences, outcome, accuracy_ratio,
                turn_count, recommended_restaurant, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET
                user_name_hash = excluded.user_name_hash,
                booking_time = excluded.booking_time,
                booking_location = excluded.booking_location,
                party_size = excluded.party_size,
                dietary_preferences = excluded.dietary_preferences,
                culinary_preferences = excluded.culinary_preferences,
                outcome = excluded.outcome,
                accuracy_ratio = excluded.accuracy_ratio,
                turn_count = excluded.turn_count,
                recommended_restaurant = excluded.recommended_restaurant",
        )
        .bind(&record.session_id.0)
        .bind(&record.user_name_hash)
        .bind(&record.booking_time)
        .bind(&record.booking_location)
        .bind(record.party_size.map(i64::from))
        .bind(&record.dietary_preferences)
        .bind(&record.culinary_preferences)
        .bind(record.outcome.as_str())
        .bind(record.accuracy_ratio)
        .bind(i64::from(record.turn_count))
        .bind(&record.recommended_restaurant)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<BookingRecord>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE session_id = ?"))
            .bind(&session_id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| decode_record(&row)).transpose()
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<BookingRecord>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC LIMIT ?"))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode_record).collect()
    }
}

fn decode_record(row: &SqliteRow) -> Result<BookingRecord, RepositoryError> {
    let outcome = parse_outcome(&row.try_get::<String, _>("outcome")?)?;
    let created_at = parse_timestamp(&row.try_get::<String, _>("created_at")?)?;
    let party_size = row
        .try_get::<Option<i64>, _>("party_size")?
        .map(|value| {
            u32::try_from(value)
                .map_err(|_| RepositoryError::Decode(format!("invalid party size `{value}`")))
        })
        .transpose()?;
    let turn_count = row.try_get::<i64, _>("turn_count")?;
    let turn_count = u32::try_from(turn_count)
        .map_err(|_| RepositoryError::Decode(format!("invalid turn count `{turn_count}`")))?;

    Ok(BookingRecord {
        session_id: SessionId(row.try_get("session_id")?),
        user_name_hash: row.try_get("user_name_hash")?,
        booking_time: row.try_get("booking_time")?,
        booking_location: row.try_get("booking_location")?,
        party_size,
        dietary_preferences: row.try_get("dietary_preferences")?,
        culinary_preferences: row.try_get("culinary_preferences")?,
        outcome,
        accuracy_ratio: row.try_get("accuracy_ratio")?,
        turn_count,
        recommended_restaurant: row.try_get("recommended_restaurant")?,
        created_at,
    })
}

fn parse_outcome(value: &str) -> Result<SessionOutcome, RepositoryError> {
    match value {
        "completed" => Ok(SessionOutcome::Completed),
        "cancelled" => Ok(SessionOutcome::Cancelled),
        other => Err(RepositoryError::Decode(format!("unknown session outcome `{other}`"))),
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{value}`: {error}")))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use tablebook_core::domain::booking::{
        hash_user_name, BookingDetails, BookingRecord, SessionId, SessionOutcome,
    };
    use tablebook_core::domain::slot::PartySize;

    use super::SqlBookingRepository;
    use crate::migrations::run_pending;
    use crate::repositories::{BookingRepository, RepositoryError};
    use crate::{connect_with_settings, DbPool};

    async fn migrated_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn completed_record(id: &str) -> BookingRecord {
        let details = BookingDetails {
            user_name: Some("Anna".to_string()),
            booking_time: Some("Friday 19:00".to_string()),
            booking_location: Some("Kraków".to_string()),
            party_size: PartySize::new(4),
            dietary_preferences: Some("vegetarian".to_string()),
            culinary_preferences: Some("Georgian".to_string()),
        };
        BookingRecord::new(SessionId(id.to_string()), &details, SessionOutcome::Completed, Some(0.75), 9)
            .with_recommendation("Chinkalnia")
    }

    #[tokio::test]
    async fn saved_record_can_be_found_again() {
        let repo = SqlBookingRepository::new(migrated_pool().await);
        let record = completed_record("S-1");

        repo.save(record.clone()).await.expect("save record");
        let found = repo.find_by_session(&record.session_id).await.expect("find record");
        let found = found.expect("record exists");

        assert_eq!(found.user_name_hash, Some(hash_user_name("Anna")));
        assert_eq!(found.party_size, Some(4));
        assert_eq!(found.outcome, SessionOutcome::Completed);
        assert_eq!(found.accuracy_ratio, Some(0.75));
        assert_eq!(found.recommended_restaurant.as_deref(), Some("Chinkalnia"));
        assert_eq!(found.created_at.timestamp(), record.created_at.timestamp());
    }

    #[tokio::test]
    async fn clear_text_name_never_reaches_the_table() {
        let pool = migrated_pool().await;
        let repo = SqlBookingRepository::new(pool.clone());
        repo.save(completed_record("S-2")).await.expect("save record");

        let leaked: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM booking_sessions WHERE user_name_hash LIKE '%Anna%'",
        )
        .fetch_one(&pool)
        .await
        .expect("query");
        assert_eq!(leaked, 0);
    }

    #[tokio::test]
    async fn saving_twice_replaces_the_record() {
        let repo = SqlBookingRepository::new(migrated_pool().await);
        let mut record = completed_record("S-3");
        repo.save(record.clone()).await.expect("first save");

        record.outcome = SessionOutcome::Cancelled;
        record.accuracy_ratio = None;
        repo.save(record.clone()).await.expect("second save");

        let found = repo.find_by_session(&record.session_id).await.expect("find").expect("exists");
        assert_eq!(found.outcome, SessionOutcome::Cancelled);
        assert_eq!(found.accuracy_ratio, None);
        assert_eq!(repo.list_recent(10).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn list_recent_is_newest_first_and_limited() {
        let repo = SqlBookingRepository::new(migrated_pool().await);
        for (index, id) in ["S-old", "S-mid", "S-new"].into_iter().enumerate() {
            let mut record = completed_record(id);
            record.created_at = Utc::now() - Duration::minutes(10 - index as i64);
            repo.save(record).await.expect("save");
        }

        let recent = repo.list_recent(2).await.expect("list");
        let ids: Vec<_> = recent.iter().map(|record| record.session_id.0.as_str()).collect();
        assert_eq!(ids, vec!["S-new", "S-mid"]);
    }

    #[tokio::test]
    async fn unknown_session_is_none() {
        let repo = SqlBookingRepository::new(migrated_pool().await);
        let found = repo.find_by_session(&SessionId("missing".to_string())).await.expect("find");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn corrupted_outcome_is_a_decode_error() {
        let pool = migrated_pool().await;
        sqlx::query("PRAGMA ignore_check_constraints = ON").execute(&pool).await.expect("pragma");
        sqlx::query(
            "INSERT INTO booking_sessions (session_id, outcome, turn_count, created_at)
             VALUES ('S-bad', 'lost', 0, '2026-01-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .expect("insert");

        let repo = SqlBookingRepository::new(pool);
        let result = repo.find_by_session(&SessionId("S-bad".to_string())).await;
        assert!(matches!(result, Err(RepositoryError::Decode(_))));
    }
}
