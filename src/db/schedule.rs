//! Appointment storage. Every query is scoped to the owning user.

use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct ScheduleStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Schedule {
    pub id: i64,
    pub uuid: String,
    pub user_id: i64,
    pub name: String,
    pub phone: String,
    /// Unix timestamp (seconds), truncated to the hour
    pub date: i64,
}

impl ScheduleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a schedule. Returns the row ID.
    pub async fn create(
        &self,
        uuid: &str,
        user_id: i64,
        name: &str,
        phone: &str,
        date: i64,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO schedules (uuid, user_id, name, phone, date) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid)
        .bind(user_id)
        .bind(name)
        .bind(phone)
        .bind(date)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Find the user's schedule occupying the given slot.
    pub async fn find_at(&self, user_id: i64, date: i64) -> Result<Option<Schedule>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, uuid, user_id, name, phone, date FROM schedules WHERE user_id = ? AND date = ?",
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
    }

    /// Get one of the user's schedules by UUID.
    pub async fn get_by_uuid(
        &self,
        user_id: i64,
        uuid: &str,
    ) -> Result<Option<Schedule>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, uuid, user_id, name, phone, date FROM schedules WHERE user_id = ? AND uuid = ?",
        )
        .bind(user_id)
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await
    }

    /// List the user's schedules with `start <= date < end`, earliest first.
    pub async fn list_between(
        &self,
        user_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<Schedule>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, uuid, user_id, name, phone, date FROM schedules WHERE user_id = ? AND date >= ? AND date < ? ORDER BY date ASC",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
    }

    /// Move a schedule to a new slot.
    pub async fn update_date(
        &self,
        user_id: i64,
        uuid: &str,
        date: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE schedules SET date = ? WHERE user_id = ? AND uuid = ?")
            .bind(date)
            .bind(user_id)
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a schedule.
    pub async fn delete(&self, user_id: i64, uuid: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM schedules WHERE user_id = ? AND uuid = ?")
            .bind(user_id)
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
