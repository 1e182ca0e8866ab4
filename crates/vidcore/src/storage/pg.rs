//! PostgreSQL store: history, interactions, errors and feedback

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indoc::indoc;
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{HistoryFilter, HistoryRecord, HistoryStore, PlatformCount, StoreError};
use crate::core::config;
use crate::core::Platform;
use crate::delivery::{MediaKind, Requester};

const SCHEMA: &str = indoc! {"
    CREATE TABLE IF NOT EXISTS interactions (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL,
        username TEXT,
        video_url TEXT NOT NULL,
        platform TEXT NOT NULL,
        selected_quality TEXT,
        media_type TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE TABLE IF NOT EXISTS user_history (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL,
        chat_id BIGINT NOT NULL,
        url TEXT NOT NULL,
        selected_quality TEXT NOT NULL,
        media_type TEXT NOT NULL,
        platform TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE INDEX IF NOT EXISTS idx_user_history_user_created
        ON user_history (user_id, created_at DESC);

    CREATE TABLE IF NOT EXISTS errors (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT,
        error_message TEXT NOT NULL,
        url TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE TABLE IF NOT EXISTS feedback (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL,
        username TEXT,
        message TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
"};

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    user_id: i64,
    chat_id: i64,
    url: String,
    selected_quality: String,
    media_type: String,
    platform: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for HistoryRecord {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let media_kind = MediaKind::from_str(&row.media_type).map_err(|_| StoreError::CorruptRow {
            table: "user_history",
            reason: format!("unknown media type {:?}", row.media_type),
        })?;
        Ok(HistoryRecord {
            requester: Requester::new(row.user_id, row.chat_id),
            url: row.url,
            quality: row.selected_quality,
            media_kind,
            platform: Platform::from_str(&row.platform).unwrap_or_default(),
            created_at: row.created_at,
        })
    }
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool
    pub async fn connect(database_url: &SecretString) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url.expose_secret())
            .await?;
        log::info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates tables and indexes if they don't exist
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        log::info!("Database schema ready");
        Ok(())
    }

    /// Records an accepted URL, returning the interaction id
    pub async fn log_interaction(
        &self,
        user_id: i64,
        username: Option<&str>,
        url: &str,
        platform: Platform,
    ) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO interactions (user_id, username, video_url, platform)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(username)
        .bind(url)
        .bind(platform.to_string())
        .fetch_one(&self.pool)
        .await?;
        log::debug!("Logged interaction {} for user {}, URL: {}", id, user_id, url);
        Ok(id)
    }

    /// Stores the quality and media type picked for an interaction
    pub async fn set_interaction_choice(
        &self,
        interaction_id: i64,
        quality: &str,
        media_kind: MediaKind,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE interactions SET selected_quality = $2, media_type = $3 WHERE id = $1")
            .bind(interaction_id)
            .bind(quality)
            .bind(media_kind.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn log_error(&self, user_id: Option<i64>, url: Option<&str>, message: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO errors (user_id, error_message, url) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(message)
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn save_feedback(&self, user_id: i64, username: Option<&str>, message: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO feedback (user_id, username, message) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(username)
            .bind(message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn total_downloads(&self, user_id: i64) -> Result<i64, StoreError> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM user_history WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    /// Download counts per platform, most used first
    pub async fn platform_counts(&self, user_id: i64) -> Result<Vec<PlatformCount>, StoreError> {
        let rows = sqlx::query_as::<_, PlatformCount>(
            r#"
            SELECT platform, COUNT(*) AS count
            FROM user_history
            WHERE user_id = $1
            GROUP BY platform
            ORDER BY count DESC, platform
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl HistoryStore for PgStore {
    async fn append(&self, record: &HistoryRecord) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO user_history (user_id, chat_id, url, selected_quality, media_type, platform, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.requester.user_id)
        .bind(record.requester.chat_id)
        .bind(&record.url)
        .bind(&record.quality)
        .bind(record.media_kind.to_string())
        .bind(record.platform.to_string())
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        let trimmed = sqlx::query(
            r#"
            DELETE FROM user_history
            WHERE user_id = $1
              AND id NOT IN (
                  SELECT id FROM user_history
                  WHERE user_id = $1
                  ORDER BY created_at DESC, id DESC
                  LIMIT $2
              )
            "#,
        )
        .bind(record.requester.user_id)
        .bind(config::history::MAX_RECORDS_PER_USER)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if trimmed > 0 {
            log::debug!(
                "Trimmed {} old history records for user {}",
                trimmed,
                record.requester.user_id
            );
        }
        Ok(())
    }

    async fn query(&self, user_id: i64, filter: HistoryFilter) -> Result<Vec<HistoryRecord>, StoreError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT user_id, chat_id, url, selected_quality, media_type, platform, created_at
            FROM user_history
            WHERE user_id = $1
              AND ($2::TEXT IS NULL OR platform = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(filter.platform.map(|p| p.to_string()))
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(HistoryRecord::try_from).collect()
    }

    async fn delete_all(&self, user_id: i64) -> Result<u64, StoreError> {
        let deleted = sqlx::query("DELETE FROM user_history WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        log::info!("Cleared {} history records for user {}", deleted, user_id);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn test_store() -> PgStore {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
        let store = PgStore::connect(&SecretString::from(url)).await.unwrap();
        store.init_schema().await.unwrap();
        store
    }

    fn record(user_id: i64, n: i64, platform: Platform) -> HistoryRecord {
        HistoryRecord {
            requester: Requester::new(user_id, user_id),
            url: format!("https://example.com/{n}"),
            quality: "22".into(),
            media_kind: MediaKind::Video,
            platform,
            created_at: Utc::now() + chrono::Duration::seconds(n),
        }
    }

    fn unique_user() -> i64 {
        -(Utc::now().timestamp_micros() % 1_000_000_000)
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn test_append_query_and_clear() {
        let store = test_store().await;
        let user = unique_user();

        store.append(&record(user, 1, Platform::Youtube)).await.unwrap();
        store.append(&record(user, 2, Platform::Vimeo)).await.unwrap();

        let all = store.query(user, HistoryFilter::all()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].platform, Platform::Vimeo);

        let youtube = store
            .query(user, HistoryFilter::all().platform(Platform::Youtube))
            .await
            .unwrap();
        assert_eq!(youtube.len(), 1);

        assert_eq!(store.total_downloads(user).await.unwrap(), 2);
        assert_eq!(store.platform_counts(user).await.unwrap().len(), 2);

        assert_eq!(store.delete_all(user).await.unwrap(), 2);
        assert!(store.query(user, HistoryFilter::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn test_history_is_trimmed() {
        let store = test_store().await;
        let user = unique_user();

        for n in 0..105 {
            store.append(&record(user, n, Platform::Youtube)).await.unwrap();
        }
        let all = store.query(user, HistoryFilter::all()).await.unwrap();
        assert_eq!(all.len(), 100);
        assert_eq!(all[0].url, "https://example.com/104");
        assert_eq!(all[99].url, "https://example.com/5");

        store.delete_all(user).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn test_interactions_errors_feedback() {
        let store = test_store().await;
        let user = unique_user();

        let id = store
            .log_interaction(user, Some("tester"), "https://youtu.be/x", Platform::Youtube)
            .await
            .unwrap();
        store.set_interaction_choice(id, "audio", MediaKind::Audio).await.unwrap();
        store.log_error(Some(user), Some("https://youtu.be/x"), "boom").await.unwrap();
        store.save_feedback(user, None, "nice").await.unwrap();
    }
}
