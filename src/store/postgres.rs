use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use super::{RecordStore, TitleMutator};
use crate::core::types::TitleRecord;
use crate::error::{PipelineError, Result};

const MIGRATION_MAX_RETRIES: u32 = 5;
const MIGRATION_INITIAL_DELAY_MS: u64 = 1000;

/// PostgreSQL-backed record store. Updates take a row lock (`FOR UPDATE`)
/// for the duration of the read-modify-write, so concurrent consumers of the
/// same title serialize on the row.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .connect(database_url)
            .await
            .map_err(|e| {
                error!("Failed to connect to PostgreSQL: {e}");
                PipelineError::Database(e)
            })?;

        info!("Connected to PostgreSQL database");

        let store = Self::from_pool(pool);
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations with retry to ride out a database that is still starting
    pub async fn run_migrations(&self) -> Result<()> {
        for attempt in 1..=MIGRATION_MAX_RETRIES {
            match sqlx::migrate!("./migrations").run(&self.pool).await {
                Ok(()) => {
                    info!("Database migrations completed successfully");
                    return Ok(());
                }
                Err(e) if attempt < MIGRATION_MAX_RETRIES => {
                    let delay_ms = MIGRATION_INITIAL_DELAY_MS * 2_u64.pow(attempt - 1);
                    warn!(
                        "Migration attempt {}/{} failed, retrying in {}ms: {}",
                        attempt, MIGRATION_MAX_RETRIES, delay_ms, e
                    );
                    sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => {
                    error!("Failed to run migrations after {MIGRATION_MAX_RETRIES} attempts: {e}");
                    return Err(PipelineError::Migration(e));
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn create(&self, tmdb_id: i64) -> Result<TitleRecord> {
        let created = sqlx::query_as::<_, TitleRecord>(
            r#"
            INSERT INTO movies_and_shows (tmdb_id, title)
            VALUES ($1, $2)
            ON CONFLICT (tmdb_id) DO NOTHING
            RETURNING tmdb_id, title, release_date, internal_views_count,
                      external_score, final_trend_score, created_at, last_updated_at
            "#,
        )
        .bind(tmdb_id)
        .bind(TitleRecord::placeholder_title(tmdb_id))
        .fetch_optional(&self.pool)
        .await?;

        match created {
            Some(record) => {
                debug!("Created record for TMDB ID {}", tmdb_id);
                Ok(record)
            }
            None => Err(PipelineError::AlreadyExists(tmdb_id)),
        }
    }

    async fn get(&self, tmdb_id: i64) -> Result<TitleRecord> {
        sqlx::query_as::<_, TitleRecord>(
            r#"
            SELECT tmdb_id, title, release_date, internal_views_count,
                   external_score, final_trend_score, created_at, last_updated_at
            FROM movies_and_shows
            WHERE tmdb_id = $1
            "#,
        )
        .bind(tmdb_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(PipelineError::NotFound(tmdb_id))
    }

    async fn update(&self, tmdb_id: i64, mutator: TitleMutator) -> Result<TitleRecord> {
        // Rolled back on drop, so every early return releases the row lock
        let mut tx = self.pool.begin().await?;

        let mut record = sqlx::query_as::<_, TitleRecord>(
            r#"
            SELECT tmdb_id, title, release_date, internal_views_count,
                   external_score, final_trend_score, created_at, last_updated_at
            FROM movies_and_shows
            WHERE tmdb_id = $1
            FOR UPDATE
            "#,
        )
        .bind(tmdb_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(PipelineError::NotFound(tmdb_id))?;

        mutator(&mut record);

        let updated = sqlx::query_as::<_, TitleRecord>(
            r#"
            UPDATE movies_and_shows
            SET title = $2,
                release_date = $3,
                internal_views_count = $4,
                external_score = $5,
                final_trend_score = $6,
                last_updated_at = NOW()
            WHERE tmdb_id = $1
            RETURNING tmdb_id, title, release_date, internal_views_count,
                      external_score, final_trend_score, created_at, last_updated_at
            "#,
        )
        .bind(tmdb_id)
        .bind(&record.title)
        .bind(&record.release_date)
        .bind(record.internal_views_count)
        .bind(record.external_score)
        .bind(record.final_trend_score)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(updated)
    }

    async fn list(&self) -> Result<Vec<TitleRecord>> {
        let records = sqlx::query_as::<_, TitleRecord>(
            r#"
            SELECT tmdb_id, title, release_date, internal_views_count,
                   external_score, final_trend_score, created_at, last_updated_at
            FROM movies_and_shows
            ORDER BY final_trend_score DESC, tmdb_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
