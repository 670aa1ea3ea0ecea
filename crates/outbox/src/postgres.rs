use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::entry::{EventId, OutboxEntry};
use crate::error::{OutboxError, Result};
use crate::store::OutboxStore;

/// PostgreSQL-backed outbox store.
///
/// `append` runs inside a transaction so a caller holding its own
/// transaction can use [`PostgresOutboxStore::append_in_tx`] to make the
/// outbox write atomic with the business-state change.
#[derive(Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    /// Creates a new PostgreSQL outbox store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Inserts entries inside a caller-owned transaction.
    pub async fn append_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        entries: &[OutboxEntry],
    ) -> Result<()> {
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO outbox_entries
                    (id, aggregate_id, event_type, destination_topic, payload, created_at, published_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(entry.id.as_uuid())
            .bind(entry.aggregate_id)
            .bind(&entry.event_type)
            .bind(&entry.destination_topic)
            .bind(&entry.payload)
            .bind(entry.created_at)
            .bind(entry.published_at)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    fn row_to_entry(row: PgRow) -> Result<OutboxEntry> {
        Ok(OutboxEntry {
            id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            aggregate_id: row.try_get("aggregate_id")?,
            event_type: row.try_get("event_type")?,
            destination_topic: row.try_get("destination_topic")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            published_at: row.try_get("published_at")?,
        })
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn append(&self, entries: Vec<OutboxEntry>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::append_in_tx(&mut tx, &entries).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_unpublished(&self) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, aggregate_id, event_type, destination_topic, payload, created_at, published_at
            FROM outbox_entries
            WHERE published_at IS NULL
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn mark_published(&self, id: EventId, published_at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_entries
            SET published_at = $2
            WHERE id = $1 AND published_at IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .bind(published_at)
        .execute(&self.pool)
        .await?;

        // Zero rows means either already published (fine) or unknown.
        if result.rows_affected() == 0 {
            let exists: Option<Uuid> =
                sqlx::query_scalar("SELECT id FROM outbox_entries WHERE id = $1")
                    .bind(id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await?;
            if exists.is_none() {
                return Err(OutboxError::EntryNotFound(id));
            }
        }
        Ok(())
    }

    async fn entries_for_aggregate(&self, aggregate_id: Uuid) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, aggregate_id, event_type, destination_topic, payload, created_at, published_at
            FROM outbox_entries
            WHERE aggregate_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }
}
