use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, NewEvent, Result, Sequence, Snapshot, Version,
    store::{EventStore, record_append, upper_bound, validate_append},
};

/// SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE for serialization_failure.
const SERIALIZATION_FAILURE: &str = "40001";

const EVENT_COLUMNS: &str =
    "id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata";

/// PostgreSQL-backed event store implementation.
///
/// Appends run in a SERIALIZABLE transaction that checks the current version
/// before inserting; the `unique_aggregate_version` constraint backs the
/// check up. Both unique violations and serialization failures surface as
/// `ConcurrencyConflict`.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(EventEnvelope {
            sequence: Sequence::new(row.try_get("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }

    async fn try_append(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        expected_version: Version,
        events: Vec<NewEvent>,
    ) -> Result<Version> {
        validate_append(expected_version, &events)?;

        let conflict = |err: sqlx::Error| write_error(err, aggregate_id, expected_version);

        // Dropping `tx` on any early return rolls the transaction back.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(conflict)?;

        let current: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version), 0) FROM events WHERE aggregate_id = $1",
        )
        .bind(aggregate_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(conflict)?;

        let actual = Version::new(current);
        if actual != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual: Some(actual),
            });
        }

        let timestamp = Utc::now();
        let mut version = actual;
        for event in events {
            version = version.next();
            let metadata_json = serde_json::to_value(&event.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO events (event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(&event.event_type)
            .bind(aggregate_id.as_uuid())
            .bind(aggregate_type)
            .bind(version.as_i64())
            .bind(timestamp)
            .bind(&event.payload)
            .bind(metadata_json)
            .execute(&mut *tx)
            .await
            .map_err(conflict)?;
        }

        tx.commit().await.map_err(conflict)?;
        Ok(version)
    }
}

/// Maps a failed statement inside an append to the store's error taxonomy.
fn write_error(err: sqlx::Error, aggregate_id: AggregateId, expected: Version) -> EventStoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        let code = db_err.code();
        let is_conflict = matches!(
            code.as_deref(),
            Some(UNIQUE_VIOLATION) | Some(SERIALIZATION_FAILURE)
        ) || db_err.constraint() == Some("unique_aggregate_version");
        if is_conflict {
            return EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: None,
            };
        }
    }
    EventStoreError::Database(err)
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(
        skip_all,
        fields(%aggregate_id, aggregate_type = %aggregate_type, %expected_version, count = events.len())
    )]
    async fn append(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        expected_version: Version,
        events: Vec<NewEvent>,
    ) -> Result<Version> {
        let count = events.len();
        let result = self
            .try_append(aggregate_id, aggregate_type, expected_version, events)
            .await;
        record_append(&result, count);
        if let Err(ref err) = result {
            if err.is_concurrency_conflict() {
                tracing::debug!(error = %err, "append lost the version race");
            } else {
                tracing::warn!(error = %err, "append failed");
            }
        }
        result
    }

    async fn load(
        &self,
        aggregate_id: AggregateId,
        from: Version,
        to: Option<Version>,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = match upper_bound(to) {
            Some(to) => {
                sqlx::query(&format!(
                    "SELECT {EVENT_COLUMNS} FROM events \
                     WHERE aggregate_id = $1 AND version >= $2 AND version <= $3 \
                     ORDER BY version ASC"
                ))
                .bind(aggregate_id.as_uuid())
                .bind(from.as_i64())
                .bind(to.as_i64())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {EVENT_COLUMNS} FROM events \
                     WHERE aggregate_id = $1 AND version >= $2 \
                     ORDER BY version ASC"
                ))
                .bind(aggregate_id.as_uuid())
                .bind(from.as_i64())
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn current_version(&self, aggregate_id: AggregateId) -> Result<Version> {
        let version: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version), 0) FROM events WHERE aggregate_id = $1",
        )
        .bind(aggregate_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(Version::new(version))
    }

    async fn stream_since(
        &self,
        cursor: Sequence,
        batch_size: usize,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id > $1 ORDER BY id ASC LIMIT $2"
        ))
        .bind(cursor.as_i64())
        .bind(batch_size as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO snapshots (aggregate_id, aggregate_type, version, timestamp, state)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (aggregate_id) DO UPDATE SET
                aggregate_type = EXCLUDED.aggregate_type,
                version = EXCLUDED.version,
                timestamp = EXCLUDED.timestamp,
                state = EXCLUDED.state
            WHERE snapshots.version < EXCLUDED.version
            "#,
        )
        .bind(snapshot.aggregate_id.as_uuid())
        .bind(&snapshot.aggregate_type)
        .bind(snapshot.version.as_i64())
        .bind(snapshot.timestamp)
        .bind(&snapshot.state)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT aggregate_id, aggregate_type, version, timestamp, state
            FROM snapshots
            WHERE aggregate_id = $1
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Snapshot {
                aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
                aggregate_type: row.try_get("aggregate_type")?,
                version: Version::new(row.try_get("version")?),
                timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
                state: row.try_get("state")?,
            })),
            None => Ok(None),
        }
    }
}
