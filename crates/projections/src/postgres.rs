//! PostgreSQL-backed read models.

use async_trait::async_trait;
use common::{AggregateId, MemberId};
use domain::CheckoutStatus;
use event_store::{Sequence, Version};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::read_model::{
    CheckoutRecord, CheckoutRecordStore, CheckpointStore, ItemRow, ItemRowStore,
};
use crate::{ProjectionError, Result};

/// SQLSTATE for check_violation.
const CHECK_VIOLATION: &str = "23514";

const ITEM_COLUMNS: &str =
    "item_id, isbn, title, author, total_copies, available, retired, version, updated_at";

const CHECKOUT_COLUMNS: &str =
    "checkout_id, member_id, item_id, status, checkout_date, due_date, return_date, version";

/// Read models stored in the `items`, `checkouts` and
/// `projection_checkpoints` tables.
///
/// Upserts carry `WHERE version < EXCLUDED.version`, so a replayed or
/// reordered write never moves a row backwards. The `items_available_bounds`
/// CHECK constraint backs up [`ItemRow::validate`].
#[derive(Clone)]
pub struct PostgresReadModels {
    pool: PgPool,
}

impl PostgresReadModels {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_item(row: PgRow) -> Result<ItemRow> {
        Ok(ItemRow {
            item_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("item_id")?),
            isbn: row.try_get("isbn")?,
            title: row.try_get("title")?,
            author: row.try_get("author")?,
            total_copies: count_from_db(row.try_get("total_copies")?)?,
            available: count_from_db(row.try_get("available")?)?,
            retired: row.try_get("retired")?,
            version: Version::new(row.try_get("version")?),
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_checkout(row: PgRow) -> Result<CheckoutRecord> {
        let status: String = row.try_get("status")?;
        let status: CheckoutStatus = status.parse().map_err(ProjectionError::InvalidRow)?;

        Ok(CheckoutRecord {
            checkout_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("checkout_id")?),
            member_id: MemberId::from_uuid(row.try_get::<Uuid, _>("member_id")?),
            item_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("item_id")?),
            status,
            checkout_date: row.try_get("checkout_date")?,
            due_date: row.try_get("due_date")?,
            return_date: row.try_get("return_date")?,
            version: Version::new(row.try_get("version")?),
        })
    }
}

fn count_from_db(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| ProjectionError::InvalidRow(format!("negative count {value}")))
}

fn count_to_db(value: u32) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| ProjectionError::InvalidRow(format!("count {value} out of range")))
}

fn write_error(err: sqlx::Error) -> ProjectionError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.code().as_deref() == Some(CHECK_VIOLATION)
    {
        return ProjectionError::InvalidRow(db_err.message().to_string());
    }
    ProjectionError::Database(err)
}

#[async_trait]
impl ItemRowStore for PostgresReadModels {
    async fn get_item_row(&self, item_id: AggregateId) -> Result<Option<ItemRow>> {
        let query = format!("SELECT {ITEM_COLUMNS} FROM items WHERE item_id = $1");
        sqlx::query(&query)
            .bind(item_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_item)
            .transpose()
    }

    #[tracing::instrument(skip_all, fields(item_id = %row.item_id, version = %row.version))]
    async fn upsert_item_row(&self, row: &ItemRow) -> Result<bool> {
        row.validate()?;

        let result = sqlx::query(
            r#"
            INSERT INTO items (item_id, isbn, title, author, total_copies, available, retired, version, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (item_id) DO UPDATE SET
                isbn = EXCLUDED.isbn,
                title = EXCLUDED.title,
                author = EXCLUDED.author,
                total_copies = EXCLUDED.total_copies,
                available = EXCLUDED.available,
                retired = EXCLUDED.retired,
                version = EXCLUDED.version,
                updated_at = EXCLUDED.updated_at
            WHERE items.version < EXCLUDED.version
            "#,
        )
        .bind(row.item_id.as_uuid())
        .bind(&row.isbn)
        .bind(&row.title)
        .bind(&row.author)
        .bind(count_to_db(row.total_copies)?)
        .bind(count_to_db(row.available)?)
        .bind(row.retired)
        .bind(row.version.as_i64())
        .bind(row.updated_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_item_rows(&self) -> Result<()> {
        sqlx::query("DELETE FROM items").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CheckoutRecordStore for PostgresReadModels {
    async fn get_checkout_record(
        &self,
        checkout_id: AggregateId,
    ) -> Result<Option<CheckoutRecord>> {
        let query = format!("SELECT {CHECKOUT_COLUMNS} FROM checkouts WHERE checkout_id = $1");
        sqlx::query(&query)
            .bind(checkout_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_checkout)
            .transpose()
    }

    async fn find_active_checkout(
        &self,
        member_id: MemberId,
        item_id: AggregateId,
    ) -> Result<Option<CheckoutRecord>> {
        let query = format!(
            "SELECT {CHECKOUT_COLUMNS} FROM checkouts \
             WHERE member_id = $1 AND item_id = $2 AND status = $3 \
             ORDER BY checkout_date DESC LIMIT 1"
        );
        sqlx::query(&query)
            .bind(member_id.as_uuid())
            .bind(item_id.as_uuid())
            .bind(CheckoutStatus::Active.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_checkout)
            .transpose()
    }

    #[tracing::instrument(skip_all, fields(checkout_id = %record.checkout_id, version = %record.version))]
    async fn upsert_checkout_record(&self, record: &CheckoutRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO checkouts (checkout_id, member_id, item_id, status, checkout_date, due_date, return_date, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (checkout_id) DO UPDATE SET
                status = EXCLUDED.status,
                due_date = EXCLUDED.due_date,
                return_date = EXCLUDED.return_date,
                version = EXCLUDED.version
            WHERE checkouts.version < EXCLUDED.version
            "#,
        )
        .bind(record.checkout_id.as_uuid())
        .bind(record.member_id.as_uuid())
        .bind(record.item_id.as_uuid())
        .bind(record.status.as_str())
        .bind(record.checkout_date)
        .bind(record.due_date)
        .bind(record.return_date)
        .bind(record.version.as_i64())
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_checkout_records(&self) -> Result<()> {
        sqlx::query("DELETE FROM checkouts")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for PostgresReadModels {
    async fn load_checkpoint(&self, projection: &str) -> Result<Sequence> {
        let position: Option<i64> =
            sqlx::query_scalar("SELECT position FROM projection_checkpoints WHERE projection = $1")
                .bind(projection)
                .fetch_optional(&self.pool)
                .await?;
        Ok(position.map(Sequence::new).unwrap_or_default())
    }

    async fn save_checkpoint(&self, projection: &str, position: Sequence) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO projection_checkpoints (projection, position, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (projection) DO UPDATE SET
                position = EXCLUDED.position,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(projection)
        .bind(position.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
