use sqlx::{QueryBuilder, SqlitePool};

use crate::db::models::{InteractionRow, ItemRow};
use crate::error::CoreError;

/// Items are owned by the external indexer; this repo only upserts/reads what it reports.
#[derive(Clone)]
pub struct ItemRepo {
    read_pool: SqlitePool,
    write_pool: SqlitePool,
}

impl ItemRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            read_pool: pool.clone(),
            write_pool: pool,
        }
    }

    pub fn with_pools(read_pool: SqlitePool, write_pool: SqlitePool) -> Self {
        Self { read_pool, write_pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_item(
        &self,
        path: &str,
        name: &str,
        extension: &str,
        kind: &str,
        size_bytes: i64,
        modified_at: i64,
        created_at: i64,
        parent_path: &str,
    ) -> Result<i64, CoreError> {
        sqlx::query(
            r#"
            INSERT INTO items (path, name, extension, kind, size_bytes, modified_at, created_at, parent_path)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(path) DO UPDATE SET
                name = excluded.name,
                extension = excluded.extension,
                kind = excluded.kind,
                size_bytes = excluded.size_bytes,
                modified_at = excluded.modified_at,
                parent_path = excluded.parent_path
            "#,
        )
        .bind(path)
        .bind(name)
        .bind(extension)
        .bind(kind)
        .bind(size_bytes)
        .bind(modified_at)
        .bind(created_at)
        .bind(parent_path)
        .execute(&self.write_pool)
        .await?;

        let item_id = sqlx::query_scalar::<_, i64>("SELECT item_id FROM items WHERE path = ?1")
            .bind(path)
            .fetch_one(&self.read_pool)
            .await?;
        Ok(item_id)
    }

    pub async fn remove_item(&self, path: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM items WHERE path = ?1")
            .bind(path)
            .execute(&self.write_pool)
            .await?;
        Ok(())
    }

    pub async fn get_item(&self, item_id: i64) -> Result<Option<ItemRow>, CoreError> {
        let row = sqlx::query_as::<_, ItemRow>("SELECT * FROM items WHERE item_id = ?1")
            .bind(item_id)
            .fetch_optional(&self.read_pool)
            .await?;
        Ok(row)
    }

    pub async fn get_items(&self, item_ids: &[i64]) -> Result<Vec<ItemRow>, CoreError> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder = QueryBuilder::new("SELECT * FROM items WHERE item_id IN (");
        let mut separated = builder.separated(", ");
        for id in item_ids {
            separated.push_bind(id);
        }
        builder.push(")");
        let rows = builder.build_query_as::<ItemRow>().fetch_all(&self.read_pool).await?;
        Ok(rows)
    }

    pub async fn set_pinned(&self, item_id: i64, pinned: bool) -> Result<(), CoreError> {
        sqlx::query("UPDATE items SET is_pinned = ?1 WHERE item_id = ?2")
            .bind(if pinned { 1 } else { 0 })
            .bind(item_id)
            .execute(&self.write_pool)
            .await?;
        Ok(())
    }

    pub async fn record_open(&self, item_id: i64, opened_at: i64) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO interactions (item_id, open_count, last_opened_at)
            VALUES (?1, 1, ?2)
            ON CONFLICT(item_id) DO UPDATE SET
                open_count = open_count + 1,
                last_opened_at = excluded.last_opened_at
            "#,
        )
        .bind(item_id)
        .bind(opened_at)
        .execute(&self.write_pool)
        .await?;
        Ok(())
    }

    pub async fn get_interaction(&self, item_id: i64) -> Result<Option<InteractionRow>, CoreError> {
        let row = sqlx::query_as::<_, InteractionRow>(
            "SELECT * FROM interactions WHERE item_id = ?1",
        )
        .bind(item_id)
        .fetch_optional(&self.read_pool)
        .await?;
        Ok(row)
    }
}
