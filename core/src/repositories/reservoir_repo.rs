use sqlx::SqlitePool;

use crate::db::models::ReplayReservoirRow;
use crate::error::CoreError;

/// Vitter-style bounded replay reservoir (§4.5.3). Exactly one row per slot.
#[derive(Clone)]
pub struct ReservoirRepo {
    read_pool: SqlitePool,
    write_pool: SqlitePool,
}

impl ReservoirRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            read_pool: pool.clone(),
            write_pool: pool,
        }
    }

    pub fn with_pools(read_pool: SqlitePool, write_pool: SqlitePool) -> Self {
        Self { read_pool, write_pool }
    }

    pub async fn size(&self) -> Result<i64, CoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM replay_reservoir_v1")
            .fetch_one(&self.read_pool)
            .await?;
        Ok(count)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn put(
        &self,
        slot: i64,
        sample_id: &str,
        label: i64,
        weight: f64,
        features_json: &str,
        query_normalized: Option<&str>,
        item_id: Option<i64>,
        created_at: i64,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO replay_reservoir_v1 (
                slot, sample_id, label, weight, features_json, query_normalized, item_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(slot) DO UPDATE SET
                sample_id = excluded.sample_id,
                label = excluded.label,
                weight = excluded.weight,
                features_json = excluded.features_json,
                query_normalized = excluded.query_normalized,
                item_id = excluded.item_id,
                created_at = excluded.created_at
            "#,
        )
        .bind(slot)
        .bind(sample_id)
        .bind(label)
        .bind(weight.max(0.05))
        .bind(features_json)
        .bind(query_normalized)
        .bind(item_id)
        .bind(created_at)
        .execute(&self.write_pool)
        .await?;
        Ok(())
    }

    pub async fn sample(&self, limit: i64) -> Result<Vec<ReplayReservoirRow>, CoreError> {
        let rows = sqlx::query_as::<_, ReplayReservoirRow>(
            "SELECT * FROM replay_reservoir_v1 ORDER BY slot ASC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.read_pool)
        .await?;
        Ok(rows)
    }
}
