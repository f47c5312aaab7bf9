use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::TrainingExampleRow;
use crate::error::CoreError;

pub const ATTRIBUTION_WINDOW_MS: i64 = 30_000;

pub enum AttributionTier {
    Context,
    DigestQuery,
    Query,
}

impl AttributionTier {
    pub fn min_confidence(&self) -> f64 {
        match self {
            AttributionTier::Context => 1.0,
            AttributionTier::DigestQuery => 0.85,
            AttributionTier::Query => 0.70,
        }
    }
}

/// Exposures, attribution, and fresh-sample selection for the online learning engine (§4.5.2, §4.5.3).
#[derive(Clone)]
pub struct TrainingRepo {
    read_pool: SqlitePool,
    write_pool: SqlitePool,
}

impl TrainingRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            read_pool: pool.clone(),
            write_pool: pool,
        }
    }

    pub fn with_pools(read_pool: SqlitePool, write_pool: SqlitePool) -> Self {
        Self { read_pool, write_pool }
    }

    /// Inserts an unknown-label exposure row at query time.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_exposure(
        &self,
        created_at: i64,
        query: &str,
        query_normalized: &str,
        item_id: i64,
        path: &str,
        weight: f64,
        features_json: &str,
        context_event_id: Option<&str>,
        activity_digest: Option<&str>,
    ) -> Result<String, CoreError> {
        let sample_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO training_examples_v1 (
                sample_id, created_at, query, query_normalized, item_id, path,
                label, weight, features_json, context_event_id, activity_digest,
                attribution_confidence, consumed
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, -1, ?7, ?8, ?9, ?10, 0, 0)
            "#,
        )
        .bind(&sample_id)
        .bind(created_at)
        .bind(query)
        .bind(query_normalized)
        .bind(item_id)
        .bind(path)
        .bind(weight)
        .bind(features_json)
        .bind(context_event_id)
        .bind(activity_digest)
        .execute(&self.write_pool)
        .await?;
        Ok(sample_id)
    }

    /// Attempts the three attribution tiers in order within a ±30s window, stopping
    /// at the first that touches at least one row. Returns the tier that matched, if any.
    pub async fn attribute_positive(
        &self,
        ts: i64,
        context_event_id: Option<&str>,
        activity_digest: Option<&str>,
        query_normalized: &str,
    ) -> Result<Option<AttributionTier>, CoreError> {
        let lo = ts - ATTRIBUTION_WINDOW_MS;
        let hi = ts + ATTRIBUTION_WINDOW_MS;

        if let Some(context_id) = context_event_id {
            let result = sqlx::query(
                r#"
                UPDATE training_examples_v1
                SET label = 1, attribution_confidence = MAX(attribution_confidence, ?1)
                WHERE context_event_id = ?2 AND consumed = 0 AND created_at BETWEEN ?3 AND ?4
                "#,
            )
            .bind(AttributionTier::Context.min_confidence())
            .bind(context_id)
            .bind(lo)
            .bind(hi)
            .execute(&self.write_pool)
            .await?;
            if result.rows_affected() > 0 {
                return Ok(Some(AttributionTier::Context));
            }
        }

        if let Some(digest) = activity_digest {
            let result = sqlx::query(
                r#"
                UPDATE training_examples_v1
                SET label = 1, attribution_confidence = MAX(attribution_confidence, ?1)
                WHERE activity_digest = ?2 AND query_normalized = ?3
                  AND consumed = 0 AND created_at BETWEEN ?4 AND ?5
                "#,
            )
            .bind(AttributionTier::DigestQuery.min_confidence())
            .bind(digest)
            .bind(query_normalized)
            .bind(lo)
            .bind(hi)
            .execute(&self.write_pool)
            .await?;
            if result.rows_affected() > 0 {
                return Ok(Some(AttributionTier::DigestQuery));
            }
        }

        let result = sqlx::query(
            r#"
            UPDATE training_examples_v1
            SET label = 1, attribution_confidence = MAX(attribution_confidence, ?1)
            WHERE query_normalized = ?2 AND consumed = 0 AND created_at BETWEEN ?3 AND ?4
            "#,
        )
        .bind(AttributionTier::Query.min_confidence())
        .bind(query_normalized)
        .bind(lo)
        .bind(hi)
        .execute(&self.write_pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(Some(AttributionTier::Query));
        }

        Ok(None)
    }

    /// Synthesizes a fallback example with a trivial feature vector when no exposure
    /// could be matched (§4.5.2). Index 10 is set to 1.0 (rank-1 indicator), index 11
    /// to a clamped proxy for query length.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_fallback(
        &self,
        created_at: i64,
        query: &str,
        query_normalized: &str,
        item_id: i64,
        path: &str,
        tier: &AttributionTier,
        context_event_id: Option<&str>,
        activity_digest: Option<&str>,
    ) -> Result<(), CoreError> {
        let mut features = vec![0.0f64; 13];
        features[10] = 1.0;
        features[11] = (query_normalized.split_whitespace().count() as f64 / 8.0).min(1.0);
        let features_json = serde_json::to_string(&features)?;

        sqlx::query(
            r#"
            INSERT INTO training_examples_v1 (
                sample_id, created_at, query, query_normalized, item_id, path,
                label, weight, features_json, context_event_id, activity_digest,
                attribution_confidence, consumed
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, 1.0, ?7, ?8, ?9, ?10, 0)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(created_at)
        .bind(query)
        .bind(query_normalized)
        .bind(item_id)
        .bind(path)
        .bind(&features_json)
        .bind(context_event_id)
        .bind(activity_digest)
        .bind(tier.min_confidence())
        .execute(&self.write_pool)
        .await?;
        Ok(())
    }

    /// Ages unknown-label rows older than `negative_stale_seconds` into negatives.
    pub async fn age_stale_unknowns(&self, now: i64, negative_stale_seconds: i64) -> Result<u64, CoreError> {
        let cutoff = now - negative_stale_seconds * 1000;
        let result = sqlx::query(
            "UPDATE training_examples_v1 SET label = 0 WHERE label = -1 AND consumed = 0 AND created_at <= ?1",
        )
        .bind(cutoff)
        .execute(&self.write_pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Fresh candidates for a training cycle: positives, already-aged negatives, and
    /// unconsumed rows, oldest first, capped at `limit` (§4.5.3).
    pub async fn fetch_fresh_examples(&self, limit: i64) -> Result<Vec<TrainingExampleRow>, CoreError> {
        let rows = sqlx::query_as::<_, TrainingExampleRow>(
            r#"
            SELECT * FROM training_examples_v1
            WHERE consumed = 0 AND label IN (0, 1)
            ORDER BY created_at ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.read_pool)
        .await?;
        Ok(rows)
    }

    pub async fn mark_consumed(&self, sample_ids: &[String]) -> Result<(), CoreError> {
        if sample_ids.is_empty() {
            return Ok(());
        }
        let mut builder =
            sqlx::QueryBuilder::new("UPDATE training_examples_v1 SET consumed = 1 WHERE sample_id IN (");
        let mut separated = builder.separated(", ");
        for id in sample_ids {
            separated.push_bind(id);
        }
        builder.push(")");
        builder.build().execute(&self.write_pool).await?;
        Ok(())
    }

    pub async fn pending_count(&self) -> Result<i64, CoreError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM training_examples_v1 WHERE consumed = 0")
                .fetch_one(&self.read_pool)
                .await?;
        Ok(count)
    }
}
