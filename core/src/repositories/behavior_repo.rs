use sqlx::SqlitePool;

use crate::error::CoreError;
use crate::learning::events::BehaviorEvent;

/// Append-only raw behavior event log (§4.5.1).
#[derive(Clone)]
pub struct BehaviorRepo {
    read_pool: SqlitePool,
    write_pool: SqlitePool,
}

impl BehaviorRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            read_pool: pool.clone(),
            write_pool: pool,
        }
    }

    pub fn with_pools(read_pool: SqlitePool, write_pool: SqlitePool) -> Self {
        Self { read_pool, write_pool }
    }

    pub async fn insert_ignore(&self, event: &BehaviorEvent) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO behavior_events_v1 (
                event_id, created_at, source, event_type, app_bundle_id,
                window_title_hash, browser_host_hash, item_path, item_id,
                key_event_count, shortcut_count, scroll_count, metadata_only,
                move_distance_px, click_count, drag_count, attribution_confidence,
                context_event_id, activity_digest
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            "#,
        )
        .bind(&event.event_id)
        .bind(event.timestamp_ms)
        .bind(event.source.as_str())
        .bind(&event.event_type)
        .bind(&event.app_bundle_id)
        .bind(&event.window_title_hash)
        .bind(&event.browser_host_hash)
        .bind(&event.item_path)
        .bind(event.item_id)
        .bind(event.input_meta.key_event_count)
        .bind(event.input_meta.shortcut_count)
        .bind(event.input_meta.scroll_count)
        .bind(if event.input_meta.metadata_only { 1 } else { 0 })
        .bind(event.mouse_meta.move_distance_px)
        .bind(event.mouse_meta.click_count)
        .bind(event.mouse_meta.drag_count)
        .bind(event.attribution_confidence)
        .bind(&event.context_event_id)
        .bind(&event.activity_digest)
        .execute(&self.write_pool)
        .await?;
        Ok(())
    }

    pub async fn prune_older_than(&self, cutoff_ms: i64) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM behavior_events_v1 WHERE created_at < ?1")
            .bind(cutoff_ms)
            .execute(&self.write_pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> Result<i64, CoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM behavior_events_v1")
            .fetch_one(&self.read_pool)
            .await?;
        Ok(count)
    }
}
