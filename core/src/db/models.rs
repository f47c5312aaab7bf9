use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ItemRow {
    pub item_id: i64,
    pub path: String,
    pub name: String,
    pub extension: String,
    pub kind: String,
    pub size_bytes: i64,
    pub modified_at: i64,
    pub created_at: i64,
    pub parent_path: String,
    pub is_pinned: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRow {
    pub item_id: i64,
    pub open_count: i64,
    pub last_opened_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorEventRow {
    pub event_id: String,
    pub created_at: i64,
    pub source: String,
    pub event_type: String,
    pub app_bundle_id: Option<String>,
    pub window_title_hash: Option<String>,
    pub browser_host_hash: Option<String>,
    pub item_path: Option<String>,
    pub item_id: Option<i64>,
    pub key_event_count: i64,
    pub shortcut_count: i64,
    pub scroll_count: i64,
    pub metadata_only: i64,
    pub move_distance_px: f64,
    pub click_count: i64,
    pub drag_count: i64,
    pub attribution_confidence: f64,
    pub context_event_id: Option<String>,
    pub activity_digest: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TrainingExampleRow {
    pub sample_id: String,
    pub created_at: i64,
    pub query: String,
    pub query_normalized: String,
    pub item_id: i64,
    pub path: String,
    pub label: i64,
    pub weight: f64,
    pub features_json: String,
    pub source_event_id: Option<String>,
    pub app_bundle_id: Option<String>,
    pub context_event_id: Option<String>,
    pub activity_digest: Option<String>,
    pub attribution_confidence: f64,
    pub consumed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReservoirRow {
    pub slot: i64,
    pub sample_id: String,
    pub label: i64,
    pub weight: f64,
    pub features_json: String,
    pub query_normalized: Option<String>,
    pub item_id: Option<i64>,
    pub created_at: i64,
}
