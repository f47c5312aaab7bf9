use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    ExactName,
    PrefixName,
    ContainsName,
    ExactPath,
    PrefixPath,
    Fuzzy,
    Content,
}

/// Per-candidate score components (§4.4 stage 6). Kept as named fields
/// rather than a single opaque total so both the learning engine's feature
/// builder and API responses can inspect individual contributions.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub base_match_score: f64,
    pub recency_boost: f64,
    pub frequency_boost: f64,
    pub context_boost: f64,
    pub pinned_boost: f64,
    pub junk_penalty: f64,
    pub semantic_boost: f64,
    pub cross_encoder_boost: f64,
    pub structured_query_boost: f64,
    pub m2_signal_boost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub item_id: i64,
    pub path: String,
    pub name: String,
    pub kind: String,
    pub match_type: MatchType,
    pub bm25_raw_score: f64,
    pub semantic_normalized: f64,
    pub cross_encoder_score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub fuzzy_distance: Option<i32>,
    pub score: f64,
    pub is_pinned: bool,
    pub modified_at: i64,
    pub open_count: i64,
    pub last_opened_at: i64,
}
