use serde::{Deserialize, Serialize};

/// Entity classification (§4.4 stage 2 "Structure").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Place,
    Organization,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryClass {
    NaturalLanguage,
    PathOrCode,
    ShortAmbiguous,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryDomain {
    PersonalDocs,
    DevCode,
    Finance,
    Media,
    General,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub text: String,
    pub entity_type: EntityType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalRange {
    pub start_epoch: f64,
    pub end_epoch: f64,
}

/// The stage-2/3 output of the query pipeline (§4.4). Carries both the raw
/// extraction (entities, temporal range, doc-type intent) and the routing
/// decision (class/domain/confidence/semantic need) in one value so stages
/// 5-9 never need to re-derive either.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    pub original_query: String,
    pub cleaned_query: String,
    pub entities: Vec<Entity>,
    pub temporal: Option<TemporalRange>,
    pub doc_type_intent: Option<String>,
    pub location_hints: Vec<String>,
    pub key_tokens: Vec<String>,
    pub query_class: QueryClass,
    pub query_class_confidence: f64,
    pub query_domain: QueryDomain,
    pub query_domain_confidence: f64,
    pub semantic_need_score: f64,
    /// Compatibility alias for `queryClassConfidence`, kept for callers that
    /// predate the class/domain split.
    pub nlu_confidence: f64,
}

/// Ambient signals a search call carries alongside the raw query text
/// (cwd proximity, frontmost app) used by the scorer's context boost.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryContext {
    #[serde(default)]
    pub cwd_path: Option<String>,
    #[serde(default)]
    pub frontmost_app_bundle_id: Option<String>,
}
