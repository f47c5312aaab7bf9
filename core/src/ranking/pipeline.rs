use std::collections::HashMap;

use serde::Serialize;
use serde_json::json;

use crate::error::CoreError;
use crate::ipc::message::IpcEnvelope;
use crate::learning::ranker_trait::Ranker;
use crate::query::{structure_query, QueryClass, QueryContext, QueryDomain};
use crate::ranking::ltr::{rerank, LtrContext};
use crate::ranking::match_classifier::{classify, edit_distance};
use crate::ranking::scorer::{Scorer, ScoringWeights};
use crate::ranking::types::{Candidate, MatchType};
use crate::repositories::item_repo::ItemRepo;
use crate::repositories::training_repo::TrainingRepo;
use crate::supervisor::Supervisor;

const LEXICAL_LIMIT: i64 = 200;
const SEMANTIC_LIMIT: i64 = 200;
const RETRIEVE_TIMEOUT_MS: u64 = 400;
const RERANK_MAX_CANDIDATES: usize = 100;

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub candidates: Vec<Candidate>,
    pub query_class: QueryClass,
    pub query_domain: QueryDomain,
    pub router_confidence: f64,
    pub semantic_need_score: f64,
    pub rerank_delta_top10: f64,
}

struct RawHit {
    item_id: i64,
    bm25_raw: f64,
    semantic_normalized: f64,
}

/// Stage 4 "Retrieve" (§4.4): the lexical and semantic indexes are owned by
/// the supervised `indexer`/`query` worker processes, never by this crate.
/// Hits from both are merged here by itemId; a worker that isn't ready is
/// silently skipped rather than failing the whole search.
async fn retrieve(supervisor: &Supervisor, cleaned_query: &str) -> HashMap<i64, RawHit> {
    let mut merged: HashMap<i64, RawHit> = HashMap::new();

    if let Some(client) = supervisor.client_for("indexer").await {
        let params = json!({ "query": cleaned_query, "limit": LEXICAL_LIMIT });
        if let Ok(Some(IpcEnvelope::Response { result, .. })) =
            client.send_request("lexicalSearch", Some(params), RETRIEVE_TIMEOUT_MS).await
        {
            if let Some(hits) = result.get("hits").and_then(|h| h.as_array()) {
                for hit in hits {
                    let Some(item_id) = hit.get("itemId").and_then(|v| v.as_i64()) else { continue };
                    let bm25 = hit.get("bm25").and_then(|v| v.as_f64()).unwrap_or(0.0);
                    merged
                        .entry(item_id)
                        .or_insert(RawHit { item_id, bm25_raw: 0.0, semantic_normalized: 0.0 })
                        .bm25_raw = bm25;
                }
            }
        }
    }

    if let Some(client) = supervisor.client_for("query").await {
        let params = json!({ "query": cleaned_query, "limit": SEMANTIC_LIMIT });
        if let Ok(Some(IpcEnvelope::Response { result, .. })) =
            client.send_request("semanticSearch", Some(params), RETRIEVE_TIMEOUT_MS).await
        {
            if let Some(hits) = result.get("hits").and_then(|h| h.as_array()) {
                for hit in hits {
                    let Some(item_id) = hit.get("itemId").and_then(|v| v.as_i64()) else { continue };
                    let similarity = hit.get("similarity").and_then(|v| v.as_f64()).unwrap_or(0.0);
                    let entry = merged
                        .entry(item_id)
                        .or_insert(RawHit { item_id, bm25_raw: 0.0, semantic_normalized: 0.0 });
                    entry.semantic_normalized = similarity.clamp(0.0, 1.0);
                }
            }
        }
    }

    merged
}

/// Rank-based exposure weight used by the attribution cascade's inverse
/// propensity correction: lower-ranked results get more weight since a click
/// on them is stronger evidence of relevance than a top-1 click.
fn exposure_bias_weight(rank: usize) -> f64 {
    (((rank + 2) as f64).log2()).clamp(1.0, 4.0)
}

/// Runs the full §4.4 pipeline: structure the query (stages 1-3), retrieve
/// externally (stage 4), classify and score each hydrated candidate (stages
/// 5-6), optionally rerank with the online ranker (stage 7), sort (stage 8),
/// and record an exposure row per result (stage 9).
#[allow(clippy::too_many_arguments)]
pub async fn search(
    supervisor: &Supervisor,
    item_repo: &ItemRepo,
    training_repo: &TrainingRepo,
    ranker: &dyn Ranker,
    blend_alpha_if_allowed: Option<f64>,
    raw_query: &str,
    context: &QueryContext,
) -> Result<SearchResponse, CoreError> {
    let structured = structure_query(raw_query);
    let raw_hits = retrieve(supervisor, &structured.cleaned_query).await;

    if raw_hits.is_empty() {
        return Ok(SearchResponse {
            candidates: Vec::new(),
            query_class: structured.query_class,
            query_domain: structured.query_domain,
            router_confidence: structured.query_class_confidence,
            semantic_need_score: structured.semantic_need_score,
            rerank_delta_top10: 0.0,
        });
    }

    let ids: Vec<i64> = raw_hits.keys().copied().collect();
    let items = item_repo.get_items(&ids).await?;
    let items_by_id: HashMap<i64, crate::db::models::ItemRow> = items.into_iter().map(|i| (i.item_id, i)).collect();

    let mut candidates = Vec::with_capacity(raw_hits.len());
    for hit in raw_hits.into_values() {
        let Some(item) = items_by_id.get(&hit.item_id) else { continue };
        let interaction = item_repo.get_interaction(hit.item_id).await?;
        let (open_count, last_opened_at) = interaction.map(|i| (i.open_count, i.last_opened_at)).unwrap_or((0, 0));

        let is_content_only = hit.semantic_normalized == 0.0 && hit.bm25_raw < 0.0;
        let mut fuzzy_distance = None;
        let match_type = if is_content_only {
            MatchType::Content
        } else {
            let classified = classify(&structured.cleaned_query, &item.name, &item.path);
            if classified == MatchType::Fuzzy {
                fuzzy_distance = Some(edit_distance(&structured.cleaned_query, &item.name) as i32);
            }
            classified
        };

        candidates.push(Candidate {
            item_id: item.item_id,
            path: item.path.clone(),
            name: item.name.clone(),
            kind: item.kind.clone(),
            match_type,
            bm25_raw_score: hit.bm25_raw,
            semantic_normalized: hit.semantic_normalized,
            cross_encoder_score: 0.0,
            score_breakdown: Default::default(),
            fuzzy_distance,
            score: 0.0,
            is_pinned: item.is_pinned != 0,
            modified_at: item.modified_at,
            open_count,
            last_opened_at,
        });
    }

    let scorer = Scorer::new(ScoringWeights::default());
    scorer.rank(&mut candidates, context, now_epoch());

    let rerank_delta = if let Some(alpha) = blend_alpha_if_allowed {
        let ltr_context = LtrContext {
            query_class: structured.query_class,
            router_confidence: structured.query_class_confidence,
            semantic_need_score: structured.semantic_need_score,
        };
        rerank(&mut candidates, &ltr_context, ranker, alpha, RERANK_MAX_CANDIDATES)
    } else {
        0.0
    };

    record_exposures(training_repo, raw_query, &structured.cleaned_query, &candidates).await;

    Ok(SearchResponse {
        candidates,
        query_class: structured.query_class,
        query_domain: structured.query_domain,
        router_confidence: structured.query_class_confidence,
        semantic_need_score: structured.semantic_need_score,
        rerank_delta_top10: rerank_delta,
    })
}

/// Stage 9 "Expose" (§4.4): one unknown-label exposure row per returned
/// candidate. Best-effort — a failed write must never fail the search itself.
async fn record_exposures(training_repo: &TrainingRepo, raw_query: &str, cleaned_query: &str, candidates: &[Candidate]) {
    let created_at = now_ms();
    for (rank, candidate) in candidates.iter().enumerate() {
        let weight = exposure_bias_weight(rank);
        let features = vec![
            candidate.score_breakdown.base_match_score,
            candidate.score_breakdown.recency_boost,
            candidate.score_breakdown.frequency_boost,
            candidate.score_breakdown.context_boost,
            candidate.score_breakdown.pinned_boost,
            candidate.semantic_normalized,
            candidate.cross_encoder_score,
            candidate.score_breakdown.structured_query_boost,
            candidate.score_breakdown.m2_signal_boost,
            rank as f64,
        ];
        let Ok(features_json) = serde_json::to_string(&features) else { continue };
        if let Err(err) = training_repo
            .record_exposure(created_at, raw_query, cleaned_query, candidate.item_id, &candidate.path, weight, &features_json, None, None)
            .await
        {
            tracing::warn!(target: "finder_core::ranking", error = %err, item_id = candidate.item_id, "failed to record exposure");
        }
    }
}
