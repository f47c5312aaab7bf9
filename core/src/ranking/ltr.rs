use crate::learning::ranker_trait::Ranker;
use crate::query::QueryClass;
use crate::ranking::scorer::sort_by_score;
use crate::ranking::types::{Candidate, MatchType};

pub struct LtrContext {
    pub query_class: QueryClass,
    pub router_confidence: f64,
    pub semantic_need_score: f64,
}

fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    v.max(lo).min(hi)
}

/// Stage 7 "Personalized rerank" (§4.4). Builds the bounded feature vector
/// from each candidate's own signals plus query-level context, then blends in
/// the shared `Ranker`'s boost — the same trait implementation
/// (`OnlineRanker`) that §4.5.6 gates for serving, per the design note that
/// stage 7's personalized model and the online ranker share one trait.
/// Returns the summed delta applied to the top 10 candidates, for telemetry.
pub fn rerank(
    candidates: &mut [Candidate],
    context: &LtrContext,
    ranker: &dyn Ranker,
    blend_alpha: f64,
    max_candidates: usize,
) -> f64 {
    if !ranker.has_model() || candidates.is_empty() || max_candidates == 0 {
        return 0.0;
    }

    let limit = max_candidates.min(candidates.len());
    let mut delta_top10 = 0.0;

    for (i, candidate) in candidates.iter_mut().take(limit).enumerate() {
        let semantic_feature = clamp(candidate.semantic_normalized, 0.0, 1.0);
        let cross_feature = clamp(candidate.cross_encoder_score, 0.0, 1.0);
        let feedback_feature = clamp(
            (candidate.score_breakdown.pinned_boost + candidate.score_breakdown.frequency_boost) / 40.0,
            0.0,
            1.0,
        );
        let router_feature = clamp(context.router_confidence, 0.0, 1.0);
        let semantic_need_feature = clamp(context.semantic_need_score, 0.0, 1.0);
        let exact_feature = matches!(candidate.match_type, MatchType::ExactName | MatchType::PrefixName) as i32 as f64;
        let path_code_feature = if context.query_class == QueryClass::PathOrCode && semantic_feature > 0.7 {
            1.0
        } else {
            0.0
        };

        let features = vec![
            semantic_feature,
            cross_feature,
            feedback_feature,
            router_feature,
            semantic_need_feature,
            exact_feature,
            path_code_feature,
        ];

        let delta = clamp(ranker.boost(&features, blend_alpha), -8.0, 8.0);
        candidate.score += delta;
        candidate.score_breakdown.m2_signal_boost += delta;
        if i < 10 {
            delta_top10 += delta;
        }
    }

    sort_by_score(candidates);
    delta_top10
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::types::ScoreBreakdown;

    struct StubRanker {
        model: bool,
    }

    impl Ranker for StubRanker {
        fn score(&self, _features: &[f64]) -> f64 {
            0.9
        }
        fn boost(&self, _features: &[f64], blend_alpha: f64) -> f64 {
            if !self.model || blend_alpha <= 0.0 {
                return 0.0;
            }
            5.0
        }
        fn has_model(&self) -> bool {
            self.model
        }
        fn train_and_promote(
            &mut self,
            _samples: &[crate::learning::ranker_trait::TrainingSample],
            _config: &crate::learning::ranker_trait::TrainCycleConfig,
        ) -> crate::learning::ranker_trait::TrainOutcome {
            unimplemented!()
        }
    }

    fn candidate(item_id: i64, score: f64) -> Candidate {
        Candidate {
            item_id,
            path: "/x".to_string(),
            name: "x".to_string(),
            kind: "file".to_string(),
            match_type: MatchType::ContainsName,
            bm25_raw_score: 0.0,
            semantic_normalized: 0.5,
            cross_encoder_score: 0.0,
            score_breakdown: ScoreBreakdown::default(),
            fuzzy_distance: None,
            score,
            is_pinned: false,
            modified_at: 0,
            open_count: 0,
            last_opened_at: 0,
        }
    }

    #[test]
    fn no_model_returns_zero_delta() {
        let mut candidates = vec![candidate(1, 10.0)];
        let ranker = StubRanker { model: false };
        let ctx = LtrContext { query_class: QueryClass::NaturalLanguage, router_confidence: 0.5, semantic_need_score: 0.5 };
        let delta = rerank(&mut candidates, &ctx, &ranker, 1.0, 100);
        assert_eq!(delta, 0.0);
        assert_eq!(candidates[0].score, 10.0);
    }

    #[test]
    fn applies_boost_and_resorts() {
        let mut candidates = vec![candidate(1, 10.0), candidate(2, 12.0)];
        let ranker = StubRanker { model: true };
        let ctx = LtrContext { query_class: QueryClass::NaturalLanguage, router_confidence: 0.5, semantic_need_score: 0.5 };
        let delta = rerank(&mut candidates, &ctx, &ranker, 1.0, 100);
        assert_eq!(delta, 10.0);
        assert_eq!(candidates[0].score, 17.0);
        assert_eq!(candidates[1].score, 15.0);
    }
}
