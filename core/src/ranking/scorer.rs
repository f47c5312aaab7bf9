use crate::query::QueryContext;
use crate::ranking::types::{Candidate, MatchType, ScoreBreakdown};

#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub exact_name_weight: f64,
    pub prefix_name_weight: f64,
    pub contains_name_weight: f64,
    pub exact_path_weight: f64,
    pub prefix_path_weight: f64,
    pub content_match_weight: f64,
    pub fuzzy_match_weight: f64,
    pub recency_weight: f64,
    pub recency_decay_days: f64,
    pub frequency_tier1_boost: f64,
    pub frequency_tier2_boost: f64,
    pub frequency_tier3_boost: f64,
    pub junk_penalty_weight: f64,
    pub pinned_boost_weight: f64,
    pub cwd_boost_weight: f64,
    pub app_context_boost_weight: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            exact_name_weight: 100.0,
            prefix_name_weight: 80.0,
            contains_name_weight: 60.0,
            exact_path_weight: 95.0,
            prefix_path_weight: 75.0,
            content_match_weight: 10.0,
            fuzzy_match_weight: 40.0,
            recency_weight: 20.0,
            recency_decay_days: 14.0,
            frequency_tier1_boost: 5.0,
            frequency_tier2_boost: 12.0,
            frequency_tier3_boost: 20.0,
            junk_penalty_weight: 50.0,
            pinned_boost_weight: 30.0,
            cwd_boost_weight: 15.0,
            app_context_boost_weight: 10.0,
        }
    }
}

const IMPORTANT_DOTFILES: &[&str] = &[
    ".gitignore", ".gitattributes", ".gitmodules", ".editorconfig", ".env", ".envrc", ".zshrc",
    ".bashrc", ".profile", ".vimrc", ".tmux.conf", ".prettierrc", ".eslintrc", ".npmrc",
];

const JUNK_PATTERNS: &[&str] = &[
    "/node_modules/", "/.build/", "/__pycache__/", "/.cache/", "/deriveddata/", "/.trash/",
    "/vendor/bundle/", "/.git/",
];

/// Stage 6 "Score" (§4.4). Each component is computed independently so a
/// caller auditing a result can see exactly which signal moved it.
pub struct Scorer {
    weights: ScoringWeights,
}

impl Scorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    fn base_match_score(&self, match_type: MatchType, bm25_raw: f64) -> f64 {
        match match_type {
            MatchType::ExactName => self.weights.exact_name_weight,
            MatchType::PrefixName => self.weights.prefix_name_weight,
            MatchType::ContainsName => self.weights.contains_name_weight,
            MatchType::ExactPath => self.weights.exact_path_weight,
            MatchType::PrefixPath => self.weights.prefix_path_weight,
            MatchType::Fuzzy => self.weights.fuzzy_match_weight,
            MatchType::Content => (-bm25_raw).max(0.0) * self.weights.content_match_weight,
        }
    }

    fn recency_boost(&self, modified_at_epoch: i64, now_epoch: i64) -> f64 {
        if self.weights.recency_weight <= 0.0 || self.weights.recency_decay_days <= 0.0 {
            return 0.0;
        }
        let delta = (now_epoch - modified_at_epoch) as f64;
        if delta < 0.0 {
            return self.weights.recency_weight;
        }
        let decay_seconds = self.weights.recency_decay_days * 86400.0;
        self.weights.recency_weight * (-delta / decay_seconds).exp()
    }

    fn frequency_boost(&self, open_count: i64, last_open_epoch: i64, now_epoch: i64) -> f64 {
        if open_count <= 0 {
            return 0.0;
        }
        let base = if open_count >= 21 {
            self.weights.frequency_tier3_boost
        } else if open_count >= 6 {
            self.weights.frequency_tier2_boost
        } else {
            self.weights.frequency_tier1_boost
        };
        if last_open_epoch <= 0 {
            return base;
        }
        let days_since = (now_epoch - last_open_epoch) as f64 / 86400.0;
        base * (0.5 + 0.5 * (-days_since / 30.0).exp())
    }

    fn is_important_dotfile(file_name: &str) -> bool {
        IMPORTANT_DOTFILES.iter().any(|d| d.eq_ignore_ascii_case(file_name))
    }

    fn junk_penalty(&self, path: &str) -> f64 {
        if self.weights.junk_penalty_weight <= 0.0 {
            return 0.0;
        }
        let file_name = path.rsplit('/').next().unwrap_or(path);
        if Self::is_important_dotfile(file_name) {
            return 0.0;
        }
        let lower = path.to_lowercase();
        if JUNK_PATTERNS.iter().any(|p| lower.contains(p)) {
            return self.weights.junk_penalty_weight;
        }
        0.0
    }

    fn pinned_boost(&self, is_pinned: bool) -> f64 {
        if is_pinned {
            self.weights.pinned_boost_weight
        } else {
            0.0
        }
    }

    fn context_boost(&self, path: &str, context: &QueryContext) -> f64 {
        let mut boost = 0.0;
        if let Some(cwd) = context.cwd_path.as_deref().filter(|c| !c.is_empty()) {
            if path.starts_with(cwd) {
                boost += self.weights.cwd_boost_weight;
            }
        }
        if let Some(bundle_id) = context.frontmost_app_bundle_id.as_deref().filter(|b| !b.is_empty()) {
            if app_context_matches(path, bundle_id) {
                boost += self.weights.app_context_boost_weight;
            }
        }
        boost
    }

    /// Scores one candidate in place, folding in any semantic/cross-encoder/
    /// structured-query/m2 boosts already present on its breakdown (set by
    /// earlier stages or a prior rerank pass) before recomputing the total.
    pub fn score_candidate(&self, candidate: &mut Candidate, context: &QueryContext, now_epoch: i64) {
        let mut breakdown = ScoreBreakdown {
            semantic_boost: candidate.score_breakdown.semantic_boost,
            cross_encoder_boost: candidate.score_breakdown.cross_encoder_boost,
            structured_query_boost: candidate.score_breakdown.structured_query_boost,
            m2_signal_boost: candidate.score_breakdown.m2_signal_boost,
            ..ScoreBreakdown::default()
        };

        let mut base = self.base_match_score(candidate.match_type, candidate.bm25_raw_score);
        if candidate.match_type == MatchType::Fuzzy {
            if let Some(distance) = candidate.fuzzy_distance {
                if distance > 1 {
                    base *= if distance == 2 { 0.5 } else { 0.25 };
                }
            }
        }
        breakdown.base_match_score = base;

        breakdown.recency_boost = self.recency_boost(candidate.modified_at, now_epoch);
        breakdown.frequency_boost = self.frequency_boost(candidate.open_count, candidate.last_opened_at, now_epoch);
        if candidate.match_type == MatchType::Content {
            breakdown.recency_boost *= 0.25;
            breakdown.frequency_boost *= 0.5;
        }

        breakdown.context_boost = self.context_boost(&candidate.path, context);
        breakdown.pinned_boost = self.pinned_boost(candidate.is_pinned);
        breakdown.junk_penalty = self.junk_penalty(&candidate.path);

        let total = breakdown.base_match_score
            + breakdown.recency_boost
            + breakdown.frequency_boost
            + breakdown.context_boost
            + breakdown.pinned_boost
            + breakdown.semantic_boost
            + breakdown.cross_encoder_boost
            + breakdown.structured_query_boost
            + breakdown.m2_signal_boost
            - breakdown.junk_penalty;

        candidate.score_breakdown = breakdown;
        candidate.score = total.max(0.0);
    }

    /// Scores every candidate then stable-sorts by (score desc, itemId asc).
    pub fn rank(&self, candidates: &mut [Candidate], context: &QueryContext, now_epoch: i64) {
        for candidate in candidates.iter_mut() {
            self.score_candidate(candidate, context, now_epoch);
        }
        sort_by_score(candidates);
    }
}

pub fn sort_by_score(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
}

fn app_context_matches(path: &str, bundle_id: &str) -> bool {
    let lower_path = path.to_lowercase();
    bundle_id
        .to_lowercase()
        .rsplit('.')
        .next()
        .map(|seg| !seg.is_empty() && lower_path.contains(seg))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_candidate(match_type: MatchType) -> Candidate {
        Candidate {
            item_id: 1,
            path: "/home/user/docs/report.pdf".to_string(),
            name: "report.pdf".to_string(),
            kind: "file".to_string(),
            match_type,
            bm25_raw_score: 0.0,
            semantic_normalized: 0.0,
            cross_encoder_score: 0.0,
            score_breakdown: ScoreBreakdown::default(),
            fuzzy_distance: None,
            score: 0.0,
            is_pinned: false,
            modified_at: 0,
            open_count: 0,
            last_opened_at: 0,
        }
    }

    #[test]
    fn junk_path_is_penalized() {
        let scorer = Scorer::new(ScoringWeights::default());
        let mut candidate = base_candidate(MatchType::ExactName);
        candidate.path = "/repo/node_modules/pkg/index.js".to_string();
        candidate.name = "index.js".to_string();
        scorer.score_candidate(&mut candidate, &QueryContext::default(), 0);
        assert!(candidate.score_breakdown.junk_penalty > 0.0);
    }

    #[test]
    fn important_dotfile_skips_junk_penalty() {
        let scorer = Scorer::new(ScoringWeights::default());
        let mut candidate = base_candidate(MatchType::ExactName);
        candidate.path = "/repo/.git/.gitignore".to_string();
        candidate.name = ".gitignore".to_string();
        scorer.score_candidate(&mut candidate, &QueryContext::default(), 0);
        assert_eq!(candidate.score_breakdown.junk_penalty, 0.0);
    }

    #[test]
    fn fuzzy_distance_two_is_half_penalized() {
        let scorer = Scorer::new(ScoringWeights::default());
        let mut candidate = base_candidate(MatchType::Fuzzy);
        candidate.fuzzy_distance = Some(2);
        scorer.score_candidate(&mut candidate, &QueryContext::default(), 0);
        assert!((candidate.score_breakdown.base_match_score - 20.0).abs() < 1e-9);
    }

    #[test]
    fn pinned_candidate_gets_boost() {
        let scorer = Scorer::new(ScoringWeights::default());
        let mut candidate = base_candidate(MatchType::ContainsName);
        candidate.is_pinned = true;
        scorer.score_candidate(&mut candidate, &QueryContext::default(), 0);
        assert!(candidate.score_breakdown.pinned_boost > 0.0);
    }
}
