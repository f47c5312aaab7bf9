use crate::error::CoreError;
use crate::repositories::training_repo::TrainingRepo;

/// Orchestrates exposure attribution and fallback synthesis (§4.5.2). A thin
/// wrapper over `TrainingRepo` so the learning engine's call sites read as
/// intent ("attribute this interaction") rather than raw SQL tier juggling.
pub struct AttributionEngine {
    repo: TrainingRepo,
}

pub struct AttributionOutcome {
    pub matched: bool,
    pub tier_label: Option<&'static str>,
}

impl AttributionEngine {
    pub fn new(repo: TrainingRepo) -> Self {
        Self { repo }
    }

    /// Attempts the three-tier cascade; on a miss, synthesizes a trivial fallback
    /// example so the interaction is never silently lost.
    #[allow(clippy::too_many_arguments)]
    pub async fn attribute_or_fallback(
        &self,
        ts: i64,
        query: &str,
        query_normalized: &str,
        item_id: i64,
        path: &str,
        context_event_id: Option<&str>,
        activity_digest: Option<&str>,
    ) -> Result<AttributionOutcome, CoreError> {
        match self
            .repo
            .attribute_positive(ts, context_event_id, activity_digest, query_normalized)
            .await?
        {
            Some(tier) => {
                let label = match tier {
                    crate::repositories::training_repo::AttributionTier::Context => "context",
                    crate::repositories::training_repo::AttributionTier::DigestQuery => "digest_query",
                    crate::repositories::training_repo::AttributionTier::Query => "query",
                };
                Ok(AttributionOutcome {
                    matched: true,
                    tier_label: Some(label),
                })
            }
            None => {
                // No window matched a live exposure; still record the best tier the
                // caller's evidence supports rather than always falling back to Query.
                let tier = if context_event_id.is_some() {
                    crate::repositories::training_repo::AttributionTier::Context
                } else if activity_digest.is_some() {
                    crate::repositories::training_repo::AttributionTier::DigestQuery
                } else {
                    crate::repositories::training_repo::AttributionTier::Query
                };
                self.repo
                    .insert_fallback(
                        ts,
                        query,
                        query_normalized,
                        item_id,
                        path,
                        &tier,
                        context_event_id,
                        activity_digest,
                    )
                    .await?;
                Ok(AttributionOutcome {
                    matched: false,
                    tier_label: None,
                })
            }
        }
    }
}
