use rand::Rng;

use crate::error::CoreError;
use crate::repositories::reservoir_repo::ReservoirRepo;
use crate::repositories::settings_repo::SettingsRepo;

pub const DEFAULT_REPLAY_CAPACITY: i64 = 4096;
const MIN_REPLAY_CAPACITY: i64 = 256;

/// Vitter-style bounded reservoir over consumed training examples (§4.5.3). A
/// single monotonically increasing `seenCount`, persisted in `settings`, drives
/// acceptance past capacity so the sample stays uniform across the full stream.
pub struct ReplayReservoir {
    repo: ReservoirRepo,
    settings: SettingsRepo,
}

pub struct ReservoirCandidate<'a> {
    pub sample_id: &'a str,
    pub label: i64,
    pub weight: f64,
    pub features_json: &'a str,
    pub query_normalized: Option<&'a str>,
    pub item_id: Option<i64>,
    pub created_at: i64,
}

impl ReplayReservoir {
    pub fn new(repo: ReservoirRepo, settings: SettingsRepo) -> Self {
        Self { repo, settings }
    }

    pub async fn capacity(&self) -> i64 {
        self.settings
            .get_int("onlineRankerReplayCapacity", DEFAULT_REPLAY_CAPACITY)
            .await
            .max(MIN_REPLAY_CAPACITY)
    }

    async fn seen_count(&self) -> u64 {
        self.settings.get_int("onlineRankerReplaySeenCount", 0).await.max(0) as u64
    }

    async fn set_seen_count(&self, value: u64) -> Result<(), CoreError> {
        self.settings
            .set("onlineRankerReplaySeenCount", &value.to_string())
            .await
    }

    /// Offers a fresh example to the reservoir. Examples with an unknown label or
    /// empty feature vector are never admitted (mirrors the source's early-out).
    pub async fn offer(&self, candidate: ReservoirCandidate<'_>) -> Result<bool, CoreError> {
        if candidate.label < 0 || candidate.features_json == "[]" {
            return Ok(false);
        }

        let capacity = self.capacity().await;
        let current_size = self.repo.size().await?;

        let slot = if current_size < capacity {
            current_size
        } else {
            let seen = self.seen_count().await;
            let draw = rand::thread_rng().gen_range(0..=seen);
            if draw >= capacity as u64 {
                self.set_seen_count(seen + 1).await?;
                return Ok(true);
            }
            draw as i64
        };

        self.repo
            .put(
                slot,
                candidate.sample_id,
                candidate.label,
                candidate.weight.max(0.05),
                candidate.features_json,
                candidate.query_normalized,
                candidate.item_id,
                candidate.created_at,
            )
            .await?;

        let seen = self.seen_count().await;
        self.set_seen_count(seen + 1).await?;
        Ok(true)
    }

    pub async fn sample(&self, limit: i64) -> Result<Vec<crate::db::models::ReplayReservoirRow>, CoreError> {
        self.repo.sample(limit).await
    }

    pub async fn size(&self) -> Result<i64, CoreError> {
        self.repo.size().await
    }
}
