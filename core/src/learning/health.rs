use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::repositories::behavior_repo::BehaviorRepo;
use crate::repositories::reservoir_repo::ReservoirRepo;
use crate::repositories::settings_repo::SettingsRepo;
use crate::repositories::training_repo::TrainingRepo;

/// Learning engine sub-snapshot embedded under `HealthSnapshotV2.components.learning`
/// (§4.5.8, ambient). Every counter also lives in `settings` so it survives a
/// process restart, mirroring the source's habit of persisting every counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningHealthSnapshot {
    pub last_cycle_status: String,
    pub last_cycle_reason: String,
    pub last_active_loss: f64,
    pub last_candidate_loss: f64,
    pub last_sample_count: i64,
    pub last_promoted: bool,
    pub cycles_run: i64,
    pub cycles_succeeded: i64,
    pub cycles_rejected: i64,
    pub pending_examples: i64,
    pub reservoir_size: i64,
    pub active_backend: String,
    pub active_version: String,
}

pub struct LearningHealthSource {
    settings: SettingsRepo,
    training_repo: TrainingRepo,
    reservoir_repo: ReservoirRepo,
    behavior_repo: BehaviorRepo,
}

impl LearningHealthSource {
    pub fn new(
        settings: SettingsRepo,
        training_repo: TrainingRepo,
        reservoir_repo: ReservoirRepo,
        behavior_repo: BehaviorRepo,
    ) -> Self {
        Self {
            settings,
            training_repo,
            reservoir_repo,
            behavior_repo,
        }
    }

    pub async fn snapshot(&self) -> Result<LearningHealthSnapshot, CoreError> {
        let _ = self.behavior_repo.count().await?;
        Ok(LearningHealthSnapshot {
            last_cycle_status: self
                .settings
                .get("onlineRankerLastCycleStatus")
                .await?
                .unwrap_or_else(|| "never_run".to_string()),
            last_cycle_reason: self
                .settings
                .get("onlineRankerLastCycleReason")
                .await?
                .unwrap_or_default(),
            last_active_loss: self.settings.get_f64("onlineRankerLastActiveLoss", 0.0).await,
            last_candidate_loss: self.settings.get_f64("onlineRankerLastCandidateLoss", 0.0).await,
            last_sample_count: self.settings.get_int("onlineRankerLastSampleCount", 0).await,
            last_promoted: self.settings.get_bool("onlineRankerLastPromoted", false).await,
            cycles_run: self.settings.get_int("onlineRankerCyclesRun", 0).await,
            cycles_succeeded: self.settings.get_int("onlineRankerCyclesSucceeded", 0).await,
            cycles_rejected: self.settings.get_int("onlineRankerCyclesRejected", 0).await,
            pending_examples: self.training_repo.pending_count().await?,
            reservoir_size: self.reservoir_repo.size().await?,
            active_backend: self
                .settings
                .get("onlineRankerActiveBackend")
                .await?
                .unwrap_or_else(|| "native_sgd".to_string()),
            active_version: self
                .settings
                .get("onlineRankerActiveVersion")
                .await?
                .unwrap_or_else(|| "cold_start".to_string()),
        })
    }

    /// Persists the counters a completed cycle updates, so a restart observes
    /// the same state the in-memory `LearningEngine` would have held.
    pub async fn record_cycle(&self, result: &crate::learning::training::CycleResult) -> Result<(), CoreError> {
        self.settings.set("onlineRankerLastCycleStatus", result.status).await?;
        self.settings.set("onlineRankerLastCycleReason", &result.reason).await?;
        self.settings
            .set("onlineRankerLastActiveLoss", &result.active_loss.to_string())
            .await?;
        self.settings
            .set("onlineRankerLastCandidateLoss", &result.candidate_loss.to_string())
            .await?;
        self.settings
            .set("onlineRankerLastSampleCount", &result.sample_count.to_string())
            .await?;
        self.settings
            .set("onlineRankerLastPromoted", if result.promoted { "1" } else { "0" })
            .await?;

        let cycles_run = self.settings.get_int("onlineRankerCyclesRun", 0).await + 1;
        self.settings.set("onlineRankerCyclesRun", &cycles_run.to_string()).await?;
        if result.promoted {
            let succeeded = self.settings.get_int("onlineRankerCyclesSucceeded", 0).await + 1;
            self.settings
                .set("onlineRankerCyclesSucceeded", &succeeded.to_string())
                .await?;
        } else {
            let rejected = self.settings.get_int("onlineRankerCyclesRejected", 0).await + 1;
            self.settings
                .set("onlineRankerCyclesRejected", &rejected.to_string())
                .await?;
        }
        Ok(())
    }
}
