use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::db::models::TrainingExampleRow;
use crate::error::CoreError;
use crate::learning::ranker_trait::{Ranker, TrainCycleConfig, TrainOutcome, TrainingSample};
use crate::learning::reservoir::{ReplayReservoir, ReservoirCandidate};
use crate::repositories::settings_repo::SettingsRepo;
use crate::repositories::training_repo::TrainingRepo;

const SATURATION_EPSILON: f64 = 1e-3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionGateConfig {
    pub min_positives: usize,
    pub min_attributed_rate: f64,
    pub min_context_digest_rate: f64,
    pub latency_us_max: f64,
    pub latency_regression_pct_max: f64,
    pub prediction_failure_rate_max: f64,
    pub saturation_rate_max: f64,
}

impl Default for PromotionGateConfig {
    fn default() -> Self {
        Self {
            min_positives: 40,
            min_attributed_rate: 0.5,
            min_context_digest_rate: 0.3,
            latency_us_max: 5000.0,
            latency_regression_pct_max: 50.0,
            prediction_failure_rate_max: 0.01,
            saturation_rate_max: 0.5,
        }
    }
}

struct BatchAttribution {
    positive_examples: usize,
    attributed_rate: f64,
    context_digest_rate: f64,
}

fn batch_attribution_stats(rows: &[TrainingExampleRow]) -> BatchAttribution {
    let positives: Vec<&TrainingExampleRow> = rows.iter().filter(|r| r.label > 0).collect();
    let denom = positives.len().max(1) as f64;

    let attributed = positives.iter().filter(|r| r.attribution_confidence > 0.0).count();
    let context_or_digest = positives
        .iter()
        .filter(|r| r.context_event_id.is_some() || r.activity_digest.is_some())
        .count();

    BatchAttribution {
        positive_examples: positives.len(),
        attributed_rate: attributed as f64 / denom,
        context_digest_rate: context_or_digest as f64 / denom,
    }
}

struct RuntimeMetrics {
    avg_latency_us: f64,
    failure_rate: f64,
    saturation_rate: f64,
}

fn measure_runtime_metrics(ranker: &dyn Ranker, samples: &[TrainingSample]) -> RuntimeMetrics {
    if samples.is_empty() {
        return RuntimeMetrics {
            avg_latency_us: 0.0,
            failure_rate: 0.0,
            saturation_rate: 0.0,
        };
    }

    let mut total_us = 0.0f64;
    let mut failures = 0usize;
    let mut saturated = 0usize;

    for sample in samples {
        let start = Instant::now();
        let p = ranker.score(&sample.features);
        total_us += start.elapsed().as_micros() as f64;

        if !p.is_finite() {
            failures += 1;
        } else if p <= SATURATION_EPSILON || p >= 1.0 - SATURATION_EPSILON {
            saturated += 1;
        }
    }

    let n = samples.len() as f64;
    RuntimeMetrics {
        avg_latency_us: total_us / n,
        failure_rate: failures as f64 / n,
        saturation_rate: saturated as f64 / n,
    }
}

#[derive(Debug, Clone)]
pub struct CycleResult {
    pub status: &'static str,
    pub reason: String,
    pub active_loss: f64,
    pub candidate_loss: f64,
    pub sample_count: usize,
    pub promoted: bool,
    pub manual: bool,
}

/// Orchestrates one full training cycle: fetch fresh examples, merge with the
/// replay reservoir, run the attribution gate, delegate to the `Ranker` for the
/// SGD/holdout/promotion-margin decision, then gate on runtime metrics before
/// accepting the promotion (§4.5.4, §4.5.5).
pub struct TrainingCycle {
    training_repo: TrainingRepo,
    reservoir: ReplayReservoir,
    settings: SettingsRepo,
    cycle_running: Arc<AtomicBool>,
}

impl TrainingCycle {
    pub fn new(training_repo: TrainingRepo, reservoir: ReplayReservoir, settings: SettingsRepo) -> Self {
        Self {
            training_repo,
            reservoir,
            settings,
            cycle_running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cycle_running_handle(&self) -> Arc<AtomicBool> {
        self.cycle_running.clone()
    }

    fn rejected(reason: impl Into<String>, sample_count: usize, manual: bool) -> CycleResult {
        CycleResult {
            status: "rejected",
            reason: reason.into(),
            active_loss: 0.0,
            candidate_loss: 0.0,
            sample_count,
            promoted: false,
            manual,
        }
    }

    /// Runs a cycle. Returns `cycle_in_progress` immediately if one is already
    /// running (manual and idle cycles share the same guard, §5).
    pub async fn run(
        &self,
        ranker: &mut dyn Ranker,
        train_config: &TrainCycleConfig,
        gate_config: &PromotionGateConfig,
        manual: bool,
    ) -> Result<CycleResult, CoreError> {
        if self
            .cycle_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(Self::rejected("cycle_in_progress", 0, manual));
        }

        let result = self.run_locked(ranker, train_config, gate_config, manual).await;
        self.cycle_running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_locked(
        &self,
        ranker: &mut dyn Ranker,
        train_config: &TrainCycleConfig,
        gate_config: &PromotionGateConfig,
        manual: bool,
    ) -> Result<CycleResult, CoreError> {
        let batch_limit = self.settings.get_int("onlineRankerBatchLimit", 2000).await.max(1);
        let fresh_rows = self.training_repo.fetch_fresh_examples(batch_limit).await?;

        let reservoir_limit = self.settings.get_int("onlineRankerReplayBatchLimit", 2000).await.max(0);
        let replay_rows = self.reservoir.sample(reservoir_limit).await?;

        let sample_count_preview = fresh_rows.len() + replay_rows.len();
        if sample_count_preview < train_config.min_examples.max(20) {
            return Ok(Self::rejected("insufficient_examples", sample_count_preview, manual));
        }

        let attribution = batch_attribution_stats(&fresh_rows);
        if attribution.positive_examples >= gate_config.min_positives {
            let reason = if attribution.attributed_rate + 1e-9 < gate_config.min_attributed_rate {
                Some("attribution_quality_gate_failed_attributed_rate")
            } else if attribution.context_digest_rate + 1e-9 < gate_config.min_context_digest_rate {
                Some("attribution_quality_gate_failed_context_digest_rate")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Ok(Self::rejected(reason, sample_count_preview, manual));
            }
        }

        let mut samples = Vec::with_capacity(sample_count_preview);
        for row in &fresh_rows {
            samples.push(to_training_sample(row));
        }
        for row in &replay_rows {
            samples.push(TrainingSample {
                features: serde_json::from_str(&row.features_json).unwrap_or_default(),
                label: row.label,
                weight: row.weight,
            });
        }

        let baseline_metrics = measure_runtime_metrics(ranker, &samples);
        let outcome = ranker.train_and_promote(&samples, train_config);

        match outcome {
            TrainOutcome::Rejected {
                reason,
                active_loss,
                candidate_loss,
                sample_count,
            } => Ok(CycleResult {
                status: "rejected",
                reason: reason.as_str().to_string(),
                active_loss,
                candidate_loss,
                sample_count,
                promoted: false,
                manual,
            }),
            TrainOutcome::Promoted {
                version,
                active_loss,
                candidate_loss,
                sample_count,
            } => {
                let candidate_metrics = measure_runtime_metrics(ranker, &samples);
                let regression_pct = if baseline_metrics.avg_latency_us > 0.0 {
                    ((candidate_metrics.avg_latency_us - baseline_metrics.avg_latency_us)
                        / baseline_metrics.avg_latency_us)
                        * 100.0
                } else {
                    0.0
                };

                let runtime_reason = if candidate_metrics.avg_latency_us > gate_config.latency_us_max {
                    Some("candidate_latency_budget_exceeded")
                } else if regression_pct > gate_config.latency_regression_pct_max {
                    Some("candidate_latency_regression_exceeded")
                } else if candidate_metrics.failure_rate > gate_config.prediction_failure_rate_max {
                    Some("candidate_stability_failure_rate_exceeded")
                } else if candidate_metrics.saturation_rate > gate_config.saturation_rate_max {
                    Some("candidate_stability_saturation_rate_exceeded")
                } else {
                    None
                };

                if let Some(reason) = runtime_reason {
                    tracing::warn!(
                        target: "finder_core::learning",
                        reason,
                        version,
                        "promotion reverted: candidate failed runtime gate"
                    );
                    return Ok(CycleResult {
                        status: "rejected",
                        reason: reason.to_string(),
                        active_loss,
                        candidate_loss,
                        sample_count,
                        promoted: false,
                        manual,
                    });
                }

                for row in &fresh_rows {
                    if row.label < 0 || row.features_json == "[]" {
                        continue;
                    }
                    let _ = self
                        .reservoir
                        .offer(ReservoirCandidate {
                            sample_id: &row.sample_id,
                            label: row.label,
                            weight: row.weight,
                            features_json: &row.features_json,
                            query_normalized: Some(row.query_normalized.as_str()),
                            item_id: Some(row.item_id),
                            created_at: row.created_at,
                        })
                        .await;
                }

                let consumed_ids: Vec<String> = fresh_rows.iter().map(|r| r.sample_id.clone()).collect();
                self.training_repo.mark_consumed(&consumed_ids).await?;

                self.settings.set("onlineRankerActiveVersion", &version).await?;

                Ok(CycleResult {
                    status: "succeeded",
                    reason: "promoted".to_string(),
                    active_loss,
                    candidate_loss,
                    sample_count,
                    promoted: true,
                    manual,
                })
            }
        }
    }
}

fn to_training_sample(row: &TrainingExampleRow) -> TrainingSample {
    TrainingSample {
        features: serde_json::from_str(&row.features_json).unwrap_or_default(),
        label: row.label,
        weight: row.weight,
    }
}
