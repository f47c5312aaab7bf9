use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::learning::ranker_trait::{Ranker, TrainCycleConfig, TrainOutcome, TrainRejectReason, TrainingSample};

const DEFAULT_FEATURE_DIM: usize = 13;
const PROMOTION_MARGIN: f64 = 0.002;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Weights {
    version: String,
    bias: f64,
    weights: Vec<f64>,
    #[serde(skip)]
    valid: bool,
}

impl Weights {
    fn cold_start() -> Self {
        Self {
            version: "cold_start".to_string(),
            bias: 0.0,
            weights: vec![0.0; DEFAULT_FEATURE_DIM],
            valid: false,
        }
    }
}

fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

fn score_raw(model: &Weights, features: &[f64]) -> f64 {
    if !model.valid || model.weights.is_empty() || features.is_empty() {
        return 0.0;
    }
    let dim = model.weights.len().min(features.len());
    let mut acc = model.bias;
    for i in 0..dim {
        acc += model.weights[i] * features[i];
    }
    acc
}

fn log_loss(model: &Weights, examples: &[TrainingSample]) -> (f64, usize) {
    if !model.valid || model.weights.is_empty() || examples.is_empty() {
        return (0.0, 0);
    }
    let mut loss = 0.0;
    let mut count = 0usize;
    for ex in examples {
        if ex.label < 0 || ex.features.is_empty() {
            continue;
        }
        let y = if ex.label > 0 { 1.0 } else { 0.0 };
        let p = clamp(sigmoid(score_raw(model, &ex.features)), 1e-6, 1.0 - 1e-6);
        let weight = ex.weight.max(0.05);
        loss += -weight * (y * p.ln() + (1.0 - y) * (1.0 - p).ln());
        count += 1;
    }
    if count > 0 {
        (loss / count as f64, count)
    } else {
        (0.0, 0)
    }
}

fn split_train(samples: &[TrainingSample]) -> Vec<&TrainingSample> {
    samples.iter().enumerate().filter(|(i, _)| i % 5 != 0).map(|(_, s)| s).collect()
}

fn split_holdout(samples: &[TrainingSample]) -> Vec<TrainingSample> {
    samples.iter().enumerate().filter(|(i, _)| i % 5 == 0).map(|(_, s)| s.clone()).collect()
}

fn train_candidate(seed: &Weights, train_set: &[&TrainingSample], config: &TrainCycleConfig) -> Weights {
    let mut candidate = seed.clone();
    if candidate.weights.is_empty() {
        candidate.weights = vec![0.0; DEFAULT_FEATURE_DIM];
    }
    candidate.valid = true;

    let dim = candidate.weights.len();
    let lr = clamp(config.learning_rate, 1e-4, 0.5);
    let l2 = clamp(config.l2, 0.0, 0.1);
    let epochs = config.epochs.max(1);

    for _ in 0..epochs {
        for ex in train_set {
            if ex.label < 0 || ex.features.is_empty() {
                continue;
            }
            let y = if ex.label > 0 { 1.0 } else { 0.0 };
            let p = sigmoid(score_raw(&candidate, &ex.features));
            let err = p - y;
            let weight = ex.weight.max(0.05);

            for i in 0..dim {
                let feature = ex.features.get(i).copied().unwrap_or(0.0);
                let grad = err * feature * weight + l2 * candidate.weights[i];
                candidate.weights[i] -= lr * grad;
            }
            candidate.bias -= lr * err * weight;
        }
    }

    candidate.version = format!("online_ranker_{}", chrono::Utc::now().format("%Y%m%d%H%M%S"));
    candidate
}

/// Linear logistic-regression ranker with atomic active/candidate promotion
/// (§4.5.4). A candidate is trained from scratch each cycle off the current
/// active weights, evaluated on a held-out 20% split, and promoted only if it
/// beats the active model's holdout loss by more than `PROMOTION_MARGIN`.
pub struct OnlineRanker {
    active_path: PathBuf,
    candidate_path: PathBuf,
    active: Weights,
}

impl OnlineRanker {
    pub fn new(active_path: PathBuf) -> Self {
        let candidate_path = active_path
            .parent()
            .and_then(Path::parent)
            .map(|root| root.join("candidate").join("weights.json"))
            .unwrap_or_else(|| active_path.with_file_name("candidate_weights.json"));
        Self {
            active_path,
            candidate_path,
            active: Weights::cold_start(),
        }
    }

    pub fn load(&mut self) -> bool {
        let Ok(bytes) = fs::read(&self.active_path) else {
            return false;
        };
        let Ok(mut parsed) = serde_json::from_slice::<Weights>(&bytes) else {
            return false;
        };
        if parsed.weights.is_empty() {
            return false;
        }
        parsed.valid = true;
        self.active = parsed;
        true
    }

    fn save_weights(model: &Weights, path: &Path) -> bool {
        if !model.valid || model.weights.is_empty() {
            return false;
        }
        if let Some(parent) = path.parent() {
            if fs::create_dir_all(parent).is_err() {
                return false;
            }
        }
        let Ok(bytes) = serde_json::to_vec(model) else {
            return false;
        };
        fs::write(path, bytes).is_ok()
    }

    pub fn version(&self) -> &str {
        &self.active.version
    }

    pub fn feature_dim(&self) -> usize {
        self.active.weights.len()
    }
}

impl Ranker for OnlineRanker {
    fn score(&self, features: &[f64]) -> f64 {
        if !self.has_model() {
            return 0.5;
        }
        sigmoid(score_raw(&self.active, features))
    }

    fn boost(&self, features: &[f64], blend_alpha: f64) -> f64 {
        if !self.has_model() || blend_alpha <= 0.0 {
            return 0.0;
        }
        let p = self.score(features);
        24.0 * clamp(blend_alpha, 0.0, 1.0) * (p - 0.5)
    }

    fn has_model(&self) -> bool {
        self.active.valid && !self.active.weights.is_empty()
    }

    fn train_and_promote(&mut self, samples: &[TrainingSample], config: &TrainCycleConfig) -> TrainOutcome {
        let min_total = config.min_examples.max(20);
        if samples.len() < min_total {
            return TrainOutcome::Rejected {
                reason: TrainRejectReason::InsufficientExamples,
                active_loss: 0.0,
                candidate_loss: 0.0,
                sample_count: samples.len(),
            };
        }

        let positive_count = samples.iter().filter(|s| s.label > 0).count();
        if positive_count < config.min_positive_examples.max(12) {
            return TrainOutcome::Rejected {
                reason: TrainRejectReason::InsufficientPositiveExamples,
                active_loss: 0.0,
                candidate_loss: 0.0,
                sample_count: samples.len(),
            };
        }

        let train_set = split_train(samples);
        let holdout_set = split_holdout(samples);
        if train_set.is_empty() || holdout_set.is_empty() {
            return TrainOutcome::Rejected {
                reason: TrainRejectReason::InvalidTrainHoldoutSplit,
                active_loss: 0.0,
                candidate_loss: 0.0,
                sample_count: samples.len(),
            };
        }

        let mut seed = self.active.clone();
        if !seed.valid || seed.weights.is_empty() {
            seed = Weights {
                version: "bootstrap".to_string(),
                bias: 0.0,
                weights: vec![0.0; DEFAULT_FEATURE_DIM],
                valid: true,
            };
        }

        let candidate = train_candidate(&seed, &train_set, config);
        Self::save_weights(&candidate, &self.candidate_path);

        let (active_loss, _) = if self.active.valid {
            log_loss(&self.active, &holdout_set)
        } else {
            (1.0, 0)
        };
        let (candidate_loss, _) = log_loss(&candidate, &holdout_set);

        let promote = !self.active.valid || candidate_loss + PROMOTION_MARGIN < active_loss;
        if !promote {
            return TrainOutcome::Rejected {
                reason: TrainRejectReason::CandidateNotBetterThanActive,
                active_loss,
                candidate_loss,
                sample_count: samples.len(),
            };
        }

        let version = candidate.version.clone();
        self.active = candidate;
        self.active.valid = true;
        Self::save_weights(&self.active, &self.active_path);

        TrainOutcome::Promoted {
            version,
            active_loss,
            candidate_loss,
            sample_count: samples.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(label: i64, features: Vec<f64>) -> TrainingSample {
        TrainingSample { features, label, weight: 1.0 }
    }

    #[test]
    fn cold_start_scores_neutral() {
        let ranker = OnlineRanker::new(PathBuf::from("/tmp/does-not-exist/weights.json"));
        assert_eq!(ranker.score(&[0.1, 0.2]), 0.5);
        assert_eq!(ranker.boost(&[0.1, 0.2], 1.0), 0.0);
    }

    #[test]
    fn insufficient_examples_rejects_before_split() {
        let mut ranker = OnlineRanker::new(PathBuf::from("/tmp/bs-test-ranker/weights.json"));
        let samples: Vec<_> = (0..10).map(|_| sample(1, vec![1.0; 13])).collect();
        let outcome = ranker.train_and_promote(&samples, &TrainCycleConfig::default());
        match outcome {
            TrainOutcome::Rejected { reason, .. } => assert_eq!(reason, TrainRejectReason::InsufficientExamples),
            _ => panic!("expected rejection"),
        }
    }

    #[test]
    fn insufficient_positives_rejects() {
        let mut ranker = OnlineRanker::new(PathBuf::from("/tmp/bs-test-ranker2/weights.json"));
        let mut samples: Vec<_> = (0..30).map(|_| sample(0, vec![0.0; 13])).collect();
        samples[0] = sample(1, vec![1.0; 13]);
        let outcome = ranker.train_and_promote(&samples, &TrainCycleConfig::default());
        match outcome {
            TrainOutcome::Rejected { reason, .. } => assert_eq!(reason, TrainRejectReason::InsufficientPositiveExamples),
            _ => panic!("expected rejection"),
        }
    }

    #[test]
    fn promotes_when_no_active_model() {
        let dir = std::env::temp_dir().join(format!("bs-ranker-test-{}", std::process::id()));
        let mut ranker = OnlineRanker::new(dir.join("active/weights.json"));
        let mut samples = Vec::new();
        for i in 0..40 {
            let label = if i % 2 == 0 { 1 } else { 0 };
            let mut features = vec![0.0; 13];
            features[0] = if label == 1 { 1.0 } else { -1.0 };
            samples.push(sample(label, features));
        }
        let outcome = ranker.train_and_promote(&samples, &TrainCycleConfig::default());
        assert!(outcome.promoted());
        assert!(ranker.has_model());
    }
}
