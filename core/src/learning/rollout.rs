use crate::repositories::settings_repo::SettingsRepo;

/// Learning rollout stages (§4.5.6). Training and serving are gated
/// independently: `shadow_training` trains without ever touching scores,
/// `blended_ranking` additionally allows the serving-time boost,
/// `instrumentation_only` disables both and only records exposures/attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutMode {
    ShadowTraining,
    BlendedRanking,
    InstrumentationOnly,
}

impl RolloutMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShadowTraining => "shadow_training",
            Self::BlendedRanking => "blended_ranking",
            Self::InstrumentationOnly => "instrumentation_only",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "blended_ranking" => Self::BlendedRanking,
            "instrumentation_only" => Self::InstrumentationOnly,
            _ => Self::ShadowTraining,
        }
    }

    pub fn allows_training(self) -> bool {
        matches!(self, Self::ShadowTraining | Self::BlendedRanking)
    }

    pub fn allows_serving(self) -> bool {
        matches!(self, Self::BlendedRanking)
    }
}

/// Reads the persisted `learningEnabled`/`rolloutMode` settings on every call
/// so a mode change made through `setSetting` takes effect on the next idle
/// cycle or search without a process restart.
#[derive(Clone)]
pub struct RolloutGate {
    settings: SettingsRepo,
}

impl RolloutGate {
    pub fn new(settings: SettingsRepo) -> Self {
        Self { settings }
    }

    pub async fn mode(&self) -> RolloutMode {
        let raw = self.settings.get("rolloutMode").await.ok().flatten();
        raw.map(|v| RolloutMode::parse(&v)).unwrap_or(RolloutMode::ShadowTraining)
    }

    pub async fn learning_enabled(&self) -> bool {
        self.settings.get_bool("learningEnabled", false).await
    }

    pub async fn allows_training(&self) -> bool {
        self.learning_enabled().await && self.mode().await.allows_training()
    }

    /// The blend alpha to pass to `Ranker::boost` if serving is currently
    /// allowed, else `None` — callers should treat `None` as "do not rerank"
    /// rather than calling `boost` with alpha 0, since a model check still
    /// happens inside `boost` itself for defense in depth.
    pub async fn serving_blend_alpha(&self) -> Option<f64> {
        if !self.learning_enabled().await || !self.mode().await.allows_serving() {
            return None;
        }
        Some(self.settings.get_f64("onlineRankerBlendAlpha", 1.0).await.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_modes_and_falls_back_to_shadow() {
        assert_eq!(RolloutMode::parse("blended_ranking"), RolloutMode::BlendedRanking);
        assert_eq!(RolloutMode::parse("instrumentation_only"), RolloutMode::InstrumentationOnly);
        assert_eq!(RolloutMode::parse("garbage"), RolloutMode::ShadowTraining);
    }

    #[test]
    fn only_blended_ranking_allows_serving() {
        assert!(!RolloutMode::ShadowTraining.allows_serving());
        assert!(RolloutMode::BlendedRanking.allows_serving());
        assert!(!RolloutMode::InstrumentationOnly.allows_serving());
    }

    #[test]
    fn shadow_and_blended_allow_training_instrumentation_does_not() {
        assert!(RolloutMode::ShadowTraining.allows_training());
        assert!(RolloutMode::BlendedRanking.allows_training());
        assert!(!RolloutMode::InstrumentationOnly.allows_training());
    }
}
