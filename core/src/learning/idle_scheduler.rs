use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sysinfo::{Components, Pid, ProcessesToUpdate, System};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::learning::online_ranker::OnlineRanker;
use crate::learning::ranker_trait::{Ranker, TrainCycleConfig};
use crate::learning::rollout::RolloutGate;
use crate::learning::training::{PromotionGateConfig, TrainingCycle};
use crate::repositories::settings_repo::SettingsRepo;

const TICK_MS: u64 = 60_000;
const COOLDOWN_MS: i64 = 60_000;
const PAUSE_AFTER_ACTIVITY_MS: i64 = 10_000;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Tracks the wall-clock of the last observed user activity so the idle-cycle
/// scheduler can honor `learningPauseOnUserInput` (§4.5.5). The behavior-event
/// intake path calls `record()` on every accepted event.
#[derive(Clone)]
pub struct ActivityTracker {
    last_activity_ms: Arc<AtomicI64>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self { last_activity_ms: Arc::new(AtomicI64::new(now_ms())) }
    }

    pub fn record(&self) {
        self.last_activity_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn idle_for_ms(&self) -> i64 {
        now_ms() - self.last_activity_ms.load(Ordering::Relaxed)
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy)]
struct ResourceBudget {
    cpu_max_pct: f32,
    rss_max_mb: u64,
    thermal_max_c: f32,
}

impl ResourceBudget {
    /// Runs the sysinfo refresh on a blocking thread since it does real
    /// syscalls and shouldn't stall the async scheduler loop.
    async fn within_budget(self) -> bool {
        tokio::task::spawn_blocking(move || {
            let mut system = System::new();
            let pid = Pid::from_u32(std::process::id());
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

            let cpu_ok = system.process(pid).map(|p| p.cpu_usage() <= self.cpu_max_pct).unwrap_or(true);
            let rss_ok = system
                .process(pid)
                .map(|p| p.memory() / (1024 * 1024) <= self.rss_max_mb)
                .unwrap_or(true);

            let components = Components::new_with_refreshed_list();
            let thermal_ok = components
                .iter()
                .all(|c| c.temperature().map(|t| t < self.thermal_max_c).unwrap_or(true));

            cpu_ok && rss_ok && thermal_ok
        })
        .await
        .unwrap_or(true)
    }
}

/// Drives the §4.5.5 idle-cycle scheduler: a periodic timer races a
/// `CancellationToken`, and on every tick that isn't cancelled, walks the full
/// gate chain (learning enabled, rollout mode, pause-on-input, cooldown,
/// resource budget) before calling into the same `cycleRunning`-guarded
/// `TrainingCycle::run` a manual trigger uses.
pub struct IdleCycleScheduler {
    training_cycle: Arc<TrainingCycle>,
    settings: SettingsRepo,
    rollout: RolloutGate,
    activity: ActivityTracker,
    last_cycle_start_ms: AtomicI64,
    resource_budget: ResourceBudget,
}

impl IdleCycleScheduler {
    pub fn new(training_cycle: Arc<TrainingCycle>, settings: SettingsRepo, activity: ActivityTracker) -> Self {
        let rollout = RolloutGate::new(settings.clone());
        Self {
            training_cycle,
            settings,
            rollout,
            activity,
            last_cycle_start_ms: AtomicI64::new(0),
            resource_budget: ResourceBudget { cpu_max_pct: 70.0, rss_max_mb: 1024, thermal_max_c: 95.0 },
        }
    }

    async fn gate_reason(&self) -> Option<&'static str> {
        if !self.rollout.learning_enabled().await {
            return Some("learning_disabled");
        }
        if !self.rollout.mode().await.allows_training() {
            return Some("rollout_mode_disallows_training");
        }

        let pause_on_input = self.settings.get_bool("learningPauseOnUserInput", true).await;
        if pause_on_input && self.activity.idle_for_ms() < PAUSE_AFTER_ACTIVITY_MS {
            return Some("user_active");
        }

        let last_start = self.last_cycle_start_ms.load(Ordering::Relaxed);
        if last_start > 0 && now_ms() - last_start < COOLDOWN_MS {
            return Some("cooldown");
        }

        if !self.resource_budget.within_budget().await {
            return Some("resource_budget_exceeded");
        }

        None
    }

    /// Runs the scheduler loop until `cancel` fires. Intended to be spawned
    /// once as a background task for the process lifetime.
    pub async fn run(self: Arc<Self>, ranker: Arc<Mutex<OnlineRanker>>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancel.cancelled() => return,
            }

            if let Some(reason) = self.gate_reason().await {
                tracing::debug!(target: "finder_core::learning", reason, "idle cycle skipped");
                continue;
            }

            self.last_cycle_start_ms.store(now_ms(), Ordering::Relaxed);
            let train_config = TrainCycleConfig::default();
            let gate_config = PromotionGateConfig::default();
            let mut guard = ranker.lock().await;
            match self
                .training_cycle
                .run(&mut *guard as &mut dyn Ranker, &train_config, &gate_config, false)
                .await
            {
                Ok(result) => {
                    tracing::info!(
                        target: "finder_core::learning",
                        status = result.status,
                        reason = %result.reason,
                        promoted = result.promoted,
                        "idle training cycle finished"
                    );
                }
                Err(err) => {
                    tracing::warn!(target: "finder_core::learning", error = %err, "idle training cycle failed");
                }
            }
        }
    }
}
