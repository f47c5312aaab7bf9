use std::sync::Arc;
use std::time::Instant;

use crate::config::RuntimePaths;
use crate::db::Database;
use crate::error::CoreError;
use crate::health::HealthAggregator;
use crate::learning::health::LearningHealthSource;
use crate::learning::idle_scheduler::ActivityTracker;
use crate::learning::online_ranker::OnlineRanker;
use crate::learning::ranker_trait::Ranker;
use crate::learning::reservoir::ReplayReservoir;
use crate::learning::training::TrainingCycle;
use crate::repositories::behavior_repo::BehaviorRepo;
use crate::repositories::item_repo::ItemRepo;
use crate::repositories::reservoir_repo::ReservoirRepo;
use crate::repositories::settings_repo::SettingsRepo;
use crate::repositories::training_repo::TrainingRepo;
use crate::supervisor::Supervisor;

/// Shared handles wired once at startup and threaded through every IPC
/// request handler and background task (§6). Follows the teacher's
/// `AppState::initialize(...)`-as-async-constructor convention: repositories
/// are built from the database's split read/write pools, then handed to the
/// services that sit on top of them.
#[derive(Clone)]
pub struct AppState {
    pub paths: RuntimePaths,
    pub db: Arc<Database>,

    pub settings_repo: SettingsRepo,
    pub item_repo: ItemRepo,
    pub training_repo: TrainingRepo,
    pub behavior_repo: BehaviorRepo,
    pub reservoir_repo: ReservoirRepo,

    pub supervisor: Arc<Supervisor>,
    pub health: Arc<HealthAggregator>,
    pub ranker: Arc<tokio::sync::Mutex<OnlineRanker>>,
    pub training_cycle: Arc<TrainingCycle>,
    pub activity: ActivityTracker,

    pub startup_started_at_utc: String,
    pub startup_init_ms: i64,
}

impl AppState {
    pub async fn initialize(paths: RuntimePaths) -> Result<Self, CoreError> {
        let startup_clock = Instant::now();
        let startup_started_at_utc = chrono::Utc::now().to_rfc3339();

        let db = Arc::new(Database::new(&paths.data_dir, 4).await?);
        let read_pool = db.read_pool().clone();
        let write_pool = db.write_pool().clone();

        let settings_repo = SettingsRepo::with_pools(read_pool.clone(), write_pool.clone());
        let item_repo = ItemRepo::with_pools(read_pool.clone(), write_pool.clone());
        let training_repo = TrainingRepo::with_pools(read_pool.clone(), write_pool.clone());
        let behavior_repo = BehaviorRepo::with_pools(read_pool.clone(), write_pool.clone());
        let reservoir_repo = ReservoirRepo::with_pools(read_pool.clone(), write_pool.clone());

        let supervisor = Arc::new(Supervisor::new(paths.socket_dir.clone()));

        let active_weights_path = paths
            .data_dir
            .join("models")
            .join("online-ranker-v1")
            .join("active")
            .join("weights.json");
        let mut ranker = OnlineRanker::new(active_weights_path);
        ranker.load();
        tracing::info!(target: "finder_core::state", version = ranker.version(), "online ranker loaded");
        let ranker = Arc::new(tokio::sync::Mutex::new(ranker));

        let reservoir = ReplayReservoir::new(reservoir_repo.clone(), settings_repo.clone());
        let training_cycle = Arc::new(TrainingCycle::new(
            training_repo.clone(),
            reservoir,
            settings_repo.clone(),
        ));

        let learning_health = LearningHealthSource::new(
            settings_repo.clone(),
            training_repo.clone(),
            reservoir_repo.clone(),
            behavior_repo.clone(),
        );
        let health = Arc::new(HealthAggregator::new(
            paths.instance_id.clone(),
            supervisor.clone(),
            learning_health,
        ));

        let activity = ActivityTracker::new();

        let startup_init_ms = startup_clock.elapsed().as_millis() as i64;
        tracing::info!(target: "finder_core::state", startup_init_ms, "core state initialized");

        Ok(Self {
            paths,
            db,
            settings_repo,
            item_repo,
            training_repo,
            behavior_repo,
            reservoir_repo,
            supervisor,
            health,
            ranker,
            training_cycle,
            activity,
            startup_started_at_utc,
            startup_init_ms,
        })
    }

    /// Scores a candidate's feature vector against the currently active ranker.
    pub async fn score(&self, features: &[f64]) -> f64 {
        self.ranker.lock().await.score(features)
    }

    pub async fn shutdown(&self) {
        self.supervisor.stop_all().await;
        self.db.optimize().await;
    }
}
