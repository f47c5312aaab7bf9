use std::env;
use std::path::PathBuf;

/// Runtime paths and identity, resolved once at startup from the environment (§6).
/// Everything below `RuntimePaths` is read once; per-component tunables (weights,
/// gate thresholds, budgets) live in the `settings` table instead, so they can be
/// retuned without a restart.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    pub runtime_dir: PathBuf,
    pub socket_dir: PathBuf,
    pub pid_dir: PathBuf,
    pub data_dir: PathBuf,
    pub instance_id: String,
}

impl RuntimePaths {
    pub fn from_env(app_name: &str, data_dir: PathBuf) -> Self {
        let uid = current_uid();
        let default_runtime = PathBuf::from(format!("/tmp/{app_name}-{uid}"));

        let runtime_dir = env::var("RUNTIME_DIR").map(PathBuf::from).unwrap_or_else(|_| default_runtime.clone());
        let socket_dir = env::var("SOCKET_DIR").map(PathBuf::from).unwrap_or_else(|_| runtime_dir.clone());
        let pid_dir = env::var("PID_DIR").map(PathBuf::from).unwrap_or_else(|_| runtime_dir.clone());
        let instance_id = env::var("INSTANCE_ID").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

        Self {
            runtime_dir,
            socket_dir,
            pid_dir,
            data_dir,
            instance_id,
        }
    }

    pub fn socket_path(&self, service_name: &str) -> PathBuf {
        self.socket_dir.join(format!("{service_name}.sock"))
    }
}

#[cfg(unix)]
fn current_uid() -> u32 {
    nix::unistd::getuid().as_raw()
}

#[cfg(not(unix))]
fn current_uid() -> u32 {
    0
}

/// Selects which source the health fetching path consults first (`HEALTH_SOURCE_MODE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthSourceMode {
    Legacy,
    AggregatorPrimary,
    AggregatorPreferred,
}

impl HealthSourceMode {
    pub fn from_env() -> Self {
        match env::var("HEALTH_SOURCE_MODE").as_deref() {
            Ok("legacy") => Self::Legacy,
            Ok("aggregator_primary") => Self::AggregatorPrimary,
            _ => Self::AggregatorPreferred,
        }
    }
}

pub fn models_dir() -> Option<PathBuf> {
    env::var("MODELS_DIR").ok().map(PathBuf::from)
}

pub fn online_ranker_bootstrap_dir() -> Option<PathBuf> {
    env::var("ONLINE_RANKER_BOOTSTRAP_DIR").ok().map(PathBuf::from)
}
