use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tokio::sync::Mutex;

use crate::learning::health::LearningHealthSource;
use crate::supervisor::{ManagedServiceSnapshot, ServiceState, Supervisor};

const POLL_INTERVAL_MS: u64 = 2000;
const DEBOUNCE_MS: u64 = 150;
const COMPONENT_STALE_MS: i64 = 6000;
const SNAPSHOT_STALE_MS: i64 = 6000;

const QUERY_PROBE_TIMEOUT_MS: u64 = 250;
const INDEXER_PROBE_TIMEOUT_MS: u64 = 250;
const INFERENCE_PROBE_TIMEOUT_MS: u64 = 300;
const EXTRACTOR_PROBE_TIMEOUT_MS: u64 = 200;

const REQUIRED_SERVICES: [&str; 4] = ["indexer", "query", "inference", "extractor"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallState {
    Healthy,
    Degraded,
    Rebuilding,
    Stale,
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStatus {
    pub state: OverallState,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    pub state: String,
    pub reason: String,
    pub last_updated_ms: i64,
    pub staleness_ms: i64,
    pub metrics: serde_json::Value,
}

/// Mirrors `HealthSnapshotV2` (§3, §4.3). Field names are camelCase to match
/// the wire contract consumers (including the legacy GUI controller) expect.
/// `overallStatus`/`snapshotState` are not stored fields: they are produced
/// purely by this type's `Serialize` impl from `overall.state`, so there is
/// never a second copy that can drift from it (§9).
#[derive(Debug, Clone)]
pub struct HealthSnapshotV2 {
    pub schema_version: u32,
    pub snapshot_id: String,
    pub snapshot_time_ms: i64,
    pub staleness_ms: i64,
    pub instance_id: String,
    pub overall: OverallStatus,
    pub components: std::collections::BTreeMap<String, ComponentStatus>,
    pub queue: serde_json::Value,
    pub index: serde_json::Value,
    pub vector: serde_json::Value,
    pub inference: serde_json::Value,
    pub processes: Vec<ManagedServiceSnapshot>,
    pub errors: Vec<String>,
    pub compatibility: serde_json::Value,
}

impl Serialize for HealthSnapshotV2 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_struct("HealthSnapshotV2", 15)?;
        s.serialize_field("schemaVersion", &self.schema_version)?;
        s.serialize_field("snapshotId", &self.snapshot_id)?;
        s.serialize_field("snapshotTimeMs", &self.snapshot_time_ms)?;
        s.serialize_field("stalenessMs", &self.staleness_ms)?;
        s.serialize_field("instanceId", &self.instance_id)?;
        s.serialize_field("overall", &self.overall)?;
        s.serialize_field("overallStatus", &self.overall.state)?;
        s.serialize_field("snapshotState", &self.overall.state)?;
        s.serialize_field("components", &self.components)?;
        s.serialize_field("queue", &self.queue)?;
        s.serialize_field("index", &self.index)?;
        s.serialize_field("vector", &self.vector)?;
        s.serialize_field("inference", &self.inference)?;
        s.serialize_field("processes", &self.processes)?;
        s.serialize_field("errors", &self.errors)?;
        s.serialize_field("compatibility", &self.compatibility)?;
        s.end()
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

async fn probe(
    supervisor: &Supervisor,
    service: &str,
    method: &str,
    timeout_ms: u64,
) -> Result<serde_json::Value, String> {
    let Some(client) = supervisor.client_for(service).await else {
        return Err("service_not_ready".to_string());
    };
    match client.send_request(method, None, timeout_ms).await {
        Ok(Some(crate::ipc::message::IpcEnvelope::Response { result, .. })) => Ok(result),
        Ok(Some(crate::ipc::message::IpcEnvelope::Error { error, .. })) => Err(error.message),
        Ok(Some(_)) => Err("unexpected_envelope".to_string()),
        Ok(None) => Err("probe_timeout".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Merges supervisor state with per-worker probe results into one versioned
/// snapshot (§4.3), debounced against event storms with a single-flight
/// refresh guard mirroring the source's `m_refreshInFlight`/`m_refreshPending`.
pub struct HealthAggregator {
    instance_id: String,
    supervisor: Arc<Supervisor>,
    learning: LearningHealthSource,
    latest: Mutex<Option<HealthSnapshotV2>>,
    refresh_in_flight: AtomicBool,
    refresh_pending: AtomicBool,
}

impl HealthAggregator {
    pub fn new(instance_id: String, supervisor: Arc<Supervisor>, learning: LearningHealthSource) -> Self {
        Self {
            instance_id,
            supervisor,
            learning,
            latest: Mutex::new(None),
            refresh_in_flight: AtomicBool::new(false),
            refresh_pending: AtomicBool::new(false),
        }
    }

    pub async fn latest(&self) -> Option<HealthSnapshotV2> {
        self.latest.lock().await.clone()
    }

    /// Runs the poll (2000ms) / debounce (150ms) timer loop. Intended to be
    /// spawned once as a background task for the lifetime of the process.
    pub async fn run(self: Arc<Self>, mut trigger: tokio::sync::mpsc::UnboundedReceiver<()>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(POLL_INTERVAL_MS));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.request_refresh().await;
                }
                Some(()) = trigger.recv() => {
                    tokio::time::sleep(Duration::from_millis(DEBOUNCE_MS)).await;
                    self.request_refresh().await;
                }
                else => break,
            }
        }
    }

    /// Single-flight: if a refresh is already running, queue exactly one
    /// follow-up rather than piling up concurrent refreshes.
    async fn request_refresh(self: &Arc<Self>) {
        if self.refresh_in_flight.swap(true, Ordering::SeqCst) {
            self.refresh_pending.store(true, Ordering::SeqCst);
            return;
        }

        let snapshot = self.build_snapshot().await;
        *self.latest.lock().await = Some(snapshot);
        self.refresh_in_flight.store(false, Ordering::SeqCst);

        if self.refresh_pending.swap(false, Ordering::SeqCst) {
            let this = self.clone();
            tokio::spawn(async move {
                this.request_refresh().await;
            });
        }
    }

    pub(crate) async fn build_snapshot(&self) -> HealthSnapshotV2 {
        let processes = self.supervisor.service_snapshot().await;

        let (query_result, indexer_result, inference_result, extractor_result) = tokio::join!(
            probe(&self.supervisor, "query", "getQueryHealth", QUERY_PROBE_TIMEOUT_MS),
            probe(&self.supervisor, "indexer", "getQueueStatus", INDEXER_PROBE_TIMEOUT_MS),
            probe(&self.supervisor, "inference", "get_inference_health", INFERENCE_PROBE_TIMEOUT_MS),
            probe(&self.supervisor, "extractor", "ping", EXTRACTOR_PROBE_TIMEOUT_MS),
        );

        let learning_snapshot = self.learning.snapshot().await.ok();

        let mut components = std::collections::BTreeMap::new();
        let now = now_ms();

        for svc in &processes {
            let probe_result = match svc.name.as_str() {
                "query" => Some(&query_result),
                "indexer" => Some(&indexer_result),
                "inference" => Some(&inference_result),
                "extractor" => Some(&extractor_result),
                _ => None,
            };

            let mut staleness = now - svc.last_updated_ms;
            if staleness < 0 {
                staleness = 0;
            }

            let mut state = format!("{:?}", svc.state).to_lowercase();
            let mut reason = svc.reason.clone();
            let metrics = match probe_result {
                Some(Ok(value)) => value.clone(),
                Some(Err(err)) => {
                    if state == "ready" {
                        state = "unavailable".to_string();
                        reason = err.clone();
                    }
                    serde_json::json!({ "error": err })
                }
                None => serde_json::json!({}),
            };

            if staleness > COMPONENT_STALE_MS {
                state = "stale".to_string();
            }

            components.insert(
                svc.name.clone(),
                ComponentStatus {
                    state,
                    reason,
                    last_updated_ms: svc.last_updated_ms,
                    staleness_ms: staleness,
                    metrics,
                },
            );
        }

        if let Some(learning) = &learning_snapshot {
            components.insert(
                "learning".to_string(),
                ComponentStatus {
                    state: "healthy".to_string(),
                    reason: String::new(),
                    last_updated_ms: now,
                    staleness_ms: 0,
                    metrics: serde_json::to_value(learning).unwrap_or(serde_json::json!({})),
                },
            );
        }

        let overall = compute_overall(&processes, &components);
        let snapshot_time_ms = now;
        let staleness_ms = components.values().map(|c| c.staleness_ms).max().unwrap_or(0);

        HealthSnapshotV2 {
            schema_version: 2,
            snapshot_id: uuid::Uuid::new_v4().to_string(),
            snapshot_time_ms,
            staleness_ms,
            instance_id: self.instance_id.clone(),
            overall,
            components,
            queue: indexer_result.ok().unwrap_or(serde_json::json!({})),
            index: serde_json::json!({}),
            vector: serde_json::json!({}),
            inference: inference_result.ok().unwrap_or(serde_json::json!({})),
            processes,
            errors: Vec::new(),
            compatibility: serde_json::json!({ "schemaVersion": 2 }),
        }
    }
}

fn compute_overall(
    processes: &[ManagedServiceSnapshot],
    components: &std::collections::BTreeMap<String, ComponentStatus>,
) -> OverallStatus {
    for required in REQUIRED_SERVICES {
        let missing = processes
            .iter()
            .find(|p| p.name == required)
            .map(|p| !(p.running && p.ready))
            .unwrap_or(true);
        if missing {
            return OverallStatus {
                state: OverallState::Unavailable,
                reason: "required_service_unavailable".to_string(),
            };
        }
    }

    if let Some(max_staleness) = components.values().map(|c| c.staleness_ms).max() {
        if max_staleness > SNAPSHOT_STALE_MS {
            return OverallStatus {
                state: OverallState::Stale,
                reason: "snapshot_stale".to_string(),
            };
        }
    }

    let rebuilding = processes.iter().any(|p| p.state == ServiceState::Backoff)
        && components
            .get("indexer")
            .map(|c| c.metrics.get("rebuilding").and_then(|v| v.as_bool()).unwrap_or(false))
            .unwrap_or(false);
    if rebuilding {
        return OverallStatus {
            state: OverallState::Rebuilding,
            reason: "queue_rebuild_running".to_string(),
        };
    }

    let degraded = processes.iter().any(|p| {
        matches!(
            p.state,
            ServiceState::Degraded | ServiceState::Backoff | ServiceState::Crashed | ServiceState::GivingUp
        )
    }) || components
        .iter()
        .any(|(name, c)| (name == "inference" || name == "extractor") && c.state == "unavailable");

    if degraded {
        return OverallStatus {
            state: OverallState::Degraded,
            reason: "component_degraded".to_string(),
        };
    }

    OverallStatus {
        state: OverallState::Healthy,
        reason: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(name: &str, state: ServiceState, running: bool, ready: bool) -> ManagedServiceSnapshot {
        ManagedServiceSnapshot {
            name: name.to_string(),
            binary_path: "/bin/true".to_string(),
            state,
            running,
            ready,
            pid: None,
            crash_count: 0,
            last_updated_ms: now_ms(),
            reason: String::new(),
        }
    }

    #[test]
    fn missing_required_service_is_unavailable() {
        let processes = vec![svc("indexer", ServiceState::Ready, true, true)];
        let components = std::collections::BTreeMap::new();
        let overall = compute_overall(&processes, &components);
        assert_eq!(overall.state, OverallState::Unavailable);
    }

    #[test]
    fn all_ready_with_no_degradation_is_healthy() {
        let processes: Vec<_> = REQUIRED_SERVICES
            .iter()
            .map(|n| svc(n, ServiceState::Ready, true, true))
            .collect();
        let components = std::collections::BTreeMap::new();
        let overall = compute_overall(&processes, &components);
        assert_eq!(overall.state, OverallState::Healthy);
    }

    #[test]
    fn crashed_service_degrades_even_when_required_set_is_ready() {
        let mut processes: Vec<_> = REQUIRED_SERVICES
            .iter()
            .map(|n| svc(n, ServiceState::Ready, true, true))
            .collect();
        processes.push(svc("extra", ServiceState::Crashed, false, false));
        let components = std::collections::BTreeMap::new();
        let overall = compute_overall(&processes, &components);
        assert_eq!(overall.state, OverallState::Degraded);
    }
}
