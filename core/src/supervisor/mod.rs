use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ipc::client::IpcClient;

const READY_TIMEOUT_MS: u64 = 10_000;
const READINESS_MARKER: &str = "ready";
const CRASH_BUDGET: u32 = 5;
const CRASH_BUDGET_WINDOW: Duration = Duration::from_secs(60);
const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_MAX_MS: u64 = 30_000;
const STOP_GRACE_MS: u64 = 3_000;

/// Mirrors `ManagedService.state` (§4.2). `Backoff`/`GivingUp` only apply
/// after a crash; `Stopped` is reachable from any state on explicit stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Registered,
    Starting,
    Ready,
    Degraded,
    Backoff,
    Crashed,
    Stopped,
    GivingUp,
}

struct ServiceEntry {
    name: String,
    binary: String,
    socket_path: std::path::PathBuf,
    state: Mutex<ServiceState>,
    running: AtomicBool,
    ready: AtomicBool,
    pid: AtomicI64,
    crash_count: AtomicU32,
    last_updated_ms: AtomicI64,
    reason: Mutex<String>,
    client: Arc<IpcClient>,
    task: Mutex<Option<JoinHandle<()>>>,
    crash_window_start: Mutex<Option<Instant>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedServiceSnapshot {
    pub name: String,
    pub binary_path: String,
    pub state: ServiceState,
    pub running: bool,
    pub ready: bool,
    pub pid: Option<i64>,
    pub crash_count: u32,
    pub last_updated_ms: i64,
    pub reason: String,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

async fn set_state(entry: &ServiceEntry, state: ServiceState, reason: impl Into<String>) {
    *entry.state.lock().await = state;
    *entry.reason.lock().await = reason.into();
    entry.last_updated_ms.store(now_ms(), Ordering::Relaxed);
}

/// Owns worker process lifecycles: launch, readiness-marker scanning, crash
/// restart with budget, and graceful shutdown (§4.2). One `JoinHandle` per
/// supervised service, following the teacher's `background_service` idiom of
/// a task map gated by a `CancellationToken`.
pub struct Supervisor {
    services: Mutex<Vec<Arc<ServiceEntry>>>,
    sockets_dir: std::path::PathBuf,
    cancel_token: CancellationToken,
    stopping: AtomicBool,
    all_ready_fired: AtomicBool,
}

impl Supervisor {
    pub fn new(sockets_dir: std::path::PathBuf) -> Self {
        Self {
            services: Mutex::new(Vec::new()),
            sockets_dir,
            cancel_token: CancellationToken::new(),
            stopping: AtomicBool::new(false),
            all_ready_fired: AtomicBool::new(false),
        }
    }

    /// Idempotent by name: a second registration for an already-known name is ignored,
    /// keeping the first binary (§3 "Service registration is idempotent by name").
    pub async fn add_service(&self, name: &str, binary: &str) {
        let mut services = self.services.lock().await;
        if services.iter().any(|s| s.name == name) {
            return;
        }
        let socket_path = self.sockets_dir.join(format!("{name}.sock"));
        services.push(Arc::new(ServiceEntry {
            name: name.to_string(),
            binary: binary.to_string(),
            socket_path: socket_path.clone(),
            state: Mutex::new(ServiceState::Registered),
            running: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            pid: AtomicI64::new(-1),
            crash_count: AtomicU32::new(0),
            last_updated_ms: AtomicI64::new(now_ms()),
            reason: Mutex::new(String::new()),
            client: Arc::new(IpcClient::new(socket_path)),
            task: Mutex::new(None),
            crash_window_start: Mutex::new(None),
        }));
    }

    /// Launches every registered service and waits for each to reach `Ready`
    /// within `READY_TIMEOUT_MS`. Returns true iff all of them did.
    pub async fn start_all(self: &Arc<Self>) -> bool {
        self.stopping.store(false, Ordering::SeqCst);
        self.all_ready_fired.store(false, Ordering::SeqCst);
        let entries = self.services.lock().await.clone();

        for entry in &entries {
            let supervisor = self.clone();
            let entry_for_task = entry.clone();
            let handle = tokio::spawn(async move {
                supervisor.run_service(entry_for_task).await;
            });
            *entry.task.lock().await = Some(handle);
        }

        let deadline = Instant::now() + Duration::from_millis(READY_TIMEOUT_MS);
        loop {
            let all_ready = entries.iter().all(|e| e.ready.load(Ordering::SeqCst));
            if all_ready {
                if !self.all_ready_fired.swap(true, Ordering::SeqCst) {
                    tracing::info!(target: "finder_core::supervisor", "all services ready");
                }
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Drives one service's full lifecycle: spawn, scan for the readiness
    /// marker, connect the IPC client, then wait for exit and restart with
    /// backoff until the crash budget is exhausted or a stop is requested.
    async fn run_service(self: Arc<Self>, entry: Arc<ServiceEntry>) {
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                return;
            }

            set_state(&entry, ServiceState::Starting, "launching").await;
            entry.running.store(true, Ordering::SeqCst);

            let mut command = Command::new(&entry.binary);
            command
                .arg(format!("--socket={}", entry.socket_path.display()))
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .kill_on_drop(true);

            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(e) => {
                    if self.stopping.load(Ordering::SeqCst) {
                        return;
                    }
                    self.record_crash(&entry, format!("spawn failed: {e}")).await;
                    if !self.schedule_backoff(&entry).await {
                        return;
                    }
                    continue;
                }
            };

            entry.pid.store(child.id().map(|p| p as i64).unwrap_or(-1), Ordering::SeqCst);

            let became_ready = self.wait_for_ready(&mut child).await;
            if !became_ready {
                if self.stopping.load(Ordering::SeqCst) {
                    let _ = child.kill().await;
                    return;
                }
                let _ = child.kill().await;
                self.record_crash(&entry, "readiness timeout".to_string()).await;
                if !self.schedule_backoff(&entry).await {
                    return;
                }
                continue;
            }

            if !entry.client.connect_to_server(READY_TIMEOUT_MS).await.unwrap_or(false) {
                let _ = child.kill().await;
                if self.stopping.load(Ordering::SeqCst) {
                    return;
                }
                self.record_crash(&entry, "ipc connect failed after readiness".to_string()).await;
                if !self.schedule_backoff(&entry).await {
                    return;
                }
                continue;
            }

            set_state(&entry, ServiceState::Ready, "ready").await;
            entry.ready.store(true, Ordering::SeqCst);
            tracing::info!(target: "finder_core::supervisor", service = %entry.name, "service ready");

            let exit = tokio::select! {
                status = child.wait() => status,
                _ = self.cancel_token.cancelled() => {
                    return;
                }
            };

            entry.ready.store(false, Ordering::SeqCst);
            entry.running.store(false, Ordering::SeqCst);
            entry.client.disconnect().await;

            if self.stopping.load(Ordering::SeqCst) {
                return;
            }

            let code = exit.ok().and_then(|s| s.code()).unwrap_or(-1);
            self.record_crash(&entry, format!("exited unexpectedly (code {code})")).await;
            if !self.schedule_backoff(&entry).await {
                return;
            }
        }
    }

    async fn wait_for_ready(&self, child: &mut Child) -> bool {
        let Some(stdout) = child.stdout.take() else {
            return false;
        };
        let mut lines = BufReader::new(stdout).lines();
        let deadline = Instant::now() + Duration::from_millis(READY_TIMEOUT_MS);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match tokio::time::timeout(remaining, lines.next_line()).await {
                Ok(Ok(Some(line))) => {
                    if line.trim() == READINESS_MARKER {
                        return true;
                    }
                }
                Ok(Ok(None)) => return false,
                Ok(Err(_)) => return false,
                Err(_) => return false,
            }
            if self.stopping.load(Ordering::SeqCst) {
                return false;
            }
        }
    }

    async fn record_crash(&self, entry: &ServiceEntry, reason: String) {
        tracing::warn!(target: "finder_core::supervisor", service = %entry.name, reason, "service crash detected");
        let mut window = entry.crash_window_start.lock().await;
        let now = Instant::now();
        let within_window = window.map(|start| now.duration_since(start) < CRASH_BUDGET_WINDOW).unwrap_or(false);
        if !within_window {
            *window = Some(now);
            entry.crash_count.store(0, Ordering::SeqCst);
        }
        let count = entry.crash_count.fetch_add(1, Ordering::SeqCst) + 1;
        set_state(entry, ServiceState::Crashed, reason).await;
        tracing::warn!(target: "finder_core::supervisor", service = %entry.name, count, "serviceCrashed");
    }

    /// Returns false when the crash budget within the window is exhausted
    /// (transitions to `GivingUp` and stops restarting).
    async fn schedule_backoff(&self, entry: &ServiceEntry) -> bool {
        let count = entry.crash_count.load(Ordering::SeqCst);
        if count > CRASH_BUDGET {
            set_state(entry, ServiceState::GivingUp, "crash budget exceeded").await;
            tracing::error!(target: "finder_core::supervisor", service = %entry.name, count, "giving up on service");
            return false;
        }
        let delay = Duration::from_millis((BACKOFF_BASE_MS.saturating_mul(1u64 << count.min(10))).min(BACKOFF_MAX_MS));
        set_state(entry, ServiceState::Backoff, format!("retrying in {}ms", delay.as_millis())).await;
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.cancel_token.cancelled() => false,
        }
    }

    /// Stops services in reverse registration order: disconnect, `shutdown`
    /// RPC, bounded wait, then kill. Idempotent; re-entrant calls are ignored.
    pub async fn stop_all(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel_token.cancel();

        let entries = self.services.lock().await.clone();
        for entry in entries.iter().rev() {
            if entry.client.is_connected().await {
                let _ = entry.client.send_request("shutdown", None, STOP_GRACE_MS).await;
                entry.client.disconnect().await;
            }
            set_state(entry, ServiceState::Stopped, "stopped").await;
            entry.ready.store(false, Ordering::SeqCst);
            entry.running.store(false, Ordering::SeqCst);

            if let Some(handle) = entry.task.lock().await.take() {
                if tokio::time::timeout(Duration::from_millis(STOP_GRACE_MS), handle)
                    .await
                    .is_err()
                {
                    tracing::warn!(target: "finder_core::supervisor", service = %entry.name, "supervisor task did not stop within grace period");
                }
            }
        }
        tracing::info!(target: "finder_core::supervisor", "all services stopped");
    }

    pub async fn client_for(&self, name: &str) -> Option<Arc<IpcClient>> {
        let entries = self.services.lock().await;
        let entry = entries.iter().find(|e| e.name == name)?;
        if entry.ready.load(Ordering::SeqCst) {
            Some(entry.client.clone())
        } else {
            None
        }
    }

    pub async fn service_snapshot(&self) -> Vec<ManagedServiceSnapshot> {
        let entries = self.services.lock().await.clone();
        let mut out = Vec::with_capacity(entries.len());
        for entry in &entries {
            let pid = entry.pid.load(Ordering::SeqCst);
            out.push(ManagedServiceSnapshot {
                name: entry.name.clone(),
                binary_path: entry.binary.clone(),
                state: *entry.state.lock().await,
                running: entry.running.load(Ordering::SeqCst),
                ready: entry.ready.load(Ordering::SeqCst),
                pid: if pid >= 0 { Some(pid) } else { None },
                crash_count: entry.crash_count.load(Ordering::SeqCst),
                last_updated_ms: entry.last_updated_ms.load(Ordering::SeqCst),
                reason: entry.reason.lock().await.clone(),
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_service_is_idempotent_by_name() {
        let sup = Arc::new(Supervisor::new(std::env::temp_dir()));
        sup.add_service("indexer", "/bin/cat").await;
        sup.add_service("indexer", "/bin/echo").await;
        let snapshot = sup.service_snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].binary_path, "/bin/cat");
    }

    #[tokio::test]
    async fn client_for_is_none_until_ready() {
        let sup = Supervisor::new(std::env::temp_dir());
        sup.add_service("indexer", "/bin/cat").await;
        assert!(sup.client_for("indexer").await.is_none());
    }
}
