use std::path::PathBuf;
use std::sync::Arc;

use finder_core::config::RuntimePaths;
use finder_core::ipc::host_methods;
use finder_core::ipc::server::RequestHandler;
use finder_core::ipc::IpcServer;
use finder_core::learning::IdleCycleScheduler;
use finder_core::single_instance::SingleInstanceLock;
use finder_core::state::AppState;
use tokio_util::sync::CancellationToken;

const APP_NAME: &str = "finder";

fn data_dir() -> PathBuf {
    std::env::var("DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share").join(APP_NAME)
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    finder_core::logging::init_tracing();

    let paths = RuntimePaths::from_env(APP_NAME, data_dir());
    finder_core::logging::init_logging(&paths.data_dir)
        .map_err(|e| anyhow::anyhow!("failed to init file logging: {e}"))?;

    let mut instance_lock = SingleInstanceLock::new(&paths.runtime_dir);
    if !instance_lock.try_lock(APP_NAME)? {
        if let Some(owner) = instance_lock.lock_info() {
            tracing::warn!(
                target: "finder_core::main",
                pid = owner.pid,
                host = %owner.host,
                "another instance already holds the runtime lock; exiting"
            );
        } else {
            tracing::warn!(target: "finder_core::main", "another instance already holds the runtime lock; exiting");
        }
        return Ok(());
    }

    tracing::info!(target: "finder_core::main", instance_id = %paths.instance_id, "starting finder-core");

    let state = Arc::new(AppState::initialize(paths.clone()).await?);

    register_services(&state).await;
    state.supervisor.start_all().await;

    // The sender is held for the process lifetime so a future mutation path
    // (e.g. a behavior event landing) can request an out-of-cycle refresh.
    let (_health_trigger_tx, health_trigger_rx) = tokio::sync::mpsc::unbounded_channel();
    let health = state.health.clone();
    let health_task = tokio::spawn(async move {
        health.run(health_trigger_rx).await;
    });

    let idle_scheduler = Arc::new(IdleCycleScheduler::new(
        state.training_cycle.clone(),
        state.settings_repo.clone(),
        state.activity.clone(),
    ));
    let idle_cancel = CancellationToken::new();
    let idle_cancel_for_task = idle_cancel.clone();
    let idle_ranker = state.ranker.clone();
    let idle_task = tokio::spawn(async move {
        idle_scheduler.run(idle_ranker, idle_cancel_for_task).await;
    });

    let socket_path = paths.socket_path(APP_NAME);
    let handler_state = state.clone();
    let handler: RequestHandler = Arc::new(move |id, method, params| {
        let state = handler_state.clone();
        Box::pin(async move { host_methods::dispatch(state, id, method, params).await })
    });

    let server = IpcServer::new(socket_path, handler);
    let listener = server.listen().await?;

    println!("ready");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let serve_task = tokio::spawn(async move {
        server.serve(listener, shutdown_rx).await;
    });

    wait_for_shutdown_signal().await;
    tracing::info!(target: "finder_core::main", "shutdown signal received");

    let _ = shutdown_tx.send(());
    let _ = serve_task.await;
    health_task.abort();

    idle_cancel.cancel();
    let _ = idle_task.await;

    state.shutdown().await;
    instance_lock.unlock();

    tracing::info!(target: "finder_core::main", "finder-core stopped");
    Ok(())
}

/// Registers the services the supervisor launches. Binary paths are resolved
/// from environment overrides first, falling back to a path alongside the
/// `finder-core` executable (§6 process layout).
async fn register_services(state: &Arc<AppState>) {
    let services = [
        ("indexer", "INDEXER_BIN"),
        ("query", "QUERY_BIN"),
        ("inference", "INFERENCE_BIN"),
        ("extractor", "EXTRACTOR_BIN"),
    ];

    for (name, env_var) in services {
        let binary = std::env::var(env_var).unwrap_or_else(|_| default_service_binary(name));
        state.supervisor.add_service(name, &binary).await;
    }
}

fn default_service_binary(name: &str) -> String {
    let dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    dir.join(name).to_string_lossy().into_owned()
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
