use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Local;

static LOG_FILE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Opens the rolling plaintext log file under `data_dir/logs`, or at `CORE_LOG_FILE` if set.
pub fn init_logging(data_dir: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let log_file = if let Ok(override_path) = env::var("CORE_LOG_FILE") {
        PathBuf::from(override_path)
    } else {
        let logs_dir = data_dir.join("logs");
        fs::create_dir_all(&logs_dir)?;
        logs_dir.join(format!("core_{}.log", Local::now().format("%Y-%m-%d")))
    };
    if let Some(parent) = log_file.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut guard = LOG_FILE.lock().unwrap();
    *guard = Some(log_file.clone());
    drop(guard);

    tracing::info!("logging initialized, log file: {:?}", log_file);
    Ok(())
}

pub fn log_to_file(level: &str, target: &str, message: &str) {
    if let Ok(guard) = LOG_FILE.lock() {
        if let Some(ref path) = *guard {
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
                let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                let _ = writeln!(file, "{} [{}] {}: {}", timestamp, level, target, message);
            }
        }
    }
}

#[macro_export]
macro_rules! log_info {
    ($target:expr, $($arg:tt)*) => ({
        let msg = format!($($arg)*);
        $crate::logging::log_to_file("INFO", $target, &msg);
        tracing::info!(target: $target, "{}", msg);
    });
}

#[macro_export]
macro_rules! log_warn {
    ($target:expr, $($arg:tt)*) => ({
        let msg = format!($($arg)*);
        $crate::logging::log_to_file("WARN", $target, &msg);
        tracing::warn!(target: $target, "{}", msg);
    });
}

#[macro_export]
macro_rules! log_error {
    ($target:expr, $($arg:tt)*) => ({
        let msg = format!($($arg)*);
        $crate::logging::log_to_file("ERROR", $target, &msg);
        tracing::error!(target: $target, "{}", msg);
    });
}

/// Installs the global `tracing` subscriber. `RUST_LOG` wins when set; otherwise
/// defaults to info with verbose output for our own targets.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,finder_core=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    log_to_file("INFO", "finder_core", "core process started");
}
