use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::UnixStream;
use tokio::sync::{oneshot, Mutex};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::CoreError;
use crate::ipc::message::{IpcEnvelope, IpcErrorBody, IpcErrorCode, MAX_FRAME_BYTES};

type WireFramed = Framed<UnixStream, LengthDelimitedCodec>;
type WireSink = SplitSink<WireFramed, Bytes>;
type WireStream = SplitStream<WireFramed>;

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_BYTES)
        .length_field_type::<u32>()
        .big_endian()
        .new_codec()
}

/// Async IPC client over a Unix domain socket (§4.1 "Rust-native framing").
///
/// The write half lives behind a mutex; the read half is handed to a spawned
/// reader task on connect, which completes pending oneshots by request id or
/// forwards notifications on a broadcast channel. `send_request` is an ordinary
/// async await on a oneshot receiver raced against `tokio::time::timeout`,
/// which is the idiomatic replacement for a bounded busy-wait loop.
pub struct IpcClient {
    socket_path: std::path::PathBuf,
    sink: Mutex<Option<WireSink>>,
    next_id: AtomicU64,
    pending: Arc<DashMap<u64, oneshot::Sender<IpcEnvelope>>>,
    notifications: tokio::sync::broadcast::Sender<(String, Option<Value>)>,
}

impl IpcClient {
    pub fn new(socket_path: std::path::PathBuf) -> Self {
        let (notifications, _rx) = tokio::sync::broadcast::channel(256);
        Self {
            socket_path,
            sink: Mutex::new(None),
            next_id: AtomicU64::new(1),
            pending: Arc::new(DashMap::new()),
            notifications,
        }
    }

    pub fn subscribe_notifications(&self) -> tokio::sync::broadcast::Receiver<(String, Option<Value>)> {
        self.notifications.subscribe()
    }

    pub async fn is_connected(&self) -> bool {
        self.sink.lock().await.is_some()
    }

    /// Connects and spawns the reader loop. Refuses empty paths and non-positive timeouts.
    pub async fn connect_to_server(&self, timeout_ms: u64) -> Result<bool, CoreError> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(CoreError::InvalidParams("socket path is empty".into()));
        }
        if timeout_ms == 0 {
            return Err(CoreError::InvalidParams(format!("invalid connect timeout: {timeout_ms}ms")));
        }

        let connect = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            UnixStream::connect(&self.socket_path),
        )
        .await;

        let stream = match connect {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::debug!(target: "finder_core::ipc", path = %self.socket_path.display(), error = %e, "service not ready yet");
                return Ok(false);
            }
            Err(_) => {
                tracing::debug!(target: "finder_core::ipc", path = %self.socket_path.display(), "connect timed out");
                return Ok(false);
            }
        };

        let framed = Framed::new(stream, codec());
        let (writer, reader) = framed.split();

        {
            let mut guard = self.sink.lock().await;
            *guard = Some(writer);
        }

        self.spawn_reader(reader);
        tracing::info!(target: "finder_core::ipc", path = %self.socket_path.display(), "connected");
        Ok(true)
    }

    fn spawn_reader(&self, mut reader: WireStream) {
        let pending = self.pending.clone();
        let notifications = self.notifications.clone();
        tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                let bytes = match frame {
                    Ok(b) => b,
                    Err(e) => {
                        tracing::info!(target: "finder_core::ipc", error = %e, "connection lost");
                        break;
                    }
                };
                let envelope = match IpcEnvelope::decode(&bytes) {
                    Ok(env) => env,
                    Err(e) => {
                        tracing::warn!(target: "finder_core::ipc", error = %e, "dropping malformed frame");
                        continue;
                    }
                };
                match envelope {
                    IpcEnvelope::Response { id, .. } | IpcEnvelope::Error { id, .. } => {
                        if let Some((_, tx)) = pending.remove(&id) {
                            let _ = tx.send(envelope);
                        } else {
                            tracing::warn!(target: "finder_core::ipc", id, "response for unknown request id");
                        }
                    }
                    IpcEnvelope::Notification { method, params } => {
                        let _ = notifications.send((method, params));
                    }
                    IpcEnvelope::Request { .. } => {
                        tracing::warn!(target: "finder_core::ipc", "client received a request envelope, ignoring");
                    }
                }
            }
            // Connection lost: fail every in-flight request with a synthetic ServiceUnavailable.
            let stale: Vec<u64> = pending.iter().map(|e| *e.key()).collect();
            for id in stale {
                if let Some((_, tx)) = pending.remove(&id) {
                    let _ = tx.send(default_service_unavailable(id));
                }
            }
        });
    }

    pub async fn disconnect(&self) {
        let mut guard = self.sink.lock().await;
        *guard = None;
        let stale: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        for id in stale {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(default_service_unavailable(id));
            }
        }
    }

    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout_ms: u64,
    ) -> Result<Option<IpcEnvelope>, CoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = IpcEnvelope::Request {
            id,
            method: method.to_string(),
            params,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        {
            let mut guard = self.sink.lock().await;
            let Some(sink) = guard.as_mut() else {
                self.pending.remove(&id);
                return Err(CoreError::ServiceUnavailable("not connected".into()));
            };
            let bytes = envelope.encode()?;
            if let Err(e) = sink.send(bytes.into()).await {
                self.pending.remove(&id);
                return Err(CoreError::Io(e.to_string()));
            }
        }

        match tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(response)) => Ok(Some(response)),
            Ok(Err(_)) => Ok(None),
            Err(_) => {
                self.pending.remove(&id);
                tracing::warn!(target: "finder_core::ipc", method, id, timeout_ms, "request timed out");
                Ok(None)
            }
        }
    }

    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<bool, CoreError> {
        let envelope = IpcEnvelope::Notification {
            method: method.to_string(),
            params,
        };
        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Ok(false);
        };
        let bytes = envelope.encode()?;
        sink.send(bytes.into())
            .await
            .map_err(|e| CoreError::Io(e.to_string()))?;
        Ok(true)
    }
}

fn default_service_unavailable(id: u64) -> IpcEnvelope {
    IpcEnvelope::Error {
        id,
        error: IpcErrorBody::new(IpcErrorCode::ServiceUnavailable, "connection lost"),
    }
}

/// Exponential backoff for auto-reconnect: `baseDelayMs * 2^attempt`, capped at `maxAttempts` (§4.1).
pub struct ReconnectPolicy {
    pub socket_path: std::path::PathBuf,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    attempt: std::sync::atomic::AtomicU32,
}

impl ReconnectPolicy {
    pub fn new(socket_path: std::path::PathBuf, max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            socket_path,
            max_attempts,
            base_delay_ms,
            attempt: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn reset(&self) {
        self.attempt.store(0, Ordering::Relaxed);
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << attempt.min(16)))
    }

    /// Drives reconnect attempts against `client` until success or the attempt budget
    /// is exhausted. Returns `true` once reconnected.
    pub async fn run(&self, client: &IpcClient, per_attempt_timeout_ms: u64) -> bool {
        loop {
            let attempt = self.attempt.load(Ordering::Relaxed);
            if attempt >= self.max_attempts {
                tracing::warn!(
                    target: "finder_core::ipc",
                    max_attempts = self.max_attempts,
                    path = %self.socket_path.display(),
                    "auto-reconnect exhausted"
                );
                return false;
            }

            let delay = self.delay_for(attempt);
            tokio::time::sleep(delay).await;
            self.attempt.fetch_add(1, Ordering::Relaxed);

            match client.connect_to_server(per_attempt_timeout_ms).await {
                Ok(true) => {
                    self.reset();
                    return true;
                }
                _ => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = ReconnectPolicy::new(std::path::PathBuf::from("/tmp/x.sock"), 5, 500);
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
    }
}
