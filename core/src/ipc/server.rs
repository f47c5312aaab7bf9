use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::CoreError;
use crate::ipc::message::{IpcEnvelope, IpcErrorBody, IpcErrorCode, MAX_FRAME_BYTES};

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_BYTES)
        .length_field_type::<u32>()
        .big_endian()
        .new_codec()
}

/// A request handler returns the envelope to write back (a `Response` or `Error`).
pub type RequestHandler =
    Arc<dyn Fn(u64, String, Option<Value>) -> futures::future::BoxFuture<'static, IpcEnvelope> + Send + Sync>;

/// Accepts peers on a Unix socket, dispatches requests to a single handler, and can
/// broadcast notifications to every connected peer (§4.1 server contract).
pub struct IpcServer {
    socket_path: PathBuf,
    handler: RequestHandler,
    peers: Arc<DashMap<u64, mpsc::UnboundedSender<IpcEnvelope>>>,
    next_peer_id: std::sync::atomic::AtomicU64,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf, handler: RequestHandler) -> Self {
        Self {
            socket_path,
            handler,
            peers: Arc::new(DashMap::new()),
            next_peer_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Binds the socket, creating its parent directory if needed, and removing a
    /// stale socket file left behind by a prior crashed instance.
    pub async fn listen(&self) -> Result<UnixListener, CoreError> {
        if let Some(parent) = self.socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if self.socket_path.exists() {
            tokio::fs::remove_file(&self.socket_path).await?;
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!(target: "finder_core::ipc", path = %self.socket_path.display(), "listening");
        Ok(listener)
    }

    /// Runs the accept loop until `shutdown` resolves.
    pub async fn serve(&self, listener: UnixListener, mut shutdown: tokio::sync::oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => self.spawn_peer(stream),
                        Err(e) => {
                            tracing::warn!(target: "finder_core::ipc", error = %e, "accept failed");
                        }
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!(target: "finder_core::ipc", "server shutting down");
                    break;
                }
            }
        }
    }

    fn spawn_peer(&self, stream: UnixStream) {
        let peer_id = self.next_peer_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let handler = self.handler.clone();
        let peers = self.peers.clone();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<IpcEnvelope>();
        peers.insert(peer_id, out_tx);

        tokio::spawn(async move {
            let framed = Framed::new(stream, codec());
            let (mut sink, mut stream) = framed.split();

            let writer = async {
                while let Some(envelope) = out_rx.recv().await {
                    let bytes = match envelope.encode() {
                        Ok(b) => b,
                        Err(e) => {
                            tracing::warn!(target: "finder_core::ipc", error = %e, "failed to encode outbound frame");
                            continue;
                        }
                    };
                    if sink.send(bytes.into()).await.is_err() {
                        break;
                    }
                }
            };

            let reader = async {
                while let Some(frame) = stream.next().await {
                    let bytes = match frame {
                        Ok(b) => b,
                        Err(e) => {
                            tracing::debug!(target: "finder_core::ipc", error = %e, "peer read error");
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
                    if let IpcEnvelope::Request { id, method, params } = envelope {
                        let response = handler(id, method, params).await;
                        let peers = peers.clone();
                        if let Some(tx) = peers.get(&peer_id) {
                            let _ = tx.send(response);
                        }
                    }
                }
            };

            tokio::select! {
                _ = writer => {}
                _ = reader => {}
            }
            peers.remove(&peer_id);
        });
    }

    /// Sends a notification to every connected peer. Best-effort: disconnected
    /// peers are pruned lazily when their channel rejects the send.
    pub fn broadcast(&self, method: &str, params: Option<Value>) {
        let envelope = IpcEnvelope::Notification {
            method: method.to_string(),
            params,
        };
        self.peers.retain(|_, tx| tx.send(envelope.clone()).is_ok());
    }
}

pub fn not_found(id: u64, method: &str) -> IpcEnvelope {
    IpcEnvelope::Error {
        id,
        error: IpcErrorBody::new(IpcErrorCode::NotFound, format!("unknown method: {method}")),
    }
}

pub fn socket_path_for(socket_dir: &Path, service_name: &str) -> PathBuf {
    socket_dir.join(format!("{service_name}.sock"))
}
