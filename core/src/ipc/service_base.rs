use serde_json::{json, Value};

use crate::ipc::message::IpcEnvelope;
use crate::ipc::server::not_found;

/// Reserved methods every service answers without delegating to its own dispatch
/// table (§4.1 "reserved methods built into `ServiceBase`").
pub fn handle_reserved(id: u64, method: &str, service_name: &str) -> Option<IpcEnvelope> {
    match method {
        "ping" => Some(IpcEnvelope::Response {
            id,
            result: json!({
                "pong": true,
                "timestamp": chrono::Utc::now().timestamp_millis(),
                "service": service_name,
            }),
        }),
        "shutdown" => Some(IpcEnvelope::Response {
            id,
            result: json!({ "shutting_down": true }),
        }),
        _ => None,
    }
}

/// Dispatches a request through the reserved methods first, falling through to
/// `dispatch` for service-specific methods.
pub async fn route<F, Fut>(id: u64, method: String, params: Option<Value>, service_name: &str, dispatch: F) -> IpcEnvelope
where
    F: FnOnce(u64, String, Option<Value>) -> Fut,
    Fut: std::future::Future<Output = IpcEnvelope>,
{
    if let Some(reserved) = handle_reserved(id, &method, service_name) {
        return reserved;
    }
    if method.is_empty() {
        return not_found(id, &method);
    }
    dispatch(id, method, params).await
}
