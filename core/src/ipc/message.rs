use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames larger than this are refused at both encode and decode time (§4.1).
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpcErrorCode {
    InvalidRequest,
    NotFound,
    InvalidParams,
    InternalError,
    ServiceUnavailable,
    Timeout,
}

impl IpcErrorCode {
    /// Stable integer code, kept alongside the string tag for cross-language compatibility.
    pub fn as_int(self) -> i32 {
        match self {
            Self::InvalidRequest => 1,
            Self::NotFound => 2,
            Self::InvalidParams => 3,
            Self::InternalError => 4,
            Self::ServiceUnavailable => 5,
            Self::Timeout => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "InvalidRequest",
            Self::NotFound => "NotFound",
            Self::InvalidParams => "InvalidParams",
            Self::InternalError => "InternalError",
            Self::ServiceUnavailable => "ServiceUnavailable",
            Self::Timeout => "Timeout",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcErrorBody {
    pub code: i32,
    #[serde(rename = "codeString")]
    pub code_string: String,
    pub message: String,
}

impl IpcErrorBody {
    pub fn new(code: IpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_int(),
            code_string: code.as_str().to_string(),
            message: message.into(),
        }
    }
}

/// The four envelope shapes that cross the wire, distinguished by `type` (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcEnvelope {
    Request {
        id: u64,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    Response {
        id: u64,
        result: Value,
    },
    Error {
        id: u64,
        error: IpcErrorBody,
    },
    Notification {
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
}

impl IpcEnvelope {
    pub fn request_id(&self) -> Option<u64> {
        match self {
            Self::Request { id, .. } | Self::Response { id, .. } | Self::Error { id, .. } => Some(*id),
            Self::Notification { .. } => None,
        }
    }

    /// Encodes to compact JSON, refusing frames over `MAX_FRAME_BYTES`.
    pub fn encode(&self) -> Result<Vec<u8>, crate::error::CoreError> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_FRAME_BYTES {
            return Err(crate::error::CoreError::InvalidRequest(format!(
                "encoded frame of {} bytes exceeds the {} byte cap",
                bytes.len(),
                MAX_FRAME_BYTES
            )));
        }
        Ok(bytes)
    }

    /// Decodes a frame, refusing anything over `MAX_FRAME_BYTES` before parsing.
    pub fn decode(bytes: &[u8]) -> Result<Self, crate::error::CoreError> {
        if bytes.len() > MAX_FRAME_BYTES {
            return Err(crate::error::CoreError::InvalidRequest(format!(
                "received frame of {} bytes exceeds the {} byte cap",
                bytes.len(),
                MAX_FRAME_BYTES
            )));
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let env = IpcEnvelope::Request {
            id: 7,
            method: "ping".to_string(),
            params: None,
        };
        let encoded = env.encode().unwrap();
        let decoded = IpcEnvelope::decode(&encoded).unwrap();
        assert_eq!(decoded.request_id(), Some(7));
    }

    #[test]
    fn oversize_frame_is_refused() {
        let huge = serde_json::json!({ "padding": "x".repeat(MAX_FRAME_BYTES) });
        let env = IpcEnvelope::Response { id: 1, result: huge };
        assert!(env.encode().is_err());
    }

    #[test]
    fn error_body_carries_matching_int_and_string() {
        let body = IpcErrorBody::new(IpcErrorCode::NotFound, "missing");
        assert_eq!(body.code, IpcErrorCode::NotFound.as_int());
        assert_eq!(body.code_string, "NotFound");
    }
}
