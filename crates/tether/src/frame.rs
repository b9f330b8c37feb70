//! Tether frame protocol.
//!
//! Frames are JSON text messages over the WebSocket, one frame per message.
//!
//! ## Wire Format
//!
//! Request (client -> app):
//!
//! ```text
//! {"rid": "<uuid>", "uid": "<user id>", "data": <document>}
//! ```
//!
//! Response (app -> client), exactly one of `data`/`error` present:
//!
//! ```text
//! {"rid": "<uuid>", "data": <document>}
//! {"rid": "<uuid>", "error": "<message>"}
//! ```
//!
//! `rid` is the correlation token: the app must echo it back verbatim so the
//! client can route the response to the right caller. Nothing else about the
//! response is interpreted here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Frame encode/decode errors.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid frame: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("response carries neither data nor error")]
    EmptyResponse,
}

/// A tagged execution request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Correlation token, echoed back in the response.
    pub rid: Uuid,
    /// User/session id the request is executed under.
    pub uid: String,
    /// Application-defined input document.
    pub data: Value,
}

impl RequestFrame {
    pub fn new(uid: impl Into<String>, data: Value) -> Self {
        Self {
            rid: Uuid::new_v4(),
            uid: uid.into(),
            data,
        }
    }

    /// Encode for the wire.
    pub fn to_text(&self) -> String {
        // A struct of Uuid/String/Value cannot fail to serialize
        serde_json::to_string(self).expect("RequestFrame serialization cannot fail")
    }
}

/// A tagged execution response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Correlation token from the matching request.
    pub rid: Uuid,
    /// Application-defined output document, present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Remote failure message, present on error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseFrame {
    /// Decode a frame off the wire.
    pub fn from_text(text: &str) -> Result<Self, FrameError> {
        let frame: ResponseFrame = serde_json::from_str(text)?;
        if frame.data.is_none() && frame.error.is_none() {
            return Err(FrameError::EmptyResponse);
        }
        Ok(frame)
    }

    /// Successful response carrying `data`.
    pub fn ok(rid: Uuid, data: Value) -> Self {
        Self {
            rid,
            data: Some(data),
            error: None,
        }
    }

    /// Failed response carrying an error message.
    pub fn err(rid: Uuid, message: impl Into<String>) -> Self {
        Self {
            rid,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Encode for the wire.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).expect("ResponseFrame serialization cannot fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_roundtrip() {
        let frame = RequestFrame::new("super-user", json!({"prompt": "a red fox"}));
        let text = frame.to_text();

        let parsed: RequestFrame = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.rid, frame.rid);
        assert_eq!(parsed.uid, "super-user");
        assert_eq!(parsed.data, json!({"prompt": "a red fox"}));
    }

    #[test]
    fn test_response_ok() {
        let rid = Uuid::new_v4();
        let text = ResponseFrame::ok(rid, json!({"image": "res-1"})).to_text();

        let parsed = ResponseFrame::from_text(&text).unwrap();
        assert_eq!(parsed.rid, rid);
        assert_eq!(parsed.data, Some(json!({"image": "res-1"})));
        assert!(parsed.error.is_none());
    }

    #[test]
    fn test_response_err() {
        let rid = Uuid::new_v4();
        let text = ResponseFrame::err(rid, "model exploded").to_text();

        let parsed = ResponseFrame::from_text(&text).unwrap();
        assert_eq!(parsed.rid, rid);
        assert!(parsed.data.is_none());
        assert_eq!(parsed.error.as_deref(), Some("model exploded"));
    }

    #[test]
    fn test_response_requires_data_or_error() {
        let rid = Uuid::new_v4();
        let text = format!("{{\"rid\": \"{}\"}}", rid);
        assert!(matches!(
            ResponseFrame::from_text(&text),
            Err(FrameError::EmptyResponse)
        ));
    }

    #[test]
    fn test_response_rejects_garbage() {
        assert!(matches!(
            ResponseFrame::from_text("not json"),
            Err(FrameError::Invalid(_))
        ));
    }
}
