//! JSON-RPC frame construction and classification for the session channel.

use crate::config::InitializationOptions;
use crate::selector::DocumentSelector;

pub(crate) fn request_frame(
    id: u64,
    method: &str,
    params: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut frame = serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
    });
    if let Some(params) = params {
        frame["params"] = params;
    }
    frame
}

pub(crate) fn notification_frame(
    method: &str,
    params: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut frame = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
    });
    if let Some(params) = params {
        frame["params"] = params;
    }
    frame
}

/// Standard JSON-RPC MethodNotFound reply. Servers that send client-bound
/// requests (capability registration and the like) block until answered.
pub(crate) fn method_not_found(id: &serde_json::Value, method: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": -32601,
            "message": format!("Method not found: {method}"),
        }
    })
}

/// Params for the initialize request: feature toggles, the documents this
/// session covers, and the capabilities the client declares.
pub(crate) fn initialize_params(
    options: &InitializationOptions,
    selector: &DocumentSelector,
) -> serde_json::Value {
    serde_json::json!({
        "processId": std::process::id(),
        "clientCapabilities": {
            "textDocument": {
                "synchronization": { "dynamicRegistration": false },
                "hover": { "contentFormat": ["plaintext"] },
                "publishDiagnostics": { "relatedInformation": false }
            }
        },
        "initializationOptions": options,
        "documentSelector": selector,
    })
}

/// An incoming frame, classified by shape.
pub(crate) enum Incoming {
    /// Reply to one of our requests.
    Response { id: u64, body: serde_json::Value },
    /// Server-to-client request; must be answered.
    ServerRequest {
        id: serde_json::Value,
        method: String,
    },
    /// Fire-and-forget server notification.
    Notification { method: String },
}

/// Classify a frame, or `None` if it fits no JSON-RPC shape.
pub(crate) fn classify(frame: &serde_json::Value) -> Option<Incoming> {
    let id = frame.get("id");
    let method = frame.get("method").and_then(|m| m.as_str());
    let is_reply = frame.get("result").is_some() || frame.get("error").is_some();

    match (id, method, is_reply) {
        (Some(id), None, true) => Some(Incoming::Response {
            id: id.as_u64()?,
            body: frame.clone(),
        }),
        (Some(id), Some(method), _) => Some(Incoming::ServerRequest {
            id: id.clone(),
            method: method.to_string(),
        }),
        (None, Some(method), _) => Some(Incoming::Notification {
            method: method.to_string(),
        }),
        _ => None,
    }
}
