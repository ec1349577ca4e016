//! Session WebSocket protocol types (request, response, event frames and method params).

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Wire request: `{ "type": "req", "id", "method", "params" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsRequest {
    #[serde(rename = "type")]
    pub typ: String,
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Wire response: `{ "type": "res", "id", "ok", "payload" or "error" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsResponse {
    #[serde(rename = "type")]
    pub typ: String,
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WsResponse {
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            typ: "res".to_string(),
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            typ: "res".to_string(),
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error.into()),
        }
    }
}

/// Event frame JSON: `{ "type": "event", "event", "payload" }`.
pub fn event_frame(event: &str, payload: serde_json::Value) -> String {
    serde_json::to_string(&json!({
        "type": "event",
        "event": event,
        "payload": payload,
    }))
    .unwrap_or_else(|_| format!(r#"{{"type":"event","event":"{}","payload":{{}}}}"#, event))
}

/// Params for "assistant.load".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadAssistantParams {
    #[serde(default)]
    pub assistant_id: String,
}

/// Params for "assistant.create".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssistantParams {
    #[serde(default)]
    pub instructions: String,
}

/// Params for "assistant.updateModel".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateModelParams {
    pub model: String,
}

/// Params for "file.upload". `data` is the file content, base64 (standard alphabet).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFileParams {
    pub file_name: String,
    pub data: String,
}

/// Params for "chat.send".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageParams {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_omits_absent_fields() {
        let ok = serde_json::to_value(WsResponse::ok("1", json!({ "reply": "hi" }))).unwrap();
        assert_eq!(ok, json!({ "type": "res", "id": "1", "ok": true, "payload": { "reply": "hi" } }));
        let err = serde_json::to_value(WsResponse::err("2", "nope")).unwrap();
        assert_eq!(err, json!({ "type": "res", "id": "2", "ok": false, "error": "nope" }));
    }

    #[test]
    fn request_params_default_to_null() {
        let req: WsRequest =
            serde_json::from_str(r#"{ "type": "req", "id": "7", "method": "session.state" }"#)
                .unwrap();
        assert!(req.params.is_null());
    }

    #[test]
    fn upload_params_use_camel_case() {
        let p: UploadFileParams =
            serde_json::from_value(json!({ "fileName": "a.pdf", "data": "JVBERg==" })).unwrap();
        assert_eq!(p.file_name, "a.pdf");
    }

    #[test]
    fn event_frame_shape() {
        let v: serde_json::Value =
            serde_json::from_str(&event_frame("chat.render", json!({ "text": "He▌" }))).unwrap();
        assert_eq!(v["type"], "event");
        assert_eq!(v["event"], "chat.render");
        assert_eq!(v["payload"]["text"], "He▌");
    }
}
