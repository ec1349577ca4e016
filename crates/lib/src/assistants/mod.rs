//! Remote assistant gateway: the hosted API that owns assistants, threads, files, and runs.
//!
//! `AssistantGateway` is the seam the rest of the crate talks to; `OpenAiAssistants` implements it
//! against the OpenAI Assistants v2 REST + SSE API.

mod events;
mod openai;

pub use events::{EventDecoder, RunStatus, SseFrame, SseParser, StreamEvent, ToolCallDelta};
pub use openai::OpenAiAssistants;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Events of one streaming run, in arrival order.
pub type EventStream = BoxStream<'static, Result<StreamEvent, GatewayError>>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("run stream error: {0}")]
    Stream(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("invalid API url: {0}")]
    InvalidUrl(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Capability an assistant (or a message attachment) can use during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    FileSearch,
    CodeInterpreter,
    Function,
    #[serde(other)]
    Other,
}

/// Wire form of a tool entry: `{ "type": "file_search" }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub kind: ToolKind,
}

impl ToolSpec {
    pub fn new(kind: ToolKind) -> Self {
        Self { kind }
    }
}

/// Document search plus code execution; enabled on every created assistant and every attachment.
pub fn document_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(ToolKind::FileSearch),
        ToolSpec::new(ToolKind::CodeInterpreter),
    ]
}

/// A remote assistant configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantHandle {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    pub model: String,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

/// Parameters for creating an assistant.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantSpec {
    pub name: String,
    pub instructions: String,
    pub model: String,
    pub tools: Vec<ToolSpec>,
}

/// A remote conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadHandle {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// File attached to a message, with the tools allowed to read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_id: String,
    pub tools: Vec<ToolSpec>,
}

/// Message to post on a thread.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub role: Role,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl NewMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Gateway acknowledgment of a posted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    pub role: Role,
}

/// Processing state of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Uploaded,
    Processed,
    Error,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHandle {
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default = "default_file_status")]
    pub status: FileStatus,
}

fn default_file_status() -> FileStatus {
    FileStatus::Uploaded
}

/// Hosted assistant API: assistants, threads, messages, files, and streaming runs.
#[async_trait]
pub trait AssistantGateway: Send + Sync {
    /// Short display name for an assistant built from the given instructions.
    async fn suggest_assistant_name(&self, instructions: &str) -> Result<String, GatewayError>;

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantHandle, GatewayError>;

    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantHandle, GatewayError>;

    async fn update_assistant_model(
        &self,
        assistant_id: &str,
        model: &str,
    ) -> Result<AssistantHandle, GatewayError>;

    async fn create_thread(&self) -> Result<ThreadHandle, GatewayError>;

    async fn post_message(
        &self,
        thread_id: &str,
        message: &NewMessage,
    ) -> Result<MessageRecord, GatewayError>;

    async fn upload_file(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        purpose: &str,
    ) -> Result<FileHandle, GatewayError>;

    async fn file_status(&self, file_id: &str) -> Result<FileStatus, GatewayError>;

    /// Start a run of `assistant_id` over `thread_id` and stream its events until the run is done.
    async fn run_stream(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<EventStream, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_handle_parses_api_object() {
        let json = r#"{
            "id": "asst_abc",
            "object": "assistant",
            "name": "Math Tutor",
            "instructions": "Answer math questions",
            "model": "gpt-4o-mini",
            "tools": [{ "type": "file_search" }, { "type": "code_interpreter" }, { "type": "retrieval_v9" }]
        }"#;
        let a: AssistantHandle = serde_json::from_str(json).unwrap();
        assert_eq!(a.id, "asst_abc");
        assert_eq!(a.name.as_deref(), Some("Math Tutor"));
        assert_eq!(
            a.tools.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![ToolKind::FileSearch, ToolKind::CodeInterpreter, ToolKind::Other]
        );
    }

    #[test]
    fn tool_spec_serializes_as_type_object() {
        let v = serde_json::to_value(document_tools()).unwrap();
        assert_eq!(
            v,
            serde_json::json!([{ "type": "file_search" }, { "type": "code_interpreter" }])
        );
    }

    #[test]
    fn file_handle_unknown_status_is_other() {
        let f: FileHandle =
            serde_json::from_str(r#"{ "id": "file-1", "filename": "a.pdf", "status": "queued" }"#)
                .unwrap();
        assert_eq!(f.status, FileStatus::Other);
    }
}
