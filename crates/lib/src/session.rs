//! Per-session page state and the controller that moves it between the setup and chat pages.
//!
//! Each browser session owns one `SessionController`; actions run one at a time and either fully
//! apply or leave the state untouched.

use crate::assistants::{AssistantGateway, AssistantHandle, GatewayError, Role, ThreadHandle};
use crate::config::Config;
use crate::conversation::{Conversation, PollSchedule, UploadError};
use crate::render;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Unique session identifier (opaque string).
pub type SessionId = String;

const FILE_ACK: &str = "Got it! I have processed the file. You can ask me questions about it.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Page {
    #[default]
    Setup,
    Chat,
}

/// One line of the visible chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: Role,
    pub text: String,
}

impl ChatEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Everything the UI session remembers. Starts empty on the setup page; never persisted.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub assistant: Option<AssistantHandle>,
    pub thread: Option<ThreadHandle>,
    pub chat_history: Vec<ChatEntry>,
    /// Local file name → remote file id.
    pub uploaded_files: BTreeMap<String, String>,
    pub file_processed: bool,
    pub page: Page,
    pub selected_model: Option<String>,
}

/// Serializable view of the session sent to the page after every action.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub page: Page,
    pub assistant: Option<AssistantHandle>,
    pub thread_id: Option<String>,
    pub chat_history: Vec<ChatEntry>,
    pub uploaded_files: BTreeMap<String, String>,
    pub file_processed: bool,
    pub selected_model: Option<String>,
    pub available_models: Vec<String>,
}

/// Controller knobs taken from config.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub default_model: String,
    pub available_models: Vec<String>,
    pub upload_dir: PathBuf,
    pub poll: PollSchedule,
    pub chunk_size: usize,
    pub render_interval: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_model: config.assistant.default_model.clone(),
            available_models: config.assistant.available_models.clone(),
            upload_dir: config.uploads.directory.clone(),
            poll: PollSchedule::from_config(&config.uploads),
            chunk_size: config.render.chunk_size,
            render_interval: Duration::from_millis(config.render.interval_ms),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// User-facing action failures. The display text is what the page shows.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Please enter a valid Assistant ID.")]
    MissingAssistantId,
    #[error("Please provide instructions to create the assistant.")]
    MissingInstructions,
    #[error("Please enter a message.")]
    EmptyMessage,
    #[error("No assistant loaded. Please load or create an assistant first.")]
    NoAssistant,
    #[error("An assistant is already loaded in this session.")]
    AlreadyInChat,
    #[error("Unknown model '{0}'.")]
    UnknownModel(String),
    #[error("Failed to load assistant: {0}")]
    Load(GatewayError),
    #[error("Failed to create assistant: {0}")]
    Create(GatewayError),
    #[error("Failed to update model: {0}")]
    UpdateModel(GatewayError),
    #[error("Failed to process file: {0}")]
    Upload(UploadError),
    #[error("Failed to get a reply: {0}")]
    Reply(GatewayError),
}

/// Result of an upload action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Same file name already processed in this session; nothing was sent.
    AlreadyProcessed,
    Processed { file_id: String },
}

impl UploadOutcome {
    pub fn notice(&self, file_name: &str) -> String {
        match self {
            Self::AlreadyProcessed => "Answering Questions mode.".to_string(),
            Self::Processed { .. } => format!("File '{}' processed successfully!", file_name),
        }
    }
}

/// Page director for one UI session: holds `SessionState` and dispatches actions to the orchestrator.
pub struct SessionController {
    id: SessionId,
    conversation: Conversation,
    settings: SessionSettings,
    state: SessionState,
}

impl SessionController {
    pub fn new(gateway: Arc<dyn AssistantGateway>, settings: SessionSettings) -> Self {
        Self {
            id: format!("sess-{}", uuid::Uuid::new_v4()),
            conversation: Conversation::new(gateway),
            settings,
            state: SessionState::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            page: self.state.page,
            assistant: self.state.assistant.clone(),
            thread_id: self.state.thread.as_ref().map(|t| t.id.clone()),
            chat_history: self.state.chat_history.clone(),
            uploaded_files: self.state.uploaded_files.clone(),
            file_processed: self.state.file_processed,
            selected_model: self
                .state
                .selected_model
                .clone()
                .or_else(|| Some(self.settings.default_model.clone())),
            available_models: self.settings.available_models.clone(),
        }
    }

    /// Setup page: retrieve an existing assistant, open a thread, go to chat.
    pub async fn load_assistant(&mut self, assistant_id: &str) -> Result<(), SessionError> {
        self.require_setup()?;
        let assistant_id = assistant_id.trim();
        if assistant_id.is_empty() {
            return Err(SessionError::MissingAssistantId);
        }
        let assistant = self
            .conversation
            .load_assistant(assistant_id)
            .await
            .map_err(SessionError::Load)?;
        let thread = self
            .conversation
            .open_thread()
            .await
            .map_err(SessionError::Load)?;
        self.enter_chat(assistant, thread);
        Ok(())
    }

    /// Setup page: create a new assistant from instructions, open a thread, go to chat.
    pub async fn create_assistant(&mut self, instructions: &str) -> Result<(), SessionError> {
        self.require_setup()?;
        if instructions.trim().is_empty() {
            return Err(SessionError::MissingInstructions);
        }
        let assistant = self
            .conversation
            .create_assistant(instructions, &self.settings.default_model)
            .await
            .map_err(SessionError::Create)?;
        let thread = self
            .conversation
            .open_thread()
            .await
            .map_err(SessionError::Create)?;
        self.enter_chat(assistant, thread);
        Ok(())
    }

    /// Chat page: switch the loaded assistant to `model`. Returns the success notice.
    pub async fn update_model(&mut self, model: &str) -> Result<String, SessionError> {
        let assistant_id = match &self.state.assistant {
            Some(a) => a.id.clone(),
            None => return Err(SessionError::NoAssistant),
        };
        if !self.settings.available_models.iter().any(|m| m == model) {
            return Err(SessionError::UnknownModel(model.to_string()));
        }
        let updated = self
            .conversation
            .change_model(&assistant_id, model)
            .await
            .map_err(SessionError::UpdateModel)?;
        self.state.assistant = Some(updated);
        self.state.selected_model = Some(model.to_string());
        log::info!("{}: model updated to {}", self.id, model);
        Ok(format!("Model updated to '{}' successfully!", model))
    }

    /// Chat page: stage, upload, and attach a file, unless this name was already processed.
    pub async fn upload_file(
        &mut self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<UploadOutcome, SessionError> {
        let (_, thread) = self.chat_handles()?;
        if self.state.file_processed && self.state.uploaded_files.contains_key(file_name) {
            return Ok(UploadOutcome::AlreadyProcessed);
        }
        let path = Conversation::stage_upload(&self.settings.upload_dir, file_name, bytes)
            .await
            .map_err(SessionError::Upload)?;
        let file_id = self
            .conversation
            .upload_and_wait(&path, &self.settings.poll)
            .await
            .map_err(SessionError::Upload)?;
        self.conversation
            .attach_file_message(&thread, &format!("Here is a file: {}.", file_name), &file_id)
            .await
            .map_err(|e| SessionError::Upload(UploadError::Gateway(e)))?;

        self.state
            .uploaded_files
            .insert(file_name.to_string(), file_id.clone());
        self.state.chat_history.push(ChatEntry::user(format!(
            "Here is a file: {}. Keep it.",
            file_name
        )));
        self.state.chat_history.push(ChatEntry::assistant(FILE_ACK));
        self.state.file_processed = true;
        log::info!("{}: file {} registered as {}", self.id, file_name, file_id);
        Ok(UploadOutcome::Processed { file_id })
    }

    /// Chat page: post the user's message, wait for the assistant's full reply, play it back through
    /// `on_frame`, then record both turns.
    pub async fn send_message(
        &mut self,
        input: &str,
        on_frame: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, SessionError> {
        if input.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let (assistant, thread) = self.chat_handles()?;
        self.conversation
            .send_user_message(&thread, input)
            .await
            .map_err(SessionError::Reply)?;
        let reply = self
            .conversation
            .run_and_collect(&thread, &assistant)
            .await
            .map_err(SessionError::Reply)?;
        render::render_incrementally(
            &reply,
            self.settings.chunk_size,
            self.settings.render_interval,
            on_frame,
        )
        .await;
        self.state.chat_history.push(ChatEntry::user(input));
        self.state.chat_history.push(ChatEntry::assistant(reply.clone()));
        Ok(reply)
    }

    fn require_setup(&self) -> Result<(), SessionError> {
        if self.state.page == Page::Setup {
            Ok(())
        } else {
            Err(SessionError::AlreadyInChat)
        }
    }

    fn chat_handles(&self) -> Result<(AssistantHandle, ThreadHandle), SessionError> {
        match (&self.state.page, &self.state.assistant, &self.state.thread) {
            (Page::Chat, Some(a), Some(t)) => Ok((a.clone(), t.clone())),
            _ => Err(SessionError::NoAssistant),
        }
    }

    /// Both handles are set together, then the page flips.
    fn enter_chat(&mut self, assistant: AssistantHandle, thread: ThreadHandle) {
        log::info!(
            "{}: assistant {} ready on thread {}",
            self.id,
            assistant.id,
            thread.id
        );
        self.state.selected_model = Some(assistant.model.clone());
        self.state.assistant = Some(assistant);
        self.state.thread = Some(thread);
        self.state.page = Page::Chat;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_on_setup_and_empty() {
        let s = SessionState::default();
        assert_eq!(s.page, Page::Setup);
        assert!(s.assistant.is_none());
        assert!(s.thread.is_none());
        assert!(s.chat_history.is_empty());
        assert!(s.uploaded_files.is_empty());
        assert!(!s.file_processed);
        assert!(s.selected_model.is_none());
    }

    #[test]
    fn chat_entry_serializes_lowercase_role() {
        let v = serde_json::to_value(ChatEntry::assistant("hi")).unwrap();
        assert_eq!(v, serde_json::json!({ "role": "assistant", "text": "hi" }));
    }

    #[test]
    fn upload_notices() {
        assert_eq!(
            UploadOutcome::AlreadyProcessed.notice("a.pdf"),
            "Answering Questions mode."
        );
        assert_eq!(
            UploadOutcome::Processed {
                file_id: "file-1".into()
            }
            .notice("a.pdf"),
            "File 'a.pdf' processed successfully!"
        );
    }

    #[test]
    fn settings_follow_config() {
        let mut config = Config::default();
        config.render.chunk_size = 3;
        config.render.interval_ms = 0;
        let s = SessionSettings::from_config(&config);
        assert_eq!(s.chunk_size, 3);
        assert_eq!(s.render_interval, Duration::ZERO);
        assert_eq!(s.default_model, "gpt-4o-mini");
    }
}
