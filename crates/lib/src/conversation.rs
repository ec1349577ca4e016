//! Conversation orchestrator: assistant setup, message posting, runs, and file uploads as plain
//! async calls over an injected `AssistantGateway`.

use crate::assistants::{
    document_tools, AssistantGateway, AssistantHandle, AssistantSpec, Attachment, FileStatus,
    GatewayError, MessageRecord, NewMessage, ThreadHandle,
};
use crate::collector;
use crate::config::UploadConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Purpose tag for files that assistants may read.
pub const UPLOAD_PURPOSE: &str = "assistants";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("staging upload failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid file name: {0:?}")]
    InvalidName(String),
    #[error("file {0} failed processing")]
    Failed(String),
    #[error("file {file_id} not processed after {attempts} checks")]
    NotProcessed { file_id: String, attempts: u32 },
}

/// When to re-check an uploaded file's processing status.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub backoff: f64,
    pub max_interval: Duration,
    pub max_attempts: u32,
}

impl PollSchedule {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            backoff: config.poll_backoff,
            max_interval: Duration::from_millis(config.max_poll_interval_ms),
            max_attempts: config.max_poll_attempts.max(1),
        }
    }

    /// Wait after the given (0-based) unsuccessful check.
    /// Clamped in seconds before converting, so large attempts saturate at the cap.
    pub fn delay(&self, attempt: u32) -> Duration {
        let cap = self.max_interval.max(self.interval);
        let factor = self.backoff.max(1.0).powi(attempt.min(64) as i32);
        let secs = (self.interval.as_secs_f64() * factor).min(cap.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(cap)
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}

/// Orchestrates one session's calls to the gateway.
#[derive(Clone)]
pub struct Conversation {
    gateway: Arc<dyn AssistantGateway>,
}

impl Conversation {
    pub fn new(gateway: Arc<dyn AssistantGateway>) -> Self {
        Self { gateway }
    }

    /// Name the assistant from its instructions, then create it with document search and code execution.
    pub async fn create_assistant(
        &self,
        instructions: &str,
        model: &str,
    ) -> Result<AssistantHandle, GatewayError> {
        let name = self.gateway.suggest_assistant_name(instructions).await?;
        log::info!("creating assistant {:?} on {}", name, model);
        let spec = AssistantSpec {
            name,
            instructions: instructions.to_string(),
            model: model.to_string(),
            tools: document_tools(),
        };
        self.gateway.create_assistant(&spec).await
    }

    pub async fn load_assistant(&self, assistant_id: &str) -> Result<AssistantHandle, GatewayError> {
        self.gateway.retrieve_assistant(assistant_id).await
    }

    pub async fn change_model(
        &self,
        assistant_id: &str,
        model: &str,
    ) -> Result<AssistantHandle, GatewayError> {
        self.gateway.update_assistant_model(assistant_id, model).await
    }

    pub async fn open_thread(&self) -> Result<ThreadHandle, GatewayError> {
        self.gateway.create_thread().await
    }

    /// Post a plain user message. Callers reject empty text.
    pub async fn send_user_message(
        &self,
        thread: &ThreadHandle,
        text: &str,
    ) -> Result<MessageRecord, GatewayError> {
        self.gateway
            .post_message(&thread.id, &NewMessage::user(text))
            .await
    }

    /// Post a user message carrying `file_id`, readable by both document search and code execution
    /// whatever the file type.
    pub async fn attach_file_message(
        &self,
        thread: &ThreadHandle,
        text: &str,
        file_id: &str,
    ) -> Result<MessageRecord, GatewayError> {
        let message = NewMessage::user(text).with_attachment(Attachment {
            file_id: file_id.to_string(),
            tools: document_tools(),
        });
        self.gateway.post_message(&thread.id, &message).await
    }

    /// Run the assistant on the thread and wait for the complete reply. No timeout: a stalled run
    /// holds the session until the provider ends the stream.
    pub async fn run_and_collect(
        &self,
        thread: &ThreadHandle,
        assistant: &AssistantHandle,
    ) -> Result<String, GatewayError> {
        let events = self.gateway.run_stream(&thread.id, &assistant.id).await?;
        collector::collect(events).await
    }

    /// Write `bytes` to `dir/<file_name>` (directory created if missing) and return the path.
    /// Only the final path component of `file_name` is used. Staged files are left in place.
    pub async fn stage_upload(
        dir: &Path,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, UploadError> {
        let base = Path::new(file_name)
            .file_name()
            .ok_or_else(|| UploadError::InvalidName(file_name.to_string()))?;
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(base);
        tokio::fs::write(&path, bytes).await?;
        log::debug!("staged upload at {}", path.display());
        Ok(path)
    }

    /// Upload the staged file and poll until the provider reports it processed. Returns the file id.
    pub async fn upload_and_wait(
        &self,
        path: &Path,
        schedule: &PollSchedule,
    ) -> Result<String, UploadError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| UploadError::InvalidName(path.display().to_string()))?;
        let bytes = tokio::fs::read(path).await?;
        let file = self
            .gateway
            .upload_file(&file_name, bytes, UPLOAD_PURPOSE)
            .await?;
        log::info!("uploaded {} as {}", file_name, file.id);
        if file.status == FileStatus::Processed {
            return Ok(file.id);
        }
        for attempt in 0..schedule.max_attempts {
            match self.gateway.file_status(&file.id).await? {
                FileStatus::Processed => return Ok(file.id),
                FileStatus::Error => return Err(UploadError::Failed(file.id)),
                status => log::debug!("file {} status {:?}, waiting", file.id, status),
            }
            tokio::time::sleep(schedule.delay(attempt)).await;
        }
        Err(UploadError::NotProcessed {
            file_id: file.id,
            attempts: schedule.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(backoff: f64) -> PollSchedule {
        PollSchedule {
            interval: Duration::from_millis(1000),
            backoff,
            max_interval: Duration::from_millis(5000),
            max_attempts: 10,
        }
    }

    #[test]
    fn fixed_interval_when_backoff_is_one() {
        let s = schedule(1.0);
        assert_eq!(s.delay(0), Duration::from_millis(1000));
        assert_eq!(s.delay(7), Duration::from_millis(1000));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let s = schedule(2.0);
        assert_eq!(s.delay(0), Duration::from_millis(1000));
        assert_eq!(s.delay(1), Duration::from_millis(2000));
        assert_eq!(s.delay(2), Duration::from_millis(4000));
        assert_eq!(s.delay(3), Duration::from_millis(5000));
        assert_eq!(s.delay(40), Duration::from_millis(5000));
    }

    #[test]
    fn steep_backoff_saturates_instead_of_overflowing() {
        let mut config = UploadConfig::default();
        config.poll_backoff = 2.0;
        config.max_poll_attempts = 120;
        let s = PollSchedule::from_config(&config);
        let cap = Duration::from_millis(config.max_poll_interval_ms);
        assert_eq!(s.delay(64), cap);
        assert_eq!(s.delay(119), cap);
        assert_eq!(s.delay(u32::MAX), cap);

        let s = schedule(1e6);
        assert_eq!(s.delay(64), Duration::from_millis(5000));
        assert_eq!(s.delay(u32::MAX), Duration::from_millis(5000));
    }

    #[test]
    fn schedule_from_config_requires_one_attempt() {
        let mut config = UploadConfig::default();
        config.max_poll_attempts = 0;
        assert_eq!(PollSchedule::from_config(&config).max_attempts, 1);
    }

    #[tokio::test]
    async fn stage_upload_keeps_only_the_file_name() {
        let dir = std::env::temp_dir().join(format!("pdfchat-stage-{}", uuid::Uuid::new_v4()));
        let path = Conversation::stage_upload(&dir, "../../etc/report.pdf", b"%PDF-1.4")
            .await
            .unwrap();
        assert_eq!(path, dir.join("report.pdf"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"%PDF-1.4");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn stage_upload_rejects_empty_name() {
        let dir = std::env::temp_dir();
        let err = Conversation::stage_upload(&dir, "..", b"x").await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidName(_)));
    }
}
