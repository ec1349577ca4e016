//! Scripted in-memory gateway shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::StreamExt;
use lib::assistants::{
    AssistantGateway, AssistantHandle, AssistantSpec, EventStream, FileHandle, FileStatus,
    GatewayError, MessageRecord, NewMessage, Role, RunStatus, StreamEvent, ThreadHandle,
};
use lib::session::SessionSettings;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct Calls {
    pub suggest: AtomicUsize,
    pub create: AtomicUsize,
    pub retrieve: AtomicUsize,
    pub update: AtomicUsize,
    pub threads: AtomicUsize,
    pub uploads: AtomicUsize,
    pub status: AtomicUsize,
    pub runs: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Known assistants are returned by id; anything else is NotFound. Every run replays `reply`.
pub struct MockGateway {
    pub calls: Calls,
    pub assistants: Mutex<HashMap<String, AssistantHandle>>,
    pub posted: Mutex<Vec<(String, NewMessage)>>,
    pub reply: Mutex<Vec<StreamEvent>>,
    pub file_statuses: Mutex<Vec<FileStatus>>,
    pub fail_threads: bool,
    pub fail_create: bool,
    pub fail_update: bool,
    pub fail_runs: bool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            calls: Calls::default(),
            assistants: Mutex::new(HashMap::new()),
            posted: Mutex::new(Vec::new()),
            reply: Mutex::new(text_reply(&["The answer ", "is 42."])),
            file_statuses: Mutex::new(Vec::new()),
            fail_threads: false,
            fail_create: false,
            fail_update: false,
            fail_runs: false,
        }
    }

    pub fn with_assistant(self, id: &str, model: &str) -> Self {
        self.assistants.lock().unwrap().insert(
            id.to_string(),
            AssistantHandle {
                id: id.to_string(),
                name: Some("Existing".to_string()),
                instructions: None,
                model: model.to_string(),
                tools: Vec::new(),
            },
        );
        self
    }

    pub fn with_reply(self, events: Vec<StreamEvent>) -> Self {
        *self.reply.lock().unwrap() = events;
        self
    }

    /// Statuses returned by successive `file_status` calls; Processed once exhausted.
    pub fn with_file_statuses(self, statuses: Vec<FileStatus>) -> Self {
        *self.file_statuses.lock().unwrap() = statuses;
        self
    }

    pub fn posted_texts(&self) -> Vec<String> {
        self.posted
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.text.clone())
            .collect()
    }
}

fn unavailable(what: &str) -> GatewayError {
    GatewayError::Api {
        status: 500,
        message: format!("{} service unavailable", what),
    }
}

/// A completed run whose text arrives in the given deltas.
pub fn text_reply(deltas: &[&str]) -> Vec<StreamEvent> {
    let mut events = vec![StreamEvent::TextCreated];
    events.extend(deltas.iter().map(|d| StreamEvent::TextDelta(d.to_string())));
    events.push(StreamEvent::RunFinished {
        status: RunStatus::Completed,
        last_error: None,
    });
    events.push(StreamEvent::Done);
    events
}

#[async_trait]
impl AssistantGateway for MockGateway {
    async fn suggest_assistant_name(&self, _instructions: &str) -> Result<String, GatewayError> {
        self.calls.suggest.fetch_add(1, Ordering::SeqCst);
        Ok("Math Helper".to_string())
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantHandle, GatewayError> {
        let n = self.calls.create.fetch_add(1, Ordering::SeqCst);
        if self.fail_create {
            return Err(unavailable("assistant"));
        }
        let handle = AssistantHandle {
            id: format!("asst_new{}", n + 1),
            name: Some(spec.name.clone()),
            instructions: Some(spec.instructions.clone()),
            model: spec.model.clone(),
            tools: spec.tools.clone(),
        };
        self.assistants
            .lock()
            .unwrap()
            .insert(handle.id.clone(), handle.clone());
        Ok(handle)
    }

    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantHandle, GatewayError> {
        self.calls.retrieve.fetch_add(1, Ordering::SeqCst);
        self.assistants
            .lock()
            .unwrap()
            .get(assistant_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("No assistant found with id '{}'.", assistant_id)))
    }

    async fn update_assistant_model(
        &self,
        assistant_id: &str,
        model: &str,
    ) -> Result<AssistantHandle, GatewayError> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        if self.fail_update {
            return Err(unavailable("assistant"));
        }
        let mut assistants = self.assistants.lock().unwrap();
        let handle = assistants
            .get_mut(assistant_id)
            .ok_or_else(|| GatewayError::NotFound(assistant_id.to_string()))?;
        handle.model = model.to_string();
        Ok(handle.clone())
    }

    async fn create_thread(&self) -> Result<ThreadHandle, GatewayError> {
        let n = self.calls.threads.fetch_add(1, Ordering::SeqCst);
        if self.fail_threads {
            return Err(unavailable("thread"));
        }
        Ok(ThreadHandle {
            id: format!("thread_{}", n + 1),
        })
    }

    async fn post_message(
        &self,
        thread_id: &str,
        message: &NewMessage,
    ) -> Result<MessageRecord, GatewayError> {
        let mut posted = self.posted.lock().unwrap();
        posted.push((thread_id.to_string(), message.clone()));
        Ok(MessageRecord {
            id: format!("msg_{}", posted.len()),
            thread_id: thread_id.to_string(),
            role: Role::User,
        })
    }

    async fn upload_file(
        &self,
        file_name: &str,
        _bytes: Vec<u8>,
        _purpose: &str,
    ) -> Result<FileHandle, GatewayError> {
        let n = self.calls.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(FileHandle {
            id: format!("file-{}", n + 1),
            filename: file_name.to_string(),
            status: FileStatus::Uploaded,
        })
    }

    async fn file_status(&self, _file_id: &str) -> Result<FileStatus, GatewayError> {
        self.calls.status.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.file_statuses.lock().unwrap();
        if statuses.is_empty() {
            Ok(FileStatus::Processed)
        } else {
            Ok(statuses.remove(0))
        }
    }

    async fn run_stream(
        &self,
        _thread_id: &str,
        _assistant_id: &str,
    ) -> Result<EventStream, GatewayError> {
        self.calls.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail_runs {
            return Err(unavailable("run"));
        }
        let events: Vec<Result<StreamEvent, GatewayError>> =
            self.reply.lock().unwrap().iter().cloned().map(Ok).collect();
        Ok(futures_util::stream::iter(events).boxed())
    }
}

/// Settings with a throwaway upload dir, instant rendering, and instant polling.
pub fn test_settings() -> SessionSettings {
    let mut settings = SessionSettings::default();
    settings.upload_dir = temp_dir("uploads");
    settings.render_interval = Duration::ZERO;
    settings.chunk_size = 4;
    settings.poll.interval = Duration::ZERO;
    settings.poll.max_interval = Duration::ZERO;
    settings.poll.max_attempts = 5;
    settings
}

pub fn temp_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("pdfchat-test-{}-{}", label, uuid::Uuid::new_v4()))
}

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}
