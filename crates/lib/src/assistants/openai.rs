//! OpenAI Assistants v2 client (https://api.openai.com/v1 by default).
//! Runs are streamed as SSE and decoded on a pump task that forwards typed events over a channel.

use super::events::{error_message, EventDecoder, SseFrame, SseParser, StreamEvent};
use super::{
    AssistantGateway, AssistantHandle, AssistantSpec, Attachment, EventStream, FileHandle,
    FileStatus, GatewayError, MessageRecord, NewMessage, Role, ThreadHandle,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const ASSISTANTS_BETA: &str = "assistants=v2";
const DEFAULT_NAMING_MODEL: &str = "gpt-4o-mini";
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Client for the hosted assistants API.
#[derive(Clone)]
pub struct OpenAiAssistants {
    base_url: String,
    api_key: String,
    naming_model: String,
    client: reqwest::Client,
}

impl OpenAiAssistants {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key: api_key.into(),
            naming_model: DEFAULT_NAMING_MODEL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Model used by `suggest_assistant_name`.
    pub fn with_naming_model(mut self, model: impl Into<String>) -> Self {
        self.naming_model = model.into();
        self
    }

    /// Base URL plus `segments`, each percent-encoded as a single path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| GatewayError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<reqwest::RequestBuilder, GatewayError> {
        Ok(self
            .client
            .request(method, self.endpoint(segments)?)
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", ASSISTANTS_BETA))
    }
}

/// Non-2xx → NotFound (404) or Api with the provider's error message.
async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    let message = error_message(&body);
    if status == StatusCode::NOT_FOUND {
        Err(GatewayError::NotFound(message))
    } else {
        Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

async fn read_json<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, GatewayError> {
    let res = check_status(res).await?;
    let body = res.text().await?;
    serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()))
}

#[async_trait]
impl AssistantGateway for OpenAiAssistants {
    /// POST /chat/completions: a few tokens naming the assistant.
    async fn suggest_assistant_name(&self, instructions: &str) -> Result<String, GatewayError> {
        let prompt = format!(
            "Generate a suitable name for an AI assistant based on the following instruction: {}, return only the name without double quotes",
            instructions
        );
        let body = json!({
            "model": self.naming_model,
            "messages": [
                { "role": "system", "content": "You are an AI assistant name generator." },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": 10,
            "temperature": 0.1,
        });
        let res = self
            .request(Method::POST, &["chat", "completions"])?
            .json(&body)
            .send()
            .await?;
        let data: ChatCompletionResponse = read_json(res).await?;
        let name = data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().trim_matches('"').trim().to_string())
            .unwrap_or_default();
        if name.is_empty() {
            return Err(GatewayError::Decode("empty assistant name".to_string()));
        }
        Ok(name)
    }

    /// POST /assistants
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantHandle, GatewayError> {
        let res = self
            .request(Method::POST, &["assistants"])?
            .json(spec)
            .send()
            .await?;
        read_json(res).await
    }

    /// GET /assistants/{id}
    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantHandle, GatewayError> {
        let res = self
            .request(Method::GET, &["assistants", assistant_id])?
            .send()
            .await?;
        read_json(res).await
    }

    /// POST /assistants/{id} with only the model changed.
    async fn update_assistant_model(
        &self,
        assistant_id: &str,
        model: &str,
    ) -> Result<AssistantHandle, GatewayError> {
        let res = self
            .request(Method::POST, &["assistants", assistant_id])?
            .json(&json!({ "model": model }))
            .send()
            .await?;
        read_json(res).await
    }

    /// POST /threads
    async fn create_thread(&self) -> Result<ThreadHandle, GatewayError> {
        let res = self
            .request(Method::POST, &["threads"])?
            .json(&json!({}))
            .send()
            .await?;
        read_json(res).await
    }

    /// POST /threads/{id}/messages
    async fn post_message(
        &self,
        thread_id: &str,
        message: &NewMessage,
    ) -> Result<MessageRecord, GatewayError> {
        let body = MessageRequest {
            role: message.role,
            content: &message.text,
            attachments: &message.attachments,
        };
        let res = self
            .request(Method::POST, &["threads", thread_id, "messages"])?
            .json(&body)
            .send()
            .await?;
        read_json(res).await
    }

    /// POST /files (multipart).
    async fn upload_file(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        purpose: &str,
    ) -> Result<FileHandle, GatewayError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new()
            .text("purpose", purpose.to_string())
            .part("file", part);
        let res = self
            .request(Method::POST, &["files"])?
            .multipart(form)
            .send()
            .await?;
        read_json(res).await
    }

    /// GET /files/{id}
    async fn file_status(&self, file_id: &str) -> Result<FileStatus, GatewayError> {
        let res = self
            .request(Method::GET, &["files", file_id])?
            .send()
            .await?;
        let file: FileHandle = read_json(res).await?;
        Ok(file.status)
    }

    /// POST /threads/{id}/runs with stream: true.
    async fn run_stream(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<EventStream, GatewayError> {
        let res = self
            .request(Method::POST, &["threads", thread_id, "runs"])?
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&json!({ "assistant_id": assistant_id, "stream": true }))
            .send()
            .await?;
        let res = check_status(res).await?;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(pump_events(res, tx));
        let events = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(events.boxed())
    }
}

type EventSender = mpsc::Sender<Result<StreamEvent, GatewayError>>;

/// Reads the SSE body and forwards decoded events until `Done`, an error, or the consumer goes away.
async fn pump_events(res: reqwest::Response, tx: EventSender) {
    let mut body = res.bytes_stream();
    let mut parser = SseParser::new();
    let mut decoder = EventDecoder::new();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tx.send(Err(GatewayError::Request(e))).await;
                return;
            }
        };
        for frame in parser.push(&chunk) {
            if !forward(&mut decoder, &frame, &tx).await {
                return;
            }
        }
    }
    if let Some(frame) = parser.finish() {
        forward(&mut decoder, &frame, &tx).await;
    }
}

/// Returns false when the pump should stop.
async fn forward(decoder: &mut EventDecoder, frame: &SseFrame, tx: &EventSender) -> bool {
    match decoder.decode(frame) {
        Ok(events) => {
            for event in events {
                let done = event == StreamEvent::Done;
                if tx.send(Ok(event)).await.is_err() {
                    log::debug!("run stream consumer dropped");
                    return false;
                }
                if done {
                    return false;
                }
            }
            true
        }
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

// --- wire types ---

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    role: Role,
    content: &'a str,
    #[serde(skip_serializing_if = "no_attachments")]
    attachments: &'a [Attachment],
}

fn no_attachments(attachments: &&[Attachment]) -> bool {
    attachments.is_empty()
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    #[serde(default)]
    content: Option<String>,
}
