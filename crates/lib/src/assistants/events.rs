//! Run stream events: SSE framing and decoding of provider events into `StreamEvent`.

use super::{GatewayError, ToolKind};
use serde::Deserialize;
use std::collections::HashSet;

/// One incremental event from a running completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A new text part of the assistant message started.
    TextCreated,
    /// Text appended to the current text part.
    TextDelta(String),
    /// The assistant started a tool call of this kind.
    ToolCallCreated(ToolKind),
    /// Incremental tool input/output.
    ToolCallDelta(ToolCallDelta),
    /// The run reached a terminal (or paused) status.
    RunFinished {
        status: RunStatus,
        last_error: Option<String>,
    },
    /// End of the event stream.
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallDelta {
    pub kind: ToolKind,
    /// Code fragment being sent to the code interpreter.
    pub input: Option<String>,
    /// Log outputs produced by the code interpreter.
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
    Expired,
    Incomplete,
    RequiresAction,
}

impl RunStatus {
    fn from_event(event: &str) -> Option<Self> {
        match event {
            "thread.run.completed" => Some(Self::Completed),
            "thread.run.failed" => Some(Self::Failed),
            "thread.run.cancelled" => Some(Self::Cancelled),
            "thread.run.expired" => Some(Self::Expired),
            "thread.run.incomplete" => Some(Self::Incomplete),
            "thread.run.requires_action" => Some(Self::RequiresAction),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Incomplete => "incomplete",
            Self::RequiresAction => "requires_action",
        }
    }
}

/// One server-sent event: optional event name and the joined data lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Splits a byte stream into SSE frames (blank-line separated). Frames may span chunks.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a network chunk; returns every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let frame_bytes: Vec<u8> = self.buffer.drain(..pos).collect();
            self.buffer.drain(..2);
            if let Some(frame) = parse_frame(&String::from_utf8_lossy(&frame_bytes)) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buffer);
        parse_frame(&String::from_utf8_lossy(&rest))
    }
}

fn parse_frame(text: &str) -> Option<SseFrame> {
    let mut frame = SseFrame::default();
    let mut data_lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => frame.event = Some(value.to_string()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }
    if frame.event.is_none() && data_lines.is_empty() {
        return None;
    }
    frame.data = data_lines.join("\n");
    Some(frame)
}

/// Turns provider frames into `StreamEvent`s. Stateful per run: remembers which text parts and
/// tool calls were already announced so each gets exactly one "created" event.
#[derive(Debug, Default)]
pub struct EventDecoder {
    text_parts: HashSet<(String, u32)>,
    tool_calls: HashSet<(String, u32)>,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, frame: &SseFrame) -> Result<Vec<StreamEvent>, GatewayError> {
        let event = frame.event.as_deref().unwrap_or("");
        if event == "done" || frame.data.trim() == "[DONE]" {
            return Ok(vec![StreamEvent::Done]);
        }
        match event {
            "thread.message.delta" => {
                let ev: MessageDeltaEvent = parse_data(event, &frame.data)?;
                Ok(self.message_delta(ev))
            }
            "thread.run.step.delta" => {
                let ev: RunStepDeltaEvent = parse_data(event, &frame.data)?;
                Ok(self.run_step_delta(ev))
            }
            "error" => Err(GatewayError::Stream(error_message(&frame.data))),
            other => match RunStatus::from_event(other) {
                Some(status) => {
                    let run: RunObject = parse_data(event, &frame.data)?;
                    Ok(vec![StreamEvent::RunFinished {
                        status,
                        last_error: run.last_error.and_then(|e| e.message),
                    }])
                }
                None => Ok(Vec::new()),
            },
        }
    }

    fn message_delta(&mut self, ev: MessageDeltaEvent) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        for part in ev.delta.content {
            if part.typ != "text" {
                continue;
            }
            if self.text_parts.insert((ev.id.clone(), part.index)) {
                out.push(StreamEvent::TextCreated);
            }
            if let Some(value) = part.text.and_then(|t| t.value) {
                if !value.is_empty() {
                    out.push(StreamEvent::TextDelta(value));
                }
            }
        }
        out
    }

    fn run_step_delta(&mut self, ev: RunStepDeltaEvent) -> Vec<StreamEvent> {
        let Some(details) = ev.delta.step_details else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for call in details.tool_calls {
            let kind = call.kind.unwrap_or(ToolKind::Other);
            if self.tool_calls.insert((ev.id.clone(), call.index)) {
                out.push(StreamEvent::ToolCallCreated(kind));
            }
            let (input, logs) = match call.code_interpreter {
                Some(ci) => (
                    ci.input.filter(|s| !s.is_empty()),
                    ci.outputs
                        .into_iter()
                        .filter(|o| o.typ == "logs")
                        .filter_map(|o| o.logs)
                        .collect(),
                ),
                None => (None, Vec::new()),
            };
            out.push(StreamEvent::ToolCallDelta(ToolCallDelta { kind, input, logs }));
        }
        out
    }
}

fn parse_data<'a, T: Deserialize<'a>>(event: &str, data: &'a str) -> Result<T, GatewayError> {
    serde_json::from_str(data).map_err(|e| GatewayError::Decode(format!("{}: {}", event, e)))
}

/// Provider error payloads are `{ "error": { "message" } }` or the bare error object.
pub(super) fn error_message(data: &str) -> String {
    let Ok(v) = serde_json::from_str::<serde_json::Value>(data) else {
        return data.to_string();
    };
    v.get("error")
        .unwrap_or(&v)
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| data.to_string())
}

// --- wire types ---

#[derive(Debug, Deserialize)]
struct MessageDeltaEvent {
    id: String,
    delta: MessageDelta,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    #[serde(default)]
    content: Vec<MessageDeltaContent>,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaContent {
    #[serde(default)]
    index: u32,
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    text: Option<TextDeltaBody>,
}

#[derive(Debug, Deserialize)]
struct TextDeltaBody {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunStepDeltaEvent {
    id: String,
    delta: RunStepDelta,
}

#[derive(Debug, Deserialize)]
struct RunStepDelta {
    #[serde(default)]
    step_details: Option<StepDetails>,
}

#[derive(Debug, Deserialize)]
struct StepDetails {
    #[serde(default)]
    tool_calls: Vec<ToolCallDeltaWire>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDeltaWire {
    #[serde(default)]
    index: u32,
    #[serde(rename = "type", default)]
    kind: Option<ToolKind>,
    #[serde(default)]
    code_interpreter: Option<CodeInterpreterDelta>,
}

#[derive(Debug, Deserialize)]
struct CodeInterpreterDelta {
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    outputs: Vec<CodeInterpreterOutput>,
}

#[derive(Debug, Deserialize)]
struct CodeInterpreterOutput {
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    logs: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Debug, Deserialize)]
struct RunError {
    #[serde(default)]
    message: Option<String>,
}
