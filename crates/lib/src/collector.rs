//! Streaming response collector: reduces one run's events into the assistant's final text.
//!
//! Tool activity (code interpreter input and log output) goes to the `pdfchat::tools` log target
//! and the collector's tool log; it never becomes part of the returned text.

use crate::assistants::{EventStream, GatewayError, RunStatus, StreamEvent, ToolKind};
use futures_util::StreamExt;

const TOOL_LOG_TARGET: &str = "pdfchat::tools";

/// Whether the run has more events to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Done,
}

/// Accumulator for a single run. Create one per run and drop it afterwards.
#[derive(Debug, Default)]
pub struct ResponseCollector {
    text: String,
    tool_log: Vec<String>,
    status: Option<RunStatus>,
}

impl ResponseCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event in arrival order.
    pub fn apply(&mut self, event: StreamEvent) -> Flow {
        match event {
            StreamEvent::TextCreated => {
                log::debug!("assistant > (text started)");
            }
            StreamEvent::TextDelta(value) => {
                log::trace!("assistant > {}", value);
                self.text.push_str(&value);
            }
            StreamEvent::ToolCallCreated(kind) => {
                log::info!(target: TOOL_LOG_TARGET, "assistant > {:?}", kind);
            }
            StreamEvent::ToolCallDelta(delta) => {
                if delta.kind == ToolKind::CodeInterpreter {
                    if let Some(input) = delta.input {
                        log::info!(target: TOOL_LOG_TARGET, "{}", input);
                        self.tool_log.push(input);
                    }
                    for logs in delta.logs {
                        log::info!(target: TOOL_LOG_TARGET, "output > {}", logs);
                        self.tool_log.push(logs);
                    }
                }
            }
            StreamEvent::RunFinished { status, last_error } => {
                if status != RunStatus::Completed {
                    log::warn!(
                        "run finished with status {}: {}",
                        status.as_str(),
                        last_error.as_deref().unwrap_or("no error detail")
                    );
                }
                self.status = Some(status);
            }
            StreamEvent::Done => return Flow::Done,
        }
        Flow::Continue
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Code interpreter input fragments and log outputs seen so far.
    pub fn tool_log(&self) -> &[String] {
        &self.tool_log
    }

    /// Terminal status reported by the run, if any arrived.
    pub fn status(&self) -> Option<RunStatus> {
        self.status
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Drive `events` to completion (`Done` or end of stream) and return the concatenated text.
/// An error item aborts collection.
pub async fn collect(mut events: EventStream) -> Result<String, GatewayError> {
    let mut collector = ResponseCollector::new();
    while let Some(event) = events.next().await {
        if collector.apply(event?) == Flow::Done {
            break;
        }
    }
    Ok(collector.into_text())
}
