//! Simulated streaming: reveal an already-complete reply a few characters at a time.

use std::time::Duration;

/// Appended to every partial frame.
pub const CURSOR: &str = "▌";

/// Growing prefixes of `text`, `chunk_size` characters apart (last step may be shorter).
/// A chunk size of 0 is treated as 1. Empty text yields no prefixes.
pub fn prefixes(text: &str, chunk_size: usize) -> Vec<&str> {
    let chunk_size = chunk_size.max(1);
    let mut out: Vec<&str> = text
        .char_indices()
        .map(|(i, _)| i)
        .skip(chunk_size)
        .step_by(chunk_size)
        .map(|end| &text[..end])
        .collect();
    if !text.is_empty() {
        out.push(text);
    }
    out
}

/// Write each prefix plus the cursor to `sink`, pausing `interval` after each, then write the full
/// text without the cursor. Stored chat history is not affected by any of this.
pub async fn render_incrementally(
    text: &str,
    chunk_size: usize,
    interval: Duration,
    sink: &mut (dyn FnMut(&str) + Send),
) {
    for prefix in prefixes(text, chunk_size) {
        let frame = format!("{}{}", prefix, CURSOR);
        sink(&frame);
        tokio::time::sleep(interval).await;
    }
    sink(text);
}
