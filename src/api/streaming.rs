use crate::api::aggregator::ToolCallAggregator;
use crate::api::models::StreamChunk;
use crate::error::Result;
use crate::models::ToolCall;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{trace, warn};

pub const DONE_SENTINEL: &str = "[DONE]";

/// One fragment of a streamed tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    Text(String),
    ToolCall(ToolCallDelta),
    Done,
}

/// Incremental SSE decoder. Bytes after the last newline are held until the
/// next chunk completes the line, so multi-byte characters and events may
/// be split anywhere.
#[derive(Default)]
pub struct StreamDecoder {
    pending: Vec<u8>,
    malformed: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> Vec<StreamDelta> {
        let mut deltas = Vec::new();
        let scan_from = self.pending.len();
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending[scan_from..]
            .iter()
            .rposition(|b| *b == b'\n')
            .map(|pos| scan_from + pos)
        else {
            return deltas;
        };

        let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
        for line in complete.split(|b| *b == b'\n') {
            self.decode_line(line, &mut deltas);
        }
        deltas
    }

    /// Decodes whatever is left once the connection closes.
    pub fn finish(&mut self) -> Vec<StreamDelta> {
        let mut deltas = Vec::new();
        let rest = std::mem::take(&mut self.pending);
        self.decode_line(&rest, &mut deltas);
        deltas
    }

    /// Number of lines skipped because their payload was not valid JSON.
    pub fn malformed_lines(&self) -> usize {
        self.malformed
    }

    fn decode_line(&mut self, raw: &[u8], out: &mut Vec<StreamDelta>) {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();

        if line.is_empty() || line.starts_with(':') {
            return;
        }

        let Some(colon_pos) = line.find(':') else {
            trace!(line, "ignoring SSE line without field separator");
            return;
        };
        let field = line[..colon_pos].trim();
        let value = line[colon_pos + 1..].trim_start();

        match field {
            "data" => {
                if value == DONE_SENTINEL {
                    out.push(StreamDelta::Done);
                    return;
                }
                match serde_json::from_str::<StreamChunk>(value) {
                    Ok(chunk) => push_chunk_deltas(chunk, out),
                    Err(e) => {
                        self.malformed += 1;
                        warn!(error = %e, line, "skipping malformed stream event");
                    }
                }
            }
            "event" | "id" | "retry" => trace!(field, value, "SSE metadata"),
            _ => trace!(field, "unknown SSE field"),
        }
    }
}

fn push_chunk_deltas(chunk: StreamChunk, out: &mut Vec<StreamDelta>) {
    let Some(delta) = chunk
        .choices
        .and_then(|choices| choices.into_iter().next())
        .and_then(|choice| choice.delta)
    else {
        return;
    };

    if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
        out.push(StreamDelta::Text(content));
    }

    for fragment in delta.tool_calls.unwrap_or_default() {
        let (name, arguments) = match fragment.function {
            Some(function) => (function.name, function.arguments),
            None => (None, None),
        };
        out.push(StreamDelta::ToolCall(ToolCallDelta {
            index: fragment.index,
            id: fragment.id,
            name,
            arguments,
        }));
    }
}

/// Text and tool calls produced by one streamed round.
#[derive(Debug, Default)]
pub struct RoundOutput {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Reads one streamed response to its end, forwarding text as it arrives.
///
/// A stream that closes without the `[DONE]` sentinel still completes the
/// round; an error item from the stream aborts it.
pub async fn collect_round<S, F>(mut stream: S, mut on_text: F) -> Result<RoundOutput>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
    F: FnMut(&str),
{
    let mut decoder = StreamDecoder::new();
    let mut aggregator = ToolCallAggregator::new();
    let mut content = String::new();
    let mut done = false;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        for delta in decoder.decode(&chunk) {
            if apply_delta(delta, &mut content, &mut aggregator, &mut on_text) {
                done = true;
                break;
            }
        }
        if done {
            break;
        }
    }

    if !done {
        for delta in decoder.finish() {
            if apply_delta(delta, &mut content, &mut aggregator, &mut on_text) {
                break;
            }
        }
    }

    if decoder.malformed_lines() > 0 {
        warn!(skipped = decoder.malformed_lines(), "round finished with malformed events");
    }

    Ok(RoundOutput {
        content,
        tool_calls: aggregator.finalize(),
    })
}

/// Returns true once the done sentinel is seen.
fn apply_delta<F: FnMut(&str)>(
    delta: StreamDelta,
    content: &mut String,
    aggregator: &mut ToolCallAggregator,
    on_text: &mut F,
) -> bool {
    match delta {
        StreamDelta::Text(text) => {
            content.push_str(&text);
            on_text(&text);
            false
        }
        StreamDelta::ToolCall(fragment) => {
            aggregator.absorb(fragment);
            false
        }
        StreamDelta::Done => true,
    }
}
