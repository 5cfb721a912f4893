//! Chat-completions chunk decoding
//!
//! Handles the OpenAI-compatible `chat.completion.chunk` payloads spoken by
//! DeepSeek, Moonshot, Qwen, GLM, Doubao, Gemini's compatibility layer and
//! Grok. Parsed with our own types so `reasoning_content` survives.

use super::sse::SseFrame;
use super::Decoded;
use crate::error::{Error, Result};
use crate::events::{Event, ResponseMetadata};
use crate::usage::UsageReport;
use chrono::DateTime;

#[derive(Debug, serde::Deserialize)]
struct StreamChunkDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct StreamChoice {
    delta: Option<StreamChunkDelta>,
}

#[derive(Debug, serde::Deserialize)]
struct StreamUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    total_tokens: Option<u64>,
}

#[derive(Debug, serde::Deserialize)]
struct StreamChunk {
    id: Option<String>,
    model: Option<String>,
    created: Option<i64>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<StreamUsage>,
}

impl StreamChunk {
    fn into_events(self) -> Vec<Event> {
        let mut events = Vec::new();

        let metadata = ResponseMetadata {
            id: self.id.filter(|id| !id.is_empty()),
            model: self.model.filter(|m| !m.is_empty()),
            created: self.created.and_then(|secs| DateTime::from_timestamp(secs, 0)),
        };
        if !metadata.is_empty() {
            events.push(Event::Metadata(metadata));
        }

        for delta in self.choices.into_iter().filter_map(|c| c.delta) {
            if let Some(reasoning) = delta.reasoning_content.filter(|r| !r.is_empty()) {
                events.push(Event::ReasoningDelta { text: reasoning });
            }
            if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                events.push(Event::ContentDelta { text: content });
            }
        }

        // Usage goes last so a chunk carrying both keeps content first
        if let Some(usage) = self.usage {
            let report = match usage.total_tokens {
                Some(total) => UsageReport::new(usage.prompt_tokens, usage.completion_tokens, total),
                None => UsageReport::from_counts(usage.prompt_tokens, usage.completion_tokens),
            };
            events.push(Event::UsageReport(report));
        }

        events
    }
}

/// Decode one SSE frame of a chat-completions stream
pub(crate) fn decode_frame(frame: &SseFrame) -> Result<Decoded> {
    let data = frame.data.trim();
    if data.is_empty() {
        return Ok(Decoded::Events(Vec::new()));
    }
    if data == "[DONE]" {
        return Ok(Decoded::Events(vec![Event::Completed]));
    }

    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| Error::malformed(format!("invalid JSON: {}", e)))?;

    // Some vendors send `"error": null` on healthy chunks
    if let Some(err) = value.get("error").filter(|e| !e.is_null()) {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| err.to_string());
        return Ok(Decoded::ProviderError(message));
    }

    let chunk: StreamChunk = serde_json::from_value(value)
        .map_err(|e| Error::malformed(format!("unexpected chunk shape: {}", e)))?;
    Ok(Decoded::Events(chunk.into_events()))
}
