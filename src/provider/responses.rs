//! OpenAI Responses API event decoding

use super::sse::SseFrame;
use super::Decoded;
use crate::error::{Error, Result};
use crate::events::{Event, ResponseMetadata};
use crate::usage::UsageReport;
use chrono::DateTime;

#[derive(Debug, serde::Deserialize)]
struct ResponsesUsage {
    input_tokens: u64,
    output_tokens: u64,
    total_tokens: Option<u64>,
}

#[derive(Debug, serde::Deserialize)]
struct ResponsesError {
    message: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ResponseBody {
    id: Option<String>,
    created_at: Option<i64>,
    model: Option<String>,
    usage: Option<ResponsesUsage>,
    error: Option<ResponsesError>,
}

impl ResponseBody {
    fn metadata(&self) -> Event {
        Event::Metadata(ResponseMetadata {
            id: self.id.clone(),
            model: self.model.clone(),
            created: self.created_at.and_then(|secs| DateTime::from_timestamp(secs, 0)),
        })
    }

    fn usage(&self) -> Option<Event> {
        self.usage.as_ref().map(|usage| {
            let report = match usage.total_tokens {
                Some(total) => UsageReport::new(usage.input_tokens, usage.output_tokens, total),
                None => UsageReport::from_counts(usage.input_tokens, usage.output_tokens),
            };
            Event::UsageReport(report)
        })
    }

    /// Events for a terminal response object
    fn finish(self) -> Vec<Event> {
        let mut events = vec![self.metadata()];
        events.extend(self.usage());
        events.push(Event::Completed);
        events
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type")]
enum ResponsesEvent {
    #[serde(rename = "response.created")]
    Created { response: ResponseBody },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },
    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryDelta { delta: String },
    #[serde(rename = "response.completed")]
    Completed { response: ResponseBody },
    /// Stopped early (e.g. `max_output_tokens`); still carries usage
    #[serde(rename = "response.incomplete")]
    Incomplete { response: ResponseBody },
    #[serde(rename = "response.failed")]
    Failed { response: ResponseBody },
    #[serde(rename = "error")]
    Error { message: Option<String> },
    #[serde(other)]
    Other,
}

/// Decode one SSE frame of a Responses API stream
pub(crate) fn decode_frame(frame: &SseFrame) -> Result<Decoded> {
    let data = frame.data.trim();
    if data.is_empty() {
        return Ok(Decoded::Events(Vec::new()));
    }
    if data == "[DONE]" {
        return Ok(Decoded::Events(vec![Event::Completed]));
    }

    let event: ResponsesEvent =
        serde_json::from_str(data).map_err(|e| Error::malformed(format!("invalid event: {}", e)))?;

    let decoded = match event {
        ResponsesEvent::Created { response } => Decoded::Events(vec![response.metadata()]),
        ResponsesEvent::OutputTextDelta { delta } if !delta.is_empty() => {
            Decoded::Events(vec![Event::ContentDelta { text: delta }])
        }
        ResponsesEvent::ReasoningSummaryDelta { delta } if !delta.is_empty() => {
            Decoded::Events(vec![Event::ReasoningDelta { text: delta }])
        }
        ResponsesEvent::OutputTextDelta { .. } | ResponsesEvent::ReasoningSummaryDelta { .. } => {
            Decoded::Events(Vec::new())
        }
        ResponsesEvent::Completed { response } | ResponsesEvent::Incomplete { response } => {
            Decoded::Events(response.finish())
        }
        ResponsesEvent::Failed { response } => Decoded::ProviderError(
            response
                .error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "response failed".to_string()),
        ),
        ResponsesEvent::Error { message } => {
            Decoded::ProviderError(message.unwrap_or_else(|| "unknown error".to_string()))
        }
        ResponsesEvent::Other => Decoded::Events(vec![Event::Other]),
    };
    Ok(decoded)
}
