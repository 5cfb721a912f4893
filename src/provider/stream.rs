//! Byte stream → event stream

use super::config::WireApi;
use super::sse::{SseDecoder, SseFrame};
use super::{chat, responses, Decoded};
use crate::error::TransportError;
use crate::events::{Event, EventStream};
use futures::{Stream, StreamExt};
use std::collections::VecDeque;

struct DecodeState<B> {
    bytes: B,
    decoder: SseDecoder,
    wire: WireApi,
    pending: VecDeque<Result<Event, TransportError>>,
    finished: bool,
}

impl<B> DecodeState<B> {
    fn decode(&mut self, frame: SseFrame) {
        let decoded = match self.wire {
            WireApi::ChatCompletions => chat::decode_frame(&frame),
            WireApi::Responses => responses::decode_frame(&frame),
        };

        match decoded {
            Ok(Decoded::Events(events)) => self.pending.extend(events.into_iter().map(Ok)),
            Ok(Decoded::ProviderError(message)) => {
                self.pending.push_back(Err(TransportError::Provider(message)));
                self.finished = true;
            }
            Err(e) => {
                tracing::debug!(
                    target: "llm",
                    error = %e,
                    event = frame.event.as_deref().unwrap_or(""),
                    data = %frame.data,
                    "Ignoring malformed stream event"
                );
                self.pending.push_back(Ok(Event::Other));
            }
        }
    }
}

/// Turn an SSE response body into provider events.
///
/// Events keep arrival order. A read error or a provider error payload ends
/// the stream after everything decoded before it has been yielded.
pub fn decode_byte_stream<B, C, E>(bytes: B, wire: WireApi) -> EventStream
where
    B: Stream<Item = Result<C, E>> + Unpin + Send + 'static,
    C: AsRef<[u8]> + Send + 'static,
    E: Into<TransportError> + Send + 'static,
{
    let state = DecodeState {
        bytes,
        decoder: SseDecoder::new(),
        wire,
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for frame in state.decoder.push(chunk.as_ref()) {
                        // Nothing is decoded past a provider error
                        if state.finished {
                            break;
                        }
                        state.decode(frame);
                    }
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(e.into()));
                    state.finished = true;
                }
                None => {
                    for frame in state.decoder.finish() {
                        if state.finished {
                            break;
                        }
                        state.decode(frame);
                    }
                    state.finished = true;
                }
            }
        }
    }))
}
