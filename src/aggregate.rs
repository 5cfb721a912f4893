//! Stream aggregation
//!
//! Drives one forward pass over a provider event stream:
//! - content deltas are appended to the response text and handed to the sink
//!   immediately, in arrival order
//! - usage reports overwrite the stored usage (last one wins)
//! - everything else is inert
//!
//! When the stream ends without any usage report, usage is estimated locally
//! from the system text, the prompt and the accumulated response.
//!
//! A transport failure surfaces as [`Error::TransportFailure`] carrying the
//! partial text. If the caller stops consuming, the event source is dropped
//! and [`Error::Cancelled`] is returned instead of an under-counted report.

use crate::error::{Error, Result, TransportError};
use crate::estimate::{EstimationPolicy, SharedEstimator};
use crate::events::{Event, Fragment, ResponseMetadata};
use crate::usage::{FinalUsage, UsageReport};
use futures::{Stream, StreamExt};
use std::ops::ControlFlow;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The request text that estimation falls back on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptText {
    pub system: String,
    pub prompt: String,
}

impl PromptText {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
        }
    }
}

/// Receives fragments as they arrive.
///
/// Returning `Break` means the caller stopped consuming; the run is cancelled.
pub trait FragmentSink {
    fn on_fragment(&mut self, text: &str) -> ControlFlow<()>;

    fn on_reasoning(&mut self, _text: &str) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

impl<F> FragmentSink for F
where
    F: FnMut(&str) -> ControlFlow<()>,
{
    fn on_fragment(&mut self, text: &str) -> ControlFlow<()> {
        self(text)
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl FragmentSink for Discard {
    fn on_fragment(&mut self, _text: &str) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Sink forwarding fragments into a channel; a closed receiver breaks the run
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Fragment>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Fragment>) -> Self {
        Self { tx }
    }

    fn send(&self, fragment: Fragment) -> ControlFlow<()> {
        match self.tx.send(fragment) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        }
    }
}

impl FragmentSink for ChannelSink {
    fn on_fragment(&mut self, text: &str) -> ControlFlow<()> {
        self.send(Fragment::Content(text.to_string()))
    }

    fn on_reasoning(&mut self, text: &str) -> ControlFlow<()> {
        self.send(Fragment::Reasoning(text.to_string()))
    }
}

/// Finalized result of one stream
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Concatenation of every content delta, in arrival order
    pub text: String,
    /// Concatenation of every reasoning delta
    pub reasoning: String,
    pub usage: FinalUsage,
    pub metadata: ResponseMetadata,
    /// Number of content deltas received
    pub fragments: usize,
}

/// What the driver should do after applying an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Emit(Fragment),
    Continue,
    Finished,
}

/// Per-run accumulator.
///
/// Owned by exactly one aggregation run.
#[derive(Debug, Default)]
pub struct Accumulator {
    full_text: String,
    reasoning_text: String,
    observed_usage: Option<UsageReport>,
    metadata: ResponseMetadata,
    fragments: usize,
    ignored: usize,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: Event) -> Step {
        match event {
            Event::ContentDelta { text } => {
                self.full_text.push_str(&text);
                self.fragments += 1;
                Step::Emit(Fragment::Content(text))
            }
            Event::ReasoningDelta { text } => {
                self.reasoning_text.push_str(&text);
                Step::Emit(Fragment::Reasoning(text))
            }
            Event::UsageReport(usage) => {
                if let Some(previous) = self.observed_usage.replace(usage) {
                    tracing::trace!(?previous, ?usage, "Usage report superseded");
                }
                Step::Continue
            }
            Event::Metadata(meta) => {
                self.metadata.merge(meta);
                Step::Continue
            }
            Event::Completed => Step::Finished,
            Event::Other => {
                self.ignored += 1;
                Step::Continue
            }
        }
    }

    pub fn partial_text(&self) -> &str {
        &self.full_text
    }

    pub fn observed_usage(&self) -> Option<&UsageReport> {
        self.observed_usage.as_ref()
    }

    pub fn into_partial_text(self) -> String {
        self.full_text
    }

    fn fail(self, source: TransportError) -> Error {
        tracing::debug!(
            fragments = self.fragments,
            partial_chars = self.full_text.chars().count(),
            error = %source,
            "Stream failed"
        );
        Error::TransportFailure {
            partial_text: self.full_text,
            source,
        }
    }

    fn cancel(self) -> Error {
        tracing::debug!(fragments = self.fragments, "Stream cancelled by consumer");
        Error::Cancelled {
            partial_text: self.full_text,
        }
    }

    /// Finalize the run, estimating usage when none was observed
    pub fn finish<E>(self, estimator: &E, text: &PromptText) -> Completion
    where
        E: EstimationPolicy + ?Sized,
    {
        let usage = match self.observed_usage {
            Some(report) => FinalUsage::reported(report),
            None => {
                let prompt = estimator
                    .estimate(&text.system)
                    .saturating_add(estimator.estimate(&text.prompt));
                let completion = estimator.estimate(&self.full_text);
                FinalUsage::estimated(UsageReport::from_counts(prompt, completion))
            }
        };

        tracing::debug!(
            fragments = self.fragments,
            ignored = self.ignored,
            chars = self.full_text.chars().count(),
            input_tokens = usage.report.prompt_tokens,
            output_tokens = usage.report.completion_tokens,
            usage_source = usage.source.as_str(),
            "Stream aggregated"
        );

        Completion {
            text: self.full_text,
            reasoning: self.reasoning_text,
            usage,
            metadata: self.metadata,
            fragments: self.fragments,
        }
    }
}

fn deliver<K>(sink: &mut K, fragment: &Fragment) -> ControlFlow<()>
where
    K: FragmentSink + ?Sized,
{
    match fragment {
        Fragment::Content(text) => sink.on_fragment(text),
        Fragment::Reasoning(text) => sink.on_reasoning(text),
    }
}

enum Pull {
    Item(Option<Result<Event, TransportError>>),
    Cancelled,
}

/// Aggregate an async event stream.
///
/// Fragments reach `sink` in arrival order. The cancellation token, a `Break`
/// from the sink, or a provider `Completed` event all stop pulling from
/// `events`, which is dropped before this returns.
pub async fn aggregate<S, E, K>(
    mut events: S,
    estimator: &E,
    text: &PromptText,
    sink: &mut K,
    cancellation: Option<CancellationToken>,
) -> Result<Completion>
where
    S: Stream<Item = Result<Event, TransportError>> + Unpin,
    E: EstimationPolicy + ?Sized,
    K: FragmentSink + ?Sized,
{
    let mut acc = Accumulator::new();

    loop {
        let pull = match cancellation {
            Some(ref token) => tokio::select! {
                biased;
                _ = token.cancelled() => Pull::Cancelled,
                item = events.next() => Pull::Item(item),
            },
            None => Pull::Item(events.next().await),
        };

        let event = match pull {
            Pull::Cancelled => {
                // Dropping the source closes the underlying connection
                drop(events);
                return Err(acc.cancel());
            }
            Pull::Item(None) => break,
            Pull::Item(Some(Err(e))) => {
                drop(events);
                return Err(acc.fail(e));
            }
            Pull::Item(Some(Ok(event))) => event,
        };

        match acc.apply(event) {
            Step::Emit(fragment) => {
                if deliver(sink, &fragment).is_break() {
                    drop(events);
                    return Err(acc.cancel());
                }
            }
            Step::Continue => {}
            Step::Finished => break,
        }
    }

    drop(events);
    Ok(acc.finish(estimator, text))
}

/// Aggregate a synchronous event sequence
pub fn aggregate_iter<I, E, K>(
    events: I,
    estimator: &E,
    text: &PromptText,
    sink: &mut K,
) -> Result<Completion>
where
    I: IntoIterator<Item = Result<Event, TransportError>>,
    E: EstimationPolicy + ?Sized,
    K: FragmentSink + ?Sized,
{
    let mut acc = Accumulator::new();

    for item in events {
        let event = match item {
            Ok(event) => event,
            Err(e) => return Err(acc.fail(e)),
        };
        match acc.apply(event) {
            Step::Emit(fragment) => {
                if deliver(sink, &fragment).is_break() {
                    return Err(acc.cancel());
                }
            }
            Step::Continue => {}
            Step::Finished => break,
        }
    }

    Ok(acc.finish(estimator, text))
}

/// Run [`aggregate`] on a tokio task.
///
/// Fragments are delivered through the returned receiver. Dropping it cancels
/// the run, even while the source is stalled.
pub fn spawn_aggregation<S>(
    events: S,
    estimator: SharedEstimator,
    text: PromptText,
    cancellation: Option<CancellationToken>,
) -> (mpsc::UnboundedReceiver<Fragment>, JoinHandle<Result<Completion>>)
where
    S: Stream<Item = Result<Event, TransportError>> + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        let token = cancellation
            .map(|parent| parent.child_token())
            .unwrap_or_default();
        let watch = tx.clone();
        let mut sink = ChannelSink::new(tx);

        let run = aggregate(events, &*estimator, &text, &mut sink, Some(token.clone()));
        tokio::pin!(run);

        tokio::select! {
            biased;
            result = &mut run => result,
            _ = watch.closed() => {
                // Receiver gone: stop the run so the source is released
                token.cancel();
                run.await
            }
        }
    });
    (rx, handle)
}
