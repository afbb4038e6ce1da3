//! History reduction
//!
//! Bounds the view of the transcript handed to a capability. The transcript
//! itself is never touched; reducers only compute a per-call view.

use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::Capability;
use crate::transcript::{Author, Message};

/// Instructions given to the summarizer capability
pub const DEFAULT_SUMMARY_INSTRUCTIONS: &str = "Summarize the conversation below. \
Keep every requirement, decision and open issue. Reply with the summary only.";

/// A bounded, ordered view of a transcript
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedView {
    pub messages: Vec<Message>,
    /// Number of transcript messages left out of the view
    pub dropped: usize,
    /// Whether the view starts with a synthesized summary
    pub summarized: bool,
}

impl ReducedView {
    /// View containing every message unchanged
    pub fn full(messages: &[Message]) -> Self {
        Self {
            messages: messages.to_vec(),
            dropped: 0,
            summarized: false,
        }
    }

    /// View keeping the last `keep` messages
    pub fn truncated(messages: &[Message], keep: usize) -> Self {
        let start = messages.len().saturating_sub(keep);
        Self {
            messages: messages[start..].to_vec(),
            dropped: start,
            summarized: false,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Policy that bounds transcript views
///
/// Reduction must never fail: a reducer that depends on a capability falls
/// back to truncation when that capability errors.
#[async_trait]
pub trait HistoryReducer: Send + Sync {
    async fn reduce(&self, messages: &[Message], target_count: usize) -> ReducedView;
}

/// Keeps only the most recent messages
#[derive(Debug, Clone, Default)]
pub struct TruncationReducer {
    /// Extra messages tolerated above the target before reduction fires
    threshold: usize,
}

impl TruncationReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }
}

#[async_trait]
impl HistoryReducer for TruncationReducer {
    async fn reduce(&self, messages: &[Message], target_count: usize) -> ReducedView {
        if messages.len() <= target_count.saturating_add(self.threshold) {
            return ReducedView::full(messages);
        }
        ReducedView::truncated(messages, target_count)
    }
}

/// Most dropped messages handed to the summarizer by default
pub const DEFAULT_SUMMARY_INPUT_WINDOW: usize = 32;

/// Keeps the most recent messages and prepends a summary of the rest
///
/// The summarizer sees at most `input_window` of the dropped messages, the
/// ones just before the kept tail, so its input stays bounded on long runs.
pub struct SummarizationReducer {
    summarizer: Arc<dyn Capability>,
    instructions: String,
    threshold: usize,
    input_window: usize,
}

impl SummarizationReducer {
    pub fn new(summarizer: Arc<dyn Capability>) -> Self {
        Self {
            summarizer,
            instructions: DEFAULT_SUMMARY_INSTRUCTIONS.to_string(),
            threshold: 0,
            input_window: DEFAULT_SUMMARY_INPUT_WINDOW,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Cap the number of dropped messages passed to the summarizer (minimum 1)
    pub fn with_input_window(mut self, window: usize) -> Self {
        self.input_window = window.max(1);
        self
    }
}

#[async_trait]
impl HistoryReducer for SummarizationReducer {
    async fn reduce(&self, messages: &[Message], target_count: usize) -> ReducedView {
        if messages.len() <= target_count.saturating_add(self.threshold) {
            return ReducedView::full(messages);
        }

        let truncated = ReducedView::truncated(messages, target_count);
        let dropped = &messages[..truncated.dropped];
        let Some(last_dropped) = dropped.last() else {
            return truncated;
        };

        let input = &dropped[dropped.len().saturating_sub(self.input_window)..];
        match self.summarizer.generate(&self.instructions, input).await {
            Ok(summary) => {
                tracing::debug!(
                    dropped = dropped.len(),
                    summarized = input.len(),
                    "Summarized dropped history"
                );
                let mut kept = Vec::with_capacity(truncated.messages.len() + 1);
                kept.push(Message::new(Author::System, summary, last_dropped.sequence));
                kept.extend(truncated.messages);
                ReducedView {
                    messages: kept,
                    dropped: truncated.dropped,
                    summarized: true,
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Summarization failed ({}), truncating to last {} messages",
                    e,
                    target_count
                );
                truncated
            }
        }
    }
}
