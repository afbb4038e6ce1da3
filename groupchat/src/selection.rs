//! Selection strategies: who speaks next
//!
//! A selection strategy maps the current transcript to the name of the next
//! agent. Implementations hold no mutable state, so the same transcript always
//! yields the same decision for deterministic policies.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capability::Capability;
use crate::error::StrategyError;
use crate::transcript::{Message, Transcript};

/// Policy deciding which agent acts next
#[async_trait]
pub trait SelectionStrategy: Send + Sync {
    async fn select(&self, transcript: &Transcript) -> Result<String, StrategyError>;
}

// ============================================================================
// Routing
// ============================================================================

/// A single routing rule: after `after` speaks, hand over to `next`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    /// Author of the most recent message ("user" or an agent name)
    pub after: String,

    /// Agent to select
    pub next: String,

    /// Only match when the most recent message contains this text
    #[serde(default)]
    pub when_contains: Option<String>,
}

impl RouteRule {
    pub fn new(after: impl Into<String>, next: impl Into<String>) -> Self {
        Self {
            after: after.into(),
            next: next.into(),
            when_contains: None,
        }
    }

    /// Restrict the rule to messages containing `needle`
    pub fn when_contains(mut self, needle: impl Into<String>) -> Self {
        self.when_contains = Some(needle.into());
        self
    }

    fn matches(&self, last: &Message) -> bool {
        self.after == last.author.name()
            && self
                .when_contains
                .as_ref()
                .map_or(true, |needle| last.content.contains(needle.as_str()))
    }
}

/// Role-based routing keyed on the author of the latest message
///
/// Rules are checked in order and the first match wins. When nothing matches
/// (or the transcript is empty) the fallback agent is chosen, which keeps the
/// strategy total.
#[derive(Debug, Clone)]
pub struct RoutingSelection {
    rules: Vec<RouteRule>,
    fallback: String,
}

impl RoutingSelection {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            fallback: fallback.into(),
        }
    }

    /// Add a rule
    pub fn route(mut self, after: impl Into<String>, next: impl Into<String>) -> Self {
        self.rules.push(RouteRule::new(after, next));
        self
    }

    /// Add a fully specified rule
    pub fn with_rule(mut self, rule: RouteRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Every agent name this strategy can return
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.fallback.as_str()).chain(self.rules.iter().map(|r| r.next.as_str()))
    }

    fn decide(&self, transcript: &Transcript) -> &str {
        transcript
            .last()
            .and_then(|last| self.rules.iter().find(|rule| rule.matches(last)))
            .map_or(self.fallback.as_str(), |rule| rule.next.as_str())
    }
}

#[async_trait]
impl SelectionStrategy for RoutingSelection {
    async fn select(&self, transcript: &Transcript) -> Result<String, StrategyError> {
        Ok(self.decide(transcript).to_string())
    }
}

// ============================================================================
// Sequential
// ============================================================================

/// Round robin over a fixed agent order
///
/// The next agent is the one after the latest author; after the user, or an
/// author outside the order, the first agent speaks.
#[derive(Debug, Clone)]
pub struct SequentialSelection {
    order: Vec<String>,
}

impl SequentialSelection {
    pub fn new<I, S>(order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            order: order.into_iter().map(Into::into).collect(),
        }
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }
}

#[async_trait]
impl SelectionStrategy for SequentialSelection {
    async fn select(&self, transcript: &Transcript) -> Result<String, StrategyError> {
        let position = transcript
            .last()
            .and_then(|last| self.order.iter().position(|name| last.author.is_agent(name)));

        let next = match position {
            Some(i) => (i + 1) % self.order.len(),
            None => 0,
        };

        self.order
            .get(next)
            .cloned()
            .ok_or_else(|| StrategyError::Unrecognized("no agents to select from".to_string()))
    }
}

// ============================================================================
// Capability-backed
// ============================================================================

/// Default instructions for capability-backed selection
pub const DEFAULT_SELECTION_INSTRUCTIONS: &str = "You coordinate a group of agents. \
Given the conversation so far, decide which participant should speak next. \
Respond with only the name of the participant.";

/// Asks a capability which participant should speak next
pub struct CapabilitySelection {
    capability: Arc<dyn Capability>,
    candidates: Vec<String>,
    instructions: String,
    history_window: Option<usize>,
}

impl CapabilitySelection {
    pub fn new<I, S>(capability: Arc<dyn Capability>, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            capability,
            candidates: candidates.into_iter().map(Into::into).collect(),
            instructions: DEFAULT_SELECTION_INSTRUCTIONS.to_string(),
            history_window: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Only show the last `window` messages to the deciding capability
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = Some(window);
        self
    }

    fn prompt(&self) -> String {
        format!(
            "{}\n\nParticipants:\n{}",
            self.instructions,
            self.candidates
                .iter()
                .map(|name| format!("- {}", name))
                .collect::<Vec<_>>()
                .join("\n")
        )
    }

    /// Match a free-text reply against the candidate names
    fn parse(&self, reply: &str) -> Option<&str> {
        let cleaned = reply
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c == '*');

        if let Some(exact) = self.candidates.iter().find(|name| name.as_str() == cleaned) {
            return Some(exact);
        }
        if let Some(folded) = self
            .candidates
            .iter()
            .find(|name| name.eq_ignore_ascii_case(cleaned))
        {
            return Some(folded);
        }

        // Whole-word mentions; a longer name wins over one it contains
        let reply_words = words(cleaned);
        let mentions: Vec<(&str, (usize, usize))> = self
            .candidates
            .iter()
            .flat_map(|name| {
                word_spans(&reply_words, &words(name))
                    .into_iter()
                    .map(move |span| (name.as_str(), span))
            })
            .collect();

        let mut named: Vec<&str> = mentions
            .iter()
            .filter(|&&(name, (start, end))| {
                !mentions.iter().any(|&(other, (o_start, o_end))| {
                    other != name && o_start <= start && end <= o_end && o_end - o_start > end - start
                })
            })
            .map(|&(name, _)| name)
            .collect();
        named.sort_unstable();
        named.dedup();

        match named.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}

/// Lowercased alphanumeric words of `text`
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Positions where `needle` occurs as consecutive words of `haystack`
fn word_spans(haystack: &[String], needle: &[String]) -> Vec<(usize, usize)> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return Vec::new();
    }
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, window)| *window == needle)
        .map(|(start, _)| (start, start + needle.len()))
        .collect()
}

#[async_trait]
impl SelectionStrategy for CapabilitySelection {
    async fn select(&self, transcript: &Transcript) -> Result<String, StrategyError> {
        let messages = transcript.messages();
        let view = match self.history_window {
            Some(window) => &messages[messages.len().saturating_sub(window)..],
            None => messages,
        };

        let reply = self.capability.generate(&self.prompt(), view).await?;
        self.parse(&reply)
            .map(str::to_string)
            .ok_or(StrategyError::Unrecognized(reply))
    }
}

// ============================================================================
// Tests
// ============================================================================
