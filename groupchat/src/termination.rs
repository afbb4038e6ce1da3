//! Termination strategies: when is the work done
//!
//! Checked once after every appended agent turn. Only the most recent message
//! is considered by the approval policy; earlier approvals do not count.

use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::Capability;
use crate::error::StrategyError;
use crate::transcript::Transcript;

/// Token the reference approval policy looks for
pub const DEFAULT_APPROVAL_TOKEN: &str = "%APPR%";

/// Policy deciding whether a conversation is complete
#[async_trait]
pub trait TerminationStrategy: Send + Sync {
    async fn is_done(&self, transcript: &Transcript) -> Result<bool, StrategyError>;
}

/// Done when the latest message contains an approval token
#[derive(Debug, Clone)]
pub struct ApprovalTermination {
    token: String,
    /// Authors allowed to approve (empty = anyone)
    agents: Vec<String>,
}

impl ApprovalTermination {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            agents: Vec::new(),
        }
    }

    /// Only accept approvals written by these agents
    pub fn with_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.agents = agents.into_iter().map(Into::into).collect();
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn approves(&self, transcript: &Transcript) -> bool {
        let Some(last) = transcript.last() else {
            return false;
        };
        let author_allowed =
            self.agents.is_empty() || self.agents.iter().any(|a| last.author.is_agent(a));
        author_allowed && last.content.contains(self.token.as_str())
    }
}

impl Default for ApprovalTermination {
    fn default() -> Self {
        Self::new(DEFAULT_APPROVAL_TOKEN)
    }
}

#[async_trait]
impl TerminationStrategy for ApprovalTermination {
    async fn is_done(&self, transcript: &Transcript) -> Result<bool, StrategyError> {
        Ok(self.approves(transcript))
    }
}

/// Default instructions for capability-backed termination
pub const DEFAULT_TERMINATION_INSTRUCTIONS: &str = "Determine whether the work in the \
conversation below has been approved. If it has, respond with a single word: yes. \
Otherwise respond with: no.";

/// Asks a capability whether the conversation is complete
///
/// Capability failures are returned as errors, never read as "done".
pub struct CapabilityTermination {
    capability: Arc<dyn Capability>,
    instructions: String,
    result_token: String,
    history_window: Option<usize>,
}

impl CapabilityTermination {
    pub fn new(capability: Arc<dyn Capability>) -> Self {
        Self {
            capability,
            instructions: DEFAULT_TERMINATION_INSTRUCTIONS.to_string(),
            result_token: "yes".to_string(),
            history_window: Some(1),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Reply text that signals completion (matched case-insensitively)
    pub fn with_result_token(mut self, token: impl Into<String>) -> Self {
        self.result_token = token.into();
        self
    }

    /// Number of trailing messages shown to the capability (None = all)
    pub fn with_history_window(mut self, window: Option<usize>) -> Self {
        self.history_window = window;
        self
    }
}

#[async_trait]
impl TerminationStrategy for CapabilityTermination {
    async fn is_done(&self, transcript: &Transcript) -> Result<bool, StrategyError> {
        if transcript.is_empty() {
            return Ok(false);
        }

        let messages = transcript.messages();
        let view = match self.history_window {
            Some(window) => &messages[messages.len().saturating_sub(window)..],
            None => messages,
        };

        let reply = self.capability.generate(&self.instructions, view).await?;
        Ok(reply
            .to_lowercase()
            .contains(&self.result_token.to_lowercase()))
    }
}
