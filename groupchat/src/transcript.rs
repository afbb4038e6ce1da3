//! Conversation transcript and turn records
//!
//! The transcript is the authoritative, append-only record of a run. Sequence
//! numbers start at 1 and grow by exactly one per appended message.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author name used for orchestrator-produced turns
pub const SYSTEM_AUTHOR: &str = "system";

/// Author name used for the requesting user
pub const USER_AUTHOR: &str = "user";

/// Who wrote a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Author {
    User,
    Agent(String),
    System,
}

impl Author {
    /// Create an agent author
    pub fn agent(name: impl Into<String>) -> Self {
        Self::Agent(name.into())
    }

    /// Name as shown in transcripts ("user", "system" or the agent name)
    pub fn name(&self) -> &str {
        match self {
            Self::User => USER_AUTHOR,
            Self::Agent(name) => name,
            Self::System => SYSTEM_AUTHOR,
        }
    }

    /// Whether this author is the named agent
    pub fn is_agent(&self, name: &str) -> bool {
        matches!(self, Self::Agent(n) if n == name)
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub author: Author,
    pub content: String,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a message with an explicit sequence number
    pub fn new(author: Author, content: impl Into<String>, sequence: u64) -> Self {
        Self {
            author,
            content: content.into(),
            sequence,
            created_at: Utc::now(),
        }
    }
}

/// Append-only ordered record of a conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Create an empty transcript
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transcript seeded with the user's request
    pub fn seeded(request: impl Into<String>) -> Self {
        let mut transcript = Self::new();
        transcript.append(Author::User, request);
        transcript
    }

    /// Append a message, assigning the next sequence number
    pub fn append(&mut self, author: Author, content: impl Into<String>) -> &Message {
        let sequence = self.next_sequence();
        self.messages.push(Message::new(author, content, sequence));
        &self.messages[self.messages.len() - 1]
    }

    /// Sequence number the next appended message will receive
    pub fn next_sequence(&self) -> u64 {
        self.messages.last().map_or(1, |m| m.sequence + 1)
    }

    /// Most recent message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// All messages in order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Render as "author: content" lines, the format used in decision prompts
    pub fn render(messages: &[Message]) -> String {
        messages
            .iter()
            .map(|m| format!("{}: {}", m.author, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One unit of run output: an agent's reply or an orchestrator notice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Agent name, or "system" for orchestrator entries
    pub agent: String,
    pub content: String,
    /// 1-based turn number within the run
    pub turn_index: usize,
    /// Transcript sequence of the appended message (None for system entries)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    #[serde(default)]
    pub is_error: bool,
}

impl TurnRecord {
    /// Record for a reply that was appended to the transcript
    pub fn reply(message: &Message, turn_index: usize) -> Self {
        Self {
            agent: message.author.name().to_string(),
            content: message.content.clone(),
            turn_index,
            sequence: Some(message.sequence),
            is_error: false,
        }
    }

    /// Record for a recovered capability failure
    pub fn failure(agent: &str, error: &impl fmt::Display, turn_index: usize) -> Self {
        Self {
            agent: SYSTEM_AUTHOR.to_string(),
            content: format!("Agent '{}' failed: {}", agent, error),
            turn_index,
            sequence: None,
            is_error: true,
        }
    }

    pub fn is_system(&self) -> bool {
        self.agent == SYSTEM_AUTHOR
    }
}
