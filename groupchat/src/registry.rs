//! Agent configuration and registry
//!
//! Defines the participating agents of a group chat: a unique name, a persona
//! and the capability used to produce replies. The registry is read-only once
//! a group chat has been built and may be shared across concurrent runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability::Capability;
use crate::error::{CapabilityError, GroupChatError};
use crate::transcript::Message;

/// Configuration for a participating agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique identifier for this agent
    pub name: String,

    /// Display name for UI/logging
    #[serde(default)]
    pub display_name: String,

    /// Instructions defining agent behavior
    #[serde(default)]
    pub persona: String,

    /// Model override (falls back to the configured default model)
    #[serde(default)]
    pub model: Option<String>,

    /// Temperature for LLM sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.7
}

impl AgentConfig {
    /// Create a new agent configuration
    pub fn new(name: impl Into<String>, persona: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            persona: persona.into(),
            model: None,
            temperature: default_temperature(),
        }
    }

    /// Set the display name
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Display name, falling back to the agent name
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

/// A participating agent: configuration plus its reply capability
#[derive(Clone)]
pub struct Agent {
    config: AgentConfig,
    capability: Arc<dyn Capability>,
}

impl Agent {
    pub fn new(config: AgentConfig, capability: Arc<dyn Capability>) -> Self {
        Self { config, capability }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn persona(&self) -> &str {
        &self.config.persona
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Generate a reply for the given view
    pub async fn generate(&self, view: &[Message]) -> Result<String, CapabilityError> {
        self.capability.generate(&self.config.persona, view).await
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Registry of participating agents, in registration order
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<Agent>,
    index: HashMap<String, usize>,
}

impl AgentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new agent
    pub fn register(&mut self, agent: Agent) -> Result<(), GroupChatError> {
        if self.index.contains_key(agent.name()) {
            return Err(GroupChatError::DuplicateAgent(agent.name().to_string()));
        }
        self.index.insert(agent.name().to_string(), self.agents.len());
        self.agents.push(agent);
        Ok(())
    }

    /// Builder-style registration
    pub fn with_agent(mut self, agent: Agent) -> Result<Self, GroupChatError> {
        self.register(agent)?;
        Ok(self)
    }

    /// Look up an agent by name
    pub fn resolve(&self, name: &str) -> Result<&Agent, GroupChatError> {
        self.index
            .get(name)
            .map(|&i| &self.agents[i])
            .ok_or_else(|| GroupChatError::UnknownAgent(name.to_string()))
    }

    /// Check if an agent exists
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Agent names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(|a| a.name())
    }

    /// Iterate over all agents in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Invoke an agent's capability, optionally bounded by a timeout
    ///
    /// The registry never retries; a timeout is reported as
    /// `CapabilityError::Timeout`.
    pub async fn invoke(
        &self,
        agent: &Agent,
        view: &[Message],
        timeout: Option<Duration>,
    ) -> Result<String, CapabilityError> {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, agent.generate(view)).await {
                Ok(result) => result,
                Err(_) => Err(CapabilityError::Timeout(limit)),
            },
            None => agent.generate(view).await,
        }
    }
}
