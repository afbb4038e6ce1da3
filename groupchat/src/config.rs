//! Configuration loading
//!
//! A group chat is described by `.groupchat.toml`: the LLM endpoint, run
//! limits, the participating agents and which policy variants to use.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability::Capability;
use crate::engine::{GroupChat, RunConfig};
use crate::error::GroupChatError;
use crate::reducer::{HistoryReducer, SummarizationReducer, TruncationReducer};
use crate::registry::{Agent, AgentConfig, AgentRegistry};
use crate::selection::{
    CapabilitySelection, RouteRule, RoutingSelection, SelectionStrategy, SequentialSelection,
};
use crate::termination::{
    ApprovalTermination, CapabilityTermination, TerminationStrategy, DEFAULT_APPROVAL_TOKEN,
};

/// File name searched for by [`GroupChatFileConfig::load`]
pub const CONFIG_FILE_NAME: &str = ".groupchat.toml";

/// Find a config file by walking up the directory tree, then checking global config.
///
/// Search order:
/// 1. Current directory and parent directories (walking up to root)
/// 2. Global config at ~/.config/groupchat/
fn find_config_file(filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(found) = find_upwards(&cwd, filename) {
            return Some(found);
        }
    }

    let global_path = dirs::config_dir()?.join("groupchat").join(filename);
    global_path.exists().then_some(global_path)
}

fn find_upwards(start: &Path, filename: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(filename))
        .find(|candidate| candidate.exists())
}

// ============================================================================
// Sections
// ============================================================================

/// LLM configuration section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
}

/// Run limits section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunSection {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_target_history_count")]
    pub target_history_count: usize,
    #[serde(default = "default_approval_token")]
    pub approval_token: String,
    /// Per-call capability timeout; `0` turns it off
    #[serde(default = "default_capability_timeout_secs")]
    pub capability_timeout_secs: Option<u64>,
}

/// Which selection strategy to use
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionConfig {
    /// Round robin (empty order = registration order)
    Sequential {
        #[serde(default)]
        order: Vec<String>,
    },
    /// Role-based routing on the latest author
    Routing {
        fallback: String,
        #[serde(default)]
        rules: Vec<RouteRule>,
    },
    /// Ask a model who speaks next
    Capability {
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        instructions: Option<String>,
        #[serde(default)]
        history_window: Option<usize>,
    },
}

/// Which termination strategy to use
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminationConfig {
    /// Approval token in the latest message (token defaults to `run.approval_token`)
    Approval {
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        agents: Vec<String>,
    },
    /// Ask a model whether the work is approved
    Capability {
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        instructions: Option<String>,
        #[serde(default)]
        result_token: Option<String>,
        #[serde(default)]
        history_window: Option<usize>,
    },
}

/// Which history reducer to use
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReducerConfig {
    Truncation {
        #[serde(default)]
        threshold: usize,
    },
    Summarization {
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        instructions: Option<String>,
        #[serde(default)]
        threshold: usize,
        /// Most dropped messages passed to the summarizer
        #[serde(default)]
        input_window: Option<usize>,
    },
}

// Default value functions
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "qwen3:14b".to_string()
}

fn default_max_turns() -> usize {
    25
}

fn default_target_history_count() -> usize {
    6
}

fn default_capability_timeout_secs() -> Option<u64> {
    Some(120)
}

fn default_approval_token() -> String {
    DEFAULT_APPROVAL_TOKEN.to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_model(),
        }
    }
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            target_history_count: default_target_history_count(),
            approval_token: default_approval_token(),
            capability_timeout_secs: default_capability_timeout_secs(),
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self::Sequential { order: Vec::new() }
    }
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self::Approval {
            token: None,
            agents: Vec::new(),
        }
    }
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self::Truncation { threshold: 0 }
    }
}

// ============================================================================
// Group Chat Configuration (.groupchat.toml)
// ============================================================================

/// Top-level group chat configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GroupChatFileConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub termination: TerminationConfig,
    #[serde(default)]
    pub reducer: ReducerConfig,
}

impl GroupChatFileConfig {
    /// Load config from `.groupchat.toml`, falling back to defaults
    pub fn load() -> Result<Self, GroupChatError> {
        if let Some(config_path) = find_config_file(CONFIG_FILE_NAME) {
            tracing::debug!("Loading group chat config from: {}", config_path.display());
            return Self::load_from_path(&config_path);
        }

        tracing::debug!("No {} found, using defaults", CONFIG_FILE_NAME);
        Ok(Self::default())
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, GroupChatError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GroupChatError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parse from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, GroupChatError> {
        toml::from_str(toml_str).map_err(|e| GroupChatError::Config(e.to_string()))
    }

    /// Run limits described by the `[run]` section
    pub fn run_config(&self) -> RunConfig {
        let mut config = RunConfig::new(self.run.max_turns, self.run.target_history_count)
            .with_approval_token(self.run.approval_token.clone());
        if let Some(secs) = self.run.capability_timeout_secs.filter(|secs| *secs > 0) {
            config = config.with_capability_timeout(Duration::from_secs(secs));
        }
        config
    }

    /// Assemble a group chat, creating capabilities with `make_capability`
    ///
    /// `make_capability` receives the model name and optional temperature.
    pub fn build<F>(&self, make_capability: F) -> Result<GroupChat, GroupChatError>
    where
        F: Fn(&str, Option<f32>) -> Arc<dyn Capability>,
    {
        let mut registry = AgentRegistry::new();
        for agent in &self.agents {
            let model = agent.model.as_deref().unwrap_or(&self.llm.model);
            let capability = make_capability(model, Some(agent.temperature));
            registry.register(Agent::new(agent.clone(), capability))?;
        }

        let run_config = self.run_config();
        let selection = self.selection_strategy(&registry, &make_capability)?;
        let termination = self.termination_strategy(&registry, &run_config, &make_capability)?;
        let reducer = self.history_reducer(&make_capability);

        let mut builder = GroupChat::builder(registry).shared_reducer(reducer);
        if let Some(selection) = selection {
            builder = builder.shared_selection(selection);
        }
        builder = builder.shared_termination(termination);
        builder.build(run_config)
    }

    fn selection_strategy<F>(
        &self,
        registry: &AgentRegistry,
        make_capability: &F,
    ) -> Result<Option<Arc<dyn SelectionStrategy>>, GroupChatError>
    where
        F: Fn(&str, Option<f32>) -> Arc<dyn Capability>,
    {
        let strategy: Arc<dyn SelectionStrategy> = match &self.selection {
            SelectionConfig::Sequential { order } if order.is_empty() => return Ok(None),
            SelectionConfig::Sequential { order } => {
                ensure_registered(registry, order.iter().map(String::as_str))?;
                Arc::new(SequentialSelection::new(order.clone()))
            }
            SelectionConfig::Routing { fallback, rules } => {
                let routing = rules
                    .iter()
                    .cloned()
                    .fold(RoutingSelection::new(fallback.clone()), |r, rule| {
                        r.with_rule(rule)
                    });
                ensure_registered(registry, routing.targets())?;
                Arc::new(routing)
            }
            SelectionConfig::Capability {
                model,
                instructions,
                history_window,
            } => {
                let model = model.as_deref().unwrap_or(&self.llm.model);
                let mut selection =
                    CapabilitySelection::new(make_capability(model, Some(0.0)), registry.names());
                if let Some(instructions) = instructions {
                    selection = selection.with_instructions(instructions.clone());
                }
                if let Some(window) = history_window {
                    selection = selection.with_history_window(*window);
                }
                Arc::new(selection)
            }
        };
        Ok(Some(strategy))
    }

    fn termination_strategy<F>(
        &self,
        registry: &AgentRegistry,
        run_config: &RunConfig,
        make_capability: &F,
    ) -> Result<Arc<dyn TerminationStrategy>, GroupChatError>
    where
        F: Fn(&str, Option<f32>) -> Arc<dyn Capability>,
    {
        let strategy: Arc<dyn TerminationStrategy> = match &self.termination {
            TerminationConfig::Approval { token, agents } => {
                ensure_registered(registry, agents.iter().map(String::as_str))?;
                let token = token.clone().unwrap_or_else(|| run_config.approval_token.clone());
                if token.is_empty() {
                    return Err(GroupChatError::InvalidConfig(
                        "approval token must not be empty".to_string(),
                    ));
                }
                Arc::new(ApprovalTermination::new(token).with_agents(agents.clone()))
            }
            TerminationConfig::Capability {
                model,
                instructions,
                result_token,
                history_window,
            } => {
                let model = model.as_deref().unwrap_or(&self.llm.model);
                let mut termination = CapabilityTermination::new(make_capability(model, Some(0.0)));
                if let Some(instructions) = instructions {
                    termination = termination.with_instructions(instructions.clone());
                }
                if let Some(result_token) = result_token {
                    termination = termination.with_result_token(result_token.clone());
                }
                if history_window.is_some() {
                    termination = termination.with_history_window(*history_window);
                }
                Arc::new(termination)
            }
        };
        Ok(strategy)
    }

    fn history_reducer<F>(&self, make_capability: &F) -> Arc<dyn HistoryReducer>
    where
        F: Fn(&str, Option<f32>) -> Arc<dyn Capability>,
    {
        match &self.reducer {
            ReducerConfig::Truncation { threshold } => {
                Arc::new(TruncationReducer::new().with_threshold(*threshold))
            }
            ReducerConfig::Summarization {
                model,
                instructions,
                threshold,
                input_window,
            } => {
                let model = model.as_deref().unwrap_or(&self.llm.model);
                let mut reducer = SummarizationReducer::new(make_capability(model, Some(0.2)))
                    .with_threshold(*threshold);
                if let Some(instructions) = instructions {
                    reducer = reducer.with_instructions(instructions.clone());
                }
                if let Some(window) = input_window {
                    reducer = reducer.with_input_window(*window);
                }
                Arc::new(reducer)
            }
        }
    }
}

fn ensure_registered<'a>(
    registry: &AgentRegistry,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), GroupChatError> {
    for name in names {
        registry.resolve(name)?;
    }
    Ok(())
}
