//! Group chat execution engine
//!
//! Drives a set of agents through a shared transcript:
//! - History reduction before every invocation
//! - Pluggable selection and termination policies
//! - Recoverable capability failures recorded as system turns
//! - Mandatory turn budget and cooperative cancellation

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{GroupChatError, RunFailure};
use crate::reducer::{HistoryReducer, TruncationReducer};
use crate::registry::AgentRegistry;
use crate::run::{RunHandle, RunOutcome, RunStatus, TurnSink};
use crate::selection::{SelectionStrategy, SequentialSelection};
use crate::termination::{ApprovalTermination, TerminationStrategy, DEFAULT_APPROVAL_TOKEN};
use crate::transcript::{Author, Transcript, TurnRecord};

/// Limits applied to every run of a group chat
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Hard upper bound on turns (agent replies and recorded failures)
    pub max_turns: usize,

    /// Number of recent messages shown to an agent
    pub target_history_count: usize,

    /// Token used by the default approval termination policy
    pub approval_token: String,

    /// Per-invocation timeout for agent capabilities
    pub capability_timeout: Option<Duration>,
}

impl RunConfig {
    /// Create a run configuration with the required limits
    pub fn new(max_turns: usize, target_history_count: usize) -> Self {
        Self {
            max_turns,
            target_history_count,
            approval_token: DEFAULT_APPROVAL_TOKEN.to_string(),
            capability_timeout: None,
        }
    }

    /// Set the approval token
    pub fn with_approval_token(mut self, token: impl Into<String>) -> Self {
        self.approval_token = token.into();
        self
    }

    /// Bound every capability invocation
    pub fn with_capability_timeout(mut self, timeout: Duration) -> Self {
        self.capability_timeout = Some(timeout);
        self
    }

    /// Check the limits are usable
    pub fn validate(&self) -> Result<(), GroupChatError> {
        if self.max_turns == 0 {
            return Err(GroupChatError::InvalidConfig(
                "max_turns must be at least 1".to_string(),
            ));
        }
        if self.target_history_count == 0 {
            return Err(GroupChatError::InvalidConfig(
                "target_history_count must be at least 1".to_string(),
            ));
        }
        if self.capability_timeout.is_some_and(|t| t.is_zero()) {
            return Err(GroupChatError::InvalidConfig(
                "capability_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`GroupChat`]
pub struct GroupChatBuilder {
    registry: AgentRegistry,
    selection: Option<Arc<dyn SelectionStrategy>>,
    termination: Option<Arc<dyn TerminationStrategy>>,
    reducer: Option<Arc<dyn HistoryReducer>>,
}

impl GroupChatBuilder {
    /// Set the selection strategy (default: sequential over registration order)
    pub fn selection(mut self, selection: impl SelectionStrategy + 'static) -> Self {
        self.selection = Some(Arc::new(selection));
        self
    }

    /// Set the termination strategy (default: approval token)
    pub fn termination(mut self, termination: impl TerminationStrategy + 'static) -> Self {
        self.termination = Some(Arc::new(termination));
        self
    }

    /// Set the history reducer (default: truncation)
    pub fn reducer(mut self, reducer: impl HistoryReducer + 'static) -> Self {
        self.reducer = Some(Arc::new(reducer));
        self
    }

    /// Set an already shared selection strategy
    pub fn shared_selection(mut self, selection: Arc<dyn SelectionStrategy>) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Set an already shared termination strategy
    pub fn shared_termination(mut self, termination: Arc<dyn TerminationStrategy>) -> Self {
        self.termination = Some(termination);
        self
    }

    /// Set an already shared history reducer
    pub fn shared_reducer(mut self, reducer: Arc<dyn HistoryReducer>) -> Self {
        self.reducer = Some(reducer);
        self
    }

    /// Build the group chat
    pub fn build(self, config: RunConfig) -> Result<GroupChat, GroupChatError> {
        if self.registry.is_empty() {
            return Err(GroupChatError::NoAgents);
        }
        config.validate()?;

        let selection = self.selection.unwrap_or_else(|| {
            Arc::new(SequentialSelection::new(self.registry.names())) as Arc<dyn SelectionStrategy>
        });
        let termination: Arc<dyn TerminationStrategy> = match self.termination {
            Some(termination) => termination,
            None => {
                if config.approval_token.is_empty() {
                    return Err(GroupChatError::InvalidConfig(
                        "approval_token must not be empty".to_string(),
                    ));
                }
                Arc::new(ApprovalTermination::new(config.approval_token.clone()))
            }
        };
        let reducer = self
            .reducer
            .unwrap_or_else(|| Arc::new(TruncationReducer::new()) as Arc<dyn HistoryReducer>);

        Ok(GroupChat {
            registry: Arc::new(self.registry),
            selection,
            termination,
            reducer,
            config,
        })
    }
}

/// Mutable state owned by exactly one run
struct RunState {
    transcript: Transcript,
    turn_count: usize,
    turns: Vec<TurnRecord>,
    status: RunStatus,
}

impl RunState {
    fn new(request: &str) -> Self {
        Self {
            transcript: Transcript::seeded(request),
            turn_count: 0,
            turns: Vec::new(),
            status: RunStatus::Running,
        }
    }

    fn record(&mut self, record: TurnRecord, sink: &TurnSink) {
        sink.send(record.clone());
        self.turns.push(record);
    }
}

/// Outcome of waiting on a future that may be cancelled
enum CancelAware<T> {
    Value(T),
    Cancelled,
}

async fn await_or_cancel<T, F>(token: &CancellationToken, fut: F) -> CancelAware<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => CancelAware::Cancelled,
        value = fut => CancelAware::Value(value),
    }
}

/// Multi-agent group chat orchestrator
///
/// Cheap to clone; every run owns its own transcript and turn budget, so one
/// instance can serve many concurrent runs.
#[derive(Clone)]
pub struct GroupChat {
    registry: Arc<AgentRegistry>,
    selection: Arc<dyn SelectionStrategy>,
    termination: Arc<dyn TerminationStrategy>,
    reducer: Arc<dyn HistoryReducer>,
    config: RunConfig,
}

impl GroupChat {
    /// Start building a group chat over the given agents
    pub fn builder(registry: AgentRegistry) -> GroupChatBuilder {
        GroupChatBuilder {
            registry,
            selection: None,
            termination: None,
            reducer: None,
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run to completion and return every turn
    pub async fn run(&self, request: &str) -> RunOutcome {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// Run to completion, stopping early if `cancel` fires
    pub async fn run_with_cancel(&self, request: &str, cancel: CancellationToken) -> RunOutcome {
        self.drive(Uuid::new_v4(), request, &cancel, &TurnSink::none())
            .await
    }

    /// Spawn a run on the current tokio runtime and stream its turns
    pub fn start_run(&self, request: impl Into<String>) -> RunHandle {
        let run_id = Uuid::new_v4();
        let request = request.into();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let chat = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            chat.drive(run_id, &request, &token, &TurnSink::new(tx)).await
        });

        RunHandle::new(run_id, rx, task, cancel)
    }

    async fn drive(
        &self,
        run_id: Uuid,
        request: &str,
        cancel: &CancellationToken,
        sink: &TurnSink,
    ) -> RunOutcome {
        let span = tracing::info_span!("group_chat_run", %run_id);
        async move {
            tracing::info!(
                agents = self.registry.len(),
                max_turns = self.config.max_turns,
                "Starting group chat run"
            );

            let mut state = RunState::new(request);
            while state.status.is_running() {
                state.status = self.step(&mut state, cancel, sink).await;
            }

            if let RunStatus::Failed(failure) = &state.status {
                tracing::warn!(turns = state.turn_count, "Run failed: {}", failure);
            } else {
                tracing::info!(turns = state.turn_count, "Run terminated");
            }

            RunOutcome {
                run_id,
                status: state.status,
                turns: state.turns,
                transcript: state.transcript,
            }
        }
        .instrument(span)
        .await
    }

    /// Execute one iteration of the turn loop
    ///
    /// Returns `Running` to continue, or the terminal status.
    async fn step(
        &self,
        state: &mut RunState,
        cancel: &CancellationToken,
        sink: &TurnSink,
    ) -> RunStatus {
        use CancelAware::{Cancelled, Value};

        if cancel.is_cancelled() {
            return RunStatus::Failed(RunFailure::Cancelled);
        }
        if state.turn_count >= self.config.max_turns {
            return RunStatus::Failed(RunFailure::TurnBudgetExceeded {
                max_turns: self.config.max_turns,
            });
        }

        let reduce = self
            .reducer
            .reduce(state.transcript.messages(), self.config.target_history_count);
        let view = match await_or_cancel(cancel, reduce).await {
            Value(view) => view,
            Cancelled => return RunStatus::Failed(RunFailure::Cancelled),
        };
        if view.dropped > 0 {
            tracing::debug!(
                kept = view.len(),
                dropped = view.dropped,
                summarized = view.summarized,
                "Reduced history"
            );
        }

        let name = match await_or_cancel(cancel, self.selection.select(&state.transcript)).await {
            Value(Ok(name)) => name,
            Value(Err(e)) => return RunStatus::Failed(RunFailure::SelectionFailed(e)),
            Cancelled => return RunStatus::Failed(RunFailure::Cancelled),
        };
        let Ok(agent) = self.registry.resolve(&name) else {
            return RunStatus::Failed(RunFailure::UnknownAgent(name));
        };
        tracing::debug!(agent = %name, turn = state.turn_count + 1, "Selected next agent");

        let invoke = self
            .registry
            .invoke(agent, &view.messages, self.config.capability_timeout);
        let reply = match await_or_cancel(cancel, invoke).await {
            Value(reply) => reply,
            Cancelled => return RunStatus::Failed(RunFailure::Cancelled),
        };

        state.turn_count += 1;
        let content = match reply {
            Ok(content) => content,
            Err(e) => {
                // Recoverable: record it and let the next iteration pick a speaker
                tracing::warn!(agent = %name, "Agent capability failed: {}", e);
                let record = TurnRecord::failure(&name, &e, state.turn_count);
                state.record(record, sink);
                return RunStatus::Running;
            }
        };

        let message = state.transcript.append(Author::Agent(name), content);
        let record = TurnRecord::reply(message, state.turn_count);
        state.record(record, sink);

        match await_or_cancel(cancel, self.termination.is_done(&state.transcript)).await {
            Value(Ok(true)) => RunStatus::Terminated,
            Value(Ok(false)) => RunStatus::Running,
            Value(Err(e)) => RunStatus::Failed(RunFailure::TerminationCheckFailed(e)),
            Cancelled => RunStatus::Failed(RunFailure::Cancelled),
        }
    }
}
