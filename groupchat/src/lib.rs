//! Multi-agent group chat orchestration
//!
//! This crate provides:
//! - An agent registry binding named personas to a generation capability
//! - Selection strategies deciding who speaks next
//! - Termination strategies deciding when the work is done
//! - History reducers bounding what each agent sees
//! - A turn loop with a hard turn budget, failure recovery and cancellation
//!
//! # Example
//!
//! ```rust,ignore
//! use groupchat::{AgentRegistry, GroupChat, RoutingSelection, RunConfig};
//!
//! let chat = GroupChat::builder(registry)
//!     .selection(
//!         RoutingSelection::new("BusinessAnalyst")
//!             .route("BusinessAnalyst", "SoftwareEngineer")
//!             .route("SoftwareEngineer", "ProductOwner")
//!             .route("ProductOwner", "SoftwareEngineer"),
//!     )
//!     .build(RunConfig::new(25, 3))?;
//!
//! let outcome = chat.run("Build a calculator app").await;
//! ```

pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod ollama;
pub mod reducer;
pub mod registry;
pub mod run;
pub mod selection;
pub mod termination;
pub mod transcript;

pub use capability::{Capability, FnCapability};
pub use config::GroupChatFileConfig;
pub use engine::{GroupChat, GroupChatBuilder, RunConfig};
pub use error::{CapabilityError, GroupChatError, RunFailure, StrategyError};
pub use ollama::OllamaCapability;
pub use reducer::{HistoryReducer, ReducedView, SummarizationReducer, TruncationReducer};
pub use registry::{Agent, AgentConfig, AgentRegistry};
pub use run::{RunHandle, RunOutcome, RunStatus};
pub use selection::{
    CapabilitySelection, RouteRule, RoutingSelection, SelectionStrategy, SequentialSelection,
};
pub use termination::{ApprovalTermination, CapabilityTermination, TerminationStrategy};
pub use transcript::{Author, Message, Transcript, TurnRecord};

/// Re-exported so callers can cancel runs started with [`GroupChat::run_with_cancel`]
pub use tokio_util::sync::CancellationToken;
