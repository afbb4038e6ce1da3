//! Capability abstraction
//!
//! A capability produces one textual reply given a persona (instructions) and
//! a view of the conversation. Agents, capability-backed strategies and the
//! summarizing reducer all consume this same boundary.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CapabilityError;
use crate::transcript::Message;

/// Trait for reply-generating backends
#[async_trait]
pub trait Capability: Send + Sync {
    /// Generate a reply for `view` under the given instructions
    async fn generate(&self, persona: &str, view: &[Message]) -> Result<String, CapabilityError>;
}

#[async_trait]
impl<C: Capability + ?Sized> Capability for Arc<C> {
    async fn generate(&self, persona: &str, view: &[Message]) -> Result<String, CapabilityError> {
        (**self).generate(persona, view).await
    }
}

/// Capability backed by a plain closure
///
/// Useful for embedding deterministic policies or canned replies.
pub struct FnCapability<F> {
    func: F,
}

impl<F> FnCapability<F>
where
    F: Fn(&str, &[Message]) -> Result<String, CapabilityError> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> Capability for FnCapability<F>
where
    F: Fn(&str, &[Message]) -> Result<String, CapabilityError> + Send + Sync,
{
    async fn generate(&self, persona: &str, view: &[Message]) -> Result<String, CapabilityError> {
        (self.func)(persona, view)
    }
}
