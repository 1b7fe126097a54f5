//! Scoring and retraining agents
//!
//! An agent performs one unit of work per [`Agent::step`] call. The worker
//! loop decides when to call it again.

mod retrain;
mod scoring;

#[cfg(test)]
pub(crate) mod mocks;

pub use retrain::{RetrainAgent, RetrainResult};
pub use scoring::{NoModelPolicy, ScoringAgent, ScoringConfig, ScoringStepResult};

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// A pollable unit of work shared by both agents
#[async_trait]
pub trait Agent: Send + Sync + 'static {
    /// Observability record returned by a productive step
    type Output: fmt::Debug + Send;

    /// Short name used in logs, metrics and health components
    fn name(&self) -> &'static str;

    /// Run one step. `Ok(None)` means there was nothing to do.
    async fn step(&self) -> Result<Option<Self::Output>>;

    /// Housekeeping run by the worker after a step that found no work
    async fn on_idle(&self) -> Result<()> {
        Ok(())
    }
}
