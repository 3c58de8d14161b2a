//! Explicit execution context handed to every pipeline component.
//!
//! Holds the execution target, the seed used for parameter
//! initialisation, and an optional cancellation token checked by the
//! trainer between batches.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::DetectorConfig;

/// Where batch computation runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionTarget {
    /// Sequential, on the calling thread.
    #[default]
    Cpu,
    /// Inference batches scored on the rayon pool. Training stays sequential.
    CpuParallel,
}

impl std::fmt::Display for ExecutionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionTarget::Cpu => write!(f, "cpu"),
            ExecutionTarget::CpuParallel => write!(f, "cpu_parallel"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunContext {
    target: ExecutionTarget,
    seed: u64,
    cancel: Option<CancellationToken>,
}

impl RunContext {
    pub fn new(target: ExecutionTarget, seed: u64) -> Self {
        Self {
            target,
            seed,
            cancel: None,
        }
    }

    /// Context described by the `[runtime]` section of a config.
    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.runtime.execution, config.runtime.seed)
    }

    /// Attach a token that aborts training when cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn target(&self) -> ExecutionTarget {
        self.target
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(ExecutionTarget::Cpu, 42)
    }
}
