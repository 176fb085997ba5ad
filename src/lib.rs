//! # ppo-bench
//!
//! Proximal Policy Optimization for discrete and continuous control
//!
//! An actor-critic agent (tch-rs networks, independent Adam optimizers),
//! a fixed-capacity trajectory buffer with GAE, running observation and
//! reward normalizers, and a single-environment training loop with periodic
//! deterministic evaluation and checkpointing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ppo_bench::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = PPOConfig::new().max_train_steps(100_000).seed(0);
//! let mut trainer = Trainer::new(
//!     config,
//!     CartPole::with_seed(0),
//!     CartPole::with_seed(100),
//!     TracingSink,
//!     RunContext::cpu(),
//! )?;
//! let summary = trainer.run()?;
//! println!("best reward: {:?}", summary.best_reward);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Environment trait and built-in control benchmarks
pub mod env;

/// Actor and critic networks, backbones and action distributions
pub mod policy;

/// Trajectory storage and advantage estimation
pub mod buffer;

/// PPO agent, optimizer, checkpoints, metrics and the training loop
pub mod train;

/// Running normalizers
pub mod utils;

/// Command-line options for the training binaries
pub mod cli;

/// Prelude module for convenient imports
///
/// This module re-exports commonly used types and traits for convenience.
pub mod prelude {
    pub use crate::buffer::{TrajectoryBuffer, Transition};
    pub use crate::env::{Action, Environment, StepResult, cartpole::CartPole, pendulum::Pendulum};
    pub use crate::policy::{Backbone, MlpBackbone, StdMode};
    pub use crate::train::{
        ActionSpec, Checkpointer, JsonlSink, MemorySink, MetricsSink, MultiSink, PPOConfig,
        PolicyValueAgent, RunContext, TracingSink, Trainer, TrainingSummary,
    };
    pub use crate::utils::{Normalizer, RewardScaler};
}

/// Current version of ppo-bench
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.0");
    }
}
