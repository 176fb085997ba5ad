//! Proximal Policy Optimization (PPO) algorithm
//!
//! This module implements PPO for a single actor-critic agent. PPO is a
//! policy gradient method that uses a clipped surrogate objective to keep
//! each policy update close to the policy that collected the data.
//!
//! # Algorithm Overview
//!
//! ```text
//! Repeat:
//!   1. Collect batch_size transitions with the current policy
//!   2. Compute advantages using GAE
//!   3. For K epochs:
//!      a. Shuffle and split into minibatches
//!      b. Actor: clipped surrogate loss with entropy bonus
//!      c. Critic: mean squared error against the GAE returns
//!   4. Optionally decay learning rates
//! ```
//!
//! # References
//!
//! - [Proximal Policy Optimization Algorithms](https://arxiv.org/abs/1707.06347)
//! - [High-Dimensional Continuous Control Using GAE](https://arxiv.org/abs/1506.02438)

pub mod agent;
pub mod config;
pub mod loss;
pub mod stats;

pub use agent::{ActionSpec, EpisodeState, PolicyValueAgent};
pub use config::PPOConfig;
pub use loss::{compute_policy_loss, compute_value_loss, generate_minibatch_indices};
pub use stats::{MinibatchStats, UpdateStats};
