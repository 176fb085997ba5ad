//! Experience storage for on-policy training
//!
//! - [`trajectory`]: the fixed-capacity transition buffer filled during
//!   rollout and drained by each PPO update
//! - [`gae`]: advantage and return computation over a drained rollout

pub mod gae;
pub mod trajectory;

pub use gae::{compute_gae, normalize_advantages};
pub use trajectory::{TrajectoryBuffer, Transition, TransitionBatch};
