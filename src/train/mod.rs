//! Training algorithms
//!
//! PPO agent and update, optimizer, checkpointing, metrics sinks and the
//! environment-driven training loop.

pub mod checkpoint;
pub mod context;
pub mod metrics;
pub mod optim;
pub mod ppo;
pub mod trainer;

pub use checkpoint::Checkpointer;
pub use context::RunContext;
pub use metrics::{EvaluationRecord, JsonlSink, MemorySink, MetricsSink, MultiSink, TracingSink, UpdateRecord};
pub use optim::Adam;
pub use ppo::{ActionSpec, EpisodeState, PPOConfig, PolicyValueAgent, UpdateStats};
pub use trainer::{EvaluationResult, RewardTransform, Trainer, TrainingSummary};
