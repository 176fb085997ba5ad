//! Environment traits and implementations
//!
//! This module defines the simulation-environment contract consumed by the
//! training loop and provides the built-in control benchmarks.

use anyhow::Result;

/// Core trait for RL environments
///
/// Observations are flat `f32` vectors whose length must match
/// `observation_space().shape[0]`; the training loop treats any mismatch as a
/// fatal contract violation.
pub trait Environment {
    /// Reset the environment and return initial observation
    fn reset(&mut self) -> Result<Vec<f32>>;

    /// Step the environment with an action
    fn step(&mut self, action: &Action) -> Result<StepResult>;

    /// Get the observation space dimensions
    fn observation_space(&self) -> SpaceInfo;

    /// Get the action space dimensions
    fn action_space(&self) -> SpaceInfo;

    /// Maximum number of steps in one episode before it is truncated
    fn max_episode_steps(&self) -> usize;
}

/// Action passed to [`Environment::step`]
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Index into a discrete action set
    Discrete(i64),

    /// Real-valued action vector
    Continuous(Vec<f32>),
}

impl Action {
    /// Discrete index, if this is a discrete action
    pub fn as_discrete(&self) -> Option<i64> {
        match self {
            Action::Discrete(a) => Some(*a),
            Action::Continuous(_) => None,
        }
    }

    /// Action vector, if this is a continuous action
    pub fn as_continuous(&self) -> Option<&[f32]> {
        match self {
            Action::Discrete(_) => None,
            Action::Continuous(a) => Some(a),
        }
    }
}

/// Result of an environment step
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Next observation
    pub observation: Vec<f32>,

    /// Reward received
    pub reward: f32,

    /// Whether the episode terminated (failure or success, no next state)
    pub terminated: bool,

    /// Whether the episode was cut off by a time limit
    pub truncated: bool,

    /// Additional info
    pub info: StepInfo,
}

impl StepResult {
    /// Episode is over for either reason
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Space information for observations and actions
#[derive(Debug, Clone)]
pub struct SpaceInfo {
    /// Shape of the space
    pub shape: Vec<usize>,

    /// Data type
    pub dtype: SpaceType,
}

impl SpaceInfo {
    /// Flat dimensionality: number of discrete choices or vector length
    pub fn dim(&self) -> usize {
        match self.dtype {
            SpaceType::Discrete(n) => n,
            SpaceType::Continuous { .. } => self.shape.iter().product(),
        }
    }
}

/// Space data types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpaceType {
    /// Discrete space with n options
    Discrete(usize),

    /// Continuous space (Box), symmetric bound `[-high, high]` per dimension
    Continuous {
        /// Largest absolute value of any component
        high: f32,
    },
}

/// Additional step information
#[derive(Debug, Clone, Default)]
pub struct StepInfo {
    /// Environment steps taken in the current episode
    pub episode_steps: usize,
}

pub mod cartpole;
pub mod pendulum;
