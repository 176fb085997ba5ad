//! Utility functions and helpers

pub mod normalize;

pub use normalize::{Normalizer, RewardScaler, RunningMeanStd};
