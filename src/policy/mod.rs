//! Policy and value networks
//!
//! Actors and critics are composed from an interchangeable [`Backbone`]
//! (feature extraction) and a fixed head, using tch-rs for the neural
//! networks.

pub mod actor;
pub mod backbone;
pub mod critic;
pub mod distribution;
pub mod mlp;

pub use actor::{Actor, HeadConfig, StdMode};
pub use backbone::Backbone;
pub use critic::Critic;
pub use distribution::ActionDistribution;
pub use mlp::{Activation, MlpBackbone, MlpConfig};
