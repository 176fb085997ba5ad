//! Actor network: backbone plus distribution head
//!
//! The actor owns its own `VarStore` so its parameters and optimizer are
//! independent of the critic's.
//!
//! ```text
//! states -> [Backbone] -> latent -> [Head] -> ActionDistribution
//!                                    |
//!                 Categorical: logits = Dense(num_actions)
//!                 Gaussian:    mean   = Dense(action_dim)
//!                              std    = exp(clamp(Dense(action_dim), -2, 1))
//!                                       or a fixed constant
//! ```

use serde::{Deserialize, Serialize};
use tch::{
    Device, Tensor,
    nn::{self, Module},
};

use crate::policy::{
    backbone::Backbone,
    distribution::ActionDistribution,
    mlp::{MlpBackbone, MlpConfig, linear_config},
};

/// Lower clamp on the learned log standard deviation
pub const LOG_STD_MIN: f64 = -2.0;

/// Upper clamp on the learned log standard deviation
pub const LOG_STD_MAX: f64 = 1.0;

/// Orthogonal gain of the distribution head
const HEAD_GAIN: f64 = 0.01;

/// How a Gaussian policy obtains its standard deviation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdMode {
    /// State-dependent log-std from a linear head, clamped to
    /// `[LOG_STD_MIN, LOG_STD_MAX]`
    #[default]
    Learned,

    /// Constant std shared by every state and dimension
    Fixed(f64),
}

/// Shape of the actor's output distribution
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeadConfig {
    /// Categorical over `num_actions` choices
    Categorical { num_actions: i64 },

    /// Diagonal Gaussian over `action_dim` dimensions; `bounded` squashes
    /// actions through tanh into `[-1, 1]`
    Gaussian { action_dim: i64, std_mode: StdMode, bounded: bool },
}

#[derive(Debug)]
enum GaussianStd {
    Learned(nn::Linear),
    Fixed(f64),
}

#[derive(Debug)]
enum PolicyHead {
    Categorical { logits: nn::Linear },
    Gaussian { mean: nn::Linear, std: GaussianStd, bounded: bool },
}

impl PolicyHead {
    fn new(path: &nn::Path, latent_dim: i64, config: &HeadConfig, orthogonal: bool) -> Self {
        let head_config = linear_config(HEAD_GAIN, orthogonal);
        match *config {
            HeadConfig::Categorical { num_actions } => PolicyHead::Categorical {
                logits: nn::linear(path / "logits", latent_dim, num_actions, head_config),
            },
            HeadConfig::Gaussian { action_dim, std_mode, bounded } => {
                let std = match std_mode {
                    StdMode::Learned => GaussianStd::Learned(nn::linear(
                        path / "log_std",
                        latent_dim,
                        action_dim,
                        head_config,
                    )),
                    StdMode::Fixed(std) => GaussianStd::Fixed(std),
                };
                PolicyHead::Gaussian {
                    mean: nn::linear(path / "mean", latent_dim, action_dim, head_config),
                    std,
                    bounded,
                }
            }
        }
    }

    fn forward(&self, latent: &Tensor) -> ActionDistribution {
        match self {
            PolicyHead::Categorical { logits } => {
                ActionDistribution::Categorical { logits: logits.forward(latent) }
            }
            PolicyHead::Gaussian { mean, std, bounded } => {
                let mean = mean.forward(latent);
                let std = match std {
                    GaussianStd::Learned(log_std) => {
                        log_std.forward(latent).clamp(LOG_STD_MIN, LOG_STD_MAX).exp()
                    }
                    GaussianStd::Fixed(std) => mean.ones_like() * *std,
                };
                ActionDistribution::Gaussian { mean, std, bounded: *bounded }
            }
        }
    }
}

/// Stochastic policy network
pub struct Actor<B: Backbone = MlpBackbone> {
    vs: nn::VarStore,
    backbone: B,
    head: PolicyHead,
    head_config: HeadConfig,
}

impl Actor<MlpBackbone> {
    /// Create an MLP actor
    ///
    /// # Arguments
    ///
    /// * `state_dim` - State dimensionality
    /// * `head` - Output distribution shape
    /// * `config` - Backbone architecture
    /// * `device` - Device holding the parameters
    pub fn mlp(state_dim: i64, head: HeadConfig, config: &MlpConfig, device: Device) -> Self {
        Self::with_backbone(
            nn::VarStore::new(device),
            |path| MlpBackbone::new(path, state_dim, config),
            head,
            config.use_orthogonal_init,
        )
    }
}

impl<B: Backbone> Actor<B> {
    /// Create an actor around any backbone
    ///
    /// `build` receives the variable-store path the backbone must register
    /// its parameters under.
    pub fn with_backbone<F>(vs: nn::VarStore, build: F, head: HeadConfig, orthogonal: bool) -> Self
    where
        F: FnOnce(&nn::Path) -> B,
    {
        let root = vs.root();
        let backbone = build(&(&root / "backbone"));
        let policy_head = PolicyHead::new(&(&root / "head"), backbone.latent_dim(), &head, orthogonal);

        Self { vs, backbone, head: policy_head, head_config: head }
    }

    /// Action distribution for a `[batch, state_dim]` state batch
    pub fn distribution(&self, states: &Tensor) -> ActionDistribution {
        self.head.forward(&self.backbone.encode(states))
    }

    /// Output distribution shape
    pub fn head_config(&self) -> HeadConfig {
        self.head_config
    }

    /// Get the device this actor is on (CPU or CUDA)
    pub fn device(&self) -> Device {
        self.vs.device()
    }

    /// Get reference to variable store
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    /// Get mutable reference to variable store
    pub fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }

    /// Feature backbone
    pub fn backbone(&self) -> &B {
        &self.backbone
    }

    /// Mutable access to the backbone for episode-boundary resets
    pub fn backbone_mut(&mut self) -> &mut B {
        &mut self.backbone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    fn states(batch: i64, dim: i64) -> Tensor {
        Tensor::randn([batch, dim], (Kind::Float, Device::Cpu))
    }

    #[test]
    fn test_categorical_actor() {
        let actor = Actor::mlp(
            4,
            HeadConfig::Categorical { num_actions: 2 },
            &MlpConfig::default(),
            Device::Cpu,
        );

        match actor.distribution(&states(8, 4)) {
            ActionDistribution::Categorical { logits } => assert_eq!(logits.size(), vec![8, 2]),
            other => panic!("expected categorical, got {:?}", other),
        }
    }

    #[test]
    fn test_initial_policy_is_near_uniform() {
        // Head gain 0.01 keeps the initial logits close to zero
        let actor = Actor::mlp(
            4,
            HeadConfig::Categorical { num_actions: 2 },
            &MlpConfig::default(),
            Device::Cpu,
        );

        let dist = actor.distribution(&states(16, 4));
        let entropy = dist.entropy().mean(Kind::Float).double_value(&[]);
        assert!((entropy - 2.0_f64.ln()).abs() < 1e-2);
    }

    #[test]
    fn test_learned_std_is_clamped() {
        let actor = Actor::mlp(
            3,
            HeadConfig::Gaussian { action_dim: 2, std_mode: StdMode::Learned, bounded: true },
            &MlpConfig::default(),
            Device::Cpu,
        );

        match actor.distribution(&(states(32, 3) * 1000.0)) {
            ActionDistribution::Gaussian { mean, std, bounded } => {
                assert!(bounded);
                assert_eq!(mean.size(), vec![32, 2]);
                let min = std.min().double_value(&[]);
                let max = std.max().double_value(&[]);
                assert!(min >= LOG_STD_MIN.exp() - 1e-6);
                assert!(max <= LOG_STD_MAX.exp() + 1e-6);
            }
            other => panic!("expected gaussian, got {:?}", other),
        }
    }

    #[test]
    fn test_fixed_std() {
        let actor = Actor::mlp(
            3,
            HeadConfig::Gaussian { action_dim: 1, std_mode: StdMode::Fixed(0.3), bounded: false },
            &MlpConfig::default(),
            Device::Cpu,
        );

        assert!(!actor.var_store().variables().keys().any(|k| k.contains("log_std")));
        match actor.distribution(&states(4, 3)) {
            ActionDistribution::Gaussian { std, .. } => {
                let values: Vec<f32> = Vec::try_from(std.view([-1])).unwrap();
                assert!(values.iter().all(|s| (s - 0.3).abs() < 1e-6));
            }
            other => panic!("expected gaussian, got {:?}", other),
        }
    }

    #[test]
    fn test_parameter_names() {
        let actor = Actor::mlp(
            4,
            HeadConfig::Categorical { num_actions: 3 },
            &MlpConfig::default(),
            Device::Cpu,
        );

        let vars = actor.var_store().variables();
        assert!(vars.contains_key("backbone.fc1.weight"));
        assert!(vars.contains_key("head.logits.weight"));
    }
}
