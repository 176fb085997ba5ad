//! PPO configuration and hyperparameters
//!
//! This module defines the configuration parameters for PPO training
//! and provides validation and builder pattern methods.
//!
//! Interactions between options:
//! - `use_reward_norm` and `use_reward_scaling` are mutually exclusive;
//!   enabling both is a validation error.
//! - `max_grad_norm` only applies when `use_grad_clip` is set.
//! - `std_mode` and `bounded_actions` only affect continuous action spaces.
//! - Adam epsilon: `adam_eps`, when set, is used as given. Otherwise
//!   `set_adam_eps` selects `1e-5`, and `1e-8` applies when it is off.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::policy::{Activation, MlpConfig, StdMode};

/// Adam epsilon when `set_adam_eps` is enabled
pub const ADAM_EPS_SET: f64 = 1e-5;

/// Adam epsilon otherwise (torch default)
pub const ADAM_EPS_DEFAULT: f64 = 1e-8;

/// PPO configuration parameters
///
/// Default values match the settings commonly used for classic control
/// tasks such as CartPole and Pendulum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PPOConfig {
    /// Total environment steps to train for
    pub max_train_steps: usize,

    /// Environment steps between evaluations
    pub evaluate_freq: usize,

    /// Deterministic episodes per evaluation
    pub evaluate_episodes: usize,

    /// Transitions per update (trajectory buffer capacity)
    pub batch_size: usize,

    /// Transitions per gradient step
    pub mini_batch_size: usize,

    /// Width of each hidden layer
    pub hidden_width: i64,

    /// Actor learning rate
    pub lr_actor: f64,

    /// Critic learning rate
    pub lr_critic: f64,

    /// Discount factor (gamma)
    pub gamma: f64,

    /// GAE lambda parameter
    pub gae_lambda: f64,

    /// PPO clipping parameter (epsilon)
    pub clip_epsilon: f64,

    /// Optimization epochs per update
    pub k_epochs: usize,

    /// Normalize advantages over the full batch
    pub use_adv_norm: bool,

    /// Normalize states with running statistics
    pub use_state_norm: bool,

    /// Normalize rewards with running statistics
    pub use_reward_norm: bool,

    /// Scale rewards by the running std of the discounted return
    pub use_reward_scaling: bool,

    /// Entropy bonus coefficient
    pub entropy_coef: f64,

    /// Decay learning rates linearly to zero over `max_train_steps`
    pub use_lr_decay: bool,

    /// Clip the global gradient norm before each optimizer step
    pub use_grad_clip: bool,

    /// Maximum gradient norm for clipping
    pub max_grad_norm: f64,

    /// Orthogonal weight initialization
    pub use_orthogonal_init: bool,

    /// Use Adam epsilon 1e-5 instead of 1e-8
    pub set_adam_eps: bool,

    /// Explicit Adam epsilon; takes precedence over `set_adam_eps`
    pub adam_eps: Option<f64>,

    /// Tanh hidden activations instead of ReLU
    pub use_tanh: bool,

    /// Gaussian standard deviation source (continuous actions)
    pub std_mode: StdMode,

    /// Squash continuous actions through tanh before rescaling
    pub bounded_actions: bool,

    /// Seed for network initialization, sampling and environments
    pub seed: Option<u64>,

    /// Directory for checkpoints and best-policy snapshots
    pub checkpoint_dir: Option<PathBuf>,

    /// Override the environment's episode horizon
    pub max_episode_steps: Option<usize>,
}

impl Default for PPOConfig {
    fn default() -> Self {
        Self {
            max_train_steps: 20_000_000,
            evaluate_freq: 4096,
            evaluate_episodes: 3,
            batch_size: 2048,
            mini_batch_size: 64,
            hidden_width: 64,
            lr_actor: 3e-4,
            lr_critic: 3e-4,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_epsilon: 0.2,
            k_epochs: 10,
            use_adv_norm: true,
            use_state_norm: false,
            use_reward_norm: false,
            use_reward_scaling: false,
            entropy_coef: 0.01,
            use_lr_decay: true,
            use_grad_clip: true,
            max_grad_norm: 0.5,
            use_orthogonal_init: true,
            set_adam_eps: true,
            adam_eps: None,
            use_tanh: true,
            std_mode: StdMode::Learned,
            bounded_actions: true,
            seed: None,
            checkpoint_dir: None,
            max_episode_steps: None,
        }
    }
}

impl PPOConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file and validate it
    ///
    /// Missing fields take their default values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::default().merge_json_file(path)
    }

    /// Overlay the fields present in a JSON file onto this configuration
    ///
    /// Fields the file does not mention keep their current values. The
    /// merged configuration is validated.
    pub fn merge_json_file<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let overrides: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        let serde_json::Value::Object(overrides) = overrides else {
            return Err(anyhow!("Config file {} must contain a JSON object", path.display()));
        };

        let mut merged = serde_json::to_value(&self)?;
        if let serde_json::Value::Object(fields) = &mut merged {
            fields.extend(overrides);
        }
        let config: Self = serde_json::from_value(merged)
            .with_context(|| format!("Invalid option in config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.use_reward_norm && self.use_reward_scaling {
            return Err(anyhow!(
                "use_reward_norm and use_reward_scaling are mutually exclusive; enable at most one"
            ));
        }
        if self.max_train_steps == 0 {
            return Err(anyhow!("max_train_steps must be positive"));
        }
        if self.evaluate_freq == 0 {
            return Err(anyhow!("evaluate_freq must be positive"));
        }
        if self.evaluate_episodes == 0 {
            return Err(anyhow!("evaluate_episodes must be positive"));
        }
        if self.batch_size == 0 {
            return Err(anyhow!("batch_size must be positive"));
        }
        if self.mini_batch_size == 0 || self.mini_batch_size > self.batch_size {
            return Err(anyhow!("mini_batch_size must be in [1, batch_size]"));
        }
        if self.hidden_width <= 0 {
            return Err(anyhow!("hidden_width must be positive"));
        }
        if self.lr_actor <= 0.0 || self.lr_critic <= 0.0 {
            return Err(anyhow!("learning rates must be positive"));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(anyhow!("gamma must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err(anyhow!("gae_lambda must be in [0, 1]"));
        }
        if self.clip_epsilon <= 0.0 {
            return Err(anyhow!("clip_epsilon must be positive"));
        }
        if self.k_epochs == 0 {
            return Err(anyhow!("k_epochs must be positive"));
        }
        if self.entropy_coef < 0.0 {
            return Err(anyhow!("entropy_coef must be non-negative"));
        }
        if self.use_grad_clip && self.max_grad_norm <= 0.0 {
            return Err(anyhow!("max_grad_norm must be positive"));
        }
        if let StdMode::Fixed(std) = self.std_mode
            && std <= 0.0
        {
            return Err(anyhow!("fixed std must be positive, got {}", std));
        }
        if let Some(eps) = self.adam_eps
            && !(eps > 0.0 && eps.is_finite())
        {
            return Err(anyhow!("adam_eps must be positive, got {}", eps));
        }
        if self.max_episode_steps == Some(0) {
            return Err(anyhow!("max_episode_steps must be positive"));
        }
        Ok(())
    }

    /// Adam epsilon: `adam_eps` if set, else the value selected by `set_adam_eps`
    pub fn adam_epsilon(&self) -> f64 {
        match self.adam_eps {
            Some(eps) => eps,
            None if self.set_adam_eps => ADAM_EPS_SET,
            None => ADAM_EPS_DEFAULT,
        }
    }

    /// Backbone architecture for actor and critic
    pub fn mlp_config(&self) -> MlpConfig {
        MlpConfig {
            num_layers: 2,
            hidden_dim: self.hidden_width,
            use_orthogonal_init: self.use_orthogonal_init,
            activation: if self.use_tanh { Activation::Tanh } else { Activation::ReLU },
        }
    }

    /// Set total training steps
    pub fn max_train_steps(mut self, steps: usize) -> Self {
        self.max_train_steps = steps;
        self
    }

    /// Set evaluation interval
    pub fn evaluate_freq(mut self, steps: usize) -> Self {
        self.evaluate_freq = steps;
        self
    }

    /// Set episodes per evaluation
    pub fn evaluate_episodes(mut self, episodes: usize) -> Self {
        self.evaluate_episodes = episodes;
        self
    }

    /// Set batch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set minibatch size
    pub fn mini_batch_size(mut self, size: usize) -> Self {
        self.mini_batch_size = size;
        self
    }

    /// Set hidden layer width
    pub fn hidden_width(mut self, width: i64) -> Self {
        self.hidden_width = width;
        self
    }

    /// Set actor learning rate
    pub fn lr_actor(mut self, lr: f64) -> Self {
        self.lr_actor = lr;
        self
    }

    /// Set critic learning rate
    pub fn lr_critic(mut self, lr: f64) -> Self {
        self.lr_critic = lr;
        self
    }

    /// Set discount factor
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set GAE lambda
    pub fn gae_lambda(mut self, lambda: f64) -> Self {
        self.gae_lambda = lambda;
        self
    }

    /// Set PPO clipping parameter
    pub fn clip_epsilon(mut self, clip: f64) -> Self {
        self.clip_epsilon = clip;
        self
    }

    /// Set optimization epochs per update
    pub fn k_epochs(mut self, epochs: usize) -> Self {
        self.k_epochs = epochs;
        self
    }

    /// Toggle advantage normalization
    pub fn use_adv_norm(mut self, enabled: bool) -> Self {
        self.use_adv_norm = enabled;
        self
    }

    /// Toggle state normalization
    pub fn use_state_norm(mut self, enabled: bool) -> Self {
        self.use_state_norm = enabled;
        self
    }

    /// Toggle reward normalization
    pub fn use_reward_norm(mut self, enabled: bool) -> Self {
        self.use_reward_norm = enabled;
        self
    }

    /// Toggle reward scaling
    pub fn use_reward_scaling(mut self, enabled: bool) -> Self {
        self.use_reward_scaling = enabled;
        self
    }

    /// Set entropy bonus coefficient
    pub fn entropy_coef(mut self, coef: f64) -> Self {
        self.entropy_coef = coef;
        self
    }

    /// Toggle linear learning-rate decay
    pub fn use_lr_decay(mut self, enabled: bool) -> Self {
        self.use_lr_decay = enabled;
        self
    }

    /// Toggle gradient clipping
    pub fn use_grad_clip(mut self, enabled: bool) -> Self {
        self.use_grad_clip = enabled;
        self
    }

    /// Set maximum gradient norm
    pub fn max_grad_norm(mut self, norm: f64) -> Self {
        self.max_grad_norm = norm;
        self
    }

    /// Toggle orthogonal initialization
    pub fn use_orthogonal_init(mut self, enabled: bool) -> Self {
        self.use_orthogonal_init = enabled;
        self
    }

    /// Toggle Adam epsilon 1e-5
    pub fn set_adam_eps(mut self, enabled: bool) -> Self {
        self.set_adam_eps = enabled;
        self
    }

    /// Set an explicit Adam epsilon
    pub fn adam_eps(mut self, eps: f64) -> Self {
        self.adam_eps = Some(eps);
        self
    }

    /// Toggle tanh activations
    pub fn use_tanh(mut self, enabled: bool) -> Self {
        self.use_tanh = enabled;
        self
    }

    /// Set Gaussian std source
    pub fn std_mode(mut self, mode: StdMode) -> Self {
        self.std_mode = mode;
        self
    }

    /// Toggle tanh squashing of continuous actions
    pub fn bounded_actions(mut self, enabled: bool) -> Self {
        self.bounded_actions = enabled;
        self
    }

    /// Set random seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set checkpoint directory
    pub fn checkpoint_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    /// Override the episode horizon
    pub fn max_episode_steps(mut self, steps: usize) -> Self {
        self.max_episode_steps = Some(steps);
        self
    }
}
