//! Command-line options shared by the training binaries
//!
//! Precedence is: benchmark defaults, then `--config` JSON file, then
//! individual flags.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing_subscriber::EnvFilter;

use crate::{policy::StdMode, train::PPOConfig};

/// Training options
#[derive(Debug, Clone, Default, Args)]
pub struct TrainArgs {
    /// JSON file with a full or partial PPOConfig
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Random seed for networks, sampling and environments
    #[arg(long)]
    pub seed: Option<u64>,

    /// Total environment steps
    #[arg(long)]
    pub max_train_steps: Option<usize>,

    /// Environment steps between evaluations
    #[arg(long)]
    pub evaluate_freq: Option<usize>,

    /// Deterministic episodes per evaluation
    #[arg(long)]
    pub evaluate_episodes: Option<usize>,

    /// Transitions collected per update
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Transitions per gradient step
    #[arg(long)]
    pub mini_batch_size: Option<usize>,

    /// Hidden layer width
    #[arg(long)]
    pub hidden_width: Option<i64>,

    /// Actor learning rate
    #[arg(long)]
    pub lr_actor: Option<f64>,

    /// Critic learning rate
    #[arg(long)]
    pub lr_critic: Option<f64>,

    /// Discount factor
    #[arg(long)]
    pub gamma: Option<f64>,

    /// GAE lambda
    #[arg(long)]
    pub gae_lambda: Option<f64>,

    /// PPO clip range
    #[arg(long)]
    pub clip_epsilon: Option<f64>,

    /// Optimization epochs per update
    #[arg(long)]
    pub k_epochs: Option<usize>,

    /// Entropy bonus coefficient
    #[arg(long)]
    pub entropy_coef: Option<f64>,

    /// Normalize advantages over each batch
    #[arg(long)]
    pub use_adv_norm: Option<bool>,

    /// Normalize observations with running statistics
    #[arg(long)]
    pub use_state_norm: Option<bool>,

    /// Normalize rewards with running statistics
    #[arg(long)]
    pub use_reward_norm: Option<bool>,

    /// Scale rewards by the std of the discounted return
    #[arg(long)]
    pub use_reward_scaling: Option<bool>,

    /// Decay learning rates linearly to zero
    #[arg(long)]
    pub use_lr_decay: Option<bool>,

    /// Clip gradient norm
    #[arg(long)]
    pub use_grad_clip: Option<bool>,

    /// Orthogonal weight initialization
    #[arg(long)]
    pub use_orthogonal_init: Option<bool>,

    /// Adam epsilon 1e-5 instead of 1e-8
    #[arg(long)]
    pub set_adam_eps: Option<bool>,

    /// Explicit Adam epsilon; overrides --set-adam-eps
    #[arg(long)]
    pub adam_eps: Option<f64>,

    /// Tanh activations instead of ReLU
    #[arg(long)]
    pub use_tanh: Option<bool>,

    /// Fixed policy standard deviation (continuous only; learned if unset)
    #[arg(long)]
    pub fixed_std: Option<f64>,

    /// Directory for checkpoints; disabled if unset
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Resume from the checkpoint in --checkpoint-dir
    #[arg(long)]
    pub resume: bool,

    /// Append update and evaluation records to this JSONL file
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,

    /// Train on the first CUDA device if available
    #[arg(long)]
    pub cuda: bool,
}

impl TrainArgs {
    /// Resolve the configuration on top of benchmark `defaults`
    pub fn resolve(&self, defaults: PPOConfig) -> Result<PPOConfig> {
        let mut config = match &self.config {
            Some(path) => defaults.merge_json_file(path)?,
            None => defaults,
        };

        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field.clone() {
                    config.$field = value;
                })*
            };
        }
        overlay!(
            max_train_steps,
            evaluate_freq,
            evaluate_episodes,
            batch_size,
            mini_batch_size,
            hidden_width,
            lr_actor,
            lr_critic,
            gamma,
            gae_lambda,
            clip_epsilon,
            k_epochs,
            entropy_coef,
            use_adv_norm,
            use_state_norm,
            use_reward_norm,
            use_reward_scaling,
            use_lr_decay,
            use_grad_clip,
            use_orthogonal_init,
            set_adam_eps,
            use_tanh,
        );

        if self.adam_eps.is_some() {
            config.adam_eps = self.adam_eps;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(std) = self.fixed_std {
            config.std_mode = StdMode::Fixed(std);
        }
        if self.checkpoint_dir.is_some() {
            config.checkpoint_dir = self.checkpoint_dir.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

/// Install the global tracing subscriber (`RUST_LOG`, default `info`)
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = TrainArgs {
            batch_size: Some(512),
            use_state_norm: Some(true),
            seed: Some(7),
            fixed_std: Some(0.3),
            ..Default::default()
        };
        let config = args.resolve(PPOConfig::new().max_train_steps(1000)).unwrap();

        assert_eq!(config.batch_size, 512);
        assert!(config.use_state_norm);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.std_mode, StdMode::Fixed(0.3));
        assert_eq!(config.max_train_steps, 1000);
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        let args = TrainArgs {
            use_reward_norm: Some(true),
            use_reward_scaling: Some(true),
            ..Default::default()
        };
        assert!(args.resolve(PPOConfig::new()).is_err());
    }

    #[test]
    fn test_config_file_layers_over_defaults() {
        let path = std::env::temp_dir().join(format!("ppo_bench_cli_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"gamma": 0.9, "k_epochs": 4}"#).unwrap();

        let args = TrainArgs { config: Some(path.clone()), k_epochs: Some(6), ..Default::default() };
        let config = args.resolve(PPOConfig::new().max_train_steps(1000)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.gamma, 0.9);
        assert_eq!(config.k_epochs, 6);
        // Unlisted fields keep the benchmark defaults
        assert_eq!(config.max_train_steps, 1000);
    }

    #[test]
    fn test_adam_eps_flag() {
        let args = TrainArgs { adam_eps: Some(1e-6), ..Default::default() };
        let config = args.resolve(PPOConfig::new().set_adam_eps(true)).unwrap();
        assert_eq!(config.adam_eps, Some(1e-6));
        assert_eq!(config.adam_epsilon(), 1e-6);
    }
}
