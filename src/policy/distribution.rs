//! Action distributions produced by the policy head
//!
//! Samples are always returned in the distribution's own variable: category
//! indices for [`ActionDistribution::Categorical`], and the pre-squash
//! Gaussian sample `u` for [`ActionDistribution::Gaussian`]. Bounded
//! policies map `u` to `tanh(u)` only when building the environment action,
//! so stored samples and recomputed log-probabilities always agree.

use std::f64::consts::PI;

use tch::{Kind, Tensor};

/// Epsilon inside the tanh Jacobian correction `log(1 - tanh(u)^2 + eps)`
pub const TANH_EPSILON: f64 = 1e-6;

/// Policy distribution over a batch of states
#[derive(Debug)]
pub enum ActionDistribution {
    /// Categorical over `[batch, num_actions]` logits
    Categorical { logits: Tensor },

    /// Diagonal Gaussian with `[batch, action_dim]` mean and std, optionally
    /// squashed through tanh
    Gaussian { mean: Tensor, std: Tensor, bounded: bool },
}

impl ActionDistribution {
    /// Draw one sample per batch row
    ///
    /// Categorical samples are `[batch]` int64 indices; Gaussian samples are
    /// `[batch, action_dim]` pre-squash values.
    pub fn sample(&self) -> Tensor {
        tch::no_grad(|| match self {
            ActionDistribution::Categorical { logits } => {
                logits.softmax(-1, Kind::Float).multinomial(1, true).squeeze_dim(-1)
            }
            ActionDistribution::Gaussian { mean, std, .. } => {
                mean + Tensor::randn_like(mean) * std
            }
        })
    }

    /// Deterministic action: most likely category, or the Gaussian mean
    pub fn mode(&self) -> Tensor {
        match self {
            ActionDistribution::Categorical { logits } => logits.argmax(-1, false),
            ActionDistribution::Gaussian { mean, .. } => mean.shallow_clone(),
        }
    }

    /// Log-probability of `actions`, one value per batch row
    ///
    /// Gaussian log-probabilities are summed over action dimensions. When
    /// bounded, `actions` are pre-squash samples and the density is
    /// corrected by the tanh Jacobian.
    pub fn log_prob(&self, actions: &Tensor) -> Tensor {
        match self {
            ActionDistribution::Categorical { logits } => logits
                .log_softmax(-1, Kind::Float)
                .gather(-1, &actions.to_kind(Kind::Int64).unsqueeze(-1), false)
                .squeeze_dim(-1),
            ActionDistribution::Gaussian { mean, std, bounded } => {
                let var = std.square();
                let mut log_prob: Tensor =
                    -(actions - mean).square() / (2.0 * var) - std.log() - 0.5 * (2.0 * PI).ln();
                if *bounded {
                    log_prob = log_prob - (1.0_f64 - actions.tanh().square() + TANH_EPSILON).log();
                }
                log_prob.sum_dim_intlist(-1, false, Kind::Float)
            }
        }
    }

    /// Entropy per batch row
    ///
    /// For bounded Gaussians this is the entropy of the pre-squash
    /// distribution.
    pub fn entropy(&self) -> Tensor {
        match self {
            ActionDistribution::Categorical { logits } => {
                let log_probs = logits.log_softmax(-1, Kind::Float);
                -(log_probs.exp() * log_probs).sum_dim_intlist(-1, false, Kind::Float)
            }
            ActionDistribution::Gaussian { std, .. } => {
                (std.log() + 0.5 + 0.5 * (2.0 * PI).ln()).sum_dim_intlist(-1, false, Kind::Float)
            }
        }
    }

    /// Map a sample or mode to the policy's action range
    ///
    /// Identity for categorical and unbounded Gaussian policies, `tanh` for
    /// bounded ones.
    pub fn squash(&self, actions: &Tensor) -> Tensor {
        match self {
            ActionDistribution::Gaussian { bounded: true, .. } => actions.tanh(),
            _ => actions.shallow_clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    fn gaussian(mean: &[f32], std: &[f32], bounded: bool) -> ActionDistribution {
        let n = mean.len() as i64;
        ActionDistribution::Gaussian {
            mean: Tensor::from_slice(mean).view([1, n]),
            std: Tensor::from_slice(std).view([1, n]),
            bounded,
        }
    }

    #[test]
    fn test_uniform_categorical_log_prob() {
        let dist = ActionDistribution::Categorical {
            logits: Tensor::zeros([256, 2], (Kind::Float, Device::Cpu)),
        };

        let actions = dist.sample();
        let log_probs: Vec<f32> = Vec::try_from(dist.log_prob(&actions)).unwrap();

        for lp in log_probs {
            assert!((lp - 0.5_f32.ln()).abs() < 1e-5);
        }
    }

    #[test]
    fn test_categorical_samples_in_range() {
        let logits = Tensor::from_slice(&[1.0f32, 2.0, 10.0]).view([1, 3]).repeat([16, 1]);
        let dist = ActionDistribution::Categorical { logits };

        let samples: Vec<i64> = Vec::try_from(dist.sample()).unwrap();
        assert!(samples.iter().all(|&a| (0..3).contains(&a)));
    }

    #[test]
    fn test_categorical_mode_and_entropy() {
        let logits = Tensor::from_slice(&[0.1f32, 3.0, -1.0]).view([1, 3]);
        let dist = ActionDistribution::Categorical { logits };
        assert_eq!(dist.mode().int64_value(&[0]), 1);

        let uniform = ActionDistribution::Categorical {
            logits: Tensor::zeros([1, 4], (Kind::Float, Device::Cpu)),
        };
        let entropy = uniform.entropy().double_value(&[0]);
        assert!((entropy - 4.0_f64.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_gaussian_log_prob_standard_normal() {
        let dist = gaussian(&[0.0], &[1.0], false);
        let x = Tensor::zeros([1, 1], (Kind::Float, Device::Cpu));

        let lp = dist.log_prob(&x).double_value(&[0]);
        assert!((lp + 0.5 * (2.0 * PI).ln()).abs() < 1e-5);
    }

    #[test]
    fn test_gaussian_log_prob_sums_dimensions() {
        let dist = gaussian(&[0.0, 0.0], &[1.0, 1.0], false);
        let x = Tensor::zeros([1, 2], (Kind::Float, Device::Cpu));

        let lp = dist.log_prob(&x).double_value(&[0]);
        assert!((lp + (2.0 * PI).ln()).abs() < 1e-5);
    }

    #[test]
    fn test_bounded_log_prob_tanh_correction() {
        let u = 0.8_f64;
        let unbounded = gaussian(&[0.2], &[0.5], false);
        let bounded = gaussian(&[0.2], &[0.5], true);
        let x = Tensor::from_slice(&[u as f32]).view([1, 1]);

        let lp_raw = unbounded.log_prob(&x).double_value(&[0]);
        let lp_sq = bounded.log_prob(&x).double_value(&[0]);

        let correction = (1.0 - u.tanh().powi(2) + TANH_EPSILON).ln();
        assert!((lp_sq - (lp_raw - correction)).abs() < 1e-4);
        // The squash compresses density, so the corrected log-prob is larger
        assert!(lp_sq > lp_raw);
    }

    #[test]
    fn test_bounded_squash_and_mode() {
        let dist = gaussian(&[3.0, -3.0], &[0.1, 0.1], true);
        let action = dist.squash(&dist.mode());
        let values: Vec<f32> = Vec::try_from(action.view([-1])).unwrap();

        assert!((values[0] - 3.0_f32.tanh()).abs() < 1e-6);
        assert!(values.iter().all(|v| v.abs() < 1.0));
    }

    #[test]
    fn test_gaussian_entropy() {
        let dist = gaussian(&[0.0, 5.0], &[1.0, 2.0], false);
        let expected = 2.0 * (0.5 + 0.5 * (2.0 * PI).ln()) + 2.0_f64.ln();

        assert!((dist.entropy().double_value(&[0]) - expected).abs() < 1e-5);
    }
}
