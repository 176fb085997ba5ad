//! Loss computation functions for PPO
//!
//! This module contains the clipped surrogate policy loss, the critic's
//! value loss, and minibatch index generation.

use rand::Rng;
use rand::seq::SliceRandom;
use tch::{Kind, Tensor};

/// Compute PPO clipped surrogate loss with entropy bonus
///
/// ```text
/// r    = exp(log_prob - old_log_prob)
/// loss = mean(-min(r * A, clip(r, 1 - eps, 1 + eps) * A) - c_ent * H)
/// ```
///
/// Returns (policy_loss, clip_fraction, approx_kl)
///
/// # Arguments
/// * `log_probs` - Log probabilities of actions under current policy
/// * `old_log_probs` - Log probabilities of actions under the sampling policy
/// * `advantages` - Computed advantages
/// * `entropy` - Per-sample entropy of the current policy
/// * `clip_epsilon` - PPO clipping parameter
/// * `entropy_coef` - Entropy bonus coefficient
pub fn compute_policy_loss(
    log_probs: &Tensor,
    old_log_probs: &Tensor,
    advantages: &Tensor,
    entropy: &Tensor,
    clip_epsilon: f64,
    entropy_coef: f64,
) -> (Tensor, f64, f64) {
    // Compute probability ratio
    let log_ratio = log_probs - old_log_probs;
    let ratio = log_ratio.exp();

    // Compute clipped surrogate objective
    let surrogate = &ratio * advantages;
    let clipped = ratio.clamp(1.0 - clip_epsilon, 1.0 + clip_epsilon) * advantages;
    let policy_loss =
        (-surrogate.minimum(&clipped) - entropy * entropy_coef).mean(Kind::Float);

    let (clip_fraction, approx_kl) = tch::no_grad(|| {
        let clip_fraction = (&ratio - 1.0)
            .abs()
            .gt(clip_epsilon)
            .to_kind(Kind::Float)
            .mean(Kind::Float)
            .double_value(&[]);

        // k3 estimator: E[(r - 1) - log r]
        let approx_kl =
            ((&ratio - 1.0) - &log_ratio).mean(Kind::Float).double_value(&[]);

        (clip_fraction, approx_kl)
    });

    (policy_loss, clip_fraction, approx_kl)
}

/// Compute the critic's mean squared error
///
/// Returns (value_loss, explained_variance)
///
/// # Arguments
/// * `values` - Predicted values under current value function
/// * `returns` - Computed returns (targets)
pub fn compute_value_loss(values: &Tensor, returns: &Tensor) -> (Tensor, f64) {
    let value_loss = (values - returns).square().mean(Kind::Float);

    // Compute explained variance
    let explained_var = tch::no_grad(|| {
        let var_returns = returns.var(false).double_value(&[]);
        if var_returns == 0.0 {
            1.0 // Perfect prediction if no variance in returns
        } else {
            1.0 - (returns - values).var(false).double_value(&[]) / var_returns
        }
    });

    (value_loss, explained_var)
}

/// Generate minibatch indices for PPO training
///
/// Shuffles `0..buffer_size` and splits it into chunks of `mini_batch_size`.
/// The final chunk is kept even when it is smaller.
///
/// # Arguments
/// * `buffer_size` - Total number of samples in buffer
/// * `mini_batch_size` - Desired size of each minibatch
/// * `rng` - Source of the shuffle
///
/// # Returns
/// Vector of vectors, where each inner vector contains indices for one minibatch
pub fn generate_minibatch_indices<R: Rng + ?Sized>(
    buffer_size: usize,
    mini_batch_size: usize,
    rng: &mut R,
) -> Vec<Vec<i64>> {
    let mut indices: Vec<i64> = (0..buffer_size as i64).collect();
    indices.shuffle(rng);

    indices.chunks(mini_batch_size.max(1)).map(|chunk| chunk.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};
    use tch::Device;

    fn leaf(values: &[f32]) -> Tensor {
        Tensor::from_slice(values).set_requires_grad(true)
    }

    #[test]
    fn test_clipped_branch_value_and_zero_gradient() {
        // r = 2 > 1 + eps with positive advantage: loss is the clipped branch
        let log_probs = leaf(&[2.0_f32.ln()]);
        let old = Tensor::from_slice(&[0.0_f32]);
        let adv = Tensor::from_slice(&[3.0_f32]);
        let entropy = Tensor::zeros([1], (Kind::Float, Device::Cpu));

        let (loss, clip_fraction, _) =
            compute_policy_loss(&log_probs, &old, &adv, &entropy, 0.2, 0.0);

        assert!((loss.double_value(&[]) + 1.2 * 3.0).abs() < 1e-5);
        assert_eq!(clip_fraction, 1.0);

        loss.backward();
        let grad = log_probs.grad().abs().sum(Kind::Float).double_value(&[]);
        assert_eq!(grad, 0.0);
    }

    #[test]
    fn test_clipped_negative_advantage_zero_gradient() {
        // r = 0.5 < 1 - eps with negative advantage is also clipped
        let log_probs = leaf(&[0.5_f32.ln()]);
        let old = Tensor::from_slice(&[0.0_f32]);
        let adv = Tensor::from_slice(&[-1.0_f32]);
        let entropy = Tensor::zeros([1], (Kind::Float, Device::Cpu));

        let (loss, _, _) = compute_policy_loss(&log_probs, &old, &adv, &entropy, 0.2, 0.0);
        assert!((loss.double_value(&[]) - 0.8).abs() < 1e-5);

        loss.backward();
        assert_eq!(log_probs.grad().abs().sum(Kind::Float).double_value(&[]), 0.0);
    }

    #[test]
    fn test_unclipped_ratio_has_gradient() {
        let log_probs = leaf(&[0.05_f32, -0.05]);
        let old = Tensor::from_slice(&[0.0_f32, 0.0]);
        let adv = Tensor::from_slice(&[1.0_f32, 1.0]);
        let entropy = Tensor::zeros([2], (Kind::Float, Device::Cpu));

        let (loss, clip_fraction, approx_kl) =
            compute_policy_loss(&log_probs, &old, &adv, &entropy, 0.2, 0.0);

        let expected = -(0.05_f64.exp() + (-0.05_f64).exp()) / 2.0;
        assert!((loss.double_value(&[]) - expected).abs() < 1e-5);
        assert_eq!(clip_fraction, 0.0);
        assert!(approx_kl >= 0.0);

        loss.backward();
        assert!(log_probs.grad().abs().sum(Kind::Float).double_value(&[]) > 0.0);
    }

    #[test]
    fn test_entropy_bonus_lowers_loss() {
        let log_probs = Tensor::from_slice(&[0.0_f32]);
        let old = Tensor::from_slice(&[0.0_f32]);
        let adv = Tensor::from_slice(&[0.0_f32]);
        let entropy = Tensor::from_slice(&[0.7_f32]);

        let (loss, _, approx_kl) =
            compute_policy_loss(&log_probs, &old, &adv, &entropy, 0.2, 0.01);

        assert!((loss.double_value(&[]) + 0.007).abs() < 1e-6);
        assert!(approx_kl.abs() < 1e-9);
    }

    #[test]
    fn test_value_loss() {
        let values = Tensor::from_slice(&[1.0_f32, 2.0, 3.0]);
        let returns = Tensor::from_slice(&[1.0_f32, 4.0, 3.0]);

        let (loss, _) = compute_value_loss(&values, &returns);
        assert!((loss.double_value(&[]) - 4.0 / 3.0).abs() < 1e-6);

        let (_, explained) = compute_value_loss(&returns, &returns);
        assert!((explained - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_minibatch_indices_cover_buffer() {
        let mut rng = StdRng::seed_from_u64(0);
        let batches = generate_minibatch_indices(10, 4, &mut rng);

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].len(), 2);

        let mut all: Vec<i64> = batches.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }
}
