//! Generalized Advantage Estimation (GAE) computation
//!
//! GAE computes advantages as an exponentially weighted sum of TD residuals,
//! trading bias for variance through `lambda`.
//!
//! # Mathematical Formula
//! ```text
//! δ_t = r_t + γ * V(s_{t+1}) * (1 - dw_t) - V(s_t)
//! A_t = δ_t + γ * λ * (1 - done_t) * A_{t+1}
//! R_t = A_t + V(s_t)
//! ```
//!
//! `dw_t` removes the bootstrap term on true terminations only. `done_t`
//! stops the backward accumulation at every episode boundary, so a truncated
//! episode still bootstraps from `V(s_{t+1})` but never borrows advantage
//! from the episode that follows it in the buffer.

/// Epsilon added to the advantage std before dividing
pub const ADV_NORM_EPSILON: f32 = 1e-5;

/// Compute GAE advantages and value targets for one ordered rollout
///
/// All slices must have the same length; `next_values[t]` is `V(s_{t+1})`
/// for transition `t`.
///
/// # Returns
/// `(advantages, returns)` where `returns[t] = advantages[t] + values[t]`
pub fn compute_gae(
    rewards: &[f32],
    values: &[f32],
    next_values: &[f32],
    dw: &[bool],
    done: &[bool],
    gamma: f32,
    gae_lambda: f32,
) -> (Vec<f32>, Vec<f32>) {
    let n = rewards.len();
    debug_assert_eq!(values.len(), n);
    debug_assert_eq!(next_values.len(), n);
    debug_assert_eq!(dw.len(), n);
    debug_assert_eq!(done.len(), n);

    let mut advantages = vec![0.0; n];
    let mut gae = 0.0;

    // Backward iteration through the rollout
    for t in (0..n).rev() {
        let bootstrap = if dw[t] { 0.0 } else { gamma * next_values[t] };
        let delta = rewards[t] + bootstrap - values[t];

        let carry = if done[t] { 0.0 } else { gamma * gae_lambda * gae };
        gae = delta + carry;

        advantages[t] = gae;
    }

    let returns = advantages.iter().zip(values).map(|(a, v)| a + v).collect();
    (advantages, returns)
}

/// Normalize advantages across the entire batch to zero mean, unit std
///
/// Uses the sample (Bessel-corrected) standard deviation. Statistics are
/// always taken over the full batch, never per minibatch, so a singleton
/// minibatch cannot produce a zero std.
pub fn normalize_advantages(advantages: &mut [f32]) {
    let n = advantages.len();
    if n == 0 {
        return;
    }

    let mean = advantages.iter().sum::<f32>() / n as f32;
    let std = if n > 1 {
        let var = advantages.iter().map(|&a| (a - mean).powi(2)).sum::<f32>() / (n - 1) as f32;
        var.sqrt()
    } else {
        0.0
    };

    for a in advantages.iter_mut() {
        *a = (*a - mean) / (std + ADV_NORM_EPSILON);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_terminal_transition() {
        // dw=true: no bootstrap and nothing to accumulate
        let (adv, ret) = compute_gae(&[2.5], &[0.75], &[100.0], &[true], &[true], 0.99, 0.95);

        assert_eq!(adv, vec![2.5 - 0.75]);
        assert_eq!(ret, vec![2.5]);
    }

    #[test]
    fn test_monte_carlo_returns_with_unit_gamma_lambda() {
        // Rewards 1, 2, 3, 4; episode ends with a true termination
        let rewards = [1.0, 2.0, 3.0, 4.0];
        let values = [0.3, -1.2, 5.0, 0.7];
        let next_values = [-1.2, 5.0, 0.7, 9.9];
        let dw = [false, false, false, true];
        let done = [false, false, false, true];

        let (_, returns) = compute_gae(&rewards, &values, &next_values, &dw, &done, 1.0, 1.0);

        let expected = [10.0, 9.0, 7.0, 4.0];
        for (r, e) in returns.iter().zip(expected) {
            assert!((r - e).abs() < 1e-5, "expected {}, got {}", e, r);
        }
    }

    #[test]
    fn test_truncation_bootstraps_but_stops_accumulation() {
        // Episode 1 truncated at t=1, episode 2 at t=2..3
        let rewards = [1.0, 1.0, 5.0, 5.0];
        let values = [0.0, 0.0, 0.0, 0.0];
        let next_values = [0.0, 10.0, 0.0, 0.0];
        let dw = [false, false, false, false];
        let done = [false, true, false, false];

        let (adv, _) = compute_gae(&rewards, &values, &next_values, &dw, &done, 0.5, 1.0);

        // t=1: truncated, still bootstraps from V(s')=10 but ignores t=2
        assert!((adv[1] - (1.0 + 0.5 * 10.0)).abs() < 1e-6);
        // t=0 accumulates from t=1
        assert!((adv[0] - (1.0 + 0.5 * adv[1])).abs() < 1e-6);
        // Episode 2 is independent of episode 1
        assert!((adv[3] - 5.0).abs() < 1e-6);
        assert!((adv[2] - (5.0 + 0.5 * 5.0)).abs() < 1e-6);
    }

    #[test]
    fn test_gae_simple_episode() {
        // With gamma=1, gae_lambda=1, true termination at step 2:
        // Step 2: delta = 1 - 2 = -1, gae = -1
        // Step 1: delta = 1 + 2 - 2 = 1, gae = 1 + (-1) = 0
        // Step 0: delta = 1 + 2 - 2 = 1, gae = 1 + 0 = 1
        let (adv, _) = compute_gae(
            &[1.0, 1.0, 1.0],
            &[2.0, 2.0, 2.0],
            &[2.0, 2.0, 0.0],
            &[false, false, true],
            &[false, false, true],
            1.0,
            1.0,
        );

        assert!((adv[2] + 1.0).abs() < 1e-6);
        assert!(adv[1].abs() < 1e-6);
        assert!((adv[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_advantages() {
        let mut adv = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        normalize_advantages(&mut adv);

        let mean: f32 = adv.iter().sum::<f32>() / adv.len() as f32;
        let var: f32 = adv.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / 4.0;

        assert!(mean.abs() < 1e-5);
        assert!((var.sqrt() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_normalize_singleton_is_finite() {
        let mut adv = vec![3.0];
        normalize_advantages(&mut adv);
        assert_eq!(adv, vec![0.0]);
    }
}
