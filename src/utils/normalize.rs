//! Observation and reward normalization for stable RL training
//!
//! This module provides running mean and standard deviation tracking plus the
//! two reward transforms used during PPO training:
//!
//! - [`Normalizer`]: `(x - mean) / (std + eps)` with statistics that persist
//!   for the whole run. Used for states and, optionally, rewards.
//! - [`RewardScaler`]: divides each reward by the running std of the
//!   discounted return `R = gamma * R + r`. The return accumulator is reset
//!   at every episode start, the statistics are not.

/// Default epsilon added to the standard deviation before dividing.
pub const NORM_EPSILON: f64 = 1e-8;

/// Running mean and variance over fixed-size vectors
///
/// Tracks mean and variance using Welford's online algorithm for numerical
/// stability. Each call to [`RunningMeanStd::push`] incorporates exactly one
/// sample.
#[derive(Debug, Clone)]
pub struct RunningMeanStd {
    mean: Vec<f64>,
    /// Sum of squared deviations from the current mean
    m2: Vec<f64>,
    count: u64,
}

impl RunningMeanStd {
    /// Create empty statistics for vectors of length `size`
    pub fn new(size: usize) -> Self {
        Self { mean: vec![0.0; size], m2: vec![0.0; size], count: 0 }
    }

    /// Incorporate one sample
    ///
    /// ```text
    /// n     <- n + 1
    /// delta <- x - mean
    /// mean  <- mean + delta / n
    /// M2    <- M2 + delta * (x - mean)
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `x.len()` differs from the tracked dimension.
    pub fn push(&mut self, x: &[f32]) {
        assert_eq!(x.len(), self.mean.len(), "Sample dimension mismatch");

        self.count += 1;
        let n = self.count as f64;

        for ((mean, m2), &val) in self.mean.iter_mut().zip(self.m2.iter_mut()).zip(x) {
            let val = val as f64;
            let delta = val - *mean;
            *mean += delta / n;
            *m2 += delta * (val - *mean);
        }
    }

    /// Current mean
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Population variance; zero until at least one sample has been seen
    pub fn var(&self) -> Vec<f64> {
        if self.count == 0 {
            return vec![0.0; self.m2.len()];
        }
        let n = self.count as f64;
        self.m2.iter().map(|m2| m2 / n).collect()
    }

    /// Population standard deviation
    ///
    /// With exactly one sample the magnitude of that sample stands in for the
    /// std, so the first scaled reward is bounded instead of `r / eps`.
    pub fn std(&self) -> Vec<f64> {
        if self.count == 1 {
            return self.mean.iter().map(|m| m.abs()).collect();
        }
        self.var().into_iter().map(f64::sqrt).collect()
    }

    /// Number of samples seen
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Dimension of the tracked vectors
    pub fn dim(&self) -> usize {
        self.mean.len()
    }
}

/// Running normalizer for observation or reward streams
///
/// With `update = true` the input is first folded into the statistics and
/// then normalized with the post-update mean and std. With `update = false`
/// the statistics are only read, which is what evaluation rollouts use so
/// that they never leak into training statistics.
///
/// Before any sample has been seen the input is returned unchanged.
#[derive(Debug, Clone)]
pub struct Normalizer {
    stats: RunningMeanStd,
    epsilon: f64,
}

impl Normalizer {
    /// Create a normalizer for vectors of length `size`
    pub fn new(size: usize) -> Self {
        Self::with_epsilon(size, NORM_EPSILON)
    }

    /// Create a normalizer with a custom epsilon
    pub fn with_epsilon(size: usize, epsilon: f64) -> Self {
        Self { stats: RunningMeanStd::new(size), epsilon }
    }

    /// Normalize `x`, optionally updating the running statistics first
    pub fn apply(&mut self, x: &[f32], update: bool) -> Vec<f32> {
        if update {
            self.stats.push(x);
        }
        self.normalize(x)
    }

    /// Normalize `x` with the current statistics without mutating them
    pub fn normalize(&self, x: &[f32]) -> Vec<f32> {
        if self.stats.count() == 0 {
            return x.to_vec();
        }

        x.iter()
            .zip(self.stats.mean())
            .zip(self.stats.std())
            .map(|((&val, &mean), std)| ((val as f64 - mean) / (std + self.epsilon)) as f32)
            .collect()
    }

    /// Underlying running statistics
    pub fn stats(&self) -> &RunningMeanStd {
        &self.stats
    }
}

/// Discounted-return reward scaling
///
/// Keeps the per-episode discounted return `R` and a running std of `R`
/// across all steps. Rewards are divided by that std; the mean is not
/// subtracted so the sign of the reward is preserved.
#[derive(Debug, Clone)]
pub struct RewardScaler {
    stats: RunningMeanStd,
    ret: f64,
    epsilon: f64,
}

impl RewardScaler {
    /// Create a reward scaler with the default epsilon
    pub fn new() -> Self {
        Self { stats: RunningMeanStd::new(1), ret: 0.0, epsilon: NORM_EPSILON }
    }

    /// Scale one reward
    ///
    /// Updates `R <- gamma * R + reward`, folds `R` into the running
    /// statistics, and returns `reward / (std(R) + eps)`.
    pub fn scale(&mut self, reward: f32, gamma: f64) -> f32 {
        self.ret = gamma * self.ret + reward as f64;
        self.stats.push(&[self.ret as f32]);

        let std = self.stats.std()[0];
        (reward as f64 / (std + self.epsilon)) as f32
    }

    /// Zero the per-episode return accumulator; statistics persist
    pub fn reset(&mut self) {
        self.ret = 0.0;
    }

    /// Current discounted return accumulator
    pub fn running_return(&self) -> f64 {
        self.ret
    }

    /// Running statistics of the discounted return
    pub fn stats(&self) -> &RunningMeanStd {
        &self.stats
    }
}

impl Default for RewardScaler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_mean_std_incremental() {
        let mut stats = RunningMeanStd::new(1);

        stats.push(&[1.0]);
        stats.push(&[2.0]);
        stats.push(&[3.0]);

        assert_eq!(stats.count(), 3);
        assert!((stats.mean()[0] - 2.0).abs() < 1e-9);
        // Population variance of {1, 2, 3} is 2/3
        assert!((stats.var()[0] - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_running_mean_std_per_dimension() {
        let mut stats = RunningMeanStd::new(2);
        for x in [[1.0, 2.0], [2.0, 4.0], [3.0, 6.0]] {
            stats.push(&x);
        }

        assert!((stats.mean()[0] - 2.0).abs() < 1e-9);
        assert!((stats.mean()[1] - 4.0).abs() < 1e-9);
        assert!(stats.var()[1] > stats.var()[0]);
    }

    #[test]
    fn test_constant_input_normalizes_to_zero() {
        let mut norm = Normalizer::new(3);
        let v = [0.5_f32, -2.0, 7.0];

        for _ in 0..1000 {
            norm.apply(&v, true);
        }

        let out = norm.apply(&v, false);
        for val in out {
            assert!(val.abs() < 1e-6, "expected ~0, got {}", val);
        }
    }

    #[test]
    fn test_first_sample_does_not_divide_by_zero() {
        let mut norm = Normalizer::new(2);
        let out = norm.apply(&[3.0, -1.0], true);

        // A single sample has zero variance; output must be finite
        assert!(out.iter().all(|v| v.is_finite()));
        assert_eq!(out, vec![0.0, 0.0]);
    }

    #[test]
    fn test_empty_normalizer_is_identity() {
        let mut norm = Normalizer::new(2);
        let out = norm.apply(&[3.0, -1.0], false);

        assert_eq!(out, vec![3.0, -1.0]);
        assert_eq!(norm.stats().count(), 0);
    }

    #[test]
    fn test_apply_without_update_is_read_only() {
        let mut norm = Normalizer::new(1);
        norm.apply(&[1.0], true);
        norm.apply(&[3.0], true);

        let before = norm.stats().clone();
        norm.apply(&[100.0], false);

        assert_eq!(norm.stats().count(), before.count());
        assert_eq!(norm.stats().mean(), before.mean());
    }

    #[test]
    fn test_apply_uses_post_update_statistics() {
        let mut norm = Normalizer::new(1);
        norm.apply(&[0.0], true);
        let out = norm.apply(&[2.0], true);

        // mean = 1, std = 1 after both samples
        assert!((out[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_reward_scaler_reset_keeps_statistics() {
        let mut scaler = RewardScaler::new();
        for _ in 0..10 {
            scaler.scale(1.0, 0.99);
        }
        assert!(scaler.running_return() > 0.0);

        let count = scaler.stats().count();
        scaler.reset();

        assert_eq!(scaler.running_return(), 0.0);
        assert_eq!(scaler.stats().count(), count);
    }

    #[test]
    fn test_reward_scaler_divides_by_return_std() {
        let mut scaler = RewardScaler::new();
        scaler.scale(1.0, 1.0);
        let scaled = scaler.scale(1.0, 1.0);

        // Returns seen: 1, 2 -> std 0.5
        assert!((scaled - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_reward_scaler_first_reward_is_bounded() {
        let mut scaler = RewardScaler::new();
        let scaled = scaler.scale(5.0, 0.99);

        assert!((scaled - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_reward_scaler_preserves_sign() {
        let mut scaler = RewardScaler::new();
        scaler.scale(1.0, 0.99);
        scaler.scale(2.0, 0.99);
        let scaled = scaler.scale(-1.0, 0.99);

        assert!(scaled < 0.0);
    }
}
