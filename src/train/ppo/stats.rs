//! Training statistics for PPO
//!
//! This module defines structures for tracking and aggregating
//! training metrics during a PPO update.

use std::ops::AddAssign;

use serde::Serialize;

/// Metrics from a single minibatch gradient step
#[derive(Debug, Clone, Default)]
pub struct MinibatchStats {
    /// Actor loss (clipped surrogate minus entropy bonus)
    pub actor_loss: f64,

    /// Critic mean squared error
    pub critic_loss: f64,

    /// Mean policy entropy
    pub entropy: f64,

    /// Fraction of samples whose ratio fell outside the clip range
    pub clip_fraction: f64,

    /// Approximate KL divergence between sampling and current policy
    pub approx_kl: f64,

    /// Explained variance of the critic's predictions
    pub explained_var: f64,

    /// Number of gradient steps summed into this record
    pub num_updates: usize,
}

impl MinibatchStats {
    /// Create zero-initialized statistics
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Add another statistics instance to this one
    pub fn add(&mut self, other: &MinibatchStats) {
        self.actor_loss += other.actor_loss;
        self.critic_loss += other.critic_loss;
        self.entropy += other.entropy;
        self.clip_fraction += other.clip_fraction;
        self.approx_kl += other.approx_kl;
        self.explained_var += other.explained_var;
        self.num_updates += other.num_updates;
    }

    /// Compute average statistics across multiple updates
    pub fn average(&self) -> Self {
        let scale = self.num_updates as f64;
        if scale == 0.0 {
            return Self::zeros();
        }

        Self {
            actor_loss: self.actor_loss / scale,
            critic_loss: self.critic_loss / scale,
            entropy: self.entropy / scale,
            clip_fraction: self.clip_fraction / scale,
            approx_kl: self.approx_kl / scale,
            explained_var: self.explained_var / scale,
            num_updates: 1,
        }
    }
}

impl AddAssign<&MinibatchStats> for MinibatchStats {
    fn add_assign(&mut self, other: &MinibatchStats) {
        self.add(other);
    }
}

/// Summary of one PPO update
///
/// `actor_loss` and `critic_loss` are the scalars of the last minibatch of
/// the last epoch. The remaining metrics are averaged over every minibatch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateStats {
    /// Final actor loss
    pub actor_loss: f64,

    /// Final critic loss
    pub critic_loss: f64,

    /// Mean policy entropy
    pub entropy: f64,

    /// Mean approximate KL divergence
    pub approx_kl: f64,

    /// Mean clip fraction
    pub clip_fraction: f64,

    /// Mean explained variance of the critic
    pub explained_var: f64,

    /// Actor learning rate after any decay
    pub lr_actor: f64,

    /// Critic learning rate after any decay
    pub lr_critic: f64,

    /// Gradient steps taken
    pub num_minibatches: usize,
}

impl UpdateStats {
    /// Combine the last minibatch with the running sum of all minibatches
    pub fn from_minibatches(last: &MinibatchStats, sum: &MinibatchStats) -> Self {
        let avg = sum.average();
        Self {
            actor_loss: last.actor_loss,
            critic_loss: last.critic_loss,
            entropy: avg.entropy,
            approx_kl: avg.approx_kl,
            clip_fraction: avg.clip_fraction,
            explained_var: avg.explained_var,
            lr_actor: 0.0,
            lr_critic: 0.0,
            num_minibatches: sum.num_updates,
        }
    }

    /// The `(actor_loss, critic_loss)` pair reported to loggers
    pub fn losses(&self) -> (f64, f64) {
        (self.actor_loss, self.critic_loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(actor_loss: f64, entropy: f64) -> MinibatchStats {
        MinibatchStats { actor_loss, critic_loss: 2.0 * actor_loss, entropy, num_updates: 1, ..Default::default() }
    }

    #[test]
    fn test_average() {
        let mut sum = MinibatchStats::zeros();
        sum += &step(1.0, 0.5);
        sum += &step(3.0, 0.7);

        let avg = sum.average();
        assert_eq!(avg.actor_loss, 2.0);
        assert!((avg.entropy - 0.6).abs() < 1e-12);
        assert_eq!(avg.num_updates, 1);
    }

    #[test]
    fn test_average_of_nothing_is_zero() {
        let avg = MinibatchStats::zeros().average();
        assert_eq!(avg.actor_loss, 0.0);
        assert_eq!(avg.num_updates, 0);
    }

    #[test]
    fn test_update_stats_keeps_final_losses() {
        let mut sum = MinibatchStats::zeros();
        let first = step(1.0, 0.5);
        let last = step(-0.25, 0.3);
        sum += &first;
        sum += &last;

        let stats = UpdateStats::from_minibatches(&last, &sum);
        assert_eq!(stats.losses(), (-0.25, -0.5));
        assert!((stats.entropy - 0.4).abs() < 1e-12);
        assert_eq!(stats.num_minibatches, 2);
    }
}
