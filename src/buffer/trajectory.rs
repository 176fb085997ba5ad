//! Trajectory buffer for on-policy PPO training
//!
//! Transitions are appended one at a time during rollout until the buffer
//! reaches its capacity (the PPO `batch_size`). The learner then drains the
//! whole buffer in insertion order, which resets it for the next rollout.

use anyhow::{Result, bail};

use crate::env::Action;

/// One environment transition
///
/// `dw` ("dead or win") marks a true terminal state with no next-state value.
/// `done` marks any episode end, including time-limit truncation, where the
/// next-state value is still bootstrapped but advantage accumulation stops.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// State the action was taken in
    pub state: Vec<f32>,

    /// Action as sampled from the policy (pre-squash for bounded actors)
    pub action: Action,

    /// Log probability of `action` under the sampling policy
    pub log_prob: f32,

    /// Reward after any reward normalization or scaling
    pub reward: f32,

    /// State reached after the action
    pub next_state: Vec<f32>,

    /// True termination: no bootstrap from `next_state`
    pub dw: bool,

    /// Episode ended for any reason
    pub done: bool,
}

/// Fixed-capacity, append-only transition store
///
/// # Example
///
/// ```rust
/// use ppo_bench::buffer::{TrajectoryBuffer, Transition};
/// use ppo_bench::env::Action;
///
/// let mut buffer = TrajectoryBuffer::new(2);
/// buffer
///     .store(Transition {
///         state: vec![0.0, 0.0],
///         action: Action::Discrete(1),
///         log_prob: -0.69,
///         reward: 1.0,
///         next_state: vec![0.1, 0.0],
///         dw: false,
///         done: false,
///     })
///     .unwrap();
///
/// let batch = buffer.drain();
/// assert_eq!(batch.len(), 1);
/// assert!(buffer.is_empty());
/// ```
#[derive(Debug)]
pub struct TrajectoryBuffer {
    capacity: usize,
    transitions: Vec<Transition>,
}

impl TrajectoryBuffer {
    /// Create an empty buffer holding at most `capacity` transitions
    pub fn new(capacity: usize) -> Self {
        Self { capacity, transitions: Vec::with_capacity(capacity) }
    }

    /// Append a transition
    ///
    /// Fails if the buffer is already full; the caller must drain first.
    pub fn store(&mut self, transition: Transition) -> Result<()> {
        if self.is_full() {
            bail!(
                "Trajectory buffer is full ({} transitions); drain before storing",
                self.capacity
            );
        }
        self.transitions.push(transition);
        Ok(())
    }

    /// Remove and return every stored transition in insertion order
    pub fn drain(&mut self) -> Vec<Transition> {
        std::mem::replace(&mut self.transitions, Vec::with_capacity(self.capacity))
    }

    /// Drain into column-major arrays ready for tensor conversion
    pub fn drain_batch(&mut self) -> TransitionBatch {
        TransitionBatch::from(self.drain())
    }

    /// Number of stored transitions
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Whether the next `store` would fail
    pub fn is_full(&self) -> bool {
        self.transitions.len() >= self.capacity
    }

    /// Maximum number of transitions
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A drained rollout laid out column by column
#[derive(Debug, Clone, Default)]
pub struct TransitionBatch {
    /// States: \[batch_size\]\[state_dim\]
    pub states: Vec<Vec<f32>>,

    /// Sampled actions: \[batch_size\]
    pub actions: Vec<Action>,

    /// Sampling log probabilities: \[batch_size\]
    pub log_probs: Vec<f32>,

    /// Rewards: \[batch_size\]
    pub rewards: Vec<f32>,

    /// Next states: \[batch_size\]\[state_dim\]
    pub next_states: Vec<Vec<f32>>,

    /// True-termination flags: \[batch_size\]
    pub dw: Vec<bool>,

    /// Episode-end flags: \[batch_size\]
    pub done: Vec<bool>,
}

impl TransitionBatch {
    /// Get batch size
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

impl From<Vec<Transition>> for TransitionBatch {
    fn from(transitions: Vec<Transition>) -> Self {
        let n = transitions.len();
        let mut batch = TransitionBatch {
            states: Vec::with_capacity(n),
            actions: Vec::with_capacity(n),
            log_probs: Vec::with_capacity(n),
            rewards: Vec::with_capacity(n),
            next_states: Vec::with_capacity(n),
            dw: Vec::with_capacity(n),
            done: Vec::with_capacity(n),
        };

        for t in transitions {
            batch.states.push(t.state);
            batch.actions.push(t.action);
            batch.log_probs.push(t.log_prob);
            batch.rewards.push(t.reward);
            batch.next_states.push(t.next_state);
            batch.dw.push(t.dw);
            batch.done.push(t.done);
        }

        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(i: usize) -> Transition {
        Transition {
            state: vec![i as f32, 0.0],
            action: Action::Discrete((i % 2) as i64),
            log_prob: -0.5,
            reward: i as f32,
            next_state: vec![i as f32 + 1.0, 0.0],
            dw: false,
            done: i % 5 == 4,
        }
    }

    #[test]
    fn test_buffer_creation() {
        let buffer = TrajectoryBuffer::new(64);
        assert_eq!(buffer.capacity(), 64);
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());
    }

    #[test]
    fn test_drain_returns_insertion_order() {
        let mut buffer = TrajectoryBuffer::new(10);
        let stored: Vec<Transition> = (0..7).map(transition).collect();

        for t in &stored {
            buffer.store(t.clone()).unwrap();
        }
        assert_eq!(buffer.len(), 7);

        let drained = buffer.drain();
        assert_eq!(drained, stored);
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn test_store_fails_when_full() {
        let mut buffer = TrajectoryBuffer::new(3);
        for i in 0..3 {
            buffer.store(transition(i)).unwrap();
        }

        assert!(buffer.is_full());
        assert!(buffer.store(transition(3)).is_err());
        assert_eq!(buffer.len(), 3, "Failed store must not change the count");
    }

    #[test]
    fn test_buffer_reusable_after_drain() {
        let mut buffer = TrajectoryBuffer::new(2);
        buffer.store(transition(0)).unwrap();
        buffer.store(transition(1)).unwrap();
        buffer.drain();

        buffer.store(transition(2)).unwrap();
        let drained = buffer.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].reward, 2.0);
    }

    #[test]
    fn test_drain_batch_columns() {
        let mut buffer = TrajectoryBuffer::new(8);
        for i in 0..5 {
            buffer.store(transition(i)).unwrap();
        }

        let batch = buffer.drain_batch();

        assert_eq!(batch.len(), 5);
        assert_eq!(batch.rewards, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(batch.done, vec![false, false, false, false, true]);
        assert_eq!(batch.next_states[2], vec![3.0, 0.0]);
        assert!(buffer.is_empty());
    }
}
