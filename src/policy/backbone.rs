//! Feature-extraction backbone seam
//!
//! Actors and critics are composed from a backbone plus a fixed output head.
//! Swapping the backbone (feedforward, recurrent, convolutional) changes how
//! states are encoded without touching the distribution or value logic.

use tch::Tensor;

/// Encodes a batch of states into a latent feature batch
pub trait Backbone {
    /// Map `[batch, input_dim]` states to `[batch, latent_dim]` features
    fn encode(&self, states: &Tensor) -> Tensor;

    /// Width of the latent features produced by [`Backbone::encode`]
    fn latent_dim(&self) -> i64;

    /// Clear any per-episode hidden state
    ///
    /// Called by the training loop at every episode boundary. Stateless
    /// backbones keep the default no-op.
    fn reset_state(&mut self) {}

    /// Copy of the per-episode hidden state
    ///
    /// Lets evaluation episodes run in the middle of a training episode
    /// without losing its context.
    fn save_state(&self) -> Vec<Tensor> {
        Vec::new()
    }

    /// Reinstate state returned by [`Backbone::save_state`]
    fn restore_state(&mut self, _state: Vec<Tensor>) {}
}
