//! Multi-Layer Perceptron (MLP) backbone
//!
//! A stack of fully connected layers shared by the actor and critic
//! constructors. Each network owns its own backbone instance so actor and
//! critic parameters never alias.
//!
//! # Architecture
//!
//! ```text
//! Input (states)
//!         |
//!     [Dense(hidden)]
//!         |
//!    Tanh / ReLU
//!         |
//!     [Dense(hidden)]
//!         |
//!    Tanh / ReLU
//!         |
//!      Latent
//! ```

use serde::{Deserialize, Serialize};
use tch::{
    Tensor,
    nn::{self, Init, Module},
};

use crate::policy::backbone::Backbone;

/// Configuration for MLP backbone architecture
#[derive(Debug, Clone)]
pub struct MlpConfig {
    pub num_layers: usize,
    pub hidden_dim: i64,
    pub use_orthogonal_init: bool,
    pub activation: Activation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    ReLU,
    Tanh,
}

impl Activation {
    /// Orthogonal init gain for hidden layers feeding this activation
    pub fn gain(self) -> f64 {
        match self {
            Activation::ReLU => 2.0_f64.sqrt(),
            Activation::Tanh => 1.0,
        }
    }

    fn apply(self, x: &Tensor) -> Tensor {
        match self {
            Activation::ReLU => x.relu(),
            Activation::Tanh => x.tanh(),
        }
    }
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            num_layers: 2,
            hidden_dim: 64,
            use_orthogonal_init: true,
            activation: Activation::Tanh,
        }
    }
}

/// Linear layer config: orthogonal weights with `gain` and zero bias, or
/// the tch default initialization
pub fn linear_config(gain: f64, orthogonal: bool) -> nn::LinearConfig {
    if orthogonal {
        nn::LinearConfig {
            ws_init: Init::Orthogonal { gain },
            bs_init: Some(Init::Const(0.0)),
            bias: true,
        }
    } else {
        nn::LinearConfig::default()
    }
}

/// Feedforward backbone
#[derive(Debug)]
pub struct MlpBackbone {
    layers: nn::Sequential,
    latent_dim: i64,
}

impl MlpBackbone {
    /// Build the hidden layers under `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Variable-store path that will own the layer parameters
    /// * `input_dim` - State dimensionality
    /// * `config` - Architecture configuration
    pub fn new(path: &nn::Path, input_dim: i64, config: &MlpConfig) -> Self {
        let layer_config = linear_config(config.activation.gain(), config.use_orthogonal_init);
        let activation = config.activation;

        let mut layers = nn::seq();
        let mut in_dim = input_dim;
        for i in 0..config.num_layers.max(1) {
            layers = layers
                .add(nn::linear(
                    path / format!("fc{}", i + 1),
                    in_dim,
                    config.hidden_dim,
                    layer_config,
                ))
                .add_fn(move |x| activation.apply(x));
            in_dim = config.hidden_dim;
        }

        Self { layers, latent_dim: config.hidden_dim }
    }
}

impl Backbone for MlpBackbone {
    fn encode(&self, states: &Tensor) -> Tensor {
        self.layers.forward(states)
    }

    fn latent_dim(&self) -> i64 {
        self.latent_dim
    }
}
