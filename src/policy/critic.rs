//! Critic network: backbone plus scalar value head

use tch::{
    Device, Tensor,
    nn::{self, Module},
};

use crate::policy::{
    backbone::Backbone,
    mlp::{MlpBackbone, MlpConfig, linear_config},
};

/// State-value estimator `V(s)`
pub struct Critic<B: Backbone = MlpBackbone> {
    vs: nn::VarStore,
    backbone: B,
    value_head: nn::Linear,
}

impl Critic<MlpBackbone> {
    /// Create an MLP critic
    pub fn mlp(state_dim: i64, config: &MlpConfig, device: Device) -> Self {
        Self::with_backbone(
            nn::VarStore::new(device),
            |path| MlpBackbone::new(path, state_dim, config),
            config.use_orthogonal_init,
        )
    }
}

impl<B: Backbone> Critic<B> {
    /// Create a critic around any backbone
    pub fn with_backbone<F>(vs: nn::VarStore, build: F, orthogonal: bool) -> Self
    where
        F: FnOnce(&nn::Path) -> B,
    {
        let root = vs.root();
        let backbone = build(&(&root / "backbone"));
        let value_head =
            nn::linear(&root / "value", backbone.latent_dim(), 1, linear_config(1.0, orthogonal));

        Self { vs, backbone, value_head }
    }

    /// Value estimates for a `[batch, state_dim]` state batch, shape `[batch]`
    pub fn value(&self, states: &Tensor) -> Tensor {
        self.value_head.forward(&self.backbone.encode(states)).squeeze_dim(-1)
    }

    /// Get the device this critic is on (CPU or CUDA)
    pub fn device(&self) -> Device {
        self.vs.device()
    }

    /// Get reference to variable store
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    /// Get mutable reference to variable store
    pub fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }

    /// Feature backbone
    pub fn backbone(&self) -> &B {
        &self.backbone
    }

    /// Mutable access to the backbone for episode-boundary resets
    pub fn backbone_mut(&mut self) -> &mut B {
        &mut self.backbone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    #[test]
    fn test_value_shape() {
        let critic = Critic::mlp(4, &MlpConfig::default(), Device::Cpu);
        let states = Tensor::randn([8, 4], (Kind::Float, Device::Cpu));

        assert_eq!(critic.value(&states).size(), vec![8]);
    }

    #[test]
    fn test_save_load() {
        let critic = Critic::mlp(4, &MlpConfig::default(), Device::Cpu);
        let path = std::env::temp_dir().join("ppo_bench_test_critic.ot");
        let states = Tensor::randn([8, 4], (Kind::Float, Device::Cpu));
        let before = critic.value(&states);

        critic.var_store().save(&path).unwrap();

        let mut restored = Critic::mlp(4, &MlpConfig::default(), Device::Cpu);
        restored.var_store_mut().load(&path).unwrap();
        let after = restored.value(&states);

        let diff = (&before - &after).abs().max().double_value(&[]);
        assert!(diff < 1e-6);

        std::fs::remove_file(path).ok();
    }
}
