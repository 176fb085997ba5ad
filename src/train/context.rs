//! Explicit execution context for agent operations

use tch::Device;

/// Device placement passed to `choose_action`, `evaluate` and `update`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    /// Device that state tensors are placed on; must match the device the
    /// agent's networks were created on
    pub device: Device,
}

impl RunContext {
    /// Context for an explicit device
    pub fn new(device: Device) -> Self {
        Self { device }
    }

    /// CPU context
    pub fn cpu() -> Self {
        Self::new(Device::Cpu)
    }

    /// First CUDA device if present, otherwise CPU
    pub fn cuda_if_available() -> Self {
        Self::new(Device::cuda_if_available())
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::cpu()
    }
}
