//! Adam optimizer with inspectable state
//!
//! Mirrors `torch.optim.Adam` (no weight decay, no amsgrad) over the
//! parameters of a single `VarStore`. Keeping the moment estimates on the
//! Rust side lets checkpoints capture the complete optimizer state, which
//! `tch::nn::Optimizer` does not expose.
//!
//! ```text
//! m_t = β1 * m_{t-1} + (1 - β1) * g
//! v_t = β2 * v_{t-1} + (1 - β2) * g²
//! θ  -= lr * (m_t / (1 - β1^t)) / (sqrt(v_t / (1 - β2^t)) + eps)
//! ```

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow, ensure};
use tch::{Device, Kind, Tensor, nn};

/// Adam over one variable store
#[derive(Debug)]
pub struct Adam {
    /// Parameters sorted by name
    params: Vec<(String, Tensor)>,
    exp_avg: Vec<Tensor>,
    exp_avg_sq: Vec<Tensor>,
    step: i64,
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
}

impl Adam {
    /// Create an optimizer for every variable in `vs`
    ///
    /// # Arguments
    ///
    /// * `vs` - Variable store holding the parameters
    /// * `lr` - Initial learning rate
    /// * `eps` - Denominator epsilon
    pub fn new(vs: &nn::VarStore, lr: f64, eps: f64) -> Self {
        let mut params: Vec<(String, Tensor)> = vs.variables().into_iter().collect();
        params.sort_by(|a, b| a.0.cmp(&b.0));

        let exp_avg = params.iter().map(|(_, p)| p.zeros_like()).collect();
        let exp_avg_sq = params.iter().map(|(_, p)| p.zeros_like()).collect();

        Self { params, exp_avg, exp_avg_sq, step: 0, lr, beta1: 0.9, beta2: 0.999, eps }
    }

    /// Zero the gradients of all managed parameters
    pub fn zero_grad(&mut self) {
        for (_, param) in self.params.iter_mut() {
            param.zero_grad();
        }
    }

    /// Global L2 norm of all gradients
    pub fn grad_norm(&self) -> f64 {
        let mut total = 0.0f64;
        for (_, param) in &self.params {
            let grad = param.grad();
            if grad.defined() {
                total += grad.pow_tensor_scalar(2.0).sum(Kind::Float).double_value(&[]);
            }
        }
        total.sqrt()
    }

    /// Rescale gradients so their global L2 norm is at most `max_norm`
    ///
    /// Returns the norm measured before clipping.
    pub fn clip_grad_norm(&mut self, max_norm: f64) -> Result<f64> {
        let norm = self.grad_norm();
        let clip_coef = max_norm / (norm + 1e-6);

        if clip_coef < 1.0 {
            for (name, param) in &self.params {
                let mut grad = param.grad();
                if grad.defined() {
                    grad.f_mul_scalar_(clip_coef)
                        .with_context(|| format!("Failed to clip gradient of {}", name))?;
                }
            }
        }

        Ok(norm)
    }

    /// Apply one Adam update using the current gradients
    ///
    /// Parameters without a gradient are left untouched.
    pub fn step(&mut self) {
        self.step += 1;
        let bias_correction1 = 1.0 - self.beta1.powi(self.step as i32);
        let bias_correction2 = 1.0 - self.beta2.powi(self.step as i32);
        let step_size = self.lr / bias_correction1;

        tch::no_grad(|| {
            for (((_, param), exp_avg), exp_avg_sq) in
                self.params.iter_mut().zip(&mut self.exp_avg).zip(&mut self.exp_avg_sq)
            {
                let grad = param.grad();
                if !grad.defined() {
                    continue;
                }

                *exp_avg = &*exp_avg * self.beta1 + &grad * (1.0 - self.beta1);
                *exp_avg_sq = &*exp_avg_sq * self.beta2 + grad.square() * (1.0 - self.beta2);

                let denom = (&*exp_avg_sq / bias_correction2).sqrt() + self.eps;
                let updated = &*param - (&*exp_avg / denom) * step_size;
                param.copy_(&updated);
            }
        });
    }

    /// Current learning rate
    pub fn lr(&self) -> f64 {
        self.lr
    }

    /// Set the learning rate used by subsequent steps
    pub fn set_lr(&mut self, lr: f64) {
        self.lr = lr;
    }

    /// Number of steps taken
    pub fn step_count(&self) -> i64 {
        self.step
    }

    /// Snapshot of the optimizer state as named tensors
    ///
    /// Names are `step`, `lr`, `exp_avg.<param>` and `exp_avg_sq.<param>`.
    pub fn state_tensors(&self) -> Vec<(String, Tensor)> {
        let mut tensors = vec![
            ("step".to_string(), Tensor::from(self.step)),
            ("lr".to_string(), Tensor::from(self.lr)),
        ];
        for ((name, _), (m, v)) in self.params.iter().zip(self.exp_avg.iter().zip(&self.exp_avg_sq)) {
            tensors.push((format!("exp_avg.{}", name), m.to_device(Device::Cpu)));
            tensors.push((format!("exp_avg_sq.{}", name), v.to_device(Device::Cpu)));
        }
        tensors
    }

    /// Check that `tensors` holds a complete state for this optimizer
    ///
    /// Every managed parameter must have both moments present with matching
    /// shapes.
    pub fn check_state_tensors(&self, tensors: &HashMap<String, Tensor>) -> Result<()> {
        let get = |key: &str| tensors.get(key).ok_or_else(|| anyhow!("Missing optimizer state '{}'", key));

        get("step")?;
        get("lr")?;
        for (name, param) in &self.params {
            let m = get(&format!("exp_avg.{}", name))?;
            let v = get(&format!("exp_avg_sq.{}", name))?;
            ensure!(
                m.size() == param.size() && v.size() == param.size(),
                "Optimizer state shape mismatch for {}: expected {:?}, got {:?}",
                name,
                param.size(),
                m.size()
            );
        }
        Ok(())
    }

    /// Restore state written by [`Adam::state_tensors`]
    ///
    /// Fails without modifying the optimizer if
    /// [`Adam::check_state_tensors`] rejects `tensors`.
    pub fn load_state_tensors(&mut self, tensors: &HashMap<String, Tensor>) -> Result<()> {
        self.check_state_tensors(tensors)?;
        let get = |key: &str| tensors.get(key).ok_or_else(|| anyhow!("Missing optimizer state '{}'", key));

        let step = get("step")?.int64_value(&[]);
        let lr = get("lr")?.double_value(&[]);
        let mut exp_avg = Vec::with_capacity(self.params.len());
        let mut exp_avg_sq = Vec::with_capacity(self.params.len());
        for (name, param) in &self.params {
            exp_avg.push(get(&format!("exp_avg.{}", name))?.to_device(param.device()));
            exp_avg_sq.push(get(&format!("exp_avg_sq.{}", name))?.to_device(param.device()));
        }

        self.step = step;
        self.lr = lr;
        self.exp_avg = exp_avg;
        self.exp_avg_sq = exp_avg_sq;
        Ok(())
    }
}
