//! Pendulum-v1 environment
//!
//! The inverted pendulum swing-up problem: a frictionless pendulum starts at
//! a random angle and must be swung up and held upright by applying torque to
//! its free end.
//!
//! - State: [cos(theta), sin(theta), theta_dot]
//! - Action: torque in [-2, 2] (one dimension)
//! - Reward: -(theta² + 0.1 * theta_dot² + 0.001 * torque²), theta normalized
//!   to [-pi, pi]
//! - Never terminates; episodes are truncated after 200 steps
//!
//! # Reference
//!
//! Based on OpenAI Gym Pendulum-v1:
//! <https://github.com/openai/gym/blob/master/gym/envs/classic_control/pendulum.py>

use std::f32::consts::PI;

use anyhow::{Result, bail};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::env::{Action, Environment, SpaceInfo, SpaceType, StepInfo, StepResult};

/// Pendulum-v1 environment
#[derive(Debug)]
pub struct Pendulum {
    rng: StdRng,

    theta: f32,
    theta_dot: f32,

    steps: usize,
    max_steps: usize,

    max_speed: f32,
    max_torque: f32,
    dt: f32,
    gravity: f32,
    mass: f32,
    length: f32,
}

impl Pendulum {
    /// Create a new Pendulum with Gym's default constants
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a Pendulum whose initial states are drawn from a seeded RNG
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            theta: 0.0,
            theta_dot: 0.0,
            steps: 0,
            max_steps: 200,
            max_speed: 8.0,
            max_torque: 2.0,
            dt: 0.05,
            gravity: 10.0,
            mass: 1.0,
            length: 1.0,
        }
    }

    fn get_observation(&self) -> Vec<f32> {
        vec![self.theta.cos(), self.theta.sin(), self.theta_dot]
    }
}

impl Default for Pendulum {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap an angle into [-pi, pi)
fn angle_normalize(x: f32) -> f32 {
    (x + PI).rem_euclid(2.0 * PI) - PI
}

impl Environment for Pendulum {
    fn reset(&mut self) -> Result<Vec<f32>> {
        self.theta = self.rng.gen_range(-PI..PI);
        self.theta_dot = self.rng.gen_range(-1.0..1.0);
        self.steps = 0;
        Ok(self.get_observation())
    }

    fn step(&mut self, action: &Action) -> Result<StepResult> {
        let torque = match action.as_continuous() {
            Some(&[u]) => u.clamp(-self.max_torque, self.max_torque),
            _ => bail!("Pendulum expects a 1-dimensional continuous action, got {:?}", action),
        };

        let (g, m, l, dt) = (self.gravity, self.mass, self.length, self.dt);
        let th = self.theta;

        let cost = angle_normalize(th).powi(2)
            + 0.1 * self.theta_dot.powi(2)
            + 0.001 * torque.powi(2);

        let new_theta_dot = (self.theta_dot
            + (3.0 * g / (2.0 * l) * th.sin() + 3.0 / (m * l * l) * torque) * dt)
            .clamp(-self.max_speed, self.max_speed);
        self.theta = th + new_theta_dot * dt;
        self.theta_dot = new_theta_dot;
        self.steps += 1;

        Ok(StepResult {
            observation: self.get_observation(),
            reward: -cost,
            terminated: false,
            truncated: self.steps >= self.max_steps,
            info: StepInfo { episode_steps: self.steps },
        })
    }

    fn observation_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![3], dtype: SpaceType::Continuous { high: self.max_speed } }
    }

    fn action_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![1], dtype: SpaceType::Continuous { high: self.max_torque } }
    }

    fn max_episode_steps(&self) -> usize {
        self.max_steps
    }
}
