//! PPO policy-value agent
//!
//! The agent owns an actor, a critic and one Adam optimizer for each. It
//! samples actions for rollouts, produces deterministic actions for
//! evaluation, and runs the PPO update over a full trajectory buffer.
//!
//! # Update
//!
//! ```text
//! drain buffer
//! V(s), V(s')            under the current critic, no gradient
//! advantages, returns    GAE over the drained order
//! [normalize advantages over the whole batch]
//! for K epochs:
//!   for each shuffled minibatch:
//!     actor:  clipped surrogate - entropy bonus -> backward -> [clip] -> Adam
//!     critic: MSE(V(s), returns)                -> backward -> [clip] -> Adam
//! [decay learning rates]
//! ```

use anyhow::{Result, anyhow, bail, ensure};
use rand::{SeedableRng, rngs::StdRng};
use tch::{Device, Kind, Tensor};

use crate::{
    buffer::{TrajectoryBuffer, compute_gae, normalize_advantages},
    env::{Action, SpaceInfo, SpaceType},
    policy::{Actor, ActionDistribution, Backbone, Critic, HeadConfig, MlpBackbone},
    train::{
        context::RunContext,
        optim::Adam,
        ppo::{
            config::PPOConfig,
            loss::{compute_policy_loss, compute_value_loss, generate_minibatch_indices},
            stats::{MinibatchStats, UpdateStats},
        },
    },
};

/// Saved backbone state of the actor and critic
#[derive(Debug)]
pub struct EpisodeState {
    actor: Vec<Tensor>,
    critic: Vec<Tensor>,
}

/// Action space as seen by the agent
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionSpec {
    /// `num_actions` discrete choices
    Discrete { num_actions: i64 },

    /// `action_dim` real-valued components, each in `[-max_action, max_action]`
    Continuous { action_dim: i64, max_action: f32 },
}

impl ActionSpec {
    /// Derive the agent's action spec from an environment action space
    pub fn from_space(space: &SpaceInfo) -> Result<Self> {
        match space.dtype {
            SpaceType::Discrete(n) => {
                ensure!(n > 0, "Discrete action space must have at least one action");
                Ok(ActionSpec::Discrete { num_actions: n as i64 })
            }
            SpaceType::Continuous { high } => {
                ensure!(
                    high.is_finite() && high > 0.0,
                    "Continuous action space needs a finite positive bound, got {}",
                    high
                );
                ensure!(space.dim() > 0, "Continuous action space has no dimensions");
                Ok(ActionSpec::Continuous { action_dim: space.dim() as i64, max_action: high })
            }
        }
    }

    fn head_config(&self, config: &PPOConfig) -> HeadConfig {
        match *self {
            ActionSpec::Discrete { num_actions } => HeadConfig::Categorical { num_actions },
            ActionSpec::Continuous { action_dim, .. } => HeadConfig::Gaussian {
                action_dim,
                std_mode: config.std_mode,
                bounded: config.bounded_actions,
            },
        }
    }
}

/// Actor-critic agent trained with PPO
pub struct PolicyValueAgent<B: Backbone = MlpBackbone> {
    config: PPOConfig,
    state_dim: i64,
    action_spec: ActionSpec,
    actor: Actor<B>,
    critic: Critic<B>,
    optimizer_actor: Adam,
    optimizer_critic: Adam,
    rng: StdRng,
}

impl PolicyValueAgent<MlpBackbone> {
    /// Create an agent with MLP actor and critic on `ctx.device`
    ///
    /// # Arguments
    ///
    /// * `config` - PPO configuration (validated here)
    /// * `state_dim` - State dimensionality
    /// * `action_spec` - Action space
    /// * `ctx` - Device placement
    pub fn new(
        config: PPOConfig,
        state_dim: i64,
        action_spec: ActionSpec,
        ctx: &RunContext,
    ) -> Result<Self> {
        config.validate()?;
        ensure!(state_dim > 0, "state_dim must be positive");

        if let Some(seed) = config.seed {
            tch::manual_seed(seed as i64);
        }

        let mlp = config.mlp_config();
        let actor = Actor::mlp(state_dim, action_spec.head_config(&config), &mlp, ctx.device);
        let critic = Critic::mlp(state_dim, &mlp, ctx.device);

        tracing::info!(
            device = ?ctx.device,
            state_dim,
            action_spec = ?action_spec,
            hidden_width = config.hidden_width,
            "Created PPO agent"
        );

        Self::from_parts(config, state_dim, action_spec, actor, critic)
    }
}

impl<B: Backbone> PolicyValueAgent<B> {
    /// Assemble an agent from pre-built networks
    pub fn from_parts(
        config: PPOConfig,
        state_dim: i64,
        action_spec: ActionSpec,
        actor: Actor<B>,
        critic: Critic<B>,
    ) -> Result<Self> {
        config.validate()?;
        ensure!(
            actor.head_config() == action_spec.head_config(&config),
            "Actor head {:?} does not match action spec {:?}",
            actor.head_config(),
            action_spec
        );

        let eps = config.adam_epsilon();
        let optimizer_actor = Adam::new(actor.var_store(), config.lr_actor, eps);
        let optimizer_critic = Adam::new(critic.var_store(), config.lr_critic, eps);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config,
            state_dim,
            action_spec,
            actor,
            critic,
            optimizer_actor,
            optimizer_critic,
            rng,
        })
    }

    /// Sample an action from the current stochastic policy
    ///
    /// Returns the action in the policy's own space together with its
    /// log-probability under the sampling distribution. For bounded
    /// continuous policies this is the pre-squash sample; pass it through
    /// [`PolicyValueAgent::to_env_action`] before stepping an environment.
    pub fn choose_action(&self, state: &[f32], ctx: &RunContext) -> Result<(Action, f32)> {
        let states = self.state_tensor(state, ctx)?;

        tch::no_grad(|| {
            let dist = self.actor.distribution(&states);
            let sample = dist.sample();
            let log_prob = dist.log_prob(&sample).double_value(&[0]) as f32;
            Ok((self.tensor_to_action(&sample)?, log_prob))
        })
    }

    /// Deterministic environment action for evaluation rollouts
    ///
    /// Uses the most likely category or the Gaussian mean, squashed and
    /// rescaled exactly as [`PolicyValueAgent::to_env_action`] does.
    pub fn evaluate(&self, state: &[f32], ctx: &RunContext) -> Result<Action> {
        let states = self.state_tensor(state, ctx)?;

        tch::no_grad(|| {
            let mode = self.actor.distribution(&states).mode();
            Ok(self.to_env_action(&self.tensor_to_action(&mode)?))
        })
    }

    /// Map a policy-space action to the environment's action range
    ///
    /// Discrete actions pass through. Continuous actions become
    /// `tanh(u) * max_action` when bounded, `clamp(u, -1, 1) * max_action`
    /// otherwise.
    pub fn to_env_action(&self, action: &Action) -> Action {
        match (action, self.action_spec) {
            (Action::Continuous(u), ActionSpec::Continuous { max_action, .. }) => {
                let bounded = self.config.bounded_actions;
                Action::Continuous(
                    u.iter()
                        .map(|&x| {
                            let squashed = if bounded { x.tanh() } else { x.clamp(-1.0, 1.0) };
                            squashed * max_action
                        })
                        .collect(),
                )
            }
            _ => action.clone(),
        }
    }

    /// Run one PPO update over every transition in `buffer`
    ///
    /// The buffer is drained, so it is empty afterwards even on error.
    /// Learning rates are decayed based on `total_steps` when enabled.
    pub fn update(
        &mut self,
        buffer: &mut TrajectoryBuffer,
        total_steps: usize,
        ctx: &RunContext,
    ) -> Result<UpdateStats> {
        let batch = buffer.drain_batch();
        ensure!(!batch.is_empty(), "Cannot update from an empty trajectory buffer");
        let n = batch.len();
        let device = ctx.device;

        let states = self.states_tensor(&batch.states, device)?;
        let next_states = self.states_tensor(&batch.next_states, device)?;
        let actions = self.actions_tensor(&batch.actions, device)?;
        let old_log_probs = Tensor::from_slice(&batch.log_probs).to_device(device);

        // Value estimates under the pre-update critic
        let (values, next_values) = tch::no_grad(|| {
            (self.critic.value(&states), self.critic.value(&next_states))
        });
        let values = Vec::<f32>::try_from(values.to_device(Device::Cpu))?;
        let next_values = Vec::<f32>::try_from(next_values.to_device(Device::Cpu))?;

        let (mut advantages, returns) = compute_gae(
            &batch.rewards,
            &values,
            &next_values,
            &batch.dw,
            &batch.done,
            self.config.gamma as f32,
            self.config.gae_lambda as f32,
        );
        if self.config.use_adv_norm {
            normalize_advantages(&mut advantages);
        }
        let advantages = Tensor::from_slice(&advantages).to_device(device);
        let returns = Tensor::from_slice(&returns).to_device(device);

        let mut sum = MinibatchStats::zeros();
        let mut last = MinibatchStats::zeros();

        for _epoch in 0..self.config.k_epochs {
            for indices in generate_minibatch_indices(n, self.config.mini_batch_size, &mut self.rng)
            {
                let idx = Tensor::from_slice(&indices).to_device(device);
                let mb_states = states.index_select(0, &idx);
                let mb_actions = actions.index_select(0, &idx);
                let mb_old_log_probs = old_log_probs.index_select(0, &idx);
                let mb_advantages = advantages.index_select(0, &idx);
                let mb_returns = returns.index_select(0, &idx);

                // Actor step
                let dist = self.actor.distribution(&mb_states);
                let log_probs = dist.log_prob(&mb_actions);
                let entropy = dist.entropy();
                let (actor_loss, clip_fraction, approx_kl) = compute_policy_loss(
                    &log_probs,
                    &mb_old_log_probs,
                    &mb_advantages,
                    &entropy,
                    self.config.clip_epsilon,
                    self.config.entropy_coef,
                );
                let actor_loss_val = actor_loss.double_value(&[]);
                if !actor_loss_val.is_finite() {
                    bail!("Actor loss is not finite ({}) at step {}", actor_loss_val, total_steps);
                }

                self.optimizer_actor.zero_grad();
                actor_loss.backward();
                if self.config.use_grad_clip {
                    self.optimizer_actor.clip_grad_norm(self.config.max_grad_norm)?;
                }
                self.optimizer_actor.step();

                // Critic step
                let values = self.critic.value(&mb_states);
                let (critic_loss, explained_var) = compute_value_loss(&values, &mb_returns);
                let critic_loss_val = critic_loss.double_value(&[]);
                if !critic_loss_val.is_finite() {
                    bail!("Critic loss is not finite ({}) at step {}", critic_loss_val, total_steps);
                }

                self.optimizer_critic.zero_grad();
                critic_loss.backward();
                if self.config.use_grad_clip {
                    self.optimizer_critic.clip_grad_norm(self.config.max_grad_norm)?;
                }
                self.optimizer_critic.step();

                last = MinibatchStats {
                    actor_loss: actor_loss_val,
                    critic_loss: critic_loss_val,
                    entropy: entropy.mean(Kind::Float).double_value(&[]),
                    clip_fraction,
                    approx_kl,
                    explained_var,
                    num_updates: 1,
                };
                sum += &last;
            }
        }

        if self.config.use_lr_decay {
            self.decay_learning_rates(total_steps);
        }

        let mut stats = UpdateStats::from_minibatches(&last, &sum);
        stats.lr_actor = self.optimizer_actor.lr();
        stats.lr_critic = self.optimizer_critic.lr();

        tracing::debug!(
            total_steps,
            actor_loss = stats.actor_loss,
            critic_loss = stats.critic_loss,
            entropy = stats.entropy,
            approx_kl = stats.approx_kl,
            clip_fraction = stats.clip_fraction,
            "PPO update"
        );

        Ok(stats)
    }

    /// Clear per-episode backbone state of both networks
    pub fn on_episode_start(&mut self) {
        self.actor.backbone_mut().reset_state();
        self.critic.backbone_mut().reset_state();
    }

    /// Snapshot the per-episode backbone state of both networks
    pub fn episode_state(&self) -> EpisodeState {
        EpisodeState {
            actor: self.actor.backbone().save_state(),
            critic: self.critic.backbone().save_state(),
        }
    }

    /// Put back a snapshot taken by [`PolicyValueAgent::episode_state`]
    pub fn restore_episode_state(&mut self, state: EpisodeState) {
        self.actor.backbone_mut().restore_state(state.actor);
        self.critic.backbone_mut().restore_state(state.critic);
    }

    /// Linear decay toward zero: `lr = lr_0 * (1 - total_steps / max_train_steps)`
    fn decay_learning_rates(&mut self, total_steps: usize) {
        let frac = (1.0 - total_steps as f64 / self.config.max_train_steps as f64).max(0.0);
        self.optimizer_actor.set_lr(self.config.lr_actor * frac);
        self.optimizer_critic.set_lr(self.config.lr_critic * frac);
    }

    fn state_tensor(&self, state: &[f32], ctx: &RunContext) -> Result<Tensor> {
        ensure!(
            state.len() as i64 == self.state_dim,
            "State has {} dimensions, expected {}",
            state.len(),
            self.state_dim
        );
        Ok(Tensor::from_slice(state).view([1, self.state_dim]).to_device(ctx.device))
    }

    fn states_tensor(&self, states: &[Vec<f32>], device: Device) -> Result<Tensor> {
        let mut flat = Vec::with_capacity(states.len() * self.state_dim as usize);
        for state in states {
            ensure!(
                state.len() as i64 == self.state_dim,
                "Stored state has {} dimensions, expected {}",
                state.len(),
                self.state_dim
            );
            flat.extend_from_slice(state);
        }
        Ok(Tensor::from_slice(&flat).view([states.len() as i64, self.state_dim]).to_device(device))
    }

    fn actions_tensor(&self, actions: &[Action], device: Device) -> Result<Tensor> {
        let tensor = match self.action_spec {
            ActionSpec::Discrete { .. } => {
                let indices = actions
                    .iter()
                    .map(|a| {
                        a.as_discrete()
                            .ok_or_else(|| anyhow!("Expected a discrete action, got {:?}", a))
                    })
                    .collect::<Result<Vec<i64>>>()?;
                Tensor::from_slice(&indices)
            }
            ActionSpec::Continuous { action_dim, .. } => {
                let mut flat = Vec::with_capacity(actions.len() * action_dim as usize);
                for action in actions {
                    match action.as_continuous() {
                        Some(u) if u.len() as i64 == action_dim => flat.extend_from_slice(u),
                        _ => bail!(
                            "Expected a {}-dimensional continuous action, got {:?}",
                            action_dim,
                            action
                        ),
                    }
                }
                Tensor::from_slice(&flat).view([actions.len() as i64, action_dim])
            }
        };
        Ok(tensor.to_device(device))
    }

    fn tensor_to_action(&self, sample: &Tensor) -> Result<Action> {
        Ok(match self.action_spec {
            ActionSpec::Discrete { .. } => Action::Discrete(sample.int64_value(&[0])),
            ActionSpec::Continuous { .. } => {
                Action::Continuous(Vec::<f32>::try_from(sample.view([-1]).to_device(Device::Cpu))?)
            }
        })
    }

    /// Log-probability of a stored action under the current policy
    pub fn log_prob(&self, state: &[f32], action: &Action, ctx: &RunContext) -> Result<f32> {
        let states = self.state_tensor(state, ctx)?;
        let actions = self.actions_tensor(std::slice::from_ref(action), ctx.device)?;

        Ok(tch::no_grad(|| self.actor.distribution(&states).log_prob(&actions).double_value(&[0]))
            as f32)
    }

    /// Current action distribution for a single state
    pub fn distribution(&self, state: &[f32], ctx: &RunContext) -> Result<ActionDistribution> {
        let states = self.state_tensor(state, ctx)?;
        Ok(tch::no_grad(|| self.actor.distribution(&states)))
    }

    /// Critic value estimate for a single state
    pub fn value(&self, state: &[f32], ctx: &RunContext) -> Result<f32> {
        let states = self.state_tensor(state, ctx)?;
        Ok(tch::no_grad(|| self.critic.value(&states).double_value(&[0])) as f32)
    }

    /// Training configuration
    pub fn config(&self) -> &PPOConfig {
        &self.config
    }

    /// State dimensionality
    pub fn state_dim(&self) -> i64 {
        self.state_dim
    }

    /// Action space
    pub fn action_spec(&self) -> ActionSpec {
        self.action_spec
    }

    /// Policy network
    pub fn actor(&self) -> &Actor<B> {
        &self.actor
    }

    /// Mutable policy network
    pub fn actor_mut(&mut self) -> &mut Actor<B> {
        &mut self.actor
    }

    /// Value network
    pub fn critic(&self) -> &Critic<B> {
        &self.critic
    }

    /// Mutable value network
    pub fn critic_mut(&mut self) -> &mut Critic<B> {
        &mut self.critic
    }

    /// Actor optimizer
    pub fn optimizer_actor(&self) -> &Adam {
        &self.optimizer_actor
    }

    /// Critic optimizer
    pub fn optimizer_critic(&self) -> &Adam {
        &self.optimizer_critic
    }

    /// Mutable access to both networks and optimizers, for restoring state
    pub fn parts_mut(&mut self) -> (&mut Actor<B>, &mut Critic<B>, &mut Adam, &mut Adam) {
        (&mut self.actor, &mut self.critic, &mut self.optimizer_actor, &mut self.optimizer_critic)
    }
}
