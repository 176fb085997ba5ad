//! Single-environment PPO training loop
//!
//! ```text
//! while total_steps < max_train_steps:
//!   s = norm(env.reset())            reward transform + backbone reset
//!   until episode ends:
//!     a, logp = agent.choose_action(s)
//!     s', r   = env.step(to_env_action(a))
//!     store (s, a, logp, transform(r), norm(s'), dw, done)
//!     buffer full            -> agent.update
//!     evaluate_freq elapsed  -> evaluate_policy, checkpoint
//! ```

use std::time::Instant;

use anyhow::{Result, bail, ensure};
use serde::Serialize;

use crate::{
    buffer::{TrajectoryBuffer, Transition},
    env::{Environment, SpaceInfo},
    policy::{Backbone, MlpBackbone},
    train::{
        checkpoint::Checkpointer,
        context::RunContext,
        metrics::{EvaluationRecord, MetricsSink, UpdateRecord},
        ppo::{ActionSpec, PPOConfig, PolicyValueAgent},
    },
    utils::{Normalizer, RewardScaler},
};

/// How rewards are transformed before they are stored
#[derive(Debug, Clone)]
pub enum RewardTransform {
    /// Stored as received
    None,

    /// Running mean/std normalization
    Normalize(Normalizer),

    /// Division by the running std of the discounted return
    Scale(RewardScaler),
}

impl RewardTransform {
    /// Pick the transform enabled in `config`
    pub fn from_config(config: &PPOConfig) -> Self {
        if config.use_reward_norm {
            RewardTransform::Normalize(Normalizer::new(1))
        } else if config.use_reward_scaling {
            RewardTransform::Scale(RewardScaler::new())
        } else {
            RewardTransform::None
        }
    }

    /// Transform one reward, updating running statistics
    pub fn apply(&mut self, reward: f32, gamma: f64) -> f32 {
        match self {
            RewardTransform::None => reward,
            RewardTransform::Normalize(norm) => norm.apply(&[reward], true)[0],
            RewardTransform::Scale(scaler) => scaler.scale(reward, gamma),
        }
    }

    /// Start of a new episode
    pub fn reset(&mut self) {
        if let RewardTransform::Scale(scaler) = self {
            scaler.reset();
        }
    }
}

/// Mean outcome of the evaluation episodes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationResult {
    /// Mean undiscounted episode reward
    pub mean_reward: f64,

    /// Mean episode length
    pub mean_length: f64,
}

/// Final counters of a training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    /// Environment steps taken
    pub total_steps: usize,

    /// PPO updates performed
    pub updates: usize,

    /// Evaluations performed
    pub evaluations: usize,

    /// Highest evaluation reward, if any evaluation ran
    pub best_reward: Option<f64>,
}

/// Drives one agent on one training environment
pub struct Trainer<E: Environment, S: MetricsSink, B: Backbone = MlpBackbone> {
    config: PPOConfig,
    env: E,
    eval_env: E,
    agent: PolicyValueAgent<B>,
    buffer: TrajectoryBuffer,
    state_norm: Normalizer,
    reward_transform: RewardTransform,
    sink: S,
    checkpointer: Option<Checkpointer>,
    ctx: RunContext,
    state_dim: usize,
    max_episode_steps: usize,
    total_steps: usize,
    last_eval_steps: usize,
    updates: usize,
    evaluations: usize,
    best_reward: Option<f64>,
}

impl<E: Environment, S: MetricsSink> Trainer<E, S> {
    /// Create a trainer and its agent
    ///
    /// # Arguments
    ///
    /// * `config` - PPO configuration (validated here)
    /// * `env` - Environment used to collect training data
    /// * `eval_env` - Separate environment for deterministic evaluation
    /// * `sink` - Destination of update and evaluation records
    /// * `ctx` - Device placement
    pub fn new(config: PPOConfig, env: E, eval_env: E, sink: S, ctx: RunContext) -> Result<Self> {
        config.validate()?;

        let state_dim = env.observation_space().dim();
        ensure!(state_dim > 0, "Observation space has no dimensions");
        let action_spec = ActionSpec::from_space(&env.action_space())?;
        let agent = PolicyValueAgent::new(config.clone(), state_dim as i64, action_spec, &ctx)?;

        Self::with_agent(config, env, eval_env, agent, sink, ctx)
    }
}

impl<E: Environment, S: MetricsSink, B: Backbone> Trainer<E, S, B> {
    /// Create a trainer around an agent built elsewhere, e.g. with a custom backbone
    ///
    /// The agent's state dimension and action spec must match `env`.
    pub fn with_agent(
        config: PPOConfig,
        env: E,
        eval_env: E,
        agent: PolicyValueAgent<B>,
        sink: S,
        ctx: RunContext,
    ) -> Result<Self> {
        config.validate()?;

        let obs_space = env.observation_space();
        let act_space = env.action_space();
        ensure_same_space("observation", &obs_space, &eval_env.observation_space())?;
        ensure_same_space("action", &act_space, &eval_env.action_space())?;

        let state_dim = obs_space.dim();
        ensure!(state_dim > 0, "Observation space has no dimensions");
        let action_spec = ActionSpec::from_space(&act_space)?;
        let max_episode_steps = config.max_episode_steps.unwrap_or_else(|| env.max_episode_steps());
        ensure!(max_episode_steps > 0, "max_episode_steps must be positive");

        ensure!(
            agent.state_dim() == state_dim as i64 && agent.action_spec() == action_spec,
            "Agent expects state_dim {} and {:?}, environment has {} and {:?}",
            agent.state_dim(),
            agent.action_spec(),
            state_dim,
            action_spec
        );
        let checkpointer = config.checkpoint_dir.as_ref().map(|dir| {
            let run_id = config.seed.map_or_else(|| "run".to_string(), |seed| format!("seed{}", seed));
            Checkpointer::new(dir, run_id)
        });

        tracing::info!(
            state_dim,
            action_spec = ?action_spec,
            max_episode_steps,
            max_train_steps = config.max_train_steps,
            batch_size = config.batch_size,
            "Created trainer"
        );

        Ok(Self {
            buffer: TrajectoryBuffer::new(config.batch_size),
            state_norm: Normalizer::new(state_dim),
            reward_transform: RewardTransform::from_config(&config),
            config,
            env,
            eval_env,
            agent,
            sink,
            checkpointer,
            ctx,
            state_dim,
            max_episode_steps,
            total_steps: 0,
            last_eval_steps: 0,
            updates: 0,
            evaluations: 0,
            best_reward: None,
        })
    }

    /// Replace the checkpointer derived from the configuration
    pub fn with_checkpointer(mut self, checkpointer: Checkpointer) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Continue from the checkpoint written by an earlier run
    ///
    /// Restores networks, optimizers and the step counter. Normalizer
    /// statistics are not part of the checkpoint and start fresh.
    pub fn resume(&mut self) -> Result<()> {
        let Some(checkpointer) = &self.checkpointer else {
            bail!("Cannot resume without a checkpoint directory");
        };
        self.total_steps = checkpointer.load(&mut self.agent)?;
        self.last_eval_steps = self.total_steps;
        Ok(())
    }

    /// Train until `max_train_steps` environment steps have been taken
    pub fn run(&mut self) -> Result<TrainingSummary> {
        let start = Instant::now();

        while self.total_steps < self.config.max_train_steps {
            self.run_episode(&start)?;
        }

        self.sink.flush()?;
        let summary = self.summary();
        tracing::info!(
            total_steps = summary.total_steps,
            updates = summary.updates,
            evaluations = summary.evaluations,
            best_reward = ?summary.best_reward,
            elapsed = ?start.elapsed(),
            "Training finished"
        );
        Ok(summary)
    }

    fn run_episode(&mut self, start: &Instant) -> Result<()> {
        let obs = self.env.reset()?;
        let mut state = self.observe(obs, true)?;
        self.reward_transform.reset();
        self.agent.on_episode_start();

        let mut episode_steps = 0;
        loop {
            episode_steps += 1;

            let (action, log_prob) = self.agent.choose_action(&state, &self.ctx)?;
            let step = self.env.step(&self.agent.to_env_action(&action))?;

            let dw = step.terminated;
            let done = step.terminated || step.truncated || episode_steps >= self.max_episode_steps;
            let next_state = self.observe(step.observation, true)?;
            let reward = self.reward_transform.apply(step.reward, self.config.gamma);

            self.buffer.store(Transition {
                state,
                action,
                log_prob,
                reward,
                next_state: next_state.clone(),
                dw,
                done,
            })?;
            state = next_state;
            self.total_steps += 1;

            if self.buffer.is_full() {
                let stats = self.agent.update(&mut self.buffer, self.total_steps, &self.ctx)?;
                self.updates += 1;
                let elapsed = start.elapsed().as_secs_f64();
                self.sink.record_update(&UpdateRecord::from_stats(&stats, self.total_steps, elapsed))?;
            }

            if self.total_steps - self.last_eval_steps >= self.config.evaluate_freq {
                self.last_eval_steps = self.total_steps;
                self.evaluate_and_checkpoint(start)?;
            }

            if done || self.total_steps >= self.config.max_train_steps {
                return Ok(());
            }
        }
    }

    fn evaluate_and_checkpoint(&mut self, start: &Instant) -> Result<()> {
        let result = self.evaluate_policy()?;
        self.evaluations += 1;
        self.sink.record_evaluation(&EvaluationRecord {
            episode_reward: result.mean_reward,
            episode_length: result.mean_length,
            total_steps: self.total_steps,
            time_elapsed: start.elapsed().as_secs_f64(),
        })?;

        let is_best = self.best_reward.is_none_or(|best| result.mean_reward >= best);
        if is_best {
            self.best_reward = Some(result.mean_reward);
        }

        if let Some(checkpointer) = &self.checkpointer {
            checkpointer.save(&self.agent, self.total_steps)?;
            if is_best {
                checkpointer.save_best(&self.agent)?;
                tracing::info!(reward = result.mean_reward, total_steps = self.total_steps, "New best policy");
            }
        }
        Ok(())
    }

    /// Run `evaluate_episodes` deterministic episodes on the evaluation env
    ///
    /// State normalization is applied without updating its statistics.
    /// Backbone state of the interrupted training episode is restored
    /// afterwards.
    pub fn evaluate_policy(&mut self) -> Result<EvaluationResult> {
        let training_state = self.agent.episode_state();
        let result = self.run_evaluation_episodes();
        self.agent.restore_episode_state(training_state);
        result
    }

    fn run_evaluation_episodes(&mut self) -> Result<EvaluationResult> {
        let episodes = self.config.evaluate_episodes;
        let max_steps = self.config.max_episode_steps.unwrap_or_else(|| self.eval_env.max_episode_steps());

        let mut total_reward = 0.0f64;
        let mut total_length = 0usize;
        for _ in 0..episodes {
            let obs = self.eval_env.reset()?;
            let mut state = self.observe(obs, false)?;
            self.agent.on_episode_start();

            let mut episode_steps = 0;
            loop {
                episode_steps += 1;
                let action = self.agent.evaluate(&state, &self.ctx)?;
                let step = self.eval_env.step(&action)?;
                total_reward += step.reward as f64;

                let done = step.terminated || step.truncated || episode_steps >= max_steps;
                state = self.observe(step.observation, false)?;
                if done {
                    break;
                }
            }
            total_length += episode_steps;
        }

        let n = episodes as f64;
        Ok(EvaluationResult { mean_reward: total_reward / n, mean_length: total_length as f64 / n })
    }

    /// Check an observation against the declared space and normalize it
    fn observe(&mut self, obs: Vec<f32>, update: bool) -> Result<Vec<f32>> {
        ensure!(
            obs.len() == self.state_dim,
            "Environment returned an observation of length {}, expected {}",
            obs.len(),
            self.state_dim
        );
        if self.config.use_state_norm {
            Ok(self.state_norm.apply(&obs, update))
        } else {
            Ok(obs)
        }
    }

    /// Counters so far
    pub fn summary(&self) -> TrainingSummary {
        TrainingSummary {
            total_steps: self.total_steps,
            updates: self.updates,
            evaluations: self.evaluations,
            best_reward: self.best_reward,
        }
    }

    /// The agent being trained
    pub fn agent(&self) -> &PolicyValueAgent<B> {
        &self.agent
    }

    /// Mutable access to the agent
    pub fn agent_mut(&mut self) -> &mut PolicyValueAgent<B> {
        &mut self.agent
    }

    /// Metrics sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Reward normalizer or scaler applied to training rewards
    pub fn reward_transform(&self) -> &RewardTransform {
        &self.reward_transform
    }

    /// Observation normalizer
    pub fn state_norm(&self) -> &Normalizer {
        &self.state_norm
    }

    /// Checkpointer, if one is configured
    pub fn checkpointer(&self) -> Option<&Checkpointer> {
        self.checkpointer.as_ref()
    }

    /// Environment steps taken so far
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }
}

fn ensure_same_space(what: &str, train: &SpaceInfo, eval: &SpaceInfo) -> Result<()> {
    ensure!(
        train.shape == eval.shape && train.dtype == eval.dtype,
        "Training and evaluation {} spaces differ: {:?} vs {:?}",
        what,
        train,
        eval
    );
    Ok(())
}
