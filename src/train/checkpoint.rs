//! Checkpoint persistence
//!
//! Two files per run, both in libtorch's multi-tensor format:
//!
//! - `checkpoint-<run_id>.ot`: `total_steps`, actor and critic parameters,
//!   and the moments and step counts of both optimizers
//! - `best-<run_id>.ot`: actor parameters only
//!
//! Files are written to a temporary path and renamed into place, so a failed
//! write never replaces the previous checkpoint.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, ensure};
use tch::{Device, Tensor, nn};

use crate::{policy::Backbone, train::ppo::PolicyValueAgent};

const ACTOR_PREFIX: &str = "actor.";
const CRITIC_PREFIX: &str = "critic.";
const OPTIMIZER_ACTOR_PREFIX: &str = "optimizer_actor.";
const OPTIMIZER_CRITIC_PREFIX: &str = "optimizer_critic.";
const TOTAL_STEPS_KEY: &str = "total_steps";

/// Writes and restores agent checkpoints for one run
#[derive(Debug, Clone)]
pub struct Checkpointer {
    dir: PathBuf,
    run_id: String,
}

impl Checkpointer {
    /// Create a checkpointer writing into `dir`
    ///
    /// The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self { dir: dir.into(), run_id: run_id.into() }
    }

    /// Path of the full training checkpoint
    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(format!("checkpoint-{}.ot", self.run_id))
    }

    /// Path of the best-policy snapshot
    pub fn best_path(&self) -> PathBuf {
        self.dir.join(format!("best-{}.ot", self.run_id))
    }

    /// Save the full training state
    pub fn save<B: Backbone>(&self, agent: &PolicyValueAgent<B>, total_steps: usize) -> Result<()> {
        let mut tensors = vec![(TOTAL_STEPS_KEY.to_string(), Tensor::from(total_steps as i64))];
        tensors.extend(prefixed(ACTOR_PREFIX, variables(agent.actor().var_store())));
        tensors.extend(prefixed(CRITIC_PREFIX, variables(agent.critic().var_store())));
        tensors.extend(prefixed(OPTIMIZER_ACTOR_PREFIX, agent.optimizer_actor().state_tensors()));
        tensors.extend(prefixed(OPTIMIZER_CRITIC_PREFIX, agent.optimizer_critic().state_tensors()));

        let path = self.checkpoint_path();
        self.write_atomic(&tensors, &path)?;
        tracing::debug!(path = %path.display(), total_steps, "Saved checkpoint");
        Ok(())
    }

    /// Save the actor parameters as the best policy so far
    pub fn save_best<B: Backbone>(&self, agent: &PolicyValueAgent<B>) -> Result<()> {
        let tensors = prefixed(ACTOR_PREFIX, variables(agent.actor().var_store()));

        let path = self.best_path();
        self.write_atomic(&tensors, &path)?;
        tracing::debug!(path = %path.display(), "Saved best policy");
        Ok(())
    }

    /// Restore the full training state into `agent`
    ///
    /// Returns the `total_steps` stored in the checkpoint. The agent must
    /// have been built with the same architecture. Every part of the
    /// checkpoint is checked before anything is copied, so on error the
    /// agent is left untouched.
    pub fn load<B: Backbone>(&self, agent: &mut PolicyValueAgent<B>) -> Result<usize> {
        let path = self.checkpoint_path();
        let tensors = read_tensors(&path)?;

        let total_steps = tensors
            .get(TOTAL_STEPS_KEY)
            .ok_or_else(|| anyhow!("Checkpoint {} has no total_steps", path.display()))?
            .int64_value(&[]);
        ensure!(total_steps >= 0, "Checkpoint has negative total_steps {}", total_steps);

        let actor_vars = strip(&tensors, ACTOR_PREFIX);
        let critic_vars = strip(&tensors, CRITIC_PREFIX);
        let actor_state = strip(&tensors, OPTIMIZER_ACTOR_PREFIX);
        let critic_state = strip(&tensors, OPTIMIZER_CRITIC_PREFIX);
        check_vars(agent.actor().var_store(), &actor_vars).context("Invalid actor in checkpoint")?;
        check_vars(agent.critic().var_store(), &critic_vars).context("Invalid critic in checkpoint")?;
        agent.optimizer_actor().check_state_tensors(&actor_state)?;
        agent.optimizer_critic().check_state_tensors(&critic_state)?;

        let (actor, critic, optimizer_actor, optimizer_critic) = agent.parts_mut();
        copy_vars(actor.var_store_mut(), &actor_vars);
        copy_vars(critic.var_store_mut(), &critic_vars);
        optimizer_actor.load_state_tensors(&actor_state)?;
        optimizer_critic.load_state_tensors(&critic_state)?;

        tracing::info!(path = %path.display(), total_steps, "Restored checkpoint");
        Ok(total_steps as usize)
    }

    /// Restore only the actor from the best-policy snapshot
    pub fn load_best<B: Backbone>(&self, agent: &mut PolicyValueAgent<B>) -> Result<()> {
        let path = self.best_path();
        let tensors = read_tensors(&path)?;
        let saved = strip(&tensors, ACTOR_PREFIX);
        check_vars(agent.actor().var_store(), &saved)?;
        copy_vars(agent.actor_mut().var_store_mut(), &saved);

        tracing::info!(path = %path.display(), "Restored best policy");
        Ok(())
    }

    fn write_atomic(&self, tensors: &[(String, Tensor)], path: &Path) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create checkpoint directory {}", self.dir.display())
        })?;

        let tmp = path.with_extension("ot.tmp");
        let written = Tensor::save_multi(tensors, &tmp)
            .with_context(|| format!("Failed to write {}", tmp.display()))
            .and_then(|_| {
                fs::rename(&tmp, path)
                    .with_context(|| format!("Failed to move checkpoint into {}", path.display()))
            });

        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written
    }
}

fn variables(vs: &nn::VarStore) -> Vec<(String, Tensor)> {
    let mut vars: Vec<(String, Tensor)> =
        vs.variables().into_iter().map(|(name, t)| (name, t.to_device(Device::Cpu))).collect();
    vars.sort_by(|a, b| a.0.cmp(&b.0));
    vars
}

fn prefixed(prefix: &str, tensors: Vec<(String, Tensor)>) -> Vec<(String, Tensor)> {
    tensors.into_iter().map(|(name, t)| (format!("{}{}", prefix, name), t)).collect()
}

fn strip(tensors: &HashMap<String, Tensor>, prefix: &str) -> HashMap<String, Tensor> {
    tensors
        .iter()
        .filter_map(|(name, t)| name.strip_prefix(prefix).map(|n| (n.to_string(), t.shallow_clone())))
        .collect()
}

fn read_tensors(path: &Path) -> Result<HashMap<String, Tensor>> {
    let tensors = Tensor::load_multi(path)
        .with_context(|| format!("Failed to read checkpoint {}", path.display()))?;
    Ok(tensors.into_iter().collect())
}

/// Check that `saved` holds every variable of `vs` with a matching shape
fn check_vars(vs: &nn::VarStore, saved: &HashMap<String, Tensor>) -> Result<()> {
    for (name, var) in vs.variables() {
        let src = saved.get(&name).ok_or_else(|| anyhow!("Checkpoint is missing '{}'", name))?;
        ensure!(
            src.size() == var.size(),
            "Shape mismatch for '{}': expected {:?}, got {:?}",
            name,
            var.size(),
            src.size()
        );
    }
    Ok(())
}

/// Copy saved values into the variables of `vs`; run [`check_vars`] first
fn copy_vars(vs: &mut nn::VarStore, saved: &HashMap<String, Tensor>) {
    tch::no_grad(|| {
        for (name, mut var) in vs.variables() {
            if let Some(src) = saved.get(&name) {
                var.copy_(&src.to_device(var.device()));
            }
        }
    });
}
