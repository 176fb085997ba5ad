//! Metrics sinks for training progress
//!
//! The training loop emits one [`UpdateRecord`] after every PPO update and
//! one [`EvaluationRecord`] after every evaluation. Where those records end
//! up is decided by the [`MetricsSink`] handed to the trainer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::train::ppo::UpdateStats;

/// Emitted after each PPO update
#[derive(Debug, Clone, Serialize)]
pub struct UpdateRecord {
    /// Final actor loss of the update
    pub actor_loss: f64,

    /// Final critic loss of the update
    pub critic_loss: f64,

    /// Environment steps taken so far
    pub total_steps: usize,

    /// Seconds since training started
    pub time_elapsed: f64,

    /// Mean policy entropy
    pub entropy: f64,

    /// Mean approximate KL divergence
    pub approx_kl: f64,

    /// Mean clip fraction
    pub clip_fraction: f64,

    /// Actor learning rate after decay
    pub lr_actor: f64,
}

impl UpdateRecord {
    /// Build a record from the statistics of one update
    pub fn from_stats(stats: &UpdateStats, total_steps: usize, time_elapsed: f64) -> Self {
        let (actor_loss, critic_loss) = stats.losses();
        Self {
            actor_loss,
            critic_loss,
            total_steps,
            time_elapsed,
            entropy: stats.entropy,
            approx_kl: stats.approx_kl,
            clip_fraction: stats.clip_fraction,
            lr_actor: stats.lr_actor,
        }
    }
}

/// Emitted after each evaluation
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRecord {
    /// Mean undiscounted reward over the evaluation episodes
    pub episode_reward: f64,

    /// Mean episode length over the evaluation episodes
    pub episode_length: f64,

    /// Environment steps taken so far
    pub total_steps: usize,

    /// Seconds since training started
    pub time_elapsed: f64,
}

/// Destination for training records
pub trait MetricsSink {
    /// Record the outcome of one update
    fn record_update(&mut self, record: &UpdateRecord) -> Result<()>;

    /// Record the outcome of one evaluation
    fn record_evaluation(&mut self, record: &EvaluationRecord) -> Result<()>;

    /// Flush buffered output
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: MetricsSink + ?Sized> MetricsSink for Box<S> {
    fn record_update(&mut self, record: &UpdateRecord) -> Result<()> {
        (**self).record_update(record)
    }

    fn record_evaluation(&mut self, record: &EvaluationRecord) -> Result<()> {
        (**self).record_evaluation(record)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Sends records to `tracing` as structured events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn record_update(&mut self, record: &UpdateRecord) -> Result<()> {
        tracing::info!(
            total_steps = record.total_steps,
            actor_loss = record.actor_loss,
            critic_loss = record.critic_loss,
            entropy = record.entropy,
            approx_kl = record.approx_kl,
            time_elapsed = record.time_elapsed,
            "update"
        );
        Ok(())
    }

    fn record_evaluation(&mut self, record: &EvaluationRecord) -> Result<()> {
        tracing::info!(
            total_steps = record.total_steps,
            episode_reward = record.episode_reward,
            episode_length = record.episode_length,
            time_elapsed = record.time_elapsed,
            "evaluation"
        );
        Ok(())
    }
}

/// Writes one JSON object per line
///
/// Each line carries a `"kind"` field of `"update"` or `"evaluation"`.
pub struct JsonlSink {
    writer: BufWriter<File>,
}

#[derive(Serialize)]
struct Tagged<'a, T> {
    kind: &'static str,
    #[serde(flatten)]
    record: &'a T,
}

impl JsonlSink {
    /// Create (or truncate) the file at `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create metrics file {}", path.display()))?;
        Ok(Self { writer: BufWriter::new(file) })
    }

    fn write_line<T: Serialize>(&mut self, kind: &'static str, record: &T) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &Tagged { kind, record })?;
        writeln!(self.writer)?;
        Ok(())
    }
}

impl MetricsSink for JsonlSink {
    fn record_update(&mut self, record: &UpdateRecord) -> Result<()> {
        self.write_line("update", record)
    }

    fn record_evaluation(&mut self, record: &EvaluationRecord) -> Result<()> {
        // Evaluations are rare; keep the file current for tailing
        self.write_line("evaluation", record)?;
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush metrics file")
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Fans records out to several sinks
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn MetricsSink>>,
}

impl MultiSink {
    /// Create an empty fan-out
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink
    pub fn with<S: MetricsSink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Number of attached sinks
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// True if no sinks are attached
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl MetricsSink for MultiSink {
    fn record_update(&mut self, record: &UpdateRecord) -> Result<()> {
        for sink in &mut self.sinks {
            sink.record_update(record)?;
        }
        Ok(())
    }

    fn record_evaluation(&mut self, record: &EvaluationRecord) -> Result<()> {
        for sink in &mut self.sinks {
            sink.record_evaluation(record)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}

/// Keeps every record in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    /// Update records in arrival order
    pub updates: Vec<UpdateRecord>,

    /// Evaluation records in arrival order
    pub evaluations: Vec<EvaluationRecord>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsSink for MemorySink {
    fn record_update(&mut self, record: &UpdateRecord) -> Result<()> {
        self.updates.push(record.clone());
        Ok(())
    }

    fn record_evaluation(&mut self, record: &EvaluationRecord) -> Result<()> {
        self.evaluations.push(record.clone());
        Ok(())
    }
}
