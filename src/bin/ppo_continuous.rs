//! Train a continuous-action PPO agent on Pendulum
//!
//! Actions are sampled from a Gaussian, squashed with tanh and rescaled to
//! the pendulum's torque range.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --bin ppo_continuous -- --use-state-norm true --use-reward-scaling true
//! ```

use anyhow::Result;
use clap::Parser;
use ppo_bench::{
    cli::{TrainArgs, init_tracing},
    env::pendulum::Pendulum,
    train::{JsonlSink, MultiSink, PPOConfig, RunContext, TracingSink, Trainer},
};

#[derive(Parser)]
#[command(name = "ppo_continuous", version, about = "PPO with a Gaussian policy on Pendulum")]
struct Cli {
    #[command(flatten)]
    train: TrainArgs,
}

fn defaults() -> PPOConfig {
    PPOConfig::new()
        .max_train_steps(3_000_000)
        .evaluate_freq(5_000)
        .use_state_norm(true)
        .use_reward_scaling(true)
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.train.resolve(defaults())?;

    let seed = config.seed.unwrap_or(0);
    let ctx = if cli.train.cuda { RunContext::cuda_if_available() } else { RunContext::cpu() };

    let mut sink = MultiSink::new().with(TracingSink);
    if let Some(path) = &cli.train.metrics_file {
        sink = sink.with(JsonlSink::create(path)?);
    }

    tracing::info!(seed, device = ?ctx.device, std_mode = ?config.std_mode, "Training PPO on Pendulum");
    let mut trainer = Trainer::new(
        config,
        Pendulum::with_seed(seed),
        Pendulum::with_seed(seed.wrapping_add(100)),
        sink,
        ctx,
    )?;
    if cli.train.resume {
        trainer.resume()?;
    }

    let summary = trainer.run()?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
