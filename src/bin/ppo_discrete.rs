//! Train a discrete-action PPO agent on CartPole
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --bin ppo_discrete -- --seed 10 --metrics-file cartpole.jsonl
//! ```

use anyhow::Result;
use clap::Parser;
use ppo_bench::{
    cli::{TrainArgs, init_tracing},
    env::cartpole::CartPole,
    train::{JsonlSink, MultiSink, PPOConfig, RunContext, TracingSink, Trainer},
};

#[derive(Parser)]
#[command(name = "ppo_discrete", version, about = "PPO with a categorical policy on CartPole")]
struct Cli {
    #[command(flatten)]
    train: TrainArgs,
}

fn defaults() -> PPOConfig {
    PPOConfig::new().max_train_steps(200_000).evaluate_freq(5_000)
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

    tracing::info!(seed, device = ?ctx.device, "Training PPO on CartPole");
    let mut trainer = Trainer::new(
        config,
        CartPole::with_seed(seed),
        CartPole::with_seed(seed.wrapping_add(100)),
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
