//! Verify the PPO update moves the policy toward high-advantage actions
//!
//! Synthetic single-step episodes where the rewarded action is obvious:
//! - When obs=0, action=0 earns reward 10
//! - When obs=1, action=1 earns reward 10
//!
//! If PPO is working correctly, after a few updates:
//! - P(action=0 | obs=0) should increase
//! - P(action=1 | obs=1) should increase

use ppo_bench::{
    buffer::{TrajectoryBuffer, Transition},
    env::Action,
    train::{ActionSpec, PPOConfig, PolicyValueAgent, RunContext},
};

fn prob(agent: &PolicyValueAgent, obs: f32, action: i64) -> f32 {
    agent.log_prob(&[obs], &Action::Discrete(action), &RunContext::cpu()).unwrap().exp()
}

fn fill(agent: &PolicyValueAgent, buffer: &mut TrajectoryBuffer) {
    let ctx = RunContext::cpu();
    for i in 0..buffer.capacity() {
        let obs = (i % 2) as f32;
        let action = Action::Discrete(i as i64 % 2);
        let log_prob = agent.log_prob(&[obs], &action, &ctx).unwrap();
        buffer
            .store(Transition {
                state: vec![obs],
                action,
                log_prob,
                reward: 10.0,
                next_state: vec![obs],
                dw: true,
                done: true,
            })
            .unwrap();
    }
}

#[test]
fn test_ppo_learns_from_synthetic_data() {
    let config = PPOConfig::new()
        .batch_size(8)
        .mini_batch_size(8)
        .k_epochs(10)
        .lr_actor(0.01)
        .lr_critic(0.01)
        .entropy_coef(0.0) // Focus purely on advantage
        .use_adv_norm(false) // All stored actions are good; keep the sign
        .use_lr_decay(false)
        .seed(0);
    let mut agent =
        PolicyValueAgent::new(config, 1, ActionSpec::Discrete { num_actions: 2 }, &RunContext::cpu())
            .unwrap();

    let before_0 = prob(&agent, 0.0, 0);
    let before_1 = prob(&agent, 1.0, 1);
    println!("BEFORE: P(0|0) = {:.4}, P(1|1) = {:.4}", before_0, before_1);

    for i in 0..5 {
        let mut buffer = TrajectoryBuffer::new(8);
        fill(&agent, &mut buffer);
        let stats = agent.update(&mut buffer, 0, &RunContext::cpu()).unwrap();
        println!(
            "PPO update {}: actor_loss={:.4}, critic_loss={:.4}, clip_fraction={:.3}",
            i, stats.actor_loss, stats.critic_loss, stats.clip_fraction
        );
    }

    let delta_0 = prob(&agent, 0.0, 0) - before_0;
    let delta_1 = prob(&agent, 1.0, 1) - before_1;
    println!("ΔP(0|0) = {:.4}, ΔP(1|1) = {:.4}", delta_0, delta_1);

    assert!(delta_0 > 0.1, "P(action=0 | obs=0) only increased by {:.4}", delta_0);
    assert!(delta_1 > 0.1, "P(action=1 | obs=1) only increased by {:.4}", delta_1);
}
